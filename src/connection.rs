use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::sleep;

use crate::avr::{Avr, UpdateCallback};
use crate::config::{ConnectionConfig, ReconnectPolicy};
use crate::error::{AnthemError, Result};
use crate::transport::{self, Session};

/// Retry interval for reconnect attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    interval: Duration,
}

impl Backoff {
    /// Start at the policy's initial interval
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            interval: policy.initial,
            policy,
        }
    }

    /// Current retry interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Back to the initial interval after a successful connect
    pub fn reset(&mut self) {
        self.interval = self.policy.initial;
    }

    /// Grow the interval after a failed attempt and return it
    pub fn increase(&mut self) -> Duration {
        self.interval = self
            .interval
            .mul_f64(self.policy.factor)
            .clamp(self.policy.initial, self.policy.max);
        self.interval
    }
}

/// Connection to an Anthem receiver
///
/// Owns the [`Avr`] engine and the socket feeding it. Dropping the
/// connection closes it.
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConnectionConfig,
    avr: Avr,
    closing: AtomicBool,
    halted: AtomicBool,
    backoff: Mutex<Backoff>,
    session: Mutex<Option<Session>>,
}

#[derive(Serialize)]
struct ConnectionReport<'a> {
    host: &'a str,
    port: u16,
    auto_reconnect: bool,
    connected: bool,
    closing: bool,
    halted: bool,
    retry_interval: Duration,
}

impl Connection {
    /// Create a connection to the receiver at `host:port`
    ///
    /// With `auto_reconnect` the first connect happens before this returns,
    /// retrying until it succeeds. Without it nothing is dialed; call
    /// [`Connection::connect`].
    ///
    /// # Example
    ///
    /// ```no_run
    /// use anthemav::Connection;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let connection = Connection::create("192.168.1.50", 14999, true, None).await?;
    ///     connection.avr().set_volume(40)?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn create(
        host: impl Into<String>,
        port: u16,
        auto_reconnect: bool,
        update_callback: Option<UpdateCallback>,
    ) -> Result<Self> {
        let config = ConnectionConfig::new(host)
            .with_port(port)
            .with_auto_reconnect(auto_reconnect);
        Self::create_with_config(config, update_callback).await
    }

    /// Create a connection from a full [`ConnectionConfig`]
    pub async fn create_with_config(
        config: ConnectionConfig,
        update_callback: Option<UpdateCallback>,
    ) -> Result<Self> {
        let connection = Self::new(config, update_callback);
        if connection.inner.config.auto_reconnect {
            connection.inner.reconnect().await?;
        }
        Ok(connection)
    }

    /// Create a connection without dialing; call [`Connection::connect`]
    pub fn new(config: ConnectionConfig, update_callback: Option<UpdateCallback>) -> Self {
        let avr = Avr::with_timings(config.timings, update_callback);
        let inner = Arc::new(Inner {
            backoff: Mutex::new(Backoff::new(config.reconnect)),
            config,
            avr,
            closing: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            session: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        inner
            .avr
            .set_connection_lost_hook(Arc::new(move || Inner::on_connection_lost(&weak)));

        Self { inner }
    }

    /// Dial now, retrying per the reconnect policy when auto reconnect is on
    pub async fn connect(&self) -> Result<()> {
        self.inner.reconnect().await
    }

    /// Close the connection for good
    pub fn close(&self) {
        tracing::info!("Closing connection to {}", self.inner.config.host);
        self.inner.closing.store(true, Ordering::SeqCst);
        self.inner.close_session();
    }

    /// Drop the socket and stop redialing until [`Connection::resume`]
    pub fn halt(&self) {
        tracing::info!("Halting connection to {}", self.inner.config.host);
        self.inner.halted.store(true, Ordering::SeqCst);
        self.inner.close_session();
    }

    /// Allow redialing again after [`Connection::halt`]
    pub fn resume(&self) {
        tracing::info!("Resuming connection to {}", self.inner.config.host);
        self.inner.halted.store(false, Ordering::SeqCst);
    }

    /// The protocol engine behind this connection
    pub fn avr(&self) -> &Avr {
        &self.inner.avr
    }

    /// Whether redialing is paused
    pub fn is_halted(&self) -> bool {
        self.inner.halted.load(Ordering::SeqCst)
    }

    /// Whether [`Connection::close`] has been called
    pub fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
    }

    /// Interval the next failed attempt would wait
    pub fn retry_interval(&self) -> Duration {
        self.inner.backoff.lock().interval()
    }

    /// Supervisor state as pretty JSON
    pub fn dump_conndata(&self) -> Result<String> {
        let report = ConnectionReport {
            host: &self.inner.config.host,
            port: self.inner.config.port,
            auto_reconnect: self.inner.config.auto_reconnect,
            connected: self.inner.is_connected(),
            closing: self.is_closing(),
            halted: self.is_halted(),
            retry_interval: self.retry_interval(),
        };
        Ok(serde_json::to_string_pretty(&report)?)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        self.inner.close_session();
    }
}

impl Inner {
    fn is_connected(&self) -> bool {
        self.avr.is_connected()
    }

    fn close_session(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.close();
        }
    }

    fn on_connection_lost(weak: &Weak<Inner>) {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if !inner.config.auto_reconnect || inner.closing.load(Ordering::SeqCst) {
            tracing::debug!("Not reconnecting to {}", inner.config.host);
            return;
        }
        tokio::spawn(async move {
            if let Err(e) = inner.reconnect().await {
                tracing::debug!("Reconnect abandoned: {}", e);
            }
        });
    }

    /// Keep a freshly dialed session unless closed or halted meanwhile
    fn adopt(&self, session: Session) -> Result<()> {
        self.backoff.lock().reset();
        let previous = self.session.lock().replace(session);
        if let Some(previous) = previous {
            previous.close();
        }

        if self.closing.load(Ordering::SeqCst) {
            self.close_session();
            return Err(AnthemError::ConnectionClosed);
        }
        if self.halted.load(Ordering::SeqCst) {
            // The lost-connection hook starts the loop that waits out the halt
            self.close_session();
            return Ok(());
        }

        tracing::info!("Connected to {}:{}", self.config.host, self.config.port);
        Ok(())
    }

    async fn reconnect(&self) -> Result<()> {
        loop {
            if self.closing.load(Ordering::SeqCst) {
                return Err(AnthemError::ConnectionClosed);
            }

            if self.halted.load(Ordering::SeqCst) {
                tracing::debug!("Connection halted, waiting");
                sleep(self.config.reconnect.halt_poll).await;
                continue;
            }

            if self.is_connected() {
                return Ok(());
            }

            tracing::info!(
                "Connecting to Anthem AVR at {}:{}",
                self.config.host,
                self.config.port
            );
            match transport::open(&self.config.host, self.config.port, &self.avr).await {
                Ok(session) => return self.adopt(session),
                Err(e) => {
                    if !self.config.auto_reconnect || self.closing.load(Ordering::SeqCst) {
                        return Err(e.into());
                    }
                    let interval = self.backoff.lock().increase();
                    tracing::warn!("Connecting failed, retrying in {:?}: {}", interval, e);
                    sleep(interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_to_ceiling() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        assert_eq!(backoff.interval(), Duration::from_secs(1));

        assert_eq!(backoff.increase(), Duration::from_millis(1500));
        assert_eq!(backoff.increase(), Duration::from_millis(2250));

        for _ in 0..50 {
            let interval = backoff.increase();
            assert!(interval <= Duration::from_secs(300));
            assert!(interval >= Duration::from_secs(1));
        }
        assert_eq!(backoff.interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        backoff.increase();
        backoff.increase();
        backoff.reset();
        assert_eq!(backoff.interval(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_no_dial_without_auto_reconnect() {
        let connection = Connection::create("127.0.0.1", 9, false, None)
            .await
            .unwrap();
        assert!(!connection.avr().is_connected());

        let report: serde_json::Value =
            serde_json::from_str(&connection.dump_conndata().unwrap()).unwrap();
        assert_eq!(report["port"], 9);
        assert_eq!(report["connected"], false);
    }

    #[tokio::test]
    async fn test_halt_while_dialing_hands_over_to_hook() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let policy = ReconnectPolicy {
            halt_poll: Duration::from_millis(20),
            ..ReconnectPolicy::default()
        };
        let config = ConnectionConfig::new("127.0.0.1")
            .with_port(port)
            .with_reconnect_policy(policy);
        let connection = Connection::new(config, None);

        let session = transport::open("127.0.0.1", port, &connection.inner.avr)
            .await
            .unwrap();
        let (_socket, _) = listener.accept().await.unwrap();
        connection.inner.halted.store(true, Ordering::SeqCst);

        assert!(connection.inner.adopt(session).is_ok());
        assert!(connection.inner.session.lock().is_none());
        tokio::time::timeout(Duration::from_secs(1), async {
            while connection.avr().is_connected() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        // Only the loop started by the lost-connection hook redials
        connection.resume();
        let accepted = tokio::time::timeout(Duration::from_secs(5), listener.accept()).await;
        assert!(accepted.is_ok());
        connection.close();
    }

    #[tokio::test]
    async fn test_close_while_dialing_drops_session() {
        let connection = Connection::new(ConnectionConfig::new("127.0.0.1"), None);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let session = transport::open("127.0.0.1", port, &connection.inner.avr)
            .await
            .unwrap();
        connection.inner.closing.store(true, Ordering::SeqCst);

        assert!(matches!(
            connection.inner.adopt(session),
            Err(AnthemError::ConnectionClosed)
        ));
        assert!(connection.inner.session.lock().is_none());
    }

    #[tokio::test]
    async fn test_closed_connection_refuses_to_dial() {
        let connection = Connection::create("127.0.0.1", 9, false, None)
            .await
            .unwrap();
        connection.close();
        assert!(matches!(
            connection.connect().await,
            Err(AnthemError::ConnectionClosed)
        ));
    }
}

use anthemav::{AnthemError, Connection, ConnectionConfig, ReconnectPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// A port nothing listens on, free to bind again later
async fn closed_port() -> u16 {
    let (listener, port) = listener().await;
    drop(listener);
    port
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        initial: Duration::from_millis(50),
        max: Duration::from_millis(200),
        factor: 2.0,
        halt_poll: Duration::from_millis(20),
    }
}

/// Start dialing `port` in the background, retrying per `policy`
fn dial(port: u16, policy: ReconnectPolicy) -> (Arc<Connection>, JoinHandle<anthemav::Result<()>>) {
    let config = ConnectionConfig::new("127.0.0.1")
        .with_port(port)
        .with_reconnect_policy(policy);
    let connection = Arc::new(Connection::new(config, None));
    let dialing = tokio::spawn({
        let connection = connection.clone();
        async move { connection.connect().await }
    });
    (connection, dialing)
}

/// Wait until failed dials have pushed the retry interval to `at_least`
async fn wait_for_backoff(connection: &Connection, at_least: Duration) {
    timeout(Duration::from_secs(5), async {
        while connection.retry_interval() < at_least {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("retry interval never grew");
}

/// Read from the socket until `needle` has been seen
async fn read_until(socket: &mut TcpStream, received: &mut String, needle: &str) {
    let mut buffer = [0u8; 1024];
    while !received.contains(needle) {
        let n = socket.read(&mut buffer).await.unwrap();
        assert!(n > 0, "client hung up before sending {}", needle);
        received.push_str(&String::from_utf8_lossy(&buffer[..n]));
    }
}

#[tokio::test]
async fn test_connect_queries_device_and_initialises() {
    init_tracing();
    let (listener, port) = listener().await;

    let device = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = String::new();

        read_until(&mut socket, &mut received, "IDM?;").await;
        socket.write_all(b"Z1POW0;IDMMRX 740;").await.unwrap();

        read_until(&mut socket, &mut received, "WMAC?;").await;
        socket.write_all(b"EMAC00:11:22:33:44:55;").await.unwrap();

        (socket, received)
    });

    let connection = Connection::create("127.0.0.1", port, true, None)
        .await
        .unwrap();
    let avr = connection.avr();
    avr.wait_for_device_initialised(Duration::from_secs(5))
        .await
        .unwrap();

    let (_socket, received) = device.await.unwrap();
    assert!(received.starts_with("Z1POW?;IDM?;"), "got {}", received);
    assert!(received.contains("EMAC?;"));

    assert_eq!(avr.model(), "MRX 740");
    assert_eq!(avr.mac_address(), "00:11:22:33:44:55");
    assert_eq!(avr.zone_count(), 2);
    assert!(avr.is_connected());

    connection.close();
}

#[tokio::test]
async fn test_commands_reach_the_device() {
    init_tracing();
    let (listener, port) = listener().await;

    let connection = Connection::create("127.0.0.1", port, true, None)
        .await
        .unwrap();
    let (mut socket, _) = listener.accept().await.unwrap();

    connection.avr().set_mute(true).unwrap();

    let mut received = String::new();
    timeout(
        Duration::from_secs(5),
        read_until(&mut socket, &mut received, "Z1MUT?;"),
    )
    .await
    .unwrap();
    assert!(received.contains("Z1MUT1;Z1MUT?;"));

    socket.write_all(b"Z1MUT1;").await.unwrap();
    timeout(Duration::from_secs(5), async {
        while !connection.avr().mute() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    connection.close();
}

#[tokio::test]
async fn test_without_auto_reconnect_nothing_is_dialed() {
    let (listener, port) = listener().await;

    let connection = Connection::create("127.0.0.1", port, false, None)
        .await
        .unwrap();
    assert!(!connection.avr().is_connected());
    assert!(timeout(Duration::from_millis(300), listener.accept())
        .await
        .is_err());

    connection.connect().await.unwrap();
    let accepted = timeout(Duration::from_secs(5), listener.accept()).await;
    assert!(accepted.is_ok());

    connection.close();
}

#[tokio::test]
async fn test_connect_failure_propagates_without_auto_reconnect() {
    let (listener, port) = listener().await;
    drop(listener);

    let connection = Connection::create("127.0.0.1", port, false, None)
        .await
        .unwrap();
    let result = connection.connect().await;
    assert!(matches!(result, Err(AnthemError::Io(_))));
}

#[tokio::test]
async fn test_reconnects_after_device_hangs_up() {
    init_tracing();
    let (listener, port) = listener().await;

    let connection = Connection::create("127.0.0.1", port, true, None)
        .await
        .unwrap();
    let (socket, _) = listener.accept().await.unwrap();
    drop(socket);

    let accepted = timeout(Duration::from_secs(5), listener.accept()).await;
    assert!(accepted.is_ok(), "no reconnect after hang up");
    assert_eq!(connection.retry_interval(), Duration::from_secs(1));

    connection.close();
}

#[tokio::test]
async fn test_close_does_not_reconnect() {
    let (listener, port) = listener().await;

    let connection = Connection::create("127.0.0.1", port, true, None)
        .await
        .unwrap();
    let (_socket, _) = listener.accept().await.unwrap();

    connection.close();
    assert!(connection.is_closing());
    assert!(timeout(Duration::from_secs(1), listener.accept())
        .await
        .is_err());

    assert!(matches!(
        connection.connect().await,
        Err(AnthemError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_halt_and_resume() {
    init_tracing();
    let (listener, port) = listener().await;

    let policy = ReconnectPolicy {
        halt_poll: Duration::from_millis(50),
        ..ReconnectPolicy::default()
    };
    let config = ConnectionConfig::new("127.0.0.1")
        .with_port(port)
        .with_reconnect_policy(policy);
    let connection = Connection::create_with_config(config, None).await.unwrap();
    let (_socket, _) = listener.accept().await.unwrap();

    connection.halt();
    assert!(connection.is_halted());
    assert!(timeout(Duration::from_millis(500), listener.accept())
        .await
        .is_err());
    assert!(!connection.avr().is_connected());

    connection.resume();
    let accepted = timeout(Duration::from_secs(5), listener.accept()).await;
    assert!(accepted.is_ok(), "no reconnect after resume");

    let report: serde_json::Value =
        serde_json::from_str(&connection.dump_conndata().unwrap()).unwrap();
    assert_eq!(report["halted"], false);

    connection.close();
}

#[tokio::test]
async fn test_backoff_grows_until_device_listens() {
    init_tracing();
    let port = closed_port().await;
    let policy = fast_policy();
    let (connection, dialing) = dial(port, policy);

    wait_for_backoff(&connection, policy.initial * 2).await;
    wait_for_backoff(&connection, policy.max).await;
    assert_eq!(connection.retry_interval(), policy.max);
    assert!(!dialing.is_finished());

    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let accepted = timeout(Duration::from_secs(5), listener.accept()).await;
    assert!(accepted.is_ok(), "never connected once the device listened");

    let result = timeout(Duration::from_secs(5), dialing).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert!(connection.avr().is_connected());
    assert_eq!(connection.retry_interval(), policy.initial);

    connection.close();
}

#[tokio::test]
async fn test_halt_during_backoff_stops_dialing() {
    init_tracing();
    let port = closed_port().await;
    let policy = fast_policy();
    let (connection, dialing) = dial(port, policy);

    wait_for_backoff(&connection, policy.initial * 2).await;
    connection.halt();
    // Let the pending backoff sleep run out
    sleep(policy.max * 2).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    assert!(timeout(Duration::from_millis(500), listener.accept())
        .await
        .is_err());
    assert!(!dialing.is_finished());

    connection.close();
    let result = timeout(Duration::from_secs(5), dialing).await.unwrap().unwrap();
    assert!(matches!(result, Err(AnthemError::ConnectionClosed)));
}

#[tokio::test]
async fn test_close_during_backoff_ends_the_loop() {
    let port = closed_port().await;
    let policy = ReconnectPolicy {
        initial: Duration::from_millis(200),
        max: Duration::from_secs(60),
        ..fast_policy()
    };
    let (connection, dialing) = dial(port, policy);

    // The first failure leaves the loop sleeping for 400ms
    wait_for_backoff(&connection, policy.initial * 2).await;
    connection.close();

    let result = timeout(Duration::from_secs(5), dialing).await.unwrap().unwrap();
    assert!(matches!(result, Err(AnthemError::ConnectionClosed)));

    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    assert!(timeout(Duration::from_millis(500), listener.accept())
        .await
        .is_err());
}

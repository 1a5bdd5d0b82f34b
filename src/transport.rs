use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

use crate::avr::Avr;

const READ_BUFFER_SIZE: usize = 4096;

/// A live socket bound to an engine
pub(crate) struct Session {
    stop_tx: broadcast::Sender<()>,
}

impl Session {
    /// Ask both tasks to stop; the engine hears about it when the reader exits
    pub(crate) fn close(&self) {
        let _ = self.stop_tx.send(());
    }
}

/// Dial the receiver and attach the socket to `avr`
pub(crate) async fn open(host: &str, port: u16, avr: &Avr) -> std::io::Result<Session> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    let (mut read, mut write) = stream.into_split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let (stop_tx, _) = broadcast::channel(1);

    let mut writer_stop = stop_tx.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_stop.recv() => break,
                message = rx.recv() => {
                    let Some(message) = message else {
                        break;
                    };
                    if let Err(e) = write.write_all(message.as_bytes()).await {
                        tracing::error!("Failed to send message: {}", e);
                        break;
                    }
                }
            }
        }
        let _ = write.shutdown().await;
    });

    let session = avr.connection_made(tx);

    let mut reader_stop = stop_tx.subscribe();
    let avr = avr.clone();
    tokio::spawn(async move {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            tokio::select! {
                _ = reader_stop.recv() => {
                    tracing::info!("Closing connection to receiver");
                    break;
                }
                result = read.read(&mut buffer) => match result {
                    Ok(0) => {
                        tracing::info!("Connection closed by receiver");
                        break;
                    }
                    Ok(n) => {
                        tracing::trace!("< {}", String::from_utf8_lossy(&buffer[..n]));
                        avr.data_received(&buffer[..n]);
                    }
                    Err(e) => {
                        tracing::error!("Socket error: {}", e);
                        break;
                    }
                }
            }
        }
        avr.connection_lost(session);
    });

    Ok(Session { stop_tx })
}

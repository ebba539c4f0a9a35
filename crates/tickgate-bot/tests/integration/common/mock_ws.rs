//! Mock market stream server for integration tests.
//!
//! Provides a simple WebSocket server that can:
//! - Accept connections
//! - Stream a scripted list of frames to every new connection
//! - Drop all live connections on demand (forces client reconnects)
//! - Record received messages

use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Delay between scripted frames.
const FRAME_INTERVAL: Duration = Duration::from_millis(5);

/// Binance-style trade frame.
pub fn trade_frame(symbol: &str, price: &str, quantity: &str, trade_time: i64) -> String {
    serde_json::json!({
        "e": "trade",
        "E": trade_time,
        "s": symbol,
        "p": price,
        "q": quantity,
        "T": trade_time,
    })
    .to_string()
}

/// A mock WebSocket server for testing.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    kick_tx: broadcast::Sender<()>,
    messages: Arc<Mutex<VecDeque<String>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockWsServer {
    /// Start a server that sends nothing on its own.
    pub async fn start() -> Self {
        Self::start_with_frames(Vec::new()).await
    }

    /// Start a server that streams `frames` to each new connection.
    pub async fn start_with_frames(frames: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(VecDeque::new()));
        let connections: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (kick_tx, _) = broadcast::channel::<()>(16);
        let frames = Arc::new(frames);

        let messages_clone = messages.clone();
        let connections_clone = connections.clone();
        let kick_clone = kick_tx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            frames.clone(),
                            messages_clone.clone(),
                            connections_clone.clone(),
                            kick_clone.subscribe(),
                        ));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            kick_tx,
            messages,
            connections,
        }
    }

    /// Get the server's WebSocket URL.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Get the number of connections received.
    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    /// Get all received messages.
    pub async fn received_messages(&self) -> Vec<String> {
        self.messages.lock().await.iter().cloned().collect()
    }

    /// Close every live connection with a Close frame.
    pub fn drop_connections(&self) {
        let _ = self.kick_tx.send(());
    }

    /// Stop accepting and drop live connections.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.kick_tx.send(());
    }
}

async fn handle_connection(
    stream: TcpStream,
    frames: Arc<Vec<String>>,
    messages: Arc<Mutex<VecDeque<String>>>,
    connections: Arc<Mutex<u32>>,
    mut kick_rx: broadcast::Receiver<()>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    // Counted after the handshake so a count means the client saw Open.
    {
        let mut count = connections.lock().await;
        *count += 1;
    }

    let (mut write, mut read) = ws_stream.split();

    for frame in frames.iter() {
        if write.send(Message::Text(frame.clone())).await.is_err() {
            return;
        }
        tokio::time::sleep(FRAME_INTERVAL).await;
    }

    loop {
        tokio::select! {
            _ = kick_rx.recv() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    messages.lock().await.push_back(text);
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockWsServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }

    #[test]
    fn test_trade_frame_shape() {
        let frame: serde_json::Value =
            serde_json::from_str(&trade_frame("BTCUSDT", "100.5", "2", 7)).unwrap();
        assert_eq!(frame["e"], "trade");
        assert_eq!(frame["p"], "100.5");
        assert_eq!(frame["T"], 7);
    }
}

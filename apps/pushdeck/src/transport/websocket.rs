use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::trace;

use super::TransportError;

/// One physical WebSocket connection attempt.
///
/// Owns the socket tasks for its lifetime; dropping the handle tears the
/// socket down. Closure is observed by `recv` returning `None`.
pub struct WebSocketTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
    ws_task: Option<tokio::task::JoinHandle<()>>,
}

impl WebSocketTransport {
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;

        let (tx_out, rx_out) = mpsc::unbounded_channel::<String>();
        let (tx_in, rx_in) = mpsc::unbounded_channel::<String>();

        let ws_task = tokio::spawn(async move {
            handle_websocket(ws_stream, rx_out, tx_in).await;
        });

        Ok(Self {
            tx: tx_out,
            rx: rx_in,
            ws_task: Some(ws_task),
        })
    }

    /// Queue one outgoing text frame.
    pub fn send(&self, frame: String) -> Result<(), TransportError> {
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }

    /// A cloneable sender for the outgoing direction.
    pub fn sender(&self) -> mpsc::UnboundedSender<String> {
        self.tx.clone()
    }

    /// Next incoming text frame, or `None` once the socket has closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.ws_task.take() {
            task.abort();
        }
    }
}

async fn handle_websocket(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut rx_out: mpsc::UnboundedReceiver<String>,
    tx_in: mpsc::UnboundedSender<String>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Forward queued outgoing frames to the socket.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx_out.recv().await {
            if ws_sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if tx_in.send(text).is_err() {
                    break;
                }
            }
            Ok(Message::Binary(data)) => {
                // The protocol is text frames; tolerate servers that send
                // JSON as binary, skip anything that is not UTF-8.
                match String::from_utf8(data) {
                    Ok(text) => {
                        if tx_in.send(text).is_err() {
                            break;
                        }
                    }
                    Err(_) => {
                        trace!(target = "transport::ws", "ignoring non-utf8 binary frame");
                    }
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {} // Ping/Pong handled by tungstenite
        }
    }

    send_task.abort();
    let _ = send_task.await;
}

//! WebSocket listener and per-connection transport tasks

use crate::connection::Connection;
use crate::session::{SessionContext, SessionHandler};
use futures_util::{future, SinkExt, Stream, StreamExt};
use log::{debug, error, info, warn};
use shared::Message;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{accept_async, WebSocketStream};

type WsSink = futures_util::stream::SplitSink<WebSocketStream<TcpStream>, WsMessage>;

/// Accepts WebSocket clients and runs one session per connection
pub struct Server {
    listener: TcpListener,
    ctx: SessionContext,
    outbound_buffer: usize,
}

impl Server {
    pub async fn bind(
        addr: &str,
        ctx: SessionContext,
        outbound_buffer: usize,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            ctx,
            outbound_buffer,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Each client gets its own task; a failing client never
    /// stops the loop.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let ctx = self.ctx.clone();
                    let outbound_buffer = self.outbound_buffer;
                    tokio::spawn(async move {
                        serve_connection(stream, addr, ctx, outbound_buffer).await;
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: SessionContext,
    outbound_buffer: usize,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (sink, frames) = ws.split();
    let (connection, outbound) = Connection::channel(outbound_buffer);
    info!("New connection {} from {}", connection.id(), addr);

    let writer = tokio::spawn(write_outbound(sink, outbound, connection.clone()));

    SessionHandler::new(ctx, connection)
        .run(inbound_messages(frames))
        .await;

    if let Err(e) = writer.await {
        error!("Writer task for {} panicked: {}", addr, e);
    }
}

/// Drains a connection's outbound queue into the socket until the
/// connection is closed or the socket fails.
async fn write_outbound(
    mut sink: WsSink,
    mut outbound: mpsc::Receiver<Message>,
    connection: Connection,
) {
    loop {
        tokio::select! {
            _ = connection.closed() => break,
            next = outbound.recv() => {
                let Some(message) = next else { break };
                let text = match message.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to serialize {:?}: {}", message.kind, e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::text(text)).await {
                    debug!("Write to connection {} failed: {}", connection.id(), e);
                    connection.close();
                    break;
                }
            }
        }
    }

    if let Err(e) = sink.close().await {
        debug!("Closing connection {}: {}", connection.id(), e);
    }
}

/// Decoded messages from a socket. The stream ends at the first close frame.
fn inbound_messages<S>(frames: S) -> impl Stream<Item = Result<Message, WsError>>
where
    S: Stream<Item = Result<WsMessage, WsError>>,
{
    frames
        .take_while(|frame| future::ready(!matches!(frame, Ok(WsMessage::Close(_)))))
        .filter_map(|frame| future::ready(decode_frame(frame)))
}

/// Turns a raw frame into an inbound message.
///
/// Malformed text and control frames are skipped; transport errors are
/// passed through so the session can end.
fn decode_frame(frame: Result<WsMessage, WsError>) -> Option<Result<Message, WsError>> {
    match frame {
        Ok(WsMessage::Text(text)) => match Message::from_json(&text) {
            Ok(message) => Some(Ok(message)),
            Err(e) => {
                warn!("Skipping malformed message: {}", e);
                None
            }
        },
        Ok(_) => None,
        Err(e) => Some(Err(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::MessageType;

    #[test]
    fn test_decode_text_frame() {
        let frame = Ok(WsMessage::text(r#"{"type":"createRoom"}"#));
        let decoded = decode_frame(frame).unwrap().unwrap();
        assert_eq!(decoded.kind, MessageType::CreateRoom);
    }

    #[test]
    fn test_decode_skips_malformed_and_control_frames() {
        assert!(decode_frame(Ok(WsMessage::text("{oops"))).is_none());
        assert!(decode_frame(Ok(WsMessage::Ping(Vec::new().into()))).is_none());
    }

    #[tokio::test]
    async fn test_close_frame_ends_inbound_stream() {
        let frames = futures_util::stream::iter(vec![
            Ok(WsMessage::text(r#"{"type":"createRoom"}"#)),
            Ok(WsMessage::text("{oops")),
            Ok(WsMessage::Close(None)),
            Ok(WsMessage::text(r#"{"type":"joinRoom","roomCode":"1234"}"#)),
        ]);

        let messages: Vec<_> = inbound_messages(frames).collect().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].as_ref().unwrap().kind, MessageType::CreateRoom);
    }

    #[test]
    fn test_decode_passes_errors_through() {
        let decoded = decode_frame(Err(WsError::ConnectionClosed)).unwrap();
        assert!(decoded.is_err());
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let ctx = SessionContext::new(
            std::sync::Arc::new(crate::registry::RoomRegistry::new()),
            crate::turn::TurnEngine::default(),
        );
        let server = Server::bind("127.0.0.1:0", ctx, 8).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }
}

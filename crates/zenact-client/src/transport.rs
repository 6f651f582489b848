use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::Result;

/// Opens push-channel connections. The synchronizer owns exactly one
/// connection at a time.
#[async_trait]
pub trait LiveTransport: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn LiveConnection>>;
}

/// An open, inbound-only push channel.
#[async_trait]
pub trait LiveConnection: Send {
    /// Next application frame, `None` once the peer has closed.
    async fn next_frame(&mut self) -> Option<Result<String>>;

    async fn close(&mut self);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl LiveTransport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn LiveConnection>> {
        let (stream, response) = tokio_tungstenite::connect_async(url).await?;
        debug!("push channel handshake: {}", response.status());
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl LiveConnection for WsConnection {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(err) => {
                        debug!("skipping non-utf8 binary frame: {}", err);
                        continue;
                    }
                },
                Ok(Message::Close(_)) => return None,
                // ping/pong are answered by tungstenite itself
                Ok(_) => continue,
                Err(err) => return Some(Err(err.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(err) = self.stream.close(None).await {
            debug!("push channel close: {}", err);
        }
    }
}

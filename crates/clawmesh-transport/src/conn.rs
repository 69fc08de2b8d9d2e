//! Thin framing layer over a `tokio-tungstenite` stream: JSON text frames
//! in, [`WireFrame`] values out, with the 10 MiB payload ceiling enforced
//! both ways.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::TransportError;
use crate::wire::{WireFrame, MAX_PAYLOAD_BYTES};

pub struct Conn<S> {
    inner: WebSocketStream<S>,
}

impl<S> Conn<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(inner: WebSocketStream<S>) -> Self {
        Conn { inner }
    }

    pub async fn send(&mut self, frame: &WireFrame) -> Result<(), TransportError> {
        let text = serde_json::to_string(frame).map_err(|e| TransportError::Malformed(e.to_string()))?;
        if text.len() > MAX_PAYLOAD_BYTES {
            return Err(TransportError::PayloadTooLarge);
        }
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Socket(e.to_string()))
    }

    /// Read the next frame. `Ok(None)` means the peer closed the stream
    /// cleanly.
    pub async fn recv(&mut self) -> Result<Option<WireFrame>, TransportError> {
        loop {
            match self.inner.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(text))) => {
                    if text.len() > MAX_PAYLOAD_BYTES {
                        return Err(TransportError::PayloadTooLarge);
                    }
                    let frame = serde_json::from_str(&text)
                        .map_err(|e| TransportError::Malformed(e.to_string()))?;
                    return Ok(Some(frame));
                }
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::Socket(e.to_string())),
            }
        }
    }

    pub async fn close(&mut self) {
        let _ = self.inner.close(None).await;
    }
}

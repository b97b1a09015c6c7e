use async_trait::async_trait;
use cathode_common::error::{CathodeError, Result};
use cathode_common::traits::{Presentation, PresentationInput};
use cathode_common::types::{Capabilities, Size};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

/// JSON resize control message: `{"type":"resize","cols":N,"rows":M}` with
/// optional floating cell metrics.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResizeMessage {
    #[serde(rename = "type")]
    kind: String,
    cols: u16,
    rows: u16,
    cell_width: Option<f32>,
    cell_height: Option<f32>,
}

/// A WebSocket peer as the presentation: binary frames carry terminal
/// bytes both ways; text frames may be resize control messages, which are
/// consumed without being delivered as input. Invalid control messages
/// are ignored and leave the dimensions unchanged.
pub struct WebSocketPresentation<S> {
    socket: WebSocketStream<S>,
    size: Size,
    capabilities: Capabilities,
}

impl<S> WebSocketPresentation<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(socket: WebSocketStream<S>, size: Size, capabilities: Capabilities) -> Self {
        Self {
            socket,
            size,
            capabilities,
        }
    }

    /// `resize:<cols>,<rows>` (legacy) or the JSON form.
    fn parse_control(&self, text: &str) -> Option<(Size, Option<(f32, f32)>)> {
        if let Some(rest) = text.strip_prefix("resize:") {
            let (cols, rows) = rest.split_once(',')?;
            let size = Size::new(cols.trim().parse().ok()?, rows.trim().parse().ok()?);
            return (size.width > 0 && size.height > 0).then_some((size, None));
        }
        let msg: ResizeMessage = serde_json::from_str(text).ok()?;
        if msg.kind != "resize" || msg.cols == 0 || msg.rows == 0 {
            return None;
        }
        let metrics = match (msg.cell_width, msg.cell_height) {
            (Some(w), Some(h)) if w > 0.0 && h > 0.0 => Some((w, h)),
            _ => None,
        };
        Some((Size::new(msg.cols, msg.rows), metrics))
    }
}

#[async_trait]
impl<S> Presentation for WebSocketPresentation<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn size(&self) -> Size {
        self.size
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn write_output(&mut self, bytes: &[u8]) -> Result<()> {
        self.socket
            .send(Message::Binary(bytes.to_vec()))
            .await
            .map_err(|e| CathodeError::Adapter(format!("websocket send failed: {e}")))
    }

    async fn read_input(&mut self) -> Result<PresentationInput> {
        loop {
            let Some(frame) = self.socket.next().await else {
                return Ok(PresentationInput::Disconnected);
            };
            match frame {
                Ok(Message::Binary(bytes)) => return Ok(PresentationInput::Bytes(bytes)),
                Ok(Message::Text(text)) => {
                    if let Some((size, metrics)) = self.parse_control(&text) {
                        self.size = size;
                        if let Some((w, h)) = metrics {
                            self.capabilities.cell_px_w = w;
                            self.capabilities.cell_px_h = h;
                        }
                        return Ok(PresentationInput::Resized(size, metrics));
                    }
                    if text.starts_with("resize:") || text.starts_with('{') {
                        // Malformed control message: drop it, keep state.
                        warn!(%text, "ignoring invalid control message");
                        continue;
                    }
                    return Ok(PresentationInput::Bytes(text.into_bytes()));
                }
                Ok(Message::Close(_)) => return Ok(PresentationInput::Disconnected),
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(e) => {
                    debug!(%e, "websocket read failed");
                    return Ok(PresentationInput::Disconnected);
                }
            }
        }
    }

    // Raw mode is the peer's concern; the wire carries bytes either way.
    async fn enter_raw_mode(&mut self) -> Result<()> {
        Ok(())
    }

    async fn exit_raw_mode(&mut self) -> Result<()> {
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.socket
            .flush()
            .await
            .map_err(|e| CathodeError::Adapter(format!("websocket flush failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presentation() -> WebSocketPresentation<tokio::io::DuplexStream> {
        // The socket itself is irrelevant for control-message parsing.
        let (a, _b) = tokio::io::duplex(64);
        let socket = WebSocketStream::from_raw_socket(
            a,
            tokio_tungstenite::tungstenite::protocol::Role::Server,
            None,
        );
        let socket = futures::executor::block_on(socket);
        WebSocketPresentation::new(socket, Size::new(80, 24), Capabilities::default())
    }

    #[test]
    fn parses_legacy_and_json_resizes() {
        let p = presentation();
        assert_eq!(
            p.parse_control("resize:100,30"),
            Some((Size::new(100, 30), None))
        );
        assert_eq!(
            p.parse_control(r#"{"type":"resize","cols":90,"rows":25,"cellWidth":8.5,"cellHeight":17.0}"#),
            Some((Size::new(90, 25), Some((8.5, 17.0))))
        );
    }

    #[test]
    fn invalid_resizes_are_ignored() {
        let p = presentation();
        assert_eq!(p.parse_control("resize:0,30"), None);
        assert_eq!(p.parse_control("resize:abc"), None);
        assert_eq!(p.parse_control(r#"{"type":"resize","cols":0,"rows":5}"#), None);
        assert_eq!(p.parse_control(r#"{"type":"noise"}"#), None);
    }
}

use std::io::Write;

use async_trait::async_trait;
use cathode_common::error::{CathodeError, Result};
use cathode_common::traits::{Presentation, PresentationInput};
use cathode_common::types::{Capabilities, Size};
use tokio::io::AsyncReadExt;
use tracing::debug;

/// The process's own terminal as the presentation: raw stdin bytes in,
/// stdout bytes out, crossterm for raw mode and size probing.
pub struct TtyPresentation {
    size: Size,
    capabilities: Capabilities,
    stdin: tokio::io::Stdin,
    #[cfg(unix)]
    winch: tokio::signal::unix::Signal,
}

impl TtyPresentation {
    pub fn new() -> Result<Self> {
        let (width, height) = crossterm::terminal::size().unwrap_or((80, 24));
        Ok(Self {
            size: Size::new(width.max(1), height.max(1)),
            capabilities: Capabilities::default(),
            stdin: tokio::io::stdin(),
            #[cfg(unix)]
            winch: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::window_change())
                .map_err(CathodeError::Io)?,
        })
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

#[async_trait]
impl Presentation for TtyPresentation {
    fn size(&self) -> Size {
        self.size
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn write_output(&mut self, bytes: &[u8]) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(bytes)?;
        Ok(())
    }

    async fn read_input(&mut self) -> Result<PresentationInput> {
        let mut buf = vec![0u8; 1024];
        #[cfg(unix)]
        {
            tokio::select! {
                read = self.stdin.read(&mut buf) => {
                    let n = read?;
                    buf.truncate(n);
                    Ok(PresentationInput::Bytes(buf))
                }
                _ = self.winch.recv() => {
                    let (width, height) = crossterm::terminal::size().unwrap_or((80, 24));
                    self.size = Size::new(width.max(1), height.max(1));
                    debug!(width, height, "terminal resized");
                    Ok(PresentationInput::Resized(self.size, None))
                }
            }
        }
        #[cfg(not(unix))]
        {
            let n = self.stdin.read(&mut buf).await?;
            buf.truncate(n);
            Ok(PresentationInput::Bytes(buf))
        }
    }

    async fn enter_raw_mode(&mut self) -> Result<()> {
        crossterm::terminal::enable_raw_mode().map_err(CathodeError::Io)
    }

    async fn exit_raw_mode(&mut self) -> Result<()> {
        crossterm::terminal::disable_raw_mode().map_err(CathodeError::Io)
    }

    async fn flush(&mut self) -> Result<()> {
        std::io::stdout().lock().flush()?;
        Ok(())
    }
}

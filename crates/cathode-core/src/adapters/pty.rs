use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cathode_common::error::{CathodeError, Result};
use cathode_common::traits::Workload;
use cathode_common::types::Size;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tracing::{debug, error, info};

/// A child process on a PTY, driven as a workload. Bytes pass through
/// untouched in both directions; EOF or child exit surfaces as an adapter
/// error (disconnect), never as a frame boundary.
pub struct PtyWorkload {
    master: Box<dyn MasterPty + Send>,
    reader: Arc<Mutex<Box<dyn Read + Send>>>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
}

impl PtyWorkload {
    /// Spawn `command` on a fresh PTY of the given size. Spawn failures
    /// come back as error values; the session then sees a disconnect.
    pub fn spawn(command: CommandBuilder, size: Size) -> Result<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: size.height,
                cols: size.width,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| CathodeError::Pty(format!("failed to open PTY: {e}")))?;

        let child = pair
            .slave
            .spawn_command(command)
            .map_err(|e| CathodeError::Pty(format!("failed to spawn child: {e}")))?;
        // Relinquish the slave to the child.
        drop(pair.slave);
        info!("PTY child spawned");

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| CathodeError::Pty(format!("failed to clone reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| CathodeError::Pty(format!("failed to take writer: {e}")))?;

        Ok(Self {
            master: pair.master,
            reader: Arc::new(Mutex::new(reader)),
            writer,
            child,
        })
    }

    /// Spawn the user's shell, like an ordinary terminal would.
    pub fn spawn_shell(size: Size) -> Result<Self> {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| {
            if cfg!(windows) {
                "cmd.exe".to_string()
            } else {
                "/bin/sh".to_string()
            }
        });
        let mut cmd = CommandBuilder::new(&shell);
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }
        Self::spawn(cmd, size)
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

#[async_trait]
impl Workload for PtyWorkload {
    async fn read_output(&mut self) -> Result<Vec<u8>> {
        let reader = Arc::clone(&self.reader);
        // The PTY read is blocking; hop to the blocking pool so the pump
        // loop stays responsive.
        let result = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; 4096];
            let mut guard = reader.lock().unwrap_or_else(|e| e.into_inner());
            guard.read(&mut buf).map(|n| {
                buf.truncate(n);
                buf
            })
        })
        .await
        .map_err(|e| CathodeError::Pty(format!("read task failed: {e}")))?;

        match result {
            Ok(buf) if buf.is_empty() => {
                debug!("PTY EOF");
                Err(CathodeError::Adapter("PTY child closed".into()))
            }
            Ok(buf) => Ok(buf),
            Err(e) => {
                error!(%e, "PTY read failed");
                Err(CathodeError::Adapter(format!("PTY read failed: {e}")))
            }
        }
    }

    async fn write_input(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .and_then(|()| self.writer.flush())
            .map_err(|e| CathodeError::Adapter(format!("PTY write failed: {e}")))
    }

    async fn resize(&mut self, size: Size) -> Result<()> {
        self.master
            .resize(PtySize {
                rows: size.height,
                cols: size.width,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| CathodeError::Pty(format!("failed to resize PTY: {e}")))
    }
}

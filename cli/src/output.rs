//! stdout 输出：命令结果与 `--events` 事件流（JSON lines）
use std::io::Write;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};

use mapstate_core::api::StateEvent;

/// Collects events from subscription time and writes them as JSON lines.
pub struct EventPrinter {
    rx: broadcast::Receiver<StateEvent>,
}

impl EventPrinter {
    pub fn new(rx: broadcast::Receiver<StateEvent>) -> Self {
        Self { rx }
    }

    /// Write every event received so far. Returns the number written.
    pub fn drain(&mut self, out: &mut impl Write) -> std::io::Result<usize> {
        let mut written = 0;
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    serde_json::to_writer(&mut *out, &event)?;
                    writeln!(out)?;
                    written += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged; events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        Ok(written)
    }
}

/// Pretty JSON of a command result.
pub fn print_json<T: Serialize>(value: &T) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)
}

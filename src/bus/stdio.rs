//! JSON-lines bus over stdin/stdout for running the relay standalone.
//! Each outbound line is `{"to": <address | "manager">, "message": {...}}`;
//! each inbound line is a message carrying a `type` field.

use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::{MessageBus, OutboundMessage};

/// Address used for messages to the manager
pub const MANAGER_ADDRESS: &str = "manager";

#[derive(Serialize)]
struct Envelope<'a> {
    to: &'a str,
    message: &'a OutboundMessage,
}

/// Bus writing outbound messages as JSON lines
pub struct StdioBus {
    lines: mpsc::UnboundedSender<String>,
}

impl StdioBus {
    /// Creates a bus writing to stdout, with the writer task that drains it.
    /// The task ends once every clone of the bus has been dropped.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        Self::spawn_with_writer(tokio::io::stdout())
    }

    pub fn spawn_with_writer<W>(writer: W) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (lines, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(Self::write_lines(writer, rx));
        (Self { lines }, handle)
    }

    async fn write_lines<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        while let Some(mut line) = rx.recv().await {
            line.push('\n');
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                error!("Failed to write bus message: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                error!("Failed to flush bus output: {}", e);
                break;
            }
        }
        debug!("Bus writer finished");
    }

    fn send(&self, to: &str, message: &OutboundMessage) {
        let line = match serde_json::to_string(&Envelope { to, message }) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize message for {}: {}", to, e);
                return;
            }
        };
        if self.lines.send(line).is_err() {
            warn!("Bus writer has stopped, dropping message for {}", to);
        }
    }
}

impl MessageBus for StdioBus {
    fn send_message(&self, address: &str, message: OutboundMessage) {
        self.send(address, &message);
    }

    fn send_manager_message(&self, message: OutboundMessage) {
        self.send(MANAGER_ADDRESS, &message);
    }
}

/// Reads JSON lines from stdin into `inbound` until end of input or cancellation.
/// End of input cancels `shutdown`.
pub async fn read_inbound(inbound: mpsc::Sender<Value>, shutdown: CancellationToken) {
    read_lines(tokio::io::stdin(), inbound, shutdown).await
}

pub async fn read_lines<R>(reader: R, inbound: mpsc::Sender<Value>, shutdown: CancellationToken)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown.cancelled() => return,
        };
        match line {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(line) {
                    Ok(value) => {
                        if inbound.send(value).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!("Ignoring bus input that is not JSON: {}", e),
                }
            }
            Ok(None) => {
                info!("Bus input closed");
                break;
            }
            Err(e) => {
                error!("Failed to read bus input: {}", e);
                break;
            }
        }
    }
    shutdown.cancel();
}

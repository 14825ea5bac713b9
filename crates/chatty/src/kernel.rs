//! Connection to an already running kernel.
//!
//! Kernel lifecycle is someone else's job: we take a connection file, make
//! sure the kernel answers its heartbeat, and bridge the iopub and shell
//! sockets onto the channels a [`SessionContext`](crate::session::SessionContext)
//! consumes.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chatty_messages::{InboundMessage, OutboundRequest};
use jupyter_protocol::{ConnectionInfo, JupyterMessage};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::dump::DumpWriter;
use crate::session::{KernelHandle, KernelReady};

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub session_name: String,
    pub channel_capacity: usize,
    pub heartbeat_timeout: Duration,
    pub dump: Option<DumpWriter>,
}

/// Consecutive failed iopub reads after which the socket is treated as gone.
pub const MAX_CONSECUTIVE_READ_ERRORS: usize = 32;

/// What the iopub loop does with one read result.
#[derive(Debug)]
pub enum ReadStep {
    Forward(InboundMessage),
    Skip,
    Stop,
}

/// Per-read decisions of the iopub bridge.
///
/// A read can fail because the kernel sent content the typed decoder does
/// not know, such as a custom `msg_type`. Those failures are skipped. Only a
/// run of [`MAX_CONSECUTIVE_READ_ERRORS`] failures in a row stops the reader.
#[derive(Debug)]
pub struct IopubReader {
    kernel_id: String,
    dump: Option<DumpWriter>,
    consecutive_errors: usize,
}

impl IopubReader {
    pub fn new(kernel_id: impl Into<String>, dump: Option<DumpWriter>) -> Self {
        Self {
            kernel_id: kernel_id.into(),
            dump,
            consecutive_errors: 0,
        }
    }

    pub fn on_read<E: std::fmt::Display>(&mut self, result: Result<JupyterMessage, E>) -> ReadStep {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                self.consecutive_errors += 1;
                let error = e.to_string();
                warn!(
                    "[kernel] iopub read failed for {} ({} in a row): {}",
                    self.kernel_id, self.consecutive_errors, error
                );
                if let Some(ref dump) = self.dump {
                    dump.read_error("iopub", &error);
                }
                if self.consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    error!(
                        "[kernel] Giving up on iopub for {} after {} failed reads",
                        self.kernel_id, self.consecutive_errors
                    );
                    return ReadStep::Stop;
                }
                return ReadStep::Skip;
            }
        };
        self.consecutive_errors = 0;

        let inbound = match InboundMessage::try_from(&message) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(
                    "[kernel] Skipping iopub {}: {}",
                    message.header.msg_type, e
                );
                return ReadStep::Skip;
            }
        };

        if let Some(ref dump) = self.dump {
            dump.inbound(&inbound);
        }
        ReadStep::Forward(inbound)
    }
}

/// `kernel-1234.json` → `1234`. Files without the prefix keep their stem.
pub fn kernel_id_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("kernel");
    stem.strip_prefix("kernel-").unwrap_or(stem).to_string()
}

/// Check if a kernel is alive by sending a heartbeat ping.
pub async fn check_kernel_heartbeat(connection_info: &ConnectionInfo, timeout: Duration) -> bool {
    let heartbeat_result = tokio::time::timeout(timeout, async {
        let mut hb = runtimelib::create_client_heartbeat_connection(connection_info).await?;
        hb.single_heartbeat().await
    })
    .await;

    matches!(heartbeat_result, Ok(Ok(())))
}

/// Connect to the kernel described by `connection_file`.
pub async fn connect(connection_file: &Path, options: ConnectOptions) -> Result<KernelReady> {
    let content = tokio::fs::read_to_string(connection_file).await?;
    let connection_info = serde_json::from_str::<ConnectionInfo>(&content)?;
    let kernel_id = kernel_id_from_path(connection_file);

    // ZeroMQ connections don't fail fast on a dead kernel
    if !check_kernel_heartbeat(&connection_info, options.heartbeat_timeout).await {
        anyhow::bail!(
            "Kernel {} is not responding (heartbeat failed). The connection file may be stale.",
            kernel_id
        );
    }

    let socket_session = format!("chatty-{}", uuid::Uuid::new_v4());

    let mut iopub =
        runtimelib::create_client_iopub_connection(&connection_info, "", &socket_session).await?;

    let identity = runtimelib::peer_identity_for_session(&socket_session)?;
    let shell = runtimelib::create_client_shell_connection_with_identity(
        &connection_info,
        &socket_session,
        identity,
    )
    .await?;
    let (mut shell_writer, mut shell_reader) = shell.split();

    let (shell_tx, mut shell_rx) = mpsc::channel::<OutboundRequest>(options.channel_capacity);
    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(options.channel_capacity);

    let dump = options.dump.clone();
    tokio::spawn(async move {
        while let Some(request) = shell_rx.recv().await {
            if let Some(ref dump) = dump {
                dump.outbound(&request);
            }
            let message = match JupyterMessage::try_from(&request) {
                Ok(message) => message,
                Err(e) => {
                    error!("[kernel] Failed to encode {}: {}", request.msg_id, e);
                    continue;
                }
            };
            if let Err(e) = shell_writer.send(message).await {
                error!("[kernel] Failed to send {}: {}", request.msg_id, e);
            }
        }
        debug!("[kernel] Shell writer stopped");
    });

    tokio::spawn(async move {
        while let Ok(message) = shell_reader.read().await {
            debug!(
                "[kernel] shell reply: type={} parent={:?}",
                message.header.msg_type,
                message.parent_header.as_ref().map(|h| &h.msg_id)
            );
        }
    });

    let mut reader = IopubReader::new(kernel_id.clone(), options.dump);
    tokio::spawn(async move {
        loop {
            match reader.on_read(iopub.read().await) {
                ReadStep::Forward(inbound) => {
                    if inbound_tx.send(inbound).await.is_err() {
                        debug!("[kernel] Inbound receiver dropped, stopping iopub reader");
                        break;
                    }
                }
                ReadStep::Skip => continue,
                ReadStep::Stop => break,
            }
        }
    });

    info!(
        "[kernel] Connected to kernel {} as {}",
        kernel_id, options.session_name
    );

    Ok(KernelReady {
        handle: KernelHandle::new(kernel_id, shell_tx),
        inbound: inbound_rx,
    })
}

/// Connect in the background and signal the outcome through a oneshot.
///
/// A failed connect sends the error itself so the session can report the
/// real cause.
pub fn spawn_connect(
    connection_file: &Path,
    options: ConnectOptions,
) -> oneshot::Receiver<Result<KernelReady>> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let connection_file = connection_file.to_path_buf();
    tokio::spawn(async move {
        let result = connect(&connection_file, options).await.map_err(|e| {
            error!(
                "[kernel] Failed to connect via {}: {}",
                connection_file.display(),
                e
            );
            e.context(format!("connecting via {}", connection_file.display()))
        });
        if ready_tx.send(result).is_err() {
            debug!("[kernel] Session went away before the kernel was ready");
        }
    });
    ready_rx
}

//! Session context: one document bound to at most one kernel.
//!
//! The kernel connection is established elsewhere and announced through a
//! oneshot carrying either a [`KernelReady`] or the reason connecting failed. Once it arrives the session spawns a single
//! router task that drains the inbound channel in delivery order.

use std::sync::{Arc, Mutex};

use chatty_messages::{InboundMessage, OutboundPayload, OutboundRequest};
use log::{error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::builder::MessageBuilder;
use crate::dispatch::{DispatchError, DispatchOutcome};
use crate::notebook_state::NotebookState;
use crate::preview::PreviewPane;
use crate::router::MessageRouter;

/// Sending half of a live kernel connection.
#[derive(Debug, Clone)]
pub struct KernelHandle {
    kernel_id: String,
    shell_tx: mpsc::Sender<OutboundRequest>,
}

impl KernelHandle {
    pub fn new(kernel_id: impl Into<String>, shell_tx: mpsc::Sender<OutboundRequest>) -> Self {
        Self {
            kernel_id: kernel_id.into(),
            shell_tx,
        }
    }

    pub fn kernel_id(&self) -> &str {
        &self.kernel_id
    }

    /// Queue a request for the shell channel without waiting.
    pub fn send_shell(&self, request: OutboundRequest) -> Result<(), DispatchError> {
        self.shell_tx
            .try_send(request)
            .map_err(|e| DispatchError::Transport(e.to_string()))
    }
}

/// Delivered once the kernel is reachable.
pub struct KernelReady {
    pub handle: KernelHandle,
    pub inbound: mpsc::Receiver<InboundMessage>,
}

pub struct SessionContext {
    name: String,
    builder: MessageBuilder,
    notebook: Arc<Mutex<NotebookState>>,
    preview: Arc<Mutex<PreviewPane>>,
    kernel: Option<KernelHandle>,
    router_task: Option<JoinHandle<()>>,
}

impl SessionContext {
    pub fn new(name: impl Into<String>, notebook: NotebookState, preview: PreviewPane) -> Self {
        Self {
            name: name.into(),
            builder: MessageBuilder::new(),
            notebook: Arc::new(Mutex::new(notebook)),
            preview: Arc::new(Mutex::new(preview)),
            kernel: None,
            router_task: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn notebook(&self) -> Arc<Mutex<NotebookState>> {
        self.notebook.clone()
    }

    pub fn preview(&self) -> Arc<Mutex<PreviewPane>> {
        self.preview.clone()
    }

    pub fn kernel(&self) -> Option<&KernelHandle> {
        self.kernel.as_ref()
    }

    pub fn router(&self) -> MessageRouter {
        MessageRouter::new(self.notebook.clone(), self.preview.clone())
    }

    pub fn is_subscribed(&self) -> bool {
        self.router_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Wait for the kernel to come up, then attach to it.
    ///
    /// A failed connect is returned as-is so the caller sees the real cause.
    pub async fn wait_ready(
        &mut self,
        ready: oneshot::Receiver<anyhow::Result<KernelReady>>,
    ) -> anyhow::Result<()> {
        let ready = ready
            .await
            .map_err(|_| anyhow::anyhow!("kernel connection dropped before it was ready"))??;
        self.attach(ready);
        Ok(())
    }

    /// Bind a ready kernel and start routing its inbound stream.
    ///
    /// Any previous subscription is aborted first. Must be called from
    /// within a tokio runtime.
    pub fn attach(&mut self, ready: KernelReady) {
        let KernelReady { handle, mut inbound } = ready;

        if let Some(task) = self.router_task.take() {
            info!("[session] Replacing subscription for {}", self.name);
            task.abort();
        }

        info!(
            "[session] {} attached to kernel {}",
            self.name,
            handle.kernel_id()
        );
        self.kernel = Some(handle);

        let router = self.router();
        let session_name = self.name.clone();
        self.router_task = Some(tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                router.route(&message);
            }
            info!("[session] Inbound stream for {} closed", session_name);
        }));
    }

    /// Build and send `payload` to the attached kernel.
    ///
    /// Without a kernel nothing is built or sent.
    pub fn send(&self, payload: &OutboundPayload) -> Result<DispatchOutcome, DispatchError> {
        let Some(kernel) = &self.kernel else {
            info!(
                "[dispatch] No kernel attached, skipping {}",
                payload.msg_type()
            );
            return Ok(DispatchOutcome::NoKernel);
        };

        let request = self.builder.build(&self.name, payload, kernel.kernel_id())?;
        let msg_id = request.msg_id.clone();
        if let Err(e) = kernel.send_shell(request) {
            error!("[dispatch] Failed to send {}: {}", msg_id, e);
            return Err(e);
        }

        info!("[dispatch] Sent {} msg_id={}", payload.msg_type(), msg_id);
        Ok(DispatchOutcome::Sent { msg_id })
    }

    /// Wait for the router task to finish draining the inbound stream.
    ///
    /// Returns once the sending side of the inbound channel is closed.
    pub async fn join_router(&mut self) {
        if let Some(task) = self.router_task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("[session] Router task for {} failed: {}", self.name, e);
                }
            }
        }
    }

    /// Unsubscribe from the inbound stream and detach the kernel.
    pub fn teardown(&mut self) {
        if let Some(task) = self.router_task.take() {
            task.abort();
        }
        if let Some(kernel) = self.kernel.take() {
            info!(
                "[session] {} detached from kernel {}",
                self.name,
                kernel.kernel_id()
            );
        }
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        if let Some(task) = self.router_task.take() {
            task.abort();
        }
    }
}

//! Inbound message routing.
//!
//! Every message read from the kernel's iopub stream passes through
//! [`MessageRouter::route`]. Classification depends only on the message's
//! own `msg_type` and its parent's `msg_type`; the first matching rule wins:
//!
//! | msg_type       | parent          | reaction                         |
//! |----------------|-----------------|----------------------------------|
//! | `status`       | any             | ignored                          |
//! | `stream`       | `llm_request`   | markdown cell `{id}-text`        |
//! | `llm_response` | any             | markdown cell `{id}-text`        |
//! | `dataset`      | any             | preview pane update              |
//! | `code_cell`    | any             | code cell `{id}-code`            |
//! | anything else  |                 | logged, no document change       |
//!
//! A message that cannot be handled is logged and dropped. The caller keeps
//! reading the stream either way.

use std::sync::{Arc, Mutex};

use chatty_messages::{InboundMessage, KernelMessage, OutboundType, PayloadError, PreviewPayload};
use log::{debug, info, warn};

use crate::notebook_state::{CellType, NotebookState};
use crate::preview::PreviewPane;

/// A cell the router wants appended to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellInsertion {
    pub id: String,
    pub cell_type: CellType,
    pub source: String,
}

impl CellInsertion {
    fn text(message_id: &str, text: String) -> Self {
        Self {
            id: format!("{}-text", message_id),
            cell_type: CellType::Markdown,
            source: text,
        }
    }

    fn code(message_id: &str, code: String) -> Self {
        Self {
            id: format!("{}-code", message_id),
            cell_type: CellType::Code,
            source: code,
        }
    }
}

/// What a message asks of the frontend.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    Ignore,
    InsertCell(CellInsertion),
    Preview(PreviewPayload),
    Unhandled,
}

/// What routing a single message actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Ignored,
    CellInserted { id: String },
    PreviewUpdated,
    Unhandled { msg_type: String },
    Dropped { reason: String },
}

/// Decide the reaction to `message` without touching any state.
pub fn classify(message: &InboundMessage) -> Result<Reaction, PayloadError> {
    if message.msg_type == "status" {
        return Ok(Reaction::Ignore);
    }

    if message.msg_type == "stream"
        && message.parent_msg_type() != Some(OutboundType::LlmRequest.as_str())
    {
        return Ok(Reaction::Unhandled);
    }

    let reaction = match message.payload()? {
        KernelMessage::Stream { text, .. } | KernelMessage::LlmResponse { text } => {
            Reaction::InsertCell(CellInsertion::text(&message.id, text))
        }
        KernelMessage::Dataset(preview) => Reaction::Preview(preview),
        KernelMessage::CodeCell { code, .. } => {
            Reaction::InsertCell(CellInsertion::code(&message.id, code))
        }
        KernelMessage::Status { .. } => Reaction::Ignore,
        KernelMessage::Unrecognized { .. } => Reaction::Unhandled,
    };

    Ok(reaction)
}

/// Applies reactions to one session's document and preview pane.
#[derive(Clone)]
pub struct MessageRouter {
    notebook: Arc<Mutex<NotebookState>>,
    preview: Arc<Mutex<PreviewPane>>,
}

impl MessageRouter {
    pub fn new(notebook: Arc<Mutex<NotebookState>>, preview: Arc<Mutex<PreviewPane>>) -> Self {
        Self { notebook, preview }
    }

    pub fn route(&self, message: &InboundMessage) -> RouteOutcome {
        debug!(
            "[router] inbound: type={} id={} parent={:?}",
            message.msg_type,
            message.id,
            message.parent_msg_type()
        );

        let reaction = match classify(message) {
            Ok(reaction) => reaction,
            Err(e) => {
                warn!("[router] Dropping message {}: {}", message.id, e);
                return RouteOutcome::Dropped {
                    reason: e.to_string(),
                };
            }
        };

        match reaction {
            Reaction::Ignore => RouteOutcome::Ignored,
            Reaction::InsertCell(insertion) => self.insert(insertion),
            Reaction::Preview(payload) => self.show_preview(&payload),
            Reaction::Unhandled => {
                debug!(
                    "[router] No handler for type={} id={}",
                    message.msg_type, message.id
                );
                RouteOutcome::Unhandled {
                    msg_type: message.msg_type.clone(),
                }
            }
        }
    }

    fn insert(&self, insertion: CellInsertion) -> RouteOutcome {
        let Ok(mut notebook) = self.notebook.lock() else {
            warn!("[router] Notebook lock poisoned, dropping {}", insertion.id);
            return RouteOutcome::Dropped {
                reason: "notebook lock poisoned".to_string(),
            };
        };

        match notebook.insert_cell(&insertion.id, insertion.cell_type, &insertion.source) {
            Ok(()) => {
                info!(
                    "[router] Inserted {} cell {}",
                    insertion.cell_type, insertion.id
                );
                RouteOutcome::CellInserted { id: insertion.id }
            }
            Err(e) => {
                warn!("[router] {}", e);
                RouteOutcome::Dropped {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn show_preview(&self, payload: &PreviewPayload) -> RouteOutcome {
        let Ok(mut preview) = self.preview.lock() else {
            warn!("[router] Preview lock poisoned, dropping dataset");
            return RouteOutcome::Dropped {
                reason: "preview lock poisoned".to_string(),
            };
        };

        preview.show(payload);
        info!(
            "[router] Preview updated: {} rows ({})",
            payload.csv.len(),
            payload.name.as_deref().unwrap_or("unnamed")
        );
        RouteOutcome::PreviewUpdated
    }
}

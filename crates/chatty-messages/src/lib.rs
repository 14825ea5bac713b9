//! Message types for the chatty LLM kernel protocol.
//!
//! The LLM kernel speaks a small extension of the Jupyter protocol: the
//! frontend sends `llm_request` and `context_setup_request` on the shell
//! channel, and the kernel answers on iopub with `llm_response`,
//! `code_cell` and `dataset` messages alongside the usual `status` and
//! `stream` chatter.
//!
//! # Features
//!
//! - Outbound request envelope with correlation ids
//! - Inbound envelope accepting both the flat frontend shape and full Jupyter messages
//! - Typed payload union, one variant per recognized `msg_type`
//! - Conversion to/from `jupyter_protocol::JupyterMessage`

mod content;
mod envelope;
mod jupyter;

pub use content::{
    ContextSetupRequest, KernelMessage, LlmRequest, OutboundPayload, PayloadError, PreviewPayload,
};
pub use envelope::{InboundMessage, OutboundRequest, OutboundType, ParentHeader};
pub use jupyter::{ConversionError, RawJupyterMessage};

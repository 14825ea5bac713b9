//! Bridging between chatty envelopes and `jupyter_protocol` messages.

use chrono::{SecondsFormat, Utc};
use jupyter_protocol::{Channel, Header, JupyterMessage, JupyterMessageContent};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::envelope::{InboundMessage, OutboundRequest, ParentHeader};

/// Jupyter wire protocol version stamped on outbound headers.
const PROTOCOL_VERSION: &str = "5.3";

/// Error type for message conversion failures.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Failed to parse message content: {0}")]
    ContentParseError(#[from] anyhow::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A full Jupyter wire message as it appears in JSON.
///
/// `content` stays raw; chatty decodes it by `msg_type` later.
/// `parent_header` may be empty `{}`, `null`, or a valid header.
#[derive(Debug, Clone, Deserialize)]
pub struct RawJupyterMessage {
    pub header: Header,

    #[serde(
        default,
        deserialize_with = "jupyter_protocol::deserialize_parent_header"
    )]
    pub parent_header: Option<Header>,

    #[serde(default)]
    pub metadata: Value,

    pub content: Value,
}

impl From<RawJupyterMessage> for InboundMessage {
    fn from(raw: RawJupyterMessage) -> Self {
        InboundMessage {
            msg_type: raw.header.msg_type,
            id: raw.header.msg_id,
            parent_header: raw.parent_header.map(parent_from_header),
            content: raw.content,
        }
    }
}

fn parent_from_header(header: Header) -> ParentHeader {
    ParentHeader {
        msg_type: header.msg_type,
        msg_id: Some(header.msg_id),
    }
}

impl TryFrom<&JupyterMessage> for InboundMessage {
    type Error = ConversionError;

    fn try_from(message: &JupyterMessage) -> Result<Self, Self::Error> {
        Ok(InboundMessage {
            msg_type: message.header.msg_type.clone(),
            id: message.header.msg_id.clone(),
            parent_header: message.parent_header.clone().map(parent_from_header),
            content: serde_json::to_value(&message.content)?,
        })
    }
}

impl TryFrom<&OutboundRequest> for JupyterMessage {
    type Error = ConversionError;

    /// The correlation id becomes the header `msg_id` so the kernel echoes it
    /// back in the parent header of its replies.
    fn try_from(request: &OutboundRequest) -> Result<Self, Self::Error> {
        let header: Header = serde_json::from_value(json!({
            "msg_id": request.msg_id,
            "msg_type": request.msg_type.as_str(),
            "session": request.session,
            "username": "",
            "date": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "version": PROTOCOL_VERSION,
        }))?;

        let content =
            JupyterMessageContent::from_type_and_content(&header.msg_type, request.content.clone())?;

        Ok(JupyterMessage {
            zmq_identities: Vec::new(),
            header,
            parent_header: None,
            metadata: json!({}),
            content,
            buffers: Vec::new(),
            channel: Some(Channel::Shell),
        })
    }
}

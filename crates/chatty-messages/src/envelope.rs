//! Outbound and inbound message envelopes.

use jupyter_protocol::Channel;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::content::KernelMessage;
use crate::jupyter::{ConversionError, RawJupyterMessage};
use crate::PayloadError;

/// Message types the frontend is allowed to send to the LLM kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundType {
    LlmRequest,
    ContextSetupRequest,
}

impl OutboundType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboundType::LlmRequest => "llm_request",
            OutboundType::ContextSetupRequest => "context_setup_request",
        }
    }

    /// Suffix appended to the kernel id when deriving correlation ids.
    pub fn purpose(&self) -> &'static str {
        match self {
            OutboundType::LlmRequest => "query",
            OutboundType::ContextSetupRequest => "setcontext",
        }
    }
}

impl std::fmt::Display for OutboundType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request bound for the kernel's shell channel.
///
/// Serializes to the frontend's message options shape:
/// `{session, channel: "shell", content, msgType, msgId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRequest {
    pub session: String,
    pub channel: Channel,
    pub content: Value,
    pub msg_type: OutboundType,
    pub msg_id: String,
}

/// The part of a reply's parent header the router cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentHeader {
    #[serde(default)]
    pub msg_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
}

/// A message received from the kernel's iopub stream.
///
/// `parent_header` may arrive as `{}`, `null`, or be missing entirely;
/// all three mean "not a reply".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub msg_type: String,
    pub id: String,
    #[serde(
        default,
        deserialize_with = "deserialize_parent_header",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_header: Option<ParentHeader>,
    #[serde(default)]
    pub content: Value,
}

impl InboundMessage {
    /// Parse either the flat envelope or a full Jupyter wire message.
    pub fn from_value(value: Value) -> Result<Self, ConversionError> {
        if value.get("header").is_some() {
            let raw: RawJupyterMessage = serde_json::from_value(value)?;
            Ok(raw.into())
        } else {
            Ok(serde_json::from_value(value)?)
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConversionError> {
        Self::from_value(serde_json::from_str(json)?)
    }

    /// The `msg_type` of the request this message answers, if any.
    pub fn parent_msg_type(&self) -> Option<&str> {
        self.parent_header.as_ref().map(|h| h.msg_type.as_str())
    }

    /// Decode the payload according to `msg_type`.
    pub fn payload(&self) -> Result<KernelMessage, PayloadError> {
        KernelMessage::parse(&self.msg_type, &self.content)
    }
}

fn deserialize_parent_header<'de, D>(deserializer: D) -> Result<Option<ParentHeader>, D::Error>
where
    D: Deserializer<'de>,
{
    let map: Option<serde_json::Map<String, Value>> = Option::deserialize(deserializer)?;
    match map {
        Some(map) if !map.is_empty() => serde_json::from_value(Value::Object(map))
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

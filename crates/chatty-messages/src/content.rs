//! Typed payloads, one per recognized `msg_type`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::envelope::OutboundType;

/// Raised when a recognized message type carries a payload without the
/// fields that type requires.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("malformed {msg_type} payload: {source}")]
    Malformed {
        msg_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Content of an `llm_request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub request: String,
}

/// Content of a `context_setup_request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSetupRequest {
    pub context: String,
    pub context_info: Value,
}

/// Anything the frontend can send to the kernel.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPayload {
    Query(LlmRequest),
    ContextSetup(ContextSetupRequest),
}

impl OutboundPayload {
    pub fn query(request: impl Into<String>) -> Self {
        OutboundPayload::Query(LlmRequest {
            request: request.into(),
        })
    }

    pub fn context_setup(context: impl Into<String>, context_info: Value) -> Self {
        OutboundPayload::ContextSetup(ContextSetupRequest {
            context: context.into(),
            context_info,
        })
    }

    pub fn msg_type(&self) -> OutboundType {
        match self {
            OutboundPayload::Query(_) => OutboundType::LlmRequest,
            OutboundPayload::ContextSetup(_) => OutboundType::ContextSetupRequest,
        }
    }

    pub fn to_content(&self) -> Result<Value, serde_json::Error> {
        match self {
            OutboundPayload::Query(request) => serde_json::to_value(request),
            OutboundPayload::ContextSetup(request) => serde_json::to_value(request),
        }
    }
}

/// Tabular preview sent by the kernel after a dataset context is loaded.
///
/// `csv` is a list of rows; the kernel puts the column names in the first
/// row. Non-string cells (numbers, booleans) are stringified, `null`
/// becomes the empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewPayload {
    #[serde(deserialize_with = "deserialize_rows")]
    pub csv: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<String>>,
}

impl PreviewPayload {
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            csv: rows,
            name: None,
            headers: None,
        }
    }
}

fn deserialize_rows<'de, D>(deserializer: D) -> Result<Vec<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows: Vec<Vec<Value>> = Vec::deserialize(deserializer)?;
    Ok(rows
        .into_iter()
        .map(|row| row.into_iter().map(cell_to_string).collect())
        .collect())
}

fn cell_to_string(cell: Value) -> String {
    match cell {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
struct StatusContent {
    #[serde(default)]
    execution_state: Option<String>,
}

#[derive(Deserialize)]
struct StreamContent {
    #[serde(default)]
    name: Option<String>,
    text: String,
}

#[derive(Deserialize)]
struct TextContent {
    text: String,
}

#[derive(Deserialize)]
struct CodeCellContent {
    code: String,
    #[serde(default)]
    language: Option<String>,
}

/// Inbound payload, decoded by `msg_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelMessage {
    Status {
        execution_state: Option<String>,
    },
    Stream {
        name: Option<String>,
        text: String,
    },
    LlmResponse {
        text: String,
    },
    Dataset(PreviewPayload),
    CodeCell {
        code: String,
        language: Option<String>,
    },
    /// Any type this frontend does not act on; the raw content is kept.
    Unrecognized {
        msg_type: String,
        content: Value,
    },
}

impl KernelMessage {
    pub fn parse(msg_type: &str, content: &Value) -> Result<Self, PayloadError> {
        let malformed = |source| PayloadError::Malformed {
            msg_type: msg_type.to_string(),
            source,
        };

        let message = match msg_type {
            "status" => {
                let status: StatusContent =
                    serde_json::from_value(content.clone()).map_err(malformed)?;
                KernelMessage::Status {
                    execution_state: status.execution_state,
                }
            }
            "stream" => {
                let stream: StreamContent =
                    serde_json::from_value(content.clone()).map_err(malformed)?;
                KernelMessage::Stream {
                    name: stream.name,
                    text: stream.text,
                }
            }
            "llm_response" => {
                let response: TextContent =
                    serde_json::from_value(content.clone()).map_err(malformed)?;
                KernelMessage::LlmResponse {
                    text: response.text,
                }
            }
            "dataset" => KernelMessage::Dataset(
                serde_json::from_value(content.clone()).map_err(malformed)?,
            ),
            "code_cell" => {
                let cell: CodeCellContent =
                    serde_json::from_value(content.clone()).map_err(malformed)?;
                KernelMessage::CodeCell {
                    code: cell.code,
                    language: cell.language,
                }
            }
            other => KernelMessage::Unrecognized {
                msg_type: other.to_string(),
                content: content.clone(),
            },
        };

        Ok(message)
    }

    pub fn msg_type(&self) -> &str {
        match self {
            KernelMessage::Status { .. } => "status",
            KernelMessage::Stream { .. } => "stream",
            KernelMessage::LlmResponse { .. } => "llm_response",
            KernelMessage::Dataset(_) => "dataset",
            KernelMessage::CodeCell { .. } => "code_cell",
            KernelMessage::Unrecognized { msg_type, .. } => msg_type,
        }
    }
}

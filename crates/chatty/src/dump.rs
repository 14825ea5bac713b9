//! JSON-lines transcript of kernel traffic, and replay of recorded traffic.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chatty_messages::{InboundMessage, OutboundRequest};
use chrono::Utc;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from the kernel.
    In,
    /// Sent to the kernel.
    Out,
}

/// One line of a dump file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpEntry {
    /// RFC 3339 timestamp with millisecond precision
    pub ts: String,
    pub dir: Direction,
    /// "shell" or "iopub"
    pub ch: String,
    pub msg: Value,
}

impl DumpEntry {
    fn new(dir: Direction, ch: &str, msg: Value) -> Self {
        Self {
            ts: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            dir,
            ch: ch.to_string(),
            msg,
        }
    }

    pub fn inbound(message: &InboundMessage) -> Result<Self, serde_json::Error> {
        Ok(Self::new(Direction::In, "iopub", serde_json::to_value(message)?))
    }

    pub fn outbound(request: &OutboundRequest) -> Result<Self, serde_json::Error> {
        Ok(Self::new(Direction::Out, "shell", serde_json::to_value(request)?))
    }

    /// A receive that failed before a message could be decoded.
    pub fn read_error(ch: &str, error: &str) -> Self {
        Self::new(Direction::In, ch, serde_json::json!({ "error": error }))
    }

    fn is_read_error(&self) -> bool {
        self.msg.get("msg_type").is_none() && self.msg.get("error").is_some()
    }
}

/// Appends entries to a dump file. Clones share the file.
#[derive(Clone)]
pub struct DumpWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl std::fmt::Debug for DumpWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DumpWriter")
    }
}

impl DumpWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Best effort: failures are logged, never returned.
    pub fn write(&self, entry: &DumpEntry) {
        let json = match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(e) => {
                warn!("[dump] Failed to encode entry: {}", e);
                return;
            }
        };
        if let Ok(mut f) = self.file.lock() {
            if let Err(e) = writeln!(f, "{}", json).and_then(|_| f.flush()) {
                warn!("[dump] Failed to write entry: {}", e);
            }
        }
    }

    pub fn inbound(&self, message: &InboundMessage) {
        match DumpEntry::inbound(message) {
            Ok(entry) => self.write(&entry),
            Err(e) => warn!("[dump] Failed to encode inbound {}: {}", message.id, e),
        }
    }

    pub fn outbound(&self, request: &OutboundRequest) {
        match DumpEntry::outbound(request) {
            Ok(entry) => self.write(&entry),
            Err(e) => warn!("[dump] Failed to encode outbound {}: {}", request.msg_id, e),
        }
    }

    pub fn read_error(&self, ch: &str, error: &str) {
        self.write(&DumpEntry::read_error(ch, error));
    }
}

/// Parse one replay line.
///
/// Accepts a dump entry (only `"in"` entries yield a message), a flat
/// inbound envelope, or a full Jupyter message. Blank lines and recorded
/// read errors yield `None`.
pub fn parse_replay_line(line: &str) -> Result<Option<InboundMessage>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(line)?;
    if value.get("dir").is_some() && value.get("msg").is_some() {
        let entry: DumpEntry = serde_json::from_value(value)?;
        if entry.dir == Direction::Out || entry.is_read_error() {
            return Ok(None);
        }
        return Ok(Some(InboundMessage::from_value(entry.msg)?));
    }

    Ok(Some(InboundMessage::from_value(value)?))
}

/// Read every inbound message from a replay file, skipping unreadable lines.
pub fn read_replay(path: &Path) -> Result<Vec<InboundMessage>> {
    let content = std::fs::read_to_string(path)?;
    let mut messages = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        match parse_replay_line(line) {
            Ok(Some(message)) => messages.push(message),
            Ok(None) => {}
            Err(e) => warn!("[dump] Skipping line {}: {}", lineno + 1, e),
        }
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatty_messages::OutboundType;
    use jupyter_protocol::Channel;
    use serde_json::json;

    #[test]
    fn test_parse_flat_envelope() {
        let msg = parse_replay_line(r#"{"msg_type": "status", "id": "s1", "content": {}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(msg.msg_type, "status");
    }

    #[test]
    fn test_parse_blank_line() {
        assert!(parse_replay_line("   ").unwrap().is_none());
    }

    #[test]
    fn test_parse_dump_entries() {
        let inbound = json!({
            "ts": "2025-01-01T00:00:00.000Z",
            "dir": "in",
            "ch": "iopub",
            "msg": {"msg_type": "code_cell", "id": "c1", "content": {"code": "x"}}
        });
        let msg = parse_replay_line(&inbound.to_string()).unwrap().unwrap();
        assert_eq!(msg.id, "c1");

        let outbound = json!({
            "ts": "2025-01-01T00:00:00.000Z",
            "dir": "out",
            "ch": "shell",
            "msg": {"session": "nb"}
        });
        assert!(parse_replay_line(&outbound.to_string()).unwrap().is_none());
    }

    #[test]
    fn test_writer_and_read_replay() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("dump.jsonl");
        let writer = DumpWriter::create(&path).unwrap();

        writer.outbound(&OutboundRequest {
            session: "nb".to_string(),
            channel: Channel::Shell,
            content: json!({"request": "hi"}),
            msg_type: OutboundType::LlmRequest,
            msg_id: "k1-query-1".to_string(),
        });
        writer.inbound(
            &InboundMessage::from_value(json!({
                "msg_type": "llm_response",
                "id": "r1",
                "content": {"text": "hello"}
            }))
            .unwrap(),
        );

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        let messages = read_replay(&path).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "r1");
        assert_eq!(messages[0].content["text"], "hello");
    }

    #[test]
    fn test_read_errors_are_recorded_and_skipped_on_replay() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("dump.jsonl");
        let writer = DumpWriter::create(&path).unwrap();

        writer.read_error("iopub", "unknown variant `llm_response`");
        writer.inbound(
            &InboundMessage::from_value(json!({
                "msg_type": "llm_response",
                "id": "r1",
                "content": {"text": "hello"}
            }))
            .unwrap(),
        );

        let content = std::fs::read_to_string(&path).unwrap();
        let first: DumpEntry = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(first.dir, Direction::In);
        assert_eq!(first.ch, "iopub");
        assert_eq!(first.msg["error"], "unknown variant `llm_response`");

        let messages = read_replay(&path).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "r1");
    }

    #[test]
    fn test_read_replay_skips_garbage() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("messages.jsonl");
        std::fs::write(
            &path,
            "not json\n{\"msg_type\": \"status\", \"id\": \"s1\"}\n",
        )
        .unwrap();

        let messages = read_replay(&path).unwrap();
        assert_eq!(messages.len(), 1);
    }
}

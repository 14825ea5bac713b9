//! Outbound request construction.
//!
//! Correlation ids take the form `{kernel_id}-{purpose}-{seq}`. The prefix
//! is stable for a kernel and purpose pair; `seq` counts sends of that
//! purpose starting at 1 so repeated sends stay distinguishable.

use std::sync::atomic::{AtomicU64, Ordering};

use chatty_messages::{OutboundPayload, OutboundRequest, OutboundType};
use jupyter_protocol::Channel;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no kernel attached")]
    MissingKernel,

    #[error("failed to encode {msg_type} content: {source}")]
    Encode {
        msg_type: OutboundType,
        #[source]
        source: serde_json::Error,
    },
}

/// Builds requests for one session. Sequence counters live here, so a
/// session should keep a single builder for its whole lifetime.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    query_seq: AtomicU64,
    context_seq: AtomicU64,
}

pub fn correlation_prefix(kernel_id: &str, msg_type: OutboundType) -> String {
    format!("{}-{}", kernel_id, msg_type.purpose())
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self, msg_type: OutboundType) -> u64 {
        let counter = match msg_type {
            OutboundType::LlmRequest => &self.query_seq,
            OutboundType::ContextSetupRequest => &self.context_seq,
        };
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn build(
        &self,
        session: &str,
        payload: &OutboundPayload,
        kernel_id: &str,
    ) -> Result<OutboundRequest, BuildError> {
        if kernel_id.is_empty() {
            return Err(BuildError::MissingKernel);
        }

        let msg_type = payload.msg_type();
        let content = payload
            .to_content()
            .map_err(|source| BuildError::Encode { msg_type, source })?;
        let seq = self.next_seq(msg_type);

        Ok(OutboundRequest {
            session: session.to_string(),
            channel: Channel::Shell,
            content,
            msg_type,
            msg_id: format!("{}-{}", correlation_prefix(kernel_id, msg_type), seq),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_query_request() {
        let builder = MessageBuilder::new();
        let request = builder
            .build("nb", &OutboundPayload::query("count rows"), "k1")
            .unwrap();

        assert_eq!(request.session, "nb");
        assert!(matches!(request.channel, Channel::Shell));
        assert_eq!(request.msg_type, OutboundType::LlmRequest);
        assert_eq!(request.content, json!({"request": "count rows"}));
        assert_eq!(request.msg_id, "k1-query-1");
    }

    #[test]
    fn test_build_context_request() {
        let builder = MessageBuilder::new();
        let payload = OutboundPayload::context_setup("dataset", json!({"id": "abc"}));
        let request = builder.build("nb", &payload, "k1").unwrap();

        assert_eq!(request.msg_type, OutboundType::ContextSetupRequest);
        assert_eq!(request.msg_id, "k1-setcontext-1");
        assert_eq!(
            request.content,
            json!({"context": "dataset", "context_info": {"id": "abc"}})
        );
    }

    #[test]
    fn test_sequence_is_per_purpose() {
        let builder = MessageBuilder::new();
        let query = OutboundPayload::query("a");
        let context = OutboundPayload::context_setup("dataset", json!({}));

        let ids: Vec<String> = [&query, &query, &context, &query]
            .into_iter()
            .map(|p| builder.build("nb", p, "k9").unwrap().msg_id)
            .collect();

        assert_eq!(
            ids,
            vec!["k9-query-1", "k9-query-2", "k9-setcontext-1", "k9-query-3"]
        );
    }

    #[test]
    fn test_repeated_sends_share_prefix() {
        let builder = MessageBuilder::new();
        let prefix = correlation_prefix("k2", OutboundType::LlmRequest);

        let first = builder.build("nb", &OutboundPayload::query("x"), "k2").unwrap();
        let second = builder.build("nb", &OutboundPayload::query("x"), "k2").unwrap();

        assert!(first.msg_id.starts_with(&prefix));
        assert!(second.msg_id.starts_with(&prefix));
        assert_ne!(first.msg_id, second.msg_id);
    }

    #[test]
    fn test_build_without_kernel_fails() {
        let builder = MessageBuilder::new();
        let result = builder.build("nb", &OutboundPayload::query("x"), "");

        assert!(matches!(result, Err(BuildError::MissingKernel)));

        // A rejected build does not consume a sequence number.
        let request = builder.build("nb", &OutboundPayload::query("x"), "k1").unwrap();
        assert_eq!(request.msg_id, "k1-query-1");
    }
}

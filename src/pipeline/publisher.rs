//! Result publisher: verdict in, outbound envelope onto the bus.

use std::sync::Arc;

use tracing::{error, info};

use crate::bus::Topic;
use crate::envelope::{InboundEnvelope, OutboundEnvelope, Verdict, to_wire};

pub struct ResultPublisher {
    topic: Arc<dyn Topic>,
}

impl ResultPublisher {
    pub fn new(topic: Arc<dyn Topic>) -> Self {
        Self { topic }
    }

    /// Publish `verdict` as the answer to `inbound`.
    ///
    /// Transport errors are logged and swallowed; returns whether the bus
    /// accepted the message. No retry happens here.
    pub async fn publish(&self, verdict: &Verdict, inbound: &InboundEnvelope) -> bool {
        let outbound = OutboundEnvelope::from_verdict(inbound, verdict);
        let body = to_wire(&outbound);

        match self.topic.publish(body).await {
            Ok(()) => {
                info!(
                    message_id = %outbound.message_id,
                    topic = self.topic.name(),
                    success = outbound.success,
                    "Published validation result"
                );
                true
            }
            Err(e) => {
                error!(
                    message_id = %outbound.message_id,
                    topic = self.topic.name(),
                    error = %e,
                    "Failed to publish validation result"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryTopic;
    use crate::envelope::parse_value;
    use serde_json::json;

    fn inbound() -> InboundEnvelope {
        parse_value(json!({
            "messageId": "abc",
            "messageType": "osw-upload",
            "data": {
                "file_upload_path": "https://host/osw/a.zip",
                "user_id": "u",
                "tdei_project_group_id": "pg"
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn publishes_wire_form() {
        let topic = Arc::new(MemoryTopic::new("validation"));
        let publisher = ResultPublisher::new(topic.clone());

        assert!(publisher.publish(&Verdict::valid(), &inbound()).await);
        let published = topic.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0]["messageId"], "abc");
        assert_eq!(published[0]["data"]["success"], true);
        assert_eq!(published[0]["data"]["message"], "");
        assert_eq!(published[0]["data"]["tdei_project_group_id"], "pg");
        assert_eq!(published[0]["data"]["stage"], "osw-validation");
    }

    #[tokio::test]
    async fn transport_failure_is_swallowed() {
        let topic = Arc::new(MemoryTopic::new("validation"));
        topic.set_failing(true);
        let publisher = ResultPublisher::new(topic.clone());

        assert!(!publisher.publish(&Verdict::failure("x"), &inbound()).await);
        assert_eq!(topic.attempts(), 1);
        assert!(topic.published().is_empty());
    }
}

//! Fire-and-forget notifications about publish outcomes

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum PostEvent {
    #[serde(rename_all = "camelCase")]
    PostSuccess {
        social_post_id: i64,
        external_post_id: String,
    },
    #[serde(rename_all = "camelCase")]
    PostFailed { social_post_id: i64, error: String },
}

/// Broadcast channel observers can subscribe to. Slow observers drop events.
#[derive(Clone)]
pub struct PostEvents {
    tx: broadcast::Sender<PostEvent>,
}

impl PostEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PostEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: PostEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

impl Default for PostEvents {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers() {
        let events = PostEvents::default();
        events.emit(PostEvent::PostFailed {
            social_post_id: 1,
            error: "nobody listening".to_string(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let events = PostEvents::default();
        let mut rx = events.subscribe();

        events.emit(PostEvent::PostSuccess {
            social_post_id: 4,
            external_post_id: "urn:li:share:4".to_string(),
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            PostEvent::PostSuccess {
                social_post_id: 4,
                external_post_id: "urn:li:share:4".to_string(),
            }
        );
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(PostEvent::PostFailed {
            social_post_id: 9,
            error: "Unauthorized".to_string(),
        })
        .unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "event": "post-failed",
                "socialPostId": 9,
                "error": "Unauthorized"
            })
        );
    }
}

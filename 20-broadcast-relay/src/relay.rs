use std::sync::Arc;

use tracing::debug;

use crate::{
    protocol::ChatLine,
    registry::{Delivery, Registry, SessionId, Sink},
};

/// Turns session events into broadcasts over the shared [`Registry`].
///
/// Every broadcast goes to the full snapshot, sender included.
#[derive(Debug, Clone, Default)]
pub struct Relay {
    registry: Arc<Registry>,
}

impl Relay {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub async fn register(&self, id: SessionId, sink: Sink) -> bool {
        self.registry.register(id, sink).await
    }

    pub async fn deregister(&self, id: SessionId) -> bool {
        self.registry.deregister(id).await
    }

    pub async fn announce_join(&self, name: &str) -> Delivery {
        self.send(ChatLine::Joined { name }).await
    }

    pub async fn relay_message(&self, name: &str, content: &str) -> Delivery {
        self.send(ChatLine::Message { name, content }).await
    }

    pub async fn announce_leave(&self, name: &str) -> Delivery {
        self.send(ChatLine::Left { name }).await
    }

    async fn send(&self, line: ChatLine<'_>) -> Delivery {
        let payload = line.to_string();
        let outcome = self.registry.broadcast(&payload).await;
        debug!(
            delivered = outcome.delivered,
            failed = outcome.failed,
            "relayed line"
        );
        outcome
    }
}

//! Delivery seam for wrapped messages. Production wires an SMTP or HISP
//! gateway here; tests record deliveries in memory.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Result;

#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Hand one wrapped message to a single recipient.
    async fn deliver(&self, from: &str, to: &str, message: &str, message_id: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub from: String,
    pub to: String,
    pub message: String,
    pub message_id: String,
}

#[derive(Default)]
pub struct MemoryTransport {
    deliveries: RwLock<Vec<Delivery>>,
}

impl MemoryTransport {
    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.read().await.clone()
    }
}

#[async_trait]
impl MessageTransport for MemoryTransport {
    async fn deliver(&self, from: &str, to: &str, message: &str, message_id: &str) -> Result<()> {
        self.deliveries.write().await.push(Delivery {
            from: from.to_string(),
            to: to.to_string(),
            message: message.to_string(),
            message_id: message_id.to_string(),
        });
        Ok(())
    }
}

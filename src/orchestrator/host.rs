//! Boundary to the front-end that owns the interactive elements.

use crate::error::HostError;
use crate::model::AffordanceRef;
use async_trait::async_trait;

#[async_trait]
pub trait AffordanceHost: Send + Sync {
    /// Create the element a new session will be bound to.
    async fn create_affordance(&self) -> Result<AffordanceRef, HostError>;

    /// Whether the element still exists and can be re-bound after a restart.
    async fn is_attached(&self, affordance: &AffordanceRef) -> bool;
}

/// Host for the terminal front-end: one surface, identified by `surface_id`.
/// Elements are numbered randomly; elements on other surfaces are not ours.
pub struct TerminalHost {
    surface_id: u64,
}

impl TerminalHost {
    pub fn new(surface_id: u64) -> Self {
        Self { surface_id }
    }
}

#[async_trait]
impl AffordanceHost for TerminalHost {
    async fn create_affordance(&self) -> Result<AffordanceRef, HostError> {
        Ok(AffordanceRef {
            channel_id: self.surface_id,
            message_id: gen_element_id(),
        })
    }

    async fn is_attached(&self, affordance: &AffordanceRef) -> bool {
        affordance.channel_id == self.surface_id
    }
}

fn gen_element_id() -> u64 {
    use rand::RngCore;
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    u64::from_le_bytes(b)
}

//! Checkpoint storage for the subscription loop
//!
//! Tracks the next global position to read from, so a restarted shovel
//! resumes where it left off. Durable backends are a transport concern;
//! this module defines the contract and the in-memory implementation.

use async_trait::async_trait;
use evs_gateway_core::prelude::*;
use tokio::sync::RwLock;

/// Checkpoint storage contract
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the last saved position, or the start of the store
    async fn load(&self) -> Result<GlobalPosition>;

    /// Save the position to resume from
    async fn save(&self, position: GlobalPosition) -> Result<()>;

    /// Store name for logging
    fn name(&self) -> &'static str;
}

/// In-memory checkpoint storage
pub struct MemoryCheckpoint {
    position: RwLock<GlobalPosition>,
}

impl MemoryCheckpoint {
    /// Create a checkpoint at the start of the store
    pub fn new() -> Self {
        Self {
            position: RwLock::new(GlobalPosition::START),
        }
    }

    /// Create a checkpoint at a specific position
    pub fn at(position: GlobalPosition) -> Self {
        Self {
            position: RwLock::new(position),
        }
    }
}

impl Default for MemoryCheckpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpoint {
    async fn load(&self) -> Result<GlobalPosition> {
        Ok(*self.position.read().await)
    }

    async fn save(&self, position: GlobalPosition) -> Result<()> {
        *self.position.write().await = position;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory_checkpoint"
    }
}

//! Node status announcements.

use serde::{Deserialize, Serialize};
use zenoh::Session;

use meterlink_core::RegisterStatus;

/// Status published on `<key_prefix>/@/status/<node_id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Node name.
    pub node: String,
    /// Bridge version.
    pub version: String,
    /// Roles this node runs.
    pub roles: Vec<String>,
    /// "running" or "offline".
    pub status: String,
    /// Epoch millis when the status was produced.
    pub timestamp: i64,
    /// Master registers at the time of the announcement.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub registers: Vec<RegisterStatus>,
}

impl NodeStatus {
    fn new(node: &str, roles: &[&str], status: &str) -> Self {
        Self {
            node: node.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            status: status.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            registers: Vec::new(),
        }
    }

    pub fn running(node: &str, roles: &[&str]) -> Self {
        Self::new(node, roles, "running")
    }

    pub fn offline(node: &str, roles: &[&str]) -> Self {
        Self::new(node, roles, "offline")
    }

    pub fn with_registers(mut self, registers: Vec<RegisterStatus>) -> Self {
        self.registers = registers;
        self
    }

    /// Publish this status as JSON on `key`.
    pub async fn publish(&self, session: &Session, key: &str) -> anyhow::Result<()> {
        let payload = serde_json::to_string(self)?;
        session
            .put(key, payload)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to publish status: {}", e))
    }
}

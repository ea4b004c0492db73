//! Configuration for a meterlink node.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use meterlink_common::config::{LoggingConfig, ZenohConfig};
use meterlink_common::keyexpr::{RELAY_PREFIX, is_valid_chunk};
use meterlink_core::{
    FunctionCode, LivenessPolicy, MasterRef, MasterRegister, PollSource, RegisterStore,
    SlaveRegister, Transform,
};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] meterlink_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identity
    pub node: NodeSection,

    /// Liveness countdown policy
    #[serde(default)]
    pub liveness: LivenessPolicy,

    /// Upstream meter polled as a Modbus master
    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,

    /// Downstream device answered as a Modbus slave
    #[serde(default)]
    pub downstream: Option<DownstreamConfig>,

    /// Master registers (telemetry points)
    #[serde(default)]
    pub masters: Vec<MasterConfig>,

    /// Slave registers (downstream offsets)
    #[serde(default)]
    pub slaves: Vec<SlaveConfig>,

    /// Wireless relay link
    #[serde(default)]
    pub relay: Option<RelayConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// Node name (used in logs and status)
    pub name: String,
}

/// RTU serial line settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
    pub port: String,
    /// Baud rate (default: 9600)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Data bits (default: 8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Parity: "none", "even", or "odd" (default: "none")
    #[serde(default = "default_parity")]
    pub parity: String,
    /// Stop bits: 1 or 2 (default: 1)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

/// Upstream poller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub serial: SerialConfig,

    /// Wait between writing a request and reading the response
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Time allowed for the first response byte
    #[serde(default = "default_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Pause after each poll round
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Requests sent each round, in order
    pub requests: Vec<RequestConfig>,
}

fn default_settle_ms() -> u64 {
    200
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_interval_ms() -> u64 {
    100
}

impl UpstreamConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Poll sources in configuration order.
    pub fn sources(&self) -> Vec<PollSource> {
        self.requests.iter().map(RequestConfig::source).collect()
    }
}

/// One upstream read request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Modbus unit/slave ID (1-247)
    pub unit_addr: u8,
    /// Read function code (1-4)
    pub function: FunctionCode,
    /// Starting register address (0-based)
    pub start_register: u16,
    /// Number of registers to read (default: 1)
    #[serde(default = "default_quantity")]
    pub quantity: u16,
    /// Optional name, also matched against master names
    #[serde(default)]
    pub name: Option<String>,
}

fn default_quantity() -> u16 {
    1
}

impl RequestConfig {
    pub fn source(&self) -> PollSource {
        PollSource {
            unit_addr: self.unit_addr,
            function: self.function,
            start_register: self.start_register,
            quantity: self.quantity,
        }
    }
}

/// Downstream responder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamConfig {
    pub serial: SerialConfig,

    /// Unit addresses this node answers for
    #[serde(default = "default_unit_addrs")]
    pub unit_addrs: Vec<u8>,

    /// Time to wait for a request before starting over
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Pause after a request timeout
    #[serde(default)]
    pub idle_backoff_ms: u64,
}

fn default_unit_addrs() -> Vec<u8> {
    vec![1]
}

impl DownstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

/// A master register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Absolute offset; derived from the request with the same name if omitted
    #[serde(default)]
    pub key: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    /// Decode transform (raw or unpack)
    #[serde(default)]
    pub transform: Transform,
    /// Forward over the relay (default: true when relay sending is enabled)
    #[serde(default)]
    pub relay: Option<bool>,
}

/// A slave register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveConfig {
    /// Function code the downstream device reads it with
    pub function: FunctionCode,
    /// Register address (0-based)
    pub address: u16,
    /// Master register key to answer from
    #[serde(default)]
    pub master: Option<u32>,
    /// Static value to answer with instead of a master register
    #[serde(default)]
    pub emulated: Option<f64>,
    /// Encode transform (raw or pack)
    #[serde(default)]
    pub transform: Transform,
}

impl SlaveConfig {
    pub fn offset(&self) -> u32 {
        self.function.offset(self.address)
    }

    fn master_ref(&self) -> Result<MasterRef, ConfigError> {
        match (self.master, self.emulated) {
            (Some(key), None) => Ok(MasterRef::Key(key)),
            (None, Some(value)) => Ok(MasterRef::Emulated { value }),
            _ => Err(ConfigError::Validation(format!(
                "Slave {}: exactly one of master or emulated must be set",
                self.offset()
            ))),
        }
    }
}

/// Wireless relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Zenoh session carrying the link
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Key expression prefix (default: "meterlink/relay")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// This node's link identifier
    pub node_id: String,

    /// The one peer frames are exchanged with
    pub peer: String,

    /// Forward fresh polled frames to the peer
    #[serde(default)]
    pub send: bool,

    /// Accept frames from the peer
    #[serde(default)]
    pub receive: bool,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_send_pause_ms")]
    pub send_pause_ms: u64,

    #[serde(default = "default_failure_backoff_ms")]
    pub failure_backoff_ms: u64,
}

fn default_key_prefix() -> String {
    RELAY_PREFIX.to_string()
}

fn default_send_pause_ms() -> u64 {
    500
}

fn default_failure_backoff_ms() -> u64 {
    5000
}

impl RelayConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn send_pause(&self) -> Duration {
        Duration::from_millis(self.send_pause_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }
}

fn validate_serial(role: &str, serial: &SerialConfig) -> Result<(), ConfigError> {
    if serial.port.is_empty() {
        return Err(ConfigError::Validation(format!(
            "{}: serial port cannot be empty",
            role
        )));
    }

    if serial.baud_rate == 0 {
        return Err(ConfigError::Validation(format!(
            "{}: baud_rate must be positive",
            role
        )));
    }

    match serial.parity.to_lowercase().as_str() {
        "none" | "even" | "odd" => {}
        _ => {
            return Err(ConfigError::Validation(format!(
                "{}: invalid parity '{}' (use none, even, or odd)",
                role, serial.parity
            )));
        }
    }

    if !(5..=8).contains(&serial.data_bits) {
        return Err(ConfigError::Validation(format!(
            "{}: data_bits must be 5-8",
            role
        )));
    }

    if !matches!(serial.stop_bits, 1 | 2) {
        return Err(ConfigError::Validation(format!(
            "{}: stop_bits must be 1 or 2",
            role
        )));
    }

    Ok(())
}

fn validate_unit_addr(context: &str, unit_addr: u8) -> Result<(), ConfigError> {
    if !(1..=247).contains(&unit_addr) {
        return Err(ConfigError::Validation(format!(
            "{}: unit address {} must be 1-247",
            context, unit_addr
        )));
    }
    Ok(())
}

impl NodeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: NodeConfig = meterlink_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn from_json5(content: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = meterlink_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Whether the relay forwards frames to the peer.
    pub fn relay_sends(&self) -> bool {
        self.relay.as_ref().is_some_and(|r| r.send)
    }

    /// Whether the relay accepts frames from the peer.
    pub fn relay_receives(&self) -> bool {
        self.relay.as_ref().is_some_and(|r| r.receive)
    }

    /// Names of the roles this node runs.
    pub fn roles(&self) -> Vec<&'static str> {
        let mut roles = Vec::new();
        if self.upstream.is_some() {
            roles.push("poller");
        }
        if self.downstream.is_some() {
            roles.push("responder");
        }
        if self.relay_sends() {
            roles.push("relay-send");
        }
        if self.relay_receives() {
            roles.push("relay-receive");
        }
        roles
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.name.is_empty() {
            return Err(ConfigError::Validation(
                "Node name cannot be empty".to_string(),
            ));
        }

        if self.roles().is_empty() {
            return Err(ConfigError::Validation(
                "At least one of upstream, downstream, relay.send or relay.receive must be configured"
                    .to_string(),
            ));
        }

        if let Some(upstream) = &self.upstream {
            validate_serial("upstream", &upstream.serial)?;

            if upstream.requests.is_empty() {
                return Err(ConfigError::Validation(
                    "upstream: at least one request must be configured".to_string(),
                ));
            }

            let mut keys = HashSet::new();
            for request in &upstream.requests {
                let key = request.source().key();
                validate_unit_addr(&format!("upstream request {}", key), request.unit_addr)?;

                if !(1..=125).contains(&request.quantity) {
                    return Err(ConfigError::Validation(format!(
                        "upstream request {}: quantity must be 1-125",
                        key
                    )));
                }

                if !keys.insert(key) {
                    return Err(ConfigError::Validation(format!(
                        "upstream request {} is configured twice",
                        key
                    )));
                }
            }
        }

        if let Some(downstream) = &self.downstream {
            validate_serial("downstream", &downstream.serial)?;

            if downstream.unit_addrs.is_empty() {
                return Err(ConfigError::Validation(
                    "downstream: unit_addrs cannot be empty".to_string(),
                ));
            }
            for unit_addr in &downstream.unit_addrs {
                validate_unit_addr("downstream", *unit_addr)?;
            }
        }

        for master in &self.masters {
            if matches!(master.transform, Transform::Pack { .. }) {
                return Err(ConfigError::Validation(format!(
                    "Master '{}': transform must be raw or unpack",
                    self.master_label(master)
                )));
            }
        }

        for slave in &self.slaves {
            let master_ref = slave.master_ref()?;

            match (&slave.transform, master_ref) {
                (Transform::Unpack { .. }, _) => {
                    return Err(ConfigError::Validation(format!(
                        "Slave {}: transform must be raw or pack",
                        slave.offset()
                    )));
                }
                (Transform::Raw, MasterRef::Emulated { .. }) => {
                    return Err(ConfigError::Validation(format!(
                        "Slave {}: emulated registers need a pack transform",
                        slave.offset()
                    )));
                }
                _ => {}
            }
        }

        if let Some(relay) = &self.relay {
            for (field, id) in [("node_id", &relay.node_id), ("peer", &relay.peer)] {
                if !is_valid_chunk(id) {
                    return Err(ConfigError::Validation(format!(
                        "relay: invalid {} '{}'",
                        field, id
                    )));
                }
            }

            if relay.node_id == relay.peer {
                return Err(ConfigError::Validation(
                    "relay: node_id and peer must differ".to_string(),
                ));
            }

            if relay.send && self.upstream.is_none() {
                return Err(ConfigError::Validation(
                    "relay: send requires an upstream poller".to_string(),
                ));
            }
        }

        // Builds the register store, which checks offsets and references.
        let store = self.to_store()?;

        // A packed slave needs a decoded value to pack.
        for slave in store.slaves() {
            let (Transform::Pack { .. }, MasterRef::Key(key)) = (&slave.transform, slave.master_ref)
            else {
                continue;
            };
            let unpacked = store
                .master(key)
                .is_some_and(|m| matches!(m.transform, Transform::Unpack { .. }));
            if !unpacked {
                return Err(ConfigError::Validation(format!(
                    "Slave {}: pack transform needs master {} to use an unpack transform",
                    slave.offset, key
                )));
            }
        }

        if self.relay_receives() && store.masters().all(|m| m.is_polled()) {
            return Err(ConfigError::Validation(
                "relay: receive needs at least one master register that is not polled locally"
                    .to_string(),
            ));
        }

        Ok(())
    }

    fn master_label(&self, master: &MasterConfig) -> String {
        match (&master.name, master.key) {
            (Some(name), _) => name.clone(),
            (None, Some(key)) => key.to_string(),
            (None, None) => "<unnamed>".to_string(),
        }
    }

    fn master_key(&self, master: &MasterConfig) -> Result<u32, ConfigError> {
        if let Some(key) = master.key {
            return Ok(key);
        }

        let request = master.name.as_ref().and_then(|name| {
            self.upstream
                .iter()
                .flat_map(|u| u.requests.iter())
                .find(|r| r.name.as_ref() == Some(name))
        });

        request.map(|r| r.source().key()).ok_or_else(|| {
            ConfigError::Validation(format!(
                "Master '{}': key is required unless the name matches an upstream request",
                self.master_label(master)
            ))
        })
    }

    /// Build the register store this configuration describes.
    pub fn to_store(&self) -> Result<RegisterStore, ConfigError> {
        let relay_default = self.relay_sends();

        let mut masters = Vec::with_capacity(self.masters.len());
        for master in &self.masters {
            let mut register = MasterRegister::new(self.master_key(master)?, master.transform.clone())
                .with_relay(master.relay.unwrap_or(relay_default));
            if let Some(name) = &master.name {
                register = register.with_name(name.clone());
            }
            masters.push(register);
        }

        let requests = self.upstream.as_ref().map(|u| u.requests.as_slice()).unwrap_or_default();
        for request in requests {
            let key = request.source().key();
            if masters.iter().any(|m| m.key == key) {
                continue;
            }

            let mut register = MasterRegister::new(key, Transform::Raw).with_relay(relay_default);
            if let Some(name) = &request.name {
                register = register.with_name(name.clone());
            }
            masters.push(register);
        }

        let mut slaves = Vec::with_capacity(self.slaves.len());
        for slave in &self.slaves {
            slaves.push(SlaveRegister::new(
                slave.function,
                slave.address,
                slave.master_ref()?,
                slave.transform.clone(),
            ));
        }

        let sources = self.upstream.as_ref().map(|u| u.sources()).unwrap_or_default();

        RegisterStore::with_poll_requests(masters, &sources, slaves, self.liveness)
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterlink_core::{NumberFormat, NumericKind};

    const METER_NODE: &str = r#"{
        node: { name: "meter-side" },
        upstream: {
            serial: { port: "/dev/ttyUSB0", baud_rate: 9600, parity: "none" },
            requests: [
                { unit_addr: 1, function: 4, start_register: 12, quantity: 2, name: "active_power" },
                { unit_addr: 1, function: 4, start_register: 0, quantity: 2 },
            ],
        },
        masters: [
            { name: "active_power", transform: { type: "unpack", format: "f32", unit: "W" } },
        ],
        relay: { node_id: "meter", peer: "panel", send: true },
    }"#;

    const PANEL_NODE: &str = r#"{
        node: { name: "panel-side" },
        downstream: {
            serial: { port: "/dev/ttyUSB1", baud_rate: 19200, parity: "even" },
            unit_addrs: [1],
        },
        masters: [
            { key: 30013, name: "active_power", transform: { type: "unpack", format: "f32" } },
        ],
        slaves: [
            { function: 3, address: 14, master: 30013, transform: { type: "pack", format: "i16" } },
            { function: 3, address: 8192, emulated: 1, transform: { type: "pack", format: "u16" } },
        ],
        relay: { node_id: "panel", peer: "meter", receive: true },
    }"#;

    #[test]
    fn test_parse_meter_node() {
        let config = NodeConfig::from_json5(METER_NODE).unwrap();
        let upstream = config.upstream.as_ref().unwrap();

        assert_eq!(upstream.settle(), Duration::from_millis(200));
        assert_eq!(upstream.response_timeout(), Duration::from_secs(1));
        assert_eq!(upstream.serial.data_bits, 8);
        assert_eq!(upstream.requests[0].function, FunctionCode::ReadInputRegisters);
        assert_eq!(config.roles(), vec!["poller", "relay-send"]);

        let relay = config.relay.as_ref().unwrap();
        assert_eq!(relay.key_prefix, "meterlink/relay");
        assert_eq!(relay.send_pause(), Duration::from_millis(500));
        assert_eq!(relay.failure_backoff(), Duration::from_secs(5));
        assert_eq!(config.liveness, LivenessPolicy::default());
    }

    #[test]
    fn test_meter_node_store() {
        let store = NodeConfig::from_json5(METER_NODE).unwrap().to_store().unwrap();

        let power = store.master(30013).unwrap();
        assert!(power.is_polled());
        assert!(power.relay);
        assert_eq!(power.name.as_deref(), Some("active_power"));

        // Request without a master gets an implicit raw one.
        let implicit = store.master(30001).unwrap();
        assert_eq!(implicit.transform, Transform::Raw);
        assert!(implicit.relay);
    }

    #[test]
    fn test_panel_node_store() {
        let config = NodeConfig::from_json5(PANEL_NODE).unwrap();
        assert_eq!(config.roles(), vec!["responder", "relay-receive"]);

        let store = config.to_store().unwrap();
        let slave = store.lookup_slave(40015).unwrap();
        assert_eq!(slave.master_ref, MasterRef::Key(30013));
        assert_eq!(
            slave.transform,
            Transform::Pack {
                format: NumberFormat::I16,
                scale: 1.0,
                kind: NumericKind::Int
            }
        );
        assert_eq!(
            store.lookup_slave(48193).unwrap().master_ref,
            MasterRef::Emulated { value: 1.0 }
        );
        assert!(!store.master(30013).unwrap().relay);
    }

    #[test]
    fn test_sample_config() {
        let config = NodeConfig::from_json5(include_str!("../meterlink.json5")).unwrap();
        assert_eq!(config.roles(), vec!["poller", "relay-send"]);
        assert_eq!(config.to_store().unwrap().relay_candidates().len(), 0);
    }

    fn expect_invalid(json: &str, needle: &str) {
        match NodeConfig::from_json5(json) {
            Err(ConfigError::Validation(message)) => {
                assert!(message.contains(needle), "unexpected message: {}", message)
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            NodeConfig::load_from_file("/nonexistent/meterlink.json5"),
            Err(ConfigError::Load(_))
        ));
        assert!(matches!(
            NodeConfig::from_json5("{ node: "),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_validate_no_roles() {
        expect_invalid(r#"{ node: { name: "idle" } }"#, "At least one");
    }

    #[test]
    fn test_validate_parity() {
        expect_invalid(
            r#"{
                node: { name: "n" },
                downstream: { serial: { port: "/dev/ttyS0", parity: "mark" } },
            }"#,
            "invalid parity",
        );
    }

    #[test]
    fn test_validate_unit_addr() {
        expect_invalid(
            r#"{
                node: { name: "n" },
                downstream: { serial: { port: "/dev/ttyS0" }, unit_addrs: [0] },
            }"#,
            "1-247",
        );
    }

    #[test]
    fn test_validate_dangling_master() {
        expect_invalid(
            r#"{
                node: { name: "n" },
                downstream: { serial: { port: "/dev/ttyS0" } },
                slaves: [ { function: 3, address: 14, master: 30013 } ],
            }"#,
            "unknown master 30013",
        );
    }

    #[test]
    fn test_validate_duplicate_slave() {
        expect_invalid(
            r#"{
                node: { name: "n" },
                downstream: { serial: { port: "/dev/ttyS0" } },
                masters: [ { key: 30013 } ],
                slaves: [
                    { function: 3, address: 14, master: 30013 },
                    { function: 3, address: 14, master: 30013 },
                ],
            }"#,
            "Duplicate slave register offset 40015",
        );
    }

    #[test]
    fn test_validate_transform_directions() {
        expect_invalid(
            r#"{
                node: { name: "n" },
                downstream: { serial: { port: "/dev/ttyS0" } },
                slaves: [ { function: 3, address: 0, emulated: 1 } ],
            }"#,
            "need a pack transform",
        );
        expect_invalid(
            r#"{
                node: { name: "n" },
                downstream: { serial: { port: "/dev/ttyS0" } },
                masters: [ { key: 1, transform: { type: "pack", format: "i16" } } ],
            }"#,
            "raw or unpack",
        );
        expect_invalid(
            r#"{
                node: { name: "n" },
                downstream: { serial: { port: "/dev/ttyS0" } },
                masters: [ { key: 1 } ],
                slaves: [ { function: 3, address: 0, master: 1, transform: { type: "unpack", format: "i16" } } ],
            }"#,
            "raw or pack",
        );
        expect_invalid(
            r#"{
                node: { name: "n" },
                downstream: { serial: { port: "/dev/ttyS0" } },
                masters: [ { key: 40001 } ],
                slaves: [ { function: 3, address: 14, master: 40001, transform: { type: "pack", format: "i16" } } ],
            }"#,
            "needs master 40001 to use an unpack transform",
        );
        expect_invalid(
            r#"{
                node: { name: "n" },
                upstream: {
                    serial: { port: "/dev/ttyS0" },
                    requests: [ { unit_addr: 1, function: 4, start_register: 12, quantity: 2 } ],
                },
                downstream: { serial: { port: "/dev/ttyS1" } },
                slaves: [ { function: 3, address: 14, master: 30013, transform: { type: "pack", format: "i16" } } ],
            }"#,
            "needs master 30013 to use an unpack transform",
        );
    }

    #[test]
    fn test_validate_relay_receive_needs_unpolled_master() {
        expect_invalid(
            r#"{
                node: { name: "n" },
                upstream: {
                    serial: { port: "/dev/ttyS0" },
                    requests: [ { unit_addr: 1, function: 4, start_register: 12, quantity: 2 } ],
                },
                relay: { node_id: "a", peer: "b", receive: true },
            }"#,
            "not polled locally",
        );
    }

    #[test]
    fn test_validate_relay_ids() {
        expect_invalid(
            r#"{
                node: { name: "n" },
                masters: [ { key: 30013 } ],
                relay: { node_id: "a/b", peer: "c", receive: true },
            }"#,
            "invalid node_id",
        );
        expect_invalid(
            r#"{
                node: { name: "n" },
                masters: [ { key: 30013 } ],
                relay: { node_id: "a", peer: "a", receive: true },
            }"#,
            "must differ",
        );
    }

    #[test]
    fn test_validate_master_key_required() {
        expect_invalid(
            r#"{
                node: { name: "n" },
                downstream: { serial: { port: "/dev/ttyS0" } },
                masters: [ { name: "orphan" } ],
            }"#,
            "key is required",
        );
    }

    #[test]
    fn test_validate_liveness() {
        expect_invalid(
            r#"{
                node: { name: "n" },
                liveness: { max: 3 },
                downstream: { serial: { port: "/dev/ttyS0" } },
            }"#,
            "Invalid liveness policy",
        );
        expect_invalid(
            r#"{
                node: { name: "n" },
                liveness: { max: 10, fresh_threshold: 0 },
                downstream: { serial: { port: "/dev/ttyS0" } },
            }"#,
            "Invalid liveness policy",
        );
    }
}

//! meterlink bridge node.
//!
//! A node polls an upstream meter as a Modbus RTU master, answers a
//! downstream panel as a Modbus RTU slave, and mirrors the polled telemetry
//! to a peer node over a zenoh relay link. Any subset of those roles can
//! run on one node; they all share one register store.
//!
//! # Key Expressions
//!
//! ```text
//! meterlink/relay/<dest>/<src>          relay envelopes
//! meterlink/relay/@/status/<node_id>    node status
//! ```

pub mod config;
pub mod link;
pub mod poller;
pub mod relay;
pub mod responder;
pub mod scheduler;
pub mod serial;
pub mod status;

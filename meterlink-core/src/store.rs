//! Register store shared by the poller, responder and relay tasks.
//!
//! Master registers hold the last telemetry received from a producer (the
//! upstream poller or the wireless relay). Slave registers map downstream
//! offsets onto master registers. A master's `alive` countdown is reset to
//! `max` by every producer write and decremented by every consumer, and a
//! value is only served while `alive >= fresh_threshold`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{ServeError, StoreError, UpdateError};
use crate::function::FunctionCode;
use crate::pdu::ResponsePdu;
use crate::transform::Transform;

/// Liveness countdown policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessPolicy {
    /// Value `alive` is reset to on every producer write.
    pub max: u8,
    /// Minimum `alive` for a register to be served or relayed.
    pub fresh_threshold: u8,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self {
            max: 10,
            fresh_threshold: 5,
        }
    }
}

impl LivenessPolicy {
    /// Check `0 < fresh_threshold <= max`.
    ///
    /// A zero threshold would let a register with `alive == 0` be served.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.fresh_threshold == 0 || self.fresh_threshold > self.max {
            return Err(StoreError::Liveness {
                threshold: self.fresh_threshold,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Upstream request that feeds a master register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSource {
    pub unit_addr: u8,
    pub function: FunctionCode,
    pub start_register: u16,
    pub quantity: u16,
}

impl PollSource {
    /// Master key this request feeds.
    pub fn key(&self) -> u32 {
        self.function.offset(self.start_register)
    }

    /// Byte count a complete response to this request declares.
    pub fn response_byte_count(&self) -> usize {
        let quantity = usize::from(self.quantity);
        match self.function {
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => quantity.div_ceil(8),
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => quantity * 2,
        }
    }
}

/// Cached upstream telemetry point.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterRegister {
    pub key: u32,
    pub name: Option<String>,
    /// `None` when the register is only fed over the wireless link.
    pub source: Option<PollSource>,
    /// Last payload, `byte_count|data`.
    pub raw: Vec<u8>,
    /// Last CRC-stamped response frame.
    pub frame: Vec<u8>,
    pub value: Option<f64>,
    pub alive: u8,
    /// Epoch millis of the last producer write.
    pub updated_at: Option<i64>,
    pub transform: Transform,
    pub relay: bool,
}

impl MasterRegister {
    /// Empty register that has never been written.
    pub fn new(key: u32, transform: Transform) -> Self {
        Self {
            key,
            name: None,
            source: None,
            raw: Vec::new(),
            frame: Vec::new(),
            value: None,
            alive: 0,
            updated_at: None,
            transform,
            relay: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_source(mut self, source: PollSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_relay(mut self, relay: bool) -> Self {
        self.relay = relay;
        self
    }

    /// Whether the local poller owns this register.
    pub fn is_polled(&self) -> bool {
        self.source.is_some()
    }
}

/// What a slave register answers from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasterRef {
    /// A master register key.
    Key(u32),
    /// A static value, for registers the downstream device only probes.
    Emulated { value: f64 },
}

/// Downstream register answered from a master register.
#[derive(Debug, Clone, PartialEq)]
pub struct SlaveRegister {
    pub offset: u32,
    pub expected_function: u8,
    pub master_ref: MasterRef,
    pub transform: Transform,
}

impl SlaveRegister {
    pub fn new(
        function: FunctionCode,
        register_address: u16,
        master_ref: MasterRef,
        transform: Transform,
    ) -> Self {
        Self {
            offset: function.offset(register_address),
            expected_function: function.into(),
            master_ref,
            transform,
        }
    }
}

/// A fresh response frame ready to forward over the wireless link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFrame {
    pub key: u32,
    pub source: PollSource,
    pub frame: Vec<u8>,
}

/// Serializable view of a master register for status announcements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterStatus {
    pub key: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub alive: u8,
    pub fresh: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// Master and slave registers plus the liveness policy.
#[derive(Debug)]
pub struct RegisterStore {
    masters: BTreeMap<u32, MasterRegister>,
    slaves: BTreeMap<u32, SlaveRegister>,
    policy: LivenessPolicy,
}

impl RegisterStore {
    /// Build a store, rejecting duplicate keys, duplicate offsets and slave
    /// registers that reference a missing master.
    pub fn new(
        masters: Vec<MasterRegister>,
        slaves: Vec<SlaveRegister>,
        policy: LivenessPolicy,
    ) -> Result<Self, StoreError> {
        policy.validate()?;

        let mut master_map = BTreeMap::new();
        for master in masters {
            let key = master.key;
            if master_map.insert(key, master).is_some() {
                return Err(StoreError::DuplicateMaster(key));
            }
        }

        let mut slave_map = BTreeMap::new();
        for slave in slaves {
            if let MasterRef::Key(key) = slave.master_ref
                && !master_map.contains_key(&key)
            {
                return Err(StoreError::DanglingMaster {
                    offset: slave.offset,
                    key,
                });
            }

            let offset = slave.offset;
            if slave_map.insert(offset, slave).is_some() {
                return Err(StoreError::DuplicateSlave(offset));
            }
        }

        Ok(Self {
            masters: master_map,
            slaves: slave_map,
            policy,
        })
    }

    /// Build a store whose masters are fed by `requests`.
    ///
    /// Each request is attached to the master with its derived key; requests
    /// without a configured master get an implicit `Raw` one.
    pub fn with_poll_requests(
        mut masters: Vec<MasterRegister>,
        requests: &[PollSource],
        slaves: Vec<SlaveRegister>,
        policy: LivenessPolicy,
    ) -> Result<Self, StoreError> {
        for request in requests {
            let key = request.key();
            match masters.iter_mut().find(|m| m.key == key) {
                Some(master) => master.source = Some(*request),
                None => {
                    masters.push(MasterRegister::new(key, Transform::Raw).with_source(*request))
                }
            }
        }

        Self::new(masters, slaves, policy)
    }

    pub fn policy(&self) -> LivenessPolicy {
        self.policy
    }

    pub fn lookup_slave(&self, offset: u32) -> Option<&SlaveRegister> {
        self.slaves.get(&offset)
    }

    pub fn master(&self, key: u32) -> Option<&MasterRegister> {
        self.masters.get(&key)
    }

    pub fn masters(&self) -> impl Iterator<Item = &MasterRegister> {
        self.masters.values()
    }

    pub fn slaves(&self) -> impl Iterator<Item = &SlaveRegister> {
        self.slaves.values()
    }

    /// Payload answering a downstream read of `offset`.
    ///
    /// The result is `byte_count|data`, ready for a passthrough response.
    /// A successful serve from a master register costs one `alive` step.
    pub fn serve(&mut self, offset: u32, function: u8) -> Result<Vec<u8>, ServeError> {
        let slave = self
            .slaves
            .get(&offset)
            .ok_or(ServeError::UnknownOffset(offset))?;

        if slave.expected_function != function {
            return Err(ServeError::FunctionMismatch {
                offset,
                expected: slave.expected_function,
                actual: function,
            });
        }

        let key = match slave.master_ref {
            MasterRef::Emulated { value } => return Ok(slave.transform.encode(value)?),
            MasterRef::Key(key) => key,
        };

        let master = self
            .masters
            .get_mut(&key)
            .ok_or(ServeError::UnknownOffset(offset))?;

        let threshold = self.policy.fresh_threshold;
        let stale = ServeError::StaleRegister {
            key,
            alive: master.alive,
            threshold,
        };
        if master.alive < threshold {
            return Err(stale);
        }

        let payload = match &slave.transform {
            Transform::Raw if master.raw.is_empty() => return Err(stale),
            Transform::Raw => master.raw.clone(),
            transform => {
                let value = master.value.ok_or(stale)?;
                transform.encode(value)?
            }
        };

        // Only an answered request costs a liveness step.
        master.alive = master.alive.saturating_sub(1);
        Ok(payload)
    }

    /// Producer write: replace the cached data and reset `alive` to `max`.
    ///
    /// Returns `false` when `key` has no master register.
    pub fn update_master(
        &mut self,
        key: u32,
        raw: Vec<u8>,
        frame: Vec<u8>,
        value: Option<f64>,
    ) -> bool {
        let Some(master) = self.masters.get_mut(&key) else {
            return false;
        };

        master.raw = raw;
        master.frame = frame;
        master.value = value;
        master.alive = self.policy.max;
        master.updated_at = Some(chrono::Utc::now().timestamp_millis());
        true
    }

    /// Decode a validated response with the master transform and store it.
    pub fn record_response(
        &mut self,
        key: u32,
        pdu: &ResponsePdu,
        frame: Vec<u8>,
    ) -> Result<Option<f64>, UpdateError> {
        let master = self
            .masters
            .get(&key)
            .ok_or(UpdateError::UnknownMaster(key))?;

        let value = master.transform.decode(&pdu.data)?;
        self.update_master(key, pdu.payload(), frame, value);
        Ok(value)
    }

    /// Like [`record_response`](Self::record_response), for frames received
    /// over the wireless link. Keys fed by the local poller are refused.
    pub fn ingest_response(
        &mut self,
        key: u32,
        pdu: &ResponsePdu,
        frame: Vec<u8>,
    ) -> Result<Option<f64>, UpdateError> {
        match self.masters.get(&key) {
            None => Err(UpdateError::UnknownMaster(key)),
            Some(master) if master.is_polled() => Err(UpdateError::PollOwned(key)),
            Some(_) => self.record_response(key, pdu, frame),
        }
    }

    /// Lower `alive` by one ahead of a refresh attempt.
    pub fn degrade(&mut self, key: u32) {
        if let Some(master) = self.masters.get_mut(&key) {
            master.alive = master.alive.saturating_sub(1);
        }
    }

    /// Fresh polled frames to forward over the wireless link.
    pub fn relay_candidates(&self) -> Vec<RelayFrame> {
        self.masters
            .values()
            .filter(|m| m.relay && m.alive >= self.policy.fresh_threshold && !m.frame.is_empty())
            .filter_map(|m| {
                m.source.map(|source| RelayFrame {
                    key: m.key,
                    source,
                    frame: m.frame.clone(),
                })
            })
            .collect()
    }

    pub fn snapshot(&self) -> Vec<RegisterStatus> {
        self.masters
            .values()
            .map(|m| RegisterStatus {
                key: m.key,
                name: m.name.clone(),
                alive: m.alive,
                fresh: m.alive >= self.policy.fresh_threshold,
                value: m.value,
                unit: m.transform.unit().map(str::to_string),
                updated_at: m.updated_at,
            })
            .collect()
    }
}

/// Register store shared between tasks.
///
/// Every method takes the lock for one synchronous section, so a producer
/// write or a serve is never observed half done. Never hold it across an
/// `.await`.
#[derive(Debug, Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<RegisterStore>>,
}

impl SharedStore {
    pub fn new(store: RegisterStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegisterStore> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the store.
    pub fn with<R>(&self, f: impl FnOnce(&mut RegisterStore) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn serve(&self, offset: u32, function: u8) -> Result<Vec<u8>, ServeError> {
        self.lock().serve(offset, function)
    }

    pub fn update_master(&self, key: u32, raw: Vec<u8>, frame: Vec<u8>, value: Option<f64>) -> bool {
        self.lock().update_master(key, raw, frame, value)
    }

    pub fn record_response(
        &self,
        key: u32,
        pdu: &ResponsePdu,
        frame: Vec<u8>,
    ) -> Result<Option<f64>, UpdateError> {
        self.lock().record_response(key, pdu, frame)
    }

    pub fn ingest_response(
        &self,
        key: u32,
        pdu: &ResponsePdu,
        frame: Vec<u8>,
    ) -> Result<Option<f64>, UpdateError> {
        self.lock().ingest_response(key, pdu, frame)
    }

    pub fn degrade(&self, key: u32) {
        self.lock().degrade(key)
    }

    pub fn master(&self, key: u32) -> Option<MasterRegister> {
        self.lock().master(key).cloned()
    }

    pub fn relay_candidates(&self) -> Vec<RelayFrame> {
        self.lock().relay_candidates()
    }

    pub fn snapshot(&self) -> Vec<RegisterStatus> {
        self.lock().snapshot()
    }
}

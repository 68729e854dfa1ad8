//! Signal sources
//!
//! A signal source consumes batches of CAN frames for a fixed message set and
//! keeps the latest decoded value of every signal. The fusion core resolves the
//! signals it needs into [`SignalHandle`]s once, at construction, and reads them
//! by index on every committed cycle.

use crate::message_decoder::MessageDecoder;
use crate::signals::{MessageDefinition, SignalDatabase};
use crate::types::{CanFrame, FusionError, Result};
use std::collections::HashMap;

/// Consecutive invalid updates before the bus is reported invalid
pub const CAN_INVALID_CNT: u32 = 5;

/// A message is missing once it is this many periods overdue
const TIMEOUT_PERIODS: f64 = 10.0;

/// Resolved position of one signal inside a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalHandle {
    slot: usize,
    signal: usize,
}

impl SignalHandle {
    pub fn new(slot: usize, signal: usize) -> Self {
        Self { slot, signal }
    }

    /// `(message slot, signal index)`
    pub fn parts(&self) -> (usize, usize) {
        (self.slot, self.signal)
    }
}

/// Decoded-signal provider for one message set
pub trait SignalSource {
    /// Feed a batch of frames; returns the CAN IDs whose values changed
    fn update(&mut self, frames: &[CanFrame]) -> Vec<u32>;

    /// False when the underlying bus is missing or corrupting messages
    fn can_valid(&self) -> bool;

    /// Resolve a signal of a subscribed message into an indexed handle
    fn resolve(&self, address: u32, signal: &str) -> Result<SignalHandle>;

    /// Latest decoded physical value behind a handle
    fn value(&self, handle: SignalHandle) -> f64;
}

/// One message a source listens for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageSubscription {
    pub address: u32,
    /// Expected rate; 0 disables the timeout check for this message
    pub frequency_hz: f64,
}

impl MessageSubscription {
    pub fn new(address: u32, frequency_hz: f64) -> Self {
        Self {
            address,
            frequency_hz,
        }
    }

    fn check_threshold_ns(&self) -> Option<u64> {
        if self.frequency_hz > 0.0 {
            Some((1e9 / self.frequency_hz * TIMEOUT_PERIODS) as u64)
        } else {
            None
        }
    }
}

struct MessageSlot {
    definition: MessageDefinition,
    values: Vec<f64>,
    last_seen_ns: Option<u64>,
    check_threshold_ns: Option<u64>,
}

impl MessageSlot {
    fn is_missing(&self, now_ns: u64) -> bool {
        match (self.last_seen_ns, self.check_threshold_ns) {
            (None, _) => true,
            (Some(seen), Some(threshold)) => now_ns.saturating_sub(seen) > threshold,
            (Some(_), None) => false,
        }
    }
}

/// Signal source decoding frames with DBC message layouts
pub struct CanSignalSource {
    bus: u8,
    slots: Vec<MessageSlot>,
    /// Key: CAN ID, Value: slot index
    index: HashMap<u32, usize>,
    last_timestamp_ns: u64,
    invalid_count: u32,
}

impl CanSignalSource {
    /// Build a source listening on `bus` for the given messages
    ///
    /// Fails with [`FusionError::MessageNotFound`] if any subscribed address has
    /// no definition in the database.
    pub fn new(db: &SignalDatabase, bus: u8, subscriptions: &[MessageSubscription]) -> Result<Self> {
        let mut slots = Vec::with_capacity(subscriptions.len());
        let mut index = HashMap::with_capacity(subscriptions.len());

        for sub in subscriptions {
            let definition = db
                .get_message(sub.address)
                .ok_or(FusionError::MessageNotFound(sub.address))?
                .clone();

            index.insert(sub.address, slots.len());
            slots.push(MessageSlot {
                values: vec![0.0; definition.signals.len()],
                definition,
                last_seen_ns: None,
                check_threshold_ns: sub.check_threshold_ns(),
            });
        }

        log::debug!("Signal source on bus {} listening for {} messages", bus, slots.len());

        Ok(Self {
            bus,
            slots,
            index,
            last_timestamp_ns: 0,
            invalid_count: CAN_INVALID_CNT,
        })
    }

    /// Bus this source listens on
    pub fn bus(&self) -> u8 {
        self.bus
    }

    fn all_present(&self) -> bool {
        self.slots.iter().all(|slot| !slot.is_missing(self.last_timestamp_ns))
    }
}

impl SignalSource for CanSignalSource {
    fn update(&mut self, frames: &[CanFrame]) -> Vec<u32> {
        let mut changed = Vec::new();
        let mut decode_ok = true;

        for frame in frames {
            self.last_timestamp_ns = self.last_timestamp_ns.max(frame.timestamp_ns);
            if frame.channel != self.bus {
                continue;
            }
            let Some(&slot_idx) = self.index.get(&frame.can_id) else {
                continue;
            };

            let slot = &mut self.slots[slot_idx];
            match MessageDecoder::decode_into(&frame.data, &slot.definition, &mut slot.values) {
                Ok(()) => {
                    slot.last_seen_ns = Some(frame.timestamp_ns);
                    if !changed.contains(&frame.can_id) {
                        changed.push(frame.can_id);
                    }
                }
                Err(e) => {
                    log::warn!("Dropping {} (0x{:X}): {}", slot.definition.name, frame.can_id, e);
                    decode_ok = false;
                }
            }
        }

        if decode_ok && self.all_present() {
            self.invalid_count = 0;
        } else {
            self.invalid_count = (self.invalid_count + 1).min(CAN_INVALID_CNT);
        }

        changed
    }

    fn can_valid(&self) -> bool {
        self.invalid_count < CAN_INVALID_CNT
    }

    fn resolve(&self, address: u32, signal: &str) -> Result<SignalHandle> {
        let slot = *self
            .index
            .get(&address)
            .ok_or(FusionError::MessageNotFound(address))?;
        let idx = self.slots[slot]
            .definition
            .signal_index(signal)
            .ok_or_else(|| FusionError::SignalNotFound {
                address,
                signal: signal.to_string(),
            })?;
        Ok(SignalHandle::new(slot, idx))
    }

    fn value(&self, handle: SignalHandle) -> f64 {
        self.slots
            .get(handle.slot)
            .and_then(|slot| slot.values.get(handle.signal))
            .copied()
            .unwrap_or(0.0)
    }
}

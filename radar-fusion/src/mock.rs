//! In-memory signal source
//!
//! Holds signal values set directly by the caller instead of decoding frame
//! payloads. A frame whose CAN ID is a defined message marks that message as
//! changed. Clones share state, so a test can keep a handle after moving the
//! source into a fusion core.

use crate::mode::{Resolution, TrackLayout, ESCC_ADDR};
use crate::source::{SignalHandle, SignalSource};
use crate::types::{CanFrame, FusionError, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug)]
struct MockMessage {
    names: Vec<String>,
    values: Vec<f64>,
}

#[derive(Debug)]
struct MockState {
    messages: Vec<MockMessage>,
    /// Key: CAN ID, Value: message index
    index: HashMap<u32, usize>,
    can_valid: bool,
}

#[derive(Debug, Clone)]
pub struct MockSignalSource {
    state: Rc<RefCell<MockState>>,
}

impl Default for MockSignalSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSignalSource {
    /// Empty source reporting a valid bus
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(MockState {
                messages: Vec::new(),
                index: HashMap::new(),
                can_valid: true,
            })),
        }
    }

    /// Source with every per-object message of the resolved layout defined
    pub fn for_tracks(resolution: &Resolution) -> Self {
        let names: &[&str] = match resolution.layout {
            TrackLayout::Polar => &["STATE", "AZIMUTH", "LONG_DIST", "REL_SPEED", "REL_ACCEL"],
            TrackLayout::Native => &["VALID_CNT", "LONG_DIST", "LAT_DIST", "REL_SPEED", "REL_ACCEL", "LAT_SPEED"],
            TrackLayout::DoublePacked => &[
                "VALID_CNT1", "LONG_DIST1", "LAT_DIST1", "REL_SPEED1", "REL_ACCEL1", "LAT_SPEED1",
                "VALID_CNT2", "LONG_DIST2", "LAT_DIST2", "REL_SPEED2", "REL_ACCEL2", "LAT_SPEED2",
            ],
        };

        let source = Self::new();
        for address in resolution.addresses() {
            source.define(address, names);
        }
        source
    }

    /// Source with the enhanced single-object message defined
    pub fn for_enhanced() -> Self {
        let source = Self::new();
        source.define(ESCC_ADDR, &["ACC_ObjStatus", "ACC_ObjDist", "ACC_ObjLatPos", "ACC_ObjRelSpd"]);
        source
    }

    /// Source with the cruise-controller object message for the bus format defined
    pub fn for_single_object(resolution: &Resolution) -> Self {
        let source = Self::new();
        if resolution.can_fd {
            source.define(resolution.scc_addr(), &["ACC_ObjDist", "ACC_ObjRelSpd"]);
        } else {
            source.define(
                resolution.scc_addr(),
                &["ACC_ObjStatus", "ACC_ObjDist", "ACC_ObjRelSpd", "ACC_ObjLatPos"],
            );
        }
        source
    }

    /// Define a message with its signal names, all zero
    pub fn define(&self, address: u32, names: &[&str]) {
        let mut state = self.state.borrow_mut();
        let message = MockMessage {
            names: names.iter().map(|n| n.to_string()).collect(),
            values: vec![0.0; names.len()],
        };
        match state.index.get(&address) {
            Some(&idx) => state.messages[idx] = message,
            None => {
                let idx = state.messages.len();
                state.messages.push(message);
                state.index.insert(address, idx);
            }
        }
    }

    /// Overwrite some signals of a defined message; unknown names are ignored
    pub fn set_signals(&self, address: u32, values: &[(&str, f64)]) {
        let mut state = self.state.borrow_mut();
        let Some(&idx) = state.index.get(&address) else {
            log::warn!("Mock source has no message 0x{:X}", address);
            return;
        };
        let message = &mut state.messages[idx];
        for (name, value) in values {
            if let Some(pos) = message.names.iter().position(|n| n == name) {
                message.values[pos] = *value;
            }
        }
    }

    pub fn set_can_valid(&self, valid: bool) {
        self.state.borrow_mut().can_valid = valid;
    }

    /// A frame that marks `address` as received
    pub fn frame(address: u32) -> CanFrame {
        CanFrame::new(0, 0, address, Vec::new())
    }
}

impl SignalSource for MockSignalSource {
    fn update(&mut self, frames: &[CanFrame]) -> Vec<u32> {
        let state = self.state.borrow();
        let mut changed = Vec::new();
        for frame in frames {
            if state.index.contains_key(&frame.can_id) && !changed.contains(&frame.can_id) {
                changed.push(frame.can_id);
            }
        }
        changed
    }

    fn can_valid(&self) -> bool {
        self.state.borrow().can_valid
    }

    fn resolve(&self, address: u32, signal: &str) -> Result<SignalHandle> {
        let state = self.state.borrow();
        let idx = *state
            .index
            .get(&address)
            .ok_or(FusionError::MessageNotFound(address))?;
        let pos = state.messages[idx]
            .names
            .iter()
            .position(|n| n == signal)
            .ok_or_else(|| FusionError::SignalNotFound {
                address,
                signal: signal.to_string(),
            })?;
        Ok(SignalHandle::new(idx, pos))
    }

    fn value(&self, handle: SignalHandle) -> f64 {
        let (slot, signal) = handle.parts();
        self.state
            .borrow()
            .messages
            .get(slot)
            .and_then(|m| m.values.get(signal))
            .copied()
            .unwrap_or(0.0)
    }
}

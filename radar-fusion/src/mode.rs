//! Mode resolution
//!
//! Decides once, at construction, which radar topology feeds the point table:
//! per-corner radar tracks, the enhanced single-object message, or the basic
//! object reported by the cruise controller. The result fixes the message
//! layout, the address range and the trigger message for the whole session.

use crate::config::CapabilityFlags;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Classic-bus track messages
pub const RADAR_START_ADDR: u32 = 0x500;
pub const RADAR_MSG_COUNT: u32 = 32;
/// CAN-FD grouped addressing, two targets per frame
pub const RADAR_START_ADDR_CANFD1: u32 = 0x210;
pub const RADAR_MSG_COUNT1: u32 = 16;
/// CAN-FD ungrouped addressing
pub const RADAR_START_ADDR_CANFD2: u32 = 0x3A5;
pub const RADAR_MSG_COUNT2: u32 = 32;

/// Enhanced single-object message (`ESCC`), also the trigger in that mode
pub const ESCC_ADDR: u32 = 0x2AB;
/// Cruise-controller object message on the classic bus (`SCC11`)
pub const SCC11_ADDR: u32 = 0x420;
/// Cruise-controller object message on CAN-FD (`SCC_CONTROL`)
pub const SCC_CONTROL_ADDR: u32 = 0x1A0;

/// Reserved identity written by the basic single-object path
pub const SCC_TID: u32 = 0;
/// Reserved identity written by the enhanced single-object path
pub const ESCC_TID: u32 = 1;
/// First per-object identity
pub const TRACK_ID_OFFSET: u32 = 32;

/// Which source populates the point table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadarMode {
    Track,
    EnhancedSingle,
    BasicSingle,
}

/// Per-object message layout for the resolved bus variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackLayout {
    /// Classic bus: azimuth/range with an enumerated track state
    Polar,
    /// CAN-FD: Cartesian fields with a validity counter
    Native,
    /// CAN-FD grouped: two Cartesian targets per frame
    DoublePacked,
}

/// Outcome of mode resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub mode: RadarMode,
    pub layout: TrackLayout,
    pub start_addr: u32,
    pub msg_count: u32,
    /// Message whose arrival commits a track-transport cycle
    pub trigger: u32,
    pub can_fd: bool,
}

impl Resolution {
    /// Resolve the session mode
    ///
    /// `track_dbc_available` tells whether the per-corner message layouts are
    /// known for this vehicle. Resolution always succeeds.
    pub fn resolve(flags: &CapabilityFlags, track_dbc_available: bool) -> Self {
        let (start_addr, msg_count, layout) = bus_variant(flags);

        let mode = if flags.radar_tracks && track_dbc_available {
            RadarMode::Track
        } else if flags.enhanced_scc {
            RadarMode::EnhancedSingle
        } else {
            RadarMode::BasicSingle
        };

        let trigger = match mode {
            RadarMode::EnhancedSingle => ESCC_ADDR,
            _ => start_addr + msg_count - 1,
        };

        if flags.radar_tracks && !track_dbc_available {
            log::warn!("Radar tracks requested but no track message layouts are available");
        }
        log::info!(
            "Radar mode {:?} (layout {:?}, 0x{:X}+{}, trigger 0x{:X})",
            mode,
            layout,
            start_addr,
            msg_count,
            trigger
        );

        Self {
            mode,
            layout,
            start_addr,
            msg_count,
            trigger,
            can_fd: flags.can_fd,
        }
    }

    /// True when one frame carries two physical targets
    pub fn double_packed(&self) -> bool {
        self.layout == TrackLayout::DoublePacked
    }

    /// Per-object message addresses
    pub fn addresses(&self) -> Range<u32> {
        self.start_addr..self.start_addr + self.msg_count
    }

    /// Number of per-object identities in the point table
    pub fn track_count(&self) -> u32 {
        if self.double_packed() {
            self.msg_count * 2
        } else {
            self.msg_count
        }
    }

    /// Per-object identities in the point table
    pub fn track_ids(&self) -> Range<u32> {
        TRACK_ID_OFFSET..TRACK_ID_OFFSET + self.track_count()
    }

    /// Whether commits are driven by the track-transport trigger
    pub fn uses_track_transport(&self) -> bool {
        self.mode != RadarMode::BasicSingle
    }

    /// Address of the cruise-controller object message for this bus
    pub fn scc_addr(&self) -> u32 {
        if self.can_fd {
            SCC_CONTROL_ADDR
        } else {
            SCC11_ADDR
        }
    }
}

/// Track message block and layout selected by the bus format
fn bus_variant(flags: &CapabilityFlags) -> (u32, u32, TrackLayout) {
    match (flags.can_fd, flags.radar_group1) {
        (false, _) => (RADAR_START_ADDR, RADAR_MSG_COUNT, TrackLayout::Polar),
        (true, true) => (RADAR_START_ADDR_CANFD1, RADAR_MSG_COUNT1, TrackLayout::DoublePacked),
        (true, false) => (RADAR_START_ADDR_CANFD2, RADAR_MSG_COUNT2, TrackLayout::Native),
    }
}

/// Per-object message addresses the bus format would use, before resolution
pub fn track_addresses(flags: &CapabilityFlags) -> Range<u32> {
    let (start, count, _) = bus_variant(flags);
    start..start + count
}

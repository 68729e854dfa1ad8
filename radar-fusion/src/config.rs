//! Fusion configuration types
//!
//! Capability flags describe the vehicle's radar topology and are fixed for the
//! lifetime of a fusion core. Bus numbers and message rates only matter to the
//! DBC-backed signal sources.

use serde::{Deserialize, Serialize};

/// Vehicle radar capabilities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityFlags {
    /// Higher-bandwidth CAN-FD frame format instead of classic CAN
    #[serde(default)]
    pub can_fd: bool,

    /// CAN-FD grouped addressing (two targets per track frame)
    #[serde(default)]
    pub radar_group1: bool,

    /// Per-corner radar tracking enabled
    #[serde(default)]
    pub radar_tracks: bool,

    /// Fall back to the enhanced single-object message
    #[serde(default)]
    pub enhanced_scc: bool,

    /// Radar hardware disabled; the core never emits
    #[serde(default)]
    pub radar_unavailable: bool,
}

/// CAN bus numbers the sources listen on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Per-corner track messages
    #[serde(default = "default_track_bus")]
    pub track: u8,

    /// Enhanced single-object message
    #[serde(default)]
    pub escc: u8,

    /// Cruise-controller object message
    #[serde(default)]
    pub forward: u8,
}

fn default_track_bus() -> u8 {
    1
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            track: default_track_bus(),
            escc: 0,
            forward: 0,
        }
    }
}

/// Configuration for a fusion core
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    #[serde(default)]
    pub capabilities: CapabilityFlags,

    #[serde(default)]
    pub buses: BusConfig,

    /// Message rates used for bus-validity timeouts
    #[serde(default)]
    pub rates: RateConfig,
}

/// Expected message rates (Hz)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateConfig {
    #[serde(default = "default_track_hz")]
    pub track_hz: f64,

    #[serde(default = "default_single_object_hz")]
    pub single_object_hz: f64,
}

fn default_track_hz() -> f64 {
    20.0
}

fn default_single_object_hz() -> f64 {
    50.0
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            track_hz: default_track_hz(),
            single_object_hz: default_single_object_hz(),
        }
    }
}

impl FusionConfig {
    /// Create a configuration with default settings (classic bus, basic object only)
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: select the CAN-FD frame format
    pub fn with_can_fd(mut self, enabled: bool) -> Self {
        self.capabilities.can_fd = enabled;
        self
    }

    /// Builder method: select CAN-FD grouped addressing
    pub fn with_radar_group1(mut self, enabled: bool) -> Self {
        self.capabilities.radar_group1 = enabled;
        self
    }

    /// Builder method: enable per-corner radar tracks
    pub fn with_radar_tracks(mut self, enabled: bool) -> Self {
        self.capabilities.radar_tracks = enabled;
        self
    }

    /// Builder method: enable the enhanced single-object fallback
    pub fn with_enhanced_scc(mut self, enabled: bool) -> Self {
        self.capabilities.enhanced_scc = enabled;
        self
    }

    /// Builder method: mark the radar hardware unavailable
    pub fn with_radar_unavailable(mut self, unavailable: bool) -> Self {
        self.capabilities.radar_unavailable = unavailable;
        self
    }

    /// Builder method: set bus numbers
    pub fn with_buses(mut self, buses: BusConfig) -> Self {
        self.buses = buses;
        self
    }
}

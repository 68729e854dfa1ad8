//! Core types for the radar fusion library
//!
//! This module defines the frames the fusion core consumes, the tracked points it
//! emits, and the error type shared by every module.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Timestamp type used throughout the library
pub type Timestamp = DateTime<Utc>;

/// Result type for fusion operations
pub type Result<T> = std::result::Result<T, FusionError>;

/// Raw CAN frame handed to the signal sources
#[derive(Debug, Clone, PartialEq)]
pub struct CanFrame {
    /// Timestamp in nanoseconds since epoch
    pub timestamp_ns: u64,
    /// CAN bus number (e.g., 0, 1, 2...)
    pub channel: u8,
    /// CAN message ID (11-bit or 29-bit)
    pub can_id: u32,
    /// Frame data bytes (0-8 bytes for classic CAN, up to 64 for CAN-FD)
    pub data: Vec<u8>,
    /// True if this is a CAN-FD frame
    pub is_fd: bool,
}

impl CanFrame {
    /// Create a classic frame
    pub fn new(timestamp_ns: u64, channel: u8, can_id: u32, data: Vec<u8>) -> Self {
        Self {
            timestamp_ns,
            channel,
            can_id,
            data,
            is_fd: false,
        }
    }

    /// Convert timestamp from nanoseconds to DateTime<Utc>
    pub fn timestamp(&self) -> Timestamp {
        let secs = (self.timestamp_ns / 1_000_000_000) as i64;
        let nsecs = (self.timestamp_ns % 1_000_000_000) as u32;
        DateTime::from_timestamp(secs, nsecs).unwrap_or_default()
    }
}

/// Errors raised while building or feeding the fusion pipeline
#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    #[error("Failed to parse log file: {0}")]
    LogParseError(String),

    #[error("Failed to parse DBC file: {0}")]
    DbcParseError(String),

    #[error("Message not found: CAN ID 0x{0:X}")]
    MessageNotFound(u32),

    #[error("Signal not found: {signal} in message 0x{address:X}")]
    SignalNotFound { address: u32, signal: String },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// One entry of the point table
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedPoint {
    /// Stable identity, never reassigned
    pub track_id: u32,
    /// True iff this cycle's data passed validity gating
    pub measured: bool,
    /// Longitudinal distance (m)
    pub d_rel: f64,
    /// Lateral offset (m), left is negative
    pub y_rel: f64,
    /// Relative longitudinal velocity (m/s)
    pub v_rel: f64,
    /// Absolute object velocity, `v_rel + v_ego`
    pub v_lead: f64,
    /// Relative acceleration, NaN when unknown
    pub a_rel: f64,
    /// Lateral velocity (m/s)
    pub yv_rel: f64,
}

impl TrackedPoint {
    /// A point in the canonical cleared state
    pub fn cleared(track_id: u32, v_ego: f64) -> Self {
        Self {
            track_id,
            measured: false,
            d_rel: 0.0,
            y_rel: 0.0,
            v_rel: 0.0,
            v_lead: v_ego,
            a_rel: f64::NAN,
            yv_rel: 0.0,
        }
    }

    /// Reset this point to the cleared state, keeping its identity
    pub fn clear(&mut self, v_ego: f64) {
        *self = Self::cleared(self.track_id, v_ego);
    }

    /// Relative acceleration, if the source reported one
    pub fn acceleration(&self) -> Option<f64> {
        if self.a_rel.is_nan() {
            None
        } else {
            Some(self.a_rel)
        }
    }

    /// Check the cleared-state invariant for an unmeasured point
    pub fn is_cleared(&self, v_ego: f64) -> bool {
        !self.measured
            && self.d_rel == 0.0
            && self.y_rel == 0.0
            && self.v_rel == 0.0
            && self.v_lead == v_ego
            && self.a_rel.is_nan()
            && self.yv_rel == 0.0
    }
}

/// Error flags attached to an emitted cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarErrors {
    /// The source whose extraction ran this cycle reported an invalid bus
    pub can_error: bool,
}

/// One committed cycle: full table snapshot plus error flags
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RadarData {
    pub points: Vec<TrackedPoint>,
    pub errors: RadarErrors,
}

impl RadarData {
    /// Look up a point by track id
    pub fn point(&self, track_id: u32) -> Option<&TrackedPoint> {
        self.points.iter().find(|p| p.track_id == track_id)
    }

    /// Iterate over the points that passed validity gating this cycle
    pub fn measured(&self) -> impl Iterator<Item = &TrackedPoint> {
        self.points.iter().filter(|p| p.measured)
    }
}

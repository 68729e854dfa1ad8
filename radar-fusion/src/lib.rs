//! Radar Point Fusion Library
//!
//! Turns per-message CAN signal values from a vehicle's radar into a fixed-size
//! table of tracked points for lead detection and path planning.
//!
//! # Architecture
//!
//! - A mode is resolved once from capability flags: per-corner radar tracks,
//!   the enhanced single-object message, or the basic cruise-controller object
//! - Signal sources decode CAN frames and report which messages changed
//! - The fusion core commits a table update only when a complete radar scan
//!   has arrived, then emits the full table plus a bus-error flag
//!
//! The library does NOT:
//! - Select a lead vehicle or plan a path
//! - Read CAN hardware (frames are handed in by the caller)
//!
//! # Example Usage
//!
//! ```no_run
//! use radar_fusion::{CanFrame, FusionConfig, FusionCore, SignalDatabase};
//! use std::path::Path;
//!
//! let mut db = SignalDatabase::new();
//! for message in radar_fusion::signals::dbc::parse_dbc_file(Path::new("radar.dbc")).unwrap() {
//!     db.add_message(message);
//! }
//!
//! let config = FusionConfig::new().with_radar_tracks(true);
//! let mut core = FusionCore::from_database(&config, &db).unwrap();
//!
//! let frames: Vec<CanFrame> = Vec::new();
//! if let Some(data) = core.update(&frames, 22.0) {
//!     for point in data.measured() {
//!         println!("track {} at {:.1} m", point.track_id, point.d_rel);
//!     }
//! }
//! ```

// Public modules
pub mod config;
pub mod extract;
pub mod formats;
pub mod fusion;
pub mod message_decoder;
pub mod mock;
pub mod mode;
pub mod point_table;
pub mod signals;
pub mod source;
pub mod types;

// Re-export main types for convenience
pub use config::{BusConfig, CapabilityFlags, FusionConfig, RateConfig};
pub use formats::CandumpParser;
pub use fusion::FusionCore;
pub use message_decoder::MessageDecoder;
pub use mode::{RadarMode, Resolution, TrackLayout};
pub use point_table::PointTable;
pub use signals::{DatabaseStats, SignalDatabase};
pub use source::{CanSignalSource, MessageSubscription, SignalHandle, SignalSource};
pub use types::{CanFrame, FusionError, RadarData, RadarErrors, Result, Timestamp, TrackedPoint};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Log file format parsers
//!
//! Recorded CAN traffic is replayed through the fusion core from log files.
//! Only the SocketCAN candump text format is supported.

pub mod candump;

pub use candump::{CandumpFrameIterator, CandumpParser};

//! Signal database and DBC parser
//!
//! This module contains the DBC parser and the database the signal sources
//! resolve their message layouts from.

pub mod dbc;
pub mod database;

// Re-export key types for convenience
pub use database::{
    ByteOrder, DatabaseStats, MessageDefinition, SignalDatabase, SignalDefinition, ValueType,
};

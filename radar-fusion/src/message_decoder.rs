//! Message Decoding Engine
//!
//! Extracts physical signal values from raw CAN frame payloads based on the
//! message layouts in the signal database. Handles bit extraction, endianness,
//! sign extension and factor/offset scaling.

use crate::signals::database::{ByteOrder, MessageDefinition, SignalDefinition, ValueType};
use crate::types::{FusionError, Result};

/// Raw values are assembled in a `u64`
const MAX_SIGNAL_BITS: u16 = 64;

/// Message decoder - extracts signals from CAN frame payloads
pub struct MessageDecoder;

impl MessageDecoder {
    /// Decode every signal of `message_def` into `values`, in definition order
    ///
    /// `values` must hold one slot per signal. On error no slot is modified, so
    /// the previously decoded values stay in place.
    pub fn decode_into(data: &[u8], message_def: &MessageDefinition, values: &mut [f64]) -> Result<()> {
        debug_assert_eq!(values.len(), message_def.signals.len());

        // Check every signal fits before touching the slots
        for signal in &message_def.signals {
            Self::check_fits(data, signal)?;
        }

        for (slot, signal) in values.iter_mut().zip(&message_def.signals) {
            *slot = Self::physical_value(data, signal);
        }
        Ok(())
    }

    /// Decode every signal of `message_def` into a fresh vector
    pub fn decode_physical(data: &[u8], message_def: &MessageDefinition) -> Result<Vec<f64>> {
        let mut values = vec![0.0; message_def.signals.len()];
        Self::decode_into(data, message_def, &mut values)?;
        Ok(values)
    }

    fn physical_value(data: &[u8], signal: &SignalDefinition) -> f64 {
        let raw = Self::extract_signal_value(data, signal);
        signal.offset + signal.factor * (raw as f64)
    }

    fn check_fits(data: &[u8], signal: &SignalDefinition) -> Result<()> {
        if signal.length > MAX_SIGNAL_BITS {
            return Err(FusionError::InvalidData(format!(
                "Signal '{}' is {} bits long, at most {} are supported",
                signal.name, signal.length, MAX_SIGNAL_BITS
            )));
        }

        let last_byte = match signal.byte_order {
            ByteOrder::LittleEndian => (signal.start_bit as usize + signal.length as usize).saturating_sub(1) / 8,
            ByteOrder::BigEndian => Self::motorola_last_bit(signal.start_bit as usize, signal.length as usize) / 8,
        };

        if last_byte >= data.len() {
            return Err(FusionError::InvalidData(format!(
                "Signal '{}' requires {} bytes but frame only has {} bytes",
                signal.name,
                last_byte + 1,
                data.len()
            )));
        }
        Ok(())
    }

    /// Extract the raw (unscaled) value of one signal
    fn extract_signal_value(data: &[u8], signal: &SignalDefinition) -> i64 {
        let start_bit = signal.start_bit as usize;
        let length = signal.length as usize;

        let raw_value = match signal.byte_order {
            ByteOrder::LittleEndian => Self::extract_little_endian(data, start_bit, length),
            ByteOrder::BigEndian => Self::extract_big_endian(data, start_bit, length),
        };

        match signal.value_type {
            ValueType::Unsigned => raw_value as i64,
            ValueType::Signed => Self::sign_extend(raw_value, length),
        }
    }

    /// Extract signal with little-endian (Intel) byte order
    ///
    /// Start bit points to the LSB; bits are numbered LSB to MSB within each byte.
    fn extract_little_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
        let mut result: u64 = 0;

        for i in 0..length {
            let bit_pos = start_bit + i;
            if let Some(byte) = data.get(bit_pos / 8) {
                let bit_value = (byte >> (bit_pos % 8)) & 0x01;
                result |= (bit_value as u64) << i;
            }
        }

        result
    }

    /// Extract signal with big-endian (Motorola) byte order
    ///
    /// Start bit points to the MSB using the DBC sawtooth numbering: bit 7 of
    /// byte 0 is followed by bit 6, ..., bit 0, then bit 15 (MSB of byte 1).
    fn extract_big_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
        let mut result: u64 = 0;
        let mut bit_pos = start_bit;

        for _ in 0..length {
            let bit_value = data
                .get(bit_pos / 8)
                .map(|byte| (byte >> (bit_pos % 8)) & 0x01)
                .unwrap_or(0);
            result = (result << 1) | bit_value as u64;
            bit_pos = Self::motorola_next(bit_pos);
        }

        result
    }

    fn motorola_next(bit_pos: usize) -> usize {
        if bit_pos % 8 == 0 {
            bit_pos + 15
        } else {
            bit_pos - 1
        }
    }

    fn motorola_last_bit(start_bit: usize, length: usize) -> usize {
        (1..length).fold(start_bit, |pos, _| Self::motorola_next(pos))
    }

    /// Sign-extend a value from N bits to 64 bits
    fn sign_extend(value: u64, bit_length: usize) -> i64 {
        if bit_length == 0 || bit_length >= 64 {
            return value as i64;
        }

        let sign_bit = 1u64 << (bit_length - 1);
        if (value & sign_bit) != 0 {
            let mask = !0u64 << bit_length;
            (value | mask) as i64
        } else {
            value as i64
        }
    }
}

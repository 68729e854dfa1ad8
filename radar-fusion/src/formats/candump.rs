//! candump log parser
//!
//! Parses the text format written by `candump -l` (SocketCAN can-utils):
//!
//! ```text
//! (1436509052.249713) can0 500#1122334455667788
//! (1436509052.250102) can1 3A5##1DEADBEEF
//! ```
//!
//! `ID#DATA` is a classic frame and `ID##<flags>DATA` a CAN-FD frame. The bus
//! number is taken from the trailing digits of the interface name. Remote
//! frames (`ID#R`) carry no payload and are skipped.

use crate::types::{CanFrame, FusionError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// candump log parser
pub struct CandumpParser;

impl CandumpParser {
    /// Open a candump log and return an iterator over its frames
    pub fn parse(path: &Path) -> Result<CandumpFrameIterator<BufReader<File>>> {
        log::info!("Parsing candump log: {:?}", path);

        let file = File::open(path).map_err(|e| {
            FusionError::LogParseError(format!("Failed to open log file {:?}: {}", path, e))
        })?;

        Ok(Self::from_reader(BufReader::new(file)))
    }

    /// Iterate over frames from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R) -> CandumpFrameIterator<R> {
        CandumpFrameIterator {
            lines: reader.lines(),
            line_no: 0,
            skipped_remote: 0,
        }
    }
}

/// Iterator over CAN frames from a candump log
pub struct CandumpFrameIterator<R> {
    lines: Lines<R>,
    line_no: usize,
    skipped_remote: usize,
}

impl<R> CandumpFrameIterator<R> {
    /// Remote frames skipped so far
    pub fn skipped_remote(&self) -> usize {
        self.skipped_remote
    }
}

impl<R: BufRead> Iterator for CandumpFrameIterator<R> {
    type Item = Result<CanFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("//") {
                continue;
            }

            match parse_line(trimmed) {
                Ok(Some(frame)) => return Some(Ok(frame)),
                Ok(None) => {
                    self.skipped_remote += 1;
                    continue;
                }
                Err(e) => {
                    return Some(Err(FusionError::LogParseError(format!(
                        "line {}: {}",
                        self.line_no, e
                    ))))
                }
            }
        }
    }
}

/// Parse one candump line; `Ok(None)` for remote frames
pub fn parse_line(line: &str) -> std::result::Result<Option<CanFrame>, String> {
    let mut fields = line.split_whitespace();
    let (stamp, iface, body) = match (fields.next(), fields.next(), fields.next()) {
        (Some(stamp), Some(iface), Some(body)) => (stamp, iface, body),
        _ => return Err(format!("expected '(time) iface id#data', got '{}'", line)),
    };

    let timestamp_ns = parse_timestamp(stamp)?;
    let channel = parse_channel(iface)?;

    let (id_text, payload) = body
        .split_once('#')
        .ok_or_else(|| format!("missing '#' in '{}'", body))?;
    let can_id = u32::from_str_radix(id_text, 16).map_err(|e| format!("bad CAN ID '{}': {}", id_text, e))?;

    let (is_fd, data_text) = match payload.strip_prefix('#') {
        // First character after '##' is the FD flags nibble
        Some(fd) => (true, fd.get(1..).unwrap_or("")),
        None if payload.starts_with('R') => return Ok(None),
        None => (false, payload),
    };

    Ok(Some(CanFrame {
        timestamp_ns,
        channel,
        can_id,
        data: parse_hex(data_text)?,
        is_fd,
    }))
}

fn parse_timestamp(stamp: &str) -> std::result::Result<u64, String> {
    let inner = stamp
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| format!("bad timestamp '{}'", stamp))?;
    let (secs, frac) = inner.split_once('.').unwrap_or((inner, "0"));

    let secs: u64 = secs.parse().map_err(|_| format!("bad timestamp '{}'", stamp))?;
    // Right-pad the fraction to nanoseconds
    let digits: String = frac.chars().chain(std::iter::repeat('0')).take(9).collect();
    let nanos: u64 = digits.parse().map_err(|_| format!("bad timestamp '{}'", stamp))?;

    secs.checked_mul(1_000_000_000)
        .and_then(|n| n.checked_add(nanos))
        .ok_or_else(|| format!("timestamp out of range '{}'", stamp))
}

fn parse_channel(iface: &str) -> std::result::Result<u8, String> {
    // Start of the trailing digit run, always on a char boundary
    let start = iface
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map_or(iface.len(), |(i, _)| i);
    iface[start..]
        .parse()
        .map_err(|_| format!("no bus number in interface '{}'", iface))
}

fn parse_hex(text: &str) -> std::result::Result<Vec<u8>, String> {
    if text.len() % 2 != 0 {
        return Err(format!("odd-length payload '{}'", text));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|byte| u8::from_str_radix(byte, 16).ok())
                .ok_or_else(|| format!("bad payload '{}'", text))
        })
        .collect()
}

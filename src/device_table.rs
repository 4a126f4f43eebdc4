//! Device table
//!
//! Each device that can raise an interrupt has two pieces of
//! metadata: the address of its interrupt service routine (ISR),
//! which is stored in the interrupt vector table, and the time its
//! driver takes to service a request. The two are loaded from two
//! separate files, one entry per line, where the line order gives
//! the device number (starting from 0).
//!
//! The tables are not required to have the same length. Lookups are
//! checked against each table separately, so an out-of-range device
//! number is reported as an error rather than causing a panic.

use crate::event::Millis;
use crate::utils::get_non_comment;
use std::fs::File;
use std::io::{self, prelude::*, BufReader};
use std::path::Path;
use thiserror::Error;

/// Address of the first entry of the interrupt vector table
pub const VECTOR_TABLE_BASE: u64 = 0x0000;

/// Size in bytes of one entry of the interrupt vector table
pub const VECTOR_SIZE: u64 = 2;

#[derive(Debug, Error)]
pub enum DeviceTableError {
    #[error("line {line}: I/O delay '{value}' is not a non-negative integer")]
    InvalidDelay { line: usize, value: String },
    #[error("device table I/O error: {0}")]
    IoError(String),
}

impl From<io::Error> for DeviceTableError {
    fn from(e: io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

/// Lookup failure for a device number
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("device {device} is invalid for the vector table (it has {len} entries)")]
    VectorOutOfRange { device: usize, len: usize },
    #[error("device {device} is invalid for the delay table (it has {len} entries)")]
    DelayOutOfRange { device: usize, len: usize },
}

/// Per-device ISR addresses and I/O delays, indexed by device number
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceTable {
    isr_addresses: Vec<String>,
    io_delays: Vec<Millis>,
}

impl DeviceTable {
    pub fn new(isr_addresses: Vec<String>, io_delays: Vec<Millis>) -> Self {
        Self {
            isr_addresses,
            io_delays,
        }
    }

    /// Load the vector table and the device (delay) table from file
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        vector_table_path: P,
        device_table_path: Q,
    ) -> Result<Self, DeviceTableError> {
        let vectors = BufReader::new(File::open(vector_table_path)?);
        let delays = BufReader::new(File::open(device_table_path)?);
        Self::from_readers(vectors, delays)
    }

    /// Read one ISR address per line from vectors and one delay per
    /// line from delays. Blank lines and comments are ignored in both.
    pub fn from_readers<V: BufRead, D: BufRead>(
        vectors: V,
        delays: D,
    ) -> Result<Self, DeviceTableError> {
        let mut isr_addresses = Vec::new();
        for line in vectors.lines() {
            let line = line?;
            if let Some(address) = get_non_comment(&line) {
                isr_addresses.push(address.to_string());
            }
        }

        let mut io_delays = Vec::new();
        for (index, line) in delays.lines().enumerate() {
            let line = line?;
            if let Some(value) = get_non_comment(&line) {
                let delay = value.parse::<Millis>().map_err(|_| {
                    DeviceTableError::InvalidDelay {
                        line: index + 1,
                        value: value.to_string(),
                    }
                })?;
                io_delays.push(delay);
            }
        }

        tracing::debug!(
            vectors = isr_addresses.len(),
            delays = io_delays.len(),
            "loaded device table"
        );
        Ok(Self::new(isr_addresses, io_delays))
    }

    /// Address of the ISR for device
    pub fn isr_address(&self, device: usize) -> Result<&str, DeviceError> {
        self.isr_addresses
            .get(device)
            .map(String::as_str)
            .ok_or(DeviceError::VectorOutOfRange {
                device,
                len: self.isr_addresses.len(),
            })
    }

    /// Time taken by the driver of device to service a request
    pub fn io_delay(&self, device: usize) -> Result<Millis, DeviceError> {
        self.io_delays
            .get(device)
            .copied()
            .ok_or(DeviceError::DelayOutOfRange {
                device,
                len: self.io_delays.len(),
            })
    }

    /// Position of the vector for device in the vector table
    pub fn vector_position(device: usize) -> u64 {
        VECTOR_TABLE_BASE + VECTOR_SIZE * device as u64
    }
}

//! Trace file reader
//!
//! A trace file lists the activity of the single simulated process,
//! one event per line:
//!
//! ```text
//! CPU, 50        # run on the processor for 50 ms
//! SYSCALL, 14    # blocking I/O request to device 14
//! END_IO, 14     # device 14 has finished
//! ```
//!
//! The two fields may be separated by a comma, by white space, or
//! both. Anything from a # to the end of the line is a comment, and
//! blank lines are ignored.

use crate::event::{Event, Millis};
use crate::utils::get_non_comment;
use itertools::Itertools;
use std::fs::File;
use std::io::{self, prelude::*, BufReader};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceFileError {
    #[error("line {line}: expected an activity and a value, found '{text}'")]
    MalformedLine { line: usize, text: String },
    #[error("line {line}: activity {activity} is not recognised")]
    UnrecognisedActivity { line: usize, activity: String },
    #[error("line {line}: {activity} value '{value}' is not a non-negative integer")]
    InvalidParameter {
        line: usize,
        activity: String,
        value: String,
    },
    #[error("line {line}: {activity} device {device} is out of range")]
    DeviceOutOfRange {
        line: usize,
        activity: String,
        device: String,
    },
    #[error("trace file I/O error: {0}")]
    IoError(String),
}

impl TraceFileError {
    /// Errors after which the rest of the trace can still be read.
    /// The offending line is skipped.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedLine { .. }
                | Self::UnrecognisedActivity { .. }
                | Self::DeviceOutOfRange { .. }
        )
    }
}

impl From<io::Error> for TraceFileError {
    fn from(e: io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

fn split_fields(text: &str) -> Option<(&str, &str)> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|field| !field.is_empty())
        .collect_tuple()
}

fn parse_value<T: std::str::FromStr>(
    line: usize,
    activity: &str,
    value: &str,
) -> Result<T, TraceFileError> {
    value
        .parse::<T>()
        .map_err(|_| TraceFileError::InvalidParameter {
            line,
            activity: activity.to_string(),
            value: value.to_string(),
        })
}

fn is_integer(value: &str) -> bool {
    let digits = value
        .strip_prefix('-')
        .or_else(|| value.strip_prefix('+'))
        .unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// A device number is any integer. Integers that cannot index a
/// device table (negative, or too large) are out of range rather
/// than invalid.
fn parse_device(
    line: usize,
    activity: &str,
    value: &str,
) -> Result<usize, TraceFileError> {
    match value.parse::<usize>() {
        Ok(device) => Ok(device),
        Err(_) if is_integer(value) => Err(TraceFileError::DeviceOutOfRange {
            line,
            activity: activity.to_string(),
            device: value.to_string(),
        }),
        Err(_) => parse_value(line, activity, value),
    }
}

/// Parse the non-comment part of line number line into an event
pub fn parse_trace_line(
    line: usize,
    text: &str,
) -> Result<Event, TraceFileError> {
    let (activity, value) =
        split_fields(text).ok_or_else(|| TraceFileError::MalformedLine {
            line,
            text: text.to_string(),
        })?;
    match activity {
        "CPU" => Ok(Event::Cpu(parse_value::<Millis>(line, activity, value)?)),
        "SYSCALL" => Ok(Event::Syscall(parse_device(line, activity, value)?)),
        "END_IO" => Ok(Event::EndIo(parse_device(line, activity, value)?)),
        _ => Err(TraceFileError::UnrecognisedActivity {
            line,
            activity: activity.to_string(),
        }),
    }
}

/// Read every event from a trace
///
/// Lines that cannot be understood are skipped with a warning, and
/// lines naming a device that cannot exist are skipped with an
/// error. A recognised activity with a non-integer value stops the
/// read.
pub fn read_trace<R: BufRead>(reader: R) -> Result<Vec<Event>, TraceFileError> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let Some(text) = get_non_comment(&line) else {
            continue;
        };
        match parse_trace_line(index + 1, text) {
            Ok(event) => events.push(event),
            Err(e @ TraceFileError::DeviceOutOfRange { .. }) => {
                tracing::error!("skipping trace line: {e}")
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!("skipping trace line: {e}")
            }
            Err(e) => return Err(e),
        }
    }
    tracing::debug!(events = events.len(), "read trace");
    Ok(events)
}

/// Load a trace file from file
pub fn load_trace<P: AsRef<Path>>(
    trace_file_path: P,
) -> Result<Vec<Event>, TraceFileError> {
    let file = File::open(trace_file_path)?;
    read_trace(BufReader::new(file))
}

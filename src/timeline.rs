//! Execution log
//!
//! The simulator appends structured records to an ExecutionLog.
//! Records are only turned into text when the log is rendered, so
//! the same run can be written in either of the two output formats.

use crate::event::Millis;
use std::fs::File;
use std::io::{self, prelude::*, LineWriter};
use std::path::Path;

/// Text layout used when rendering records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Byte-compatible with existing execution logs. CPU bursts have
    /// no separator before the description, and ISR body lines put
    /// the comma after the space (`"<t>, <d> ,<description>"`).
    #[default]
    Legacy,
    /// Every line is `"<t>, <d>, <description>"`
    Uniform,
}

/// What the processor was doing during a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
    CpuBurst,
    KernelMode,
    ContextSaved,
    FindVector { device: usize, position: u64 },
    LoadIsrAddress(String),
    DeviceDriver,
    EndIoBody { device: usize },
    Iret,
    ContextRestored,
    UserMode,
}

impl Activity {
    /// True for the lines written by the ISR body
    pub fn is_isr_body(&self) -> bool {
        matches!(self, Self::DeviceDriver | Self::EndIoBody { .. })
    }

    fn description(&self) -> String {
        match self {
            Self::CpuBurst => "CPU burst".to_string(),
            Self::KernelMode => "switch to kernel mode".to_string(),
            Self::ContextSaved => "context saved".to_string(),
            Self::FindVector { device, position } => {
                format!("find vector {device} in memory position 0x{position:04X}")
            }
            Self::LoadIsrAddress(address) => {
                format!("load address {address} into the PC")
            }
            Self::DeviceDriver => "call device driver".to_string(),
            Self::EndIoBody { device } => format!("ISR body for end_io{device}"),
            Self::Iret => "IRET".to_string(),
            Self::ContextRestored => "context restored".to_string(),
            Self::UserMode => "switch to user mode".to_string(),
        }
    }
}

/// One line of the execution log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Clock value when the activity started
    pub time: Millis,
    pub duration: Millis,
    pub activity: Activity,
}

impl Record {
    pub fn render(&self, format: LogFormat) -> String {
        let Self {
            time,
            duration,
            activity,
        } = self;
        let description = activity.description();
        match (format, activity) {
            (LogFormat::Legacy, Activity::CpuBurst) => {
                format!("{time}, {duration}{description}")
            }
            (LogFormat::Legacy, a) if a.is_isr_body() => {
                format!("{time}, {duration} ,{description}")
            }
            _ => format!("{time}, {duration}, {description}"),
        }
    }
}

/// Totals reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub user_time: Millis,
    pub overhead_time: Millis,
}

impl Summary {
    pub fn total_time(&self) -> Millis {
        self.user_time.saturating_add(self.overhead_time)
    }
}

/// Append-only sequence of records, plus an optional summary block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionLog {
    records: Vec<Record>,
    summary: Option<Summary>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn set_summary(&mut self, summary: Summary) {
        self.summary = Some(summary);
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    /// Render the whole log as text, one line per record
    pub fn render(&self, format: LogFormat) -> String {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&record.render(format));
            out.push('\n');
        }
        if let Some(summary) = &self.summary {
            out.push_str(&format!(
                "\n=== Simulation Summary ===\n\
                 User time: {} ms\n\
                 Overhead time: {} ms\n\
                 Total time: {} ms\n",
                summary.user_time,
                summary.overhead_time,
                summary.total_time()
            ));
        }
        out
    }

    /// Write the rendered log to a file, replacing any existing file
    pub fn write_to_file<P: AsRef<Path>>(
        &self,
        path: P,
        format: LogFormat,
    ) -> io::Result<()> {
        let file = File::create(path)?;
        let mut file = LineWriter::new(file);
        file.write_all(self.render(format).as_bytes())?;
        file.flush()
    }
}

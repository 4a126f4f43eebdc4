//! Interrupt timeline simulator
//!
//! The simulator models a single user process running on a single
//! CPU. Each trace event is translated into timeline records:
//!
//! * a CPU burst is one record, and advances the clock by its
//!   duration
//! * a system call or an I/O completion is handled as an interrupt,
//!   which is a fixed prologue (switch to kernel mode, save the
//!   context, look up the vector, jump to the ISR), the ISR body
//!   (the device delay, split into chunks of at most `isr_chunk`),
//!   and a fixed epilogue (IRET, restore the context, switch back to
//!   user mode).
//!
//! After the epilogue the clock does not carry on from where the
//! interrupt finished. By default it is reset to 1, which is what
//! existing execution logs contain. It can instead be returned to the
//! value it had when the interrupt started (see EpilogueClock).
//!
//! The simulation is a fold over the events in trace order, so
//! the same trace and device table always give the same log.

use crate::device_table::{DeviceError, DeviceTable};
use crate::event::{Event, Millis};
use crate::timeline::{Activity, ExecutionLog, Record, Summary};
use std::num::NonZeroU64;
use thiserror::Error;

/// How user and overhead time are totalled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Accounting {
    /// A system call charges IRET, context restore and the mode
    /// switch. An I/O completion charges two context switches and
    /// one ISR chunk. Matches existing summaries.
    #[default]
    Legacy,
    /// Every record produced while handling an interrupt is charged
    /// as overhead
    Measured,
    /// No totals and no summary block
    Off,
}

/// Clock value after the interrupt epilogue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EpilogueClock {
    /// The clock is set to 1 after every interrupt
    #[default]
    ResetToOne,
    /// The clock goes back to its value before the interrupt
    RestorePreInterrupt,
}

/// Fixed costs and policies of the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    /// Time to save or to restore the processor context
    pub context_time: Millis,
    /// Largest piece of ISR body work written as one record
    pub isr_chunk: NonZeroU64,
    pub accounting: Accounting,
    pub epilogue_clock: EpilogueClock,
}

pub const DEFAULT_CONTEXT_TIME: Millis = 10;
pub const DEFAULT_ISR_CHUNK: NonZeroU64 = match NonZeroU64::new(40) {
    Some(chunk) => chunk,
    None => panic!("ISR chunk must be non-zero"),
};

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            context_time: DEFAULT_CONTEXT_TIME,
            isr_chunk: DEFAULT_ISR_CHUNK,
            accounting: Accounting::default(),
            epilogue_clock: EpilogueClock::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("{event} skipped: {source}")]
    InvalidDevice { event: Event, source: DeviceError },
}

/// The two interrupt activities differ only in the ISR body
#[derive(Debug, Clone, Copy)]
enum Interrupt {
    Syscall,
    EndIo,
}

impl Interrupt {
    fn body_activity(self, device: usize) -> Activity {
        match self {
            Self::Syscall => Activity::DeviceDriver,
            Self::EndIo => Activity::EndIoBody { device },
        }
    }
}

#[derive(Debug)]
pub struct Simulator<'a> {
    config: SimConfig,
    devices: &'a DeviceTable,
    clock: Millis,
    log: ExecutionLog,
    totals: Summary,
}

impl<'a> Simulator<'a> {
    pub fn new(config: SimConfig, devices: &'a DeviceTable) -> Self {
        Self {
            config,
            devices,
            clock: 0,
            log: ExecutionLog::new(),
            totals: Summary::default(),
        }
    }

    pub fn clock(&self) -> Millis {
        self.clock
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    /// Running totals (all zero when accounting is off)
    pub fn totals(&self) -> Summary {
        self.totals
    }

    /// Simulate a single event
    ///
    /// If the event names a device that is missing from either
    /// device table, nothing is appended to the log, the clock and
    /// totals are unchanged, and an error is returned.
    pub fn step(&mut self, event: &Event) -> Result<(), SimError> {
        tracing::trace!(clock = self.clock, %event, "step");
        match *event {
            Event::Cpu(duration) => {
                self.cpu_burst(duration);
                Ok(())
            }
            Event::Syscall(device) => {
                self.interrupt(event, device, Interrupt::Syscall)
            }
            Event::EndIo(device) => {
                self.interrupt(event, device, Interrupt::EndIo)
            }
        }
    }

    /// Simulate every event in order and return the finished log
    ///
    /// Events that fail are reported and skipped, and the simulation
    /// carries on with the next event.
    pub fn run<'e, I>(mut self, events: I) -> ExecutionLog
    where
        I: IntoIterator<Item = &'e Event>,
    {
        for event in events {
            if let Err(e) = self.step(event) {
                tracing::error!("{e}");
            }
        }
        self.finish()
    }

    /// End the simulation, attaching the summary if accounting is on
    pub fn finish(mut self) -> ExecutionLog {
        if self.config.accounting != Accounting::Off {
            tracing::info!(
                user_time = self.totals.user_time,
                overhead_time = self.totals.overhead_time,
                "simulation finished"
            );
            self.log.set_summary(self.totals);
        }
        self.log
    }

    /// Append a record starting at the current time and advance the
    /// clock past it. The clock saturates rather than wrapping.
    fn emit(&mut self, duration: Millis, activity: Activity) {
        self.log.push(Record {
            time: self.clock,
            duration,
            activity,
        });
        self.clock = self.clock.saturating_add(duration);
    }

    fn charge_user(&mut self, duration: Millis) {
        if self.config.accounting != Accounting::Off {
            self.totals.user_time =
                self.totals.user_time.saturating_add(duration);
        }
    }

    fn charge_overhead(&mut self, duration: Millis) {
        if self.config.accounting != Accounting::Off {
            self.totals.overhead_time =
                self.totals.overhead_time.saturating_add(duration);
        }
    }

    fn cpu_burst(&mut self, duration: Millis) {
        self.emit(duration, Activity::CpuBurst);
        self.charge_user(duration);
    }

    fn interrupt(
        &mut self,
        event: &Event,
        device: usize,
        kind: Interrupt,
    ) -> Result<(), SimError> {
        let invalid = |source| SimError::InvalidDevice {
            event: *event,
            source,
        };
        let isr_address =
            self.devices.isr_address(device).map_err(invalid)?.to_string();
        let io_delay = self.devices.io_delay(device).map_err(invalid)?;

        let start = self.clock;
        let records_before = self.log.len();

        self.prologue(device, isr_address);
        self.isr_body(device, io_delay, kind);
        self.epilogue(start);

        match self.config.accounting {
            Accounting::Legacy => {
                let context = self.config.context_time;
                let charged = match kind {
                    Interrupt::Syscall => context.saturating_add(2),
                    Interrupt::EndIo => context
                        .saturating_mul(2)
                        .saturating_add(self.config.isr_chunk.get()),
                };
                self.charge_overhead(charged);
            }
            Accounting::Measured => {
                let charged = self.log.records()[records_before..]
                    .iter()
                    .fold(0, |total: Millis, record| {
                        total.saturating_add(record.duration)
                    });
                self.charge_overhead(charged);
            }
            Accounting::Off => (),
        }
        Ok(())
    }

    /// Switch to kernel mode, save the context and jump to the ISR
    /// through the vector table
    fn prologue(&mut self, device: usize, isr_address: String) {
        self.emit(1, Activity::KernelMode);
        self.emit(self.config.context_time, Activity::ContextSaved);
        let position = DeviceTable::vector_position(device);
        self.emit(1, Activity::FindVector { device, position });
        self.emit(1, Activity::LoadIsrAddress(isr_address));
    }

    /// Run the device driver for io_delay, one record per chunk
    fn isr_body(&mut self, device: usize, io_delay: Millis, kind: Interrupt) {
        let chunk_size = self.config.isr_chunk.get();
        let mut remaining = io_delay;
        while remaining > 0 {
            let chunk = remaining.min(chunk_size);
            self.emit(chunk, kind.body_activity(device));
            remaining -= chunk;
        }
    }

    /// Return from the interrupt, restore the context and switch back
    /// to user mode. start is the clock value when the interrupt began.
    fn epilogue(&mut self, start: Millis) {
        self.emit(1, Activity::Iret);
        self.emit(self.config.context_time, Activity::ContextRestored);
        self.emit(1, Activity::UserMode);
        self.clock = match self.config.epilogue_clock {
            EpilogueClock::ResetToOne => 1,
            EpilogueClock::RestorePreInterrupt => start,
        };
    }
}

/// Simulate a whole trace against a device table
pub fn simulate(
    config: SimConfig,
    devices: &DeviceTable,
    events: &[Event],
) -> ExecutionLog {
    Simulator::new(config, devices).run(events)
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::timeline::LogFormat;
    use crate::trace_file::read_trace;

    fn devices(delays: Vec<Millis>) -> DeviceTable {
        let vectors = (0..delays.len())
            .map(|n| format!("0x{:04X}", 0x1000 + 0x100 * n))
            .collect();
        DeviceTable::new(vectors, delays)
    }

    fn chunk(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap()
    }

    fn body_durations(log: &ExecutionLog) -> Vec<Millis> {
        log.records()
            .iter()
            .filter(|r| r.activity.is_isr_body())
            .map(|r| r.duration)
            .collect()
    }

    #[test]
    fn cpu_burst_advances_clock_by_duration() {
        let table = devices(vec![]);
        let mut sim = Simulator::new(SimConfig::default(), &table);
        for duration in [0, 1, 37, 500] {
            let before = sim.clock();
            let len = sim.log().len();
            sim.step(&Event::Cpu(duration)).unwrap();
            assert_eq!(sim.clock(), before + duration);
            assert_eq!(sim.log().len(), len + 1);
        }
        assert_eq!(sim.totals().user_time, 538);
    }

    #[test]
    fn body_chunks_cover_the_delay() {
        let config = SimConfig {
            isr_chunk: chunk(40),
            ..SimConfig::default()
        };
        for delay in [0u64, 1, 39, 40, 41, 80, 75, 263] {
            let table = devices(vec![delay]);
            for event in [Event::Syscall(0), Event::EndIo(0)] {
                let mut sim = Simulator::new(config, &table);
                sim.step(&event).unwrap();
                let chunks = body_durations(sim.log());
                assert_eq!(chunks.len() as u64, delay.div_ceil(40));
                assert_eq!(chunks.iter().sum::<Millis>(), delay);
                assert!(chunks.iter().all(|&c| c > 0 && c <= 40));
            }
        }
    }

    #[test]
    fn clock_is_one_after_every_interrupt() {
        let table = devices(vec![75, 0]);
        let mut sim = Simulator::new(SimConfig::default(), &table);
        for event in [
            Event::Cpu(500),
            Event::Syscall(0),
            Event::Cpu(20),
            Event::EndIo(1),
            Event::EndIo(0),
        ] {
            sim.step(&event).unwrap();
            if event.device().is_some() {
                assert_eq!(sim.clock(), 1);
            }
        }
    }

    #[test]
    fn restore_pre_interrupt_clock() {
        let table = devices(vec![75]);
        let config = SimConfig {
            epilogue_clock: EpilogueClock::RestorePreInterrupt,
            ..SimConfig::default()
        };
        let mut sim = Simulator::new(config, &table);
        sim.step(&Event::Cpu(120)).unwrap();
        sim.step(&Event::Syscall(0)).unwrap();
        assert_eq!(sim.clock(), 120);
    }

    #[test]
    fn out_of_range_device_leaves_state_untouched() {
        let table = devices(vec![110, 150]);
        let mut sim = Simulator::new(SimConfig::default(), &table);
        sim.step(&Event::Cpu(10)).unwrap();
        let len = sim.log().len();
        let err = sim.step(&Event::Syscall(5)).unwrap_err();
        assert_eq!(
            err,
            SimError::InvalidDevice {
                event: Event::Syscall(5),
                source: DeviceError::VectorOutOfRange { device: 5, len: 2 },
            }
        );
        assert_eq!(sim.log().len(), len);
        assert_eq!(sim.clock(), 10);
        assert_eq!(sim.totals().overhead_time, 0);
    }

    #[test]
    fn missing_delay_is_checked_before_the_prologue() {
        // Vector table has an entry for device 1 but the delay table
        // does not
        let table = DeviceTable::new(
            vec!["0x1000".to_string(), "0x1100".to_string()],
            vec![40],
        );
        let mut sim = Simulator::new(SimConfig::default(), &table);
        let err = sim.step(&Event::EndIo(1)).unwrap_err();
        assert!(matches!(
            err,
            SimError::InvalidDevice {
                source: DeviceError::DelayOutOfRange { .. },
                ..
            }
        ));
        assert!(sim.log().is_empty());
        assert_eq!(sim.clock(), 0);
    }

    #[test]
    fn run_continues_after_invalid_device() {
        let table = devices(vec![110, 150]);
        let events = [Event::Cpu(10), Event::Syscall(5), Event::Cpu(20)];
        let log = simulate(SimConfig::default(), &table, &events);
        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[1].time, 10);
        assert_eq!(log.records()[1].duration, 20);
    }

    #[test]
    fn cpu_syscall_end_io_timeline() {
        let table = DeviceTable::new(vec!["0x1000".to_string()], vec![75]);
        let events = [Event::Cpu(10), Event::Syscall(0), Event::EndIo(0)];
        let log = simulate(SimConfig::default(), &table, &events);
        let expected = "\
0, 10CPU burst
10, 1, switch to kernel mode
11, 10, context saved
21, 1, find vector 0 in memory position 0x0000
22, 1, load address 0x1000 into the PC
23, 40 ,call device driver
63, 35 ,call device driver
98, 1, IRET
99, 10, context restored
109, 1, switch to user mode
1, 1, switch to kernel mode
2, 10, context saved
12, 1, find vector 0 in memory position 0x0000
13, 1, load address 0x1000 into the PC
14, 40 ,ISR body for end_io0
54, 35 ,ISR body for end_io0
89, 1, IRET
90, 10, context restored
100, 1, switch to user mode

=== Simulation Summary ===
User time: 10 ms
Overhead time: 72 ms
Total time: 82 ms
";
        assert_eq!(log.render(LogFormat::Legacy), expected);
    }

    #[test]
    fn measured_accounting_charges_every_interrupt_record() {
        let table = DeviceTable::new(vec!["0x1000".to_string()], vec![75]);
        let config = SimConfig {
            accounting: Accounting::Measured,
            ..SimConfig::default()
        };
        let events = [Event::Cpu(10), Event::Syscall(0), Event::EndIo(0)];
        let log = simulate(config, &table, &events);
        // prologue 13 + body 75 + epilogue 12, twice
        let summary = log.summary().unwrap();
        assert_eq!(summary.user_time, 10);
        assert_eq!(summary.overhead_time, 200);
    }

    #[test]
    fn accounting_off_has_no_summary() {
        let table = devices(vec![75]);
        let config = SimConfig {
            accounting: Accounting::Off,
            ..SimConfig::default()
        };
        let mut sim = Simulator::new(config, &table);
        sim.step(&Event::Cpu(10)).unwrap();
        sim.step(&Event::Syscall(0)).unwrap();
        assert_eq!(sim.totals(), Summary::default());
        assert_eq!(sim.finish().summary(), None);
    }

    #[test]
    fn constants_are_configurable() {
        let table = devices(vec![25]);
        let config = SimConfig {
            context_time: 3,
            isr_chunk: chunk(10),
            ..SimConfig::default()
        };
        let log = simulate(config, &table, &[Event::Syscall(0)]);
        let durations: Vec<Millis> =
            log.records().iter().map(|r| r.duration).collect();
        assert_eq!(durations, vec![1, 3, 1, 1, 10, 10, 5, 1, 3, 1]);
    }

    #[test]
    fn huge_durations_saturate_the_clock() {
        let table = devices(vec![]);
        let events = [Event::Cpu(Millis::MAX), Event::Cpu(1)];
        let log = simulate(SimConfig::default(), &table, &events);
        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[1].time, Millis::MAX);
        let summary = log.summary().unwrap();
        assert_eq!(summary.user_time, Millis::MAX);
        assert_eq!(summary.total_time(), Millis::MAX);
    }

    #[test]
    fn huge_context_time_saturates_overhead() {
        let table = devices(vec![75]);
        for accounting in [Accounting::Legacy, Accounting::Measured] {
            let config = SimConfig {
                context_time: Millis::MAX,
                accounting,
                ..SimConfig::default()
            };
            let mut sim = Simulator::new(config, &table);
            sim.step(&Event::Cpu(5)).unwrap();
            sim.step(&Event::EndIo(0)).unwrap();
            assert_eq!(sim.clock(), 1);
            assert_eq!(sim.totals().overhead_time, Millis::MAX);
        }
    }

    #[test]
    fn same_trace_gives_identical_logs() {
        let trace = &b"CPU, 50\nSYSCALL, 1\nCPU, 30\nEND_IO, 1\nSYSCALL, 0\n"[..];
        let events = read_trace(trace).unwrap();
        let table = devices(vec![110, 263]);
        let first = simulate(SimConfig::default(), &table, &events);
        let second = simulate(SimConfig::default(), &table, &events);
        assert_eq!(
            first.render(LogFormat::Legacy),
            second.render(LogFormat::Legacy)
        );
    }
}

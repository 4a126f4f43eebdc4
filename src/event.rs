use std::fmt;

/// Simulated time, in milliseconds
pub type Millis = u64;

/// One parsed line of a trace file
///
/// The integer carried by each event means something different
/// depending on the activity: for a CPU burst it is the length
/// of the burst, for the two interrupt activities it is the index
/// of the device in the device table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Uninterrupted use of the processor by the user process
    Cpu(Millis),
    /// The process requests blocking I/O on a device
    Syscall(usize),
    /// A device signals that a previously issued operation is done
    EndIo(usize),
}

impl Event {
    /// The activity tag used for this event in a trace file
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Cpu(_) => "CPU",
            Self::Syscall(_) => "SYSCALL",
            Self::EndIo(_) => "END_IO",
        }
    }

    /// The device index for the interrupt activities
    pub fn device(&self) -> Option<usize> {
        match *self {
            Self::Cpu(_) => None,
            Self::Syscall(device) | Self::EndIo(device) => Some(device),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Cpu(duration) => write!(f, "{}, {duration}", self.tag()),
            Self::Syscall(device) | Self::EndIo(device) => {
                write!(f, "{}, {device}", self.tag())
            }
        }
    }
}

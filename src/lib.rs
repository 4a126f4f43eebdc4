#![forbid(unsafe_code)]

pub mod device_table;
pub mod event;
pub mod simulator;
pub mod timeline;
pub mod trace_file;

mod utils;

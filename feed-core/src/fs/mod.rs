//! Filesystem layout and the raw packet log writer.

pub mod log_writer;
pub mod paths;

pub use log_writer::{FlushPolicy, LogWriter, WriteError};
pub use paths::LogPaths;

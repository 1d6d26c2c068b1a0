mod command;
mod framing;

pub use command::{trim_command, CommandSet, DEFAULT_COMMANDS};
pub use framing::{FrameReader, Framing, DEFAULT_COMMAND_LENGTH, DEFAULT_TERMINATOR};

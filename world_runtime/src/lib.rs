//! Command surface for the grid world engine.
//!
//! Re-exports the data contracts from `world_schema` and adds the typed
//! [`Action`] enum together with the parsers that turn loosely typed input
//! (JSON parameter maps, text command lines) into it, without depending on
//! the engine itself.

pub mod command_text;
mod commands;

pub use command_text::{parse_command_line, CommandParseError, TextCommand};
pub use commands::{Action, ActionParseError, Command, ACTION_NAMES};
pub use world_schema::*;

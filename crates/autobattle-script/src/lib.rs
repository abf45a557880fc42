mod command;
mod error;
mod parser;

pub use command::{AutoKind, Command, HealingItem, ManualAction, SkillOp, TrailingOp};
pub use error::ScriptError;
pub use parser::{DEFAULT_WAIT, ParseWarning, Script, parse, read_script_file};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: invalid turn marker `{text}` (turn numbers must be positive integers)")]
    InvalidTurn { line: usize, text: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

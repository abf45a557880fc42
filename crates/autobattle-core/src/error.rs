use autobattle_script::ScriptError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CombatError {
    #[error("script error: {0}")]
    Script(#[from] ScriptError),

    #[error("attack button not found after {tries} tries")]
    AnchorNotFound { tries: u32 },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

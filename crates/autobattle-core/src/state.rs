//! Per-encounter engine state and the terminal [`Outcome`].

use std::fmt;
use std::time::Duration;

use autobattle_script::AutoKind;
use serde::{Deserialize, Serialize};

/// Why an encounter stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    /// A retreat classified by the caller. The detector reports a left
    /// fight as [`Outcome::NoLoot`].
    Retreated,
    /// The raid wall-clock budget ran out.
    TimeExceeded,
    /// The fight ended without rewards, or the party left it.
    NoLoot,
    /// The fight ended abruptly, typically a raid killed by other players.
    BattleConcluded,
    ExpGained,
    LootCollected,
}

impl Outcome {
    /// Whether loot can be collected after this outcome.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            Outcome::BattleConcluded | Outcome::ExpGained | Outcome::LootCollected
        )
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Outcome::Retreated => "retreated",
            Outcome::TimeExceeded => "time exceeded",
            Outcome::NoLoot => "no loot",
            Outcome::BattleConcluded => "battle concluded",
            Outcome::ExpGained => "exp gained",
            Outcome::LootCollected => "loot collected",
        };
        f.write_str(text)
    }
}

/// Steps return `Err(outcome)` once the fight is over, so `?` unwinds to the
/// engine loop.
pub(crate) type Flow<T = ()> = Result<T, Outcome>;

/// Automation state. A single value, so Semi and Full can never both be on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AutoMode {
    #[default]
    Manual,
    SemiAuto,
    FullAuto,
}

impl AutoMode {
    pub fn is_active(self) -> bool {
        self != AutoMode::Manual
    }

    pub fn kind(self) -> Option<AutoKind> {
        match self {
            AutoMode::Manual => None,
            AutoMode::SemiAuto => Some(AutoKind::Semi),
            AutoMode::FullAuto => Some(AutoKind::Full),
        }
    }
}

impl From<AutoKind> for AutoMode {
    fn from(kind: AutoKind) -> Self {
        match kind {
            AutoKind::Semi => AutoMode::SemiAuto,
            AutoKind::Full => AutoMode::FullAuto,
        }
    }
}

/// Mutable state of one encounter, owned by the running engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    /// Turn the game is on. Only ever increases.
    pub current_turn: u32,
    /// Turn the script block being read belongs to.
    pub target_turn: u32,
    pub auto_mode: AutoMode,
    /// Automation switched off so the script can act on a specific turn.
    pub suspended_auto: Option<AutoKind>,
    /// Replace automation with a manual attack and reload loop at script end.
    pub manual_attack_loop: bool,
    /// Terminal: once set, nothing else is dispatched.
    pub retreated: bool,
    pub outcome: Option<Outcome>,
    /// Clock reading when the encounter started.
    pub started_at: Duration,
}

impl EngineState {
    pub fn new(started_at: Duration) -> Self {
        Self {
            current_turn: 1,
            target_turn: 1,
            auto_mode: AutoMode::Manual,
            suspended_auto: None,
            manual_attack_loop: false,
            retreated: false,
            outcome: None,
            started_at,
        }
    }

    /// Whether commands of the current block belong to the current turn.
    pub fn in_sync(&self) -> bool {
        self.current_turn == self.target_turn
    }

    pub(crate) fn advance_turn(&mut self) -> u32 {
        self.current_turn += 1;
        self.current_turn
    }
}

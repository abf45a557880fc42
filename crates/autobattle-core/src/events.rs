//! Events recorded while a fight runs, and the final report.
//!
//! Events are kept in memory for the lifetime of one encounter and handed to
//! the caller inside [`CombatReport`]. Nothing is persisted.

use std::time::Duration;

use autobattle_script::{Command, HealingItem, ParseWarning};
use serde::Serialize;

use crate::state::{AutoMode, Outcome};

/// Something the engine did or observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum CombatEvent {
    /// Commands of the block for `turn` are about to run.
    TurnStarted { turn: u32 },

    /// The turn was submitted and resolved.
    TurnEnded { turn: u32 },

    /// A command was handed to the executor.
    Dispatched { turn: u32, command: Command },

    AutoModeChanged { from: AutoMode, to: AutoMode },

    /// The page was reloaded.
    Reloaded { turn: u32, reason: ReloadReason },

    /// The party was wiped and the engine reacted.
    PartyWiped { turn: u32, response: WipeResponse },

    /// A UI refusal that the engine stepped over.
    Recovered { turn: u32, condition: Recoverable },

    /// A turn marker behind the current turn was ignored.
    MarkerSkipped { marker: u32, current: u32 },

    Ended { turn: u32, outcome: Outcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReloadReason {
    /// The in-progress indicator never cleared.
    Stall,
    /// Raid-type content reloads after every attack.
    AfterAttack,
    /// The script asked for it.
    Script,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WipeResponse {
    /// Declined the revive prompt and retreated.
    Retreat,
    /// Went home without retreating.
    BackOut,
    /// Saluted and left the co-op room.
    LeaveRoom,
}

/// Recoverable UI states. Each is logged and the engine moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Recoverable {
    SkillSealed { character: u8, skill: u8 },
    /// The skill did not prompt for the target the script supplied.
    TargetNotRequested { character: u8, skill: u8 },
    SummonRestricted { slot: u8 },
    QuickSummonNotReady,
    ItemUnavailable { item: HealingItem },
    ItemRejected { item: HealingItem },
    BackupFailed,
    BackupOnCooldown,
    /// Neither automation control could be enabled.
    AutoUnavailable,
    /// The attack button could not be found again after a stall reload.
    AnchorLost,
}

/// Summary of one encounter.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatReport {
    pub outcome: Outcome,
    pub turns_completed: u32,
    pub commands_dispatched: usize,
    pub auto_mode: AutoMode,
    pub elapsed: Duration,
    /// Script lines that were skipped while parsing.
    pub warnings: Vec<ParseWarning>,
    pub events: Vec<CombatEvent>,
}

impl CombatReport {
    /// Whether loot can be collected.
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Recoverable conditions met along the way.
    pub fn recovered(&self) -> impl Iterator<Item = &Recoverable> {
        self.events.iter().filter_map(|event| match event {
            CombatEvent::Recovered { condition, .. } => Some(condition),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_serialize_tagged_events() {
        let event = CombatEvent::Dispatched {
            turn: 2,
            command: Command::TargetEnemy(1),
        };
        let value = serde_json::to_value(&event).expect("should serialize");
        assert_eq!(value["event"], "dispatched");
        assert_eq!(value["turn"], 2);
        assert_eq!(value["command"]["targetEnemy"], 1);

        let event = CombatEvent::Recovered {
            turn: 1,
            condition: Recoverable::SkillSealed {
                character: 2,
                skill: 3,
            },
        };
        let value = serde_json::to_value(&event).expect("should serialize");
        assert_eq!(value["condition"]["kind"], "skillSealed");
        assert_eq!(value["condition"]["character"], 2);
    }

    #[test]
    fn test_should_collect_recovered_conditions_from_report() {
        let report = CombatReport {
            outcome: Outcome::LootCollected,
            turns_completed: 3,
            commands_dispatched: 4,
            auto_mode: AutoMode::Manual,
            elapsed: Duration::from_secs(40),
            warnings: Vec::new(),
            events: vec![
                CombatEvent::TurnStarted { turn: 1 },
                CombatEvent::Recovered {
                    turn: 1,
                    condition: Recoverable::BackupOnCooldown,
                },
                CombatEvent::Ended {
                    turn: 3,
                    outcome: Outcome::LootCollected,
                },
            ],
        };

        assert!(report.is_success());
        let recovered: Vec<_> = report.recovered().collect();
        assert_eq!(recovered, vec![&Recoverable::BackupOnCooldown]);

        let value = serde_json::to_value(&report).expect("should serialize");
        assert_eq!(value["outcome"], "lootCollected");
        assert_eq!(value["turnsCompleted"], 3);
        assert_eq!(value["autoMode"], "manual");
    }
}

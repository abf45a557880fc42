//! Typed command stream produced by the parser.
//!
//! Every recognised script line maps to exactly one [`Command`]. The
//! [`Display`](std::fmt::Display) impls render the canonical script text for a
//! command, which is what the engine logs when it dispatches one.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One parsed script line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    /// `turn N:` opens the block for turn `N`.
    Turn(u32),

    /// `end` closes the current turn block by attacking.
    EndTurn,

    /// `characterN.` followed by skill operations, executed left to right.
    Character {
        /// Party slot, 1..=4.
        slot: u8,
        /// Operations in script order.
        ops: Vec<SkillOp>,
    },

    /// `summon(N)` with optional trailing `.wait(..)` / `.attack`.
    Summon {
        /// Summon slot, 1..=6.
        slot: u8,
        /// Operations that run after the summon resolves.
        then: Vec<TrailingOp>,
    },

    /// `quicksummon` with optional trailing `.wait(..)` / `.attack`.
    QuickSummon {
        /// Operations that run after a successful quick summon.
        then: Vec<TrailingOp>,
    },

    /// A healing item from the fixed vocabulary.
    Item {
        /// Item to use.
        item: HealingItem,
        /// Character slot for items that need one.
        target: Option<u8>,
    },

    /// `targetenemy(N)`.
    TargetEnemy(u8),

    /// `enablesemiauto` / `enablefullauto`.
    EnableAuto(AutoKind),

    /// `requestbackup` / `tweetbackup`.
    RequestBackup {
        /// Use the social-share variant instead of the in-game request.
        via_social: bool,
    },

    /// `wait(seconds)`.
    Wait(Duration),

    /// `attack`, `attackback`, `back`, `reload`.
    Manual(ManualAction),

    /// `repeatmanualattackandreload`: attack manually until the battle ends
    /// instead of handing over to automation.
    RepeatAttackAndReload,

    /// `exit`: leave the battle without retreating.
    Exit,
}

/// A sub-command inside a `characterN.` chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SkillOp {
    /// `useskill(N)`, N in 1..=4.
    UseSkill(u8),
    /// `target(N)`, N in 1..=6; answers a skill that awaits an ally target.
    Target(u8),
    /// `wait(seconds)`.
    Wait(Duration),
    /// `attack`: end the turn right away, abandoning later ops.
    Attack,
}

/// A sub-command trailing a summon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrailingOp {
    Wait(Duration),
    Attack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AutoKind {
    Semi,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ManualAction {
    /// Submit the turn and wait for the in-progress indicator to clear.
    Attack,
    /// Submit the turn, then press Back to skip the animation.
    AttackAndBack,
    /// Press Back to skip the running animation.
    Back,
    /// Submit the turn, then reload the page.
    Reload,
}

/// Healing items the script vocabulary knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HealingItem {
    GreenPotion,
    BluePotion,
    FullElixir,
    SupportPotion,
    ClarityHerb,
    RevivalPotion,
}

impl HealingItem {
    pub const ALL: [HealingItem; 6] = [
        HealingItem::GreenPotion,
        HealingItem::BluePotion,
        HealingItem::FullElixir,
        HealingItem::SupportPotion,
        HealingItem::ClarityHerb,
        HealingItem::RevivalPotion,
    ];

    /// Script keyword, which doubles as the item's template name.
    pub fn keyword(self) -> &'static str {
        match self {
            HealingItem::GreenPotion => "usegreenpotion",
            HealingItem::BluePotion => "usebluepotion",
            HealingItem::FullElixir => "usefullelixir",
            HealingItem::SupportPotion => "usesupportpotion",
            HealingItem::ClarityHerb => "useclarityherb",
            HealingItem::RevivalPotion => "userevivalpotion",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|item| item.keyword() == keyword)
    }

    /// Whether the item is applied to a single character.
    pub fn requires_target(self) -> bool {
        matches!(self, HealingItem::GreenPotion | HealingItem::ClarityHerb)
    }
}

fn fmt_secs(d: &Duration) -> String {
    let secs = d.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        format!("{secs}")
    }
}

impl fmt::Display for SkillOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkillOp::UseSkill(n) => write!(f, "useskill({n})"),
            SkillOp::Target(n) => write!(f, "target({n})"),
            SkillOp::Wait(d) => write!(f, "wait({})", fmt_secs(d)),
            SkillOp::Attack => f.write_str("attack"),
        }
    }
}

impl fmt::Display for TrailingOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrailingOp::Wait(d) => write!(f, "wait({})", fmt_secs(d)),
            TrailingOp::Attack => f.write_str("attack"),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Turn(n) => write!(f, "turn {n}:"),
            Command::EndTurn => f.write_str("end"),
            Command::Character { slot, ops } => {
                write!(f, "character{slot}")?;
                for op in ops {
                    write!(f, ".{op}")?;
                }
                Ok(())
            }
            Command::Summon { slot, then } => {
                write!(f, "summon({slot})")?;
                for op in then {
                    write!(f, ".{op}")?;
                }
                Ok(())
            }
            Command::QuickSummon { then } => {
                f.write_str("quicksummon")?;
                for op in then {
                    write!(f, ".{op}")?;
                }
                Ok(())
            }
            Command::Item { item, target } => match target {
                Some(t) => write!(f, "{}.target({t})", item.keyword()),
                None => f.write_str(item.keyword()),
            },
            Command::TargetEnemy(n) => write!(f, "targetenemy({n})"),
            Command::EnableAuto(AutoKind::Semi) => f.write_str("enablesemiauto"),
            Command::EnableAuto(AutoKind::Full) => f.write_str("enablefullauto"),
            Command::RequestBackup { via_social: false } => f.write_str("requestbackup"),
            Command::RequestBackup { via_social: true } => f.write_str("tweetbackup"),
            Command::Wait(d) => write!(f, "wait({})", fmt_secs(d)),
            Command::Manual(ManualAction::Attack) => f.write_str("attack"),
            Command::Manual(ManualAction::AttackAndBack) => f.write_str("attackback"),
            Command::Manual(ManualAction::Back) => f.write_str("back"),
            Command::Manual(ManualAction::Reload) => f.write_str("reload"),
            Command::RepeatAttackAndReload => f.write_str("repeatmanualattackandreload"),
            Command::Exit => f.write_str("exit"),
        }
    }
}

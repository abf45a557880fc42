//! Combat settings.
//!
//! [`CombatSettings`] is deserialized from YAML (camelCase keys). Every field
//! has a serde default, so a partial file, an empty file or no file at all
//! produces a usable configuration. Programmatic callers use the builder.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use typed_builder::TypedBuilder;

use crate::error::CombatError;
use crate::surface::Offset;

// ── Combat Settings ──────────────────────────────────────────

/// Settings for one combat engine instance.
///
/// # Examples
///
/// ```
/// use autobattle_core::{CombatSettings, FarmingMode};
///
/// let settings = CombatSettings::builder()
///     .farming_mode(FarmingMode::Raid)
///     .mission_name("EX Event Raid")
///     .build();
/// assert!(settings.is_raid_type());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct CombatSettings {
    /// Kind of content being farmed.
    #[serde(default)]
    #[builder(default)]
    pub farming_mode: FarmingMode,

    /// Mission name as shown in the mission list.
    #[serde(default)]
    #[builder(default, setter(into))]
    pub mission_name: String,

    /// Map the mission belongs to.
    #[serde(default)]
    #[builder(default, setter(into))]
    pub map_name: String,

    /// Raid wall-clock budget.
    #[serde(default)]
    #[builder(default)]
    pub raid: RaidConfig,

    /// Retry budgets and polling intervals.
    #[serde(default)]
    #[builder(default)]
    pub retry: RetryConfig,

    /// Pause after every skill, in seconds.
    #[serde(default)]
    #[builder(default)]
    pub idle_after_skill_secs: f64,

    /// Pause after every summon, in seconds.
    #[serde(default)]
    #[builder(default)]
    pub idle_after_summon_secs: f64,

    /// Try a quick summon right before automation takes over at script end.
    #[serde(default)]
    #[builder(default)]
    pub enable_auto_quick_summon: bool,

    #[serde(default)]
    #[builder(default)]
    pub strategy: StrategyConfig,

    /// Slot offsets relative to the attack button.
    #[serde(default)]
    #[builder(default)]
    pub layout: SlotLayout,

    /// Script used when no explicit script is given.
    #[serde(default)]
    #[builder(default)]
    pub combat_script: Vec<String>,

    /// Script used for nightmare fights when no explicit script is given.
    #[serde(default)]
    #[builder(default)]
    pub nightmare_script: Vec<String>,
}

impl Default for CombatSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Kind of content being farmed. Decides party-wipe handling and reloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FarmingMode {
    #[default]
    Quest,
    Special,
    Coop,
    Raid,
    Event,
    GuildWars,
    DreadBarrage,
    ProvingGrounds,
    Rotb,
    XenoClash,
    Arcarum,
}

/// Raid auto-exit budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaidConfig {
    /// Leave raids that run past `time_allowed_secs`.
    #[serde(default)]
    pub enable_auto_exit: bool,

    #[serde(default = "default_time_allowed_secs")]
    pub time_allowed_secs: u64,
}

impl Default for RaidConfig {
    fn default() -> Self {
        Self {
            enable_auto_exit: false,
            time_allowed_secs: default_time_allowed_secs(),
        }
    }
}

/// Bounded retries and polling cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Pause between two attempts of the same perception query.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Attempts to locate the attack button before giving up.
    #[serde(default = "default_anchor_tries")]
    pub anchor_tries: u32,

    /// How long to wait for the in-progress indicator to clear, per attempt.
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,

    /// Attempts before a stalled attack is recovered by reloading.
    #[serde(default = "default_max_stall_waits")]
    pub max_stall_waits: u32,

    /// Pause after a page reload.
    #[serde(default = "default_reload_wait_secs")]
    pub reload_wait_secs: u64,

    /// Pause between two iterations of the automation polling loop.
    #[serde(default = "default_auto_poll_secs")]
    pub auto_poll_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            anchor_tries: default_anchor_tries(),
            stall_timeout_secs: default_stall_timeout_secs(),
            max_stall_waits: default_max_stall_waits(),
            reload_wait_secs: default_reload_wait_secs(),
            auto_poll_secs: default_auto_poll_secs(),
        }
    }
}

impl RetryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }

    pub fn reload_wait(&self) -> Duration {
        Duration::from_secs(self.reload_wait_secs)
    }

    pub fn auto_poll(&self) -> Duration {
        Duration::from_secs(self.auto_poll_secs)
    }
}

/// Engine behavior switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyConfig {
    #[serde(default)]
    pub turn_sync: TurnSync,

    #[serde(default)]
    pub reload_after_attack: ReloadPolicy,
}

/// How `turn N:` markers relate to the game's turn counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnSync {
    /// Attack through intervening turns until the counter matches the marker.
    #[default]
    Strict,
    /// Markers only label blocks; every block runs on the turn it is reached.
    Sequential,
}

/// Whether to reload the page after submitting an attack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReloadPolicy {
    /// Reload only for raid-type content.
    #[default]
    Auto,
    Always,
    Never,
}

/// Declarative slot-offset table.
///
/// Character, skill, summon and enemy offsets are relative to the attack
/// button. Ally targets are relative to the "select a character" prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotLayout {
    #[serde(default = "default_characters")]
    pub characters: Vec<Offset>,

    #[serde(default = "default_skills")]
    pub skills: Vec<Offset>,

    #[serde(default = "default_summons")]
    pub summons: Vec<Offset>,

    #[serde(default = "default_ally_targets")]
    pub ally_targets: Vec<Offset>,

    #[serde(default = "default_enemies")]
    pub enemies: Vec<Offset>,
}

impl Default for SlotLayout {
    fn default() -> Self {
        Self {
            characters: default_characters(),
            skills: default_skills(),
            summons: default_summons(),
            ally_targets: default_ally_targets(),
            enemies: default_enemies(),
        }
    }
}

impl SlotLayout {
    pub fn character(&self, slot: u8) -> Option<Offset> {
        nth(&self.characters, slot)
    }

    pub fn skill(&self, index: u8) -> Option<Offset> {
        nth(&self.skills, index)
    }

    pub fn summon(&self, slot: u8) -> Option<Offset> {
        nth(&self.summons, slot)
    }

    pub fn ally_target(&self, slot: u8) -> Option<Offset> {
        nth(&self.ally_targets, slot)
    }

    pub fn enemy(&self, slot: u8) -> Option<Offset> {
        nth(&self.enemies, slot)
    }

    fn validate(&self) -> Result<(), CombatError> {
        let tables = [
            ("characters", self.characters.len(), 4),
            ("skills", self.skills.len(), 4),
            ("summons", self.summons.len(), 6),
            ("allyTargets", self.ally_targets.len(), 6),
            ("enemies", self.enemies.len(), 3),
        ];
        for (name, len, expected) in tables {
            if len != expected {
                return Err(CombatError::InvalidSettings(format!(
                    "layout.{name} must have {expected} entries, found {len}"
                )));
            }
        }
        Ok(())
    }
}

/// One-based lookup.
fn nth(table: &[Offset], index: u8) -> Option<Offset> {
    table.get(usize::from(index).checked_sub(1)?).copied()
}

// ── Derived rules ────────────────────────────────────────────

const EVENT_RAIDS: [&str; 3] = ["VH Event Raid", "EX Event Raid", "IM Event Raid"];
const ROTB_RAIDS: [&str; 5] = [
    "EX Zhuque",
    "EX Xuanwu",
    "EX Baihu",
    "EX Qinglong",
    "Lvl 100 Shenxian",
];
const DREAD_BARRAGE_RAIDS: [&str; 5] = ["1 Star", "2 Star", "3 Star", "4 Star", "5 Star"];
const PROVING_GROUNDS_RAIDS: [&str; 2] = ["Extreme", "Extreme+"];
const GUILD_WARS_RAIDS: [&str; 6] = ["Very Hard", "Extreme", "Extreme+", "NM90", "NM100", "NM150"];
const XENO_CLASH_RAIDS: [&str; 1] = ["Xeno Clash Raid"];

impl CombatSettings {
    /// Validate values serde cannot check.
    ///
    /// # Errors
    ///
    /// Returns `CombatError::InvalidSettings` for a malformed layout table, a
    /// zero automation poll interval, or an enabled raid budget of zero.
    pub fn validate(&self) -> Result<(), CombatError> {
        self.layout.validate()?;
        if self.retry.auto_poll_secs == 0 {
            return Err(CombatError::InvalidSettings(
                "retry.autoPollSecs must be at least 1".to_owned(),
            ));
        }
        if self.raid.enable_auto_exit && self.raid.time_allowed_secs == 0 {
            return Err(CombatError::InvalidSettings(
                "raid.timeAllowedSecs must be positive when auto exit is enabled".to_owned(),
            ));
        }
        if !(self.idle_after_skill_secs.is_finite() && self.idle_after_skill_secs >= 0.0)
            || !(self.idle_after_summon_secs.is_finite() && self.idle_after_summon_secs >= 0.0)
        {
            return Err(CombatError::InvalidSettings(
                "idle pauses must be non-negative seconds".to_owned(),
            ));
        }
        Ok(())
    }

    /// Content whose attacks resolve faster after a page reload.
    pub fn is_raid_type(&self) -> bool {
        let mission = self.mission_name.as_str();
        self.farming_mode == FarmingMode::Raid
            || EVENT_RAIDS.contains(&mission)
            || ROTB_RAIDS.contains(&mission)
            || DREAD_BARRAGE_RAIDS.contains(&mission)
            || (self.farming_mode == FarmingMode::ProvingGrounds
                && PROVING_GROUNDS_RAIDS.contains(&mission))
            || (self.farming_mode == FarmingMode::GuildWars && GUILD_WARS_RAIDS.contains(&mission))
            || XENO_CLASH_RAIDS.contains(&mission)
    }

    /// Content where a wiped party backs out instead of retreating.
    pub fn backs_out_on_wipe(&self) -> bool {
        matches!(
            self.farming_mode,
            FarmingMode::Raid | FarmingMode::DreadBarrage | FarmingMode::GuildWars
        ) || self.map_name.contains("Raid")
    }

    /// Content where a wiped party may retreat through the "continue" prompt.
    pub fn retreats_on_wipe(&self) -> bool {
        !matches!(self.farming_mode, FarmingMode::Raid | FarmingMode::DreadBarrage)
    }

    pub fn reload_after_attack(&self) -> bool {
        match self.strategy.reload_after_attack {
            ReloadPolicy::Auto => self.is_raid_type(),
            ReloadPolicy::Always => true,
            ReloadPolicy::Never => false,
        }
    }

    /// Whether the raid wall-clock budget applies to this fight.
    pub fn time_budget(&self) -> Option<Duration> {
        (self.farming_mode == FarmingMode::Raid && self.raid.enable_auto_exit)
            .then(|| Duration::from_secs(self.raid.time_allowed_secs))
    }

    pub fn idle_after_skill(&self) -> Option<Duration> {
        positive_secs(self.idle_after_skill_secs)
    }

    pub fn idle_after_summon(&self) -> Option<Duration> {
        positive_secs(self.idle_after_summon_secs)
    }
}

fn positive_secs(secs: f64) -> Option<Duration> {
    (secs.is_finite() && secs > 0.0).then(|| Duration::from_secs_f64(secs))
}

// ── Default value functions for serde ────────────────────────

fn default_time_allowed_secs() -> u64 {
    1800
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_anchor_tries() -> u32 {
    50
}

fn default_stall_timeout_secs() -> u64 {
    5
}

fn default_max_stall_waits() -> u32 {
    3
}

fn default_reload_wait_secs() -> u64 {
    3
}

fn default_auto_poll_secs() -> u64 {
    1
}

fn row(xs: &[i32], dy: i32) -> Vec<Offset> {
    xs.iter().map(|&dx| Offset::new(dx, dy)).collect()
}

fn default_characters() -> Vec<Offset> {
    row(&[-317, -240, -158, -76], 123)
}

fn default_skills() -> Vec<Offset> {
    row(&[-213, -132, -51, 39], 171)
}

fn default_summons() -> Vec<Offset> {
    row(&[-317, -243, -165, -89, -12, 63], 138)
}

fn default_ally_targets() -> Vec<Offset> {
    let mut targets = row(&[-90, 0, 90], 85);
    targets.extend(row(&[-90, 0, 90], 250));
    targets
}

fn default_enemies() -> Vec<Offset> {
    row(&[-280, -120, 40], -290)
}

// ── Loading ──────────────────────────────────────────────────

/// Load [`CombatSettings`] from a YAML file.
///
/// If the file does not exist, returns the default settings.
///
/// # Errors
///
/// Returns `CombatError::Io` if the file exists but cannot be read,
/// `CombatError::Yaml` if it is not valid YAML, and
/// `CombatError::InvalidSettings` if it fails validation.
pub fn load_settings(path: &Path) -> Result<CombatSettings, CombatError> {
    if !path.exists() {
        debug!(path = %path.display(), "settings file missing, using defaults");
        return Ok(CombatSettings::default());
    }
    let content = std::fs::read_to_string(path)?;
    let settings: CombatSettings = if content.trim().is_empty() {
        CombatSettings::default()
    } else {
        serde_yaml::from_str(&content)?
    };
    settings.validate()?;
    Ok(settings)
}

/// Read a combat script file into lines.
///
/// # Errors
///
/// Returns `CombatError::Script` if the file cannot be read.
pub fn load_script_file(path: &Path) -> Result<Vec<String>, CombatError> {
    Ok(autobattle_script::read_script_file(path)?)
}

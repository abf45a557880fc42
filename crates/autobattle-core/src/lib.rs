//! Combat engine that plays browser-game battles through perception and input.
//!
//! A [`CombatEngine`] runs a parsed combat script against anything that
//! implements [`Surface`], and falls back to Semi/Full Auto once the script
//! runs out. [`SimScreen`] is a scripted stand-in for the real game.

mod auto;
mod detector;
mod engine;
mod error;
mod events;
mod executor;
mod policy;
mod settings;
mod sim;
mod state;
mod surface;
mod turn;

pub use autobattle_script::{Command, ParseWarning, Script};
pub use engine::CombatEngine;
pub use error::CombatError;
pub use events::{CombatEvent, CombatReport, Recoverable, ReloadReason, WipeResponse};
pub use settings::{
    CombatSettings, FarmingMode, RaidConfig, ReloadPolicy, RetryConfig, SlotLayout,
    StrategyConfig, TurnSync, load_script_file, load_settings,
};
pub use sim::{DEFAULT_POSITION, Rule, Scenario, SimAction, SimScreen, load_scenario};
pub use state::{AutoMode, EngineState, Outcome};
pub use surface::{Clock, Input, Navigator, Offset, Point, Surface, Vision};

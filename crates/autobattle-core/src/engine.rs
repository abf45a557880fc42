//! Combat engine entry point.
//!
//! The [`CombatEngine`] owns a game surface and the settings for an
//! encounter. [`run()`](CombatEngine::run) parses a script, plays it out
//! against the surface and returns a [`CombatReport`]. The per-encounter
//! machinery lives on an internal `Battle` context whose behavior is split
//! across the turn, executor, auto, detector and policy modules.

use std::convert::Infallible;

use autobattle_script::{Command, parse};
use tracing::{info, instrument, warn};

use crate::error::CombatError;
use crate::events::{CombatEvent, CombatReport};
use crate::policy::DEFAULT_TRIES;
use crate::settings::{CombatSettings, FarmingMode};
use crate::state::{EngineState, Flow};
use crate::surface::{Point, Surface};

/// Drives one encounter at a time against a game surface.
///
/// # Examples
///
/// ```
/// use autobattle_core::{CombatEngine, CombatSettings, Outcome, SimScreen};
///
/// # fn example() -> Result<(), autobattle_core::CombatError> {
/// let screen = SimScreen::from_yaml(
///     "visible: [attack]\nrules:\n  - onClick: attack\n    show: [loot_collected]\n",
/// )?;
/// let mut engine = CombatEngine::new(screen, CombatSettings::default());
///
/// let report = engine.run(["turn 1:", "end"])?;
/// assert_eq!(report.outcome, Outcome::LootCollected);
/// # Ok(())
/// # }
/// # example().expect("example should run");
/// ```
#[derive(Debug)]
pub struct CombatEngine<S> {
    surface: S,
    settings: CombatSettings,
}

impl<S: Surface> CombatEngine<S> {
    pub fn new(surface: S, settings: CombatSettings) -> Self {
        Self { surface, settings }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Play one encounter with the given script lines.
    ///
    /// The script is parsed before anything touches the surface. Once the
    /// attack button is located the commands run in order; when they run out
    /// automation (or the manual attack loop) plays the fight to its end.
    ///
    /// # Errors
    ///
    /// Returns `CombatError::InvalidSettings` if the settings are inconsistent.
    /// Returns `CombatError::Script` if a turn marker is malformed.
    /// Returns `CombatError::AnchorNotFound` if the attack button never shows up.
    #[instrument(skip_all, fields(mode = ?self.settings.farming_mode))]
    pub fn run<I, T>(&mut self, lines: I) -> Result<CombatReport, CombatError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.settings.validate()?;
        let script = parse(lines)?;
        info!(
            commands = script.len(),
            warnings = script.warnings.len(),
            "starting combat"
        );

        let started_at = self.surface.now();
        let mut battle = Battle {
            surface: &mut self.surface,
            settings: &self.settings,
            state: EngineState::new(started_at),
            anchor: Point::default(),
            events: Vec::new(),
            dispatched: 0,
        };

        if self.settings.farming_mode == FarmingMode::Arcarum {
            battle.find_and_click("arcarum_popup", DEFAULT_TRIES);
        }

        let tries = self.settings.retry.anchor_tries;
        battle.anchor = battle
            .locate_anchor(tries)
            .ok_or(CombatError::AnchorNotFound { tries })?;
        info!(anchor = ?battle.anchor, "attack button located");

        let outcome = match battle.drive(&script.commands) {
            Err(outcome) => outcome,
            Ok(never) => match never {},
        };

        let turn = battle.state.current_turn;
        info!(%outcome, turn, "combat ended");
        battle.record(CombatEvent::Ended { turn, outcome });

        Ok(CombatReport {
            outcome,
            turns_completed: turn.saturating_sub(1),
            commands_dispatched: battle.dispatched,
            auto_mode: battle.state.auto_mode,
            elapsed: battle.elapsed(),
            warnings: script.warnings,
            events: battle.events,
        })
    }

    /// Run an encounter with the given script, or the configured one.
    ///
    /// Returns whether loot can be collected afterwards. Setup failures are
    /// logged and count as a failed encounter.
    pub fn start_combat(&mut self, script: Option<&[String]>, is_nightmare: bool) -> bool {
        let lines = match script {
            Some(lines) => lines.to_vec(),
            None if is_nightmare => self.settings.nightmare_script.clone(),
            None => self.settings.combat_script.clone(),
        };
        match self.run(&lines) {
            Ok(report) => report.is_success(),
            Err(e) => {
                warn!(error = %e, "combat could not start");
                false
            }
        }
    }
}

/// Everything one encounter needs, borrowed from the engine for its duration.
pub(crate) struct Battle<'a, S> {
    pub(crate) surface: &'a mut S,
    pub(crate) settings: &'a CombatSettings,
    pub(crate) state: EngineState,
    /// Attack button position; slot offsets are relative to it.
    pub(crate) anchor: Point,
    pub(crate) events: Vec<CombatEvent>,
    pub(crate) dispatched: usize,
}

impl<S: Surface> Battle<'_, S> {
    fn drive(&mut self, commands: &[Command]) -> Flow<Infallible> {
        for command in commands {
            self.step(command)?;
        }
        self.finish_script()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use super::*;
    use crate::settings::RetryConfig;
    use crate::sim::SimScreen;
    use crate::state::Outcome;

    pub(crate) fn test_battle<'a>(
        surface: &'a mut SimScreen,
        settings: &'a CombatSettings,
    ) -> Battle<'a, SimScreen> {
        Battle {
            surface,
            settings,
            state: EngineState::new(Duration::ZERO),
            anchor: Point::default(),
            events: Vec::new(),
            dispatched: 0,
        }
    }

    fn sim_engine(yaml: &str, settings: CombatSettings) -> CombatEngine<SimScreen> {
        CombatEngine::new(
            SimScreen::from_yaml(yaml).expect("should build screen"),
            settings,
        )
    }

    #[test]
    fn test_should_fail_fast_when_anchor_is_missing() {
        let settings = CombatSettings::builder()
            .retry(RetryConfig {
                anchor_tries: 3,
                ..RetryConfig::default()
            })
            .build();
        let mut engine = sim_engine("{}", settings);

        let result = engine.run(["end"]);
        assert!(matches!(
            result,
            Err(CombatError::AnchorNotFound { tries: 3 })
        ));
        assert!(engine.surface().actions().is_empty());
    }

    #[test]
    fn test_should_reject_malformed_script_before_any_action() {
        let mut engine = sim_engine("visible: [attack]\n", CombatSettings::default());

        let result = engine.run(["turn x:", "end"]);
        assert!(matches!(result, Err(CombatError::Script(_))));
        assert!(engine.surface().actions().is_empty());
    }

    #[test]
    fn test_should_report_turns_and_dispatch_count() {
        let mut engine = sim_engine(
            "visible: [attack]\nrules:\n  - onClick: attack\n    nth: 2\n    show: [exp_gained]\n",
            CombatSettings::default(),
        );

        let report = engine
            .run(["turn 1:", "end", "turn 2:", "end", "turn 3:", "end"])
            .expect("should run");
        assert_eq!(report.outcome, Outcome::ExpGained);
        assert_eq!(report.turns_completed, 2);
        assert_eq!(report.commands_dispatched, 2);
        assert_eq!(
            report.events.last(),
            Some(&CombatEvent::Ended {
                turn: 3,
                outcome: Outcome::ExpGained
            })
        );
    }

    #[test]
    fn test_should_click_arcarum_popup_before_locating_anchor() {
        let settings = CombatSettings::builder()
            .farming_mode(FarmingMode::Arcarum)
            .build();
        let mut engine = sim_engine(
            "visible: [arcarum_popup, attack, loot_collected]\n",
            settings,
        );

        let report = engine.run(Vec::<String>::new()).expect("should run");
        assert_eq!(report.outcome, Outcome::LootCollected);
        assert_eq!(engine.surface().clicked_labels(), vec!["arcarum_popup"]);
    }

    #[test]
    fn test_should_use_configured_script_when_none_given() {
        let settings = CombatSettings::builder()
            .combat_script(vec!["exit".to_owned()])
            .nightmare_script(vec!["turn 1:".to_owned(), "end".to_owned()])
            .build();
        let yaml = "visible: [attack]\nrules:\n  - onClick: attack\n    show: [loot_collected]\n";

        let mut engine = sim_engine(yaml, settings.clone());
        assert!(!engine.start_combat(None, false));
        assert!(engine.surface().went_home());

        let mut engine = sim_engine(yaml, settings);
        assert!(engine.start_combat(None, true));
        assert_eq!(engine.surface().click_count("attack"), 1);
    }

    #[test]
    fn test_should_report_failure_when_setup_fails() {
        let mut engine = sim_engine("{}", CombatSettings::default());
        let script = vec!["turn 0:".to_owned()];

        assert!(!engine.start_combat(Some(script.as_slice()), false));
    }
}

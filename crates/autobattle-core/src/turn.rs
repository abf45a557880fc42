//! Turn bookkeeping.
//!
//! The game's turn counter and the script's `turn N:` markers are kept in
//! step here. In strict mode a marker ahead of the counter is reached by
//! closing turns one by one, each followed by a battle-end check. A marker
//! behind the counter is skipped together with its block.
//!
//! While automation is on it plays the turns itself. The counter only moves
//! once the attack button is seen leaving and coming back.

use std::time::Duration;

use autobattle_script::Command;
use tracing::{debug, info, instrument, warn};

use crate::engine::Battle;
use crate::events::CombatEvent;
use crate::settings::TurnSync;
use crate::state::Flow;
use crate::surface::{Offset, Surface};

const ATTACK_TRIES: u32 = 10;
const RESOLVE_TRIES: u32 = 10;
/// Polls granted to automation for one turn before attacking by hand.
const AUTO_TURN_TRIES: u32 = 60;
const NEXT_SETTLE: Duration = Duration::from_secs(3);
/// The dialog's close area relative to the matched portrait.
const DIALOG_CLOSE_OFFSET: Offset = Offset::new(180, -51);

impl<S: Surface> Battle<'_, S> {
    /// Run one script command, checking for the end of the battle first.
    ///
    /// Active automation owns the turn, so only turn markers, automation
    /// toggles and exits get through until a marker hands control back.
    pub(crate) fn step(&mut self, command: &Command) -> Flow {
        self.check()?;
        let runs_anywhere = matches!(
            command,
            Command::Turn(_) | Command::EnableAuto(_) | Command::RepeatAttackAndReload | Command::Exit
        );
        if runs_anywhere {
            return self.dispatch(command);
        }
        if self.state.auto_mode.is_active() {
            debug!(
                command = %command,
                mode = ?self.state.auto_mode,
                "automation is playing, skipping command"
            );
            return Ok(());
        }
        if !self.state.in_sync() {
            debug!(
                command = %command,
                current = self.state.current_turn,
                target = self.state.target_turn,
                "skipping command outside its turn"
            );
            return Ok(());
        }
        self.dispatch(command)
    }

    #[instrument(skip(self), fields(current = self.state.current_turn))]
    pub(crate) fn enter_turn(&mut self, marker: u32) -> Flow {
        self.dismiss_dialogs();
        // A block left open under suspended automation hands control back first.
        self.resume_auto();

        match self.settings.strategy.turn_sync {
            TurnSync::Sequential => {
                if marker != self.state.current_turn {
                    debug!(marker, "turn marker treated as a label");
                }
                self.state.target_turn = self.state.current_turn;
            }
            TurnSync::Strict => {
                let current = self.state.current_turn;
                self.state.target_turn = marker;
                if marker < current {
                    warn!(marker, current, "turn already passed, skipping its block");
                    self.record(CombatEvent::MarkerSkipped { marker, current });
                    return Ok(());
                }
                if marker > current {
                    info!(marker, "attacking until the target turn");
                    self.fast_forward()?;
                }
            }
        }

        info!(turn = self.state.current_turn, "starting turn");
        self.record(CombatEvent::TurnStarted {
            turn: self.state.current_turn,
        });
        Ok(())
    }

    /// Close turns until the counter reaches the target turn.
    fn fast_forward(&mut self) -> Flow {
        while self.state.current_turn < self.state.target_turn {
            let last = self.state.current_turn + 1 == self.state.target_turn;
            if last && self.state.auto_mode.is_active() {
                self.suspend_auto();
            }
            self.dismiss_dialogs();
            let submit = !self.state.auto_mode.is_active();
            self.close_turn(submit)?;
        }
        Ok(())
    }

    /// `end`: submit the turn, or let automation resolve it.
    pub(crate) fn end_turn(&mut self) -> Flow {
        self.resume_auto();
        let submit = !self.state.auto_mode.is_active();
        self.close_turn(submit)
    }

    /// One close-turn cycle: attack (or watch automation play the turn),
    /// wait for the attack to resolve, advance the counter, then check for
    /// the end of the battle.
    pub(crate) fn close_turn(&mut self, submit: bool) -> Flow {
        info!(turn = self.state.current_turn, submit, "ending turn");
        if submit {
            self.submit_turn();
        } else if !self.await_auto_turn()? {
            warn!(
                turn = self.state.current_turn,
                "automation did not play the turn, attacking by hand"
            );
            self.submit_turn();
        }
        self.wait_for_attack();
        self.finish_turn();

        self.check()?;
        if self.find_and_click("next", 1) {
            self.wait(NEXT_SETTLE);
        }
        Ok(())
    }

    fn submit_turn(&mut self) {
        self.find_and_click("attack", ATTACK_TRIES);
        self.settle_after_submit();
        self.reload_after_attack();
    }

    /// Watch automation play the current turn. `true` once the attack (or
    /// next) button has gone away and come back; `false` if that never
    /// happened within the budget.
    fn await_auto_turn(&mut self) -> Flow<bool> {
        let interval = self.settings.retry.poll_interval();
        let mut left_input = false;
        for _ in 0..AUTO_TURN_TRIES {
            self.check()?;
            let ready = self.surface.find_button("attack").is_some()
                || self.surface.find_button("next").is_some();
            if ready && left_input {
                return Ok(true);
            }
            if !ready {
                left_input = true;
                self.dismiss_dialogs();
                self.party_wipe_check();
            }
            self.wait(interval);
        }
        debug!(turn = self.state.current_turn, left_input, "no turn change seen");
        Ok(false)
    }

    pub(crate) fn finish_turn(&mut self) {
        let ended = self.state.current_turn;
        self.record(CombatEvent::TurnEnded { turn: ended });
        let next = self.state.advance_turn();
        debug!(ended, next, "turn ended");
    }

    /// Poll until the attack or next button is back, dismissing dialogs and
    /// watching for a wiped party along the way. Returns whether the attack
    /// resolved (or the fight ended) within the budget.
    pub(crate) fn wait_for_attack(&mut self) -> bool {
        let interval = self.settings.retry.poll_interval();
        for tries_left in (1..=RESOLVE_TRIES).rev() {
            if self.state.retreated
                || self.surface.find_button("attack").is_some()
                || self.surface.find_button("next").is_some()
            {
                return true;
            }
            if tries_left % 2 == 0 {
                self.dismiss_dialogs();
                self.party_wipe_check();
                if self.surface.confirm_screen("battle_concluded")
                    || self.surface.confirm_screen("exp_gained")
                {
                    return true;
                }
            }
            self.wait(interval);
        }
        debug!(turn = self.state.current_turn, "attack did not visibly resolve");
        false
    }

    pub(crate) fn dismiss_dialogs(&mut self) {
        let dialog = self
            .surface
            .find_button("dialog_lyria")
            .or_else(|| self.surface.find_button("dialog_vyrn"));
        if let Some(at) = dialog {
            debug!("dismissing dialog popup");
            self.surface.click(at.offset(DIALOG_CLOSE_OFFSET), "dialog");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::test_battle;
    use crate::settings::{CombatSettings, StrategyConfig};
    use crate::sim::SimScreen;
    use crate::state::{AutoMode, Outcome};
    use crate::surface::{Clock, Point};

    fn screen(yaml: &str) -> SimScreen {
        SimScreen::from_yaml(yaml).expect("should build screen")
    }

    fn turns_ended(events: &[CombatEvent]) -> Vec<u32> {
        events
            .iter()
            .filter_map(|e| match e {
                CombatEvent::TurnEnded { turn } => Some(*turn),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_should_start_matching_turn_without_attacking() {
        let mut sim = screen("visible: [attack]\n");
        let settings = CombatSettings::default();
        let mut battle = test_battle(&mut sim, &settings);

        battle.enter_turn(1).expect("battle should continue");
        assert_eq!(battle.events, vec![CombatEvent::TurnStarted { turn: 1 }]);
        assert_eq!(sim.click_count("attack"), 0);
    }

    #[test]
    fn test_should_fast_forward_one_cycle_per_missing_turn() {
        let mut sim = screen("visible: [attack]\n");
        let settings = CombatSettings::default();
        let mut battle = test_battle(&mut sim, &settings);

        battle.enter_turn(4).expect("battle should continue");
        assert_eq!(battle.state.current_turn, 4);
        assert_eq!(turns_ended(&battle.events), vec![1, 2, 3]);
        assert_eq!(
            battle.events.last(),
            Some(&CombatEvent::TurnStarted { turn: 4 })
        );
        assert_eq!(sim.click_count("attack"), 3);
    }

    #[test]
    fn test_should_abort_fast_forward_on_terminal_outcome() {
        let mut sim = screen("visible: [attack]\nrules:\n  - onClick: attack\n    nth: 2\n    show: [exp_gained]\n");
        let settings = CombatSettings::default();
        let mut battle = test_battle(&mut sim, &settings);

        assert_eq!(battle.enter_turn(6), Err(Outcome::ExpGained));
        assert_eq!(turns_ended(&battle.events), vec![1, 2]);
        assert!(!battle
            .events
            .iter()
            .any(|e| matches!(e, CombatEvent::TurnStarted { .. })));
        assert_eq!(sim.click_count("attack"), 2);
    }

    #[test]
    fn test_should_skip_marker_behind_current_turn() {
        let mut sim = screen("visible: [attack]\n");
        let settings = CombatSettings::default();
        let mut battle = test_battle(&mut sim, &settings);
        battle.state.current_turn = 3;
        battle.state.target_turn = 3;

        battle.enter_turn(2).expect("battle should continue");
        assert_eq!(battle.state.current_turn, 3);
        assert!(!battle.state.in_sync());
        assert_eq!(
            battle.events,
            vec![CombatEvent::MarkerSkipped {
                marker: 2,
                current: 3
            }]
        );

        battle
            .step(&autobattle_script::Command::TargetEnemy(1))
            .expect("battle should continue");
        assert_eq!(battle.dispatched, 0);
    }

    #[test]
    fn test_should_treat_markers_as_labels_in_sequential_mode() {
        let mut sim = screen("visible: [attack]\n");
        let settings = CombatSettings::builder()
            .strategy(StrategyConfig {
                turn_sync: TurnSync::Sequential,
                ..StrategyConfig::default()
            })
            .build();
        let mut battle = test_battle(&mut sim, &settings);

        battle.enter_turn(5).expect("battle should continue");
        assert_eq!(battle.state.current_turn, 1);
        assert!(battle.state.in_sync());
        assert_eq!(sim.click_count("attack"), 0);
    }

    #[test]
    fn test_should_let_automation_play_turns_and_suspend_before_target() {
        // Automation plays a turn whenever the attack button drops out and returns.
        let mut sim = screen(
            "visible: [attack, full_auto, full_auto_enabled]\nrules:\n  - afterSecs: 2\n    hide: [attack]\n  - afterSecs: 4\n    show: [attack]\n  - afterSecs: 6\n    hide: [attack]\n  - afterSecs: 8\n    show: [attack]\n  - afterSecs: 12\n    hide: [attack]\n  - afterSecs: 14\n    show: [attack]\n",
        );
        let settings = CombatSettings::default();
        let mut battle = test_battle(&mut sim, &settings);
        battle.enable_auto(autobattle_script::AutoKind::Full);

        battle.enter_turn(4).expect("battle should continue");
        assert_eq!(battle.state.current_turn, 4);
        assert_eq!(battle.state.auto_mode, AutoMode::Manual);
        // Automation resolved turns 1 and 2; turn 3 was submitted by hand.
        assert_eq!(battle.surface.click_count("attack"), 1);
        assert_eq!(battle.surface.click_count("full_auto_enabled"), 1);

        battle.end_turn().expect("battle should continue");
        assert_eq!(battle.state.auto_mode, AutoMode::FullAuto);
        assert_eq!(battle.state.current_turn, 5);
        assert_eq!(sim.click_count("attack"), 1);
        assert_eq!(sim.now(), Duration::from_secs(14));
    }

    #[test]
    fn test_should_not_count_turn_automation_never_played() {
        let mut sim = screen("visible: [attack, full_auto]\n");
        let settings = CombatSettings::default();
        let mut battle = test_battle(&mut sim, &settings);
        battle.enable_auto(autobattle_script::AutoKind::Full);

        assert_eq!(battle.await_auto_turn(), Ok(false));
        assert_eq!(battle.state.current_turn, 1);
        assert!(turns_ended(&battle.events).is_empty());
        assert_eq!(sim.click_count("attack"), 0);
    }

    #[test]
    fn test_should_attack_by_hand_when_automation_stays_idle() {
        let mut sim = screen("visible: [attack, full_auto]\n");
        let settings = CombatSettings::default();
        let mut battle = test_battle(&mut sim, &settings);
        battle.enable_auto(autobattle_script::AutoKind::Full);

        battle.enter_turn(3).expect("battle should continue");
        assert_eq!(battle.state.current_turn, 3);
        // Turn 1 waited out automation before attacking; turn 2 was handed back.
        assert_eq!(sim.click_count("attack"), 2);
        assert!(sim.now() >= Duration::from_secs(30));
    }

    #[test]
    fn test_should_skip_manual_commands_while_automation_plays() {
        let mut sim = screen("visible: [attack, full_auto, semi_auto]\n");
        let settings = CombatSettings::default();
        let mut battle = test_battle(&mut sim, &settings);
        battle.enable_auto(autobattle_script::AutoKind::Full);

        let skill = Command::Character {
            slot: 1,
            ops: vec![autobattle_script::SkillOp::UseSkill(1)],
        };
        battle.step(&skill).expect("battle should continue");
        battle
            .step(&Command::Summon {
                slot: 1,
                then: Vec::new(),
            })
            .expect("battle should continue");
        battle.step(&Command::EndTurn).expect("battle should continue");
        assert_eq!(battle.dispatched, 0);
        assert_eq!(battle.surface.click_count("skill1"), 0);
        assert_eq!(battle.surface.click_count("attack"), 0);

        battle
            .step(&Command::EnableAuto(autobattle_script::AutoKind::Semi))
            .expect("battle should continue");
        assert_eq!(battle.dispatched, 1);
        assert_eq!(battle.state.auto_mode, AutoMode::FullAuto);
    }

    #[test]
    fn test_should_dismiss_dialog_at_offset() {
        let mut sim = screen("visible: [dialog_vyrn]\npositions:\n  dialog_vyrn: { x: 100, y: 100 }\n");
        let settings = CombatSettings::default();
        let mut battle = test_battle(&mut sim, &settings);

        battle.dismiss_dialogs();
        assert_eq!(
            sim.actions(),
            &[crate::sim::SimAction::Click {
                label: "dialog".to_owned(),
                at: Point::new(280, 49),
            }]
        );
    }

    #[test]
    fn test_should_stop_waiting_once_party_wipes() {
        let mut sim = screen("visible: [party_wipe_indicator]\n");
        let settings = CombatSettings::builder()
            .farming_mode(crate::settings::FarmingMode::Raid)
            .build();
        let mut battle = test_battle(&mut sim, &settings);

        assert!(battle.wait_for_attack());
        assert!(battle.state.retreated);
        assert_eq!(battle.close_turn(false), Err(Outcome::NoLoot));
    }
}

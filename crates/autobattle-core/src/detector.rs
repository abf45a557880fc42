//! Battle-end detection and party-wipe handling.

use tracing::{debug, info, warn};

use crate::engine::Battle;
use crate::events::{CombatEvent, WipeResponse};
use crate::policy::DEFAULT_TRIES;
use crate::settings::FarmingMode;
use crate::state::{Flow, Outcome};
use crate::surface::Surface;

impl<S: Surface> Battle<'_, S> {
    /// Classify the current screen. `None` means the fight goes on.
    ///
    /// The first match wins: raid budget, retreat or no-loot screen, sudden
    /// conclusion, experience screen, loot screen.
    pub(crate) fn classify(&mut self) -> Option<Outcome> {
        if self.time_exceeded() {
            return Some(Outcome::TimeExceeded);
        }
        // Leaving the fight forfeits the rewards.
        if self.state.retreated || self.surface.confirm_screen("no_loot") {
            return Some(Outcome::NoLoot);
        }
        if self.surface.confirm_screen("battle_concluded") {
            return Some(Outcome::BattleConcluded);
        }
        if self.surface.confirm_screen("exp_gained") {
            return Some(Outcome::ExpGained);
        }
        if self.surface.confirm_screen("loot_collected") {
            return Some(Outcome::LootCollected);
        }
        None
    }

    /// Stop the fight if it is over.
    pub(crate) fn check(&mut self) -> Flow {
        match self.classify() {
            None => Ok(()),
            Some(outcome) => {
                if outcome == Outcome::BattleConcluded {
                    info!("battle concluded suddenly");
                    self.find_and_click("reload", DEFAULT_TRIES);
                }
                Err(self.conclude(outcome))
            }
        }
    }

    pub(crate) fn conclude(&mut self, outcome: Outcome) -> Outcome {
        if self.state.outcome.is_none() {
            self.state.outcome = Some(outcome);
        }
        outcome
    }

    /// React to a wiped party. Returns whether the party had wiped and the
    /// engine backed out.
    pub(crate) fn party_wipe_check(&mut self) -> bool {
        let indicator = self.surface.find_button("party_wipe_indicator");
        if indicator.is_none() && !self.surface.confirm_screen("salute_participants") {
            return false;
        }

        let response = if self.settings.retreats_on_wipe() && self.confirm("continue", DEFAULT_TRIES) {
            warn!(turn = self.state.current_turn, "party wiped, retreating");
            if let Some(at) = indicator {
                self.surface.click(at, "party_wipe_indicator");
            }
            // Decline the revive prompt, then retreat.
            self.find_and_click("cancel", DEFAULT_TRIES);
            self.find_and_click("retreat_confirmation", DEFAULT_TRIES);
            WipeResponse::Retreat
        } else if self.settings.backs_out_on_wipe() {
            warn!(turn = self.state.current_turn, "party wiped, backing out without retreating");
            self.surface.go_back_home();
            WipeResponse::BackOut
        } else if self.settings.farming_mode == FarmingMode::Coop
            && self.confirm("salute_participants", DEFAULT_TRIES)
        {
            warn!(turn = self.state.current_turn, "party wiped, leaving the co-op room");
            if let Some(at) = indicator {
                self.surface.click(at, "party_wipe_indicator");
            }
            self.find_and_click("salute", DEFAULT_TRIES);
            self.find_and_click("ok", DEFAULT_TRIES);
            self.find_and_click("cancel", DEFAULT_TRIES);
            self.find_and_click("leave", DEFAULT_TRIES);
            WipeResponse::LeaveRoom
        } else {
            debug!("wipe indicator seen but no exit is available yet");
            return false;
        };

        self.state.retreated = true;
        self.record(CombatEvent::PartyWiped {
            turn: self.state.current_turn,
            response,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::test_battle;
    use crate::settings::{CombatSettings, RaidConfig};
    use crate::sim::SimScreen;

    fn screen(yaml: &str) -> SimScreen {
        SimScreen::from_yaml(yaml).expect("should build screen")
    }

    #[test]
    fn test_should_continue_when_no_end_screen_is_visible() {
        let mut sim = screen("visible: [attack]\n");
        let settings = CombatSettings::default();
        let mut battle = test_battle(&mut sim, &settings);

        assert_eq!(battle.classify(), None);
        assert!(battle.check().is_ok());
    }

    #[test]
    fn test_should_apply_precedence_between_end_screens() {
        let settings = CombatSettings::default();

        let mut sim = screen("visible: [loot_collected, exp_gained]\n");
        assert_eq!(
            test_battle(&mut sim, &settings).classify(),
            Some(Outcome::ExpGained)
        );

        let mut sim = screen("visible: [loot_collected, battle_concluded]\n");
        assert_eq!(
            test_battle(&mut sim, &settings).classify(),
            Some(Outcome::BattleConcluded)
        );

        let mut sim = screen("visible: [exp_gained, no_loot]\n");
        assert_eq!(
            test_battle(&mut sim, &settings).classify(),
            Some(Outcome::NoLoot)
        );
    }

    #[test]
    fn test_should_report_no_loot_once_retreated() {
        let mut sim = screen("visible: [loot_collected]\n");
        let settings = CombatSettings::default();
        let mut battle = test_battle(&mut sim, &settings);
        battle.state.retreated = true;

        assert_eq!(battle.check(), Err(Outcome::NoLoot));
        assert_eq!(battle.state.outcome, Some(Outcome::NoLoot));
    }

    #[test]
    fn test_should_put_raid_budget_first() {
        let mut sim = screen("visible: [exp_gained]\n");
        let settings = CombatSettings::builder()
            .farming_mode(FarmingMode::Raid)
            .raid(RaidConfig {
                enable_auto_exit: true,
                time_allowed_secs: 1,
            })
            .build();
        let mut battle = test_battle(&mut sim, &settings);
        battle.wait(std::time::Duration::from_secs(1));

        assert_eq!(battle.classify(), Some(Outcome::TimeExceeded));
    }

    #[test]
    fn test_should_dismiss_sudden_conclusion_with_reload() {
        let mut sim = screen("visible: [battle_concluded, reload]\n");
        let settings = CombatSettings::default();
        let mut battle = test_battle(&mut sim, &settings);

        assert_eq!(battle.check(), Err(Outcome::BattleConcluded));
        assert_eq!(sim.click_count("reload"), 1);
    }

    #[test]
    fn test_should_retreat_from_solo_content_on_wipe() {
        let mut sim = screen("visible: [party_wipe_indicator, continue, cancel, retreat_confirmation]\n");
        let settings = CombatSettings::default();
        let mut battle = test_battle(&mut sim, &settings);

        assert!(battle.party_wipe_check());
        assert!(battle.state.retreated);
        assert_eq!(
            battle.events,
            vec![CombatEvent::PartyWiped {
                turn: 1,
                response: WipeResponse::Retreat
            }]
        );
        assert_eq!(
            sim.clicked_labels(),
            vec!["party_wipe_indicator", "cancel", "retreat_confirmation"]
        );
    }

    #[test]
    fn test_should_back_out_of_raid_on_wipe() {
        let mut sim = screen("visible: [party_wipe_indicator, continue]\n");
        let settings = CombatSettings::builder()
            .farming_mode(FarmingMode::Raid)
            .build();
        let mut battle = test_battle(&mut sim, &settings);

        assert!(battle.party_wipe_check());
        assert!(battle.state.retreated);
        assert!(sim.went_home());
        assert_eq!(sim.click_count("retreat_confirmation"), 0);
    }

    #[test]
    fn test_should_leave_coop_room_on_wipe() {
        let mut sim = screen("visible: [salute_participants, salute, ok, cancel, leave]\n");
        let settings = CombatSettings::builder()
            .farming_mode(FarmingMode::Coop)
            .build();
        let mut battle = test_battle(&mut sim, &settings);

        assert!(battle.party_wipe_check());
        assert!(matches!(
            battle.events.as_slice(),
            [CombatEvent::PartyWiped {
                response: WipeResponse::LeaveRoom,
                ..
            }]
        ));
        assert_eq!(sim.clicked_labels(), vec!["salute", "ok", "cancel", "leave"]);
    }

    #[test]
    fn test_should_ignore_healthy_party() {
        let mut sim = screen("visible: [attack]\n");
        let settings = CombatSettings::default();
        let mut battle = test_battle(&mut sim, &settings);

        assert!(!battle.party_wipe_check());
        assert!(!battle.state.retreated);
    }
}

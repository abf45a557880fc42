//! Semi/Full Auto control and the loops that run once the script is done.

use std::convert::Infallible;
use std::time::Duration;

use autobattle_script::AutoKind;
use tracing::{debug, info, warn};

use crate::engine::Battle;
use crate::events::{CombatEvent, Recoverable};
use crate::policy::DEFAULT_TRIES;
use crate::settings::FarmingMode;
use crate::state::{AutoMode, Flow, Outcome};
use crate::surface::Surface;

/// The Semi Auto control only shows up while an attack is animating.
const SEMI_AUTO_TRIES: u32 = 5;
const RAID_OVER_TRIES: u32 = 3;
const ATTACK_TRIES: u32 = 10;
const NEXT_SETTLE: Duration = Duration::from_secs(3);

impl<S: Surface> Battle<'_, S> {
    /// Turn on automation, falling back to the other mode when the requested
    /// control is missing. Stays manual if neither can be enabled.
    pub(crate) fn enable_auto(&mut self, kind: AutoKind) {
        let current = self.state.auto_mode;
        if current.kind() == Some(kind) {
            debug!(?kind, "automation already on");
            return;
        }
        if current.is_active() {
            warn!(?current, requested = ?kind, "automation already on in the other mode, keeping it");
            return;
        }

        self.state.suspended_auto = None;
        let mode = match kind {
            AutoKind::Full => self.try_full_auto(),
            AutoKind::Semi => self.try_semi_auto(),
        };
        if mode == AutoMode::Manual {
            self.recover(Recoverable::AutoUnavailable);
        }
        self.set_auto_mode(mode);
    }

    fn try_full_auto(&mut self) -> AutoMode {
        if self.find_and_click("full_auto", DEFAULT_TRIES) {
            return AutoMode::FullAuto;
        }
        info!("full auto control missing, falling back to semi auto");
        self.find_and_click("attack", DEFAULT_TRIES);
        if self.find_and_click("semi_auto", SEMI_AUTO_TRIES) {
            AutoMode::SemiAuto
        } else {
            AutoMode::Manual
        }
    }

    fn try_semi_auto(&mut self) -> AutoMode {
        if self.find("semi_auto_enabled", 1).is_some() {
            return AutoMode::SemiAuto;
        }
        self.find_and_click("attack", DEFAULT_TRIES);
        if self.find_and_click("semi_auto", SEMI_AUTO_TRIES) {
            return AutoMode::SemiAuto;
        }
        info!("semi auto control missing, falling back to full auto");
        if self.find_and_click("full_auto", DEFAULT_TRIES) {
            AutoMode::FullAuto
        } else {
            AutoMode::Manual
        }
    }

    /// Switch automation off so the script can act on an upcoming turn. It
    /// is turned back on when that turn ends.
    pub(crate) fn suspend_auto(&mut self) {
        let Some(kind) = self.state.auto_mode.kind() else {
            return;
        };
        let control = match kind {
            AutoKind::Full => "full_auto_enabled",
            AutoKind::Semi => "semi_auto_enabled",
        };
        if !self.find_and_click(control, DEFAULT_TRIES) {
            warn!(?kind, "automation indicator not found while suspending");
        }
        info!(?kind, turn = self.state.current_turn, "suspending automation");
        self.state.suspended_auto = Some(kind);
        self.set_auto_mode(AutoMode::Manual);
    }

    /// Turn suspended automation back on, if any.
    pub(crate) fn resume_auto(&mut self) {
        if let Some(kind) = self.state.suspended_auto.take() {
            info!(?kind, turn = self.state.current_turn, "resuming automation");
            self.enable_auto(kind);
        }
    }

    fn set_auto_mode(&mut self, to: AutoMode) {
        let from = self.state.auto_mode;
        if from != to {
            self.state.auto_mode = to;
            self.record(CombatEvent::AutoModeChanged { from, to });
        }
    }

    // ── Script exhausted ─────────────────────────────────────

    /// Play the fight out once every command has run.
    pub(crate) fn finish_script(&mut self) -> Flow<Infallible> {
        self.check()?;

        // High-profile raids can end before the script does.
        if self.settings.farming_mode == FarmingMode::Raid
            && self.find_and_click("next", RAID_OVER_TRIES)
        {
            info!("raid already over");
            return Err(self.conclude(Outcome::BattleConcluded));
        }

        info!(turn = self.state.current_turn, "reached end of script");
        if self.state.manual_attack_loop {
            return self.manual_attack_loop();
        }

        self.resume_auto();
        if !self.state.auto_mode.is_active() {
            if self.settings.enable_auto_quick_summon {
                self.quick_summon(&[])?;
            }
            self.enable_auto(AutoKind::Full);
        }

        if self.state.auto_mode.is_active() {
            self.poll_auto()
        } else {
            warn!("automation unavailable, attacking manually until the battle ends");
            self.manual_attack_loop()
        }
    }

    /// Idle under automation until the fight ends or the party wipes.
    fn poll_auto(&mut self) -> Flow<Infallible> {
        let interval = self.settings.retry.auto_poll();
        loop {
            self.check()?;
            if self.find_and_click("next", 1) {
                self.wait(NEXT_SETTLE);
            }
            self.party_wipe_check();
            self.wait(interval);
        }
    }

    /// Attack every turn, reloading when the content calls for it. A turn
    /// only counts once its attack has visibly resolved.
    fn manual_attack_loop(&mut self) -> Flow<Infallible> {
        let interval = self.settings.retry.auto_poll();
        loop {
            self.check()?;
            if self.find_and_click("next", 1) {
                self.wait(NEXT_SETTLE);
            }
            if self.find_and_click("attack", ATTACK_TRIES) {
                self.settle_after_submit();
                self.reload_after_attack();
                if self.wait_for_attack() {
                    self.finish_turn();
                }
            } else {
                self.party_wipe_check();
            }
            self.wait(interval);
        }
    }
}

//! Bounded retries, stall recovery and reloads.
//!
//! Every perception query goes through [`Battle::find`] or
//! [`Battle::confirm`], which retry a fixed number of times with the
//! configured poll interval between attempts. Running out of tries means
//! "not there", which callers branch on.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Battle;
use crate::events::{CombatEvent, Recoverable, ReloadReason};
use crate::surface::{Offset, Point, Surface};

/// Attempts for a query when no specific budget applies.
pub(crate) const DEFAULT_TRIES: u32 = 5;

/// Budget for locating the attack button again after a stall reload.
const RESYNC_TRIES: u32 = 10;

const INDICATOR_TRIES: u32 = 3;

const STALL_BACKOFF: Duration = Duration::from_secs(1);

impl<S: Surface> Battle<'_, S> {
    // ── Bounded perception ───────────────────────────────────

    pub(crate) fn find(&mut self, name: &str, tries: u32) -> Option<Point> {
        let tries = tries.max(1);
        for attempt in 1..=tries {
            if let Some(point) = self.surface.find_button(name) {
                return Some(point);
            }
            if attempt < tries {
                self.surface.sleep(self.settings.retry.poll_interval());
            }
        }
        debug!(name, tries, "not found");
        None
    }

    pub(crate) fn confirm(&mut self, name: &str, tries: u32) -> bool {
        let tries = tries.max(1);
        for attempt in 1..=tries {
            if self.surface.confirm_screen(name) {
                return true;
            }
            if attempt < tries {
                self.surface.sleep(self.settings.retry.poll_interval());
            }
        }
        false
    }

    pub(crate) fn find_and_click(&mut self, name: &str, tries: u32) -> bool {
        match self.find(name, tries) {
            Some(at) => {
                self.surface.click(at, name);
                true
            }
            None => false,
        }
    }

    /// Click relative to the attack button.
    pub(crate) fn click_anchor(&mut self, offset: Offset, label: &str) {
        let at = self.anchor.offset(offset);
        self.surface.click(at, label);
    }

    pub(crate) fn double_click_anchor(&mut self, offset: Offset, label: &str) {
        let at = self.anchor.offset(offset);
        self.surface.double_click(at, label);
    }

    pub(crate) fn wait(&mut self, duration: Duration) {
        if !duration.is_zero() {
            self.surface.sleep(duration);
        }
    }

    pub(crate) fn locate_anchor(&mut self, tries: u32) -> Option<Point> {
        self.find("attack", tries)
    }

    // ── Time budget ──────────────────────────────────────────

    pub(crate) fn elapsed(&self) -> Duration {
        self.surface.now().saturating_sub(self.state.started_at)
    }

    pub(crate) fn time_exceeded(&self) -> bool {
        self.settings
            .time_budget()
            .is_some_and(|budget| self.elapsed() >= budget)
    }

    // ── Stall recovery and reloads ───────────────────────────

    /// Wait for the in-progress indicator after submitting a turn, reloading
    /// the page if it never clears.
    pub(crate) fn settle_after_submit(&mut self) {
        if self.find("combat_cancel", INDICATOR_TRIES).is_none() {
            return;
        }
        let timeout = self.settings.retry.stall_timeout();
        for attempt in 1..=self.settings.retry.max_stall_waits {
            if self.surface.wait_vanish("combat_cancel", timeout) {
                return;
            }
            debug!(attempt, "in-progress indicator still visible");
            self.wait(STALL_BACKOFF);
        }

        warn!(turn = self.state.current_turn, "attack stalled, reloading");
        self.reload(ReloadReason::Stall);
        self.resync_anchor();
    }

    /// Find the attack button again after the page was reloaded.
    pub(crate) fn resync_anchor(&mut self) {
        match self.locate_anchor(RESYNC_TRIES) {
            Some(anchor) => self.anchor = anchor,
            None => self.recover(Recoverable::AnchorLost),
        }
    }

    /// Reload after an attack when the content calls for it.
    pub(crate) fn reload_after_attack(&mut self) {
        if self.settings.reload_after_attack() {
            self.reload(ReloadReason::AfterAttack);
        }
    }

    pub(crate) fn reload(&mut self, reason: ReloadReason) {
        if self.find_and_click("reload", DEFAULT_TRIES) {
            info!(turn = self.state.current_turn, ?reason, "reloading page");
            self.record(CombatEvent::Reloaded {
                turn: self.state.current_turn,
                reason,
            });
        } else {
            debug!(?reason, "reload button not found");
        }
        self.wait(self.settings.retry.reload_wait());
    }

    // ── Bookkeeping ──────────────────────────────────────────

    pub(crate) fn record(&mut self, event: CombatEvent) {
        self.events.push(event);
    }

    pub(crate) fn recover(&mut self, condition: Recoverable) {
        warn!(turn = self.state.current_turn, ?condition, "recoverable UI state");
        self.record(CombatEvent::Recovered {
            turn: self.state.current_turn,
            condition,
        });
    }
}

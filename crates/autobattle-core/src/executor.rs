//! Per-command effects.
//!
//! [`Battle::dispatch`] turns one [`Command`] into clicks and perception
//! queries. UI refusals (sealed skill, restricted summon, missing item,
//! backup cooldown) are logged and stepped over. The battle-end detector runs
//! after every dispatched command.

use std::time::Duration;

use autobattle_script::{Command, HealingItem, ManualAction, SkillOp, TrailingOp};
use tracing::{debug, info, warn};

use crate::engine::Battle;
use crate::events::{CombatEvent, Recoverable, ReloadReason};
use crate::policy::DEFAULT_TRIES;
use crate::state::Flow;
use crate::surface::{Offset, Surface};

const ATTACK_TRIES: u32 = 30;
const BACKUP_TRIES: u32 = 5;
const CONFIRM_TRIES: u32 = 5;
const SKILL_PROMPT_TRIES: u32 = 2;

const CANCEL_VANISH_TIMEOUT: Duration = Duration::from_secs(10);
const ITEM_PROMPT_TIMEOUT: Duration = Duration::from_secs(5);
const POPUP_SETTLE: Duration = Duration::from_secs(1);

const BACKUP_SCROLL_STEP: i32 = -200;
const BACKUP_SCROLL_RESET: i32 = 400;
/// The request button sits to the right of the popup's cancel button.
const BACKUP_CONFIRM_OFFSET: Offset = Offset::new(200, 0);

impl<S: Surface> Battle<'_, S> {
    /// Execute one command, then consult the battle-end detector.
    pub(crate) fn dispatch(&mut self, command: &Command) -> Flow {
        if let Command::Turn(turn) = command {
            return self.enter_turn(*turn);
        }

        let turn = self.state.current_turn;
        info!(turn, command = %command, "dispatching");
        self.dispatched += 1;
        self.record(CombatEvent::Dispatched {
            turn,
            command: command.clone(),
        });

        match command {
            Command::Turn(_) => {}
            Command::EndTurn => self.end_turn()?,
            Command::Character { slot, ops } => self.character(*slot, ops)?,
            Command::Summon { slot, then } => self.summon(*slot, then)?,
            Command::QuickSummon { then } => self.quick_summon(then)?,
            Command::Item { item, target } => self.use_item(*item, *target),
            Command::TargetEnemy(slot) => self.target_enemy(*slot),
            Command::EnableAuto(kind) => self.enable_auto(*kind),
            Command::RequestBackup { via_social: false } => self.request_backup(),
            Command::RequestBackup { via_social: true } => self.tweet_backup(),
            Command::Wait(duration) => self.wait(*duration),
            Command::Manual(action) => self.manual(*action),
            Command::RepeatAttackAndReload => {
                info!("will attack and reload manually once the script ends");
                self.state.manual_attack_loop = true;
            }
            Command::Exit => {
                info!("leaving the battle without retreating");
                self.surface.go_back_home();
                self.state.retreated = true;
            }
        }

        self.check()
    }

    // ── Characters ───────────────────────────────────────────

    fn character(&mut self, slot: u8, ops: &[SkillOp]) -> Flow {
        let Some(offset) = self.settings.layout.character(slot) else {
            warn!(slot, "no layout entry for character");
            return Ok(());
        };
        // Double click so stray popups from other players cannot eat the selection.
        self.double_click_anchor(offset, &format!("character{slot}"));

        let mut last_skill = 0;
        let mut ops = ops.iter().peekable();
        while let Some(op) = ops.next() {
            match *op {
                SkillOp::UseSkill(skill) => {
                    self.use_skill(slot, skill);
                    last_skill = skill;
                    let wants_target = matches!(ops.peek(), Some(SkillOp::Target(_)));
                    if wants_target && self.confirm("use_skill", SKILL_PROMPT_TRIES) {
                        if let Some(SkillOp::Target(ally)) = ops.next() {
                            self.select_ally(*ally);
                        }
                    } else if self.confirm("skill_unusable", SKILL_PROMPT_TRIES) {
                        self.recover(Recoverable::SkillSealed {
                            character: slot,
                            skill,
                        });
                        self.find_and_click("cancel", DEFAULT_TRIES);
                    }
                    if let Some(idle) = self.settings.idle_after_skill() {
                        self.wait(idle);
                    }
                }
                SkillOp::Target(_) => self.recover(Recoverable::TargetNotRequested {
                    character: slot,
                    skill: last_skill,
                }),
                SkillOp::Wait(duration) => self.wait(duration),
                SkillOp::Attack => {
                    debug!(slot, "attack inside skill chain, ending turn early");
                    self.find_and_click("back", DEFAULT_TRIES);
                    return self.end_turn();
                }
            }
        }

        self.find_and_click("back", DEFAULT_TRIES);
        Ok(())
    }

    fn use_skill(&mut self, character: u8, skill: u8) {
        match self.settings.layout.skill(skill) {
            Some(offset) => {
                info!(character, skill, "using skill");
                self.click_anchor(offset, &format!("skill{skill}"));
            }
            None => warn!(skill, "no layout entry for skill"),
        }
    }

    fn select_ally(&mut self, ally: u8) {
        let Some(offset) = self.settings.layout.ally_target(ally) else {
            warn!(ally, "no layout entry for ally target");
            return;
        };
        match self.find("select_a_character", DEFAULT_TRIES) {
            Some(prompt) => {
                info!(ally, "targeting ally for skill");
                self.surface.click(prompt.offset(offset), &format!("ally{ally}"));
            }
            None => warn!(ally, "target prompt vanished before an ally was picked"),
        }
    }

    /// Double click a character portrait, used by single-target items.
    fn select_character(&mut self, slot: u8) {
        match self.settings.layout.character(slot) {
            Some(offset) => self.double_click_anchor(offset, &format!("character{slot}")),
            None => warn!(slot, "no layout entry for character"),
        }
    }

    // ── Summons ──────────────────────────────────────────────

    fn summon(&mut self, slot: u8, then: &[TrailingOp]) -> Flow {
        let Some(offset) = self.settings.layout.summon(slot) else {
            warn!(slot, "no layout entry for summon");
            return Ok(());
        };
        info!(slot, "invoking summon");
        self.find_and_click("summon", DEFAULT_TRIES);
        self.double_click_anchor(offset, &format!("summon{slot}"));

        if self.confirm("summon_details", DEFAULT_TRIES) {
            if !self.find_and_click("ok", DEFAULT_TRIES) {
                self.recover(Recoverable::SummonRestricted { slot });
                self.find_and_click("cancel", DEFAULT_TRIES);
            }
        } else {
            self.recover(Recoverable::SummonRestricted { slot });
        }

        self.find_and_click("back", 1);
        if let Some(idle) = self.settings.idle_after_summon() {
            self.wait(idle);
        }
        self.trailing(then)
    }

    pub(crate) fn quick_summon(&mut self, then: &[TrailingOp]) -> Flow {
        if self.surface.find_button("quick_summon_not_ready").is_some() {
            self.recover(Recoverable::QuickSummonNotReady);
        } else if self.find_and_click("quick_summon1", DEFAULT_TRIES)
            || self.find_and_click("quick_summon2", DEFAULT_TRIES)
        {
            info!("quick summoned");
        } else {
            self.recover(Recoverable::QuickSummonNotReady);
        }
        self.trailing(then)
    }

    fn trailing(&mut self, then: &[TrailingOp]) -> Flow {
        for op in then {
            match *op {
                TrailingOp::Wait(duration) => self.wait(duration),
                TrailingOp::Attack => return self.end_turn(),
            }
        }
        Ok(())
    }

    // ── Items ────────────────────────────────────────────────

    fn use_item(&mut self, item: HealingItem, target: Option<u8>) {
        info!(?item, target, "using healing item");
        self.find_and_click("heal", DEFAULT_TRIES);

        match item {
            HealingItem::BluePotion | HealingItem::SupportPotion => {
                // Both potions share one template; blue is listed first.
                let index = usize::from(item == HealingItem::SupportPotion);
                let matches = self.surface.find_all(HealingItem::BluePotion.keyword());
                match matches.get(index) {
                    Some(&at) => self.surface.click(at, item.keyword()),
                    None => debug!(?item, "potion not listed"),
                }
            }
            _ => {
                self.find_and_click(item.keyword(), DEFAULT_TRIES);
            }
        }

        if !self
            .surface
            .wait_vanish("tap_the_item_to_use", ITEM_PROMPT_TIMEOUT)
        {
            self.recover(Recoverable::ItemUnavailable { item });
            self.find_and_click("cancel", DEFAULT_TRIES);
            return;
        }

        match item {
            HealingItem::GreenPotion | HealingItem::ClarityHerb => match target {
                Some(slot) => self.select_character(slot),
                None => warn!(?item, "item needs a target character"),
            },
            HealingItem::BluePotion => {
                self.find_and_click("use", DEFAULT_TRIES);
            }
            HealingItem::FullElixir | HealingItem::SupportPotion | HealingItem::RevivalPotion => {
                self.find_and_click("ok", DEFAULT_TRIES);
            }
        }

        self.wait(POPUP_SETTLE);
        if self.confirm("use_item", CONFIRM_TRIES) {
            self.recover(Recoverable::ItemRejected { item });
            self.find_and_click("cancel", DEFAULT_TRIES);
        }
    }

    // ── Targeting and backup ─────────────────────────────────

    fn target_enemy(&mut self, slot: u8) {
        let Some(offset) = self.settings.layout.enemy(slot) else {
            warn!(slot, "no layout entry for enemy");
            return;
        };
        self.click_anchor(offset, &format!("enemy{slot}"));
        self.find_and_click("set_target", DEFAULT_TRIES);
        info!(slot, "targeted enemy");
    }

    fn request_backup(&mut self) {
        info!("requesting backup");
        let anchor = self.anchor;
        let mut tries = BACKUP_TRIES;
        while !self.find_and_click("request_backup", DEFAULT_TRIES) {
            self.surface.scroll(anchor, BACKUP_SCROLL_STEP);
            tries -= 1;
            if tries == 0 {
                self.recover(Recoverable::BackupFailed);
                self.surface.scroll(anchor, BACKUP_SCROLL_RESET);
                return;
            }
        }

        self.wait(POPUP_SETTLE);
        if let Some(cancel) = self.find("cancel", DEFAULT_TRIES) {
            self.surface
                .click(cancel.offset(BACKUP_CONFIRM_OFFSET), "request_backup_confirm");
        }
        self.wait(POPUP_SETTLE);

        if self.confirm("request_backup_success", CONFIRM_TRIES) {
            info!("backup requested");
            self.find_and_click("ok", DEFAULT_TRIES);
        } else {
            self.recover(Recoverable::BackupOnCooldown);
            self.find_and_click("cancel", DEFAULT_TRIES);
        }
        self.surface.scroll(anchor, BACKUP_SCROLL_RESET);
    }

    fn tweet_backup(&mut self) {
        info!("requesting backup through social share");
        let anchor = self.anchor;
        self.surface.scroll(anchor, -BACKUP_SCROLL_RESET);
        self.find_and_click("request_backup", DEFAULT_TRIES);
        self.wait(POPUP_SETTLE);
        self.find_and_click("request_backup_tweet", DEFAULT_TRIES);
        self.find_and_click("ok", DEFAULT_TRIES);
        self.wait(POPUP_SETTLE);

        if self.confirm("request_backup_tweet_success", CONFIRM_TRIES) {
            info!("backup shared");
            self.find_and_click("ok", DEFAULT_TRIES);
        } else {
            self.recover(Recoverable::BackupOnCooldown);
            self.find_and_click("cancel", DEFAULT_TRIES);
        }
        self.surface.scroll(anchor, BACKUP_SCROLL_RESET);
    }

    // ── Manual primitives ────────────────────────────────────

    fn manual(&mut self, action: ManualAction) {
        match action {
            ManualAction::Attack => {
                if self.find_and_click("attack", ATTACK_TRIES) {
                    self.settle_after_submit();
                    self.finish_turn();
                }
            }
            ManualAction::AttackAndBack => {
                if self.find_and_click("attack", DEFAULT_TRIES) {
                    self.settle_after_submit();
                    self.find_and_click("home_back", DEFAULT_TRIES);
                    self.wait_for_attack();
                    self.finish_turn();
                }
            }
            ManualAction::Back => {
                if self.find_and_click("home_back", 1) {
                    info!("skipping animation");
                    self.wait_for_attack();
                    self.finish_turn();
                }
            }
            ManualAction::Reload => {
                if self.find_and_click("attack", DEFAULT_TRIES) {
                    // Reload whether or not the indicator cleared.
                    self.surface.wait_vanish("combat_cancel", CANCEL_VANISH_TIMEOUT);
                    self.reload(ReloadReason::Script);
                    self.resync_anchor();
                    self.finish_turn();
                }
            }
        }
    }
}

//! Line-oriented combat script parser.
//!
//! Lines are lower-cased and trimmed, comments (`#` and `//`, whole-line or
//! trailing) are dropped, and each remaining line becomes one [`Command`].
//! A malformed turn marker is the only fatal error; every other problem is
//! recorded as a [`ParseWarning`] and the offending line or token is skipped.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::command::{AutoKind, Command, HealingItem, ManualAction, SkillOp, TrailingOp};
use crate::error::ScriptError;

/// Duration used when a `wait(..)` argument cannot be read.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(1);

const COMMENT_MARKERS: [&str; 2] = ["#", "//"];

/// A parsed combat script.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Script {
    /// Commands in script order.
    pub commands: Vec<Command>,
    /// Non-fatal problems found while parsing.
    pub warnings: Vec<ParseWarning>,
}

impl Script {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// A skipped line or token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    /// One-based line number in the source.
    pub line: usize,
    /// The normalized text that was skipped.
    pub text: String,
    pub reason: String,
}

/// Parse script lines into a command stream.
///
/// # Errors
///
/// Returns `ScriptError::InvalidTurn` if a `turn N:` marker does not carry a
/// positive integer. No other input aborts parsing.
///
/// # Examples
///
/// ```
/// use autobattle_script::{Command, SkillOp, parse};
///
/// let script = parse(["Turn 1:", "  character1.useskill(1)  # opener", "end"]).unwrap();
/// assert_eq!(
///     script.commands,
///     vec![
///         Command::Turn(1),
///         Command::Character { slot: 1, ops: vec![SkillOp::UseSkill(1)] },
///         Command::EndTurn,
///     ]
/// );
/// ```
pub fn parse<I, S>(lines: I) -> Result<Script, ScriptError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut script = Script::default();

    for (index, raw) in lines.into_iter().enumerate() {
        let mut line = LineParser {
            line: index + 1,
            warnings: &mut script.warnings,
        };
        let Some(text) = normalize(raw.as_ref()) else {
            continue;
        };
        if let Some(command) = line.parse(&text)? {
            debug!(line = line.line, command = %command, "parsed command");
            script.commands.push(command);
        }
    }

    Ok(script)
}

/// Read a script file into lines, ready for [`parse`].
///
/// # Errors
///
/// Returns `ScriptError::Io` if the file cannot be read.
pub fn read_script_file(path: &Path) -> Result<Vec<String>, ScriptError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().map(str::to_owned).collect())
}

/// Strip comments, lower-case, and drop all whitespace.
///
/// Returns `None` for lines with nothing left.
fn normalize(raw: &str) -> Option<String> {
    let cut = COMMENT_MARKERS
        .iter()
        .filter_map(|marker| raw.find(marker))
        .min()
        .unwrap_or(raw.len());
    let text: String = raw[..cut]
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    (!text.is_empty()).then_some(text)
}

struct LineParser<'a> {
    line: usize,
    warnings: &'a mut Vec<ParseWarning>,
}

impl LineParser<'_> {
    fn parse(&mut self, text: &str) -> Result<Option<Command>, ScriptError> {
        if let Some(rest) = text.strip_prefix("turn") {
            return self.parse_turn(text, rest).map(Some);
        }

        let command = match text {
            "end" => Some(Command::EndTurn),
            "exit" => Some(Command::Exit),
            "enablesemiauto" => Some(Command::EnableAuto(AutoKind::Semi)),
            "enablefullauto" => Some(Command::EnableAuto(AutoKind::Full)),
            "requestbackup" => Some(Command::RequestBackup { via_social: false }),
            "tweetbackup" => Some(Command::RequestBackup { via_social: true }),
            "attack" => Some(Command::Manual(ManualAction::Attack)),
            "attackback" => Some(Command::Manual(ManualAction::AttackAndBack)),
            "back" => Some(Command::Manual(ManualAction::Back)),
            "reload" => Some(Command::Manual(ManualAction::Reload)),
            "repeatmanualattackandreload" => Some(Command::RepeatAttackAndReload),
            _ => self.parse_chain(text),
        };
        Ok(command)
    }

    fn parse_turn(&mut self, text: &str, rest: &str) -> Result<Command, ScriptError> {
        let number = rest.split(':').next().unwrap_or_default();
        match number.parse::<u32>() {
            Ok(n) if n > 0 => Ok(Command::Turn(n)),
            _ => Err(ScriptError::InvalidTurn {
                line: self.line,
                text: text.to_owned(),
            }),
        }
    }

    fn parse_chain(&mut self, text: &str) -> Option<Command> {
        let tokens = split_chain(text);
        let (head, rest) = tokens.split_first()?;

        if let Some(slot) = head.strip_prefix("character") {
            let Some(slot) = parse_index(slot, 4) else {
                self.warn(text, "character slot must be 1-4");
                return None;
            };
            let ops = rest.iter().filter_map(|t| self.skill_op(t)).collect();
            return Some(Command::Character { slot, ops });
        }

        if let Some(arg) = call_arg(head, "summon") {
            let Some(slot) = parse_index(arg, 6) else {
                self.warn(text, "summon slot must be 1-6");
                return None;
            };
            let then = rest.iter().filter_map(|t| self.trailing_op(t)).collect();
            return Some(Command::Summon { slot, then });
        }

        if *head == "quicksummon" {
            let then = rest.iter().filter_map(|t| self.trailing_op(t)).collect();
            return Some(Command::QuickSummon { then });
        }

        if let Some(item) = HealingItem::from_keyword(head) {
            return self.item(text, item, rest);
        }

        if let Some(arg) = call_arg(head, "targetenemy") {
            if !rest.is_empty() {
                self.warn(text, "targetenemy takes no sub-commands");
            }
            return match parse_index(arg, 3) {
                Some(n) => Some(Command::TargetEnemy(n)),
                None => {
                    self.warn(text, "enemy target must be 1-3");
                    None
                }
            };
        }

        if let Some(arg) = call_arg(head, "wait")
            && rest.is_empty()
        {
            return Some(Command::Wait(self.wait_arg(head, arg)));
        }

        self.warn(text, "unrecognized command");
        None
    }

    fn item(&mut self, text: &str, item: HealingItem, rest: &[&str]) -> Option<Command> {
        if !item.requires_target() {
            for token in rest {
                self.warn(token, "item takes no sub-commands");
            }
            return Some(Command::Item { item, target: None });
        }

        let target = rest
            .first()
            .and_then(|t| call_arg(t, "target"))
            .and_then(|arg| parse_index(arg, 4));
        match target {
            Some(t) => {
                for token in &rest[1..] {
                    self.warn(token, "item takes no further sub-commands");
                }
                Some(Command::Item {
                    item,
                    target: Some(t),
                })
            }
            None => {
                self.warn(text, "item requires .target(1-4)");
                None
            }
        }
    }

    fn skill_op(&mut self, token: &str) -> Option<SkillOp> {
        if token == "attack" {
            return Some(SkillOp::Attack);
        }
        if let Some(arg) = call_arg(token, "useskill") {
            return match parse_index(arg, 4) {
                Some(n) => Some(SkillOp::UseSkill(n)),
                None => {
                    self.warn(token, "skill index must be 1-4");
                    None
                }
            };
        }
        if let Some(arg) = call_arg(token, "target") {
            return match parse_index(arg, 6) {
                Some(n) => Some(SkillOp::Target(n)),
                None => {
                    self.warn(token, "skill target must be 1-6");
                    None
                }
            };
        }
        if let Some(arg) = call_arg(token, "wait") {
            return Some(SkillOp::Wait(self.wait_arg(token, arg)));
        }
        self.warn(token, "unknown sub-command");
        None
    }

    fn trailing_op(&mut self, token: &str) -> Option<TrailingOp> {
        if token == "attack" {
            return Some(TrailingOp::Attack);
        }
        if let Some(arg) = call_arg(token, "wait") {
            return Some(TrailingOp::Wait(self.wait_arg(token, arg)));
        }
        self.warn(token, "only .wait(..) and .attack may follow a summon");
        None
    }

    fn wait_arg(&mut self, token: &str, arg: &str) -> Duration {
        match arg.parse::<f64>() {
            Ok(secs) if secs.is_finite() && secs >= 0.0 => Duration::from_secs_f64(secs),
            _ => {
                self.warn(token, "malformed wait duration, using 1 second");
                DEFAULT_WAIT
            }
        }
    }

    fn warn(&mut self, text: &str, reason: &str) {
        warn!(line = self.line, text, reason, "skipping script content");
        self.warnings.push(ParseWarning {
            line: self.line,
            text: text.to_owned(),
            reason: reason.to_owned(),
        });
    }
}

/// Split on `.` outside parentheses, so `wait(1.5)` stays one token.
fn split_chain(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                tokens.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    tokens.push(&text[start..]);
    tokens.retain(|t| !t.is_empty());
    tokens
}

/// `name(arg)` -> `arg`.
fn call_arg<'t>(token: &'t str, name: &str) -> Option<&'t str> {
    token
        .strip_prefix(name)?
        .strip_prefix('(')?
        .strip_suffix(')')
}

/// Parse a one-based index in `1..=max`.
fn parse_index(text: &str, max: u8) -> Option<u8> {
    text.parse::<u8>().ok().filter(|n| (1..=max).contains(n))
}

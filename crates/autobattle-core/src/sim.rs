//! A deterministic, simulated game surface.
//!
//! [`SimScreen`] implements every capability trait on top of a set of visible
//! element names, a virtual clock and a list of [`Rule`]s that show or hide
//! elements when something is clicked or when time passes. Scenarios are
//! plain YAML:
//!
//! ```yaml
//! visible: [attack]
//! rules:
//!   - onClick: attack
//!     show: [loot_collected]
//!   - afterSecs: 30
//!     hide: [attack]
//! ```
//!
//! Buttons and screens share one namespace: `find_button` and
//! `confirm_screen` both answer from the visible set.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::CombatError;
use crate::surface::{Clock, Input, Navigator, Point, Vision};

/// Where elements without an explicit position are found.
pub const DEFAULT_POSITION: Point = Point::new(640, 480);

/// Vertical gap between repeated matches returned by `find_all`.
const MATCH_SPACING: i32 = 60;

const VANISH_STEP: Duration = Duration::from_secs(1);

/// Initial screen state and the rules that evolve it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Elements visible at time zero.
    #[serde(default)]
    pub visible: Vec<String>,

    /// Element positions. Unlisted elements sit at [`DEFAULT_POSITION`].
    #[serde(default)]
    pub positions: BTreeMap<String, Point>,

    /// How many matches `find_all` reports for a visible element (default 1).
    #[serde(default)]
    pub matches: BTreeMap<String, usize>,

    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Show or hide elements when a trigger fires.
///
/// Exactly one trigger is set: `on_click` (optionally on the `nth` click of
/// that label) or `after_secs` on the virtual clock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_click: Option<String>,

    /// Fire on this click count of `on_click`, one-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_secs: Option<f64>,

    /// Fire on every matching click instead of once.
    #[serde(default)]
    pub repeat: bool,

    #[serde(default)]
    pub show: Vec<String>,

    #[serde(default)]
    pub hide: Vec<String>,
}

impl Scenario {
    /// Parse and validate a YAML scenario.
    ///
    /// # Errors
    ///
    /// Returns `CombatError::Yaml` for malformed YAML and
    /// `CombatError::InvalidScenario` for a rule without exactly one trigger.
    pub fn from_yaml(yaml: &str) -> Result<Self, CombatError> {
        let scenario: Scenario = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<(), CombatError> {
        for (index, rule) in self.rules.iter().enumerate() {
            match (&rule.on_click, rule.after_secs) {
                (Some(_), None) => {}
                (None, Some(secs)) if secs.is_finite() && secs >= 0.0 => {}
                (None, Some(_)) => {
                    return Err(CombatError::InvalidScenario(format!(
                        "rule {index}: afterSecs must be a non-negative number"
                    )));
                }
                _ => {
                    return Err(CombatError::InvalidScenario(format!(
                        "rule {index}: set exactly one of onClick or afterSecs"
                    )));
                }
            }
            if rule.nth == Some(0) {
                return Err(CombatError::InvalidScenario(format!(
                    "rule {index}: nth is one-based"
                )));
            }
        }
        Ok(())
    }
}

/// Load a scenario file.
///
/// # Errors
///
/// Returns `CombatError::Io` if the file cannot be read, otherwise the errors
/// of [`Scenario::from_yaml`].
pub fn load_scenario(path: &Path) -> Result<Scenario, CombatError> {
    let content = std::fs::read_to_string(path)?;
    Scenario::from_yaml(&content)
}

/// An input the simulated surface received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "action")]
pub enum SimAction {
    Click { label: String, at: Point },
    DoubleClick { label: String, at: Point },
    Scroll { at: Point, amount: i32 },
    Home,
}

/// Simulated game surface.
#[derive(Debug, Clone)]
pub struct SimScreen {
    visible: BTreeSet<String>,
    positions: BTreeMap<String, Point>,
    matches: BTreeMap<String, usize>,
    rules: Vec<Rule>,
    fired: Vec<bool>,
    clicks: HashMap<String, u32>,
    now: Duration,
    actions: Vec<SimAction>,
}

impl SimScreen {
    pub fn new(scenario: Scenario) -> Self {
        let fired = vec![false; scenario.rules.len()];
        let mut screen = Self {
            visible: scenario.visible.into_iter().collect(),
            positions: scenario.positions,
            matches: scenario.matches,
            rules: scenario.rules,
            fired,
            clicks: HashMap::new(),
            now: Duration::ZERO,
            actions: Vec::new(),
        };
        screen.fire_elapsed();
        screen
    }

    /// Build a screen from a YAML scenario.
    ///
    /// # Errors
    ///
    /// See [`Scenario::from_yaml`].
    pub fn from_yaml(yaml: &str) -> Result<Self, CombatError> {
        Ok(Self::new(Scenario::from_yaml(yaml)?))
    }

    pub fn is_visible(&self, name: &str) -> bool {
        self.visible.contains(name)
    }

    pub fn hide(&mut self, name: &str) {
        self.visible.remove(name);
    }

    pub fn actions(&self) -> &[SimAction] {
        &self.actions
    }

    /// Labels of every click and double click, in order.
    pub fn clicked_labels(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter_map(|action| match action {
                SimAction::Click { label, .. } | SimAction::DoubleClick { label, .. } => {
                    Some(label.as_str())
                }
                _ => None,
            })
            .collect()
    }

    /// How many times `label` was clicked.
    pub fn click_count(&self, label: &str) -> u32 {
        self.clicks.get(label).copied().unwrap_or(0)
    }

    pub fn went_home(&self) -> bool {
        self.actions.contains(&SimAction::Home)
    }

    fn position(&self, name: &str) -> Point {
        self.positions.get(name).copied().unwrap_or(DEFAULT_POSITION)
    }

    fn apply(&mut self, index: usize) {
        let rule = &self.rules[index];
        trace!(rule = index, show = ?rule.show, hide = ?rule.hide, "sim rule fired");
        for name in &rule.hide {
            self.visible.remove(name);
        }
        for name in &rule.show {
            self.visible.insert(name.clone());
        }
        self.fired[index] = true;
    }

    fn fire_elapsed(&mut self) {
        let now = self.now.as_secs_f64();
        for index in 0..self.rules.len() {
            let due = !self.fired[index]
                && self.rules[index]
                    .after_secs
                    .is_some_and(|secs| now >= secs);
            if due {
                self.apply(index);
            }
        }
    }

    fn fire_click(&mut self, label: &str) {
        let count = {
            let count = self.clicks.entry(label.to_owned()).or_insert(0);
            *count += 1;
            *count
        };
        for index in 0..self.rules.len() {
            let rule = &self.rules[index];
            if rule.on_click.as_deref() != Some(label) {
                continue;
            }
            let due = match (rule.nth, rule.repeat) {
                (Some(nth), false) => count == nth,
                (Some(nth), true) => count >= nth,
                (None, false) => !self.fired[index],
                (None, true) => true,
            };
            if due {
                self.apply(index);
            }
        }
    }

    fn advance(&mut self, duration: Duration) {
        self.now += duration;
        self.fire_elapsed();
    }
}

impl Vision for SimScreen {
    fn find_button(&mut self, name: &str) -> Option<Point> {
        self.fire_elapsed();
        self.is_visible(name).then(|| self.position(name))
    }

    fn confirm_screen(&mut self, name: &str) -> bool {
        self.fire_elapsed();
        self.is_visible(name)
    }

    fn wait_vanish(&mut self, name: &str, timeout: Duration) -> bool {
        let deadline = self.now + timeout;
        loop {
            self.fire_elapsed();
            if !self.is_visible(name) {
                return true;
            }
            if self.now >= deadline {
                return false;
            }
            let step = VANISH_STEP.min(deadline - self.now);
            self.advance(step);
        }
    }

    fn find_all(&mut self, name: &str) -> Vec<Point> {
        self.fire_elapsed();
        if !self.is_visible(name) {
            return Vec::new();
        }
        let origin = self.position(name);
        let count = self.matches.get(name).copied().unwrap_or(1);
        (0..count)
            .map(|i| {
                let step = i32::try_from(i).unwrap_or(i32::MAX).saturating_mul(MATCH_SPACING);
                Point::new(origin.x, origin.y.saturating_add(step))
            })
            .collect()
    }
}

impl Input for SimScreen {
    fn click(&mut self, at: Point, label: &str) {
        self.actions.push(SimAction::Click {
            label: label.to_owned(),
            at,
        });
        self.fire_click(label);
    }

    fn double_click(&mut self, at: Point, label: &str) {
        self.actions.push(SimAction::DoubleClick {
            label: label.to_owned(),
            at,
        });
        self.fire_click(label);
    }

    fn scroll(&mut self, at: Point, amount: i32) {
        self.actions.push(SimAction::Scroll { at, amount });
    }
}

impl Navigator for SimScreen {
    fn go_back_home(&mut self) {
        self.actions.push(SimAction::Home);
        self.visible.clear();
        self.visible.insert("home".to_owned());
    }
}

impl Clock for SimScreen {
    fn now(&self) -> Duration {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_fire_click_rule_once_by_default() {
        let mut screen = SimScreen::from_yaml(
            "visible: [attack]\nrules:\n  - onClick: attack\n    show: [combat_cancel]\n    hide: [attack]\n",
        )
        .expect("should build screen");

        let at = screen.find_button("attack").expect("attack should be visible");
        screen.click(at, "attack");
        assert!(screen.is_visible("combat_cancel"));
        assert!(!screen.is_visible("attack"));

        screen.hide("combat_cancel");
        screen.click(at, "attack");
        assert!(!screen.is_visible("combat_cancel"));
        assert_eq!(screen.click_count("attack"), 2);
    }

    #[test]
    fn test_should_fire_on_nth_click() {
        let mut screen = SimScreen::from_yaml(
            "rules:\n  - onClick: attack\n    nth: 3\n    show: [exp_gained]\n",
        )
        .expect("should build screen");

        for _ in 0..2 {
            screen.click(DEFAULT_POSITION, "attack");
        }
        assert!(!screen.confirm_screen("exp_gained"));
        screen.click(DEFAULT_POSITION, "attack");
        assert!(screen.confirm_screen("exp_gained"));
    }

    #[test]
    fn test_should_fire_elapsed_rules_as_clock_advances() {
        let mut screen = SimScreen::from_yaml(
            "visible: [combat_cancel]\nrules:\n  - afterSecs: 3\n    hide: [combat_cancel]\n",
        )
        .expect("should build screen");

        assert!(!screen.wait_vanish("combat_cancel", Duration::from_secs(2)));
        assert_eq!(screen.now(), Duration::from_secs(2));
        assert!(screen.wait_vanish("combat_cancel", Duration::from_secs(5)));
        assert_eq!(screen.now(), Duration::from_secs(3));
    }

    #[test]
    fn test_should_report_repeated_matches() {
        let mut screen = SimScreen::from_yaml(
            "visible: [usebluepotion]\npositions:\n  usebluepotion: { x: 100, y: 200 }\nmatches:\n  usebluepotion: 2\n",
        )
        .expect("should build screen");

        assert_eq!(
            screen.find_all("usebluepotion"),
            vec![Point::new(100, 200), Point::new(100, 260)]
        );
        assert!(screen.find_all("missing").is_empty());
    }

    #[test]
    fn test_should_clear_screen_when_going_home() {
        let mut screen = SimScreen::from_yaml("visible: [attack, party_wipe_indicator]\n")
            .expect("should build screen");
        screen.go_back_home();
        assert!(screen.went_home());
        assert!(screen.is_visible("home"));
        assert!(!screen.is_visible("attack"));
    }

    #[test]
    fn test_should_reject_rule_without_trigger() {
        let err = Scenario::from_yaml("rules:\n  - show: [attack]\n").expect_err("should fail");
        assert!(matches!(err, CombatError::InvalidScenario(_)));

        let err = Scenario::from_yaml("rules:\n  - onClick: a\n    afterSecs: 1\n")
            .expect_err("should fail");
        assert!(matches!(err, CombatError::InvalidScenario(_)));
    }

    #[test]
    fn test_should_load_scenario_from_tempfile() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let path = dir.path().join("scenario.yaml");
        std::fs::write(&path, "visible: [attack]\n").expect("should write scenario");

        let scenario = load_scenario(&path).expect("should load scenario");
        assert_eq!(scenario.visible, vec!["attack".to_owned()]);
    }
}

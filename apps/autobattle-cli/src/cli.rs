use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use autobattle_core::{
    CombatEngine, CombatReport, CombatSettings, SimScreen, load_scenario, load_script_file,
    load_settings,
};
use autobattle_script::{Script, parse};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "autobattle", about = "Scripted combat for turn-based browser games")]
pub struct Cli {
    /// Also write JSON logs under `<dir>/logs/`
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Parse a combat script and print the command stream
    Check {
        /// Path to the combat script
        script: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run a combat script against a simulated battle
    Simulate {
        /// Path to the combat script (defaults to the script in the settings)
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// YAML scenario describing the simulated screen
        #[arg(long)]
        scenario: PathBuf,

        /// YAML combat settings
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Use the nightmare script from the settings
        #[arg(long)]
        nightmare: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Check { script, json } => check(&script, json),
            Commands::Simulate {
                script,
                scenario,
                settings,
                nightmare,
                json,
            } => simulate(
                script.as_deref(),
                &scenario,
                settings.as_deref(),
                nightmare,
                json,
            ),
        }
    }
}

fn check(path: &Path, json: bool) -> Result<()> {
    let lines = load_script_file(path)
        .with_context(|| format!("failed to read script: {}", path.display()))?;
    let script =
        parse(&lines).with_context(|| format!("failed to parse script: {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&script)?);
    } else {
        print!("{}", render_script(&script));
    }
    Ok(())
}

fn simulate(
    script: Option<&Path>,
    scenario: &Path,
    settings: Option<&Path>,
    nightmare: bool,
    json: bool,
) -> Result<()> {
    let settings = match settings {
        Some(path) => load_settings(path)
            .with_context(|| format!("failed to load settings: {}", path.display()))?,
        None => CombatSettings::default(),
    };
    let lines = match script {
        Some(path) => load_script_file(path)
            .with_context(|| format!("failed to read script: {}", path.display()))?,
        None if nightmare => settings.nightmare_script.clone(),
        None => settings.combat_script.clone(),
    };
    if lines.is_empty() {
        bail!("no combat script given and none configured in the settings");
    }

    let scenario = load_scenario(scenario)
        .with_context(|| format!("failed to load scenario: {}", scenario.display()))?;
    let mut engine = CombatEngine::new(SimScreen::new(scenario), settings);

    info!(lines = lines.len(), "simulating combat");
    let report = engine.run(&lines).context("combat did not start")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

fn render_script(script: &Script) -> String {
    let mut out = String::new();
    for command in &script.commands {
        out.push_str(&format!("{command}\n"));
    }
    for warning in &script.warnings {
        out.push_str(&format!(
            "warning: line {}: {} ({})\n",
            warning.line, warning.text, warning.reason
        ));
    }
    out
}

fn render_report(report: &CombatReport) -> String {
    let verdict = if report.is_success() { "success" } else { "failure" };
    let mut out = format!(
        "outcome: {} ({verdict})\nturns completed: {}\ncommands dispatched: {}\nauto mode: {:?}\nelapsed: {:.1}s\n",
        report.outcome,
        report.turns_completed,
        report.commands_dispatched,
        report.auto_mode,
        report.elapsed.as_secs_f64(),
    );
    for condition in report.recovered() {
        out.push_str(&format!("recovered: {condition:?}\n"));
    }
    for warning in &report.warnings {
        out.push_str(&format!(
            "warning: line {}: {} ({})\n",
            warning.line, warning.text, warning.reason
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_should_parse_simulate_arguments() {
        let cli = Cli::try_parse_from([
            "autobattle",
            "simulate",
            "--scenario",
            "battle.yaml",
            "--nightmare",
            "--log-dir",
            "/tmp/autobattle",
        ])
        .expect("should parse arguments");

        assert_eq!(cli.log_dir(), Some(Path::new("/tmp/autobattle")));
        match cli.command {
            Commands::Simulate {
                script,
                scenario,
                nightmare,
                json,
                ..
            } => {
                assert!(script.is_none());
                assert_eq!(scenario, PathBuf::from("battle.yaml"));
                assert!(nightmare);
                assert!(!json);
            }
            Commands::Check { .. } => panic!("expected simulate"),
        }
    }

    #[test]
    fn test_should_render_commands_and_warnings() {
        let script = parse(["turn 1:", "Character1.useSkill(2)", "dance", "end"])
            .expect("should parse");

        let text = render_script(&script);
        assert!(text.starts_with("turn 1:\ncharacter1.useskill(2)\nend\n"));
        assert!(text.contains("warning: line 3: dance"));
    }

    #[test]
    fn test_should_simulate_files_end_to_end() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        let script = tmp.path().join("fight.txt");
        let scenario = tmp.path().join("scenario.yaml");
        fs::write(&script, "turn 1:\nend\n").expect("should write script");
        fs::write(
            &scenario,
            "visible: [attack]\nrules:\n  - onClick: attack\n    show: [loot_collected]\n",
        )
        .expect("should write scenario");

        simulate(Some(&script), &scenario, None, false, true).expect("should simulate");
    }

    #[test]
    fn test_should_refuse_to_simulate_without_script() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        let scenario = tmp.path().join("scenario.yaml");
        fs::write(&scenario, "visible: [attack]\n").expect("should write scenario");

        let result = simulate(None, &scenario, None, false, false);
        assert!(result.is_err());
    }
}

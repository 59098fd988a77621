//! Integration tests for basic CLI behavior.
//!
//! Tests that the binary exists, accepts standard flags, each subcommand
//! responds to `--help`, and the offline subcommands produce output.

#![allow(deprecated)] // cargo_bin is deprecated, its replacement is not yet stable

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

/// Helper: get a Command for the `scenecast` binary.
fn scenecast() -> Command {
    Command::cargo_bin("scenecast").expect("binary 'scenecast' should be built")
}

/// Temp dir with a config pointing every path inside it
fn sandbox() -> (PathBuf, PathBuf) {
    let dir = std::env::temp_dir().join(format!("scenecast-cli-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let config = dir.join("config.toml");
    std::fs::write(
        &config,
        format!(
            "[paths]\nwork_dir = \"{0}/work\"\noutput_dir = \"{0}\"\nquota_dir = \"{0}/quota\"\n\n\
             [narration]\nmonthly_char_limit = 500\n",
            dir.display()
        ),
    )
    .unwrap();
    (dir, config)
}

// ─── Top-level flags ─────────────────────────────────────────────────────────

#[test]
fn help_flag_shows_usage() {
    scenecast()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: scenecast"))
        .stdout(predicate::str::contains("render"))
        .stdout(predicate::str::contains("quota"))
        .stdout(predicate::str::contains("mood"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn version_flag_shows_semver() {
    scenecast()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^scenecast \d+\.\d+\.\d+\n$").unwrap());
}

#[test]
fn no_args_shows_error_and_usage() {
    scenecast()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage: scenecast"));
}

#[test]
fn invalid_subcommand_fails() {
    scenecast()
        .arg("this-is-not-a-real-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

// ─── Subcommand help ─────────────────────────────────────────────────────────

#[test]
fn render_help() {
    scenecast()
        .args(["render", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--no-premium"))
        .stdout(predicate::str::contains("--breaking"))
        .stdout(predicate::str::contains("--work-dir"))
        .stdout(predicate::str::contains("--json"));
}

#[test]
fn quota_help() {
    scenecast()
        .args(["quota", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--provider"));
}

#[test]
fn mood_help() {
    scenecast()
        .args(["mood", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--plan"));
}

#[test]
fn render_requires_plan_argument() {
    scenecast()
        .arg("render")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<PLAN>"));
}

// ─── Offline behaviour ───────────────────────────────────────────────────────

#[test]
fn mood_classifies_dramatic_headline() {
    scenecast()
        .args(["mood", "Shocking record falls", "An incredible first for the city"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Mood: dramatic"));
}

#[test]
fn mood_without_keywords_is_neutral() {
    scenecast()
        .args(["mood", "Council meets on Tuesday"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Mood: neutral (score 0)"));
}

#[test]
fn quota_reports_fresh_budget() {
    let (dir, config) = sandbox();
    scenecast()
        .arg("--config")
        .arg(&config)
        .args(["quota", "--provider", "tts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tts"))
        .stdout(predicate::str::contains("0/500 chars"));
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn quota_json_lists_both_providers() {
    let (dir, config) = sandbox();
    scenecast()
        .arg("--config")
        .arg(&config)
        .args(["quota", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"provider\": \"tts\""))
        .stdout(predicate::str::contains("\"provider\": \"premium-video\""));
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn quota_unknown_provider_fails() {
    let (dir, config) = sandbox();
    scenecast()
        .arg("--config")
        .arg(&config)
        .args(["quota", "--provider", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown provider"));
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn render_missing_plan_fails() {
    let (dir, config) = sandbox();
    scenecast()
        .arg("--config")
        .arg(&config)
        .args(["render", "/definitely/not/here/plan.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load plan"));
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn render_rejects_plan_without_scenes() {
    let (dir, config) = sandbox();
    let plan = dir.join("plan.json");
    std::fs::write(&plan, r#"{"headline": "Empty", "scenes": []}"#).unwrap();
    scenecast()
        .arg("--config")
        .arg(&config)
        .arg("render")
        .arg(&plan)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load plan"));
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn explicit_missing_config_fails() {
    scenecast()
        .args(["--config", "/definitely/not/here.toml", "quota"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

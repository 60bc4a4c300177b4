//! Integration tests for the `skillrunner` CLI.
//!
//! These exercise the thin demo binary end to end. The engine itself
//! only cares about `(skill, input, profile, options)`; CLI command
//! wiring is a separate, much smaller surface still worth driving
//! through a real process. No provider credentials are configured in
//! these tests, so `run` exercises config loading, skill parsing and
//! routing failure paths rather than live provider calls.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn skillrunner() -> Command {
    Command::cargo_bin("skillrunner").unwrap()
}

fn temp_project() -> TempDir {
    TempDir::new().unwrap()
}

fn write_skill(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

const ONE_PHASE_SKILL: &str = r#"
id = "summarize"
name = "Summarize"
description = "Summarize the input"
version = "0.1.0"

[[phases]]
id = "draft"
name = "Draft"
prompt_template = "Summarize: {{_input}}"
max_tokens = 256
"#;

mod cli_basics {
    use super::*;

    #[test]
    fn help_succeeds() {
        skillrunner().arg("--help").assert().success();
    }

    #[test]
    fn version_succeeds() {
        skillrunner().arg("--version").assert().success();
    }

    #[test]
    fn unknown_subcommand_fails() {
        skillrunner().arg("not-a-real-command").assert().failure();
    }
}

mod config_command {
    use super::*;

    #[test]
    fn init_writes_a_default_toml() {
        let dir = temp_project();
        skillrunner()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("skillrunner.toml"));

        let path = dir.path().join("skillrunner.toml");
        assert!(path.exists());
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("profile"));
    }

    #[test]
    fn init_refuses_to_overwrite_an_existing_file() {
        let dir = temp_project();
        skillrunner().current_dir(dir.path()).args(["config", "init"]).assert().success();
        skillrunner().current_dir(dir.path()).args(["config", "init"]).assert().failure();
    }

    #[test]
    fn show_prints_defaults_with_no_file_present() {
        let dir = temp_project();
        skillrunner()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("balanced"));
    }

    #[test]
    fn show_reflects_a_profile_override() {
        let dir = temp_project();
        std::fs::write(
            dir.path().join("skillrunner.toml"),
            "[defaults]\nprofile = \"premium\"\n",
        )
        .unwrap();
        skillrunner()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("premium"));
    }
}

mod abandon_stale {
    use super::*;

    #[test]
    fn reports_zero_when_no_checkpoints_exist() {
        let dir = temp_project();
        skillrunner()
            .current_dir(dir.path())
            .arg("abandon-stale")
            .assert()
            .success()
            .stdout(predicate::str::contains("abandoned 0"));
    }
}

mod run_command {
    use super::*;

    #[test]
    fn missing_skill_file_is_a_clean_error_not_a_panic() {
        let dir = temp_project();
        skillrunner()
            .current_dir(dir.path())
            .args(["run", "--skill", "does-not-exist.toml", "--input", "hello"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("does-not-exist.toml"));
    }

    #[test]
    fn unknown_profile_fails_validation_before_any_provider_call() {
        let dir = temp_project();
        let skill = write_skill(&dir, "summarize.toml", ONE_PHASE_SKILL);
        skillrunner()
            .current_dir(dir.path())
            .args(["run", "--skill", skill.to_str().unwrap(), "--input", "hello", "--profile", "extravagant"])
            .assert()
            .failure();
    }

    #[test]
    fn no_configured_provider_fails_rather_than_hangs() {
        // No [providers.*] section and no *_API_KEY in the environment,
        // so routing resolution should fail fast instead of attempting a
        // network call.
        let dir = temp_project();
        let skill = write_skill(&dir, "summarize.toml", ONE_PHASE_SKILL);
        skillrunner()
            .current_dir(dir.path())
            .env_remove("ANTHROPIC_API_KEY")
            .env_remove("OPENAI_API_KEY")
            .env_remove("GROQ_API_KEY")
            .args(["run", "--skill", skill.to_str().unwrap(), "--input", "hello"])
            .assert()
            .failure();
    }

    #[test]
    fn input_file_reference_that_does_not_exist_fails_cleanly() {
        let dir = temp_project();
        let skill = write_skill(&dir, "summarize.toml", ONE_PHASE_SKILL);
        skillrunner()
            .current_dir(dir.path())
            .args(["run", "--skill", skill.to_str().unwrap(), "--input", "@missing-input.txt"])
            .assert()
            .failure();
    }
}

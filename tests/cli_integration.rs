//! Integration tests for the hookwise binary.
//!
//! Every test runs with a temporary HOME and an explicit config file so the
//! developer's own token, state, and configuration are never read.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A hookwise command isolated inside `home`.
fn hookwise(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("hookwise").unwrap();
    cmd.env("HOME", home)
        .env("HOOKWISE_CONFIG", home.join("config.toml"))
        .env_remove("GITHUB_TOKEN")
        .env_remove("HOOKWISE_CALLBACK_URL")
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("HOOKWISE_LOG");
    cmd
}

fn write_config(home: &Path, body: &str) {
    std::fs::write(home.join("config.toml"), body).unwrap();
}

const ISSUE_CLOSED: &str = r#"{
    "action": "closed",
    "issue": {"number": 42},
    "repository": {"name": "hello", "owner": {"login": "octocat"}}
}"#;

#[test]
fn help_lists_commands() {
    let home = TempDir::new().unwrap();
    hookwise(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("subscribe"))
        .stdout(predicate::str::contains("deliver"));
}

#[test]
fn version_flag_works() {
    let home = TempDir::new().unwrap();
    hookwise(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("hookwise"));
}

mod deliver {
    use super::*;

    #[test]
    fn classifies_payload_from_stdin() {
        let home = TempDir::new().unwrap();
        hookwise(home.path())
            .arg("deliver")
            .write_stdin(ISSUE_CLOSED)
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""kind":"issueClosed""#))
            .stdout(predicate::str::contains(r#""number":42"#));
    }

    #[test]
    fn classifies_payload_from_file() {
        let home = TempDir::new().unwrap();
        let file = home.path().join("delivery.json");
        std::fs::write(&file, ISSUE_CLOSED).unwrap();

        hookwise(home.path())
            .arg("deliver")
            .arg("--file")
            .arg(&file)
            .assert()
            .success()
            .stdout(predicate::str::contains("octocat/hello"));
    }

    #[test]
    fn missing_repository_fails() {
        let home = TempDir::new().unwrap();
        hookwise(home.path())
            .arg("deliver")
            .write_stdin(r#"{"action": "opened", "issue": {"number": 1}}"#)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to classify delivery"));
    }

    #[test]
    fn unmatched_payload_prints_nothing() {
        let home = TempDir::new().unwrap();
        hookwise(home.path())
            .arg("deliver")
            .write_stdin(
                r#"{"action": "labeled", "issue": {"number": 1},
                    "repository": {"name": "hello", "owner": {"login": "octocat"}}}"#,
            )
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }
}

mod subscriptions {
    use super::*;

    #[test]
    fn subscribe_without_callback_fails_before_any_request() {
        let home = TempDir::new().unwrap();
        write_config(home.path(), "api_base = \"http://127.0.0.1:9\"\n");

        hookwise(home.path())
            .args(["subscribe", "octocat/hello", "issueClosed"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no callback URL configured"));
    }

    #[test]
    fn subscribe_in_polling_mode_is_refused() {
        let home = TempDir::new().unwrap();
        write_config(
            home.path(),
            "callback_url = \"https://hooks.example.com\"\nevent_source = \"polling\"\n",
        );

        hookwise(home.path())
            .args(["subscribe", "octocat/hello", "push"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("polling"));
    }

    #[test]
    fn invalid_repository_is_a_usage_error() {
        let home = TempDir::new().unwrap();
        hookwise(home.path())
            .args(["subscribe", "not-a-repo", "push"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid repository"));
    }

    #[test]
    fn status_with_no_state() {
        let home = TempDir::new().unwrap();
        write_config(
            home.path(),
            &format!(
                "state_path = \"{}\"\n",
                home.path().join("subscriptions.json").display()
            ),
        );

        hookwise(home.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("No subscriptions."));
    }

    #[test]
    fn orphaned_records_are_shown_until_forgotten() {
        let home = TempDir::new().unwrap();
        let state = home.path().join("subscriptions.json");
        std::fs::write(
            &state,
            r#"{
                "version": 1,
                "subscriptions": {},
                "orphaned": {
                    "octocat/old": [{"id": 5, "url": "https://old.example.com", "events": ["push"]}]
                }
            }"#,
        )
        .unwrap();
        write_config(
            home.path(),
            &format!(
                "callback_url = \"https://hooks.example.com\"\nstate_path = \"{}\"\n",
                state.display()
            ),
        );

        hookwise(home.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("octocat/old  hook 5  push"))
            .stdout(predicate::str::contains("[orphaned: https://old.example.com]"));

        hookwise(home.path())
            .args(["status", "--json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""orphaned":true"#));

        hookwise(home.path())
            .args(["forget", "octocat/old"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Forgot webhook 5 on octocat/old"));

        hookwise(home.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("No subscriptions."));
    }
}

mod list {
    use super::*;

    #[test]
    fn comments_without_number_is_refused() {
        let home = TempDir::new().unwrap();
        write_config(home.path(), "api_base = \"http://127.0.0.1:9\"\n");

        hookwise(home.path())
            .args(["list", "comments", "--repo", "octocat/hello"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--number is required for comments"));
    }

    #[test]
    fn kind_outside_issues_is_refused() {
        let home = TempDir::new().unwrap();
        write_config(home.path(), "api_base = \"http://127.0.0.1:9\"\n");

        hookwise(home.path())
            .args(["list", "pulls", "--repo", "octocat/hello", "--kind", "pr"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--kind does not apply to pulls"));
    }
}

mod config {
    use super::*;

    #[test]
    fn path_reports_env_config() {
        let home = TempDir::new().unwrap();
        write_config(home.path(), "");

        hookwise(home.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let home = TempDir::new().unwrap();
        write_config(home.path(), "no_such_key = 1\n");

        hookwise(home.path())
            .args(["config", "show"])
            .assert()
            .failure();
    }

    #[test]
    fn show_includes_callback() {
        let home = TempDir::new().unwrap();
        write_config(home.path(), "callback_url = \"https://hooks.example.com/gh\"\n");

        hookwise(home.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("https://hooks.example.com/gh"));
    }
}

#[test]
fn completion_bash() {
    let home = TempDir::new().unwrap();
    hookwise(home.path())
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hookwise"));
}

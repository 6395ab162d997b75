//! Integration tests for CLI commands

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Helper to run strongbox command
fn strongbox(config: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_strongbox"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("STRONGBOX_CONFIG")
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to execute strongbox")
}

fn write_config(dir: &Path, remote_url: &str, extra_group_members: &str) -> PathBuf {
    let yaml = format!(
        r#"
id: cli
remoteRepositoriesConfiguration:
  probeTimeoutSeconds: 2
routingRules:
  denied:
    - groupRepository: "*"
      rules:
        - pattern: ".*\\.tmp$"
          repositories: [releases]
storages:
  - id: storage0
    basedir: data
    repositories:
      - id: releases
        type: hosted
      - id: central
        type: proxy
        remoteRepository:
          url: {remote_url}
      - id: public
        type: group
        groupRepositories: [releases, central{extra_group_members}]
"#
    );
    let path = dir.join("strongbox.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

fn put_file(dir: &Path, relative: &str) {
    let file = dir.join(relative);
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(file, relative.as_bytes()).unwrap();
}

/// A localhost URL nothing listens on
fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

fn fixture() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "https://repo.example.invalid/maven2", "");
    put_file(dir.path(), "data/releases/org/foo/1.0/foo-1.0.jar");
    put_file(dir.path(), "data/releases/org/foo/1.0/foo-1.0.tmp");
    put_file(dir.path(), "data/central/org/bar/2.0/bar-2.0.jar");
    (dir, config)
}

mod validate_command {
    use super::*;

    #[test]
    fn test_validate_valid_config() {
        let (_dir, config) = fixture();
        let output = strongbox(&config, &["validate"]);

        assert!(output.status.success(), "Expected success for valid config");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("Configuration valid"));
    }

    #[test]
    fn test_validate_cycle_exits_with_config_error() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "https://repo.example.invalid", ", public");
        let output = strongbox(&config, &["validate"]);

        assert_eq!(output.status.code(), Some(2));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("Cyclic group membership"));
    }

    #[test]
    fn test_validate_json_output() {
        let (_dir, config) = fixture();
        let output = strongbox(&config, &["validate", "--json"]);

        let stdout = String::from_utf8_lossy(&output.stdout);
        let json: serde_json::Value =
            serde_json::from_str(&stdout).expect("Output should be valid JSON");
        assert_eq!(json["valid"], true);
        assert_eq!(json["repositories"], 3);
    }

    #[test]
    fn test_missing_config_file() {
        let dir = TempDir::new().unwrap();
        let output = strongbox(&dir.path().join("absent.yaml"), &["validate"]);

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("Configuration not found"));
    }
}

mod resolve_command {
    use super::*;

    #[test]
    fn test_resolve_through_group() {
        let (_dir, config) = fixture();
        let output = strongbox(&config, &["resolve", "storage0", "public", "org/foo/1.0/foo-1.0.jar"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("1. storage0:releases"));
        assert!(stdout.contains("2. storage0:central"));
        assert!(stdout.contains("served by storage0:releases"));
    }

    #[test]
    fn test_denied_path_is_not_found() {
        let (_dir, config) = fixture();
        let output = strongbox(&config, &["resolve", "storage0", "public", "org/foo/1.0/foo-1.0.tmp"]);

        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn test_unknown_proxy_is_skipped() {
        let (_dir, config) = fixture();
        let output = strongbox(&config, &["resolve", "storage0", "public", "org/bar/2.0/bar-2.0.jar"]);

        // Never probed, so the proxy does not take part
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn test_resolve_json_output() {
        let (_dir, config) = fixture();
        let output = strongbox(
            &config,
            &["resolve", "storage0", "public", "org/foo/1.0/foo-1.0.jar", "--json"],
        );

        let stdout = String::from_utf8_lossy(&output.stdout);
        let json: serde_json::Value =
            serde_json::from_str(&stdout).expect("Output should be valid JSON");
        assert_eq!(json["resolved"]["repository"], "storage0:releases");
        assert_eq!(json["resolved"]["via"][0], "storage0:public");
    }

    #[test]
    fn test_resolve_explain() {
        let (_dir, config) = fixture();
        let output = strongbox(
            &config,
            &["resolve", "storage0", "public", "org/foo/1.0/foo-1.0.tmp", "--explain"],
        );

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("Member routing"));
        assert!(stdout.contains("denied"));
    }

    #[test]
    fn test_path_escaping_repository_is_rejected() {
        let (_dir, config) = fixture();
        let output = strongbox(&config, &["resolve", "storage0", "public", "../secret"]);

        assert_eq!(output.status.code(), Some(64));
    }
}

mod search_command {
    use super::*;

    #[test]
    fn test_search_hides_denied_paths() {
        let (_dir, config) = fixture();
        let output = strongbox(&config, &["search", "storage0", "public"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("org/foo/1.0/foo-1.0.jar"));
        assert!(!stdout.contains("foo-1.0.tmp"));
        assert!(!stdout.contains("bar-2.0.jar"));
    }

    #[test]
    fn test_search_count() {
        let (_dir, config) = fixture();
        let output = strongbox(&config, &["search", "storage0", "releases", "--count"]);

        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "2");
    }

    #[test]
    fn test_search_invalid_pattern() {
        let (_dir, config) = fixture();
        let output = strongbox(&config, &["search", "storage0", "releases", "--pattern", "(["]);

        assert_eq!(output.status.code(), Some(64));
    }
}

mod rules_command {
    use super::*;

    #[test]
    fn test_rules_listing() {
        let (_dir, config) = fixture();
        let output = strongbox(&config, &["rules"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("accepted:\n  (none)"));
        assert!(stdout.contains(".*\\.tmp$ -> releases"));
    }

    #[test]
    fn test_rules_for_group_fall_back_to_wildcard() {
        let (_dir, config) = fixture();
        let output = strongbox(&config, &["rules", "--group", "public"]);

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("  *:"));
    }
}

mod heartbeat_command {
    use super::*;

    #[test]
    fn test_heartbeat_once_reports_unreachable_remote() {
        let dir = TempDir::new().unwrap();
        let url = closed_port_url();
        let config = write_config(dir.path(), &url, "");
        let output = strongbox(&config, &["heartbeat", "--once"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("storage0:central"));
        assert!(stdout.contains("DOWN"));
        assert!(stdout.contains(&url));
    }
}

//! CLI integration tests for audit-pipeline.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for various error conditions.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the audit-pipeline binary.
fn cmd() -> Command {
    Command::cargo_bin("audit-pipeline").unwrap()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("seed"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_seed_subcommand_help() {
    cmd()
        .args(["seed", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--tenant"))
        .stdout(predicate::str::contains("--entity"))
        .stdout(predicate::str::contains("--start-date"))
        .stdout(predicate::str::contains("--end-date"))
        .stdout(predicate::str::contains("--keep-csv"))
        .stdout(predicate::str::contains("--audit-connection"));
}

#[test]
fn test_seed_help_lists_all_entity_kinds() {
    cmd()
        .args(["seed", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("user"))
        .stdout(predicate::str::contains("course"))
        .stdout(predicate::str::contains("tenant"))
        .stdout(predicate::str::contains("enrollment"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("audit-pipeline"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_config_default_path() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

// =============================================================================
// Argument Validation Tests
// =============================================================================

#[test]
fn test_unknown_entity_rejected_at_parse_time() {
    cmd()
        .args([
            "seed",
            "100",
            "--tenant",
            "00000000-0000-0000-0000-000000000000",
            "--entity",
            "invoice",
        ])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_migrate_requires_entity() {
    cmd()
        .arg("migrate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_seed_enrollment_requires_tenant_flag() {
    cmd()
        .args(["seed", "10", "--entity", "enrollment"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--tenant"));
}

#[test]
fn test_seed_user_requires_tenant_flag() {
    cmd()
        .args(["seed", "10", "--entity", "user"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--tenant"));
}

#[test]
fn test_seed_tenants_needs_no_tenant_flag() {
    // Parses fine without --tenant; the missing config file is what fails.
    cmd()
        .args([
            "--config",
            "nonexistent_config_file.yaml",
            "seed",
            "10",
            "--entity",
            "tenant",
        ])
        .assert()
        .code(1);
}

#[test]
fn test_seed_rejects_malformed_tenant_uuid() {
    cmd()
        .args(["seed", "100", "--tenant", "not-a-uuid"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_seed_rejects_malformed_date() {
    cmd()
        .args([
            "seed",
            "100",
            "--tenant",
            "00000000-0000-0000-0000-000000000000",
            "--start-date",
            "January 1st",
        ])
        .assert()
        .failure()
        .code(2);
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 1)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_1() {
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    // Valid YAML but missing the audit section
    writeln!(file, "operational:").unwrap();
    writeln!(file, "  host: localhost").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

// =============================================================================
// Subcommand Existence Tests
// =============================================================================

#[test]
fn test_health_check_command_exists() {
    cmd()
        .args(["health-check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test both database connections"));
}

#[test]
fn test_validate_command_exists() {
    cmd()
        .args(["validate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ordered ID checksums"));
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

use assert_cmd::Command;
use predicates::prelude::*;

fn bin() -> Command {
    Command::cargo_bin("tally-ingest").expect("binary built")
}

#[test]
fn help_lists_all_subcommands() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("backfill"))
        .stdout(predicate::str::contains("clear-and-reload"))
        .stdout(predicate::str::contains("sync-masters"))
        .stdout(predicate::str::contains("reconcile-bills"));
}

#[test]
fn missing_env_config_reports_which_var_is_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    bin()
        .current_dir(&dir)
        .env_clear()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("TALLY_URL must be set"));
}

#[test]
fn backfill_rejects_malformed_dates() {
    let dir = tempfile::tempdir().expect("tempdir");
    bin()
        .current_dir(&dir)
        .env_clear()
        .args(["backfill", "--from", "not-a-date", "--to", "2025-01-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid"));
}

#[test]
fn sync_masters_rejects_unknown_kind() {
    let dir = tempfile::tempdir().expect("tempdir");
    bin()
        .current_dir(&dir)
        .env_clear()
        .args(["sync-masters", "--kind", "not-a-kind"])
        .assert()
        .failure();
}

#[test]
fn sync_masters_from_file_and_from_source_are_mutually_exclusive() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("masters.xml");
    std::fs::write(&path, "<ENVELOPE></ENVELOPE>").expect("write fixture");
    bin()
        .current_dir(&dir)
        .env_clear()
        .args([
            "sync-masters",
            "--kind",
            "ledgers",
            "--from-file",
            path.to_str().expect("utf8 path"),
            "--from-source",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn sync_masters_from_file_does_not_require_tally_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("masters.xml");
    std::fs::write(&path, "<ENVELOPE><BODY></BODY></ENVELOPE>").expect("write fixture");
    bin()
        .current_dir(&dir)
        .env_clear()
        .args(["sync-masters", "--kind", "ledgers", "--from-file", path.to_str().expect("utf8 path")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("WAREHOUSE_URL must be set"));
}

#[test]
fn sync_masters_preview_from_file_does_not_require_warehouse_or_tally_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("masters.xml");
    std::fs::write(
        &path,
        r#"<ENVELOPE><BODY>
            <GROUP NAME="Sundry Debtors"><PARENT></PARENT></GROUP>
            <LEDGER NAME="Acme Distributors"><PARENT>Sundry Debtors</PARENT></LEDGER>
        </BODY></ENVELOPE>"#,
    )
    .expect("write fixture");
    bin()
        .current_dir(&dir)
        .env_clear()
        .args([
            "sync-masters",
            "--kind",
            "ledgers",
            "--from-file",
            path.to_str().expect("utf8 path"),
            "--preview",
            "1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("ledger_group: Sundry Debtors"))
        .stdout(predicate::str::contains("preview complete: 1 record(s) shown, nothing persisted"));
}

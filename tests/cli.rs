use assert_cmd::Command;
use predicates::boolean::PredicateBooleanExt;
use predicates::str::contains;

fn cmd() -> Command {
    Command::cargo_bin("kmaint").unwrap()
}

#[test]
fn help_lists_subcommands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("update"))
        .stdout(contains("build"))
        .stdout(contains("backup"))
        .stdout(contains("prune-sources"))
        .stdout(contains("prune-modules"));
}

#[test]
fn build_help_lists_flags() {
    cmd()
        .args(["build", "--help"])
        .assert()
        .success()
        .stdout(contains("--jobs"))
        .stdout(contains("--tmpfs"))
        .stdout(contains("--uki"))
        .stdout(contains("--sign"))
        .stdout(contains("--install"))
        .stdout(contains("--nvidia"));
}

#[test]
fn no_subcommand_is_a_usage_error() {
    cmd().assert().failure();
}

#[test]
fn unknown_subcommand_is_rejected() {
    cmd().arg("frobnicate").assert().failure();
}

#[test]
fn update_fails_for_unknown_host_workspace() {
    // Unprivileged: refused up front. As root: the named workspace does
    // not exist, so the command fails before touching anything.
    cmd()
        .args(["update", "--nocolor", "--hostname", "kmaint-test-no-such-host"])
        .assert()
        .failure()
        .stderr(contains("must be superuser").or(contains("does not exist")));
}

#[test]
fn prune_sources_fails_for_unknown_host_workspace() {
    cmd()
        .args([
            "prune-sources",
            "--nocolor",
            "--hostname",
            "kmaint-test-no-such-host",
        ])
        .assert()
        .failure()
        .stderr(contains("must be superuser").or(contains("does not exist")));
}

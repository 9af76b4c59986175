//! Git source provider round-trip against a real local repository

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::Command;

use parbuild::source::{GitSource, SourceProvider};
use parbuild::Reporter;

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-c")
        .arg("user.email=ci@example.com")
        .arg("-c")
        .arg("user.name=ci")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("git is available");
    assert!(status.success(), "git {args:?} failed");
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn init_remote() -> tempfile::TempDir {
    let remote = tempfile::tempdir().unwrap();
    git(remote.path(), &["init", "-q"]);
    fs::write(remote.path().join("README.md"), "first").unwrap();
    git(remote.path(), &["add", "."]);
    git(remote.path(), &["commit", "-q", "-m", "first"]);
    remote
}

#[test]
fn test_clone_then_detect_new_commit_then_reset() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }

    let remote = init_remote();
    let source = GitSource::new(
        "demo",
        remote.path().to_str().unwrap(),
        1,
        Reporter::discard(),
    );

    // First cycle clones and yields the checkout as-is.
    let checkout = source.next_working_copy().unwrap();
    assert!(checkout.join("README.md").exists());
    assert_eq!(
        fs::read_to_string(checkout.join("README.md")).unwrap(),
        "first"
    );
    source.end_cycle();

    // The remote moves; the second cycle's first poll already sees the
    // new commit and returns without waiting out an interval.
    fs::write(remote.path().join("README.md"), "second").unwrap();
    git(remote.path(), &["commit", "-q", "-am", "second"]);

    let checkout = source.next_working_copy().unwrap();
    assert_eq!(
        fs::read_to_string(checkout.join("README.md")).unwrap(),
        "second"
    );

    // Build-tool droppings are reverted at cycle end so the next pull
    // applies cleanly.
    fs::write(checkout.join("README.md"), "dirtied by build").unwrap();
    fs::write(checkout.join("Builds.log"), "junk").unwrap();
    source.end_cycle();
    assert_eq!(
        fs::read_to_string(checkout.join("README.md")).unwrap(),
        "second"
    );
    assert!(!checkout.join("Builds.log").exists());

    let temp_root = checkout.parent().unwrap().to_path_buf();
    source.close();
    assert!(!temp_root.exists());
}

#[test]
fn test_stop_interrupts_polling_wait() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }

    let remote = init_remote();
    let project = parbuild::Project {
        name: "demo".to_string(),
        source: parbuild::config::ProjectSource {
            kind: parbuild::SourceKind::Git,
            value: remote.path().to_string_lossy().into_owned(),
        },
        build: Default::default(),
        post_build: vec![],
    };
    let provider = std::sync::Arc::new(SourceProvider::for_project(
        &project,
        3600,
        Reporter::discard(),
    ));

    // First cycle clones; mark it complete so the next acquisition polls.
    provider.next_working_copy().unwrap();
    provider.end_cycle();

    let stopper = std::sync::Arc::clone(&provider);
    let handle = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(200));
        parbuild::Stoppable::stop(stopper.as_ref());
    });

    // No new commit will ever appear; only the stop request can end this.
    let started = std::time::Instant::now();
    let err = provider.next_working_copy().unwrap_err();
    handle.join().unwrap();

    assert!(err.is_interrupt());
    assert!(started.elapsed() < std::time::Duration::from_secs(30));
    provider.close();
}

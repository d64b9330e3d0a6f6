use assert_cmd::Command;
use predicates::prelude::*;
use std::error::Error;
use std::fs;
use tempfile::tempdir;

fn convert() -> Command {
    Command::cargo_bin("audiobook-convert").expect("binary exists")
}

fn assemble() -> Command {
    Command::cargo_bin("audiobook-assemble").expect("binary exists")
}

#[test]
fn help_exits_with_status_one() {
    convert()
        .arg("--help")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("--dryRun"));
    assemble()
        .arg("--help")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("--legacy-device"));
}

#[test]
fn version_exits_successfully() {
    convert()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    assemble().arg("--version").assert().success();
}

#[test]
fn missing_required_arguments_exit_with_status_one() {
    convert()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("inputDir"));
    convert().arg("only-input").assert().code(1);
    assemble().assert().code(1);
}

#[test]
fn dry_run_over_tree_without_audio_reports_summary() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let input = work.path().join("in");
    fs::create_dir_all(input.join("nested"))?;
    fs::write(input.join("nested").join("notes.txt"), "not audio")?;

    convert()
        .current_dir(work.path())
        .arg(&input)
        .arg(work.path().join("out"))
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("done!"))
        .stdout(predicate::str::contains("0 converted, 0 skipped, 0 failed"));

    assert!(!work.path().join("out").exists());
    Ok(())
}

#[test]
fn config_file_is_created_with_defaults() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let input = work.path().join("in");
    fs::create_dir_all(&input)?;
    let config = work.path().join("audiobook.toml");

    convert()
        .current_dir(work.path())
        .arg(&input)
        .arg(work.path().join("out"))
        .arg("--dryRun")
        .arg("--config")
        .arg(&config)
        .assert()
        .success();

    let content = fs::read_to_string(&config)?;
    assert!(content.contains("[batch]"));
    assert!(content.contains("[encode]"));
    assert!(work.path().join(".logs").is_dir());
    Ok(())
}

#[test]
fn missing_input_directory_fails() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    convert()
        .current_dir(work.path())
        .arg(work.path().join("does-not-exist"))
        .arg(work.path().join("out"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not found"));
    Ok(())
}

#[test]
fn invalid_encode_options_are_reported() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let track = work.path().join("01.mp3");
    fs::write(&track, b"ID3")?;

    assemble()
        .current_dir(work.path())
        .arg(&track)
        .args(["--bit-depth", "24"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("bit depth must be 16, 32 or 64"));
    Ok(())
}

#[test]
fn unreadable_cover_fails_before_assembly() -> Result<(), Box<dyn Error>> {
    let work = tempdir()?;
    let track = work.path().join("01.mp3");
    fs::write(&track, b"ID3")?;

    assemble()
        .current_dir(work.path())
        .arg(&track)
        .arg("--cover")
        .arg(work.path().join("missing.jpg"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to read cover"));
    Ok(())
}

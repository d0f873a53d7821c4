//! Integration tests for segue-cli.
//!
//! Each test builds a small sound file through `segue-sound` and drives the
//! `segue` binary against it.

use segue_config::EngineConfig;
use segue_sound::Sound;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Helper to get the path to the `segue` binary built by cargo.
fn segue_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_segue"))
}

/// Writes a default engine config so tests never read the user's.
fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("engine.toml");
    EngineConfig::default().save(&path).unwrap();
    path
}

/// One second of a rising ramp on two channels at 8 kHz.
fn make_sound(path: &Path) {
    let sound = Sound::create(path, 2, 8000, 8000, &EngineConfig::default()).unwrap();
    let ramp: Vec<f32> = (0..8000).map(|i| i as f32 / 8000.0).collect();
    sound.get_audio(0).unwrap().write(0, &ramp).unwrap();
    let inverted: Vec<f32> = ramp.iter().map(|s| -s).collect();
    sound.get_audio(1).unwrap().write(0, &inverted).unwrap();
    sound.close().unwrap();
}

fn run(config: &Path, args: &[&str]) -> Output {
    let output = segue_bin()
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("failed to run segue");
    assert!(
        output.status.success(),
        "segue {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// ---------------------------------------------------------------------------
// CLI binary tests -- help and version
// ---------------------------------------------------------------------------

#[test]
fn cli_help_lists_commands() {
    let output = segue_bin()
        .arg("--help")
        .output()
        .expect("failed to run segue --help");
    assert!(output.status.success());

    let text = stdout(&output);
    for command in ["info", "import", "export", "defrag", "peaks", "cues", "pools"] {
        assert!(text.contains(command), "help should mention '{command}'");
    }
}

#[test]
fn cli_version_works() {
    let output = segue_bin()
        .arg("--version")
        .output()
        .expect("failed to run segue --version");
    assert!(output.status.success());
    assert!(stdout(&output).contains("segue"));
}

// ---------------------------------------------------------------------------
// CLI binary tests -- inspection
// ---------------------------------------------------------------------------

#[test]
fn cli_info_reports_format() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let file = dir.path().join("ramp.seg");
    make_sound(&file);

    let text = stdout(&run(&config, &["info", file.to_str().unwrap()]));
    assert!(text.contains("Channels:    2"));
    assert!(text.contains("8000 Hz"));
    assert!(text.contains("8000 frames"));
}

#[test]
fn cli_pools_lists_channel_and_peak_pools() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let file = dir.path().join("ramp.seg");
    make_sound(&file);

    let text = stdout(&run(&config, &["pools", file.to_str().unwrap()]));
    for pool in ["Format Info", "Channel 1", "Channel 2", "PeakChunk 1", "PeakChunk 2"] {
        assert!(text.contains(pool), "pools listing should contain '{pool}'");
    }
}

#[test]
fn cli_peaks_follow_the_ramp() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let file = dir.path().join("ramp.seg");
    make_sound(&file);

    let text = stdout(&run(
        &config,
        &["peaks", file.to_str().unwrap(), "--channel", "1", "--columns", "4"],
    ));
    // Header plus four rows.
    assert_eq!(text.lines().count(), 5);
    let last = text.lines().last().unwrap();
    assert!(last.contains("-0.9999"), "last column min: {last}");
}

// ---------------------------------------------------------------------------
// CLI binary tests -- editing and conversion
// ---------------------------------------------------------------------------

#[test]
fn cli_cues_add_list_remove() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let file = dir.path().join("ramp.seg");
    make_sound(&file);
    let path = file.to_str().unwrap();

    run(&config, &["cues", "add", path, "--name", "verse", "--time", "4000"]);
    run(
        &config,
        &["cues", "add", path, "--name", "intro", "--time", "0", "--anchored"],
    );

    let listed = stdout(&run(&config, &["cues", "list", path]));
    let intro = listed.find("intro").unwrap();
    let verse = listed.find("verse").unwrap();
    assert!(intro < verse, "cues are listed in time order");
    assert!(listed.contains("[anchored]"));

    run(&config, &["cues", "remove", path, "--name", "verse"]);
    let listed = stdout(&run(&config, &["cues", "list", path]));
    assert!(!listed.contains("verse"));

    let sound = Sound::open(&file, &EngineConfig::default()).unwrap();
    assert_eq!(sound.cue_count(), 1);
}

#[test]
fn cli_cues_remove_unknown_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let file = dir.path().join("ramp.seg");
    make_sound(&file);

    let output = segue_bin()
        .arg("--config")
        .arg(&config)
        .args(["cues", "remove", file.to_str().unwrap(), "--name", "nope"])
        .output()
        .expect("failed to run segue");
    assert!(!output.status.success());
}

#[test]
fn cli_export_then_import_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let file = dir.path().join("ramp.seg");
    let wav = dir.path().join("ramp.wav");
    let back = dir.path().join("back.seg");
    make_sound(&file);

    run(
        &config,
        &["export", file.to_str().unwrap(), wav.to_str().unwrap()],
    );
    assert!(wav.exists());
    run(
        &config,
        &["import", wav.to_str().unwrap(), back.to_str().unwrap()],
    );

    let sound = Sound::open(&back, &EngineConfig::default()).unwrap();
    assert_eq!(sound.channel_count(), 2);
    assert_eq!(sound.sample_rate(), 8000);
    assert_eq!(sound.length().unwrap(), 8000);
    assert_eq!(sound.get_audio(0).unwrap().get(4000).unwrap(), 0.5);
    assert_eq!(sound.get_audio(1).unwrap().get(4000).unwrap(), -0.5);
}

#[test]
fn cli_export_rejects_odd_bit_depth() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let file = dir.path().join("ramp.seg");
    make_sound(&file);

    let output = segue_bin()
        .arg("--config")
        .arg(&config)
        .args([
            "export",
            file.to_str().unwrap(),
            dir.path().join("x.wav").to_str().unwrap(),
            "--bits",
            "12",
        ])
        .output()
        .expect("failed to run segue");
    assert!(!output.status.success());
}

#[test]
fn cli_defrag_keeps_audio() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let file = dir.path().join("ramp.seg");
    make_sound(&file);

    let text = stdout(&run(
        &config,
        &["defrag", file.to_str().unwrap(), "--purge"],
    ));
    assert!(text.contains("Removed 0 orphaned temp pools"));

    let sound = Sound::open(&file, &EngineConfig::default()).unwrap();
    assert_eq!(sound.length().unwrap(), 8000);
    assert_eq!(sound.get_audio(0).unwrap().get(7999).unwrap(), 7999.0 / 8000.0);
}

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn headless() -> Command {
    let mut cmd = Command::cargo_bin("wobble-scene").expect("binary exists");
    cmd.arg("--summary-only");
    cmd
}

#[test]
fn summary_reports_the_low_end_desktop_scene() {
    let mut cmd = headless();
    cmd.args(["--cores", "2", "--pixel-ratio", "3"]);
    cmd.assert()
        .success()
        .stdout(contains("Device profile:"))
        .stdout(contains("subdivision 50, 26012 vertices, 52020 triangles"))
        .stdout(contains("Viewport: 1280x720 at pixel ratio 2 (2560x1440 drawing buffer)"))
        .stdout(contains("Ran 1 frame(s)"))
        .stdout(contains(" - uTime = 0.017"))
        .stdout(contains(" - uStrength = 0.492"));
}

#[test]
fn mobile_profile_uses_the_lightest_mesh_and_unit_pixel_ratio() {
    let mut cmd = headless();
    cmd.args(["--mobile", "--pixel-ratio", "3"]);
    cmd.assert()
        .success()
        .stdout(contains("subdivision 40, 16812 vertices, 33620 triangles"))
        .stdout(contains("(1280x720 drawing buffer)"));
}

#[test]
fn frames_advance_the_fixed_step_clock() {
    let mut cmd = headless();
    cmd.args(["--cores", "2", "--frames", "3"]);
    cmd.assert()
        .success()
        .stdout(contains("Ran 3 frame(s)"))
        .stdout(contains(" - uTime = 0.050"));
}

#[test]
fn unreadable_environment_map_is_not_fatal() {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(b"#?RADIANCE\nthis is not a picture").expect("write");
    let mut cmd = headless();
    cmd.args(["--cores", "2", "--env-map"]).arg(file.path());
    cmd.assert()
        .success()
        .stdout(contains("Environment: none"))
        .stdout(contains("Final uniforms:"));
}

#[test]
fn missing_default_environment_map_is_not_fatal() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut cmd = headless();
    cmd.current_dir(dir.path()).args(["--cores", "2"]);
    cmd.assert().success().stdout(contains("Environment: none"));
}

#[test]
fn unknown_arguments_fail() {
    let mut cmd = headless();
    cmd.arg("--bogus");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown argument: --bogus"))
        .stdout(predicate::str::is_empty());
}

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

fn glvis(config_dir: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_glvis"));
    command
        .env("GLVIS_CONFIG_DIR", config_dir)
        .env_remove("GLVIS_CONFIG")
        .env("RUST_LOG", "warn");
    command
}

fn pngs(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".png"))
        .collect();
    names.sort();
    names
}

#[test]
fn renders_frames_to_png() {
    let root = TempDir::new().unwrap();
    let output = root.path().join("frames");

    let status = glvis(&root.path().join("config"))
        .args(["--frames", "3", "--size", "32x24", "--fps", "50", "--format", "BGRx"])
        .arg("--output")
        .arg(&output)
        .status()
        .expect("failed to run glvis");
    assert!(status.success());

    assert_eq!(
        pngs(&output),
        ["frame-00000.png", "frame-00001.png", "frame-00002.png"]
    );
    let image = image::open(output.join("frame-00000.png")).unwrap();
    assert_eq!((image.width(), image.height()), (32, 24));
}

#[test]
fn reads_default_config_file() {
    let root = TempDir::new().unwrap();
    let config_dir = root.path().join("config");
    let output = root.path().join("frames");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("glvis.toml"),
        "[visualizer]\nmesh-size = \"64,48\"\n\n[output]\nwidth = 16\nheight = 8\nframes = 2\n",
    )
    .unwrap();

    let status = glvis(&config_dir)
        .args(["--signal", "noise", "--seed", "7"])
        .arg("--output")
        .arg(&output)
        .status()
        .expect("failed to run glvis");
    assert!(status.success());

    assert_eq!(pngs(&output).len(), 2);
    let image = image::open(output.join("frame-00001.png")).unwrap();
    assert_eq!((image.width(), image.height()), (16, 8));
}

#[test]
fn rejects_invalid_property() {
    let root = TempDir::new().unwrap();
    let result = glvis(&root.path().join("config"))
        .args(["--frames", "1", "--set", "beat-sensitivity=12"])
        .output()
        .expect("failed to run glvis");
    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("beat-sensitivity"), "{stderr}");
}

#[test]
fn unavailable_display_fails_cleanly() {
    let root = TempDir::new().unwrap();
    let result = glvis(&root.path().join("config"))
        .args(["--frames", "1", "--size", "8x8", "--display", "wayland"])
        .output()
        .expect("failed to run glvis");
    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("failed to render frame 0"), "{stderr}");
}

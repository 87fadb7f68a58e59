use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use image::{Rgba, RgbaImage};

fn alphaplay(config_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_alphaplay"))
        .args(args)
        .env("ALPHAPLAY_CONFIG_DIR", config_dir)
        .env_remove("ALPHAPLAY_CONFIG")
        .env("RUST_LOG", "warn")
        .output()
        .expect("alphaplay binary runs")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn pack_then_software_export_recovers_picture() {
    let dir = tempfile::tempdir().unwrap();
    let picture = dir.path().join("picture.png");
    let mut source = RgbaImage::from_pixel(8, 4, Rgba([30, 160, 220, 255]));
    for x in 0..8 {
        source.put_pixel(x, 0, Rgba([30, 160, 220, 0]));
    }
    source.save(&picture).unwrap();

    let packed = dir.path().join("packed.png");
    let output = alphaplay(
        dir.path(),
        &["pack", picture.to_str().unwrap(), packed.to_str().unwrap()],
    );
    assert!(output.status.success(), "pack failed: {output:?}");
    assert_eq!(image::open(&packed).unwrap().to_rgba8().dimensions(), (16, 4));

    let exported = dir.path().join("out/exported.png");
    let output = alphaplay(
        dir.path(),
        &[
            "export",
            packed.to_str().unwrap(),
            exported.to_str().unwrap(),
            "--software",
            "--density",
            "2",
        ],
    );
    assert!(output.status.success(), "export failed: {output:?}");

    let image = image::open(&exported).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (16, 8));
    let [r, g, b, a] = image.get_pixel(8, 6).0;
    assert!(r.abs_diff(30) <= 2 && g.abs_diff(160) <= 2 && b.abs_diff(220) <= 2);
    assert_eq!(a, 255);
    assert_eq!(image.get_pixel(8, 0).0[3], 0);
}

#[test]
fn export_rejects_frames_without_both_halves() {
    let dir = tempfile::tempdir().unwrap();
    let narrow = dir.path().join("narrow.png");
    RgbaImage::from_pixel(1, 4, Rgba([0, 0, 0, 255]))
        .save(&narrow)
        .unwrap();
    let output = alphaplay(
        dir.path(),
        &[
            "export",
            narrow.to_str().unwrap(),
            dir.path().join("out.png").to_str().unwrap(),
            "--software",
        ],
    );
    assert!(!output.status.success());
}

#[test]
fn config_where_reports_override_directory() {
    let dir = tempfile::tempdir().unwrap();
    let output = alphaplay(dir.path(), &["config", "where"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains(&dir.path().display().to_string()));
    assert!(text.contains("not present"));
}

#[test]
fn config_show_prints_clips_and_rejects_invalid_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("alphaplay.toml"),
        "version = 1\n[defaults]\nclip = \"sparkle\"\n[clips.sparkle]\nframes = \"frames/sparkle\"\nloops = \"infinite\"\n",
    )
    .unwrap();
    let output = alphaplay(dir.path(), &["config", "show"]);
    assert!(output.status.success(), "config show failed: {output:?}");
    assert!(stdout(&output).contains("sparkle"));

    fs::write(dir.path().join("alphaplay.toml"), "version = \"one\"\n").unwrap();
    let output = alphaplay(dir.path(), &["config", "show"]);
    assert!(!output.status.success());
}

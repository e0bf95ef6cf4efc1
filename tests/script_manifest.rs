use std::fs;
use std::path::Path;

use crt_reveal::glyphs::{load_glyph_source, FontGlyphs, FONT_HASH_MISMATCH};
use crt_reveal::manifest::load_and_validate_script;
use sha2::{Digest, Sha256};
use tempfile::tempdir;

fn write_script(path: &Path, yaml: &str) {
    fs::write(path, yaml).expect("script should write");
}

const MINIMAL: &str = r#"
title: HI
greeting: "Hello,"
poem:
  - one
  - two
signature: "- me"
"#;

#[test]
fn minimal_script_loads_with_defaults() {
    let dir = tempdir().expect("tempdir should create");
    let path = dir.path().join("reveal.yaml");
    write_script(&path, MINIMAL);

    let script = load_and_validate_script(&path).expect("script should load");
    assert_eq!(script.title, "HI");
    assert_eq!(script.poem, vec!["one".to_owned(), "two".to_owned()]);
    assert_eq!(script.timing.signature_hold, 1000);
    assert!(script.effects.normal.noise_intensity.is_none());
}

#[test]
fn timing_and_effect_overrides_are_read() {
    let dir = tempdir().expect("tempdir should create");
    let path = dir.path().join("reveal.yaml");
    write_script(
        &path,
        &format!(
            "{MINIMAL}timing:\n  typewriter_speed: 30\neffects:\n  crazy:\n    chroma_shift: 6\n"
        ),
    );

    let script = load_and_validate_script(&path).expect("script should load");
    assert_eq!(script.timing.typewriter_speed, 30);
    assert_eq!(script.timing.fade_duration, 2500);
    assert_eq!(script.effects.crazy.chroma_shift, Some(6));
}

#[test]
fn invalid_values_name_the_file_and_field() {
    let dir = tempdir().expect("tempdir should create");
    let path = dir.path().join("broken.yaml");
    write_script(
        &path,
        &format!("{MINIMAL}effects:\n  normal:\n    glitch_probability: 1.5\n"),
    );

    let error = load_and_validate_script(&path).expect_err("probability > 1 must fail");
    let message = format!("{error:#}");
    assert!(message.contains("broken.yaml"), "{message}");
    assert!(message.contains("glitch_probability"), "{message}");
}

#[test]
fn yaml_errors_carry_line_numbers() {
    let dir = tempdir().expect("tempdir should create");
    let path = dir.path().join("typo.yaml");
    write_script(&path, "title: HI\ngreeting: G\npoem: [a]\nsignatur: S\n");

    let error = load_and_validate_script(&path).expect_err("typo must fail");
    let message = format!("{error:#}");
    assert!(message.contains("line 4"), "{message}");
}

#[test]
fn font_paths_resolve_relative_to_the_script() {
    let dir = tempdir().expect("tempdir should create");
    fs::create_dir_all(dir.path().join("fonts")).expect("font dir");
    fs::write(dir.path().join("fonts/mono.ttf"), b"not really a font").expect("font file");
    let path = dir.path().join("reveal.yaml");
    write_script(&path, &format!("{MINIMAL}font:\n  path: fonts/mono.ttf\n"));

    let script = load_and_validate_script(&path).expect("script should load");
    let font = script.font.expect("font entry");
    assert_eq!(font.path, dir.path().join("fonts/mono.ttf"));
}

#[test]
fn missing_font_file_is_rejected_at_load() {
    let dir = tempdir().expect("tempdir should create");
    let path = dir.path().join("reveal.yaml");
    write_script(&path, &format!("{MINIMAL}font:\n  path: nowhere.ttf\n"));

    let error = load_and_validate_script(&path).expect_err("missing font must fail");
    assert!(format!("{error:#}").contains("nowhere.ttf"));
}

#[test]
fn font_hash_pin_is_checked_before_parsing() {
    let dir = tempdir().expect("tempdir should create");
    let font_path = dir.path().join("mono.ttf");
    let bytes = b"fake font bytes".to_vec();
    fs::write(&font_path, &bytes).expect("font file");

    let wrong = "0".repeat(64);
    let error = FontGlyphs::from_path(&font_path, Some(&wrong))
        .err()
        .expect("hash mismatch must fail");
    assert!(format!("{error:#}").contains(FONT_HASH_MISMATCH));

    let right = format!("{:x}", Sha256::digest(&bytes)).to_ascii_uppercase();
    let error = FontGlyphs::from_path(&font_path, Some(&right))
        .err()
        .expect("garbage bytes must fail to parse");
    let message = format!("{error:#}");
    assert!(!message.contains(FONT_HASH_MISMATCH), "{message}");
    assert!(message.contains("failed to parse font"), "{message}");
}

#[test]
fn no_font_falls_back_to_the_builtin_face() {
    let glyphs = load_glyph_source(None, None).expect("builtin");
    assert_eq!(glyphs.label(), "builtin 8x8");
    assert!(glyphs.supports('A'));
}

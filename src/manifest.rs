use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};

use crate::schema::Script;

/// The built-in script when no path is given.
pub fn load_script_or_default(path: Option<&Path>) -> Result<Script> {
    match path {
        Some(path) => load_and_validate_script(path),
        None => {
            let script = Script::default();
            script.validate()?;
            Ok(script)
        }
    }
}

pub fn load_and_validate_script(path: &Path) -> Result<Script> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    let mut script = parse_script(&contents)
        .map_err(|error| anyhow!("failed to parse yaml in {}: {error:#}", path.display()))?;

    script
        .validate()
        .with_context(|| format!("invalid script {}", path.display()))?;

    let script_dir = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    if let Some(font) = script.font.as_mut() {
        font.path = resolve_and_validate_font_path(&script_dir, &font.path)?;
    }
    Ok(script)
}

/// Parse without validation; errors carry the YAML line and column.
pub fn parse_script(contents: &str) -> Result<Script> {
    serde_yaml::from_str(contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!("at {location}: {error}")
    })
}

fn resolve_and_validate_font_path(script_dir: &Path, font_path: &Path) -> Result<PathBuf> {
    let resolved = if font_path.is_absolute() {
        font_path.to_path_buf()
    } else {
        script_dir.join(font_path)
    };

    if !resolved.exists() {
        bail!("font.path does not exist: {}", resolved.display());
    }
    if !resolved.is_file() {
        bail!("font.path is not a file: {}", resolved.display());
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_script_takes_default_timing() {
        let script = parse_script(
            "title: T\ngreeting: G\npoem:\n  - one\n  - two\nsignature: S\n",
        )
        .expect("parse");
        assert_eq!(script.poem.len(), 2);
        assert_eq!(script.timing.typewriter_speed, 80);
        assert_eq!(script.timing.fade_duration, 2500);
        assert!(script.font.is_none());
    }

    #[test]
    fn unknown_fields_report_a_location() {
        let error = parse_script("title: T\ngreeting: G\npoem: [a]\nsignature: S\ncolour: red\n")
            .expect_err("unknown field");
        let message = format!("{error}");
        assert!(message.contains("line 5"), "{message}");
        assert!(message.contains("colour"), "{message}");
    }

    #[test]
    fn default_script_is_valid() {
        let script = load_script_or_default(None).expect("default");
        assert_eq!(script.title, "HAPPY HALLOWEEN");
        assert_eq!(script.poem.len(), 6);
    }
}

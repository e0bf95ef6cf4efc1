use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Serialize;

use crt_reveal::encoding::{write_png, FrameWriter};
use crt_reveal::engine::{run_headless, run_until, Engine, EngineConfig, FixedStepClock};
use crt_reveal::glyphs::load_glyph_source;
use crt_reveal::manifest::load_script_or_default;
use crt_reveal::schema::Script;
use crt_reveal::timeline::{schedule, PhaseSchedule};

/// Replays stop after ten minutes of script time.
const SCHEDULE_LIMIT_MS: u64 = 600_000;

#[derive(Debug, Parser)]
#[command(name = "crt-reveal")]
#[command(about = "Typewriter reveal with a software CRT finish")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CRT_REVEAL_GIT_HASH"), ")"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate a script and print its phase schedule.
    Check {
        script: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Render every frame to a video file or a PNG directory.
    Render {
        script: Option<PathBuf>,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[command(flatten)]
        surface: SurfaceArgs,
        /// Stop after this many frames even if the fade is not done.
        #[arg(long)]
        frames: Option<u64>,
    },
    /// Render the frame shown at `--at` milliseconds to a PNG.
    Still {
        script: Option<PathBuf>,
        #[arg(long = "at")]
        at_ms: u64,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[command(flatten)]
        surface: SurfaceArgs,
    },
    /// Play the reveal in a window.
    #[cfg(feature = "play")]
    Play {
        script: Option<PathBuf>,
        #[command(flatten)]
        surface: SurfaceArgs,
    },
}

#[derive(Debug, Args)]
struct SurfaceArgs {
    #[arg(long, default_value_t = 1280)]
    width: u32,
    #[arg(long, default_value_t = 720)]
    height: u32,
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// Seed for noise and glitches; defaults to the wall clock.
    #[arg(long)]
    seed: Option<u64>,
    /// TrueType/OpenType font, overriding the script's `font` entry.
    #[arg(long)]
    font: Option<PathBuf>,
}

impl SurfaceArgs {
    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("--width and --height must be > 0");
        }
        if self.fps == 0 {
            bail!("--fps must be > 0");
        }
        Ok(())
    }

    fn config(&self) -> EngineConfig {
        EngineConfig {
            width: self.width,
            height: self.height,
            seed: self.seed.unwrap_or_else(wall_clock_seed),
        }
    }
}

fn wall_clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0x5eed)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { script, json } => run_check(script.as_deref(), json),
        Commands::Render {
            script,
            output,
            surface,
            frames,
        } => run_render(script.as_deref(), &output, &surface, frames),
        Commands::Still {
            script,
            at_ms,
            output,
            surface,
        } => run_still(script.as_deref(), at_ms, &output, &surface),
        #[cfg(feature = "play")]
        Commands::Play { script, surface } => run_play(script.as_deref(), &surface),
    }
}

#[derive(Debug, Serialize)]
struct CheckReport<'a> {
    title: &'a str,
    poem_lines: usize,
    characters: usize,
    schedule: PhaseSchedule,
}

fn run_check(script_path: Option<&Path>, json: bool) -> Result<()> {
    let script = load_script_or_default(script_path)?;
    let plan = schedule(&script, 1, SCHEDULE_LIMIT_MS);

    if json {
        let report = CheckReport {
            title: &script.title,
            poem_lines: script.poem.len(),
            characters: script.all_text().chars().count(),
            schedule: plan,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let label = script_path
        .map_or_else(|| "<built-in>".to_owned(), |path| path.display().to_string());
    println!(
        "OK: {} ({} poem lines, {} characters)",
        label,
        script.poem.len(),
        script.all_text().chars().count()
    );
    for mark in &plan.marks {
        println!("  {:>9} ms  {}", mark.starts_at_ms, mark.phase.label());
    }
    match plan.completes_at_ms {
        Some(done) => println!("  {done:>9} ms  done"),
        None => println!("  (not finished within {SCHEDULE_LIMIT_MS} ms)"),
    }
    Ok(())
}

fn build_engine(script: Script, surface: &SurfaceArgs) -> Result<Engine> {
    surface.validate()?;
    let glyphs = load_glyph_source(surface.font.as_deref(), script.font.as_ref())?;
    Engine::new(script, glyphs, surface.config(), 0)
}

fn run_render(
    script_path: Option<&Path>,
    output: &Path,
    surface: &SurfaceArgs,
    max_frames: Option<u64>,
) -> Result<()> {
    let script = load_script_or_default(script_path)?;
    let mut engine = build_engine(script, surface)?;
    let mut writer = FrameWriter::create(output, engine.width(), engine.height(), surface.fps)?;
    let mut clock = FixedStepClock::new(surface.fps);
    let fps = u64::from(surface.fps);

    let summary = run_headless(&mut engine, &mut clock, max_frames, |index, rgba| {
        if index % fps == 0 {
            info!("rendered frame {}", index + 1);
        }
        writer.write_frame(index, rgba)
    })?;
    writer.finish()?;

    println!(
        "Wrote {} ({} frames, {} ms, phase {}, sequence 0x{:016x})",
        output.display(),
        summary.frames,
        summary.elapsed_ms,
        summary.final_phase.label(),
        summary.sequence_hash
    );
    Ok(())
}

fn run_still(
    script_path: Option<&Path>,
    at_ms: u64,
    output: &Path,
    surface: &SurfaceArgs,
) -> Result<()> {
    let script = load_script_or_default(script_path)?;
    let mut engine = build_engine(script, surface)?;
    let mut clock = FixedStepClock::new(surface.fps);
    let shown_at = run_until(&mut engine, &mut clock, at_ms);

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create '{}'", parent.display()))?;
    }
    write_png(output, engine.width(), engine.height(), engine.surface())?;
    println!(
        "Wrote {} (t={} ms, phase {})",
        output.display(),
        shown_at,
        engine.phase().label()
    );
    Ok(())
}

#[cfg(feature = "play")]
fn run_play(script_path: Option<&Path>, surface: &SurfaceArgs) -> Result<()> {
    let script = load_script_or_default(script_path)?;
    let title = format!("crt-reveal - {}", script.title);
    let engine = build_engine(script, surface)?;
    crt_reveal::play::run_play(engine, &title)
}

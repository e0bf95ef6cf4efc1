//! The per-frame tick loop tying timeline, text, effects and compositing together.

use std::time::Instant;

use anyhow::Result;
use log::{debug, info};

use crate::compositor::{shake_offset, FrameCompositor};
use crate::crt::{CrtPipeline, EffectContext, EffectPresets, EFFECT_TIME_STEP};
use crate::frame::FrameBuffer;
use crate::glyphs::GlyphSource;
use crate::noise::XorShift64;
use crate::schema::Script;
use crate::text::TextCompositor;
use crate::timeline::{Phase, PhaseState, Timeline};

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub width: u32,
    pub height: u32,
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Finished,
}

pub struct Engine {
    script: Script,
    presets: EffectPresets,
    timeline: Timeline,
    text: TextCompositor,
    primary: FrameBuffer,
    secondary: FrameBuffer,
    primary_fx: CrtPipeline,
    secondary_fx: CrtPipeline,
    compositor: FrameCompositor,
    rng: XorShift64,
    effect_time: f32,
    frames: u64,
    finished: bool,
}

impl Engine {
    pub fn new(
        script: Script,
        glyphs: Box<dyn GlyphSource>,
        config: EngineConfig,
        start_ms: u64,
    ) -> Result<Self> {
        script.validate()?;
        let width = config.width.max(1);
        let height = config.height.max(1);
        let text = TextCompositor::new(glyphs, &script);
        debug!(
            "engine {}x{} seed={} glyphs={}",
            width,
            height,
            config.seed,
            text.glyph_label()
        );

        Ok(Self {
            presets: EffectPresets::from_overrides(&script.effects),
            timeline: Timeline::new(start_ms),
            text,
            primary: FrameBuffer::new(width, height),
            secondary: FrameBuffer::new(width, height),
            primary_fx: CrtPipeline::new(),
            secondary_fx: CrtPipeline::new(),
            compositor: FrameCompositor::new(width, height)?,
            rng: XorShift64::from_seed(config.seed),
            effect_time: 0.0,
            frames: 0,
            finished: false,
            script,
        })
    }

    /// Reallocates every buffer; timeline progress is kept.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        debug!("resize to {width}x{height}");
        self.primary.resize(width, height);
        self.secondary.resize(width, height);
        self.compositor.resize(width, height)
    }

    pub fn tick(&mut self, now_ms: u64) -> TickOutcome {
        if self.finished {
            return TickOutcome::Finished;
        }

        self.effect_time += EFFECT_TIME_STEP;
        if let Some((from, to)) = self.timeline.advance(&self.script, now_ms) {
            debug!("phase {} -> {} at {now_ms} ms", from.label(), to.label());
        }
        let state = *self.timeline.state();
        let phase = state.phase;
        let eased = state.eased_fade();

        self.text
            .paint(&self.script, &state, &mut self.primary, &mut self.secondary);

        let params = self.presets.primary_for(phase, eased, &mut self.rng);
        let shake = shake_offset(params.shake_amplitude, phase, &mut self.rng);
        let ctx = EffectContext {
            time: self.effect_time,
            phase,
            shake,
        };
        self.primary_fx
            .apply(&mut self.primary, &params, &ctx, &mut self.rng);

        let overlay = if phase.shows_signature_overlay() {
            let ctx = EffectContext {
                shake: (0, 0),
                ..ctx
            };
            self.secondary_fx
                .apply(&mut self.secondary, &self.presets.crazy, &ctx, &mut self.rng);
            Some(&self.secondary)
        } else {
            None
        };

        self.compositor
            .compose(&self.primary, overlay, phase, eased, shake);
        self.frames += 1;

        if state.is_complete() {
            self.finished = true;
            info!("reveal finished after {} frames at {now_ms} ms", self.frames);
            TickOutcome::Finished
        } else {
            TickOutcome::Continue
        }
    }

    pub fn state(&self) -> &PhaseState {
        self.timeline.state()
    }

    pub fn phase(&self) -> Phase {
        self.timeline.phase()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn width(&self) -> u32 {
        self.compositor.width()
    }

    pub fn height(&self) -> u32 {
        self.compositor.height()
    }

    /// Opaque RGBA of the most recent frame.
    pub fn surface(&self) -> &[u8] {
        self.compositor.surface_rgba()
    }
}

pub trait Clock {
    fn now_ms(&mut self) -> u64;
}

/// Deterministic clock for offline rendering: frame `n` lands at `n * 1000 / fps`.
#[derive(Debug, Clone)]
pub struct FixedStepClock {
    fps: u32,
    frame: u64,
}

impl FixedStepClock {
    pub fn new(fps: u32) -> Self {
        Self {
            fps: fps.max(1),
            frame: 0,
        }
    }
}

impl Clock for FixedStepClock {
    fn now_ms(&mut self) -> u64 {
        self.frame += 1;
        self.frame * 1000 / u64::from(self.fps)
    }
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&mut self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub finished: bool,
    pub final_phase: Phase,
    pub elapsed_ms: u64,
    pub sequence_hash: u64,
}

/// Ticks until the reveal finishes or `max_frames` frames were produced,
/// handing every frame to `sink`.
pub fn run_headless<C, F>(
    engine: &mut Engine,
    clock: &mut C,
    max_frames: Option<u64>,
    mut sink: F,
) -> Result<RunSummary>
where
    C: Clock,
    F: FnMut(u64, &[u8]) -> Result<()>,
{
    let mut sequence = FNV_OFFSET_BASIS;
    let mut elapsed_ms = 0;
    let mut frames = 0;

    while max_frames.map_or(true, |max| frames < max) {
        elapsed_ms = clock.now_ms();
        let outcome = engine.tick(elapsed_ms);
        sink(frames, engine.surface())?;
        sequence = fnv1a64_extend(sequence, &fnv1a64(engine.surface()).to_le_bytes());
        frames += 1;
        if outcome == TickOutcome::Finished {
            break;
        }
    }

    Ok(RunSummary {
        frames,
        finished: engine.is_finished(),
        final_phase: engine.phase(),
        elapsed_ms,
        sequence_hash: sequence,
    })
}

/// Replays ticks until the clock reaches `at_ms`; the engine then holds that frame.
pub fn run_until<C: Clock>(engine: &mut Engine, clock: &mut C, at_ms: u64) -> u64 {
    loop {
        let now = clock.now_ms();
        let outcome = engine.tick(now);
        if now >= at_ms || outcome == TickOutcome::Finished {
            return now;
        }
    }
}

pub fn fnv1a64(bytes: &[u8]) -> u64 {
    fnv1a64_extend(FNV_OFFSET_BASIS, bytes)
}

fn fnv1a64_extend(mut hash: u64, bytes: &[u8]) -> u64 {
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

//! CPU CRT effect pipeline.
//!
//! [`CrtPipeline::apply`] runs a fixed sequence of in-place passes over one
//! [`FrameBuffer`]:
//!
//!   1. chromatic aberration   (reads the pre-pipeline snapshot)
//!   2. horizontal wave        (reads a pre-stage copy)
//!   3. vertical wave          (reads a pre-stage copy)
//!   4. scanlines
//!   5. noise
//!   6. color bleed
//!   7. glitch band            (reads the pre-pipeline snapshot, probability gated)
//!   8. flash brightness       (Flash phase only)
//!   9. flicker
//!
//! Resampling passes never wrap: a source coordinate outside the buffer leaves
//! the destination pixel as it was before that pass.

use crate::frame::FrameBuffer;
use crate::noise::{hash_noise, should_glitch, XorShift64};
use crate::schema::{EffectOverride, PresetOverrides};
use crate::timeline::Phase;

/// Effect time advances by this many seconds per tick.
pub const EFFECT_TIME_STEP: f32 = 0.016;
pub const GLITCH_MIN_ROWS: i32 = 10;
pub const GLITCH_MAX_ROWS: i32 = 40;
pub const GLITCH_MAX_SHIFT: i32 = 30;
/// Noise level at the start of the fade, before easing.
pub const FADE_NOISE_BASE: f32 = 0.3;
pub const FADE_NOISE_BURST: f32 = 0.3;
pub const FADE_NOISE_BURST_PROBABILITY: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectParams {
    pub scanline_intensity: f32,
    pub scanline_count: f32,
    pub noise_intensity: f32,
    pub horizontal_distortion: f32,
    pub vertical_distortion: f32,
    pub flicker_amount: f32,
    /// Angular frequencies (rad/s) of the two superimposed flicker waves.
    pub flicker_frequencies: [f32; 2],
    pub color_bleed: u32,
    pub bleed_factor: f32,
    pub chroma_shift: u32,
    pub glitch_probability: f32,
    pub rotation_amplitude: Option<f32>,
    pub brightness: Option<f32>,
    pub shake_amplitude: Option<f32>,
    /// Extra per-row horizontal warp in pixels.
    pub flash_warp: Option<f32>,
}

impl EffectParams {
    pub const NORMAL: Self = Self {
        scanline_intensity: 0.25,
        scanline_count: 0.7,
        noise_intensity: 0.25,
        horizontal_distortion: 8.0,
        vertical_distortion: 3.0,
        flicker_amount: 0.08,
        flicker_frequencies: [30.0, 47.0],
        color_bleed: 3,
        bleed_factor: 0.15,
        chroma_shift: 2,
        glitch_probability: 0.03,
        rotation_amplitude: None,
        brightness: None,
        shake_amplitude: None,
        flash_warp: None,
    };

    pub const CRAZY: Self = Self {
        scanline_intensity: 0.4,
        scanline_count: 1.0,
        noise_intensity: 0.5,
        horizontal_distortion: 12.0,
        vertical_distortion: 6.0,
        flicker_amount: 0.15,
        flicker_frequencies: [40.0, 57.0],
        color_bleed: 5,
        bleed_factor: 0.2,
        chroma_shift: 4,
        glitch_probability: 0.2,
        rotation_amplitude: Some(0.02),
        brightness: None,
        shake_amplitude: None,
        flash_warp: None,
    };

    /// Normal preset pushed to its limits for the flash.
    pub const FLASH: Self = Self {
        noise_intensity: 1.0,
        glitch_probability: 0.8,
        brightness: Some(4.5),
        shake_amplitude: Some(10.0),
        flash_warp: Some(15.0),
        ..Self::NORMAL
    };

    pub fn with_override(mut self, tweak: &EffectOverride) -> Self {
        macro_rules! take {
            ($field:ident) => {
                if let Some(value) = tweak.$field {
                    self.$field = value;
                }
            };
        }
        take!(scanline_intensity);
        take!(scanline_count);
        take!(noise_intensity);
        take!(horizontal_distortion);
        take!(vertical_distortion);
        take!(flicker_amount);
        take!(color_bleed);
        take!(bleed_factor);
        take!(chroma_shift);
        take!(glitch_probability);
        if tweak.rotation_amplitude.is_some() {
            self.rotation_amplitude = tweak.rotation_amplitude;
        }
        if tweak.brightness.is_some() {
            self.brightness = tweak.brightness;
        }
        if tweak.shake_amplitude.is_some() {
            self.shake_amplitude = tweak.shake_amplitude;
        }
        self
    }

    pub fn with_noise_intensity(mut self, noise_intensity: f32) -> Self {
        self.noise_intensity = noise_intensity;
        self
    }

    pub fn flicker_factor(&self, time: f32) -> f32 {
        let [slow, fast] = self.flicker_frequencies;
        let wave = (time * slow).sin() + (time * fast).sin() * 0.5;
        1.0 - self.flicker_amount + self.flicker_amount * wave
    }
}

/// The three presets after script overrides are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectPresets {
    pub normal: EffectParams,
    pub crazy: EffectParams,
    pub flash: EffectParams,
}

impl Default for EffectPresets {
    fn default() -> Self {
        Self {
            normal: EffectParams::NORMAL,
            crazy: EffectParams::CRAZY,
            flash: EffectParams::FLASH,
        }
    }
}

impl EffectPresets {
    pub fn from_overrides(overrides: &PresetOverrides) -> Self {
        Self {
            normal: EffectParams::NORMAL.with_override(&overrides.normal),
            crazy: EffectParams::CRAZY.with_override(&overrides.crazy),
            flash: EffectParams::FLASH.with_override(&overrides.flash),
        }
    }

    /// Preset for the primary buffer. During the fade the normal preset is used
    /// with a decaying noise level that occasionally bursts.
    pub fn primary_for(&self, phase: Phase, eased_fade: f32, rng: &mut XorShift64) -> EffectParams {
        match phase {
            Phase::Flash => self.flash,
            Phase::FadeOut => {
                let burst = should_glitch(rng, FADE_NOISE_BURST_PROBABILITY);
                self.normal
                    .with_noise_intensity(fade_noise_intensity(eased_fade, burst))
            }
            _ => self.normal,
        }
    }
}

pub fn fade_noise_intensity(eased_fade: f32, burst: bool) -> f32 {
    let burst = if burst { FADE_NOISE_BURST } else { 0.0 };
    FADE_NOISE_BASE * (1.0 - eased_fade.clamp(0.0, 1.0)) * (1.0 + burst)
}

/// Per-call inputs threaded into every stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectContext {
    /// Effect clock in seconds.
    pub time: f32,
    pub phase: Phase,
    /// Flash shake, also applied to glitch sampling.
    pub shake: (i32, i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlitchBand {
    pub top: u32,
    pub rows: u32,
    pub shift: i32,
}

impl GlitchBand {
    pub fn random(rng: &mut XorShift64, height: u32) -> Self {
        let top = (rng.next_f32() * height as f32) as u32;
        let rows = rng.range_inclusive(GLITCH_MIN_ROWS, GLITCH_MAX_ROWS) as u32;
        let shift = rng.range_inclusive(-GLITCH_MAX_SHIFT, GLITCH_MAX_SHIFT);
        Self {
            top: top.min(height.saturating_sub(1)),
            rows,
            shift,
        }
    }
}

/// Owns the snapshot buffers so a tick allocates nothing once warmed up.
#[derive(Debug, Default)]
pub struct CrtPipeline {
    original: Vec<u8>,
    scratch: Vec<u8>,
}

impl CrtPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(
        &mut self,
        buffer: &mut FrameBuffer,
        params: &EffectParams,
        ctx: &EffectContext,
        rng: &mut XorShift64,
    ) {
        copy_into(&mut self.original, buffer.pixels());

        chromatic_aberration(buffer, &self.original, params.chroma_shift);

        copy_into(&mut self.scratch, buffer.pixels());
        horizontal_wave(buffer, &self.scratch, params, ctx.time);

        copy_into(&mut self.scratch, buffer.pixels());
        vertical_wave(buffer, &self.scratch, params.vertical_distortion, ctx.time);

        scanlines(buffer, params.scanline_intensity, params.scanline_count);
        noise(buffer, params.noise_intensity, ctx.time);
        color_bleed(buffer, params.color_bleed, params.bleed_factor);

        if should_glitch(rng, params.glitch_probability) {
            let band = GlitchBand::random(rng, buffer.height());
            glitch(buffer, &self.original, band, ctx.shake);
        }

        if ctx.phase == Phase::Flash {
            if let Some(brightness) = params.brightness {
                flash_brightness(buffer, brightness);
            }
        }

        flicker(buffer, params.flicker_factor(ctx.time));
    }
}

fn copy_into(dst: &mut Vec<u8>, src: &[u8]) {
    dst.clear();
    dst.extend_from_slice(src);
}

#[inline(always)]
fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Red moves `shift` pixels right, blue `shift` pixels left.
pub fn chromatic_aberration(buffer: &mut FrameBuffer, original: &[u8], shift: u32) {
    let shift = shift as usize;
    if shift == 0 {
        return;
    }
    let width = buffer.width() as usize;
    let height = buffer.height() as usize;
    let pixels = buffer.pixels_mut();

    for y in 0..height {
        let row = y * width;
        for x in 0..width {
            let dst = (row + x) * 4;
            if x >= shift {
                pixels[dst] = original[(row + x - shift) * 4];
            }
            if x + shift < width {
                pixels[dst + 2] = original[(row + x + shift) * 4 + 2];
            }
        }
    }
}

/// Per-row sine displacement. The Crazy preset adds a rotation term and the
/// Flash preset a second, faster warp.
pub fn horizontal_wave(buffer: &mut FrameBuffer, source: &[u8], params: &EffectParams, time: f32) {
    let width = buffer.width() as i64;
    let height = buffer.height() as usize;
    let pixels = buffer.pixels_mut();

    for y in 0..height {
        let row_f = y as f32;
        let wave = ((row_f * 0.05 + time * 2.0).sin() * params.horizontal_distortion).floor() as i64;
        let mut offset = -wave;
        if let Some(amplitude) = params.rotation_amplitude {
            let angle = (row_f * 0.1 + time * 3.0).sin() * amplitude;
            offset += (angle.cos() * 10.0).floor() as i64;
        }
        if let Some(warp) = params.flash_warp {
            offset += ((row_f * 0.1 + time * 5.0).sin() * warp).floor() as i64;
        }
        if offset == 0 {
            continue;
        }

        let row = y * width as usize;
        for x in 0..width {
            let src_x = x + offset;
            if src_x < 0 || src_x >= width {
                continue;
            }
            let dst = (row + x as usize) * 4;
            let src = (row + src_x as usize) * 4;
            pixels[dst..dst + 4].copy_from_slice(&source[src..src + 4]);
        }
    }
}

pub fn vertical_wave(buffer: &mut FrameBuffer, source: &[u8], amplitude: f32, time: f32) {
    let width = buffer.width() as usize;
    let height = buffer.height() as i64;
    let pixels = buffer.pixels_mut();

    for x in 0..width {
        let offset = ((x as f32 * 0.03 + time * 1.5).sin() * amplitude).floor() as i64;
        if offset == 0 {
            continue;
        }
        for y in 0..height {
            let src_y = y - offset;
            if src_y < 0 || src_y >= height {
                continue;
            }
            let dst = (y as usize * width + x) * 4;
            let src = (src_y as usize * width + x) * 4;
            pixels[dst..dst + 4].copy_from_slice(&source[src..src + 4]);
        }
    }
}

pub fn scanline_factor(row: u32, intensity: f32, count: f32) -> f32 {
    let wave = (row as f32 * std::f32::consts::PI * count).sin();
    1.0 - intensity * (0.5 + 0.5 * wave)
}

pub fn scanlines(buffer: &mut FrameBuffer, intensity: f32, count: f32) {
    if intensity <= 0.0 {
        return;
    }
    let row_bytes = buffer.width() as usize * 4;
    for (y, row) in buffer.pixels_mut().chunks_exact_mut(row_bytes).enumerate() {
        let factor = scanline_factor(y as u32, intensity, count);
        for px in row.chunks_exact_mut(4) {
            px[0] = to_channel(f32::from(px[0]) * factor);
            px[1] = to_channel(f32::from(px[1]) * factor);
            px[2] = to_channel(f32::from(px[2]) * factor);
        }
    }
}

/// Zero-centered hash noise, same value on all three channels.
pub fn noise(buffer: &mut FrameBuffer, intensity: f32, time: f32) {
    if intensity <= 0.0 {
        return;
    }
    let width = buffer.width() as usize;
    let fast_time = time * 20.0;
    let scale = intensity * 255.0;

    for (i, px) in buffer.pixels_mut().chunks_exact_mut(4).enumerate() {
        let x = (i % width) as f32;
        let y = (i / width) as f32;
        let n = (hash_noise(x * 0.5, y * 0.5, fast_time) - 0.5) * scale;
        px[0] = to_channel(f32::from(px[0]) + n);
        px[1] = to_channel(f32::from(px[1]) + n);
        px[2] = to_channel(f32::from(px[2]) + n);
    }
}

/// Green smears `distance` pixels to the right. Runs left to right in place,
/// so a bleed can itself bleed further along the row.
pub fn color_bleed(buffer: &mut FrameBuffer, distance: u32, factor: f32) {
    let distance = distance as usize;
    if distance == 0 || factor <= 0.0 {
        return;
    }
    let width = buffer.width() as usize;
    if distance >= width {
        return;
    }
    let row_bytes = width * 4;
    for row in buffer.pixels_mut().chunks_exact_mut(row_bytes) {
        for x in 0..width - distance {
            let green = f32::from(row[x * 4 + 1]);
            let dst = (x + distance) * 4 + 1;
            row[dst] = to_channel(f32::from(row[dst]) + green * factor);
        }
    }
}

/// Copy a displaced strip of the pre-pipeline image into `band`.
pub fn glitch(buffer: &mut FrameBuffer, original: &[u8], band: GlitchBand, shake: (i32, i32)) {
    let width = buffer.width() as i64;
    let height = buffer.height() as i64;
    let pixels = buffer.pixels_mut();
    let top = i64::from(band.top);
    let bottom = (top + i64::from(band.rows)).min(height);

    for y in top..bottom {
        let src_y = y - i64::from(shake.1);
        if src_y < 0 || src_y >= height {
            continue;
        }
        for x in 0..width {
            let src_x = x - i64::from(shake.0) - i64::from(band.shift);
            if src_x < 0 || src_x >= width {
                continue;
            }
            let dst = ((y * width + x) * 4) as usize;
            let src = ((src_y * width + src_x) * 4) as usize;
            pixels[dst..dst + 4].copy_from_slice(&original[src..src + 4]);
        }
    }
}

pub fn flash_brightness(buffer: &mut FrameBuffer, brightness: f32) {
    for px in buffer.pixels_mut().chunks_exact_mut(4) {
        px[0] = to_channel(f32::from(px[0]) * brightness);
        px[1] = to_channel(f32::from(px[1]) * brightness);
        px[2] = to_channel(f32::from(px[2]) * brightness);
    }
}

pub fn flicker(buffer: &mut FrameBuffer, factor: f32) {
    if (factor - 1.0).abs() < f32::EPSILON {
        return;
    }
    for px in buffer.pixels_mut().chunks_exact_mut(4) {
        px[0] = to_channel(f32::from(px[0]) * factor);
        px[1] = to_channel(f32::from(px[1]) * factor);
        px[2] = to_channel(f32::from(px[2]) * factor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> FrameBuffer {
        let mut buffer = FrameBuffer::new(width, height);
        for y in 0..height {
            for x in 0..width {
                buffer.set_pixel(x, y, [(x * 20) as u8, (y * 20) as u8, (x * 10 + 5) as u8, 255]);
            }
        }
        buffer
    }

    #[test]
    fn flash_preset_inherits_normal_geometry() {
        let flash = EffectParams::FLASH;
        assert_eq!(flash.chroma_shift, EffectParams::NORMAL.chroma_shift);
        assert_eq!(flash.scanline_count, EffectParams::NORMAL.scanline_count);
        assert_eq!(flash.brightness, Some(4.5));
        assert_eq!(flash.shake_amplitude, Some(10.0));
        assert_eq!(EffectParams::NORMAL.brightness, None);
        assert_eq!(EffectParams::CRAZY.rotation_amplitude, Some(0.02));
    }

    #[test]
    fn overrides_only_touch_named_fields() {
        let tweak = EffectOverride {
            noise_intensity: Some(0.0),
            chroma_shift: Some(7),
            ..EffectOverride::default()
        };
        let params = EffectParams::NORMAL.with_override(&tweak);
        assert_eq!(params.noise_intensity, 0.0);
        assert_eq!(params.chroma_shift, 7);
        assert_eq!(params.scanline_intensity, EffectParams::NORMAL.scanline_intensity);
    }

    #[test]
    fn chromatic_aberration_splits_red_and_blue() {
        let mut buffer = gradient(6, 1);
        let original = buffer.pixels().to_vec();
        chromatic_aberration(&mut buffer, &original, 2);

        // red at x=3 comes from x=1, blue at x=3 from x=5
        assert_eq!(buffer.pixel(3, 0)[0], 20);
        assert_eq!(buffer.pixel(3, 0)[2], 55);
        // green never moves
        assert_eq!(buffer.pixel(3, 0)[1], 0);
        // edges without a source keep their own values
        assert_eq!(buffer.pixel(0, 0)[0], 0);
        assert_eq!(buffer.pixel(5, 0)[2], 55);
    }

    #[test]
    fn scanline_factor_matches_formula() {
        assert!((scanline_factor(0, 0.25, 0.7) - 0.875).abs() < 1e-6);
        let expected = 1.0 - 0.4 * (0.5 + 0.5 * (3.0 * std::f32::consts::PI).sin());
        assert!((scanline_factor(3, 0.4, 1.0) - expected).abs() < 1e-5);
    }

    #[test]
    fn zero_noise_is_identity() {
        let mut buffer = gradient(8, 8);
        let before = buffer.clone();
        noise(&mut buffer, 0.0, 12.0);
        assert_eq!(buffer, before);
    }

    #[test]
    fn noise_is_pure_for_fixed_time() {
        let mut a = gradient(16, 8);
        let mut b = gradient(16, 8);
        noise(&mut a, 0.5, 3.2);
        noise(&mut b, 0.5, 3.2);
        assert_eq!(a, b);
    }

    #[test]
    fn color_bleed_pushes_green_right() {
        let mut buffer = FrameBuffer::new(8, 1);
        buffer.set_pixel(0, 0, [0, 200, 0, 255]);
        color_bleed(&mut buffer, 3, 0.2);
        assert_eq!(buffer.pixel(3, 0)[1], 40);
        assert_eq!(buffer.pixel(6, 0)[1], 8);
        assert_eq!(buffer.pixel(1, 0)[1], 0);
    }

    #[test]
    fn glitch_copies_shifted_rows_from_snapshot() {
        let mut buffer = gradient(10, 20);
        let original = buffer.pixels().to_vec();
        buffer.clear([1, 1, 1, 255]);

        let band = GlitchBand {
            top: 5,
            rows: 3,
            shift: 2,
        };
        glitch(&mut buffer, &original, band, (0, 0));

        assert_eq!(buffer.pixel(4, 6)[0], 40, "x=4 samples original x=2");
        assert_eq!(buffer.pixel(1, 6), [1, 1, 1, 255], "out-of-bounds source is skipped");
        assert_eq!(buffer.pixel(4, 4), [1, 1, 1, 255], "rows outside the band are untouched");
        assert_eq!(buffer.pixel(4, 8), [1, 1, 1, 255]);
    }

    #[test]
    fn glitch_band_stays_within_limits() {
        let mut rng = XorShift64::from_seed(99);
        for _ in 0..2_000 {
            let band = GlitchBand::random(&mut rng, 50);
            assert!(band.top < 50);
            assert!((10..=40).contains(&band.rows));
            assert!((-30..=30).contains(&band.shift));
        }
    }

    #[test]
    fn brightness_only_applies_during_flash() {
        let mut params = EffectParams::FLASH;
        params.noise_intensity = 0.0;
        params.glitch_probability = 0.0;
        params.scanline_intensity = 0.0;
        params.flicker_amount = 0.0;
        params.horizontal_distortion = 0.0;
        params.vertical_distortion = 0.0;
        params.flash_warp = None;
        params.chroma_shift = 0;
        params.color_bleed = 0;

        let mut pipeline = CrtPipeline::new();
        let mut rng = XorShift64::from_seed(1);
        let mut lit = FrameBuffer::new(2, 2);
        lit.clear([40, 40, 100, 255]);
        let mut dark = lit.clone();

        let flash = EffectContext {
            time: 0.0,
            phase: Phase::Flash,
            shake: (0, 0),
        };
        pipeline.apply(&mut lit, &params, &flash, &mut rng);
        assert_eq!(lit.pixel(0, 0), [180, 180, 255, 255]);

        let poem = EffectContext {
            phase: Phase::Poem,
            ..flash
        };
        pipeline.apply(&mut dark, &params, &poem, &mut rng);
        assert_eq!(dark.pixel(0, 0), [40, 40, 100, 255]);
    }

    #[test]
    fn flicker_factor_matches_formula() {
        let params = EffectParams::NORMAL;
        let t = 0.7_f32;
        let expected = 1.0 - 0.08 + 0.08 * ((t * 30.0).sin() + (t * 47.0).sin() * 0.5);
        assert!((params.flicker_factor(t) - expected).abs() < 1e-6);
        assert!((params.flicker_factor(0.0) - 0.92).abs() < 1e-6);
    }

    #[test]
    fn fade_noise_decays_and_bursts() {
        assert!((fade_noise_intensity(0.0, false) - 0.3).abs() < 1e-6);
        assert!((fade_noise_intensity(0.0, true) - 0.39).abs() < 1e-6);
        assert_eq!(fade_noise_intensity(1.0, true), 0.0);
    }
}

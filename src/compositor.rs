//! Final surface assembly on a `tiny_skia::Pixmap`.
//!
//! Draw order per frame: black fill, primary buffer (shaken, faded), signature
//! overlay, fade vignette, border bands.

use anyhow::{anyhow, Result};
use tiny_skia::{
    Color, GradientStop, Paint, Pixmap, PixmapPaint, Point, PremultipliedColorU8, RadialGradient,
    Rect, SpreadMode, Transform,
};

use crate::frame::FrameBuffer;
use crate::noise::XorShift64;
use crate::timeline::Phase;

pub const BORDER_WIDTH: f32 = 15.0;
pub const BORDER_ALPHA: u8 = 51;
pub const VIGNETTE_RADIUS_FACTOR: f32 = 0.6;
/// `(offset, alpha at full fade)` for the vignette gradient.
pub const VIGNETTE_STOPS: [(f32, f32); 3] = [(0.0, 0.0), (0.7, 0.5), (1.0, 0.9)];

/// Random translation of the primary buffer, only while flashing.
pub fn shake_offset(amplitude: Option<f32>, phase: Phase, rng: &mut XorShift64) -> (i32, i32) {
    match (phase, amplitude) {
        (Phase::Flash, Some(amplitude)) if amplitude > 0.0 => {
            let dx = rng.symmetric(amplitude).round() as i32;
            let dy = rng.symmetric(amplitude).round() as i32;
            (dx, dy)
        }
        _ => (0, 0),
    }
}

pub fn primary_opacity(phase: Phase, eased_fade: f32) -> f32 {
    if phase == Phase::FadeOut {
        (1.0 - eased_fade).clamp(0.0, 1.0)
    } else {
        1.0
    }
}

/// Vignette stop alphas scaled by the eased fade.
pub fn vignette_stops(eased_fade: f32) -> [(f32, f32); 3] {
    let eased = eased_fade.clamp(0.0, 1.0);
    VIGNETTE_STOPS.map(|(offset, alpha)| (offset, alpha * eased))
}

pub struct FrameCompositor {
    surface: Pixmap,
    layer: Pixmap,
}

impl FrameCompositor {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            surface: new_pixmap(width, height)?,
            layer: new_pixmap(width, height)?,
        })
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width.max(1) != self.width() || height.max(1) != self.height() {
            *self = Self::new(width, height)?;
        }
        Ok(())
    }

    /// Opaque RGBA of the last composed frame.
    pub fn surface_rgba(&self) -> &[u8] {
        self.surface.data()
    }

    pub fn surface(&self) -> &Pixmap {
        &self.surface
    }

    pub fn compose(
        &mut self,
        primary: &FrameBuffer,
        overlay: Option<&FrameBuffer>,
        phase: Phase,
        eased_fade: f32,
        shake: (i32, i32),
    ) {
        self.surface.fill(Color::BLACK);

        load_straight_rgba(&mut self.layer, primary);
        let paint = PixmapPaint {
            opacity: primary_opacity(phase, eased_fade),
            ..PixmapPaint::default()
        };
        self.surface.draw_pixmap(
            shake.0,
            shake.1,
            self.layer.as_ref(),
            &paint,
            Transform::identity(),
            None,
        );

        if let Some(overlay) = overlay {
            load_straight_rgba(&mut self.layer, overlay);
            self.surface.draw_pixmap(
                0,
                0,
                self.layer.as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }

        if phase == Phase::FadeOut {
            self.draw_vignette(eased_fade);
        }
        self.draw_border();
    }

    fn draw_vignette(&mut self, eased_fade: f32) {
        if eased_fade <= 0.0 {
            return;
        }
        let width = self.surface.width() as f32;
        let height = self.surface.height() as f32;
        let center = Point::from_xy(width / 2.0, height / 2.0);
        let stops = vignette_stops(eased_fade)
            .iter()
            .map(|&(offset, alpha)| {
                GradientStop::new(offset, Color::from_rgba8(0, 0, 0, to_alpha(alpha)))
            })
            .collect::<Vec<_>>();
        let Some(shader) = RadialGradient::new(
            center,
            center,
            width.max(height) * VIGNETTE_RADIUS_FACTOR,
            stops,
            SpreadMode::Pad,
            Transform::identity(),
        ) else {
            return;
        };
        let mut paint = Paint::default();
        paint.shader = shader;
        if let Some(rect) = Rect::from_xywh(0.0, 0.0, width, height) {
            self.surface.fill_rect(rect, &paint, Transform::identity(), None);
        }
    }

    fn draw_border(&mut self) {
        let width = self.surface.width() as f32;
        let height = self.surface.height() as f32;
        let mut paint = Paint::default();
        paint.set_color_rgba8(0, 0, 0, BORDER_ALPHA);
        let bands = [
            Rect::from_xywh(0.0, 0.0, width, BORDER_WIDTH),
            Rect::from_xywh(0.0, height - BORDER_WIDTH, width, BORDER_WIDTH),
            Rect::from_xywh(0.0, 0.0, BORDER_WIDTH, height),
            Rect::from_xywh(width - BORDER_WIDTH, 0.0, BORDER_WIDTH, height),
        ];
        for band in bands.into_iter().flatten() {
            self.surface.fill_rect(band, &paint, Transform::identity(), None);
        }
    }
}

fn new_pixmap(width: u32, height: u32) -> Result<Pixmap> {
    Pixmap::new(width.max(1), height.max(1))
        .ok_or_else(|| anyhow!("failed to allocate {width}x{height} surface"))
}

fn to_alpha(alpha: f32) -> u8 {
    (alpha * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Premultiply a straight-alpha buffer into a same-sized pixmap.
fn load_straight_rgba(layer: &mut Pixmap, buffer: &FrameBuffer) {
    for (dst, src) in layer
        .pixels_mut()
        .iter_mut()
        .zip(buffer.pixels().chunks_exact(4))
    {
        let alpha = u16::from(src[3]);
        let scale = |channel: u8| ((u16::from(channel) * alpha + 127) / 255) as u8;
        *dst = PremultipliedColorU8::from_rgba(scale(src[0]), scale(src[1]), scale(src[2]), src[3])
            .unwrap_or(PremultipliedColorU8::TRANSPARENT);
    }
}

//! Paints the currently revealed text into the primary and signature buffers.

use log::warn;

use crate::frame::{FrameBuffer, OPAQUE_BLACK, TRANSPARENT_BLACK};
use crate::glyphs::{CoverageMask, GlyphSource};
use crate::layout::{ContentLayout, FontMetrics, Viewport};
use crate::schema::Script;
use crate::timeline::{Phase, PhaseState};

pub const TEXT_COLOR: [u8; 3] = [0, 255, 0];
pub const GLOW_COLOR: [u8; 3] = [0, 255, 0];
pub const PRIMARY_GLOW_BLUR: u32 = 8;
pub const SIGNATURE_GLOW_BLUR: u32 = 12;
/// Horizontal shear of italic rows, in pixels per pixel of height.
const ITALIC_SLANT: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Bold,
    Italic,
}

#[derive(Debug, Clone, PartialEq)]
struct TextRun<'a> {
    text: &'a str,
    px: f32,
    y: f32,
    align: Align,
    style: Style,
}

pub struct TextCompositor {
    glyphs: Box<dyn GlyphSource>,
    mask: CoverageMask,
    glow: CoverageMask,
}

impl TextCompositor {
    /// Warns once about every character the glyph source cannot draw.
    pub fn new(glyphs: Box<dyn GlyphSource>, script: &Script) -> Self {
        let missing = glyphs.missing_glyphs(&script.all_text());
        if !missing.is_empty() {
            let list = missing.iter().collect::<String>();
            warn!(
                "{} has no glyphs for {} character(s): {list}",
                glyphs.label(),
                missing.len()
            );
        }
        Self {
            glyphs,
            mask: CoverageMask::new(1, 1),
            glow: CoverageMask::new(1, 1),
        }
    }

    pub fn glyph_label(&self) -> String {
        self.glyphs.label()
    }

    /// Clears both buffers, then draws the revealed prefix of every section.
    /// Nothing is drawn from the flash on.
    pub fn paint(
        &mut self,
        script: &Script,
        state: &PhaseState,
        primary: &mut FrameBuffer,
        secondary: &mut FrameBuffer,
    ) {
        primary.clear(OPAQUE_BLACK);
        secondary.clear(TRANSPARENT_BLACK);
        if !state.phase.paints_text() {
            return;
        }

        let viewport = Viewport::new(primary.width(), primary.height());
        let metrics = FontMetrics::for_viewport(viewport);
        let layout = ContentLayout::compute(viewport, &metrics, script.poem.len());

        let runs = primary_runs(script, state, &metrics, &layout);
        if !runs.is_empty() {
            self.rasterize(&runs, &layout, viewport);
            self.mask.blur_into(PRIMARY_GLOW_BLUR / 2, &mut self.glow);
            blend_onto_opaque(primary, &self.mask, &self.glow);
        }

        if state.phase == Phase::Signature && state.signature_char_index > 0 {
            let run = TextRun {
                text: revealed(&script.signature, state.signature_char_index),
                px: metrics.signature,
                y: layout.signature_y,
                align: Align::Right,
                style: Style::Italic,
            };
            self.rasterize(&[run], &layout, viewport);
            self.mask.blur_into(SIGNATURE_GLOW_BLUR / 2, &mut self.glow);
            blend_onto_transparent(secondary, &self.mask, &self.glow);
        }
    }

    fn rasterize(&mut self, runs: &[TextRun<'_>], layout: &ContentLayout, viewport: Viewport) {
        self.mask.resize(viewport.width, viewport.height);
        self.mask.clear();
        for run in runs {
            let width = self.glyphs.measure(run.text, run.px);
            let x = match run.align {
                Align::Center => layout.center_x - width / 2.0,
                Align::Right => layout.signature_right - width,
            };
            self.glyphs.draw(&mut self.mask, run.text, run.px, x, run.y);

            let top = (run.y - run.px).floor() as i32;
            let bottom = (run.y + run.px).ceil() as i32;
            match run.style {
                Style::Bold => {
                    let amount = (run.px / 24.0).round().max(1.0) as u32;
                    self.mask.embolden(top, bottom, amount);
                }
                Style::Italic => self.mask.shear(top, bottom, run.y, ITALIC_SLANT),
            }
        }
    }
}

fn primary_runs<'a>(
    script: &'a Script,
    state: &PhaseState,
    metrics: &FontMetrics,
    layout: &ContentLayout,
) -> Vec<TextRun<'a>> {
    let mut runs = Vec::with_capacity(script.poem.len() + 2);
    let phase = state.phase;

    let title = if phase == Phase::Title {
        revealed(&script.title, state.char_index)
    } else {
        script.title.as_str()
    };
    runs.push(TextRun {
        text: title,
        px: metrics.title,
        y: layout.title_y,
        align: Align::Center,
        style: Style::Bold,
    });

    if phase >= Phase::Greeting {
        let greeting = if phase == Phase::Greeting {
            revealed(&script.greeting, state.char_index)
        } else {
            script.greeting.as_str()
        };
        runs.push(TextRun {
            text: greeting,
            px: metrics.greeting,
            y: layout.greeting_y,
            align: Align::Center,
            style: Style::Bold,
        });
    }

    if phase >= Phase::Poem {
        for (index, line) in script.poem.iter().enumerate() {
            let text = if phase > Phase::Poem || index < state.poem_line_index {
                line.as_str()
            } else if index == state.poem_line_index {
                revealed(line, state.poem_char_index)
            } else {
                break;
            };
            runs.push(TextRun {
                text,
                px: metrics.poem,
                y: layout.poem_line_y(index),
                align: Align::Center,
                style: Style::Italic,
            });
        }
    }

    runs.retain(|run| !run.text.is_empty());
    runs
}

/// The first `count` characters of `text`.
pub fn revealed(text: &str, count: usize) -> &str {
    match text.char_indices().nth(count) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[inline(always)]
fn mix(src: u8, dst: u8, alpha: u32) -> u8 {
    ((u32::from(src) * alpha + u32::from(dst) * (255 - alpha) + 127) / 255) as u8
}

/// Glow then text, source-over onto an opaque buffer.
fn blend_onto_opaque(buffer: &mut FrameBuffer, mask: &CoverageMask, glow: &CoverageMask) {
    for ((px, &text), &halo) in buffer
        .pixels_mut()
        .chunks_exact_mut(4)
        .zip(mask.data())
        .zip(glow.data())
    {
        if text == 0 && halo == 0 {
            continue;
        }
        for channel in 0..3 {
            let lit = mix(GLOW_COLOR[channel], px[channel], u32::from(halo));
            px[channel] = mix(TEXT_COLOR[channel], lit, u32::from(text));
        }
    }
}

/// Glow then text, source-over onto a transparent buffer; keeps straight alpha.
fn blend_onto_transparent(buffer: &mut FrameBuffer, mask: &CoverageMask, glow: &CoverageMask) {
    for ((px, &text), &halo) in buffer
        .pixels_mut()
        .chunks_exact_mut(4)
        .zip(mask.data())
        .zip(glow.data())
    {
        if text == 0 && halo == 0 {
            continue;
        }
        let text_a = f32::from(text) / 255.0;
        let halo_a = f32::from(halo) / 255.0;
        let out_a = text_a + halo_a * (1.0 - text_a);
        for channel in 0..3 {
            let premul = f32::from(TEXT_COLOR[channel]) * text_a
                + f32::from(GLOW_COLOR[channel]) * halo_a * (1.0 - text_a);
            px[channel] = (premul / out_a).round().clamp(0.0, 255.0) as u8;
        }
        px[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}

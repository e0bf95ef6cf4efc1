//! Glyph rasterization into coverage masks.
//!
//! Two sources implement [`GlyphSource`]:
//! - [`FontGlyphs`]: a TrueType/OpenType face through `fontdue`, with a raster cache
//! - [`BitmapGlyphs`]: the built-in 8x8 terminal face from `font8x8`, used when no
//!   font file is configured

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use fontdue::{Font, FontSettings, Metrics};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::schema::FontSource;

pub const FONT_HASH_MISMATCH: &str = "FONT_HASH_MISMATCH";
const MAX_CACHED_GLYPHS: usize = 4096;
/// Advance of one bitmap cell relative to the font size.
const BITMAP_ADVANCE_RATIO: f32 = 0.6;

/// Single-channel coverage raster, one byte per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl CoverageMask {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width.max(1) != self.width || height.max(1) != self.height {
            *self = Self::new(width, height);
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&value| value == 0)
    }

    /// Max-blend a `w`x`h` coverage bitmap with its top-left at `(x, y)`. Clipped.
    pub fn stamp(&mut self, x: i32, y: i32, w: usize, h: usize, coverage: &[u8]) {
        let width = self.width as i32;
        let height = self.height as i32;
        for row in 0..h {
            let py = y + row as i32;
            if py < 0 || py >= height {
                continue;
            }
            for col in 0..w {
                let px = x + col as i32;
                if px < 0 || px >= width {
                    continue;
                }
                let value = coverage[row * w + col];
                if value == 0 {
                    continue;
                }
                let idx = (py * width + px) as usize;
                self.data[idx] = self.data[idx].max(value);
            }
        }
    }

    /// Faux bold: smear each row in `[top, bottom)` right by `amount` pixels.
    pub fn embolden(&mut self, top: i32, bottom: i32, amount: u32) {
        if amount == 0 {
            return;
        }
        let width = self.width as usize;
        let (top, bottom) = self.clamp_rows(top, bottom);
        for y in top..bottom {
            let row = &mut self.data[y * width..(y + 1) * width];
            for x in (0..width).rev() {
                let reach = x.saturating_sub(amount as usize);
                let strongest = row[reach..=x].iter().copied().max().unwrap_or(0);
                row[x] = strongest;
            }
        }
    }

    /// Faux italic: rows above `center_y` move right, rows below move left.
    pub fn shear(&mut self, top: i32, bottom: i32, center_y: f32, slant: f32) {
        let width = self.width as usize;
        let (top, bottom) = self.clamp_rows(top, bottom);
        let mut line = vec![0u8; width];
        for y in top..bottom {
            let shift = ((center_y - y as f32) * slant).round() as i64;
            if shift == 0 {
                continue;
            }
            let row = &mut self.data[y * width..(y + 1) * width];
            line.fill(0);
            for (x, &value) in row.iter().enumerate() {
                let dst = x as i64 + shift;
                if value != 0 && dst >= 0 && (dst as usize) < width {
                    line[dst as usize] = value;
                }
            }
            row.copy_from_slice(&line);
        }
    }

    /// Approximate gaussian blur (three box passes per axis) written into `out`.
    pub fn blur_into(&self, radius: u32, out: &mut CoverageMask) {
        out.resize(self.width, self.height);
        out.data.copy_from_slice(&self.data);
        if radius == 0 {
            return;
        }
        let width = self.width as usize;
        let height = self.height as usize;
        let mut temp = vec![0u8; self.data.len()];
        for _ in 0..3 {
            box_pass(&out.data, &mut temp, width, height, radius as usize, true);
            box_pass(&temp, &mut out.data, width, height, radius as usize, false);
        }
    }

    fn clamp_rows(&self, top: i32, bottom: i32) -> (usize, usize) {
        let top = top.clamp(0, self.height as i32) as usize;
        let bottom = bottom.clamp(0, self.height as i32) as usize;
        (top, bottom.max(top))
    }
}

fn box_pass(src: &[u8], dst: &mut [u8], width: usize, height: usize, radius: usize, horizontal: bool) {
    let (lines, len) = if horizontal { (height, width) } else { (width, height) };
    let at = |line: usize, i: usize| {
        if horizontal {
            line * width + i
        } else {
            i * width + line
        }
    };
    let window = (radius * 2 + 1) as u32;

    for line in 0..lines {
        let mut sum: u32 = 0;
        for i in 0..=radius.min(len - 1) {
            sum += u32::from(src[at(line, i)]);
        }
        for i in 0..len {
            dst[at(line, i)] = (sum / window) as u8;
            if i + radius + 1 < len {
                sum += u32::from(src[at(line, i + radius + 1)]);
            }
            if i >= radius {
                sum -= u32::from(src[at(line, i - radius)]);
            }
        }
    }
}

pub trait GlyphSource {
    /// Horizontal advance of `text` at `px` pixels per em.
    fn measure(&mut self, text: &str, px: f32) -> f32;

    /// Rasterize `text` with its left edge at `x` and its em box vertically
    /// centered on `middle_y`.
    fn draw(&mut self, mask: &mut CoverageMask, text: &str, px: f32, x: f32, middle_y: f32);

    fn supports(&self, ch: char) -> bool;

    fn missing_glyphs(&self, text: &str) -> Vec<char> {
        let mut missing = Vec::new();
        for ch in text.chars() {
            if ch.is_whitespace() || self.supports(ch) || missing.contains(&ch) {
                continue;
            }
            missing.push(ch);
        }
        missing
    }

    fn label(&self) -> String;
}

/// Built-in 8x8 terminal face, nearest-neighbour scaled.
#[derive(Debug, Clone, Default)]
pub struct BitmapGlyphs {
    cell: Vec<u8>,
}

impl BitmapGlyphs {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(ch: char) -> Option<[u8; 8]> {
        Self::exact_rows(ch).or_else(|| base_letter(ch).and_then(Self::exact_rows))
    }

    fn exact_rows(ch: char) -> Option<[u8; 8]> {
        BASIC_FONTS.get(ch).or_else(|| LATIN_FONTS.get(ch))
    }

    fn advance(px: f32) -> f32 {
        (px * BITMAP_ADVANCE_RATIO).max(1.0)
    }
}

impl GlyphSource for BitmapGlyphs {
    fn measure(&mut self, text: &str, px: f32) -> f32 {
        text.chars().count() as f32 * Self::advance(px)
    }

    fn draw(&mut self, mask: &mut CoverageMask, text: &str, px: f32, x: f32, middle_y: f32) {
        let advance = Self::advance(px);
        let cell_w = advance.round().max(1.0) as usize;
        let cell_h = px.round().max(1.0) as usize;
        let top = (middle_y - cell_h as f32 / 2.0).round() as i32;
        self.cell.resize(cell_w * cell_h, 0);

        let mut pen = x;
        for ch in text.chars() {
            if let Some(rows) = Self::rows(ch) {
                for dy in 0..cell_h {
                    let bits = rows[dy * 8 / cell_h];
                    for dx in 0..cell_w {
                        let on = (bits >> (dx * 8 / cell_w)) & 1 == 1;
                        self.cell[dy * cell_w + dx] = if on { 255 } else { 0 };
                    }
                }
                mask.stamp(pen.round() as i32, top, cell_w, cell_h, &self.cell);
            }
            pen += advance;
        }
    }

    fn supports(&self, ch: char) -> bool {
        Self::rows(ch).is_some()
    }

    fn label(&self) -> String {
        "builtin 8x8".to_owned()
    }
}

/// Letter with its diacritics stripped, for faces without precomposed forms.
fn base_letter(ch: char) -> Option<char> {
    match ch {
        'đ' => Some('d'),
        'Đ' => Some('D'),
        _ => ch.nfd().next().filter(|&base| base != ch),
    }
}

#[derive(Debug, Clone)]
struct RasterGlyph {
    metrics: Metrics,
    bitmap: Vec<u8>,
}

pub struct FontGlyphs {
    font: Font,
    name: String,
    cache: HashMap<(char, u32), RasterGlyph>,
}

impl FontGlyphs {
    pub fn from_bytes(bytes: Vec<u8>, name: &str) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|error| anyhow!("failed to parse font {name}: {error}"))?;
        Ok(Self {
            font,
            name: name.to_owned(),
            cache: HashMap::new(),
        })
    }

    /// Load a face from disk, optionally pinned to a SHA-256 digest.
    pub fn from_path(path: &Path, expected_sha256: Option<&str>) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read font file '{}'", path.display()))?;
        if let Some(expected) = expected_sha256 {
            let actual = sha256_hex(&bytes);
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                bail!(
                    "{}: {} expected sha256={} actual sha256={}",
                    FONT_HASH_MISMATCH,
                    path.display(),
                    expected.trim(),
                    actual
                );
            }
        }
        Self::from_bytes(bytes, &path.display().to_string())
    }

    fn glyph(&mut self, ch: char, px: f32) -> &RasterGlyph {
        if self.cache.len() >= MAX_CACHED_GLYPHS {
            self.cache.clear();
        }
        let font = &self.font;
        self.cache.entry((ch, px.to_bits())).or_insert_with(|| {
            let (metrics, bitmap) = font.rasterize(ch, px);
            RasterGlyph { metrics, bitmap }
        })
    }
}

impl GlyphSource for FontGlyphs {
    fn measure(&mut self, text: &str, px: f32) -> f32 {
        text.chars()
            .map(|ch| self.font.metrics(ch, px).advance_width)
            .sum()
    }

    fn draw(&mut self, mask: &mut CoverageMask, text: &str, px: f32, x: f32, middle_y: f32) {
        let baseline = match self.font.horizontal_line_metrics(px) {
            Some(line) => middle_y + (line.ascent + line.descent) / 2.0,
            None => middle_y + px * 0.35,
        };

        let mut pen = x;
        for ch in text.chars() {
            let glyph = self.glyph(ch, px);
            let metrics = glyph.metrics;
            if metrics.width > 0 && metrics.height > 0 {
                let gx = (pen + metrics.xmin as f32).round() as i32;
                let gy = (baseline - (metrics.height as f32 + metrics.ymin as f32)).round() as i32;
                mask.stamp(gx, gy, metrics.width, metrics.height, &glyph.bitmap);
            }
            pen += metrics.advance_width;
        }
    }

    fn supports(&self, ch: char) -> bool {
        self.font.lookup_glyph_index(ch) != 0
    }

    fn label(&self) -> String {
        self.name.clone()
    }
}

/// Pick the glyph source: an explicit path wins over the script's font entry,
/// and the built-in face is used when neither is set.
pub fn load_glyph_source(
    cli_font: Option<&Path>,
    script_font: Option<&FontSource>,
) -> Result<Box<dyn GlyphSource>> {
    if let Some(path) = cli_font {
        return Ok(Box::new(FontGlyphs::from_path(path, None)?));
    }
    if let Some(source) = script_font {
        return Ok(Box::new(FontGlyphs::from_path(
            &source.path,
            source.sha256.as_deref(),
        )?));
    }
    Ok(Box::new(BitmapGlyphs::new()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

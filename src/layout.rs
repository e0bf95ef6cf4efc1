//! Responsive font metrics and vertical placement of the reveal.

/// Viewports narrower than this use the mobile size table.
pub const MOBILE_BREAKPOINT: f32 = 768.0;
/// Heights at or above this use unscaled sizes.
pub const REFERENCE_HEIGHT: f32 = 800.0;
pub const POEM_LINE_HEIGHT_FACTOR: f32 = 1.3;
pub const SECTION_ADVANCE_FACTOR: f32 = 1.5;
/// Extra slack folded into the content height estimate.
pub const CONTENT_GAP: f32 = 100.0;
pub const SIGNATURE_RIGHT_MARGIN: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Zero dimensions are clamped to one pixel.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    pub title: f32,
    pub greeting: f32,
    pub poem: f32,
    pub signature: f32,
    pub poem_line_height: f32,
}

impl FontMetrics {
    pub fn for_viewport(viewport: Viewport) -> Self {
        let width = viewport.width as f32;
        let scale = (viewport.height as f32 / REFERENCE_HEIGHT).min(1.0);

        let (title, greeting, poem, signature) = if width < MOBILE_BREAKPOINT {
            (
                (width * 0.04).min(24.0),
                (width * 0.045).min(28.0),
                (width * 0.035).min(20.0),
                (width * 0.03).min(18.0),
            )
        } else {
            (
                (width * 0.025).min(36.0),
                (width * 0.035).min(48.0),
                (width * 0.025).min(32.0),
                (width * 0.02).min(28.0),
            )
        };

        let clamp = |size: f32| (size * scale).max(1.0);
        let poem = clamp(poem);
        Self {
            title: clamp(title),
            greeting: clamp(greeting),
            poem,
            signature: clamp(signature),
            poem_line_height: poem * POEM_LINE_HEIGHT_FACTOR,
        }
    }
}

/// Vertical centers of every text row, in pixels from the top.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentLayout {
    pub title_y: f32,
    pub greeting_y: f32,
    pub poem_top: f32,
    pub poem_line_height: f32,
    pub signature_y: f32,
    pub signature_right: f32,
    pub center_x: f32,
}

impl ContentLayout {
    pub fn compute(viewport: Viewport, metrics: &FontMetrics, poem_lines: usize) -> Self {
        let height = viewport.height as f32;
        let poem_block = poem_lines as f32 * metrics.poem_line_height;
        let content = metrics.title + metrics.greeting + poem_block + metrics.signature + CONTENT_GAP;

        let title_y = if content > height * 0.8 {
            (height - content) / 2.0
        } else {
            height * 0.2
        };
        let greeting_y = title_y + metrics.title * SECTION_ADVANCE_FACTOR;
        let poem_top = greeting_y + metrics.greeting * SECTION_ADVANCE_FACTOR;
        let signature_y = poem_top + poem_block + metrics.signature;

        Self {
            title_y,
            greeting_y,
            poem_top,
            poem_line_height: metrics.poem_line_height,
            signature_y,
            signature_right: viewport.width as f32 - SIGNATURE_RIGHT_MARGIN,
            center_x: viewport.width as f32 / 2.0,
        }
    }

    pub fn poem_line_y(&self, index: usize) -> f32 {
        self.poem_top + index as f32 * self.poem_line_height
    }
}

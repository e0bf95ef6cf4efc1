use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TYPEWRITER_SPEED_MS: u64 = 80;
pub const DEFAULT_INTER_SECTION_DELAY_MS: u64 = 1000;
pub const DEFAULT_SIGNATURE_HOLD_MS: u64 = 1000;
pub const DEFAULT_FLASH_DURATION_MS: u64 = 300;
pub const DEFAULT_FADE_DURATION_MS: u64 = 2500;

/// Immutable content of one reveal: what gets typed, and how fast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    pub title: String,
    pub greeting: String,
    pub poem: Vec<String>,
    pub signature: String,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub effects: PresetOverrides,
    #[serde(default)]
    pub font: Option<FontSource>,
}

impl Script {
    pub fn validate(&self) -> Result<()> {
        if self.poem.is_empty() {
            bail!("poem must contain at least one line");
        }
        for (index, line) in self.poem.iter().enumerate() {
            if line.contains('\n') {
                bail!("poem line {} contains a newline; split it into separate lines", index + 1);
            }
        }
        self.timing.validate()?;
        self.effects.validate()?;
        Ok(())
    }

    pub fn title_len(&self) -> usize {
        self.title.chars().count()
    }

    pub fn greeting_len(&self) -> usize {
        self.greeting.chars().count()
    }

    pub fn signature_len(&self) -> usize {
        self.signature.chars().count()
    }

    /// Length of poem line `index`, or 0 past the end.
    pub fn poem_line_len(&self, index: usize) -> usize {
        self.poem
            .get(index)
            .map(|line| line.chars().count())
            .unwrap_or(0)
    }

    /// Every character the compositor may ever paint, for glyph coverage checks.
    pub fn all_text(&self) -> String {
        let mut text = String::new();
        text.push_str(&self.title);
        text.push_str(&self.greeting);
        for line in &self.poem {
            text.push_str(line);
        }
        text.push_str(&self.signature);
        text
    }
}

impl Default for Script {
    fn default() -> Self {
        Self {
            title: "HAPPY HALLOWEEN".to_owned(),
            greeting: "Hello công chúa của ta - Luyện Mai Nhi,".to_owned(),
            poem: [
                "Mười tám - một đêm trăng máu dưới bầu trời u ám",
                "Nguyện mọi lời nguyền hóa thành phước lành quấn quanh linh hồn ngươi",
                "Dây trói tình thâm đâm xuyên xen kẽ như mạng nhện trong cổ mộ",
                "Ngôi nhà ngươi ở mãi mãi ấm áp bởi hơi thở mê hoặc từ bóng tối",
                "Trên tay ngươi là lọ thuốc may mắn được ban phước từ gã phù thủy",
                "Và trái tim ngươi luôn bị ràng buộc bởi những sợi xích của ta không thể tháo rời.",
            ]
            .iter()
            .map(|line| (*line).to_owned())
            .collect(),
            signature: "- Từ chúa tể hắc ám đánh cắp nỗi buồn ngươi đi dưới ánh trăng máu Halloween, kẻ mang tên Từ Anh Văn.".to_owned(),
            timing: Timing::default(),
            effects: PresetOverrides::default(),
            font: None,
        }
    }
}

/// Timing constants, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Timing {
    pub typewriter_speed: u64,
    pub inter_section_delay: u64,
    pub signature_hold: u64,
    pub flash_duration: u64,
    pub fade_duration: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            typewriter_speed: DEFAULT_TYPEWRITER_SPEED_MS,
            inter_section_delay: DEFAULT_INTER_SECTION_DELAY_MS,
            signature_hold: DEFAULT_SIGNATURE_HOLD_MS,
            flash_duration: DEFAULT_FLASH_DURATION_MS,
            fade_duration: DEFAULT_FADE_DURATION_MS,
        }
    }
}

impl Timing {
    pub fn validate(&self) -> Result<()> {
        if self.typewriter_speed == 0 {
            bail!("timing.typewriter_speed must be > 0");
        }
        if self.fade_duration == 0 {
            bail!("timing.fade_duration must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FontSource {
    pub path: PathBuf,
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Per-preset tweaks layered over the built-in effect presets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PresetOverrides {
    pub normal: EffectOverride,
    pub crazy: EffectOverride,
    pub flash: EffectOverride,
}

impl PresetOverrides {
    pub fn validate(&self) -> Result<()> {
        self.normal.validate().context("effects.normal")?;
        self.crazy.validate().context("effects.crazy")?;
        self.flash.validate().context("effects.flash")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EffectOverride {
    pub scanline_intensity: Option<f32>,
    pub scanline_count: Option<f32>,
    pub noise_intensity: Option<f32>,
    pub horizontal_distortion: Option<f32>,
    pub vertical_distortion: Option<f32>,
    pub flicker_amount: Option<f32>,
    pub color_bleed: Option<u32>,
    pub bleed_factor: Option<f32>,
    pub chroma_shift: Option<u32>,
    pub glitch_probability: Option<f32>,
    pub rotation_amplitude: Option<f32>,
    pub brightness: Option<f32>,
    pub shake_amplitude: Option<f32>,
}

impl EffectOverride {
    pub fn validate(&self) -> Result<()> {
        let amplitudes = [
            ("scanline_intensity", self.scanline_intensity),
            ("scanline_count", self.scanline_count),
            ("noise_intensity", self.noise_intensity),
            ("horizontal_distortion", self.horizontal_distortion),
            ("vertical_distortion", self.vertical_distortion),
            ("flicker_amount", self.flicker_amount),
            ("bleed_factor", self.bleed_factor),
            ("rotation_amplitude", self.rotation_amplitude),
            ("shake_amplitude", self.shake_amplitude),
        ];
        for (name, value) in amplitudes {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    bail!("{name} must be a finite value >= 0, got {value}");
                }
            }
        }

        if let Some(probability) = self.glitch_probability {
            if !(0.0..=1.0).contains(&probability) {
                bail!("glitch_probability must be within [0, 1], got {probability}");
            }
        }

        if let Some(brightness) = self.brightness {
            if !brightness.is_finite() || brightness < 1.0 {
                bail!("brightness must be a finite value >= 1, got {brightness}");
            }
        }
        Ok(())
    }
}

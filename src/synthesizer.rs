//! Palette synthesis: pick accent colors from a reduced color list and derive
//! the companion tones a UI needs around them.

use std::convert::Infallible;

use crate::cache::ResultCache;
use crate::color::{
    Color, darken, hue_distance, lighten, perceptual_distance, readable_text_color, rotate_hue,
};
use crate::error::{Error, Result};
use crate::histogram::HistogramSource;
use crate::reducer::{ColorReducer, WeightedColor};

/// Background used when there is no input color at all (#dddddd).
pub const DEFAULT_BACKGROUND: Color = Color::new(221.0 / 255.0, 221.0 / 255.0, 221.0 / 255.0);

/// Accents closer than this (CIE76, lightness included) count as duplicates.
const DUPLICATE_DISTANCE: f64 = 20.0;

const COMPANION_HUE_DISTANCE: f64 = 30.0;
/// Inputs with fewer colors than this skip the companion scan.
const COMPANION_SCAN_MIN_COLORS: usize = 5;
const COMPANION_LIGHTNESS_STEP: f64 = 0.2;
const COMPANION_FALLBACK_PCT: f64 = 0.2;

const PRESET_SATURATION: f64 = 0.95;
const PRESET_LIGHTNESS: f64 = 0.4;

const ROTATION_LIGHTNESS: f64 = 0.33;
/// Rotation offsets grow by a tenth of a turn every two steps, so twenty
/// steps cover the whole wheel.
const MAX_ROTATION_STEPS: usize = 20;

/// The roles a palette assigns colors to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Accent color
    Primary,
    /// Lighter companion of the accent
    PriLight,
    /// Darker companion of the accent
    PriDark,
    /// Dominant (background) color
    Back,
    /// Readable foreground on the accent
    Text,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Primary,
        Role::PriLight,
        Role::PriDark,
        Role::Back,
        Role::Text,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::PriLight => "pri-light",
            Role::PriDark => "pri-dark",
            Role::Back => "back",
            Role::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Palette {
    pub primary: Color,
    #[cfg_attr(feature = "serde", serde(rename = "pri-light"))]
    pub pri_light: Color,
    #[cfg_attr(feature = "serde", serde(rename = "pri-dark"))]
    pub pri_dark: Color,
    pub back: Color,
    pub text: Color,
}

impl Palette {
    pub fn get(&self, role: Role) -> Color {
        match role {
            Role::Primary => self.primary,
            Role::PriLight => self.pri_light,
            Role::PriDark => self.pri_dark,
            Role::Back => self.back,
            Role::Text => self.text,
        }
    }

    pub fn roles(&self) -> [(Role, Color); 5] {
        Role::ALL.map(|role| (role, self.get(role)))
    }
}

/// Options for [`PaletteSynthesizer::palettes`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaletteOptions {
    /// Number of palettes requested. Forced to 1 when an accent seed is given.
    pub count: usize,
    /// Use this accent instead of picking one from the input.
    pub accent_seed: Option<Color>,
    /// Ceiling for the accent's HSL lightness.
    pub max_pri_brightness: f64,
}

impl Default for PaletteOptions {
    fn default() -> Self {
        Self {
            count: 1,
            accent_seed: None,
            max_pri_brightness: 1.0,
        }
    }
}

impl PaletteOptions {
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_accent_seed(mut self, accent: Color) -> Self {
        self.accent_seed = Some(accent);
        self
    }

    pub fn with_max_pri_brightness(mut self, max: f64) -> Self {
        self.max_pri_brightness = max;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(Error::InvalidCount);
        }
        if !(0.0..=1.0).contains(&self.max_pri_brightness) {
            return Err(Error::InvalidBrightness(self.max_pri_brightness));
        }
        Ok(())
    }

    fn key(&self) -> OptionsKey {
        OptionsKey {
            count: self.count,
            accent_seed: self
                .accent_seed
                .map(|c| [c.r.to_bits(), c.g.to_bits(), c.b.to_bits()]),
            max_pri_brightness: self.max_pri_brightness.to_bits(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct OptionsKey {
    count: usize,
    accent_seed: Option<[u64; 3]>,
    max_pri_brightness: u64,
}

/// Builds palettes from colors ordered by descending weight. The first color
/// is the background; the rest compete for the accent.
///
/// # Example
/// ```
/// use image_to_palette_wasm::{Color, PaletteSynthesizer};
///
/// let synth = PaletteSynthesizer::new(vec![
///     Color::from_u8(200, 60, 60),
///     Color::from_u8(40, 40, 220),
/// ]);
/// let palette = synth.palette(None);
/// assert_eq!(palette.back, Color::from_u8(200, 60, 60));
/// assert_eq!(palette.primary, Color::from_u8(40, 40, 220));
/// ```
pub struct PaletteSynthesizer {
    colors: Vec<Color>,
    cache: ResultCache<OptionsKey, Vec<Palette>>,
}

impl PaletteSynthesizer {
    /// `colors` must already be ordered by descending weight.
    pub fn new(colors: Vec<Color>) -> Self {
        Self {
            colors,
            cache: ResultCache::new(),
        }
    }

    /// Build from weighted colors in any order.
    pub fn from_weighted(colors: &[WeightedColor]) -> Self {
        let mut sorted = colors.to_vec();
        sorted.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        Self::new(sorted.into_iter().map(|wc| wc.color).collect())
    }

    /// Build from the valuable colors of a reducer.
    pub fn from_reducer<S: HistogramSource>(reducer: &ColorReducer<S>) -> Result<Self> {
        Ok(Self::from_weighted(&reducer.valuable_colors()?))
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    /// A single palette, optionally around a given accent.
    pub fn palette(&self, accent_seed: Option<Color>) -> Palette {
        let options = PaletteOptions {
            accent_seed,
            ..PaletteOptions::default()
        };
        self.cached(&options)
            .into_iter()
            .next()
            .unwrap_or_else(|| preset_palette(0.0))
    }

    /// Up to `options.count` palettes with pairwise distinct accents, sorted
    /// by accent hue.
    pub fn palettes(&self, options: &PaletteOptions) -> Result<Vec<Palette>> {
        options.validate()?;
        Ok(self.cached(options))
    }

    fn cached(&self, options: &PaletteOptions) -> Vec<Palette> {
        self.cache
            .get_or_try_insert_with(options.key(), || {
                Ok::<_, Infallible>(self.generate(options))
            })
            .unwrap_or_else(|never| match never {})
    }

    fn main_color(&self) -> Color {
        self.colors.first().copied().unwrap_or(DEFAULT_BACKGROUND)
    }

    fn generate(&self, options: &PaletteOptions) -> Vec<Palette> {
        let main = self.main_color();
        let count = if options.accent_seed.is_some() {
            1
        } else {
            options.count
        };
        let candidates = self.ranked_accent_candidates(main);
        let reserved = match options.accent_seed {
            Some(_) => None,
            None => self.reserved_background(main),
        };
        let mut picker = AccentPicker::new(reserved, count);
        let mut palettes = Vec::with_capacity(count);

        for fewest_index in 0..count {
            let Some(mut accent) = options
                .accent_seed
                .or_else(|| candidates.get(fewest_index).copied())
            else {
                tracing::debug!(fewest_index, "ran out of accent candidates");
                continue;
            };
            if accent.lightness() > options.max_pri_brightness {
                accent = accent.with_lightness(options.max_pri_brightness);
            }
            if !picker.accept(accent) {
                tracing::debug!(fewest_index, %accent, "skipped near-duplicate accent");
                continue;
            }
            palettes.push(self.compose(accent, main));
        }
        sort_by_accent_hue(&mut palettes);

        if palettes.len() < count {
            let Some(&seed) = palettes.last() else {
                tracing::debug!(count, "no usable accent, falling back to presets");
                return preset_palettes(count);
            };
            tracing::debug!(
                missing = count - palettes.len(),
                "filling palettes by hue rotation"
            );
            self.fill_by_rotation(seed, main, count, &mut picker, &mut palettes);
            sort_by_accent_hue(&mut palettes);
        }
        palettes
    }

    /// With more than one input color a picked accent must stay clear of the
    /// background. An explicit seed is taken as is.
    fn reserved_background(&self, main: Color) -> Option<Color> {
        (self.colors.len() > 1).then_some(main)
    }

    /// Accent candidates, best first. The background is excluded unless it
    /// is the only color.
    fn ranked_accent_candidates(&self, main: Color) -> Vec<Color> {
        let pool = if self.colors.len() > 1 {
            &self.colors[1..]
        } else {
            &self.colors[..]
        };
        let mut scored: Vec<(f64, Color)> =
            pool.iter().map(|&c| (accent_score(c, main), c)).collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().map(|(_, c)| c).collect()
    }

    fn compose(&self, accent: Color, main: Color) -> Palette {
        let accent_lightness = accent.lightness();
        let mut companions = self.companions(accent);
        let pri_light = companions
            .next()
            .map(|c| c.with_lightness(accent_lightness + COMPANION_LIGHTNESS_STEP))
            .unwrap_or_else(|| lighten(accent, COMPANION_FALLBACK_PCT));
        let pri_dark = companions
            .next()
            .map(|c| c.with_lightness(accent_lightness - COMPANION_LIGHTNESS_STEP))
            .unwrap_or_else(|| darken(accent, COMPANION_FALLBACK_PCT));

        Palette {
            primary: accent,
            pri_light,
            pri_dark,
            back: main,
            text: readable_text_color(accent, Some(main)),
        }
    }

    /// Input colors (background excluded, original order) close in hue to
    /// the accent.
    fn companions(&self, accent: Color) -> impl Iterator<Item = Color> + '_ {
        let scan: &[Color] = if self.colors.len() >= COMPANION_SCAN_MIN_COLORS {
            &self.colors[1..]
        } else {
            &[]
        };
        scan.iter()
            .copied()
            .filter(move |&c| hue_distance(c, accent) <= COMPANION_HUE_DISTANCE)
    }

    /// Rotate the last palette's primary (even steps) and background (odd
    /// steps) around the wheel until enough distinct accents exist.
    fn fill_by_rotation(
        &self,
        seed: Palette,
        main: Color,
        count: usize,
        picker: &mut AccentPicker,
        palettes: &mut Vec<Palette>,
    ) {
        for step in 0..MAX_ROTATION_STEPS {
            if palettes.len() >= count {
                break;
            }
            let turns = ((step + 1) as f64 / 2.0).ceil() / 10.0;
            let base = if step % 2 == 0 { seed.primary } else { seed.back };
            let candidate = rotate_hue(base, turns).with_lightness(ROTATION_LIGHTNESS);
            if picker.accept(candidate) {
                palettes.push(self.compose(candidate, main));
            }
        }
    }
}

/// Tracks the accents handed out so far and rejects near-duplicates.
struct AccentPicker {
    reserved: Option<Color>,
    chosen: Vec<Color>,
}

impl AccentPicker {
    fn new(reserved: Option<Color>, capacity: usize) -> Self {
        Self {
            reserved,
            chosen: Vec::with_capacity(capacity),
        }
    }

    fn accept(&mut self, accent: Color) -> bool {
        let duplicate = self
            .reserved
            .iter()
            .chain(self.chosen.iter())
            .any(|&c| perceptual_distance(c, accent, false) < DUPLICATE_DISTANCE);
        if !duplicate {
            self.chosen.push(accent);
        }
        !duplicate
    }
}

/// Higher is more accent-like: close to the main hue or far across the
/// wheel, saturated, and dark.
fn accent_score(color: Color, main: Color) -> f64 {
    let hue = hue_distance(color, main);
    let adjusted = if hue > 60.0 {
        -0.5 * hue + 120.0
    } else {
        1.5 * hue
    };
    2.0 * adjusted + 10.0 * color.saturation() - 7.01 * color.lab().l
}

fn sort_by_accent_hue(palettes: &mut [Palette]) {
    palettes.sort_by(|a, b| a.primary.hue().total_cmp(&b.primary.hue()));
}

/// `count` palettes with accents evenly spaced around the wheel on white.
fn preset_palettes(count: usize) -> Vec<Palette> {
    (0..=count)
        .map(|i| preset_palette(i as f64 / count as f64))
        .take(count)
        .collect()
}

fn preset_palette(hue: f64) -> Palette {
    let accent = Color::from_hsl(hue, PRESET_SATURATION, PRESET_LIGHTNESS);
    Palette {
        primary: accent,
        pri_light: lighten(accent, COMPANION_FALLBACK_PCT),
        pri_dark: darken(accent, COMPANION_FALLBACK_PCT),
        back: Color::WHITE,
        text: readable_text_color(accent, Some(Color::WHITE)),
    }
}

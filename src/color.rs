//! Color type and the perceptual math the reducer and synthesizer share.
//!
//! Colors are stored as gamma-encoded sRGB channels in `0.0..=1.0`. HSL views
//! go through the `palette` crate; the LAB view is computed explicitly against
//! the D65 reference white so that distances stay stable across `palette`
//! releases.

use std::fmt;
use std::str::FromStr;

use palette::{FromColor, Hsl, Srgb};

use crate::error::ParseColorError;

type HslF64 = Hsl<palette::encoding::Srgb, f64>;

// D65 reference white
const XN: f64 = 0.950470;
const YN: f64 = 1.0;
const ZN: f64 = 1.088830;

const LAB_EPSILON: f64 = 0.008856;
const LAB_KAPPA: f64 = 7.787037;

/// Accent/background lightness gap (0-255 scale) beyond which the accent is
/// used directly as the text color.
const TEXT_CONTRAST_THRESHOLD: f64 = 255.0 * 0.8;
/// Background L* below which white text reads best.
const WHITE_TEXT_MAX_LIGHTNESS: f64 = 75.0;

/// An sRGB color with channels in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

/// CIE L*a*b* coordinates (D65).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lab {
    /// Lightness, `0.0..=100.0`
    pub l: f64,
    /// Green-red axis
    pub a: f64,
    /// Blue-yellow axis
    pub b: f64,
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0);

    #[inline]
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Create a color from 8-bit channel values.
    ///
    /// # Example
    /// ```
    /// use image_to_palette_wasm::Color;
    /// let red = Color::from_u8(255, 0, 0);
    /// assert_eq!(red.r, 1.0);
    /// ```
    #[inline]
    pub fn from_u8(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0)
    }

    /// Rounds and clamps each channel to `0..=255`.
    #[inline]
    pub fn to_u8(self) -> [u8; 3] {
        [channel_to_u8(self.r), channel_to_u8(self.g), channel_to_u8(self.b)]
    }

    /// Parse `#rgb` or `#rrggbb` (the `#` is optional).
    pub fn from_hex(s: &str) -> Result<Self, ParseColorError> {
        let hex = s.trim().trim_start_matches('#');
        let digits = hex
            .chars()
            .map(|c| c.to_digit(16).map(|d| d as u8).ok_or(ParseColorError::InvalidDigit(c)))
            .collect::<Result<Vec<u8>, _>>()?;

        match digits.as_slice() {
            [r, g, b] => Ok(Self::from_u8(r * 17, g * 17, b * 17)),
            [r1, r0, g1, g0, b1, b0] => {
                Ok(Self::from_u8(r1 * 16 + r0, g1 * 16 + g0, b1 * 16 + b0))
            }
            other => Err(ParseColorError::InvalidLength(other.len())),
        }
    }

    /// Canonical lowercase `#rrggbb`. Two colors with the same hex are the
    /// same color as far as merge bookkeeping is concerned.
    pub fn to_hex(self) -> String {
        let [r, g, b] = self.to_u8();
        format!("#{r:02x}{g:02x}{b:02x}")
    }

    /// Build a color from a hue expressed as a fraction of a full turn.
    pub fn from_hsl(hue: f64, saturation: f64, lightness: f64) -> Self {
        let hsl = HslF64::new(
            hue.rem_euclid(1.0) * 360.0,
            saturation.clamp(0.0, 1.0),
            lightness.clamp(0.0, 1.0),
        );
        let rgb: Srgb<f64> = Srgb::from_color(hsl);
        Self::new(
            rgb.red.clamp(0.0, 1.0),
            rgb.green.clamp(0.0, 1.0),
            rgb.blue.clamp(0.0, 1.0),
        )
    }

    /// `(hue, saturation, lightness)` with the hue as a fraction of a turn in `0.0..1.0`.
    pub fn hsl(self) -> (f64, f64, f64) {
        let hsl = HslF64::from_color(Srgb::new(self.r, self.g, self.b));
        let hue = hsl.hue.into_positive_degrees() / 360.0;
        (hue.rem_euclid(1.0), hsl.saturation, hsl.lightness)
    }

    #[inline]
    pub fn hue(self) -> f64 {
        self.hsl().0
    }

    #[inline]
    pub fn saturation(self) -> f64 {
        self.hsl().1
    }

    #[inline]
    pub fn lightness(self) -> f64 {
        self.hsl().2
    }

    pub fn with_saturation(self, saturation: f64) -> Self {
        let (h, _, l) = self.hsl();
        Self::from_hsl(h, saturation, l)
    }

    pub fn with_lightness(self, lightness: f64) -> Self {
        let (h, s, _) = self.hsl();
        Self::from_hsl(h, s, lightness)
    }

    /// Convert to CIE L*a*b* via linear RGB and XYZ.
    pub fn lab(self) -> Lab {
        let r = srgb_to_linear(self.r);
        let g = srgb_to_linear(self.g);
        let b = srgb_to_linear(self.b);

        let x = xyz_to_lab((0.4124564 * r + 0.3575761 * g + 0.1804375 * b) / XN);
        let y = xyz_to_lab((0.2126729 * r + 0.7151522 * g + 0.0721750 * b) / YN);
        let z = xyz_to_lab((0.0193339 * r + 0.1191920 * g + 0.9503041 * b) / ZN);

        Lab {
            l: 116.0 * y - 16.0,
            a: 500.0 * (x - y),
            b: 200.0 * (y - z),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[inline]
fn channel_to_u8(c: f64) -> u8 {
    (c * 255.0).round().clamp(0.0, 255.0) as u8
}

/// IEC 61966-2-1 inverse gamma.
#[inline]
fn srgb_to_linear(c: f64) -> f64 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[inline]
fn xyz_to_lab(t: f64) -> f64 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        LAB_KAPPA * t + 4.0 / 29.0
    }
}

/// CIE76 distance. With `ignore_lightness` only the a*/b* plane is compared.
pub fn perceptual_distance(c1: Color, c2: Color, ignore_lightness: bool) -> f64 {
    let lab1 = c1.lab();
    let lab2 = c2.lab();
    let dl = if ignore_lightness { 0.0 } else { (lab1.l - lab2.l).powi(2) };
    (dl + (lab1.a - lab2.a).powi(2) + (lab1.b - lab2.b).powi(2)).sqrt()
}

/// Shortest angular distance between two hues, in degrees (`0.0..=180.0`).
pub fn hue_distance(c1: Color, c2: Color) -> f64 {
    let mut h1 = c1.hue();
    let mut h2 = c2.hue();
    if h1 < 0.0 {
        h1 += 1.0;
    }
    if h2 < 0.0 {
        h2 += 1.0;
    }
    let mut delta = (h1 - h2).abs();
    if delta > 0.5 {
        delta = 1.0 - delta;
    }
    delta * 360.0
}

/// Flatten near-pure hues and push the rest toward full saturation, so
/// sampling noise does not keep near-identical hues apart.
pub fn dither(color: Color) -> Color {
    let (h, mut s, mut l) = color.hsl();
    if s > 0.8 {
        s -= s * 0.3;
        l -= 0.1;
    } else {
        s += (1.0 - s) * 0.5;
    }
    Color::from_hsl(h, s, l)
}

/// Force saturation and/or lightness. A free saturation is nudged 38.2% of
/// the way toward 1; a free lightness is left alone.
pub fn pure(color: Color, saturation: Option<f64>, lightness: Option<f64>) -> Color {
    let (h, s, l) = color.hsl();
    let s = saturation.unwrap_or(s + (1.0 - s) * 0.382);
    let l = lightness.unwrap_or(l);
    Color::from_hsl(h, s, l)
}

/// Move lightness toward 1 by `pct` of the remaining distance.
pub fn lighten(color: Color, pct: f64) -> Color {
    let mut out = color;
    lighten_in_place(&mut out, pct);
    out
}

/// Move lightness toward 0 by `pct` of the current lightness.
pub fn darken(color: Color, pct: f64) -> Color {
    let mut out = color;
    darken_in_place(&mut out, pct);
    out
}

pub fn lighten_in_place(color: &mut Color, pct: f64) {
    let l = color.lightness();
    *color = color.with_lightness(l + (1.0 - l) * pct);
}

pub fn darken_in_place(color: &mut Color, pct: f64) {
    let l = color.lightness();
    *color = color.with_lightness(l - l * pct);
}

/// Rotate the hue by `turns` (1.0 is a full turn), keeping saturation and lightness.
pub fn rotate_hue(color: Color, turns: f64) -> Color {
    let (h, s, l) = color.hsl();
    Color::from_hsl(h + turns, s, l)
}

/// Pick a foreground color that reads on `bg`.
///
/// An `accent` whose L* differs from the background's by more than the
/// contrast threshold wins outright. Otherwise dark backgrounds get white and
/// light ones get a near-black of the background's own hue.
pub fn readable_text_color(bg: Color, accent: Option<Color>) -> Color {
    let bg_l = bg.lab().l;
    if let Some(accent) = accent {
        if (bg_l - accent.lab().l).abs() > TEXT_CONTRAST_THRESHOLD {
            return accent;
        }
    }

    if bg_l < WHITE_TEXT_MAX_LIGHTNESS {
        Color::WHITE
    } else {
        bg.with_lightness(0.1)
    }
}

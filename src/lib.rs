//! Reduce an image's color histogram to its few perceptually distinct
//! "valuable" colors, and build UI palettes (accent, light/dark companions,
//! background, readable text) from them.
//!
//! Data flows one way:
//!
//! ```text
//! HistogramSource ──> ColorReducer ──> PaletteSynthesizer ──> Vec<Palette>
//! (image / slice)     (filter, merge,  (accent scoring,
//!                      prune)           companions, fallbacks)
//! ```
//!
//! # Example
//!
//! ```
//! use image_to_palette_wasm::{
//!     Color, ColorReducer, HistogramEntry, PaletteOptions, PaletteSynthesizer,
//! };
//!
//! let histogram = vec![
//!     HistogramEntry::new(0.5, Color::from_u8(200, 60, 60)),
//!     HistogramEntry::new(0.3, Color::from_u8(40, 40, 220)),
//!     HistogramEntry::new(0.2, Color::from_u8(128, 128, 128)),
//! ];
//! let reducer = ColorReducer::new(histogram);
//! let synth = PaletteSynthesizer::from_reducer(&reducer).unwrap();
//! let palettes = synth.palettes(&PaletteOptions::default().with_count(2)).unwrap();
//! assert_eq!(palettes.len(), 2);
//! ```

use js_sys::{Array, Object, Reflect};
use wasm_bindgen::prelude::*;

mod cache;
pub mod color;
pub mod error;
pub mod histogram;
pub mod reducer;
pub mod synthesizer;

pub use color::{Color, Lab};
pub use error::{Error, ParseColorError, Result};
pub use histogram::{HistogramEntry, HistogramSource, ImageHistogram, MAX_VISIBLE_COLORS};
pub use reducer::{ColorReducer, DEFAULT_MERGE_FACTOR, ReducerOptions, WeightedColor, reduce};
pub use synthesizer::{Palette, PaletteOptions, PaletteSynthesizer, Role};

/// Valuable colors and palettes extracted from one source.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Extraction {
    /// Reduced colors, descending by weight
    pub colors: Vec<WeightedColor>,
    pub palettes: Vec<Palette>,
}

/// Run reduction and palette synthesis over any histogram source.
pub fn extract<S: HistogramSource>(
    source: S,
    reducer_options: &ReducerOptions,
    palette_options: &PaletteOptions,
) -> Result<Extraction> {
    let reducer = ColorReducer::with_options(source, *reducer_options);
    let colors = reducer.valuable_colors()?;
    let palettes = PaletteSynthesizer::from_weighted(&colors).palettes(palette_options)?;
    Ok(Extraction { colors, palettes })
}

/// Decode an encoded image (PNG, JPEG, ...) and extract its colors and palettes.
pub fn extract_from_bytes(
    input: &[u8],
    reducer_options: &ReducerOptions,
    palette_options: &PaletteOptions,
) -> Result<Extraction> {
    let source = ImageHistogram::from_bytes(input)?;
    extract(source, reducer_options, palette_options)
}

/// Extract valuable colors and `count` palettes from an encoded image.
///
/// Returns `{ colors: [{ hex, weight }], palettes: [{ primary, "pri-light",
/// "pri-dark", back, text }] }` with every color as a `#rrggbb` string.
#[wasm_bindgen]
pub fn extract_palettes(
    input: Vec<u8>,
    count: usize,
    merge_factor: f64,
) -> Result<Object, JsValue> {
    let reducer_options = ReducerOptions::default().with_merge_factor(merge_factor);
    let palette_options = PaletteOptions::default().with_count(count);
    let extraction = extract_from_bytes(&input, &reducer_options, &palette_options)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    let colors_js = Array::new();
    for wc in &extraction.colors {
        let entry = Object::new();
        Reflect::set(&entry, &JsValue::from_str("hex"), &JsValue::from_str(&wc.color.to_hex()))?;
        Reflect::set(&entry, &JsValue::from_str("weight"), &JsValue::from_f64(wc.weight))?;
        colors_js.push(&entry);
    }

    let palettes_js = Array::new();
    for palette in &extraction.palettes {
        let entry = Object::new();
        for (role, color) in palette.roles() {
            Reflect::set(
                &entry,
                &JsValue::from_str(role.name()),
                &JsValue::from_str(&color.to_hex()),
            )?;
        }
        palettes_js.push(&entry);
    }

    let result = Object::new();
    Reflect::set(&result, &JsValue::from_str("colors"), &colors_js)?;
    Reflect::set(&result, &JsValue::from_str("palettes"), &palettes_js)?;

    Ok(result)
}

//! Reduce a raw color histogram to the handful of colors worth building a
//! palette from.
//!
//! The pipeline is strictly ordered:
//!
//! 1. drop samples without a color
//! 2. drop achromatic samples (grays, near-white, near-black)
//! 3. renormalize the survivors so their weights sum to 1
//! 4. fold perceptually similar colors into the heavier one
//! 5. prune noise and minor same-family colors
//!
//! Pruned weight is discarded, so the final weights may sum to less than 1.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::cache::ResultCache;
use crate::color::{Color, dither, hue_distance, perceptual_distance, pure};
use crate::error::{Error, Result};
use crate::histogram::{HistogramEntry, HistogramSource, MAX_VISIBLE_COLORS};

pub const DEFAULT_MERGE_FACTOR: f64 = 5.0;

// Achromatic filter
const MIN_SATURATION: f64 = 0.1;
const MAX_LAB_LIGHTNESS: f64 = 83.0;
const MIN_LAB_LIGHTNESS: f64 = 25.0;

/// Hue distance (degrees) within which two colors may merge.
const MERGE_HUE_DISTANCE: f64 = 20.0;

// Pruning
const NOISE_PRUNE_MIN_COLORS: usize = 5;
const NOISE_WEIGHT: f64 = 0.0005;
const MINOR_WEIGHT: f64 = 0.05;
const MINOR_HUE_DISTANCE: f64 = 10.0;

/// A color and the fraction of the image it covers.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct WeightedColor {
    pub weight: f64,
    pub color: Color,
}

impl WeightedColor {
    pub fn new(weight: f64, color: Color) -> Self {
        Self { weight, color }
    }
}

/// Options controlling histogram sampling and clustering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReducerOptions {
    /// Number of samples requested from the histogram source.
    pub max_colors: usize,
    /// Larger values fold more dissimilar colors together.
    pub merge_factor: f64,
}

impl Default for ReducerOptions {
    fn default() -> Self {
        Self {
            max_colors: MAX_VISIBLE_COLORS,
            merge_factor: DEFAULT_MERGE_FACTOR,
        }
    }
}

impl ReducerOptions {
    pub fn with_max_colors(mut self, max_colors: usize) -> Self {
        self.max_colors = max_colors;
        self
    }

    pub fn with_merge_factor(mut self, merge_factor: f64) -> Self {
        self.merge_factor = merge_factor;
        self
    }
}

/// Reduces the histogram of one source, memoizing the result per merge factor.
///
/// # Example
/// ```
/// use image_to_palette_wasm::{Color, ColorReducer, HistogramEntry};
///
/// let histogram = vec![
///     HistogramEntry::new(0.5, Color::from_u8(200, 60, 60)),
///     HistogramEntry::new(0.3, Color::from_u8(40, 40, 220)),
///     HistogramEntry::new(0.2, Color::from_u8(128, 128, 128)),
/// ];
/// let reducer = ColorReducer::new(histogram);
/// let colors = reducer.valuable_colors().unwrap();
/// assert_eq!(colors.len(), 2);
/// ```
pub struct ColorReducer<S> {
    source: S,
    options: ReducerOptions,
    cache: ResultCache<u64, Vec<WeightedColor>>,
}

impl<S: HistogramSource> ColorReducer<S> {
    pub fn new(source: S) -> Self {
        Self::with_options(source, ReducerOptions::default())
    }

    pub fn with_options(source: S, options: ReducerOptions) -> Self {
        Self {
            source,
            options,
            cache: ResultCache::new(),
        }
    }

    pub fn options(&self) -> &ReducerOptions {
        &self.options
    }

    /// The sampled histogram with colorless entries dropped, before any
    /// filtering or merging.
    pub fn visible_colors(&self) -> Result<Vec<WeightedColor>> {
        let histogram = self.source.histogram(self.options.max_colors)?;
        sanitize(&histogram)
    }

    /// Valuable colors using the configured merge factor.
    pub fn valuable_colors(&self) -> Result<Vec<WeightedColor>> {
        self.valuable_colors_with(self.options.merge_factor)
    }

    /// Valuable colors for an explicit merge factor. Each distinct merge
    /// factor is computed at most once; repeated calls return the cached list.
    pub fn valuable_colors_with(&self, merge_factor: f64) -> Result<Vec<WeightedColor>> {
        self.cache.get_or_try_insert_with(merge_factor.to_bits(), || {
            let histogram = self.source.histogram(self.options.max_colors)?;
            reduce(&histogram, merge_factor)
        })
    }
}

/// Run the full reduction over an already sampled histogram.
///
/// The histogram is not re-capped; sources are expected to honor their
/// sample limit. Output is sorted by descending weight.
pub fn reduce(histogram: &[HistogramEntry], merge_factor: f64) -> Result<Vec<WeightedColor>> {
    if !merge_factor.is_finite() || merge_factor < 0.0 {
        return Err(Error::InvalidMergeFactor(merge_factor));
    }

    let visible = sanitize(histogram)?;
    let chromatic = remove_achromatic(visible);
    let normalized = renormalize(chromatic);
    let merged = merge_similar(normalized, merge_factor);
    Ok(prune_minor(merged))
}

/// Validate weights and drop entries that carry no color.
fn sanitize(histogram: &[HistogramEntry]) -> Result<Vec<WeightedColor>> {
    let mut out = Vec::with_capacity(histogram.len());
    for (index, entry) in histogram.iter().enumerate() {
        if !entry.weight.is_finite() || entry.weight < 0.0 {
            return Err(Error::InvalidWeight {
                index,
                weight: entry.weight,
            });
        }
        if let Some(color) = entry.color {
            out.push(WeightedColor::new(entry.weight, color));
        }
    }
    if out.len() < histogram.len() {
        tracing::debug!(dropped = histogram.len() - out.len(), "dropped colorless samples");
    }
    Ok(out)
}

fn is_achromatic(color: Color) -> bool {
    let lightness = color.lab().l;
    color.saturation() < MIN_SATURATION
        || lightness > MAX_LAB_LIGHTNESS
        || lightness < MIN_LAB_LIGHTNESS
}

/// Grays, near-white and near-black carry no hue; their weight is discarded.
fn remove_achromatic(mut colors: Vec<WeightedColor>) -> Vec<WeightedColor> {
    let before = colors.len();
    colors.retain(|wc| !is_achromatic(wc.color));
    tracing::debug!(removed = before - colors.len(), "removed achromatic colors");
    colors
}

fn renormalize(mut colors: Vec<WeightedColor>) -> Vec<WeightedColor> {
    let total: f64 = colors.iter().map(|wc| wc.weight).sum();
    if total <= 0.0 {
        tracing::debug!("no weight left to normalize");
        return Vec::new();
    }
    for wc in &mut colors {
        wc.weight /= total;
    }
    colors
}

fn should_merge(c1: Color, c2: Color, merge_factor: f64) -> bool {
    hue_distance(c1, c2) <= MERGE_HUE_DISTANCE
        && perceptual_distance(c1, c2, true) < merge_factor
}

/// Fold each color into the heaviest similar color it is linked to.
///
/// Pairs are compared on `pure(dither(c))` so sampling noise does not keep
/// near-identical hues apart, but the reported colors are the sampled ones.
fn merge_similar(mut colors: Vec<WeightedColor>, merge_factor: f64) -> Vec<WeightedColor> {
    colors.sort_by(|a, b| a.color.hue().total_cmp(&b.color.hue()));
    let normalized: Vec<Color> = colors
        .iter()
        .map(|wc| pure(dither(wc.color), None, None))
        .collect();

    let mut links = MergeLinks::new(colors.len());
    for i in 0..colors.len() {
        for j in (i + 1)..colors.len() {
            if !should_merge(normalized[i], normalized[j], merge_factor) {
                continue;
            }
            let (heavy, light) = if colors[i].weight >= colors[j].weight {
                (i, j)
            } else {
                (j, i)
            };
            links.link(light, heavy);
        }
    }

    let roots = links.into_roots();
    let mut merged: Vec<WeightedColor> = Vec::with_capacity(colors.len());
    let mut slots: HashMap<String, usize> = HashMap::new();
    for (wc, &root) in colors.iter().zip(&roots) {
        let root = colors[root].color;
        match slots.entry(root.to_hex()) {
            Entry::Occupied(slot) => merged[*slot.get()].weight += wc.weight,
            Entry::Vacant(slot) => {
                slot.insert(merged.len());
                merged.push(WeightedColor::new(wc.weight, root));
            }
        }
    }

    tracing::debug!(
        before = colors.len(),
        after = merged.len(),
        merge_factor,
        "merged similar colors"
    );
    merged
}

/// Drop noise and minor colors that are gradient artifacts of a heavier
/// color of the same family.
fn prune_minor(mut colors: Vec<WeightedColor>) -> Vec<WeightedColor> {
    colors.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    if colors.len() > NOISE_PRUNE_MIN_COLORS {
        colors.retain(|wc| wc.weight >= NOISE_WEIGHT);
    }

    let keep: Vec<bool> = colors
        .iter()
        .map(|wc| {
            wc.weight >= MINOR_WEIGHT
                || !colors.iter().any(|other| {
                    other.weight > wc.weight
                        && hue_distance(wc.color, other.color) <= MINOR_HUE_DISTANCE
                })
        })
        .collect();

    let before = colors.len();
    let kept: Vec<WeightedColor> = colors
        .into_iter()
        .zip(keep)
        .filter_map(|(wc, keep)| keep.then_some(wc))
        .collect();
    tracing::debug!(pruned = before - kept.len(), "pruned minor colors");
    kept
}

/// Merge links between histogram slots: each slot points at the slot its
/// weight folds into, roots point at themselves.
///
/// A slot is only ever linked to a current root other than itself, so chains
/// always end at a root and cannot cycle. Relinking a slot that already folds
/// somewhere moves everything chained through it, so chains are walked as
/// they stand while links are added and only compressed by `into_roots`.
struct MergeLinks {
    parent: Vec<usize>,
}

impl MergeLinks {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn root(&self, mut idx: usize) -> usize {
        while self.parent[idx] != idx {
            idx = self.parent[idx];
        }
        idx
    }

    /// Fold `from` into the root of `into`.
    fn link(&mut self, from: usize, into: usize) {
        let target = self.root(into);
        if target != from {
            tracing::trace!(from, into = target, "link");
            self.parent[from] = target;
        }
    }

    /// Resolve every slot to its root, compressing each chain on the way.
    fn into_roots(mut self) -> Vec<usize> {
        (0..self.parent.len()).map(|idx| self.find(idx)).collect()
    }

    fn find(&mut self, idx: usize) -> usize {
        let root = self.root(idx);
        let mut node = idx;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }
}

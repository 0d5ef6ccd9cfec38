//! Histogram sources: where the raw `(weight, color)` samples come from.

use std::collections::HashSet;

use image::{DynamicImage, GenericImageView, imageops::FilterType};
use kmeans_colors::{Sort, get_kmeans};
use palette::{FromColor, IntoColor, Lab, Srgb};

use crate::color::Color;
use crate::error::Result;

/// Default number of samples requested from a source.
pub const MAX_VISIBLE_COLORS: usize = 128;

/// Longest image side used for sampling.
const SAMPLE_SIDE: u32 = 128;
const KMEANS_MAX_ITER: usize = 20;
const KMEANS_CONVERGE: f32 = 1e-4;
const KMEANS_SEED: u64 = 0;
/// kmeans_colors records cluster assignments as `u8`.
const KMEANS_MAX_CLUSTERS: usize = u8::MAX as usize + 1;

/// One raw histogram sample. A source may report a sample it could not
/// express as a color; those carry `None` and are dropped downstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramEntry {
    pub weight: f64,
    pub color: Option<Color>,
}

impl HistogramEntry {
    pub fn new(weight: f64, color: Color) -> Self {
        Self {
            weight,
            color: Some(color),
        }
    }

    pub fn empty(weight: f64) -> Self {
        Self { weight, color: None }
    }
}

/// Something that can produce a histogram ordered by descending weight with
/// at most `max_colors` entries.
pub trait HistogramSource {
    fn histogram(&self, max_colors: usize) -> Result<Vec<HistogramEntry>>;
}

impl HistogramSource for [HistogramEntry] {
    fn histogram(&self, max_colors: usize) -> Result<Vec<HistogramEntry>> {
        Ok(self.iter().take(max_colors).copied().collect())
    }
}

impl HistogramSource for Vec<HistogramEntry> {
    fn histogram(&self, max_colors: usize) -> Result<Vec<HistogramEntry>> {
        self.as_slice().histogram(max_colors)
    }
}

impl<T: HistogramSource + ?Sized> HistogramSource for &T {
    fn histogram(&self, max_colors: usize) -> Result<Vec<HistogramEntry>> {
        (**self).histogram(max_colors)
    }
}

/// Histogram of a decoded image, quantized with k-means in Lab space.
pub struct ImageHistogram {
    image: DynamicImage,
}

impl ImageHistogram {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn from_bytes(input: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(input)?;
        Ok(Self::new(image))
    }

    /// Opaque pixels of the downsampled image in Lab, plus the number of
    /// distinct opaque colors among them.
    fn lab_pixels(&self) -> (Vec<Lab>, usize) {
        let (orig_w, orig_h) = self.image.dimensions();
        let max_side = orig_w.max(orig_h);

        let working = if max_side > SAMPLE_SIDE {
            let ratio = SAMPLE_SIDE as f32 / max_side as f32;
            let w = ((orig_w as f32) * ratio).round().max(1.0) as u32;
            let h = ((orig_h as f32) * ratio).round().max(1.0) as u32;
            image::imageops::resize(&self.image, w, h, FilterType::Nearest)
        } else {
            self.image.to_rgba8()
        };

        let mut distinct = HashSet::new();
        let pixels = working
            .into_raw()
            .chunks(4)
            .filter(|chunk| chunk[3] != 0)
            .map(|chunk| {
                distinct.insert([chunk[0], chunk[1], chunk[2]]);
                Srgb::new(chunk[0], chunk[1], chunk[2])
                    .into_format::<f32>()
                    .into_color()
            })
            .collect();
        (pixels, distinct.len())
    }
}

impl HistogramSource for ImageHistogram {
    fn histogram(&self, max_colors: usize) -> Result<Vec<HistogramEntry>> {
        // k-means++ seeding needs at least k distinct points
        let (lab_pixels, distinct) = self.lab_pixels();
        let k = max_colors.min(distinct).min(KMEANS_MAX_CLUSTERS);
        if k == 0 {
            tracing::debug!("image has no opaque pixels");
            return Ok(Vec::new());
        }

        let kmeans = get_kmeans(
            k,
            KMEANS_MAX_ITER,
            KMEANS_CONVERGE,
            false,
            &lab_pixels,
            KMEANS_SEED,
        );
        let mut clusters = Lab::sort_indexed_colors(&kmeans.centroids, &kmeans.indices);
        clusters.retain(|c| c.percentage > 0.0);
        clusters.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));

        tracing::debug!(
            pixels = lab_pixels.len(),
            clusters = clusters.len(),
            "quantized image histogram"
        );

        Ok(clusters
            .into_iter()
            .take(max_colors)
            .map(|c| HistogramEntry {
                weight: c.percentage as f64,
                color: centroid_color(c.centroid),
            })
            .collect())
    }
}

/// `None` when the centroid does not land on a finite sRGB value.
fn centroid_color(lab: Lab) -> Option<Color> {
    let rgb: Srgb<f32> = Srgb::from_color(lab);
    let channels = [rgb.red, rgb.green, rgb.blue];
    if channels.iter().any(|c| !c.is_finite()) {
        return None;
    }
    let [r, g, b] = channels.map(|c| c.clamp(0.0, 1.0) as f64);
    Some(Color::new(r, g, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn two_tone_image() -> DynamicImage {
        // 3/4 red, 1/4 blue, plus a transparent column that must be ignored
        let mut img = RgbaImage::new(5, 4);
        for (x, _, px) in img.enumerate_pixels_mut() {
            *px = match x {
                0..=2 => Rgba([220, 30, 30, 255]),
                3 => Rgba([30, 30, 220, 255]),
                _ => Rgba([0, 255, 0, 0]),
            };
        }
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn slice_source_caps_entries() {
        let entries = vec![
            HistogramEntry::new(0.5, Color::WHITE),
            HistogramEntry::empty(0.3),
            HistogramEntry::new(0.2, Color::BLACK),
        ];
        assert_eq!(entries.histogram(2).unwrap().len(), 2);
        assert_eq!(entries.as_slice().histogram(10).unwrap(), entries);
    }

    #[test]
    fn image_histogram_is_sorted_and_skips_transparency() {
        let source = ImageHistogram::new(two_tone_image());
        let hist = source.histogram(MAX_VISIBLE_COLORS).unwrap();

        assert_eq!(hist.len(), 2);
        assert!(hist[0].weight >= hist[1].weight);
        assert!((hist[0].weight - 0.75).abs() < 1e-6);
        assert!((hist[1].weight - 0.25).abs() < 1e-6);

        let [r, _, b] = hist[0].color.unwrap().to_u8();
        assert!(r > 200 && b < 50);
    }

    #[test]
    fn cluster_count_is_capped_for_many_colored_images() {
        // 400 distinct opaque colors, more clusters requested than kmeans can index
        let mut img = RgbaImage::new(20, 20);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgba([(x * 12) as u8, (y * 12) as u8, ((x + y) * 6) as u8, 255]);
        }
        let hist = ImageHistogram::new(DynamicImage::ImageRgba8(img))
            .histogram(300)
            .unwrap();

        assert!(!hist.is_empty());
        assert!(hist.len() <= KMEANS_MAX_CLUSTERS);
        let total: f64 = hist.iter().map(|e| e.weight).sum();
        assert!((total - 1.0).abs() < 1e-4, "total weight {total}");
        assert!(hist.windows(2).all(|w| w[0].weight >= w[1].weight));
    }

    #[test]
    fn fully_transparent_image_has_empty_histogram() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(3, 3));
        let hist = ImageHistogram::new(img).histogram(MAX_VISIBLE_COLORS).unwrap();
        assert!(hist.is_empty());
    }

    #[test]
    fn undecodable_bytes_are_an_error() {
        assert!(ImageHistogram::from_bytes(b"not an image").is_err());
    }
}

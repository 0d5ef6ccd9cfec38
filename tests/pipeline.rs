//! End-to-end tests: histogram in, palettes out, through the public API only.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use image_to_palette_wasm::color::{hue_distance, perceptual_distance};
use image_to_palette_wasm::{
    Color, ColorReducer, Error, HistogramEntry, PaletteOptions, PaletteSynthesizer,
    ReducerOptions, extract, extract_from_bytes,
};

fn scenario_histogram() -> Vec<HistogramEntry> {
    vec![
        HistogramEntry::new(0.5, Color::from_u8(200, 60, 60)),
        HistogramEntry::new(0.3, Color::from_u8(40, 40, 220)),
        HistogramEntry::new(0.2, Color::from_u8(128, 128, 128)),
    ]
}

fn assert_channels_near(color: Color, expected: [u8; 3]) {
    let actual = color.to_u8();
    for (a, e) in actual.iter().zip(expected) {
        assert!(a.abs_diff(e) <= 1, "expected {expected:?}, got {actual:?}");
    }
}

fn encode_png(img: RgbaImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

#[test]
fn gray_is_dropped_and_palette_uses_blue_accent() {
    let reducer = ColorReducer::new(scenario_histogram());
    let colors = reducer.valuable_colors().unwrap();

    assert_eq!(colors.len(), 2);
    assert_eq!(colors[0].color, Color::from_u8(200, 60, 60));
    assert!((colors[0].weight - 0.625).abs() < 1e-12);
    assert_eq!(colors[1].color, Color::from_u8(40, 40, 220));
    assert!((colors[1].weight - 0.375).abs() < 1e-12);

    let palette = PaletteSynthesizer::from_reducer(&reducer).unwrap().palette(None);
    assert_eq!(palette.back, Color::from_u8(200, 60, 60));
    assert_eq!(palette.primary, Color::from_u8(40, 40, 220));
}

#[test]
fn repeated_reduction_is_bit_identical() {
    let reducer = ColorReducer::new(scenario_histogram());
    let first = reducer.valuable_colors().unwrap();
    let second = reducer.valuable_colors().unwrap();
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.weight.to_bits(), b.weight.to_bits());
        assert_eq!(a.color.r.to_bits(), b.color.r.to_bits());
        assert_eq!(a.color.g.to_bits(), b.color.g.to_bits());
        assert_eq!(a.color.b.to_bits(), b.color.b.to_bits());
    }
}

#[test]
fn empty_histogram_yields_preset_palettes() {
    let extraction = extract(
        Vec::<HistogramEntry>::new(),
        &ReducerOptions::default(),
        &PaletteOptions::default().with_count(3),
    )
    .unwrap();

    assert!(extraction.colors.is_empty());
    assert_eq!(extraction.palettes.len(), 3);
    for p in &extraction.palettes {
        assert_eq!(p.back, Color::WHITE);
    }
    let primaries: Vec<Color> = extraction.palettes.iter().map(|p| p.primary).collect();
    assert!((hue_distance(primaries[0], primaries[1]) - 120.0).abs() < 1e-6);
    assert!((hue_distance(primaries[1], primaries[2]) - 120.0).abs() < 1e-6);
    assert!((hue_distance(primaries[0], primaries[2]) - 120.0).abs() < 1e-6);
}

#[test]
fn requested_palettes_have_distinct_primaries() {
    let histogram: Vec<HistogramEntry> = (0..24)
        .map(|i| {
            let hue = i as f64 / 24.0;
            let lightness = 0.35 + 0.01 * (i % 5) as f64;
            HistogramEntry::new(1.0 / (i + 1) as f64, Color::from_hsl(hue, 0.75, lightness))
        })
        .collect();
    let reducer = ColorReducer::new(histogram);
    let synth = PaletteSynthesizer::from_reducer(&reducer).unwrap();

    for count in 1..=6 {
        let palettes = synth
            .palettes(&PaletteOptions::default().with_count(count))
            .unwrap();
        assert_eq!(palettes.len(), count);
        for (i, a) in palettes.iter().enumerate() {
            for b in &palettes[i + 1..] {
                assert!(perceptual_distance(a.primary, b.primary, false) >= 20.0);
            }
        }
    }
}

#[test]
fn rotation_fills_palettes_a_single_accent_cannot() {
    // one accent candidate besides the background, every further slot is rotated
    let synth = PaletteSynthesizer::new(vec![
        Color::from_u8(200, 60, 60),
        Color::from_u8(40, 40, 220),
    ]);

    for count in 1..=6 {
        let palettes = synth
            .palettes(&PaletteOptions::default().with_count(count))
            .unwrap();
        assert_eq!(palettes.len(), count);
        assert!(
            palettes
                .iter()
                .any(|p| p.primary == Color::from_u8(40, 40, 220))
        );
        for (i, a) in palettes.iter().enumerate() {
            assert_eq!(a.back, Color::from_u8(200, 60, 60));
            assert!(perceptual_distance(a.primary, a.back, false) >= 20.0);
            for b in &palettes[i + 1..] {
                assert!(perceptual_distance(a.primary, b.primary, false) >= 20.0);
            }
        }
        for pair in palettes.windows(2) {
            assert!(pair[0].primary.hue() <= pair[1].primary.hue());
        }
    }
}

#[test]
fn pruned_weights_never_exceed_one() {
    let histogram: Vec<HistogramEntry> = (0..40)
        .map(|i| {
            let hue = (i % 12) as f64 / 12.0 + 0.004 * i as f64;
            HistogramEntry::new(0.5_f64.powi(i % 9), Color::from_hsl(hue, 0.6, 0.45))
        })
        .collect();
    let colors = ColorReducer::new(histogram).valuable_colors().unwrap();
    let total: f64 = colors.iter().map(|c| c.weight).sum();
    assert!(!colors.is_empty());
    assert!(total <= 1.0 + 1e-9, "total weight {total}");
}

#[test]
fn image_bytes_run_through_the_whole_pipeline() {
    let mut img = RgbaImage::new(10, 10);
    for (_, y, px) in img.enumerate_pixels_mut() {
        *px = match y {
            0..=4 => Rgba([200, 60, 60, 255]),
            5..=7 => Rgba([40, 40, 220, 255]),
            _ => Rgba([128, 128, 128, 255]),
        };
    }
    let png = encode_png(img);

    let extraction = extract_from_bytes(
        &png,
        &ReducerOptions::default(),
        &PaletteOptions::default().with_count(2),
    )
    .unwrap();

    assert_eq!(extraction.colors.len(), 2);
    assert_channels_near(extraction.colors[0].color, [200, 60, 60]);
    assert!((extraction.colors[0].weight - 0.625).abs() < 1e-6);
    assert_channels_near(extraction.colors[1].color, [40, 40, 220]);

    assert_eq!(extraction.palettes.len(), 2);
    for p in &extraction.palettes {
        assert_channels_near(p.back, [200, 60, 60]);
    }
    assert!(
        extraction
            .palettes
            .iter()
            .any(|p| p.primary.to_u8() == extraction.colors[1].color.to_u8())
    );
}

#[test]
fn bad_input_surfaces_as_errors() {
    let err = extract_from_bytes(
        b"definitely not a png",
        &ReducerOptions::default(),
        &PaletteOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Image(_)));

    let err = extract(
        scenario_histogram(),
        &ReducerOptions::default().with_merge_factor(-1.0),
        &PaletteOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidMergeFactor(_)));

    assert!("#zzzzzz".parse::<Color>().is_err());
}

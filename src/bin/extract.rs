use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use image_to_palette_wasm::{Color, Extraction, PaletteOptions, ReducerOptions, extract_from_bytes};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Extract the valuable colors of images and build UI palettes from them.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// One or more input image paths
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Merge factor; larger values fold more dissimilar colors together
    #[arg(short, long, default_value_t = 5.0)]
    merge_factor: f64,

    /// Number of histogram samples taken from each image
    #[arg(short = 'n', long, default_value_t = 128)]
    max_colors: usize,

    /// Number of palettes to generate
    #[arg(short = 'k', long, default_value_t = 1)]
    count: usize,

    /// Accent color to build the palette around, e.g. "#3366cc"
    #[arg(short, long)]
    accent: Option<Color>,

    /// Ceiling for the accent's lightness (0-1)
    #[arg(short = 'b', long, default_value_t = 1.0)]
    max_brightness: f64,

    /// Print one JSON document per image
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_to_palette_wasm=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let reducer_options = ReducerOptions::default()
        .with_max_colors(args.max_colors)
        .with_merge_factor(args.merge_factor);
    let mut palette_options = PaletteOptions::default()
        .with_count(args.count)
        .with_max_pri_brightness(args.max_brightness);
    palette_options.accent_seed = args.accent;

    for input in &args.inputs {
        let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
        let extraction = extract_from_bytes(&bytes, &reducer_options, &palette_options)
            .with_context(|| format!("extracting colors from {}", input.display()))?;
        tracing::debug!(
            file = %input.display(),
            colors = extraction.colors.len(),
            palettes = extraction.palettes.len(),
            "extracted"
        );

        if args.json {
            println!("{}", serde_json::to_string_pretty(&extraction)?);
        } else {
            print_text(input, &extraction);
        }
    }

    Ok(())
}

fn print_text(input: &Path, extraction: &Extraction) {
    println!("File: {}", input.display());
    for wc in &extraction.colors {
        println!("  - {} {:.2}%", wc.color, wc.weight * 100.0);
    }
    for (i, palette) in extraction.palettes.iter().enumerate() {
        println!("  Palette {}:", i + 1);
        for (role, color) in palette.roles() {
            println!("    {:<9} {}", role.name(), color);
        }
    }
}

//! volnas CLI Module
//!
//! Command-line interface for inspecting the operation registry and
//! checking how an operation transforms a volume.

use clap::{Parser, Subcommand};
use colored::*;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::path::PathBuf;
use std::time::Instant;

use crate::layers::Volume;
use crate::nas::{OpsRegistry, Resolution};
use crate::ops::OpsConfig;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<14} {}", muted(key), val.white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "volnas")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Volumetric operation catalog for neural architecture search")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List registered operations
    List {
        /// Only show one resolution class (down, up, norm)
        #[arg(short, long)]
        group: Option<String>,
    },

    /// Build an operation and apply it to a random volume
    Probe {
        /// Registered operation name
        #[arg(short, long)]
        op: String,

        /// Channel count
        #[arg(short, long, default_value = "16")]
        channels: usize,

        /// Edge length of the cubic input volume
        #[arg(long, default_value = "8")]
        size: usize,

        /// Batch size
        #[arg(short, long, default_value = "1")]
        batch: usize,

        /// Seed for parameters and input
        #[arg(long)]
        seed: Option<u64>,

        /// JSON file with operation defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<OpsConfig> {
    Ok(match path {
        Some(path) => OpsConfig::from_json_file(path)?,
        None => OpsConfig::default(),
    })
}

// ─── List ──────────────────────────────────────────────────────────────────────

pub fn cmd_list(group: Option<&str>) -> anyhow::Result<()> {
    let filter = group.map(str::parse::<Resolution>).transpose()?;
    let registry = OpsRegistry::default();

    section("Operations");
    println!("  {:<16} {:<8} {}", muted("Name"), muted("Class"), muted("Kind"));
    println!("  {}", dim(&"─".repeat(40)));

    for entry in registry.entries() {
        if filter.map_or(false, |r| r != entry.resolution) {
            continue;
        }
        println!(
            "  {:<16} {:<8} {}",
            accent(entry.name),
            entry.resolution.to_string(),
            dim(&entry.kind.to_string())
        );
    }

    println!();
    Ok(())
}

// ─── Probe ─────────────────────────────────────────────────────────────────────

pub fn cmd_probe(
    name: &str,
    channels: usize,
    size: usize,
    batch: usize,
    seed: Option<u64>,
    config_path: Option<&PathBuf>,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(seed) = seed {
        config.seed = Some(seed);
    }
    let registry = OpsRegistry::new(config)?;

    let mut rng = match seed {
        Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
        None => Xoshiro256PlusPlus::from_entropy(),
    };
    let stride = registry.resolution_of(name).map_or(1, |r| r.stride());
    let mut op = registry.create_with_rng(name, channels, stride, &mut rng)?;
    op.eval();

    let input = Volume::from_shape_simple_fn((batch, channels, size, size, size), || {
        rng.gen_range(-1.0..1.0)
    });

    let start = Instant::now();
    let output = op.apply(&input)?;
    let elapsed = start.elapsed();

    let count = output.len().max(1) as f64;
    let mean = output.sum() / count;
    let std = (output.mapv(|v| (v - mean).powi(2)).sum() / count).sqrt();

    section(&format!("Probe {}", name));
    kv("Kind", &op.kind().to_string());
    kv("Ops order", &op.ops_order().to_string());
    kv("Stride", &stride.to_string());
    kv("Parameters", &op.num_parameters().to_string());
    kv("Input", &format!("{:?}", input.shape()));
    kv("Output", &format!("{:?}", output.shape()));
    kv("Output mean", &format!("{:.4}", mean));
    kv("Output std", &format!("{:.4}", std));
    println!();
    println!("  {} applied in {:.2?}", ok("✓"), elapsed);
    println!();

    Ok(())
}

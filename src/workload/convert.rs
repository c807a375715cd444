//! RGB to grayscale conversion, the CPU-bound work function

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::Instant;

use super::{ItemOutcome, ItemSource, WorkItem};

/// Convert one item, optionally writing the result as a binary PGM into
/// `output_dir`. Failures are captured in the outcome.
pub fn convert_to_grayscale(item: &WorkItem, output_dir: Option<&Path>, worker: usize) -> ItemOutcome {
    let started = Instant::now();
    let result = convert(item, output_dir);
    let elapsed = started.elapsed();

    match result {
        Ok(frame) => ItemOutcome {
            name: item.name.clone(),
            worker,
            success: true,
            error: None,
            elapsed,
            checksum: frame.checksum(),
            pixels: frame.pixels.len() as u64,
        },
        Err(e) => {
            tracing::debug!("Conversion of {} failed: {:#}", item.name, e);
            ItemOutcome {
                name: item.name.clone(),
                worker,
                success: false,
                error: Some(format!("{e:#}")),
                elapsed,
                checksum: 0,
                pixels: 0,
            }
        }
    }
}

/// Single-channel 8-bit image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayFrame {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl GrayFrame {
    /// FNV-1a over the pixel bytes.
    pub fn checksum(&self) -> u64 {
        self.pixels.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
        })
    }

    /// Binary PGM (`P5`) encoding.
    pub fn to_pgm(&self) -> Vec<u8> {
        let mut out = format!("P5\n{} {}\n255\n", self.width, self.height).into_bytes();
        out.extend_from_slice(&self.pixels);
        out
    }
}

fn convert(item: &WorkItem, output_dir: Option<&Path>) -> Result<GrayFrame> {
    let (rgb, width) = match &item.source {
        ItemSource::Synthetic { width, height, seed } => {
            (synthetic_rgb(*width as usize, *height as usize, *seed), *width as usize)
        }
        ItemSource::File(path) => {
            let image =
                image::open(path).with_context(|| format!("Failed to read {}", path.display()))?;
            let rgb = image.to_rgb8();
            let width = rgb.width() as usize;
            (rgb.into_raw(), width)
        }
    };

    let frame = grayscale(&rgb, width);
    if frame.pixels.is_empty() {
        anyhow::bail!("{} holds no pixel data", item.name);
    }
    if let Some(dir) = output_dir {
        let target = dir.join(format!("{}_gray.pgm", item.name));
        fs::write(&target, frame.to_pgm())
            .with_context(|| format!("Failed to write {}", target.display()))?;
    }
    Ok(frame)
}

/// Convert packed RGB to luma with weights 0.299, 0.587, 0.114.
///
/// Trailing bytes that do not form a whole pixel are dropped. A `width` of
/// zero picks a near-square layout; the pixel count is then trimmed to fill
/// whole rows.
pub fn grayscale(rgb: &[u8], width: usize) -> GrayFrame {
    let mut pixels: Vec<u8> = rgb
        .chunks_exact(3)
        .map(|px| {
            let luma = 299 * u32::from(px[0]) + 587 * u32::from(px[1]) + 114 * u32::from(px[2]);
            ((luma + 500) / 1000) as u8
        })
        .collect();

    if pixels.is_empty() {
        return GrayFrame {
            width: 0,
            height: 0,
            pixels,
        };
    }
    let width = match width {
        0 => pixels.len().isqrt().max(1),
        w => w,
    };
    let height = pixels.len() / width;
    pixels.truncate(width * height);
    GrayFrame {
        width,
        height,
        pixels,
    }
}

/// Deterministic RGB noise from an xorshift64* generator.
fn synthetic_rgb(width: usize, height: usize, seed: u64) -> Vec<u8> {
    let mut state = seed ^ 0x9e37_79b9_7f4a_7c15;
    if state == 0 {
        state = 1;
    }
    let mut bytes = Vec::with_capacity(width * height * 3);
    while bytes.len() < width * height * 3 {
        state ^= state >> 12;
        state ^= state << 25;
        state ^= state >> 27;
        let word = state.wrapping_mul(0x2545_f491_4f6c_dd1d);
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes.truncate(width * height * 3);
    bytes
}

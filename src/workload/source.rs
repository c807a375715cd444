//! Work sources

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::path::Path;

use super::{ItemSource, WorkItem};

/// File extensions picked up by [`scan_directory`], compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff"];

/// `count` generated frames named `frame-0000`, `frame-0001`, ...
pub fn synthetic(count: usize, width: u32, height: u32, seed: u64) -> Vec<WorkItem> {
    (0..count)
        .map(|index| WorkItem {
            name: format!("frame-{index:04}"),
            source: ItemSource::Synthetic {
                width,
                height,
                seed: seed.wrapping_add(index as u64),
            },
        })
        .collect()
}

/// Image files directly inside `dir`, sorted by file name.
///
/// Formats are not validated here; unreadable files fail later, in the
/// work function.
pub fn scan_directory(dir: &Path) -> Result<Vec<WorkItem>> {
    if !dir.is_dir() {
        anyhow::bail!("Input directory {} does not exist", dir.display());
    }

    let walker = WalkBuilder::new(dir)
        .max_depth(Some(1))
        .standard_filters(false)
        .build();

    let mut items = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to scan {}", dir.display()))?;
        if !entry.file_type().is_some_and(|ft| ft.is_file()) || !has_image_extension(entry.path()) {
            continue;
        }
        let name = entry
            .path()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        items.push(WorkItem {
            name,
            source: ItemSource::File(entry.into_path()),
        });
    }

    items.sort_by(|a, b| match (&a.source, &b.source) {
        (ItemSource::File(a), ItemSource::File(b)) => a.cmp(b),
        _ => a.name.cmp(&b.name),
    });
    tracing::debug!("Found {} image(s) in {}", items.len(), dir.display());
    Ok(items)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

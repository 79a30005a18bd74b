//! Page image loading and discovery
//!
//! Pages are decoded with the `image` crate (JPEG and PNG only) into RGB
//! buffers. Tiling and preprocessing work from those buffers in memory.

use bubble_common::{ProcessingError, Result};
use image::RgbImage;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions accepted as page images (compared case-insensitively)
pub const PAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Whether `path` has a page-image extension
#[must_use]
pub fn is_page_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_lowercase();
            PAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Decode a page image from disk
///
/// Zero-sized images are rejected here so the tiler never sees them.
///
/// # Example
/// ```no_run
/// use bubble_extract_core::image_io::load_page;
/// let page = load_page("chapter_01/001.jpg")?;
/// println!("{}x{}", page.width(), page.height());
/// # Ok::<(), bubble_common::ProcessingError>(())
/// ```
pub fn load_page<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
    let path = path.as_ref();

    if !is_page_image(path) {
        return Err(ProcessingError::UnsupportedFormat(path.display().to_string()));
    }

    let bytes = fs::read(path)?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| ProcessingError::CorruptedFile(format!("{}: {e}", path.display())))?
        .to_rgb8();

    if image.width() == 0 || image.height() == 0 {
        return Err(ProcessingError::CorruptedFile(format!(
            "{}: image has zero size",
            path.display()
        )));
    }

    debug!(
        "Loaded page {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(image)
}

/// List page images in a directory, sorted by file name
///
/// Only direct children are considered. A file matched under several
/// spellings (e.g. `.jpg` and `.JPG` on a case-insensitive filesystem)
/// appears once.
pub fn discover_pages<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(ProcessingError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("not a directory: {}", dir.display()),
        )));
    }

    let mut pages = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_page_image(&path) {
            pages.insert(path);
        }
    }

    // BTreeSet orders by full path; within one directory that is file-name order
    let pages: Vec<PathBuf> = pages.into_iter().collect();
    debug!("Found {} page images in {}", pages.len(), dir.display());
    Ok(pages)
}

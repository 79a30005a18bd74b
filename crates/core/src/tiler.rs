//! Image tiler
//!
//! Long scroll pages can be tens of thousands of pixels tall, far beyond what
//! a recognizer accepts. Pages are cut into horizontal strips no taller than
//! `max_tile_height`, with consecutive strips sharing `overlap` rows so a
//! bubble on a boundary is seen whole by at least one strip.

use crate::error::ConfigError;
use image::{imageops, RgbImage};

/// Half-open row range `[start, end)` of a strip within its page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub start: u32,
    pub end: u32,
}

impl TileRange {
    #[inline]
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.end - self.start
    }
}

/// Row ranges covering a page of `height` rows
///
/// Strips start every `max_tile_height - overlap` rows. The last strip always
/// ends at `height`, and no strip is emitted once the page is covered.
pub fn tile_ranges(
    height: u32,
    max_tile_height: u32,
    overlap: u32,
) -> Result<Vec<TileRange>, ConfigError> {
    if max_tile_height == 0 || overlap >= max_tile_height {
        return Err(ConfigError::InvalidTiling {
            max_tile_height,
            overlap,
        });
    }

    if height == 0 {
        return Ok(Vec::new());
    }
    if height <= max_tile_height {
        return Ok(vec![TileRange {
            start: 0,
            end: height,
        }]);
    }

    let stride = max_tile_height - overlap;
    let mut ranges = Vec::with_capacity((height / stride) as usize + 1);
    let mut start = 0u32;
    loop {
        let end = start.saturating_add(max_tile_height).min(height);
        ranges.push(TileRange { start, end });
        if end == height {
            break;
        }
        start += stride;
    }

    Ok(ranges)
}

/// One strip of a page, owned for the duration of its recognition
#[derive(Debug, Clone)]
pub struct Tile {
    /// 0-based position within the page
    pub index: usize,
    pub range: TileRange,
    pub image: RgbImage,
}

impl Tile {
    /// Offset to add to tile-local y coordinates to get page coordinates
    #[inline]
    #[must_use]
    pub fn offset_y(&self) -> f64 {
        f64::from(self.range.start)
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.range.height()
    }
}

/// Cut `page` into overlapping strips, in top-to-bottom order
pub fn tile_image(
    page: &RgbImage,
    max_tile_height: u32,
    overlap: u32,
) -> Result<Vec<Tile>, ConfigError> {
    let ranges = tile_ranges(page.height(), max_tile_height, overlap)?;
    let width = page.width();

    Ok(ranges
        .into_iter()
        .enumerate()
        .map(|(index, range)| Tile {
            index,
            range,
            image: imageops::crop_imm(page, 0, range.start, width, range.height()).to_image(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn assert_covers(height: u32, max: u32, overlap: u32) {
        let ranges = tile_ranges(height, max, overlap).unwrap();
        assert_eq!(ranges.first().map(|r| r.start), Some(0));
        assert_eq!(ranges.last().map(|r| r.end), Some(height));
        for range in &ranges {
            assert!(range.height() <= max);
            assert!(range.start < range.end);
        }
        for pair in ranges.windows(2) {
            assert_eq!(pair[1].start, pair[0].start + (max - overlap));
            assert_eq!(pair[0].end - pair[1].start, overlap);
        }
    }

    #[test]
    fn test_single_tile_when_short() {
        let ranges = tile_ranges(2500, 3000, 200).unwrap();
        assert_eq!(ranges, vec![TileRange { start: 0, end: 2500 }]);

        let ranges = tile_ranges(3000, 3000, 200).unwrap();
        assert_eq!(ranges, vec![TileRange { start: 0, end: 3000 }]);
    }

    #[test]
    fn test_two_tiles_for_5000px() {
        let ranges = tile_ranges(5000, 3000, 200).unwrap();
        assert_eq!(
            ranges,
            vec![
                TileRange { start: 0, end: 3000 },
                TileRange {
                    start: 2800,
                    end: 5000
                },
            ]
        );
    }

    #[test]
    fn test_no_redundant_tail_tile() {
        // 2800 + 3000 = 5800: the second strip reaches the end exactly
        let ranges = tile_ranges(5800, 3000, 200).unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[1], TileRange { start: 2800, end: 5800 });
    }

    #[test]
    fn test_coverage_properties() {
        for height in [1, 199, 3000, 3001, 5000, 5800, 5801, 12_345, 40_000] {
            assert_covers(height, 3000, 200);
        }
        for height in [10, 11, 99, 100, 1000] {
            assert_covers(height, 10, 9);
            assert_covers(height, 10, 0);
        }
    }

    #[test]
    fn test_empty_page_has_no_tiles() {
        assert!(tile_ranges(0, 3000, 200).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_geometry() {
        assert!(matches!(
            tile_ranges(5000, 200, 200),
            Err(ConfigError::InvalidTiling {
                max_tile_height: 200,
                overlap: 200
            })
        ));
        assert!(tile_ranges(5000, 100, 300).is_err());
        assert!(tile_ranges(5000, 0, 0).is_err());
    }

    #[test]
    fn test_tile_image_crops_rows() {
        let mut page = RgbImage::new(4, 50);
        for y in 0..50 {
            for x in 0..4 {
                page.put_pixel(x, y, Rgb([y as u8, 0, 0]));
            }
        }

        let tiles = tile_image(&page, 30, 10).unwrap();
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0].image.dimensions(), (4, 30));
        assert_eq!(tiles[1].image.dimensions(), (4, 30));
        assert_eq!(tiles[1].index, 1);
        assert_eq!(tiles[1].offset_y(), 20.0);
        // First row of the second tile is page row 20
        assert_eq!(tiles[1].image.get_pixel(0, 0), &Rgb([20, 0, 0]));
        assert_eq!(tiles[1].image.get_pixel(3, 29), &Rgb([49, 0, 0]));
    }
}

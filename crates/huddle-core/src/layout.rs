//! Video tile grid sizing.
//!
//! Brute-forces the column count so that `tile_count` tiles of a fixed
//! aspect ratio cover as much of the container as possible. Tile counts are
//! a handful of call participants, so the linear search is all we need.

/// Aspect ratio of camera tiles.
pub const DEFAULT_ASPECT_RATIO: f64 = 16.0 / 9.0;

/// Padding the call screen keeps around the tile grid, per dimension.
pub const CALL_GRID_PADDING: f64 = 18.0;

/// Best grid found for a container. All-zero when nothing fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileLayout {
    pub cols: u32,
    pub rows: u32,
    pub width: u32,
    pub height: u32,
}

impl TileLayout {
    pub const EMPTY: TileLayout = TileLayout { cols: 0, rows: 0, width: 0, height: 0 };

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }
}

/// Size `tile_count` tiles of `aspect_ratio` inside the container.
///
/// Every column count from 1 to `tile_count` is tried; ties keep the
/// smallest column count. Dimensions are floored so the grid never
/// overflows the container. The arithmetic is plain `f64` division followed
/// by `floor`, so results are reproducible for identical inputs.
pub fn calculate_layout(
    container_width: f64,
    container_height: f64,
    tile_count: u32,
    aspect_ratio: f64,
) -> TileLayout {
    let valid = container_width.is_finite()
        && container_height.is_finite()
        && aspect_ratio.is_finite()
        && container_width > 0.0
        && container_height > 0.0
        && aspect_ratio > 0.0;
    if !valid || tile_count == 0 {
        return TileLayout::EMPTY;
    }

    let mut best = TileLayout::EMPTY;
    for cols in 1..=tile_count {
        let rows = tile_count.div_ceil(cols);
        let h_scale = container_width / (f64::from(cols) * aspect_ratio);
        let v_scale = container_height / f64::from(rows);

        let (width, height) = if h_scale <= v_scale {
            let width = (container_width / f64::from(cols)).floor();
            (width, (width / aspect_ratio).floor())
        } else {
            let height = (container_height / f64::from(rows)).floor();
            ((height * aspect_ratio).floor(), height)
        };

        let candidate = TileLayout {
            cols,
            rows,
            // Both values are non-negative and bounded by the container.
            width: width as u32,
            height: height as u32,
        };
        if candidate.area() > best.area() {
            best = candidate;
        }
    }
    best
}

/// Layout of the call screen: remote tiles plus the local self-view,
/// inside the container minus its padding.
pub fn call_grid(
    container_width: f64,
    container_height: f64,
    remote_count: usize,
    aspect_ratio: f64,
) -> TileLayout {
    let tiles = u32::try_from(remote_count.saturating_add(1)).unwrap_or(u32::MAX);
    calculate_layout(
        container_width - CALL_GRID_PADDING,
        container_height - CALL_GRID_PADDING,
        tiles,
        aspect_ratio,
    )
}

use serde::{Deserialize, Serialize};

/// Smallest drawable chart width; a collapsed container still yields one column.
pub const MIN_CHART_WIDTH: u32 = 1;
pub const MIN_CHART_HEIGHT: u32 = 1;
pub const DEFAULT_DEVICE_PIXEL_RATIO: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margins {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: 16,
            right: 56,
            bottom: 36,
            left: 56,
        }
    }
}

/// Drawable chart rectangle in logical pixels. `right` and `bottom` are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRegion {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ChartRegion {
    pub fn from_pixel_range((x, y): (std::ops::Range<i32>, std::ops::Range<i32>)) -> Self {
        Self {
            left: x.start,
            top: y.start,
            right: x.end,
            bottom: y.end,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Largest absolute edge difference between two regions.
    pub fn max_edge_delta(&self, other: &ChartRegion) -> i32 {
        [
            self.left - other.left,
            self.top - other.top,
            self.right - other.right,
            self.bottom - other.bottom,
        ]
        .into_iter()
        .map(i32::abs)
        .max()
        .unwrap_or(0)
    }
}

/// The single value both layers read to stay aligned.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderGeometry {
    pub logical_width: u32,
    pub logical_height: u32,
    pub device_pixel_ratio: f64,
    pub margins: Margins,
}

impl RenderGeometry {
    /// Build from a container's content box. Layout snaps to whole logical pixels;
    /// a collapsed container is widened to fit the margins plus one chart column.
    pub fn for_container(
        container_width: f64,
        container_height: f64,
        device_pixel_ratio: Option<f64>,
        margins: Margins,
    ) -> Self {
        let min_width = margins.left + margins.right + MIN_CHART_WIDTH;
        let min_height = margins.top + margins.bottom + MIN_CHART_HEIGHT;
        Self {
            logical_width: snap(container_width).max(min_width),
            logical_height: snap(container_height).max(min_height),
            device_pixel_ratio: sanitize_device_pixel_ratio(device_pixel_ratio),
            margins,
        }
    }

    pub fn with_container_size(self, width: f64, height: f64) -> Self {
        Self::for_container(width, height, Some(self.device_pixel_ratio), self.margins)
    }

    pub fn with_device_pixel_ratio(self, device_pixel_ratio: Option<f64>) -> Self {
        Self {
            device_pixel_ratio: sanitize_device_pixel_ratio(device_pixel_ratio),
            ..self
        }
    }

    pub fn physical_width(&self) -> u32 {
        physical_extent(self.logical_width, self.device_pixel_ratio)
    }

    pub fn physical_height(&self) -> u32 {
        physical_extent(self.logical_height, self.device_pixel_ratio)
    }

    pub fn chart_width(&self) -> u32 {
        self.logical_width
            .saturating_sub(self.margins.left + self.margins.right)
            .max(MIN_CHART_WIDTH)
    }

    pub fn chart_height(&self) -> u32 {
        self.logical_height
            .saturating_sub(self.margins.top + self.margins.bottom)
            .max(MIN_CHART_HEIGHT)
    }

    pub fn chart_region(&self) -> ChartRegion {
        let left = self.margins.left as i32;
        let top = self.margins.top as i32;
        ChartRegion {
            left,
            top,
            right: left + self.chart_width() as i32,
            bottom: top + self.chart_height() as i32,
        }
    }
}

/// Missing or nonsensical ratios fall back to 1.0.
pub fn sanitize_device_pixel_ratio(device_pixel_ratio: Option<f64>) -> f64 {
    match device_pixel_ratio {
        Some(dpr) if dpr.is_finite() && dpr > 0.0 => dpr,
        _ => DEFAULT_DEVICE_PIXEL_RATIO,
    }
}

pub fn physical_extent(logical: u32, device_pixel_ratio: f64) -> u32 {
    ((logical as f64 * device_pixel_ratio).round() as u32).max(1)
}

fn snap(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

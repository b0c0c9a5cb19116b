//! Cross-layer alignment checks. Everything here compares what the two layers
//! actually produced, not the geometry they were asked to use.

use serde::{Deserialize, Serialize};

use crate::geometry::ChartRegion;
use crate::overlay::OverlayLayer;
use crate::raster::RasterLayer;

/// Where a layer sits inside the shared container, in logical pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerPlacement {
    pub offset_x: f64,
    pub offset_y: f64,
    /// Any CSS-style transform applied to the layer.
    pub transformed: bool,
}

impl LayerPlacement {
    pub fn is_flush(&self) -> bool {
        self.offset_x == 0.0 && self.offset_y == 0.0 && !self.transformed
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncCheck {
    pub raster_logical: (u32, u32),
    pub overlay_logical: (u32, u32),
    pub raster_physical: (u32, u32),
    pub expected_physical: (u32, u32),
    pub backing_store_len: usize,
    pub expected_backing_store_len: usize,
    pub raster_region: ChartRegion,
    pub overlay_region: ChartRegion,
    pub logical_width_match: bool,
    pub physical_size_match: bool,
    pub margins_match: bool,
    pub plot_region_match: bool,
    pub stacking_ok: bool,
    /// Largest plot-region edge difference in logical pixels.
    pub region_delta: i32,
}

impl SyncCheck {
    pub fn check(
        raster: &RasterLayer,
        overlay: &OverlayLayer,
        raster_placement: LayerPlacement,
        overlay_placement: LayerPlacement,
    ) -> Self {
        let raster_logical = raster.logical_size();
        let mut overlay_logical = overlay.logical_size();
        if let Some(declared) = svg_root_size(overlay.svg()) {
            // The emitted document wins over what the backend reported.
            overlay_logical = declared;
        }

        let geometry = raster.geometry();
        let dpr = geometry.device_pixel_ratio;
        let expected_physical = (
            ((raster_logical.0 as f64 * dpr).round() as u32).max(1),
            ((raster_logical.1 as f64 * dpr).round() as u32).max(1),
        );
        let raster_physical = raster.physical_size();
        let expected_backing_store_len =
            raster_physical.0 as usize * raster_physical.1 as usize * 3;

        let raster_region = raster.chart_region();
        let overlay_region = overlay.plot_region();
        let region_delta = raster_region.max_edge_delta(&overlay_region);

        Self {
            raster_logical,
            overlay_logical,
            raster_physical,
            expected_physical,
            backing_store_len: raster.pixels().len(),
            expected_backing_store_len,
            raster_region,
            overlay_region,
            logical_width_match: raster_logical == overlay_logical,
            physical_size_match: raster_physical == expected_physical
                && raster.pixels().len() == expected_backing_store_len,
            margins_match: geometry.margins == overlay.geometry().margins,
            plot_region_match: region_delta == 0,
            stacking_ok: raster_placement.is_flush() && overlay_placement.is_flush(),
            region_delta,
        }
    }

    pub fn passed(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn failures(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.logical_width_match {
            out.push(format!(
                "logical size mismatch: raster {:?} overlay {:?}",
                self.raster_logical, self.overlay_logical
            ));
        }
        if !self.physical_size_match {
            out.push(format!(
                "backing store {:?} ({} bytes), expected {:?} ({} bytes)",
                self.raster_physical,
                self.backing_store_len,
                self.expected_physical,
                self.expected_backing_store_len
            ));
        }
        if !self.margins_match {
            out.push("layers use different margins".to_string());
        }
        if !self.plot_region_match {
            out.push(format!(
                "plot region off by {} px: raster {:?} overlay {:?}",
                self.region_delta, self.raster_region, self.overlay_region
            ));
        }
        if !self.stacking_ok {
            out.push("layers are offset or transformed within the container".to_string());
        }
        out
    }
}

/// `width`/`height` attributes of the root `<svg>` element.
pub fn svg_root_size(svg: &str) -> Option<(u32, u32)> {
    let start = svg.find("<svg")?;
    let end = start + svg[start..].find('>')?;
    let tag = &svg[start..end];
    Some((attr_u32(tag, "width")?, attr_u32(tag, "height")?))
}

fn attr_u32(tag: &str, name: &str) -> Option<u32> {
    let mut rest = tag;
    while let Some(pos) = rest.find(name) {
        let preceded_by_space = rest[..pos].ends_with(char::is_whitespace);
        let after = &rest[pos + name.len()..];
        rest = after;
        if !preceded_by_space {
            continue;
        }
        let Some(after) = after.strip_prefix('=') else {
            continue;
        };
        let quote = after.chars().next()?;
        if quote != '"' && quote != '\'' {
            continue;
        }
        let value = &after[1..];
        let close = value.find(quote)?;
        return value[..close].trim().parse::<f64>().ok().map(|v| v.round() as u32);
    }
    None
}

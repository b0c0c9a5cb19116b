//! One mounted chart: a series, its geometry, both layers and hover state.

use tracing::debug;

use crate::downsample::largest_triangle_three_buckets;
use crate::geometry::RenderGeometry;
use crate::lookup::{hover_for, pointer_column, ColumnIndex, Hover};
use crate::overlay::OverlayLayer;
use crate::raster::{RasterLayer, RasterStats};
use crate::sync::{LayerPlacement, SyncCheck};
use crate::{RenderConfig, RenderError, StreamPoint};

pub struct RenderSession {
    series: Vec<StreamPoint>,
    display: Vec<StreamPoint>,
    config: RenderConfig,
    geometry: RenderGeometry,
    columns: ColumnIndex,
    raster: RasterLayer,
    overlay: OverlayLayer,
    pointer_x: Option<f64>,
    hover: Option<Hover>,
    raster_placement: LayerPlacement,
    overlay_placement: LayerPlacement,
}

impl RenderSession {
    /// Downsample, lay out and draw both layers for a container of the given
    /// content-box size. `device_pixel_ratio` falls back to 1.0 when missing.
    pub fn new(
        series: Vec<StreamPoint>,
        config: RenderConfig,
        container_width: f64,
        container_height: f64,
        device_pixel_ratio: Option<f64>,
    ) -> Result<Self, RenderError> {
        config.validate()?;
        let geometry = RenderGeometry::for_container(
            container_width,
            container_height,
            device_pixel_ratio,
            config.margins,
        );
        let display = largest_triangle_three_buckets(&series, config.downsample_target);
        let mut session = Self {
            series,
            display,
            config,
            geometry,
            columns: ColumnIndex::default(),
            raster: RasterLayer::new(geometry),
            overlay: OverlayLayer::new(geometry),
            pointer_x: None,
            hover: None,
            raster_placement: LayerPlacement::default(),
            overlay_placement: LayerPlacement::default(),
        };
        session.redraw()?;
        Ok(session)
    }

    pub fn series(&self) -> &[StreamPoint] {
        &self.series
    }

    /// Downsampled series the overlay plots.
    pub fn display_series(&self) -> &[StreamPoint] {
        &self.display
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn geometry(&self) -> &RenderGeometry {
        &self.geometry
    }

    pub fn columns(&self) -> &ColumnIndex {
        &self.columns
    }

    pub fn raster(&self) -> &RasterLayer {
        &self.raster
    }

    pub fn overlay(&self) -> &OverlayLayer {
        &self.overlay
    }

    pub fn hover(&self) -> Option<&Hover> {
        self.hover.as_ref()
    }

    pub fn placements(&self) -> (LayerPlacement, LayerPlacement) {
        (self.raster_placement, self.overlay_placement)
    }

    /// Override where the host positioned each layer.
    pub fn set_placements(&mut self, raster: LayerPlacement, overlay: LayerPlacement) {
        self.raster_placement = raster;
        self.overlay_placement = overlay;
    }

    /// Returns `false` when the snapped geometry is unchanged and nothing was drawn.
    pub fn resize(&mut self, container_width: f64, container_height: f64) -> Result<bool, RenderError> {
        let next = self.geometry.with_container_size(container_width, container_height);
        self.apply_geometry(next)
    }

    pub fn set_device_pixel_ratio(&mut self, device_pixel_ratio: Option<f64>) -> Result<bool, RenderError> {
        let next = self.geometry.with_device_pixel_ratio(device_pixel_ratio);
        self.apply_geometry(next)
    }

    /// Geometry is the only redraw trigger: a new value redraws both layers.
    pub fn apply_geometry(&mut self, geometry: RenderGeometry) -> Result<bool, RenderError> {
        if geometry == self.geometry {
            return Ok(false);
        }
        self.geometry = geometry;
        self.redraw()?;
        Ok(true)
    }

    pub fn set_downsample_target(&mut self, target: usize) -> Result<(), RenderError> {
        if target < 2 {
            return Err(RenderError::InvalidParameter(format!(
                "downsample_target must be at least 2, got {target}"
            )));
        }
        if target == self.config.downsample_target {
            return Ok(());
        }
        self.config.downsample_target = target;
        self.display = largest_triangle_three_buckets(&self.series, target);
        self.redraw_overlay()
    }

    /// Pointer resolution only; no drawing.
    pub fn lookup(&self, container_x: f64) -> Option<Hover> {
        let column = pointer_column(&self.geometry, container_x)?;
        let index = self.columns.get(column as usize)?;
        Some(hover_for(&self.series, index, column, &self.config.palette))
    }

    /// Update the tooltip for a container-relative pointer x. The overlay is redrawn
    /// only when the resolved sample changes.
    pub fn pointer_move(&mut self, container_x: f64) -> Result<Option<Hover>, RenderError> {
        let hover = self.lookup(container_x);
        self.pointer_x = hover.map(|_| container_x);
        if hover != self.hover {
            self.hover = hover;
            self.redraw_overlay()?;
        }
        Ok(hover)
    }

    pub fn pointer_leave(&mut self) -> Result<(), RenderError> {
        self.pointer_x = None;
        if self.hover.take().is_some() {
            self.redraw_overlay()?;
        }
        Ok(())
    }

    pub fn redraw_overlay(&mut self) -> Result<(), RenderError> {
        self.overlay.draw(
            self.geometry,
            &self.display,
            self.hover.as_ref(),
            &self.config.palette,
        )
    }

    fn redraw_raster(&mut self) -> Result<RasterStats, RenderError> {
        self.columns = ColumnIndex::build(&self.series, self.geometry.chart_width());
        self.raster.draw(
            self.geometry,
            &self.series,
            &self.columns,
            &self.config.palette,
            self.config.gradient_alpha,
        )
    }

    fn redraw(&mut self) -> Result<(), RenderError> {
        let stats = self.redraw_raster()?;
        // A held pointer keeps its container x; its column may now be a different sample.
        self.hover = self.pointer_x.and_then(|x| self.lookup(x));
        self.redraw_overlay()?;
        debug!(
            logical_width = self.geometry.logical_width,
            dpr = self.geometry.device_pixel_ratio,
            bands = stats.bands,
            "session redrawn"
        );
        Ok(())
    }

    pub fn sync_check(&self) -> SyncCheck {
        SyncCheck::check(
            &self.raster,
            &self.overlay,
            self.raster_placement,
            self.overlay_placement,
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    Move(f64),
    Leave,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameOutcome {
    pub redrew_raster: bool,
    pub redrew_overlay: bool,
    /// Events dropped because a later event of the same kind arrived first.
    pub coalesced_events: usize,
}

/// Collects host events between frames; the latest event of each kind wins.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    size: Option<(f64, f64)>,
    device_pixel_ratio: Option<Option<f64>>,
    pointer: Option<PointerEvent>,
    coalesced: usize,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_resize(&mut self, container_width: f64, container_height: f64) {
        if self.size.replace((container_width, container_height)).is_some() {
            self.coalesced += 1;
        }
    }

    pub fn request_device_pixel_ratio(&mut self, device_pixel_ratio: Option<f64>) {
        if self.device_pixel_ratio.replace(device_pixel_ratio).is_some() {
            self.coalesced += 1;
        }
    }

    pub fn request_pointer(&mut self, event: PointerEvent) {
        if self.pointer.replace(event).is_some() {
            self.coalesced += 1;
        }
    }

    pub fn has_pending(&self) -> bool {
        self.size.is_some() || self.device_pixel_ratio.is_some() || self.pointer.is_some()
    }

    /// Apply everything pending with at most one redraw of each layer.
    pub fn run_frame(&mut self, session: &mut RenderSession) -> Result<FrameOutcome, RenderError> {
        let mut outcome = FrameOutcome {
            coalesced_events: std::mem::take(&mut self.coalesced),
            ..FrameOutcome::default()
        };

        let mut geometry = *session.geometry();
        if let Some((width, height)) = self.size.take() {
            geometry = geometry.with_container_size(width, height);
        }
        if let Some(dpr) = self.device_pixel_ratio.take() {
            geometry = geometry.with_device_pixel_ratio(dpr);
        }
        let pointer = self.pointer.take();

        if geometry != *session.geometry() {
            // Pointer state first so the single redraw already carries the tooltip.
            match pointer {
                Some(PointerEvent::Move(x)) => session.pointer_x = Some(x),
                Some(PointerEvent::Leave) => session.pointer_x = None,
                None => {}
            }
            session.apply_geometry(geometry)?;
            outcome.redrew_raster = true;
            outcome.redrew_overlay = true;
            return Ok(outcome);
        }

        let before = session.hover;
        match pointer {
            Some(PointerEvent::Move(x)) => {
                session.pointer_move(x)?;
            }
            Some(PointerEvent::Leave) => session.pointer_leave()?,
            None => {}
        }
        outcome.redrew_overlay = before != session.hover;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize) -> Vec<StreamPoint> {
        (0..n)
            .map(|i| {
                let e = i as f64 / n as f64;
                StreamPoint::new(i as u32, 100.0 + 70.0 * e, 300.0, 3.3, 50.0, 0.0, 170.0, e)
            })
            .collect()
    }

    fn session(n: usize) -> RenderSession {
        RenderSession::new(series(n), RenderConfig::default(), 768.0, 200.0, Some(1.5)).unwrap()
    }

    #[test]
    fn new_session_downsamples_and_passes_sync() {
        let s = session(3601);
        assert_eq!(s.display_series().len(), 500);
        assert_eq!(s.series().len(), 3601);
        assert_eq!(s.columns().len(), s.geometry().chart_width() as usize);
        assert!(s.sync_check().passed());
    }

    #[test]
    fn resize_redraws_only_on_change() {
        let mut s = session(1000);
        assert!(!s.resize(768.2, 200.0).unwrap());
        assert!(s.resize(1200.0, 200.0).unwrap());
        assert_eq!(s.raster().logical_size().0, 1200);
        assert_eq!(s.overlay().logical_size().0, 1200);
        assert!(s.set_device_pixel_ratio(Some(3.0)).unwrap());
        assert_eq!(s.raster().physical_size(), (3600, 600));
        assert!(s.sync_check().passed());
    }

    #[test]
    fn pointer_hover_tracks_and_clears() {
        let mut s = session(1000);
        let hover = s.pointer_move(300.0).unwrap().unwrap();
        assert_eq!(Some(&hover), s.hover());
        assert_eq!(Some(&hover), s.overlay().hover());
        s.pointer_leave().unwrap();
        assert!(s.hover().is_none());
        assert!(s.overlay().hover().is_none());
    }

    #[test]
    fn downsample_target_changes_display_series() {
        let mut s = session(2000);
        s.set_downsample_target(120).unwrap();
        assert_eq!(s.display_series().len(), 120);
        assert_eq!(s.overlay().trace_points(), 120);
        assert!(s.set_downsample_target(1).is_err());
    }

    #[test]
    fn scheduler_coalesces_to_latest_event() {
        let mut s = session(1000);
        let mut frames = FrameScheduler::new();
        frames.request_resize(900.0, 200.0);
        frames.request_resize(1000.0, 200.0);
        frames.request_resize(1100.0, 200.0);
        frames.request_pointer(PointerEvent::Move(100.0));
        frames.request_pointer(PointerEvent::Move(400.0));
        assert!(frames.has_pending());
        let outcome = frames.run_frame(&mut s).unwrap();
        assert!(outcome.redrew_raster);
        assert_eq!(outcome.coalesced_events, 3);
        assert_eq!(s.geometry().logical_width, 1100);
        assert_eq!(s.hover().map(|h| h.column), pointer_column(s.geometry(), 400.0));
        assert!(!frames.has_pending());

        let idle = frames.run_frame(&mut s).unwrap();
        assert_eq!(idle, FrameOutcome::default());
    }

    #[test]
    fn tiny_series_renders_cleared_surface() {
        let s = RenderSession::new(series(1), RenderConfig::default(), 400.0, 160.0, None).unwrap();
        assert!(s.raster().pixels().iter().all(|&b| b == 255));
        assert_eq!(s.overlay().trace_points(), 0);
        assert!(s.sync_check().passed());
    }
}

//! Effort-gradient raster layer.
//!
//! The backing store is an RGB buffer at physical resolution; every draw call is
//! issued in logical coordinates through [`LogicalScaleBackend`], which applies the
//! device pixel ratio uniformly.

use plotters::prelude::*;
use plotters_backend::{
    BackendColor, BackendCoord, BackendStyle, BackendTextStyle, DrawingErrorKind,
};
use tracing::debug;

use crate::color::ColorTable;
use crate::geometry::{ChartRegion, RenderGeometry};
use crate::lookup::ColumnIndex;
use crate::{RenderError, StreamPoint};

/// Color the backing store is cleared to before each draw.
pub const CLEAR_COLOR: RGBColor = RGBColor(255, 255, 255);

const BYTES_PER_PIXEL: usize = 3;

/// Wraps a physical-resolution backend and exposes it at logical size.
pub struct LogicalScaleBackend<DB> {
    inner: DB,
    scale: f64,
    logical: (u32, u32),
}

impl<DB> LogicalScaleBackend<DB> {
    pub fn new(inner: DB, scale: f64, logical: (u32, u32)) -> Self {
        Self {
            inner,
            scale,
            logical,
        }
    }

    fn point(&self, (x, y): BackendCoord) -> BackendCoord {
        (self.edge(x), self.edge(y))
    }

    fn edge(&self, v: i32) -> i32 {
        (v as f64 * self.scale).round() as i32
    }

    /// Half-open physical span `[start, end)` covered by logical cells `from..=to`.
    /// Adjacent logical cells map to adjacent, non-overlapping spans; below a ratio
    /// of 1.0 a cell may collapse to an empty span.
    fn span(&self, from: i32, to: i32) -> (i32, i32) {
        let (lo, hi) = (from.min(to), from.max(to));
        (self.edge(lo), self.edge(hi + 1))
    }

    /// Filled rectangles are handed to the inner backend with an exclusive
    /// bottom-right corner, outlines with an inclusive one.
    fn fill_cells<S: BackendStyle>(
        &mut self,
        upper_left: BackendCoord,
        bottom_right: BackendCoord,
        style: &S,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>>
    where
        DB: DrawingBackend,
    {
        let (x0, x1) = self.span(upper_left.0, bottom_right.0);
        let (y0, y1) = self.span(upper_left.1, bottom_right.1);
        if x0 >= x1 || y0 >= y1 {
            return Ok(());
        }
        self.inner.draw_rect((x0, y0), (x1, y1), style, true)
    }
}

impl<DB: DrawingBackend> DrawingBackend for LogicalScaleBackend<DB> {
    type ErrorType = DB::ErrorType;

    fn get_size(&self) -> (u32, u32) {
        self.logical
    }

    fn ensure_prepared(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.ensure_prepared()
    }

    fn present(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.present()
    }

    fn draw_pixel(
        &mut self,
        point: BackendCoord,
        color: BackendColor,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.fill_cells(point, point, &color)
    }

    fn draw_line<S: BackendStyle>(
        &mut self,
        from: BackendCoord,
        to: BackendCoord,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        let (from, to) = (self.point(from), self.point(to));
        self.inner.draw_line(from, to, style)
    }

    fn draw_rect<S: BackendStyle>(
        &mut self,
        upper_left: BackendCoord,
        bottom_right: BackendCoord,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        if fill {
            return self.fill_cells(upper_left, bottom_right, style);
        }
        let (x0, x1) = self.span(upper_left.0, bottom_right.0);
        let (y0, y1) = self.span(upper_left.1, bottom_right.1);
        self.inner
            .draw_rect((x0, y0), ((x1 - 1).max(x0), (y1 - 1).max(y0)), style, false)
    }

    fn draw_path<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        path: I,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        let scaled: Vec<BackendCoord> = path.into_iter().map(|p| self.point(p)).collect();
        self.inner.draw_path(scaled, style)
    }

    fn draw_circle<S: BackendStyle>(
        &mut self,
        center: BackendCoord,
        radius: u32,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        let radius = (radius as f64 * self.scale).round() as u32;
        let center = self.point(center);
        self.inner.draw_circle(center, radius, style, fill)
    }

    fn fill_polygon<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        vert: I,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        let scaled: Vec<BackendCoord> = vert.into_iter().map(|p| self.point(p)).collect();
        self.inner.fill_polygon(scaled, style)
    }

    fn draw_text<TStyle: BackendTextStyle>(
        &mut self,
        text: &str,
        style: &TStyle,
        pos: BackendCoord,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        let pos = self.point(pos);
        self.inner.draw_text(text, style, pos)
    }

    fn estimate_text_size<TStyle: BackendTextStyle>(
        &self,
        text: &str,
        style: &TStyle,
    ) -> Result<(u32, u32), DrawingErrorKind<Self::ErrorType>> {
        self.inner.estimate_text_size(text, style)
    }

    fn blit_bitmap(
        &mut self,
        pos: BackendCoord,
        (iw, ih): (u32, u32),
        src: &[u8],
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        let pos = self.point(pos);
        self.inner.blit_bitmap(pos, (iw, ih), src)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RasterStats {
    pub columns: u32,
    pub bands: usize,
}

/// Exclusive owner of the pixel backing store.
pub struct RasterLayer {
    geometry: RenderGeometry,
    pixels: Vec<u8>,
    last: RasterStats,
}

impl RasterLayer {
    pub fn new(geometry: RenderGeometry) -> Self {
        let mut layer = Self {
            geometry,
            pixels: Vec::new(),
            last: RasterStats::default(),
        };
        layer.allocate(geometry);
        layer
    }

    pub fn geometry(&self) -> &RenderGeometry {
        &self.geometry
    }

    /// Displayed size, independent of pixel density.
    pub fn logical_size(&self) -> (u32, u32) {
        (self.geometry.logical_width, self.geometry.logical_height)
    }

    /// Backing store dimensions.
    pub fn physical_size(&self) -> (u32, u32) {
        (self.geometry.physical_width(), self.geometry.physical_height())
    }

    pub fn chart_region(&self) -> ChartRegion {
        self.geometry.chart_region()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn last_stats(&self) -> RasterStats {
        self.last
    }

    pub fn pixel(&self, px: u32, py: u32) -> Option<RGBColor> {
        let (w, h) = self.physical_size();
        if px >= w || py >= h {
            return None;
        }
        let offset = (py as usize * w as usize + px as usize) * BYTES_PER_PIXEL;
        let rgb = self.pixels.get(offset..offset + BYTES_PER_PIXEL)?;
        Some(RGBColor(rgb[0], rgb[1], rgb[2]))
    }

    /// Pixel under a logical position, e.g. the center of a column.
    pub fn pixel_at_logical(&self, x: f64, y: f64) -> Option<RGBColor> {
        if x < 0.0 || y < 0.0 {
            return None;
        }
        let dpr = self.geometry.device_pixel_ratio;
        self.pixel((x * dpr).floor() as u32, (y * dpr).floor() as u32)
    }

    fn allocate(&mut self, geometry: RenderGeometry) {
        self.geometry = geometry;
        let len = geometry.physical_width() as usize
            * geometry.physical_height() as usize
            * BYTES_PER_PIXEL;
        self.pixels.resize(len, 0);
    }

    fn clear(&mut self) {
        for px in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&[CLEAR_COLOR.0, CLEAR_COLOR.1, CLEAR_COLOR.2]);
        }
    }

    /// Clear and repaint the gradient. One band per logical chart column; runs of
    /// columns sharing a color are filled as one rectangle.
    pub fn draw(
        &mut self,
        geometry: RenderGeometry,
        points: &[StreamPoint],
        columns: &ColumnIndex,
        palette: &ColorTable,
        alpha: f64,
    ) -> Result<RasterStats, RenderError> {
        if geometry != self.geometry || self.pixels.is_empty() {
            self.allocate(geometry);
        }
        self.clear();

        if points.len() < 2 || columns.is_empty() {
            self.last = RasterStats::default();
            return Ok(self.last);
        }

        let colors: Vec<RGBColor> = columns
            .iter()
            .map(|idx| palette.map(points[idx].effort).to_rgb())
            .collect();

        let (pw, ph) = self.physical_size();
        let region = geometry.chart_region();
        let mut bands = 0usize;
        {
            let backend = LogicalScaleBackend::new(
                BitMapBackend::with_buffer(&mut self.pixels, (pw, ph)),
                geometry.device_pixel_ratio,
                (geometry.logical_width, geometry.logical_height),
            );
            let root = backend.into_drawing_area();
            let mut start = 0usize;
            while start < colors.len() {
                let color = colors[start];
                let mut end = start + 1;
                while end < colors.len() && colors[end] == color {
                    end += 1;
                }
                let x0 = region.left + start as i32;
                let x1 = region.left + end as i32 - 1;
                root.draw(&Rectangle::new(
                    [(x0, region.top), (x1, region.bottom - 1)],
                    color.mix(alpha).filled(),
                ))
                .map_err(|e| RenderError::Backend(e.to_string()))?;
                bands += 1;
                start = end;
            }
            root.present()
                .map_err(|e| RenderError::Backend(e.to_string()))?;
        }

        self.last = RasterStats {
            columns: colors.len() as u32,
            bands,
        };
        debug!(
            columns = self.last.columns,
            bands,
            physical_width = pw,
            physical_height = ph,
            "raster redrawn"
        );
        Ok(self.last)
    }
}

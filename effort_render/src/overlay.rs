//! Vector overlay: axes, grid, heart-rate and pace traces, elevation silhouette and
//! the hover tooltip, emitted as an SVG scene at the raster's logical size.

use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use tracing::debug;

use crate::color::ColorTable;
use crate::geometry::{ChartRegion, RenderGeometry};
use crate::lookup::{format_clock, format_pace, Hover, TimeAxis};
use crate::{RenderError, StreamPoint};

const HEART_RATE_COLOR: RGBColor = RGBColor(200, 0, 100);
const PACE_COLOR: RGBColor = RGBColor(30, 110, 200);
const ELEVATION_COLOR: RGBColor = RGBColor(90, 90, 90);
/// Fraction of the heart-rate axis the elevation silhouette may occupy.
const ELEVATION_SHARE: f64 = 0.35;

const TOOLTIP_WIDTH: i32 = 136;
const TOOLTIP_LINE_HEIGHT: i32 = 15;

/// Exclusive owner of the overlay scene.
pub struct OverlayLayer {
    geometry: RenderGeometry,
    svg: String,
    surface_size: (u32, u32),
    plot_region: ChartRegion,
    trace_points: usize,
    hover: Option<Hover>,
}

impl OverlayLayer {
    pub fn new(geometry: RenderGeometry) -> Self {
        Self {
            geometry,
            svg: String::new(),
            surface_size: (geometry.logical_width, geometry.logical_height),
            plot_region: geometry.chart_region(),
            trace_points: 0,
            hover: None,
        }
    }

    pub fn geometry(&self) -> &RenderGeometry {
        &self.geometry
    }

    /// Size of the drawn surface as reported by the SVG backend.
    pub fn logical_size(&self) -> (u32, u32) {
        self.surface_size
    }

    /// Plotting rectangle as laid out by the chart builder.
    pub fn plot_region(&self) -> ChartRegion {
        self.plot_region
    }

    pub fn svg(&self) -> &str {
        &self.svg
    }

    pub fn trace_points(&self) -> usize {
        self.trace_points
    }

    pub fn hover(&self) -> Option<&Hover> {
        self.hover.as_ref()
    }

    /// Rebuild the scene. The overlay never sizes itself: width, height and margins
    /// come from `geometry`.
    pub fn draw(
        &mut self,
        geometry: RenderGeometry,
        series: &[StreamPoint],
        hover: Option<&Hover>,
        palette: &ColorTable,
    ) -> Result<(), RenderError> {
        let mut svg = String::new();
        let (surface_size, plot_region) = {
            let root = SVGBackend::with_string(
                &mut svg,
                (geometry.logical_width, geometry.logical_height),
            )
            .into_drawing_area();
            let surface_size = root.dim_in_pixel();
            let plot_region = draw_scene(&root, &geometry, series, hover, palette)?;
            root.present().map_err(backend_err)?;
            (surface_size, plot_region)
        };

        self.geometry = geometry;
        self.svg = svg;
        self.surface_size = surface_size;
        self.plot_region = plot_region;
        self.trace_points = if series.len() < 2 { 0 } else { series.len() };
        self.hover = hover.copied();
        debug!(
            width = surface_size.0,
            points = self.trace_points,
            hover = self.hover.is_some(),
            "overlay redrawn"
        );
        Ok(())
    }
}

fn backend_err<E: std::error::Error + Send + Sync>(err: DrawingAreaErrorKind<E>) -> RenderError {
    RenderError::Backend(err.to_string())
}

fn padded_range(values: impl Iterator<Item = f64>, fallback: (f64, f64)) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() || !hi.is_finite() {
        return fallback;
    }
    let span = hi - lo;
    if span < 1e-6 {
        return (lo - 1.0, hi + 1.0);
    }
    (lo - span * 0.05, hi + span * 0.05)
}

fn draw_scene<DB>(
    root: &DrawingArea<DB, Shift>,
    geometry: &RenderGeometry,
    series: &[StreamPoint],
    hover: Option<&Hover>,
    palette: &ColorTable,
) -> Result<ChartRegion, RenderError>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (t_min, t_max) = match TimeAxis::of(series) {
        Some(axis) if axis.range() > 0.0 => (axis.t_min, axis.t_max),
        Some(axis) => (axis.t_min, axis.t_min + 1.0),
        None => (0.0, 1.0),
    };
    let (hr_lo, hr_hi) = padded_range(series.iter().map(|p| p.heart_rate), (60.0, 200.0));
    let (pace_lo, pace_hi) = padded_range(
        series.iter().map(|p| p.pace).filter(|p| *p > 0.0),
        (180.0, 480.0),
    );

    let m = geometry.margins;
    let mut chart = ChartBuilder::on(root)
        .margin_top(m.top as i32)
        .set_label_area_size(LabelAreaPosition::Left, m.left as i32)
        .set_label_area_size(LabelAreaPosition::Right, m.right as i32)
        .set_label_area_size(LabelAreaPosition::Bottom, m.bottom as i32)
        .build_cartesian_2d(t_min..t_max, hr_lo..hr_hi)
        .map_err(backend_err)?
        .set_secondary_coord(t_min..t_max, pace_lo..pace_hi);

    let plot_region = ChartRegion::from_pixel_range(chart.plotting_area().get_pixel_range());

    if series.len() < 2 {
        return Ok(plot_region);
    }

    let axis_font = FontDesc::new(FontFamily::SansSerif, 12.0, FontStyle::Normal);

    chart
        .configure_mesh()
        .x_labels(6)
        .y_labels(5)
        .x_label_formatter(&|t| format_clock(*t))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .y_desc("Heart rate (bpm)")
        .light_line_style(&BLACK.mix(0.04))
        .bold_line_style(&BLACK.mix(0.10))
        .axis_style(&BLACK.mix(0.45))
        .label_style(axis_font.clone().color(&BLACK.mix(0.8)))
        .draw()
        .map_err(backend_err)?;

    chart
        .configure_secondary_axes()
        .y_labels(5)
        .y_label_formatter(&|v| format_pace(*v))
        .y_desc("Pace (/km)")
        .axis_style(&BLACK.mix(0.45))
        .label_style(axis_font.clone().color(&PACE_COLOR))
        .draw()
        .map_err(backend_err)?;

    let (alt_lo, alt_hi) = padded_range(series.iter().map(|p| p.altitude), (0.0, 1.0));
    let alt_span = (alt_hi - alt_lo).max(1e-6);
    let lift = |alt: f64| hr_lo + (alt - alt_lo) / alt_span * (hr_hi - hr_lo) * ELEVATION_SHARE;

    chart
        .draw_series(
            AreaSeries::new(
                series.iter().map(|p| (p.time as f64, lift(p.altitude))),
                hr_lo,
                ELEVATION_COLOR.mix(0.18).filled(),
            )
            .border_style(ELEVATION_COLOR.mix(0.45).stroke_width(1)),
        )
        .map_err(backend_err)?;

    chart
        .draw_series(LineSeries::new(
            series.iter().map(|p| (p.time as f64, p.heart_rate)),
            HEART_RATE_COLOR.stroke_width(2),
        ))
        .map_err(backend_err)?;

    chart
        .draw_secondary_series(LineSeries::new(
            series
                .iter()
                .filter(|p| p.pace > 0.0)
                .map(|p| (p.time as f64, p.pace)),
            PACE_COLOR.stroke_width(2),
        ))
        .map_err(backend_err)?;

    if let Some(hover) = hover {
        let t = hover.sample.time as f64;
        let swatch = palette.map(hover.sample.effort).to_rgb();
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(t, hr_lo), (t, hr_hi)],
                BLACK.mix(0.5).stroke_width(1),
            )))
            .map_err(backend_err)?;
        chart
            .draw_series(std::iter::once(Circle::new(
                (t, hover.sample.heart_rate.clamp(hr_lo, hr_hi)),
                4,
                swatch.filled(),
            )))
            .map_err(backend_err)?;
        let anchor = chart.backend_coord(&(t, hr_hi));
        draw_tooltip(root, anchor, &plot_region, hover, swatch, &axis_font)?;
    }

    Ok(plot_region)
}

fn draw_tooltip<DB>(
    root: &DrawingArea<DB, Shift>,
    anchor: (i32, i32),
    region: &ChartRegion,
    hover: &Hover,
    swatch: RGBColor,
    font: &FontDesc,
) -> Result<(), RenderError>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let lines = hover.tooltip_lines();
    let height = TOOLTIP_LINE_HEIGHT * lines.len() as i32 + 10;
    let mut x = anchor.0 + 8;
    if x + TOOLTIP_WIDTH > region.right {
        x = anchor.0 - 8 - TOOLTIP_WIDTH;
    }
    let x = x.max(region.left);
    let y = region.top + 4;

    root.draw(&Rectangle::new(
        [(x, y), (x + TOOLTIP_WIDTH, y + height)],
        WHITE.mix(0.92).filled(),
    ))
    .map_err(backend_err)?;
    root.draw(&Rectangle::new(
        [(x, y), (x + TOOLTIP_WIDTH, y + height)],
        BLACK.mix(0.35).stroke_width(1),
    ))
    .map_err(backend_err)?;
    root.draw(&Rectangle::new([(x + 6, y + 7), (x + 16, y + 17)], swatch.filled()))
        .map_err(backend_err)?;
    for (i, line) in lines.into_iter().enumerate() {
        root.draw(&Text::new(
            line,
            (x + 22, y + 5 + i as i32 * TOOLTIP_LINE_HEIGHT),
            font.clone().color(&BLACK),
        ))
        .map_err(backend_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Margins;
    use crate::lookup::InteractionLookup;

    fn session(n: usize) -> Vec<StreamPoint> {
        (0..n)
            .map(|i| {
                let e = 0.5 + 0.4 * (i as f64 / 60.0).sin();
                StreamPoint::new(
                    i as u32,
                    120.0 + 50.0 * e,
                    240.0 + 60.0 * (1.0 - e),
                    4.0,
                    100.0 + 10.0 * (i as f64 / 300.0).sin(),
                    0.0,
                    175.0,
                    e,
                )
            })
            .collect()
    }

    #[test]
    fn overlay_takes_raster_geometry_and_margins() {
        let geometry = RenderGeometry::for_container(960.0, 320.0, Some(2.0), Margins::default());
        let mut layer = OverlayLayer::new(geometry);
        layer
            .draw(geometry, &session(500), None, &ColorTable::default())
            .unwrap();
        assert_eq!(layer.logical_size(), (960, 320));
        assert_eq!(layer.plot_region(), geometry.chart_region());
        assert!(layer.svg().starts_with("<svg"));
        assert_eq!(layer.trace_points(), 500);
    }

    #[test]
    fn tooltip_swatch_uses_the_shared_palette() {
        let geometry = RenderGeometry::for_container(1200.0, 320.0, None, Margins::default());
        let points = session(900);
        let palette = ColorTable::default();
        let hover = InteractionLookup::new(&points, geometry, &palette)
            .at_container_x(400.0)
            .unwrap();
        let mut layer = OverlayLayer::new(geometry);
        layer.draw(geometry, &points, Some(&hover), &palette).unwrap();
        let (r, g, b) = hover.color.to_rgb().rgb();
        let rgb_attr = format!("rgb({},{},{})", r, g, b);
        let hex_attr = hover.color.css_hex();
        let svg = layer.svg().to_ascii_lowercase();
        assert!(svg.contains(&rgb_attr) || svg.contains(&hex_attr));
        assert!(svg.contains("hr "));
        assert_eq!(layer.hover(), Some(&hover));
    }

    #[test]
    fn near_empty_series_draws_no_traces() {
        let geometry = RenderGeometry::for_container(375.0, 200.0, None, Margins::default());
        let mut layer = OverlayLayer::new(geometry);
        let one = session(1);
        layer.draw(geometry, &one, None, &ColorTable::default()).unwrap();
        assert_eq!(layer.trace_points(), 0);
        assert_eq!(layer.plot_region(), geometry.chart_region());
        assert!(!layer.svg().contains("<polyline"));
    }
}

//! Pointer → sample resolution.
//!
//! Reverse arithmetic (pixel → time → index) rather than a spatial index: O(1) per
//! query. [`ColumnIndex`] precomputes the same answer per logical column once per
//! redraw; the raster paints from it and scrubbing reads from it.

use serde::{Deserialize, Serialize};

use crate::color::{ColorTable, EffortColor};
use crate::geometry::RenderGeometry;
use crate::StreamPoint;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeAxis {
    pub t_min: f64,
    pub t_max: f64,
}

impl TimeAxis {
    pub fn of(points: &[StreamPoint]) -> Option<Self> {
        let first = points.first()?;
        let last = points.last()?;
        Some(Self {
            t_min: first.time as f64,
            t_max: last.time as f64,
        })
    }

    pub fn range(&self) -> f64 {
        self.t_max - self.t_min
    }

    /// `t = tMin + (x / chartWidth) * timeRange`.
    pub fn time_at(&self, x: f64, chart_width: f64) -> f64 {
        if chart_width <= 0.0 {
            return self.t_min;
        }
        self.t_min + (x / chart_width) * self.range()
    }

    /// `clamp(round((t - tMin) / timeRange * (N - 1)), 0, N - 1)`.
    pub fn index_of(&self, t: f64, len: usize) -> usize {
        if len <= 1 || self.range() <= 0.0 {
            return 0;
        }
        let last = (len - 1) as f64;
        let raw = ((t - self.t_min) / self.range() * last).round();
        if raw.is_nan() {
            0
        } else {
            raw.clamp(0.0, last) as usize
        }
    }
}

/// Nearest sample index for a chart-relative logical x.
pub fn nearest_index(axis: &TimeAxis, x: f64, chart_width: f64, len: usize) -> usize {
    axis.index_of(axis.time_at(x, chart_width), len)
}

/// Sample index per logical chart column, built in O(chart width).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnIndex {
    indices: Vec<usize>,
}

impl ColumnIndex {
    pub fn build(points: &[StreamPoint], chart_width: u32) -> Self {
        let Some(axis) = TimeAxis::of(points) else {
            return Self::default();
        };
        let width = chart_width as f64;
        let indices = (0..chart_width)
            .map(|col| nearest_index(&axis, col as f64, width, points.len()))
            .collect();
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn get(&self, column: usize) -> Option<usize> {
        self.indices.get(column).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }
}

/// Tooltip content for the sample under the pointer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hover {
    pub index: usize,
    pub column: u32,
    pub sample: StreamPoint,
    pub color: EffortColor,
}

impl Hover {
    pub fn tooltip_lines(&self) -> Vec<String> {
        let s = &self.sample;
        vec![
            format_clock(s.time as f64),
            format!("HR {:.0} bpm", s.heart_rate),
            format!("Pace {} /km", format_pace(s.pace)),
            format!("Alt {:.0} m ({:+.1}%)", s.altitude, s.grade),
            format!("Cadence {:.0} spm", s.cadence),
            format!("Effort {:.0}%", s.effort * 100.0),
        ]
    }
}

/// Stateless lookup over one series and geometry.
pub struct InteractionLookup<'a> {
    points: &'a [StreamPoint],
    axis: Option<TimeAxis>,
    geometry: RenderGeometry,
    palette: &'a ColorTable,
}

impl<'a> InteractionLookup<'a> {
    pub fn new(points: &'a [StreamPoint], geometry: RenderGeometry, palette: &'a ColorTable) -> Self {
        Self {
            points,
            axis: TimeAxis::of(points),
            geometry,
            palette,
        }
    }

    /// Resolve a container-relative pointer x. Positions outside the chart clamp to
    /// its edges; the pointer resolves to the logical column under it so the tooltip
    /// reads the same sample as the band beneath.
    pub fn at_container_x(&self, x: f64) -> Option<Hover> {
        let column = pointer_column(&self.geometry, x)?;
        self.at_column(column)
    }

    pub fn at_column(&self, column: u32) -> Option<Hover> {
        let axis = self.axis?;
        let width = self.geometry.chart_width();
        let column = column.min(width - 1);
        let index = nearest_index(&axis, column as f64, width as f64, self.points.len());
        Some(hover_for(self.points, index, column, self.palette))
    }
}

/// Chart column under a container-relative x, `None` for non-finite input.
pub fn pointer_column(geometry: &RenderGeometry, container_x: f64) -> Option<u32> {
    if !container_x.is_finite() {
        return None;
    }
    let chart_x = container_x - geometry.margins.left as f64;
    let last = (geometry.chart_width() - 1) as f64;
    Some(chart_x.floor().clamp(0.0, last) as u32)
}

pub(crate) fn hover_for(
    points: &[StreamPoint],
    index: usize,
    column: u32,
    palette: &ColorTable,
) -> Hover {
    let sample = points[index];
    Hover {
        index,
        column,
        sample,
        color: palette.map(sample.effort),
    }
}

pub fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

pub fn format_pace(seconds_per_km: f64) -> String {
    if !seconds_per_km.is_finite() || seconds_per_km <= 0.0 {
        return "--:--".to_string();
    }
    let total = seconds_per_km.round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Margins;

    fn ramp(n: usize) -> Vec<StreamPoint> {
        (0..n)
            .map(|i| {
                StreamPoint::new(
                    i as u32,
                    100.0 + i as f64 * 0.01,
                    300.0,
                    3.3,
                    100.0,
                    0.0,
                    170.0,
                    i as f64 / (n - 1) as f64,
                )
            })
            .collect()
    }

    #[test]
    fn index_follows_the_reverse_formula() {
        let points = ramp(3601);
        let axis = TimeAxis::of(&points).unwrap();
        assert_eq!(nearest_index(&axis, 0.0, 1200.0, points.len()), 0);
        assert_eq!(nearest_index(&axis, 600.0, 1200.0, points.len()), 1800);
        assert_eq!(nearest_index(&axis, 1200.0, 1200.0, points.len()), 3600);
        assert_eq!(nearest_index(&axis, 5000.0, 1200.0, points.len()), 3600);
        assert_eq!(nearest_index(&axis, -40.0, 1200.0, points.len()), 0);
    }

    #[test]
    fn degenerate_axes_resolve_to_first_sample() {
        let one = ramp(2)[..1].to_vec();
        let axis = TimeAxis::of(&one).unwrap();
        assert_eq!(nearest_index(&axis, 10.0, 100.0, 1), 0);
        assert!(TimeAxis::of(&[]).is_none());
    }

    #[test]
    fn lookup_returns_sample_and_shared_color() {
        let points = ramp(3601);
        let palette = ColorTable::default();
        let geometry = RenderGeometry::for_container(1312.0, 300.0, Some(2.0), Margins::default());
        let lookup = InteractionLookup::new(&points, geometry, &palette);
        let hover = lookup.at_container_x(56.0 + 600.4).unwrap();
        assert_eq!(hover.column, 600);
        assert_eq!(hover.index, 1800);
        assert_eq!(hover.sample, points[1800]);
        assert_eq!(hover.color, palette.map(points[1800].effort));
    }

    #[test]
    fn pointer_outside_chart_clamps_to_edges() {
        let points = ramp(100);
        let palette = ColorTable::default();
        let geometry = RenderGeometry::for_container(400.0, 200.0, None, Margins::default());
        let lookup = InteractionLookup::new(&points, geometry, &palette);
        assert_eq!(lookup.at_container_x(-10.0).unwrap().column, 0);
        let right = lookup.at_container_x(10_000.0).unwrap();
        assert_eq!(right.column, geometry.chart_width() - 1);
        assert!(lookup.at_container_x(f64::NAN).is_none());
    }

    #[test]
    fn column_table_matches_direct_lookup() {
        let points = ramp(777);
        let palette = ColorTable::default();
        let geometry = RenderGeometry::for_container(960.0, 240.0, Some(1.5), Margins::default());
        let table = ColumnIndex::build(&points, geometry.chart_width());
        let lookup = InteractionLookup::new(&points, geometry, &palette);
        assert_eq!(table.len(), geometry.chart_width() as usize);
        for (col, idx) in table.iter().enumerate() {
            assert_eq!(lookup.at_column(col as u32).unwrap().index, idx);
        }
    }

    #[test]
    fn empty_series_has_no_hover() {
        let palette = ColorTable::default();
        let geometry = RenderGeometry::for_container(400.0, 200.0, None, Margins::default());
        let lookup = InteractionLookup::new(&[], geometry, &palette);
        assert!(lookup.at_container_x(100.0).is_none());
        assert!(ColumnIndex::build(&[], 10).is_empty());
    }

    #[test]
    fn tooltip_formats_clock_and_pace() {
        assert_eq!(format_clock(3725.0), "1:02:05");
        assert_eq!(format_pace(245.0), "4:05");
        assert_eq!(format_pace(0.0), "--:--");
    }
}

//! Dual-layer effort-gradient rendering core for physiological telemetry.
//!
//! A raster layer paints one effort-colored band per logical pixel column at the
//! device pixel density, a vector overlay draws axes, traces and the tooltip on top,
//! and both only ever read the shared [`RenderGeometry`] to stay aligned.

use std::io::Write;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub mod bench;
pub mod color;
pub mod downsample;
pub mod export;
pub mod geometry;
pub mod lookup;
pub mod overlay;
pub mod raster;
pub mod session;
pub mod sync;
pub mod synthetic;

pub use bench::{
    run_benchmark, run_scenario, write_report, BenchConfig, BenchReport, LatencyBudgets,
    LatencyStats, ScenarioReport,
};
pub use color::{effort_color, ColorStop, ColorTable, EffortColor};
pub use downsample::{largest_triangle_three_buckets, lttb_indices};
pub use export::{write_composite, CompositeFiles};
pub use geometry::{ChartRegion, Margins, RenderGeometry};
pub use lookup::{ColumnIndex, Hover, InteractionLookup, TimeAxis};
pub use overlay::OverlayLayer;
pub use raster::RasterLayer;
pub use session::{FrameOutcome, FrameScheduler, PointerEvent, RenderSession};
pub use sync::{LayerPlacement, SyncCheck};
pub use synthetic::{interval_session, interval_session_with, Segment, SegmentKind, SyntheticSession};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("unsupported series format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse series: {0}")]
    SeriesParse(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("invalid color table: {0}")]
    InvalidColorTable(String),
    #[error("drawing backend failed: {0}")]
    Backend(String),
    #[error("failed to encode report: {0}")]
    Report(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One telemetry sample, roughly one per second of activity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamPoint {
    /// Seconds from activity start. Strictly increasing across a series.
    pub time: u32,
    pub heart_rate: f64,
    /// Seconds per kilometre.
    pub pace: f64,
    pub velocity: f64,
    pub altitude: f64,
    /// Signed percent.
    pub grade: f64,
    pub cadence: f64,
    #[serde(deserialize_with = "deserialize_effort")]
    pub effort: f64,
}

impl StreamPoint {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        time: u32,
        heart_rate: f64,
        pace: f64,
        velocity: f64,
        altitude: f64,
        grade: f64,
        cadence: f64,
        effort: f64,
    ) -> Self {
        Self {
            time,
            heart_rate,
            pace,
            velocity,
            altitude,
            grade,
            cadence,
            effort: clamp_effort(effort),
        }
    }
}

/// Clamp an effort value into `[0, 1]`; NaN is treated as no effort.
pub fn clamp_effort(effort: f64) -> f64 {
    if effort.is_nan() {
        0.0
    } else {
        effort.clamp(0.0, 1.0)
    }
}

fn deserialize_effort<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    f64::deserialize(deserializer).map(clamp_effort)
}

/// Heart-rate based effort: linear between resting and threshold heart rate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffortModel {
    pub resting_hr: f64,
    pub threshold_hr: f64,
}

impl Default for EffortModel {
    fn default() -> Self {
        Self {
            resting_hr: 60.0,
            threshold_hr: 175.0,
        }
    }
}

impl EffortModel {
    pub fn effort(&self, heart_rate: f64) -> f64 {
        let span = self.threshold_hr - self.resting_hr;
        if span <= f64::EPSILON {
            return if heart_rate >= self.threshold_hr { 1.0 } else { 0.0 };
        }
        clamp_effort((heart_rate - self.resting_hr) / span)
    }

    pub fn heart_rate(&self, effort: f64) -> f64 {
        self.resting_hr + clamp_effort(effort) * (self.threshold_hr - self.resting_hr)
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if !self.resting_hr.is_finite() || !self.threshold_hr.is_finite() {
            return Err(RenderError::InvalidParameter(
                "heart-rate bounds must be finite".into(),
            ));
        }
        if self.threshold_hr <= self.resting_hr {
            return Err(RenderError::InvalidParameter(format!(
                "threshold_hr ({}) must exceed resting_hr ({})",
                self.threshold_hr, self.resting_hr
            )));
        }
        Ok(())
    }
}

pub const DEFAULT_DOWNSAMPLE_TARGET: usize = 500;
pub const DEFAULT_GRADIENT_ALPHA: f64 = 0.3;

/// Fixed rendering defaults. Not tuned at runtime; the device pixel ratio is the
/// only host-provided input and is passed to the session separately.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub downsample_target: usize,
    pub gradient_alpha: f64,
    pub margins: Margins,
    pub palette: ColorTable,
    pub effort_model: EffortModel,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            downsample_target: DEFAULT_DOWNSAMPLE_TARGET,
            gradient_alpha: DEFAULT_GRADIENT_ALPHA,
            margins: Margins::default(),
            palette: ColorTable::default(),
            effort_model: EffortModel::default(),
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.downsample_target < 2 {
            return Err(RenderError::InvalidParameter(format!(
                "downsample_target must be at least 2, got {}",
                self.downsample_target
            )));
        }
        if !(0.0..=1.0).contains(&self.gradient_alpha) {
            return Err(RenderError::InvalidParameter(format!(
                "gradient_alpha must lie in [0, 1], got {}",
                self.gradient_alpha
            )));
        }
        self.effort_model.validate()
    }
}

/// Row shape accepted from CSV/JSON inputs. `effort` may be omitted, in which case
/// it is derived from heart rate.
#[derive(Clone, Debug, Deserialize)]
struct SeriesRow {
    time: u32,
    heart_rate: f64,
    #[serde(default)]
    pace: f64,
    #[serde(default)]
    velocity: f64,
    #[serde(default)]
    altitude: f64,
    #[serde(default)]
    grade: f64,
    #[serde(default)]
    cadence: f64,
    #[serde(default)]
    effort: Option<f64>,
}

impl SeriesRow {
    fn into_point(self, model: &EffortModel) -> StreamPoint {
        let effort = self
            .effort
            .unwrap_or_else(|| model.effort(self.heart_rate));
        StreamPoint::new(
            self.time,
            self.heart_rate,
            self.pace,
            self.velocity,
            self.altitude,
            self.grade,
            self.cadence,
            effort,
        )
    }
}

/// Parse a stream series from CSV or JSON bytes using the provided format hint
/// (extension or file name).
pub fn parse_series(
    input: &[u8],
    format: &str,
    model: &EffortModel,
) -> Result<Vec<StreamPoint>, RenderError> {
    let format_lc = format.to_ascii_lowercase();
    let rows: Vec<SeriesRow> = if format_lc.ends_with("csv") {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(input);
        reader
            .deserialize()
            .collect::<Result<_, _>>()
            .map_err(|e| RenderError::SeriesParse(e.to_string()))?
    } else if format_lc.ends_with("json") {
        serde_json::from_slice(input).map_err(|e| RenderError::SeriesParse(e.to_string()))?
    } else {
        return Err(RenderError::UnsupportedFormat(format.to_string()));
    };
    Ok(rows.into_iter().map(|row| row.into_point(model)).collect())
}

pub fn write_series_csv<W: Write>(points: &[StreamPoint], writer: W) -> Result<(), RenderError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for point in points {
        csv_writer.serialize(point).map_err(std::io::Error::from)?;
    }
    csv_writer.flush()?;
    Ok(())
}

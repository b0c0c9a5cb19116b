//! Headless latency and alignment harness.
//!
//! Each scenario mounts a [`RenderSession`] at one container width and device pixel
//! ratio, then measures initial render, pointer resolution and resize redraws, and
//! checks layer alignment after the first frame and after every resize.

use std::hint::black_box;
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::color::blend_over;
use crate::raster::CLEAR_COLOR;
use crate::session::RenderSession;
use crate::sync::SyncCheck;
use crate::{RenderConfig, RenderError, StreamPoint};

/// Largest per-channel difference accepted between a tooltip swatch and the band
/// beneath it after alpha blending.
const SWATCH_TOLERANCE: i32 = 3;
const SWATCH_PROBES: usize = 12;
const GOLDEN: f64 = 0.618_033_988_749_895;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyBudgets {
    pub initial_render_ms: f64,
    pub interaction_ms: f64,
    pub resize_ms: f64,
}

impl Default for LatencyBudgets {
    fn default() -> Self {
        Self {
            initial_render_ms: 250.0,
            interaction_ms: 33.0,
            resize_ms: 100.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub widths: Vec<u32>,
    pub device_pixel_ratios: Vec<f64>,
    pub container_height: f64,
    pub pointer_samples: usize,
    pub resize_samples: usize,
    pub budgets: LatencyBudgets,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            widths: vec![375, 768, 960, 1200, 1440],
            device_pixel_ratios: vec![1.0, 1.25, 1.5, 2.0, 3.0],
            container_height: 320.0,
            pointer_samples: 200,
            resize_samples: 30,
            budgets: LatencyBudgets::default(),
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.widths.is_empty() || self.device_pixel_ratios.is_empty() {
            return Err(RenderError::InvalidParameter(
                "bench needs at least one width and one device pixel ratio".into(),
            ));
        }
        if self.pointer_samples == 0 || self.resize_samples == 0 {
            return Err(RenderError::InvalidParameter(
                "bench samples must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl LatencyStats {
    fn from_micros(mut timings: Vec<u64>) -> Self {
        timings.sort_unstable();
        let ms = |us: u64| us as f64 / 1000.0;
        Self {
            samples: timings.len(),
            p50_ms: ms(percentile(&timings, 50)),
            p95_ms: ms(percentile(&timings, 95)),
            p99_ms: ms(percentile(&timings, 99)),
            max_ms: ms(timings.last().copied().unwrap_or(0)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub container_width: u32,
    pub device_pixel_ratio: f64,
    pub physical_size: (u32, u32),
    pub initial_render_ms: f64,
    pub pointer: LatencyStats,
    pub resize: LatencyStats,
    pub initial_sync: SyncCheck,
    pub resize_transitions: usize,
    pub swatch_matches_raster: bool,
    pub within_budget: bool,
    pub failures: Vec<String>,
    pub passed: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchReport {
    pub generated_at: DateTime<Utc>,
    pub series_len: usize,
    pub series_digest: String,
    pub downsample_target: usize,
    pub gradient_alpha: f64,
    pub budgets: LatencyBudgets,
    pub scenarios: Vec<ScenarioReport>,
    pub passed: bool,
}

impl BenchReport {
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.scenarios.iter().flat_map(|s| {
            s.failures
                .iter()
                .map(move |f| (s.scenario.as_str(), f.as_str()))
        })
    }
}

/// Run every width × ratio scenario over `series`.
pub fn run_benchmark(
    series: &[StreamPoint],
    render: &RenderConfig,
    bench: &BenchConfig,
) -> Result<BenchReport, RenderError> {
    render.validate()?;
    bench.validate()?;

    let mut scenarios = Vec::with_capacity(bench.widths.len() * bench.device_pixel_ratios.len());
    for &width in &bench.widths {
        for &dpr in &bench.device_pixel_ratios {
            scenarios.push(run_scenario(series, render, bench, width, dpr)?);
        }
    }
    let passed = scenarios.iter().all(|s| s.passed);
    info!(
        scenarios = scenarios.len(),
        passed,
        "benchmark finished"
    );

    Ok(BenchReport {
        generated_at: Utc::now(),
        series_len: series.len(),
        series_digest: series_digest(series),
        downsample_target: render.downsample_target,
        gradient_alpha: render.gradient_alpha,
        budgets: bench.budgets,
        scenarios,
        passed,
    })
}

pub fn run_scenario(
    series: &[StreamPoint],
    render: &RenderConfig,
    bench: &BenchConfig,
    width: u32,
    device_pixel_ratio: f64,
) -> Result<ScenarioReport, RenderError> {
    let scenario = format!("{}px@{}x", width, device_pixel_ratio);
    let height = bench.container_height;
    let owned = series.to_vec();

    let start = Instant::now();
    let mut session = RenderSession::new(
        owned,
        render.clone(),
        width as f64,
        height,
        Some(device_pixel_ratio),
    )?;
    let initial_render_ms = elapsed_micros(start) as f64 / 1000.0;

    let mut failures = Vec::new();
    let initial_sync = session.sync_check();
    failures.extend(
        initial_sync
            .failures()
            .into_iter()
            .map(|f| format!("initial frame: {f}")),
    );

    let positions = pointer_positions(&session, bench.pointer_samples);
    let mut pointer_timings = Vec::with_capacity(positions.len());
    for &x in &positions {
        let start = Instant::now();
        let hover = session.lookup(x);
        black_box(hover.map(|h| h.color));
        pointer_timings.push(elapsed_micros(start));
    }

    let swatch_matches_raster = swatch_matches(&session, &positions);
    if !swatch_matches_raster {
        failures.push("tooltip swatch differs from the raster band beneath it".to_string());
    }

    let mut resize_timings = Vec::with_capacity(bench.resize_samples);
    for i in 0..bench.resize_samples {
        let target = resize_width(width, i);
        let start = Instant::now();
        session.resize(target, height)?;
        resize_timings.push(elapsed_micros(start));

        let check = session.sync_check();
        failures.extend(
            check
                .failures()
                .into_iter()
                .map(|f| format!("resize to {target}px: {f}")),
        );
    }

    let pointer = LatencyStats::from_micros(pointer_timings);
    let resize = LatencyStats::from_micros(resize_timings);
    let budgets = bench.budgets;
    let mut within_budget = true;
    if initial_render_ms > budgets.initial_render_ms {
        within_budget = false;
        failures.push(format!(
            "initial render {:.2} ms over {:.0} ms budget",
            initial_render_ms, budgets.initial_render_ms
        ));
    }
    if pointer.p95_ms >= budgets.interaction_ms {
        within_budget = false;
        failures.push(format!(
            "pointer p95 {:.3} ms over {:.0} ms budget",
            pointer.p95_ms, budgets.interaction_ms
        ));
    }
    if resize.p95_ms >= budgets.resize_ms {
        within_budget = false;
        failures.push(format!(
            "resize p95 {:.2} ms over {:.0} ms budget",
            resize.p95_ms, budgets.resize_ms
        ));
    }

    let passed = failures.is_empty();
    if passed {
        info!(
            "{scenario}: initial {:.1} ms, pointer p95 {:.3} ms, resize p95 {:.1} ms",
            initial_render_ms, pointer.p95_ms, resize.p95_ms
        );
    } else {
        for failure in &failures {
            warn!("{scenario}: {failure}");
        }
    }

    Ok(ScenarioReport {
        scenario,
        container_width: width,
        device_pixel_ratio,
        physical_size: (
            initial_sync.expected_physical.0,
            initial_sync.expected_physical.1,
        ),
        initial_render_ms,
        pointer,
        resize,
        initial_sync,
        resize_transitions: bench.resize_samples,
        swatch_matches_raster,
        within_budget,
        failures,
        passed,
    })
}

/// Write a report as pretty JSON, creating parent directories.
pub fn write_report(report: &BenchReport, output: &Path) -> Result<(), RenderError> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| RenderError::Report(e.to_string()))?;
    std::fs::write(output, json)?;
    Ok(())
}

/// Container-relative x positions spread over the chart by golden-ratio stepping.
fn pointer_positions(session: &RenderSession, samples: usize) -> Vec<f64> {
    let geometry = session.geometry();
    let left = geometry.margins.left as f64;
    let width = geometry.chart_width() as f64;
    (0..samples)
        .map(|i| left + ((i as f64 * GOLDEN).fract() * width))
        .collect()
}

/// Widths oscillating around the base so every step is a real transition.
fn resize_width(base: u32, step: usize) -> f64 {
    let delta = 16.0 * ((step % 4) + 1) as f64;
    if step % 2 == 0 {
        base as f64 + delta
    } else {
        (base as f64 - delta).max(1.0)
    }
}

fn swatch_matches(session: &RenderSession, positions: &[f64]) -> bool {
    if session.series().len() < 2 {
        return true;
    }
    let raster = session.raster();
    let region = raster.chart_region();
    let mid_y = region.top as f64 + region.height() as f64 / 2.0;
    let alpha = session.config().gradient_alpha;
    positions.iter().take(SWATCH_PROBES).all(|&x| {
        let Some(hover) = session.lookup(x) else {
            return false;
        };
        let expected = blend_over(hover.color.to_rgb(), alpha, CLEAR_COLOR);
        let column_center = region.left as f64 + hover.column as f64 + 0.5;
        match raster.pixel_at_logical(column_center, mid_y) {
            Some(got) => [
                (got.0, expected.0),
                (got.1, expected.1),
                (got.2, expected.2),
            ]
            .iter()
            .all(|&(a, b)| (a as i32 - b as i32).abs() <= SWATCH_TOLERANCE),
            None => false,
        }
    })
}

/// Stable hex digest of a series so reports from different runs can be compared.
pub fn series_digest(series: &[StreamPoint]) -> String {
    let mut hasher = Sha256::new();
    for p in series {
        hasher.update(p.time.to_le_bytes());
        for v in [
            p.heart_rate,
            p.pace,
            p.velocity,
            p.altitude,
            p.grade,
            p.cadence,
            p.effort,
        ] {
            hasher.update(v.to_le_bytes());
        }
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn percentile(sorted: &[u64], pct: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = (sorted.len().saturating_sub(1) * pct) / 100;
    sorted[idx]
}

fn elapsed_micros(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::interval_session;

    #[test]
    fn percentile_uses_lower_index() {
        let sorted: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&sorted, 50), 50);
        assert_eq!(percentile(&sorted, 95), 95);
        assert_eq!(percentile(&[], 95), 0);
    }

    #[test]
    fn resize_widths_always_move() {
        for step in 0..12 {
            assert_ne!(resize_width(768, step), 768.0);
        }
        assert_eq!(resize_width(10, 3), 1.0);
    }

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        let session = interval_session();
        let a = series_digest(&session.points);
        assert_eq!(a, series_digest(&session.points));
        assert_eq!(a.len(), 64);
        assert_ne!(a, series_digest(&session.points[1..]));
    }

    #[test]
    fn empty_config_is_rejected() {
        let config = BenchConfig {
            widths: Vec::new(),
            ..BenchConfig::default()
        };
        let err = run_benchmark(&[], &RenderConfig::default(), &config).unwrap_err();
        assert!(matches!(err, RenderError::InvalidParameter(_)));
    }

    #[test]
    fn small_scenario_reports_invariants() {
        let session = interval_session();
        let config = BenchConfig {
            container_height: 120.0,
            pointer_samples: 20,
            resize_samples: 3,
            budgets: LatencyBudgets {
                initial_render_ms: f64::MAX,
                interaction_ms: f64::MAX,
                resize_ms: f64::MAX,
            },
            ..BenchConfig::default()
        };
        let report = run_scenario(&session.points, &RenderConfig::default(), &config, 768, 1.5).unwrap();
        assert!(report.initial_sync.passed());
        assert!(report.swatch_matches_raster);
        assert_eq!(report.physical_size, (1152, 180));
        assert_eq!(report.pointer.samples, 20);
        assert!(report.passed, "{:?}", report.failures);
    }
}

//! Deterministic interval session used by the harness, the CLI `synth` command and
//! the end-to-end tests: one hour at 1 Hz, warmup, six 800 m reps with recoveries,
//! cooldown.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::{EffortModel, StreamPoint};

pub const SESSION_SECONDS: u32 = 3600;
pub const WORK_REPS: u32 = 6;

const WARMUP_END: u32 = 900;
const WORK_SECONDS: u32 = 170;
const RECOVERY_SECONDS: u32 = 120;
const WORK_RAMP_SECONDS: u32 = 20;
const RECOVERY_DROP_SECONDS: u32 = 15;
const COOLDOWN_START: u32 = WARMUP_END + WORK_REPS * (WORK_SECONDS + RECOVERY_SECONDS);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Warmup,
    Work,
    Recovery,
    Cooldown,
}

impl SegmentKind {
    fn pace(self) -> f64 {
        match self {
            SegmentKind::Warmup => 330.0,
            SegmentKind::Work => 210.0,
            SegmentKind::Recovery => 420.0,
            SegmentKind::Cooldown => 360.0,
        }
    }

    fn cadence(self) -> f64 {
        match self {
            SegmentKind::Warmup => 166.0,
            SegmentKind::Work => 182.0,
            SegmentKind::Recovery => 158.0,
            SegmentKind::Cooldown => 164.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: SegmentKind,
    /// Rep number for work and recovery segments.
    pub rep: Option<u32>,
    pub start: u32,
    /// Exclusive.
    pub end: u32,
    pub max_effort: f64,
}

impl Segment {
    pub fn contains(&self, time: u32) -> bool {
        (self.start..self.end).contains(&time)
    }

    pub fn midpoint(&self) -> u32 {
        self.start + (self.end - self.start) / 2
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticSession {
    pub points: Vec<StreamPoint>,
    pub segments: Vec<Segment>,
}

impl SyntheticSession {
    pub fn segments_of(&self, kind: SegmentKind) -> impl Iterator<Item = &Segment> + '_ {
        self.segments.iter().filter(move |s| s.kind == kind)
    }
}

pub fn interval_session() -> SyntheticSession {
    interval_session_with(&EffortModel::default())
}

pub fn interval_session_with(model: &EffortModel) -> SyntheticSession {
    let mut layout = vec![(SegmentKind::Warmup, None, 0, WARMUP_END)];
    for rep in 0..WORK_REPS {
        let start = WARMUP_END + rep * (WORK_SECONDS + RECOVERY_SECONDS);
        layout.push((SegmentKind::Work, Some(rep + 1), start, start + WORK_SECONDS));
        layout.push((
            SegmentKind::Recovery,
            Some(rep + 1),
            start + WORK_SECONDS,
            start + WORK_SECONDS + RECOVERY_SECONDS,
        ));
    }
    layout.push((SegmentKind::Cooldown, None, COOLDOWN_START, SESSION_SECONDS + 1));

    let mut points = Vec::with_capacity(SESSION_SECONDS as usize + 1);
    let mut segments = Vec::with_capacity(layout.len());
    let mut previous_altitude = altitude(0);
    let mut carried_effort = 0.5;

    for (kind, rep, start, end) in layout {
        let first = points.len();
        let entry_effort = carried_effort;
        for t in start..end {
            let local = t - start;
            let effort = match kind {
                SegmentKind::Warmup => warmup_effort(t),
                SegmentKind::Work => work_effort(rep.unwrap_or(1), local, entry_effort),
                SegmentKind::Recovery => recovery_effort(local, entry_effort),
                SegmentKind::Cooldown => {
                    let span = (end - start - 1).max(1) as f64;
                    0.7 - 0.3 * local as f64 / span
                }
            };
            let pace = kind.pace() + 6.0 * (t as f64 / 23.0).sin();
            let velocity = 1000.0 / pace;
            let alt = altitude(t);
            let grade = if t == 0 {
                0.0
            } else {
                (alt - previous_altitude) / velocity * 100.0
            };
            previous_altitude = alt;
            let cadence = kind.cadence() + 2.0 * (t as f64 / 17.0).cos();
            let point = StreamPoint::new(
                t,
                model.heart_rate(effort),
                pace,
                velocity,
                alt,
                grade,
                cadence,
                effort,
            );
            carried_effort = point.effort;
            points.push(point);
        }
        let max_effort = points[first..]
            .iter()
            .map(|p| OrderedFloat(p.effort))
            .max()
            .map(|v| v.0)
            .unwrap_or(0.0);
        segments.push(Segment {
            kind,
            rep,
            start,
            end,
            max_effort,
        });
    }

    SyntheticSession { points, segments }
}

fn altitude(t: u32) -> f64 {
    120.0 + 8.0 * (t as f64 / 400.0).sin()
}

fn wiggle(t: u32, amplitude: f64) -> f64 {
    amplitude * (t as f64 * 0.7).sin()
}

fn warmup_effort(t: u32) -> f64 {
    if t < 300 {
        0.35 + 0.15 * t as f64 / 300.0
    } else {
        0.5 + wiggle(t, 0.004)
    }
}

/// Ramp into the rep, then a plateau that climbs by 0.01 to the rep's peak.
fn work_effort(rep: u32, local: u32, entry: f64) -> f64 {
    let peak = 0.92 + 0.01 * (rep - 1) as f64;
    let floor = peak - 0.01;
    if local < WORK_RAMP_SECONDS {
        let frac = local as f64 / WORK_RAMP_SECONDS as f64;
        return entry + (floor - entry) * frac;
    }
    let span = (WORK_SECONDS - WORK_RAMP_SECONDS - 1) as f64;
    let frac = (local - WORK_RAMP_SECONDS) as f64 / span;
    (floor + 0.01 * frac + wiggle(local, 0.002)).min(peak)
}

fn recovery_effort(local: u32, entry: f64) -> f64 {
    if local < RECOVERY_DROP_SECONDS {
        let frac = local as f64 / RECOVERY_DROP_SECONDS as f64;
        return entry + (0.7 - entry) * frac;
    }
    0.7 + wiggle(local, 0.005)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_one_hour_at_one_hertz() {
        let session = interval_session();
        assert_eq!(session.points.len(), 3601);
        assert!(session.points.windows(2).all(|w| w[1].time == w[0].time + 1));
        assert_eq!(session.segments.len(), 2 + 2 * WORK_REPS as usize);
        assert_eq!(session.segments.last().unwrap().end, 3601);
    }

    #[test]
    fn work_peaks_above_point_nine() {
        let session = interval_session();
        for seg in session.segments_of(SegmentKind::Work) {
            assert!(seg.max_effort > 0.9, "{seg:?}");
            assert!(seg.max_effort <= 1.0);
        }
        for seg in session.segments_of(SegmentKind::Recovery) {
            let mid = session.points[seg.midpoint() as usize].effort;
            assert!((mid - 0.7).abs() < 0.01);
        }
        let warm = &session.points[600];
        assert!((warm.effort - 0.5).abs() < 0.01);
    }

    #[test]
    fn heart_rate_follows_the_effort_model() {
        let model = EffortModel::default();
        let session = interval_session_with(&model);
        for p in session.points.iter().step_by(97) {
            assert!((model.effort(p.heart_rate) - p.effort).abs() < 1e-9);
        }
    }
}

//! Effort → color mapping shared by every layer that displays a sample's color.

use plotters::style::{Color, HSLColor, RGBColor};
use serde::{Deserialize, Serialize};

use crate::{clamp_effort, RenderError};

/// Breakpoint of the effort palette. Hue in degrees, saturation and lightness in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub effort: f64,
    pub hue: f64,
    pub saturation: f64,
    pub lightness: f64,
}

const fn stop(effort: f64, hue: f64, saturation: f64, lightness: f64) -> ColorStop {
    ColorStop {
        effort,
        hue,
        saturation,
        lightness,
    }
}

/// Five segments: easy, steady, tempo, threshold, redline.
pub const DEFAULT_STOPS: [ColorStop; 6] = [
    stop(0.00, 210.0, 0.60, 0.55),
    stop(0.30, 140.0, 0.55, 0.48),
    stop(0.60, 55.0, 0.85, 0.50),
    stop(0.80, 30.0, 0.90, 0.50),
    stop(0.95, 0.0, 0.85, 0.48),
    stop(1.00, 0.0, 0.90, 0.35),
];

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffortColor {
    pub hue: f64,
    pub saturation: f64,
    pub lightness: f64,
}

impl EffortColor {
    pub fn to_rgb(&self) -> RGBColor {
        let (r, g, b) = HSLColor(
            self.hue.rem_euclid(360.0) / 360.0,
            self.saturation,
            self.lightness,
        )
        .rgb();
        RGBColor(r, g, b)
    }

    pub fn css_hex(&self) -> String {
        let (r, g, b) = self.to_rgb().rgb();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }
}

/// Ordered breakpoint table. Recalibrating a boundary means editing a stop, never the
/// interpolation below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ColorStop>", into = "Vec<ColorStop>")]
pub struct ColorTable {
    stops: Vec<ColorStop>,
}

impl ColorTable {
    pub fn new(stops: Vec<ColorStop>) -> Result<Self, RenderError> {
        if stops.len() < 2 {
            return Err(RenderError::InvalidColorTable(
                "at least two stops are required".into(),
            ));
        }
        let first = stops[0].effort;
        let last = stops[stops.len() - 1].effort;
        if first != 0.0 || last != 1.0 {
            return Err(RenderError::InvalidColorTable(format!(
                "stops must span [0, 1], got [{first}, {last}]"
            )));
        }
        for pair in stops.windows(2) {
            if !(pair[1].effort > pair[0].effort) {
                return Err(RenderError::InvalidColorTable(format!(
                    "breakpoints must strictly increase ({} then {})",
                    pair[0].effort, pair[1].effort
                )));
            }
        }
        for s in &stops {
            let in_unit = |v: f64| (0.0..=1.0).contains(&v);
            if !s.hue.is_finite() || !in_unit(s.saturation) || !in_unit(s.lightness) {
                return Err(RenderError::InvalidColorTable(format!(
                    "stop at {} has out-of-range hue/saturation/lightness",
                    s.effort
                )));
            }
        }
        Ok(Self { stops })
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    /// Interior breakpoints, i.e. segment boundaries.
    pub fn breakpoints(&self) -> impl Iterator<Item = f64> + '_ {
        self.stops[1..self.stops.len() - 1].iter().map(|s| s.effort)
    }

    pub fn map(&self, effort: f64) -> EffortColor {
        interpolate(&self.stops, effort)
    }
}

impl Default for ColorTable {
    fn default() -> Self {
        Self {
            stops: DEFAULT_STOPS.to_vec(),
        }
    }
}

impl TryFrom<Vec<ColorStop>> for ColorTable {
    type Error = RenderError;

    fn try_from(stops: Vec<ColorStop>) -> Result<Self, Self::Error> {
        Self::new(stops)
    }
}

impl From<ColorTable> for Vec<ColorStop> {
    fn from(table: ColorTable) -> Self {
        table.stops
    }
}

/// Map an effort value through the default table.
pub fn effort_color(effort: f64) -> EffortColor {
    interpolate(&DEFAULT_STOPS, effort)
}

fn interpolate(stops: &[ColorStop], effort: f64) -> EffortColor {
    let e = clamp_effort(effort);
    let upper = stops
        .partition_point(|s| s.effort <= e)
        .clamp(1, stops.len() - 1);
    let lo = stops[upper - 1];
    let hi = stops[upper];
    let frac = (e - lo.effort) / (hi.effort - lo.effort);
    // Weighted form so both segment ends reproduce their stop exactly.
    let lerp = |a: f64, b: f64| a * (1.0 - frac) + b * frac;
    EffortColor {
        hue: lerp(lo.hue, hi.hue),
        saturation: lerp(lo.saturation, hi.saturation),
        lightness: lerp(lo.lightness, hi.lightness),
    }
}

/// Source-over blend of `color` at `alpha` onto an opaque background.
pub fn blend_over(color: RGBColor, alpha: f64, background: RGBColor) -> RGBColor {
    let a = alpha.clamp(0.0, 1.0);
    let mix = |c: u8, bg: u8| (c as f64 * a + bg as f64 * (1.0 - a)).round() as u8;
    RGBColor(
        mix(color.0, background.0),
        mix(color.1, background.1),
        mix(color.2, background.2),
    )
}

/// Hue in degrees of an RGB color, `None` for greys.
pub fn hue_of(color: RGBColor) -> Option<f64> {
    let (r, g, b) = (
        color.0 as f64 / 255.0,
        color.1 as f64 / 255.0,
        color.2 as f64 / 255.0,
    );
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    if delta <= f64::EPSILON {
        return None;
    }
    let hue = if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    Some(hue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_is_byte_identical_across_calls() {
        for i in 0..=200 {
            let e = i as f64 / 200.0;
            let a = effort_color(e).to_rgb();
            let b = effort_color(e).to_rgb();
            assert_eq!(a.rgb(), b.rgb());
            assert_eq!(effort_color(e), ColorTable::default().map(e));
        }
    }

    #[test]
    fn breakpoints_hit_their_stops_exactly() {
        let table = ColorTable::default();
        assert_eq!(table.breakpoints().collect::<Vec<_>>(), vec![0.30, 0.60, 0.80, 0.95]);
        for s in DEFAULT_STOPS {
            let c = table.map(s.effort);
            assert_eq!(c.hue, s.hue);
            assert_eq!(c.saturation, s.saturation);
            assert_eq!(c.lightness, s.lightness);
        }
    }

    #[test]
    fn channels_interpolate_independently_within_a_segment() {
        let c = effort_color(0.70);
        assert!((c.hue - 42.5).abs() < 1e-9);
        assert!((c.saturation - 0.875).abs() < 1e-9);
        assert!((c.lightness - 0.50).abs() < 1e-9);
    }

    #[test]
    fn input_is_clamped() {
        assert_eq!(effort_color(-3.0), effort_color(0.0));
        assert_eq!(effort_color(7.0), effort_color(1.0));
        assert_eq!(effort_color(f64::NAN), effort_color(0.0));
    }

    #[test]
    fn hue_never_increases_with_effort() {
        let mut prev = f64::INFINITY;
        for i in 0..=1000 {
            let h = effort_color(i as f64 / 1000.0).hue;
            assert!(h <= prev + 1e-12);
            prev = h;
        }
    }

    #[test]
    fn invalid_tables_are_rejected() {
        assert!(ColorTable::new(vec![DEFAULT_STOPS[0]]).is_err());
        let mut unordered = DEFAULT_STOPS.to_vec();
        unordered.swap(1, 2);
        assert!(ColorTable::new(unordered).is_err());
        let mut short = DEFAULT_STOPS.to_vec();
        short.pop();
        assert!(ColorTable::new(short).is_err());
    }

    #[test]
    fn table_deserializes_through_validation() {
        let json = serde_json::to_string(&ColorTable::default()).unwrap();
        let table: ColorTable = serde_json::from_str(&json).unwrap();
        assert_eq!(table, ColorTable::default());
        assert!(serde_json::from_str::<ColorTable>("[]").is_err());
    }

    #[test]
    fn hue_survives_blending_onto_white() {
        let color = effort_color(0.5).to_rgb();
        let blended = blend_over(color, 0.3, RGBColor(255, 255, 255));
        let original = hue_of(color).unwrap();
        let after = hue_of(blended).unwrap();
        assert!((original - after).abs() < 6.0, "{original} vs {after}");
    }
}

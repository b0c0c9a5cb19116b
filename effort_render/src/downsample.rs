//! Largest-Triangle-Three-Buckets reduction of a stream series.
//!
//! Time is the x dimension and effort the y dimension used for scoring; the whole
//! sample is carried along so the overlay can plot every channel from the result.

use crate::StreamPoint;

/// Reduce `points` to `target` samples, keeping the first and last sample.
pub fn largest_triangle_three_buckets(points: &[StreamPoint], target: usize) -> Vec<StreamPoint> {
    lttb_indices(points, target)
        .into_iter()
        .map(|idx| points[idx])
        .collect()
}

/// Indices of the samples LTTB keeps, ascending.
pub fn lttb_indices(points: &[StreamPoint], target: usize) -> Vec<usize> {
    let n = points.len();
    if n <= target || n < 3 {
        return (0..n).collect();
    }
    match target {
        0 => return Vec::new(),
        1 => return vec![0],
        2 => return vec![0, n - 1],
        _ => {}
    }

    let buckets = target - 2;
    let every = (n - 2) as f64 / buckets as f64;
    let bounds = |bucket: usize| -> (usize, usize) {
        let start = (bucket as f64 * every).floor() as usize + 1;
        let end = (((bucket + 1) as f64 * every).floor() as usize + 1).min(n - 1);
        (start, end.max(start + 1))
    };

    let mut selected = Vec::with_capacity(target);
    selected.push(0);
    let mut anchor = 0usize;

    for bucket in 0..buckets {
        let (start, end) = bounds(bucket);
        let (avg_t, avg_e) = if bucket + 1 < buckets {
            let (next_start, next_end) = bounds(bucket + 1);
            average(&points[next_start..next_end])
        } else {
            let last = &points[n - 1];
            (last.time as f64, last.effort)
        };

        let a_t = points[anchor].time as f64;
        let a_e = points[anchor].effort;
        let mut best = start;
        let mut best_area = -1.0;
        for (idx, candidate) in points.iter().enumerate().take(end).skip(start) {
            let area = ((a_t - avg_t) * (candidate.effort - a_e)
                - (a_t - candidate.time as f64) * (avg_e - a_e))
                .abs();
            // Strict comparison keeps the first of equal-area candidates.
            if area > best_area {
                best_area = area;
                best = idx;
            }
        }
        selected.push(best);
        anchor = best;
    }

    selected.push(n - 1);
    selected
}

fn average(points: &[StreamPoint]) -> (f64, f64) {
    let count = points.len().max(1) as f64;
    let (t, e) = points
        .iter()
        .fold((0.0, 0.0), |acc, p| (acc.0 + p.time as f64, acc.1 + p.effort));
    (t / count, e / count)
}

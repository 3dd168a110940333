/// Order statistics over sorted sequences, with linear interpolation between neighboring ranks.
/// An empty sequence has no percentiles, which is None rather than some number that could be
/// mistaken for data.

/// `sorted` must be sorted ascending.  `p` is clamped to [0, 1].

pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
    let k = (sorted.len() - 1) as f64 * p;
    let lo = k.floor();
    let hi = k.ceil();
    if lo == hi {
        return Some(sorted[k as usize]);
    }
    let below = sorted[lo as usize] * (hi - k);
    let above = sorted[hi as usize] * (k - lo);
    Some(below + above)
}

/// The rows (i/resolution, percentile) for i in 0..resolution.  Never includes p=1.

pub fn percentile_table(sorted: &[f64], resolution: usize) -> Vec<(f64, Option<f64>)> {
    (0..resolution)
        .map(|i| {
            let p = i as f64 / resolution as f64;
            (p, percentile(sorted, p))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub p50: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

impl Summary {
    pub fn of(sorted: &[f64]) -> Summary {
        Summary {
            p50: percentile(sorted, 0.5),
            p95: percentile(sorted, 0.95),
            p99: percentile(sorted, 0.99),
        }
    }
}

#[test]
fn test_percentile() {
    let xs = [10.0, 20.0, 30.0, 40.0];
    assert!(percentile(&xs, 0.0) == Some(10.0));
    assert!(percentile(&xs, 1.0) == Some(40.0));
    assert!(percentile(&xs, -3.0) == Some(10.0));
    assert!(percentile(&xs, 7.0) == Some(40.0));
    assert!(percentile(&xs, 0.5) == Some(25.0));
    assert!(percentile(&xs, 1.0 / 3.0) == Some(20.0));
    assert!(percentile(&[5.0], 0.73) == Some(5.0));
    assert!(percentile(&[], 0.5).is_none());
}

#[test]
fn test_percentile_table() {
    let xs = [0.0, 100.0];
    let t = percentile_table(&xs, 4);
    assert!(t == vec![(0.0, Some(0.0)), (0.25, Some(25.0)), (0.5, Some(50.0)), (0.75, Some(75.0))]);
    assert!(percentile_table(&[], 2) == vec![(0.0, None), (0.5, None)]);
    assert!(percentile_table(&xs, 0).is_empty());
}

#[test]
fn test_summary() {
    let xs = (0..=100).map(|x| x as f64).collect::<Vec<f64>>();
    let s = Summary::of(&xs);
    assert!(s.p50 == Some(50.0) && s.p95 == Some(95.0) && s.p99 == Some(99.0));
    assert!(Summary::of(&[]).p99.is_none());
}

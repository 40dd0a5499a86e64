use chrono::{DateTime, NaiveDateTime};

// ---------------------------------------------------------------------------
// Linear mapping
// ---------------------------------------------------------------------------

/// Maps a continuous domain onto a pixel range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LinearScale {
    domain: (f64, f64),
    range: (f64, f64),
}

impl LinearScale {
    pub(crate) fn new(domain: (f64, f64), range: (f64, f64)) -> Self {
        LinearScale { domain, range }
    }

    pub(crate) fn map(&self, v: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        let span = d1 - d0;
        if span == 0.0 {
            return (r0 + r1) / 2.0;
        }
        r0 + (v - d0) / span * (r1 - r0)
    }
}

/// Finite extent of `values`, or `None` when there is nothing to plot.
pub(crate) fn extent(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

// ---------------------------------------------------------------------------
// Numeric ticks
// ---------------------------------------------------------------------------

/// Ticks covering `[min, max]` at a 1/2/5 x 10^k step; the first and last tick
/// enclose the data.
pub(crate) fn nice_ticks(mut min: f64, mut max: f64, count: usize) -> Vec<f64> {
    if count == 0 || !min.is_finite() || !max.is_finite() {
        return Vec::new();
    }
    if min > max {
        std::mem::swap(&mut min, &mut max);
    }
    if min == max {
        // Give a flat series some room.
        let pad = if min == 0.0 { 1.0 } else { min.abs() * 0.1 };
        min -= pad;
        max += pad;
    }
    let step = nice_step((max - min) / count as f64);
    if step == 0.0 {
        return vec![min, max];
    }
    let start = (min / step).floor() * step;
    let stop = (max / step).ceil() * step;
    let n = ((stop - start) / step).round().clamp(1.0, 1_000.0) as usize;
    (0..=n).map(|i| clean(start + step * i as f64, step)).collect()
}

fn nice_step(step: f64) -> f64 {
    if !step.is_finite() || step <= 0.0 {
        return 0.0;
    }
    let base = 10_f64.powf(step.log10().floor());
    let error = step / base;
    let nice = if error >= 7.5 {
        10.0
    } else if error >= 3.5 {
        5.0
    } else if error >= 1.5 {
        2.0
    } else {
        1.0
    };
    nice * base
}

// Snap accumulated float error (0.30000000000000004) back onto the step grid.
fn clean(v: f64, step: f64) -> f64 {
    let k = (v / step).round();
    let snapped = if step < 1.0 {
        k / (1.0 / step).round()
    } else {
        k * step
    };
    if snapped.abs() < step * 1e-9 {
        0.0
    } else {
        snapped
    }
}

/// Tick label with just enough decimals for `step`.
pub(crate) fn format_tick(v: f64, step: f64) -> String {
    let abs = v.abs();
    if abs >= 1e6 || (abs > 0.0 && abs < 1e-4) {
        return format!("{v:.2e}");
    }
    let decimals = if step > 0.0 && step < 1.0 {
        (-step.log10() - 1e-9).ceil() as usize
    } else {
        0
    };
    format!("{v:.decimals$}")
}

// ---------------------------------------------------------------------------
// Temporal ticks
// ---------------------------------------------------------------------------

const SECOND: i64 = 1_000;
const MINUTE: i64 = 60 * SECOND;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

const TIME_STEPS: [i64; 19] = [
    SECOND,
    5 * SECOND,
    15 * SECOND,
    30 * SECOND,
    MINUTE,
    5 * MINUTE,
    15 * MINUTE,
    30 * MINUTE,
    HOUR,
    3 * HOUR,
    6 * HOUR,
    12 * HOUR,
    DAY,
    2 * DAY,
    7 * DAY,
    14 * DAY,
    30 * DAY,
    91 * DAY,
    365 * DAY,
];

/// Epoch milliseconds for a timestamp, as plotted on a temporal axis.
pub(crate) fn epoch_millis(t: &NaiveDateTime) -> f64 {
    t.and_utc().timestamp_millis() as f64
}

/// Ticks over a millisecond domain at calendar-friendly steps, with labels.
pub(crate) fn temporal_ticks(min: f64, max: f64, count: usize) -> Vec<(f64, String)> {
    if count == 0 || !min.is_finite() || !max.is_finite() {
        return Vec::new();
    }
    let (min, max) = (min.min(max) as i64, min.max(max) as i64);
    let target = ((max - min) / count.max(1) as i64).max(1);
    let step = TIME_STEPS
        .iter()
        .copied()
        .find(|s| *s >= target)
        .unwrap_or_else(|| (target / (365 * DAY) + 1) * 365 * DAY);

    let pattern = if step >= 365 * DAY {
        "%Y"
    } else if step >= DAY {
        "%Y-%m-%d"
    } else if step >= MINUTE {
        "%m-%d %H:%M"
    } else {
        "%H:%M:%S"
    };

    let first = min.div_euclid(step) * step + if min.rem_euclid(step) == 0 { 0 } else { step };
    let mut ticks = Vec::new();
    let mut t = first;
    while t <= max && ticks.len() <= 1_000 {
        if let Some(dt) = DateTime::from_timestamp_millis(t) {
            ticks.push((t as f64, dt.format(pattern).to_string()));
        }
        t += step;
    }
    if ticks.is_empty() {
        if let Some(dt) = DateTime::from_timestamp_millis(min) {
            ticks.push((min as f64, dt.format("%Y-%m-%d %H:%M").to_string()));
        }
    }
    ticks
}

// ---------------------------------------------------------------------------
// Categorical positions
// ---------------------------------------------------------------------------

/// Distinct categories in first-appearance order, and each row's slot.
pub(crate) fn categories(values: &[Option<String>]) -> (Vec<String>, Vec<Option<f64>>) {
    let mut labels: Vec<String> = Vec::new();
    let mut index = std::collections::HashMap::new();
    let slots = values
        .iter()
        .map(|v| {
            let v = v.as_ref()?;
            let slot = *index.entry(v.clone()).or_insert_with(|| {
                labels.push(v.clone());
                labels.len() - 1
            });
            Some(slot as f64)
        })
        .collect();
    (labels, slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_enclose_domain() {
        let ticks = nice_ticks(0.3, 9.7, 5);
        assert_eq!(ticks.first(), Some(&0.0));
        assert_eq!(ticks.last(), Some(&10.0));
        assert!(ticks.windows(2).all(|w| (w[1] - w[0] - 2.0).abs() < 1e-12));
    }

    #[test]
    fn fractional_steps_are_clean() {
        let ticks = nice_ticks(0.0, 0.95, 10);
        assert!(ticks.contains(&0.3));
        assert_eq!(format_tick(0.3, 0.1), "0.3");
        assert_eq!(format_tick(1200.0, 200.0), "1200");
    }

    #[test]
    fn flat_domain_still_has_ticks() {
        let ticks = nice_ticks(5.0, 5.0, 5);
        assert!(ticks.len() >= 2);
        assert!(ticks[0] < 5.0 && *ticks.last().unwrap() > 5.0);
    }

    #[test]
    fn daily_labels() {
        let start = epoch_millis(
            &NaiveDateTime::parse_from_str("2024-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
        );
        let ticks = temporal_ticks(start, start + 10.0 * DAY as f64, 5);
        assert!(ticks.len() >= 4);
        assert!(ticks.iter().all(|(_, l)| l.starts_with("2024-01-") && l.len() == 10));
    }

    #[test]
    fn categories_keep_first_appearance() {
        let values = vec![Some("b".to_string()), None, Some("a".into()), Some("b".into())];
        let (labels, slots) = categories(&values);
        assert_eq!(labels, vec!["b", "a"]);
        assert_eq!(slots, vec![Some(0.0), None, Some(1.0), Some(0.0)]);
    }
}

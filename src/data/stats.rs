//! Descriptive statistics over columns with missing values.
//!
//! Missing cells are excluded from every computation.

/// Present values of a column.
fn present(values: &[Option<f64>]) -> impl Iterator<Item = f64> + '_ {
    values.iter().filter_map(|v| *v)
}

pub fn count(values: &[Option<f64>]) -> usize {
    present(values).count()
}

pub fn mean(values: &[Option<f64>]) -> Option<f64> {
    let n = count(values);
    (n > 0).then(|| present(values).sum::<f64>() / n as f64)
}

/// Standard deviation with `ddof` delta degrees of freedom (0 = population).
pub fn std_dev(values: &[Option<f64>], ddof: usize) -> Option<f64> {
    let n = count(values);
    if n <= ddof {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = present(values).map(|v| (v - m).powi(2)).sum();
    Some((ss / (n - ddof) as f64).sqrt())
}

pub fn median(values: &[Option<f64>]) -> Option<f64> {
    let mut sorted: Vec<f64> = present(values).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

pub fn min(values: &[Option<f64>]) -> Option<f64> {
    present(values).min_by(f64::total_cmp)
}

pub fn max(values: &[Option<f64>]) -> Option<f64> {
    present(values).max_by(f64::total_cmp)
}

/// Pearson correlation over pairwise-complete observations.
///
/// NaN when fewer than two rows have both values or either side has zero
/// variance.
pub fn pearson(a: &[Option<f64>], b: &[Option<f64>]) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

/// Symmetric Pearson matrix with a unit diagonal.
pub fn correlation_matrix(columns: &[&[Option<f64>]]) -> Vec<Vec<f64>> {
    let n = columns.len();
    let mut matrix = vec![vec![1.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let r = pearson(columns[i], columns[j]);
            matrix[i][j] = r;
            matrix[j][i] = r;
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(v: &[f64]) -> Vec<Option<f64>> {
        v.iter().copied().map(Some).collect()
    }

    #[test]
    fn population_and_sample_std() {
        let v = col(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(std_dev(&v, 0), Some(2.0));
        assert!((std_dev(&v, 1).unwrap() - 2.138_089_935).abs() < 1e-9);
        assert_eq!(median(&v), Some(4.5));
    }

    #[test]
    fn missing_values_are_skipped() {
        let v = vec![Some(1.0), None, Some(3.0)];
        assert_eq!(mean(&v), Some(2.0));
        assert_eq!(count(&v), 2);
        assert_eq!(mean(&[None]), None);
    }

    #[test]
    fn pearson_uses_pairwise_complete_rows() {
        let a = vec![Some(1.0), Some(2.0), Some(3.0), None];
        let b = vec![Some(2.0), Some(4.0), Some(6.0), Some(100.0)];
        assert!((pearson(&a, &b) - 1.0).abs() < 1e-12);

        let c = col(&[3.0, 2.0, 1.0, 0.0]);
        assert!((pearson(&a, &c) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_pairs_are_nan() {
        assert!(pearson(&col(&[1.0, 1.0, 1.0]), &col(&[1.0, 2.0, 3.0])).is_nan());
        assert!(pearson(&col(&[1.0]), &col(&[2.0])).is_nan());
    }

    #[test]
    fn matrix_is_symmetric_with_unit_diagonal() {
        let a = col(&[1.0, 2.0, 3.0, 4.0]);
        let b = col(&[1.0, 3.0, 2.0, 4.0]);
        let m = correlation_matrix(&[&a, &b]);
        assert_eq!(m[0][0], 1.0);
        assert_eq!(m[1][1], 1.0);
        assert_eq!(m[0][1], m[1][0]);
        assert!((m[0][1] - 0.8).abs() < 1e-12);
    }
}

//! Statistical kernels behind the drift methods

use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::cmp::Ordering;

/// Two-sample Kolmogorov-Smirnov statistic and asymptotic p-value
///
/// Both samples must be non-empty; NaNs are expected to be filtered out.
pub fn ks_two_sample(reference: &[f64], current: &[f64]) -> (f64, f64) {
    if reference.is_empty() || current.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let mut a = reference.to_vec();
    let mut b = current.to_vec();
    a.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));
    b.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));

    let (n1, n2) = (a.len(), b.len());
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;
    while i < n1 && j < n2 {
        let x = a[i].min(b[j]);
        while i < n1 && a[i] <= x {
            i += 1;
        }
        while j < n2 && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n1 as f64 - j as f64 / n2 as f64).abs());
    }

    let en = (n1 as f64 * n2 as f64 / (n1 + n2) as f64).sqrt();
    let p_value = kolmogorov_sf((en + 0.12 + 0.11 / en) * d);
    (d, p_value)
}

/// Survival function of the Kolmogorov distribution
pub fn kolmogorov_sf(lambda: f64) -> f64 {
    if lambda.is_nan() {
        return f64::NAN;
    }
    if lambda < 1e-3 {
        return 1.0;
    }
    let lambda_sq = lambda * lambda;
    let mut sum = 0.0;
    for k in 1..=100 {
        let k = k as f64;
        let sign = if k as i64 % 2 == 1 { 1.0 } else { -1.0 };
        let term = sign * (-2.0 * k * k * lambda_sq).exp();
        sum += term;
        if term.abs() < 1e-12 {
            break;
        }
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

/// Chi-squared test of independence on a `k × 2` table of category counts
///
/// Returns `(statistic, p_value)`. With a single category there are no
/// degrees of freedom and the result is `(0, 1)`. Yates' correction applies
/// when there is exactly one degree of freedom.
pub fn chi2_contingency(reference_counts: &[f64], current_counts: &[f64]) -> (f64, f64) {
    let rows: Vec<(f64, f64)> = reference_counts
        .iter()
        .zip(current_counts)
        .map(|(r, c)| (*r, *c))
        .filter(|(r, c)| r + c > 0.0)
        .collect();
    let dof = rows.len().saturating_sub(1);
    if dof == 0 {
        return (0.0, 1.0);
    }

    let col_ref: f64 = rows.iter().map(|(r, _)| r).sum();
    let col_cur: f64 = rows.iter().map(|(_, c)| c).sum();
    let total = col_ref + col_cur;
    if col_ref == 0.0 || col_cur == 0.0 {
        return (0.0, 1.0);
    }

    let mut statistic = 0.0;
    for (r, c) in &rows {
        let row_total = r + c;
        for (observed, col_total) in [(*r, col_ref), (*c, col_cur)] {
            let expected = row_total * col_total / total;
            let mut observed = observed;
            if dof == 1 {
                let diff = expected - observed;
                observed += diff.signum() * diff.abs().min(0.5);
            }
            statistic += (observed - expected).powi(2) / expected;
        }
    }

    let p_value = ChiSquared::new(dof as f64)
        .map(|dist| dist.sf(statistic))
        .unwrap_or(f64::NAN);
    (statistic, p_value)
}

/// Histogram bin edges by Doane's rule
///
/// A constant sample gets one bin of width one centred on its value.
pub fn doane_bin_edges(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return vec![min - 0.5, max + 0.5];
    }

    let range = max - min;
    let mut width = 0.0;
    if n > 2 {
        let nf = n as f64;
        let sg1 = (6.0 * (nf - 2.0) / ((nf + 1.0) * (nf + 3.0))).sqrt();
        let mean = values.iter().sum::<f64>() / nf;
        let sigma = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / nf).sqrt();
        if sigma > 0.0 {
            let g1 = values.iter().map(|v| ((v - mean) / sigma).powi(3)).sum::<f64>() / nf;
            width = range / (1.0 + nf.log2() + (1.0 + g1.abs() / sg1).log2());
        }
    }
    let n_bins = if width > 0.0 {
        (range / width).ceil().max(1.0) as usize
    } else {
        1
    };

    (0..=n_bins)
        .map(|i| {
            if i == n_bins {
                max
            } else {
                min + range * i as f64 / n_bins as f64
            }
        })
        .collect()
}

/// Counts per bin; the last bin is right-closed and out-of-range values are
/// ignored
pub fn histogram(values: &[f64], edges: &[f64]) -> Vec<f64> {
    let n_bins = edges.len().saturating_sub(1);
    let mut counts = vec![0.0; n_bins];
    if n_bins == 0 {
        return counts;
    }
    let (first, last) = (edges[0], edges[n_bins]);
    for &v in values {
        if v.is_nan() || v < first || v > last {
            continue;
        }
        let bin = if v == last {
            n_bins - 1
        } else {
            edges.partition_point(|e| *e <= v).saturating_sub(1).min(n_bins - 1)
        };
        counts[bin] += 1.0;
    }
    counts
}

/// Jensen-Shannon distance with base-2 logarithms, in `[0, 1]`
///
/// Both inputs are normalised to sum to one.
pub fn jensen_shannon_distance(p: &[f64], q: &[f64]) -> f64 {
    let p_sum: f64 = p.iter().sum();
    let q_sum: f64 = q.iter().sum();
    if p.len() != q.len() || !(p_sum > 0.0) || !(q_sum > 0.0) {
        return f64::NAN;
    }

    let kl = |a: f64, m: f64| if a > 0.0 { a * (a / m).log2() } else { 0.0 };
    let divergence: f64 = p
        .iter()
        .zip(q)
        .map(|(pi, qi)| {
            let (pi, qi) = (pi / p_sum, qi / q_sum);
            let m = 0.5 * (pi + qi);
            0.5 * (kl(pi, m) + kl(qi, m))
        })
        .sum();
    divergence.max(0.0).sqrt().min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ks_identical_samples() {
        let a: Vec<f64> = (0..200).map(|i| i as f64).collect();
        let (d, p) = ks_two_sample(&a, &a);
        assert!(d.abs() < 1e-12);
        assert!((p - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ks_disjoint_samples() {
        let a: Vec<f64> = (0..200).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..200).map(|i| 1000.0 + i as f64).collect();
        let (d, p) = ks_two_sample(&a, &b);
        assert!((d - 1.0).abs() < 1e-12);
        assert!(p < 1e-6);
    }

    #[test]
    fn test_ks_half_shift() {
        let a: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let b: Vec<f64> = (50..150).map(|i| i as f64).collect();
        let (d, _) = ks_two_sample(&a, &b);
        assert!((d - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_chi2_single_category() {
        assert_eq!(chi2_contingency(&[10.0], &[20.0]), (0.0, 1.0));
    }

    #[test]
    fn test_chi2_collapsed_category_is_finite() {
        let (stat, p) = chi2_contingency(&[50.0, 30.0, 20.0], &[60.0, 40.0, 0.0]);
        assert!(stat.is_finite() && stat > 0.0);
        assert!(p.is_finite() && (0.0..=1.0).contains(&p));
        assert!(p < 0.05);
    }

    #[test]
    fn test_chi2_yates_correction() {
        // 2x2 table [[10, 20], [20, 10]]: corrected statistic 5.4
        let (stat, p) = chi2_contingency(&[10.0, 20.0], &[20.0, 10.0]);
        assert!((stat - 5.4).abs() < 1e-9);
        assert!((p - 0.020136).abs() < 1e-4);
    }

    #[test]
    fn test_doane_edges_cover_range() {
        let values: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.37).sin()).collect();
        let edges = doane_bin_edges(&values);
        assert!(edges.len() > 2);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(edges[0], min);
        assert_eq!(*edges.last().unwrap(), max);
        let counts = histogram(&values, &edges);
        assert_eq!(counts.iter().sum::<f64>(), 1000.0);
    }

    #[test]
    fn test_histogram_right_closed_and_out_of_range() {
        let counts = histogram(&[0.0, 0.5, 1.0, 2.0, -1.0], &[0.0, 0.5, 1.0]);
        assert_eq!(counts, vec![1.0, 2.0]);
    }

    #[test]
    fn test_constant_sample_single_bin() {
        assert_eq!(doane_bin_edges(&[3.0, 3.0, 3.0]), vec![2.5, 3.5]);
    }

    #[test]
    fn test_js_distance_bounds() {
        assert!(jensen_shannon_distance(&[0.5, 0.5], &[0.5, 0.5]).abs() < 1e-12);
        let disjoint = jensen_shannon_distance(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((disjoint - 1.0).abs() < 1e-12);
        let partial = jensen_shannon_distance(&[0.7, 0.3], &[0.4, 0.6]);
        assert!(partial > 0.0 && partial < 1.0);
        assert!(jensen_shannon_distance(&[0.0, 0.0], &[1.0, 0.0]).is_nan());
    }
}

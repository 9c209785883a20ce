//! Small numeric kernels shared by the decoding and uncertainty stages.

/// Numerically stable softmax over raw class scores.
///
/// Falls back to a uniform distribution when the scores are not finite.
pub fn softmax(scores: &[f32]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let max = scores
        .iter()
        .map(|&s| s as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|&s| (s as f64 - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    if total == 0.0 || !total.is_finite() {
        let uniform = 1.0 / scores.len() as f64;
        return vec![uniform; scores.len()];
    }
    exps.into_iter().map(|e| e / total).collect()
}

/// Index of the largest value; the first one wins on ties.
pub fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Shannon entropy normalized by `ln(num_classes)`, clamped to `[0, 1]`.
///
/// Each probability is floored at `epsilon` before the logarithm. A single
/// class distribution has zero entropy.
pub fn normalized_entropy(probabilities: &[f64], epsilon: f64) -> f64 {
    if probabilities.len() < 2 {
        return 0.0;
    }
    let h: f64 = probabilities
        .iter()
        .map(|&p| {
            let p = p.max(epsilon);
            -p * p.ln()
        })
        .sum();
    let max_entropy = (probabilities.len() as f64).ln();
    (h / max_entropy).clamp(0.0, 1.0)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance (divisor `n`); zero for fewer than two values.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Empirical quantile with linear interpolation between the two nearest
/// order statistics (`q` in `[0, 1]`, rank `q * (n - 1)`).
///
/// The result always lies between the sample minimum and maximum.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let q = q.clamp(0.0, 1.0);
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[2.0, 1.0, 0.1]);
        let total: f64 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(probs[0] > probs[1] && probs[1] > probs[2]);
    }

    #[test]
    fn test_softmax_handles_large_logits() {
        let probs = softmax(&[1000.0, 0.0]);
        assert!((probs[0] - 1.0).abs() < 1e-12);
        assert!(probs[1] >= 0.0);
    }

    #[test]
    fn test_softmax_non_finite_falls_back_to_uniform() {
        let probs = softmax(&[f32::NAN, 1.0]);
        assert_eq!(probs, vec![0.5, 0.5]);
    }

    #[test]
    fn test_argmax_first_on_tie() {
        assert_eq!(argmax(&[0.5, 0.5]), Some(0));
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_entropy_bounds() {
        assert!(normalized_entropy(&[1.0, 0.0], 1e-10) < 1e-6);
        assert!((normalized_entropy(&[0.5, 0.5], 1e-10) - 1.0).abs() < 1e-9);
        let uniform4 = [0.25; 4];
        assert!((normalized_entropy(&uniform4, 1e-10) - 1.0).abs() < 1e-9);
        assert_eq!(normalized_entropy(&[1.0], 1e-10), 0.0);
    }

    #[test]
    fn test_variance_degenerate_and_known() {
        assert_eq!(variance(&[0.3]), 0.0);
        assert!((variance(&[0.0, 1.0]) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 1.0), Some(4.0));
        assert_eq!(percentile(&values, 0.5), Some(2.5));
        // rank 0.025 * 3 = 0.075
        let p = percentile(&values, 0.025).unwrap();
        assert!((p - 1.075).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_rejects_empty_and_nan() {
        assert_eq!(percentile(&[], 0.5), None);
        assert_eq!(percentile(&[0.1, f64::NAN], 0.5), None);
    }
}

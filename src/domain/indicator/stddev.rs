//! Rolling sample standard deviation.
//!
//! STDDEV(n)[i] = sqrt(sum((X[i-j] - mean)^2 for j in 0..n) / (n - 1))
//! A one-element window has a deviation of 0. Deviations are taken relative to
//! the window's first value, so a constant window is exactly 0 at any price.

/// Sample standard deviation of each trailing window, `None` until `period`
/// values are available.
pub fn rolling_sample_stddev(values: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if period == 0 || i + 1 < period {
                return None;
            }
            let window = &values[i + 1 - period..=i];
            Some(sample_stddev(window))
        })
        .collect()
}

pub fn sample_stddev(window: &[f64]) -> f64 {
    let n = window.len();
    if n < 2 {
        return 0.0;
    }
    let pivot = window[0];
    let mean = window.iter().map(|x| x - pivot).sum::<f64>() / n as f64;
    let variance = window
        .iter()
        .map(|x| {
            let diff = (x - pivot) - mean;
            diff * diff
        })
        .sum::<f64>()
        / (n - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_n_minus_one_denominator() {
        // mean 20, squared deviations 100 + 0 + 100 = 200, /2 = 100
        assert!((sample_stddev(&[10.0, 20.0, 30.0]) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn constant_window_is_zero() {
        assert_eq!(sample_stddev(&[5.0, 5.0, 5.0, 5.0]), 0.0);
    }

    #[test]
    fn constant_window_at_non_dyadic_price_is_zero() {
        // a plain mean of twenty 10.1s lands one ulp below 10.1
        assert_eq!(sample_stddev(&[10.1; 20]), 0.0);
        assert_eq!(sample_stddev(&[0.3; 7]), 0.0);
        assert!(rolling_sample_stddev(&[1234.56; 30], 20)
            .iter()
            .flatten()
            .all(|&s| s == 0.0));
    }

    #[test]
    fn rolling_warmup() {
        let out = rolling_sample_stddev(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert!((out[2].unwrap() - 1.0).abs() < 1e-12);
        assert!((out[3].unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn single_element_window() {
        let out = rolling_sample_stddev(&[3.0, 4.0], 1);
        assert_eq!(out, vec![Some(0.0), Some(0.0)]);
    }
}

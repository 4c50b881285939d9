//! Exponential smoothing used by MACD.
//!
//! alpha = 2/(span+1), seeded with the first value (no bias correction):
//! EMA[0] = X[0], EMA[i] = alpha*X[i] + (1-alpha)*EMA[i-1].
//! Every point is defined; there is no warmup.

pub fn exponential_smooth(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;

    for &x in values {
        let next = match prev {
            None => x,
            Some(p) => alpha * x + (1.0 - alpha) * p,
        };
        out.push(next);
        prev = Some(next);
    }

    out
}

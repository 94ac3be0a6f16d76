//! Full cross-correlation
//!
//! For `a` of length N and `b` of length M the output has N + M - 1 values.
//! Index `k` corresponds to lag `k - (M - 1)`:
//!
//! ```text
//! z[k] = Σ_n a[n + lag] * b[n]
//! ```
//!
//! Direct O(N·M) evaluation.

/// Cross-correlate `a` against `b` over every overlapping lag
pub fn correlate_full(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let n = a.len() as isize;
    let m = b.len() as isize;

    (0..(n + m - 1))
        .map(|k| {
            let lag = k - (m - 1);
            // 0 <= i < m and 0 <= i + lag < n
            let start = (-lag).max(0);
            let end = m.min(n - lag);
            (start..end)
                .map(|i| a[(i + lag) as usize] * b[i as usize])
                .sum::<f64>()
        })
        .collect()
}

/// Lag of output index `index` for a second signal of length `m`
pub fn index_to_lag(index: usize, m: usize) -> isize {
    index as isize - (m as isize - 1)
}

/// Index and value of the maximum
pub fn find_peak(correlation: &[f64]) -> Option<(usize, f64)> {
    correlation
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((i, v)),
        })
}

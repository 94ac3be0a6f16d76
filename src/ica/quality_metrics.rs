/// Per-signal statistics used to describe components and screen segments
pub struct QualityMetrics;

impl QualityMetrics {
    pub fn mean(data: &[f64]) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        data.iter().sum::<f64>() / data.len() as f64
    }

    /// Population variance
    pub fn variance(data: &[f64]) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        let mean = Self::mean(data);
        data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64
    }

    /// Excess kurtosis, E[(X-μ)^4] / σ^4 - 3
    ///
    /// ≈ 0 for Gaussian sources; blinks and heartbeats are strongly positive.
    pub fn kurtosis(data: &[f64]) -> f64 {
        if data.len() < 4 {
            return 0.0;
        }
        let n = data.len() as f64;
        let mean = Self::mean(data);
        let (m2, m4) = data.iter().fold((0.0, 0.0), |(m2, m4), &x| {
            let d = (x - mean).powi(2);
            (m2 + d, m4 + d * d)
        });
        let (m2, m4) = (m2 / n, m4 / n);
        if m2 < 1e-10 {
            return 0.0;
        }
        m4 / (m2 * m2) - 3.0
    }

    /// E[(X-μ)^3] / σ^3
    pub fn skewness(data: &[f64]) -> f64 {
        if data.len() < 3 {
            return 0.0;
        }
        let n = data.len() as f64;
        let mean = Self::mean(data);
        let m2 = data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n;
        let m3 = data.iter().map(|&x| (x - mean).powi(3)).sum::<f64>() / n;
        if m2 < 1e-10 {
            return 0.0;
        }
        m3 / m2.powf(1.5)
    }

    /// Max minus min
    pub fn peak_to_peak(data: &[f64]) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        let (min, max) = data
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                (lo.min(x), hi.max(x))
            });
        max - min
    }

    /// Pearson correlation; 0 when either input is constant
    pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
        let n = a.len().min(b.len());
        if n < 2 {
            return 0.0;
        }
        let (a, b) = (&a[..n], &b[..n]);
        let (mean_a, mean_b) = (Self::mean(a), Self::mean(b));
        let (cov, var_a, var_b) = a.iter().zip(b).fold((0.0, 0.0, 0.0), |(c, va, vb), (&x, &y)| {
            let (dx, dy) = (x - mean_a, y - mean_b);
            (c + dx * dy, va + dx * dx, vb + dy * dy)
        });
        let denom = (var_a * var_b).sqrt();
        if denom < 1e-12 {
            return 0.0;
        }
        cov / denom
    }
}

//! Two-pass mean/variance accumulator with outlier rejection.

/// Width of the outlier acceptance band, in standard deviations.
pub const OUTLIER_SIGMAS: f64 = 2.0;

/// Two-pass statistics accumulator.
///
/// The first pass feeds every sample through [`ValueStats::add_value`] and
/// fixes the mean with [`ValueStats::compute_avg`]; the second pass feeds the
/// same samples through [`ValueStats::add_diff`] and derives the variance
/// with [`ValueStats::compute_var`]. Two passes keep the variance exact
/// rather than streamed, which matters because the outlier filter needs the
/// pre-filter mean before any sample can be judged.
///
/// # Example
///
/// ```
/// use circa::statistics::ValueStats;
///
/// let mut stats = ValueStats::new();
/// for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
///     stats.add_value(v);
/// }
/// stats.compute_avg();
/// for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
///     stats.add_diff(v);
/// }
/// stats.compute_var();
/// assert!((stats.avg() - 3.0).abs() < 1e-12);
/// assert!((stats.var() - 2.5).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ValueStats {
    count: usize,
    sum: f64,
    diff_sq_sum: f64,
    avg: f64,
    var: f64,
}

impl ValueStats {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// First pass: record one sample.
    pub fn add_value(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
    }

    /// Fix the mean after the first pass.
    ///
    /// With no samples the mean stays 0.
    pub fn compute_avg(&mut self) {
        if self.count > 0 {
            self.avg = self.sum / self.count as f64;
        }
    }

    /// Second pass: record one sample's squared deviation from the mean.
    pub fn add_diff(&mut self, v: f64) {
        let d = v - self.avg;
        self.diff_sq_sum += d * d;
    }

    /// Fix the variance after the second pass (sample variance, `n - 1`).
    ///
    /// Needs at least two samples; otherwise the variance stays 0.
    pub fn compute_var(&mut self) {
        if self.count > 1 {
            self.var = self.diff_sq_sum / (self.count - 1) as f64;
        }
    }

    /// Number of samples recorded by the first pass.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean fixed by [`ValueStats::compute_avg`].
    pub fn avg(&self) -> f64 {
        self.avg
    }

    /// Variance fixed by [`ValueStats::compute_var`].
    pub fn var(&self) -> f64 {
        self.var
    }

    /// Standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.var.sqrt()
    }

    /// Run both passes over a slice in one call.
    pub fn from_samples(samples: &[f64]) -> Self {
        let mut stats = Self::new();
        for &v in samples {
            stats.add_value(v);
        }
        stats.compute_avg();
        for &v in samples {
            stats.add_diff(v);
        }
        stats.compute_var();
        stats
    }
}

/// Split samples into accepted and rejected against pre-filter statistics.
///
/// A sample `v` is accepted iff `|v - avg| < 2 * sqrt(var)`, where `avg` and
/// `var` come from the unfiltered first pass over the same data. Rejected
/// samples do not contribute to any downstream count.
pub fn filter_outliers(samples: &[f64], prefilter: &ValueStats) -> (Vec<f64>, usize) {
    let band = OUTLIER_SIGMAS * prefilter.std_dev();
    let avg = prefilter.avg();
    let mut accepted = Vec::with_capacity(samples.len());
    let mut rejected = 0usize;
    for &v in samples {
        if (v - avg).abs() < band {
            accepted.push(v);
        } else {
            rejected += 1;
        }
    }
    (accepted, rejected)
}

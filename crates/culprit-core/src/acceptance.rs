use std::fmt;

/// Inclusive numeric band `[low, high]` a metric must fall within to pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptanceBand {
    pub low: f64,
    pub high: f64,
}

impl Default for AcceptanceBand {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl AcceptanceBand {
    /// Unset bounds default to -inf / +inf.
    pub fn new(low: Option<f64>, high: Option<f64>) -> Self {
        Self {
            low: low.unwrap_or(f64::NEG_INFINITY),
            high: high.unwrap_or(f64::INFINITY),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None, None)
    }

    /// `None` when the metric is absent: inconclusive, not a failure.
    pub fn classify(&self, metric_value: Option<f64>) -> Option<bool> {
        classify(metric_value, self.low, self.high)
    }

    pub fn is_valid(&self) -> bool {
        !self.low.is_nan() && !self.high.is_nan() && self.low <= self.high
    }
}

impl fmt::Display for AcceptanceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.low, self.high)
    }
}

/// Classify a metric value against `[low, high]`, both bounds inclusive.
pub fn classify(metric_value: Option<f64>, low: f64, high: f64) -> Option<bool> {
    metric_value.map(|v| low <= v && v <= high)
}

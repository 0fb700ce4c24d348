use crate::errors::{QuantError, QuantResult};

/// Evenly spaced values from `start` to `end` inclusive, `steps + 1` points.
///
/// Values are computed from the index rather than accumulated, so the last
/// point is exactly `end`.
#[derive(Debug, Clone, Copy)]
pub struct LinearSequence {
    start: f64,
    end: f64,
    steps: usize,
    index: usize,
}

impl LinearSequence {
    pub fn new(start: f64, end: f64, steps: usize) -> Self {
        Self {
            start,
            end,
            steps,
            index: 0,
        }
    }

    #[inline]
    pub fn value(&self, i: usize) -> f64 {
        if self.steps == 0 {
            return self.start;
        }
        if i >= self.steps {
            return self.end;
        }
        self.start + (self.end - self.start) * (i as f64 / self.steps as f64)
    }

    #[inline]
    pub fn step_size(&self) -> f64 {
        if self.steps == 0 {
            0.0
        } else {
            (self.end - self.start) / self.steps as f64
        }
    }
}

impl Iterator for LinearSequence {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.index > self.steps {
            return None;
        }
        let v = self.value(self.index);
        self.index += 1;
        Some(v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.steps + 1).saturating_sub(self.index);
        (left, Some(left))
    }
}

impl ExactSizeIterator for LinearSequence {}

/// Geometrically spaced values from `start` to `end` inclusive.
/// Both ends must be strictly positive.
#[derive(Debug, Clone, Copy)]
pub struct LogSequence {
    inner: LinearSequence,
}

impl LogSequence {
    pub fn new(start: f64, end: f64, steps: usize) -> QuantResult<Self> {
        if !(start > 0.0 && end > 0.0) {
            return Err(QuantError::InvalidInput(format!(
                "log sequence needs positive bounds, got [{start}, {end}]"
            )));
        }
        Ok(Self {
            inner: LinearSequence::new(start.ln(), end.ln(), steps),
        })
    }

    #[inline]
    pub fn value(&self, i: usize) -> f64 {
        self.inner.value(i).exp()
    }
}

impl Iterator for LogSequence {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        self.inner.next().map(f64::exp)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for LogSequence {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_endpoints_and_count() {
        let seq: Vec<f64> = LinearSequence::new(0.0, 1.0, 4).collect();
        assert_eq!(seq, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_linear_zero_steps() {
        let seq: Vec<f64> = LinearSequence::new(3.0, 7.0, 0).collect();
        assert_eq!(seq, vec![3.0]);
    }

    #[test]
    fn test_log_is_geometric() {
        let seq: Vec<f64> = LogSequence::new(1.0, 100.0, 2).unwrap().collect();
        assert_eq!(seq.len(), 3);
        assert!((seq[1] - 10.0).abs() < 1e-12, "midpoint={}", seq[1]);
        assert!((seq[2] - 100.0).abs() < 1e-10);
    }

    #[test]
    fn test_log_rejects_non_positive() {
        assert!(LogSequence::new(0.0, 10.0, 5).is_err());
    }
}

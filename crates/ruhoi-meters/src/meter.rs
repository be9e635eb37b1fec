use crate::{MeterError, Result};
use serde_json::Value;
use std::fmt;
use std::ops::Index;

/// Element types a meter accepts.
pub trait Numeric: Copy + PartialOrd + fmt::Debug {
    fn to_f64(self) -> f64;
}

macro_rules! impl_numeric {
    ($($t:ty),*) => {
        $(impl Numeric for $t {
            fn to_f64(self) -> f64 {
                self as f64
            }
        })*
    };
}

impl_numeric!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

/// Which statistic [`NumericMeter::aggregate`] computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Mean,
    Max,
    Min,
}

/// Append-only log of numbers.
///
/// Every constructor starts from its own empty storage.  Aggregates of an
/// empty meter are `None`.
#[derive(Clone, PartialEq)]
pub struct NumericMeter<T: Numeric> {
    values: Vec<T>,
}

impl<T: Numeric> Default for NumericMeter<T> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<T: Numeric> NumericMeter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: Vec<T>) -> Self {
        Self { values }
    }

    pub fn push(&mut self, x: T) {
        self.values.push(x);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&T> {
        self.values.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.values.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }

    pub fn sum(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.values.iter().map(|v| v.to_f64()).sum())
    }

    pub fn mean(&self) -> Option<f64> {
        self.sum().map(|s| s / self.len() as f64)
    }

    pub fn max(&self) -> Option<T> {
        self.extreme(|candidate, best| candidate > best)
    }

    pub fn min(&self) -> Option<T> {
        self.extreme(|candidate, best| candidate < best)
    }

    pub fn aggregate(&self, how: Aggregation) -> Option<f64> {
        match how {
            Aggregation::Sum => self.sum(),
            Aggregation::Mean => self.mean(),
            Aggregation::Max => self.max().map(Numeric::to_f64),
            Aggregation::Min => self.min().map(Numeric::to_f64),
        }
    }

    /// First element that beats every other under `better`.
    fn extreme(&self, better: impl Fn(&T, &T) -> bool) -> Option<T> {
        let mut it = self.values.iter();
        let mut best = *it.next()?;
        for v in it {
            if better(v, &best) {
                best = *v;
            }
        }
        Some(best)
    }
}

impl NumericMeter<f64> {
    /// Build from loosely typed values, rejecting anything that is not a
    /// JSON number.
    pub fn try_from_values(values: &[Value]) -> Result<Self> {
        let mut meter = Self::new();
        for v in values {
            meter.try_push_value(v)?;
        }
        Ok(meter)
    }

    pub fn try_push_value(&mut self, v: &Value) -> Result<()> {
        let x = v.as_f64().ok_or_else(|| MeterError::NonNumeric(v.to_string()))?;
        self.push(x);
        Ok(())
    }
}

impl<T: Numeric> Index<usize> for NumericMeter<T> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        &self.values[i]
    }
}

impl<'a, T: Numeric> IntoIterator for &'a NumericMeter<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl<T: Numeric> Extend<T> for NumericMeter<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.values.extend(iter);
    }
}

impl<T: Numeric> fmt::Debug for NumericMeter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NumericMeter({:?})", self.values)
    }
}

use crate::NumericMeter;
use std::ops::Deref;
use std::time::Instant;

/// A meter of elapsed times, in seconds.
#[derive(Debug, Clone, Default)]
pub struct HandyTimer {
    meter: NumericMeter<f64>,
}

impl HandyTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing; the elapsed time is recorded when the guard drops.
    pub fn start(&mut self) -> TimerGuard<'_> {
        TimerGuard {
            timer: self,
            started: Instant::now(),
        }
    }

    /// Time one call of `f`.
    pub fn time<R>(&mut self, f: impl FnOnce() -> R) -> R {
        let _guard = self.start();
        f()
    }

    pub fn meter(&self) -> &NumericMeter<f64> {
        &self.meter
    }

    pub fn reset(&mut self) {
        self.meter.reset();
    }
}

impl Deref for HandyTimer {
    type Target = NumericMeter<f64>;

    fn deref(&self) -> &Self::Target {
        &self.meter
    }
}

/// Records one duration into its [`HandyTimer`] on drop, including while
/// unwinding.
pub struct TimerGuard<'a> {
    timer: &'a mut HandyTimer,
    started: Instant,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.meter.push(self.started.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::time::Duration;

    #[test]
    fn each_block_appends_one_entry() {
        let mut timer = HandyTimer::new();
        {
            let _g = timer.start();
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(timer.len(), 1);
        assert!(timer[0] >= 0.002);

        let out = timer.time(|| 7);
        assert_eq!(out, 7);
        assert_eq!(timer.len(), 2);
        assert!(timer.iter().all(|&t| t >= 0.0));
    }

    #[test]
    fn early_return_still_records() {
        fn work(timer: &mut HandyTimer, bail: bool) -> Option<u32> {
            let _g = timer.start();
            if bail {
                return None;
            }
            Some(1)
        }
        let mut timer = HandyTimer::new();
        assert_eq!(work(&mut timer, true), None);
        assert_eq!(work(&mut timer, false), Some(1));
        assert_eq!(timer.len(), 2);
    }

    #[test]
    fn panicking_block_still_records() {
        let mut timer = HandyTimer::new();
        let r = catch_unwind(AssertUnwindSafe(|| {
            timer.time(|| panic!("boom"));
        }));
        assert!(r.is_err());
        assert_eq!(timer.len(), 1);
    }

    #[test]
    fn statistics_cover_recorded_times() {
        let mut timer = HandyTimer::new();
        for _ in 0..3 {
            timer.time(|| ());
        }
        let values: Vec<f64> = timer.iter().copied().collect();
        let sum: f64 = values.iter().sum();
        assert_eq!(timer.sum(), Some(sum));
        assert_eq!(timer.mean(), Some(sum / 3.0));
        assert!(timer.min() <= timer.max());
        timer.reset();
        assert!(timer.is_empty());
    }
}

use std::cell::Cell;

/// Source of monotonically increasing seconds.
pub trait TimeSource {
    fn now(&self) -> f64;
}

/// Wall-clock time: `Instant` natively, `performance.now()` in the browser.
#[derive(Debug)]
pub struct MonotonicTime {
    #[cfg(not(target_arch = "wasm32"))]
    origin: std::time::Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            origin: std::time::Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    #[cfg(not(target_arch = "wasm32"))]
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    #[cfg(target_arch = "wasm32")]
    fn now(&self) -> f64 {
        web_sys::window()
            .and_then(|window| window.performance())
            .map(|performance| performance.now() / 1000.0)
            .unwrap_or(0.0)
    }
}

/// Deterministic time that advances by `step` seconds on every read.
#[derive(Debug)]
pub struct FixedStep {
    step: f64,
    current: Cell<f64>,
}

impl FixedStep {
    pub fn new(step: f64) -> Self {
        Self {
            step,
            current: Cell::new(0.0),
        }
    }
}

impl TimeSource for FixedStep {
    fn now(&self) -> f64 {
        let value = self.current.get() + self.step;
        self.current.set(value);
        value
    }
}

/// Elapsed time since the clock was started.
pub struct Clock {
    source: Box<dyn TimeSource>,
    start: f64,
}

impl Clock {
    pub fn new(source: Box<dyn TimeSource>) -> Self {
        let start = source.now();
        Self { source, start }
    }

    pub fn monotonic() -> Self {
        Self::new(Box::new(MonotonicTime::new()))
    }

    pub fn fixed_step(step: f64) -> Self {
        Self::new(Box::new(FixedStep::new(step)))
    }

    pub fn elapsed(&self) -> f32 {
        (self.source.now() - self.start).max(0.0) as f32
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock").field("start", &self.start).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_step_clock_counts_from_zero() {
        let clock = Clock::fixed_step(0.25);
        assert_eq!(clock.elapsed(), 0.25);
        assert_eq!(clock.elapsed(), 0.5);
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = Clock::monotonic();
        let first = clock.elapsed();
        let second = clock.elapsed();
        assert!(first >= 0.0);
        assert!(second >= first);
    }
}

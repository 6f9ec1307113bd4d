use std::time::{Duration, Instant};

/// Frame timing snapshot handed to `update` and `render`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameTime {
    /// Seconds since the first tick. Never decreases.
    pub time: f64,

    /// Time elapsed since the previous frame tick, in seconds.
    ///
    /// Zero on the first frame, when no prior timestamp exists.
    pub dt: f32,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    /// Monotonic frame counter.
    pub frame_index: u64,
}

/// Frame clock producing `FrameTime` snapshots.
///
/// Delta time is clamped to avoid pathological values when the host is paused
/// by the debugger, minimized, or stalls. `time` accumulates the clamped
/// deltas, so it advances exactly by the `dt` each frame reports.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Instant>,
    time: f64,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    /// Creates a new clock with default clamps.
    ///
    /// Clamp rationale:
    /// - minimum prevents zero-dt behavior from tight loops on some platforms
    /// - maximum prevents simulation explosions after long stalls
    pub fn new() -> Self {
        Self::with_clamps(
            Duration::from_micros(100), // 0.0001s
            Duration::from_millis(250), // 0.25s
        )
    }

    /// Creates a clock with custom delta-time clamps.
    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: None,
            time: 0.0,
            frame_index: 0,
            dt_min,
            dt_max,
        }
    }

    /// Resets the clock baseline, keeping accumulated time.
    ///
    /// The next tick reports a zero delta. Useful when resuming from suspension.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Number of ticks so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_index
    }

    /// Advances the clock to the current instant.
    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    /// Advances the clock to `now`.
    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = match self.last {
            None => Duration::ZERO,
            Some(last) => now
                .saturating_duration_since(last)
                .clamp(self.dt_min, self.dt_max),
        };

        self.last = Some(now);
        self.time += dt.as_secs_f64();

        let ft = FrameTime {
            time: self.time,
            dt: dt.as_secs_f32(),
            now,
            frame_index: self.frame_index,
        };

        self.frame_index = self.frame_index.wrapping_add(1);

        ft
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_has_zero_delta() {
        let mut clock = FrameClock::new();
        let ft = clock.tick();
        assert_eq!(ft.dt, 0.0);
        assert_eq!(ft.time, 0.0);
        assert_eq!(ft.frame_index, 0);
    }

    #[test]
    fn deltas_are_clamped() {
        let start = Instant::now();
        let mut clock = FrameClock::new();
        clock.tick_at(start);

        let stalled = clock.tick_at(start + Duration::from_secs(3));
        assert_eq!(stalled.dt, 0.25);

        let tight = clock.tick_at(stalled.now);
        assert_eq!(tight.dt, Duration::from_micros(100).as_secs_f32());
    }

    #[test]
    fn time_accumulates_deltas() {
        let start = Instant::now();
        let mut clock = FrameClock::new();
        let mut previous = clock.tick_at(start);

        for frame in 1..=10u32 {
            let ft = clock.tick_at(start + Duration::from_millis(16) * frame);
            assert!(ft.time >= previous.time);
            assert!((ft.time - previous.time - f64::from(ft.dt)).abs() < 1e-6);
            previous = ft;
        }
        assert_eq!(clock.frame_count(), 11);
        assert!((previous.time - 0.16).abs() < 1e-6);
    }

    #[test]
    fn reset_restarts_delta() {
        let start = Instant::now();
        let mut clock = FrameClock::new();
        clock.tick_at(start);
        clock.tick_at(start + Duration::from_millis(10));

        clock.reset();
        let ft = clock.tick_at(start + Duration::from_secs(5));
        assert_eq!(ft.dt, 0.0);
        assert!((ft.time - 0.01).abs() < 1e-6);
    }
}

//! Progress display for slice evaluation (feature `progress`).
//!
//! * [`IterTimer`] – per-iteration timing smoothed by an exponential moving average,
//!   `ema ← α·dt + (1–α)·ema`. The first tick initializes the average.
//! * [`fmt_dur`] – short human-readable durations (`"253µs"`, `"42ms"`, `"3.14s"`).
//! * [`GroupProgress`] – an `indicatif` bar over the slices of one execution group.
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

pub struct IterTimer {
    last: Instant,
    ema_ns: f64,
    alpha: f64,
    count: u64,
}

impl IterTimer {
    pub fn new(alpha: f64) -> Self {
        Self {
            last: Instant::now(),
            ema_ns: 0.0,
            alpha,
            count: 0,
        }
    }

    #[inline]
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now.duration_since(self.last);
        self.last = now;
        self.count += 1;

        let dt_ns = dt.as_nanos() as f64;
        self.ema_ns = if self.count == 1 {
            dt_ns
        } else {
            self.alpha * dt_ns + (1.0 - self.alpha) * self.ema_ns
        };
        dt
    }

    #[inline]
    pub fn avg(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.ema_ns as u64)
        }
    }
}

#[inline]
pub fn fmt_dur(d: Duration) -> String {
    let us = d.as_micros();
    if us < 1_000 {
        format!("{us}µs")
    } else if d.as_millis() < 1_000 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.2}s", d.as_secs_f32())
    }
}

/// Progress bar over the slices of one group.
pub(crate) struct GroupProgress {
    pb: ProgressBar,
    timer: IterTimer,
}

impl GroupProgress {
    pub(crate) fn new(n_slices: usize, label: &str) -> Self {
        let pb = ProgressBar::new(n_slices.max(1) as u64);
        let style = ProgressStyle::with_template(
            "{prefix} {bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | {per_sec} | ETA {eta_precise} | {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_prefix(label.to_string());
        pb.enable_steady_tick(Duration::from_millis(200));
        GroupProgress {
            pb,
            timer: IterTimer::new(0.2),
        }
    }

    /// One slice done (sequential evaluation).
    pub(crate) fn tick(&mut self) {
        let last = self.timer.tick();
        let avg = self.timer.avg();
        self.pb
            .set_message(format!("last: {}, avg: {}", fmt_dur(last), fmt_dur(avg)));
        self.pb.inc(1);
    }

    /// One slice done, from any thread.
    #[cfg_attr(not(feature = "parallel"), allow(dead_code))]
    pub(crate) fn inc(&self) {
        self.pb.inc(1);
    }

    pub(crate) fn finish(self) {
        self.pb.disable_steady_tick();
        self.pb.finish_and_clear();
    }
}

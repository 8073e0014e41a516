//! Terminal progress for the event loop (`progress` feature).
//!
//! Components
//! -----------------
//! * [`IterTimer`] – per-row duration with an **exponential moving average**
//!   `ema ← α·dt + (1–α)·ema`, `α ∈ (0,1]`. The first tick initializes the average.
//! * [`fmt_dur`] – formats a [`Duration`] as `"253µs"`, `"42ms"` or `"3.14s"`.
//! * [`EventProgress`] – an `indicatif` bar over the events to read, showing the last and
//!   average time per event and the partition being read.
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

/// Progress bar over the events of a run.
pub struct EventProgress {
    bar: ProgressBar,
    timer: IterTimer,
}

impl EventProgress {
    /// Arguments
    /// -----------------
    /// * `total`: number of events expected, when known (row ceiling or declared row counts).
    pub fn new(total: Option<u64>) -> Self {
        let bar = match total {
            Some(total) => ProgressBar::new(total.max(1)),
            None => ProgressBar::new_spinner(),
        };
        let style = ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | {per_sec} | ETA {eta_precise} | {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(200));
        EventProgress {
            bar,
            timer: IterTimer::new(0.2),
        }
    }

    /// Record one processed event.
    pub fn tick(&mut self, partition: Option<&str>) {
        let last = self.timer.tick();
        let avg = self.timer.avg();
        self.bar.set_message(format!(
            "last: {}, avg: {} | {}",
            fmt_dur(last),
            fmt_dur(avg),
            partition.unwrap_or("-")
        ));
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        self.bar.disable_steady_tick();
        self.bar.finish_and_clear();
    }
}

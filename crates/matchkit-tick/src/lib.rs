//! Fixed-rate tick pacing for Matchkit match loops.
//!
//! A match loop runs at a rate fixed when the match initializes (ticks per
//! second, at least 1). The [`Ticker`] here produces one resolution of
//! [`Ticker::wait`] per period and is designed to sit inside a dispatcher's
//! `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = stop_rx.changed() => break,
//!         info = ticker.wait() => { /* schedule a loop invocation */ }
//!         Some(call) = call_rx.recv() => { /* run it */ }
//!     }
//! }
//! ```
//!
//! When the dispatcher falls behind (a slow callback holds it past one or
//! more deadlines), the ticker skips ahead rather than bursting: the next
//! deadline is rescheduled from "now", so a stall never produces a
//! catch-up storm of loop invocations.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tick pacing configuration.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Tick rate in Hz. Clamped into `1..=MAX_RATE_HZ` by [`validated`].
    ///
    /// [`validated`]: TickConfig::validated
    pub rate_hz: u32,
    /// Random jitter (0–max µs) added to the *first* deadline, so matches
    /// created in the same instant don't all tick at once.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            rate_hz: 30,
            initial_jitter_us: 2_000, // 0–2 ms
        }
    }
}

impl TickConfig {
    /// Maximum supported tick rate.
    pub const MAX_RATE_HZ: u32 = 128;

    /// Create a config for a specific tick rate with default jitter.
    pub fn with_rate(rate_hz: u32) -> Self {
        Self {
            rate_hz,
            ..Default::default()
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`Ticker::new`]. A rate below 1 would mean a
    /// match loop that never runs, and a rate above [`Self::MAX_RATE_HZ`]
    /// exceeds what a loop callback can realistically keep up with; both
    /// are clamped with a warning rather than rejected.
    pub fn validated(mut self) -> Self {
        if self.rate_hz < 1 {
            warn!(rate = self.rate_hz, "tick rate below minimum — clamping to 1");
            self.rate_hz = 1;
        }
        if self.rate_hz > Self::MAX_RATE_HZ {
            warn!(
                rate = self.rate_hz,
                max = Self::MAX_RATE_HZ,
                "tick rate exceeds maximum — clamping"
            );
            self.rate_hz = Self::MAX_RATE_HZ;
        }
        self
    }

    /// Duration of a single tick: `1s / rate_hz`.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz.max(1) as f64)
    }
}

// ---------------------------------------------------------------------------
// TickInfo
// ---------------------------------------------------------------------------

/// Information about a fired tick, returned by [`Ticker::wait`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing fire count (starts at 1).
    pub seq: u64,
    /// Fixed delta time, always `1 / rate`.
    pub dt: Duration,
    /// `true` if this tick fired significantly late.
    pub overrun: bool,
    /// How many whole periods were skipped due to the overrun.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Fixed-rate tick source. One `Ticker` per match dispatcher.
pub struct Ticker {
    rate_hz: u32,
    period: Duration,
    next: TokioInstant,
    fired: u64,
}

impl Ticker {
    /// Create a ticker from config.
    ///
    /// The first deadline carries optional jitter to desynchronize matches
    /// created together.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let period = config.period();

        let jitter = if config.initial_jitter_us > 0 {
            let us = rand::rng().random_range(0..config.initial_jitter_us);
            Duration::from_micros(us)
        } else {
            Duration::ZERO
        };

        debug!(
            rate_hz = config.rate_hz,
            period_ms = period.as_secs_f64() * 1000.0,
            "ticker created"
        );

        Self {
            rate_hz: config.rate_hz,
            period,
            next: TokioInstant::now() + period + jitter,
            fired: 0,
        }
    }

    /// Create a ticker for a specific rate with default settings.
    pub fn with_rate(rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(rate_hz))
    }

    /// Wait until the next tick is due.
    ///
    /// If the caller was held past the deadline (slow callback), the missed
    /// periods are skipped and the next deadline is rescheduled from now.
    pub async fn wait(&mut self) -> TickInfo {
        time::sleep_until(self.next).await;

        let now = TokioInstant::now();
        self.fired += 1;

        let late_by = now.saturating_duration_since(self.next);
        let overrun = late_by > self.period / 10; // >10% late
        let mut ticks_skipped = 0u64;

        if overrun {
            ticks_skipped = late_by.as_nanos() as u64 / self.period.as_nanos() as u64;
            if ticks_skipped > 0 {
                warn!(
                    seq = self.fired,
                    skipped = ticks_skipped,
                    late_ms = late_by.as_secs_f64() * 1000.0,
                    "tick overrun — skipping ahead"
                );
            }
            // Reschedule from now, not from the missed deadline.
            self.next = now + self.period;
        } else {
            self.next += self.period;
        }

        trace!(seq = self.fired, overrun, "tick fired");

        TickInfo {
            seq: self.fired,
            dt: self.period,
            overrun,
            ticks_skipped,
        }
    }

    /// The configured tick rate in Hz (after clamping).
    pub fn rate_hz(&self) -> u32 {
        self.rate_hz
    }

    /// The fixed tick period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// How many ticks have fired so far.
    pub fn fired(&self) -> u64 {
        self.fired
    }
}

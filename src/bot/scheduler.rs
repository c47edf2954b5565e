use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::config::AgentSettings;

/// Tick bookkeeping of one module
#[derive(Debug, Clone)]
pub struct TickClock {
    interval: Duration,
    last: Instant,
}

impl TickClock {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last: now,
        }
    }

    /// Modules with a zero interval never tick
    pub fn is_active(&self) -> bool {
        !self.interval.is_zero()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Elapsed time since the last tick if a tick is due
    pub fn due(&self, now: Instant) -> Option<Duration> {
        if !self.is_active() {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.last);
        (elapsed >= self.interval).then_some(elapsed)
    }

    pub fn reset(&mut self, now: Instant) {
        self.last = now;
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.is_active().then(|| self.last + self.interval)
    }
}

/// One observation of the loop
#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    delta: Duration,
    overrun: Duration,
}

/// Rolling scheduling statistics over the last window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSummary {
    pub iterations: usize,
    pub mean_delta: Duration,
    pub max_delta: Duration,
    pub max_overrun: Duration,
}

/// Rolling window of iteration durations and tick lateness
#[derive(Debug)]
pub struct LoopStats {
    window: Duration,
    samples: VecDeque<Sample>,
    last_report: Instant,
}

impl LoopStats {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
            last_report: now,
        }
    }

    /// Record an iteration that took `delta`, with ticks fired `overrun`
    /// after they were due
    pub fn record(&mut self, at: Instant, delta: Duration, overrun: Duration) {
        self.samples.push_back(Sample { at, delta, overrun });
        while let Some(front) = self.samples.front() {
            if at.saturating_duration_since(front.at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn summary(&self) -> StatsSummary {
        let iterations = self.samples.len();
        if iterations == 0 {
            return StatsSummary::default();
        }
        let total: Duration = self.samples.iter().map(|s| s.delta).sum();
        StatsSummary {
            iterations,
            mean_delta: total / iterations as u32,
            max_delta: self.samples.iter().map(|s| s.delta).max().unwrap_or_default(),
            max_overrun: self
                .samples
                .iter()
                .map(|s| s.overrun)
                .max()
                .unwrap_or_default(),
        }
    }

    /// Log a summary once per window
    pub fn maybe_report(&mut self, now: Instant) -> Option<StatsSummary> {
        if self.window.is_zero() || now.saturating_duration_since(self.last_report) < self.window {
            return None;
        }
        self.last_report = now;
        let summary = self.summary();
        debug!(
            target: "agent",
            "loop: {} iterations, mean delta {:?}, max delta {:?}, max overrun {:?}",
            summary.iterations,
            summary.mean_delta,
            summary.max_delta,
            summary.max_overrun
        );
        Some(summary)
    }
}

/// Decides which modules tick and how long the loop may wait for input
#[derive(Debug)]
pub struct Scheduler {
    clocks: Vec<TickClock>,
    min_wait: Duration,
    idle_wait: Duration,
    stats: LoopStats,
}

impl Scheduler {
    pub fn new(intervals: &[Duration], settings: &AgentSettings, now: Instant) -> Self {
        Self {
            clocks: intervals.iter().map(|i| TickClock::new(*i, now)).collect(),
            min_wait: settings.min_wait(),
            idle_wait: settings.idle_wait(),
            stats: LoopStats::new(settings.stats_window(), now),
        }
    }

    /// Restart every module clock, at loop entry
    pub fn restart(&mut self, now: Instant) {
        for clock in &mut self.clocks {
            clock.reset(now);
        }
    }

    /// Modules whose tick is due, with their elapsed time. Their clocks are
    /// reset to `now`.
    pub fn due(&mut self, now: Instant) -> Vec<(usize, Duration)> {
        let mut due = Vec::new();
        for (index, clock) in self.clocks.iter_mut().enumerate() {
            if let Some(elapsed) = clock.due(now) {
                clock.reset(now);
                due.push((index, elapsed));
            }
        }
        due
    }

    /// How long the loop may block for input: until the next tick is due,
    /// at most the idle wait and at least the minimum wait
    pub fn wait_budget(&self, now: Instant) -> Duration {
        let until_tick = self
            .clocks
            .iter()
            .filter_map(TickClock::next_due)
            .min()
            .map(|next| next.saturating_duration_since(now));
        until_tick
            .unwrap_or(self.idle_wait)
            .min(self.idle_wait)
            .max(self.min_wait)
    }

    /// Account for one iteration and the tick lateness it observed
    pub fn record(&mut self, start: Instant, end: Instant, due: &[(usize, Duration)]) {
        let overrun = due
            .iter()
            .map(|(index, elapsed)| elapsed.saturating_sub(self.clocks[*index].interval()))
            .max()
            .unwrap_or_default();
        self.stats
            .record(end, end.saturating_duration_since(start), overrun);
        self.stats.maybe_report(end);
    }

    pub fn stats(&self) -> StatsSummary {
        self.stats.summary()
    }
}

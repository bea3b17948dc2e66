use std::time::Duration;

use super::notify::{Notice, Notifier};

/// Countdown for one cooking step, ticking once per second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownTimer {
    step_number: usize,
    total_secs: u64,
    remaining_secs: u64,
    active: bool,
}

impl CountdownTimer {
    /// `step_number` is 1-based, as shown to the user.
    pub fn new(step_number: usize, minutes: u32) -> Self {
        let total_secs = u64::from(minutes) * 60;
        Self {
            step_number,
            total_secs,
            remaining_secs: total_secs,
            active: false,
        }
    }

    pub fn start(&mut self) {
        self.active = self.remaining_secs > 0;
    }

    pub fn pause(&mut self) {
        self.active = false;
    }

    pub fn toggle(&mut self) {
        if self.active {
            self.pause()
        } else {
            self.start()
        }
    }

    pub fn reset(&mut self) {
        self.active = false;
        self.remaining_secs = self.total_secs;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    /// Advance one second. Returns true on the tick that reaches zero.
    pub fn tick(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.active = false;
            return true;
        }
        false
    }

    /// Percentage of time left, 100 at the start.
    pub fn progress(&self) -> f64 {
        if self.total_secs == 0 {
            return 0.0;
        }
        self.remaining_secs as f64 / self.total_secs as f64 * 100.0
    }

    /// `m:ss`
    pub fn format_remaining(&self) -> String {
        format!("{}:{:02}", self.remaining_secs / 60, self.remaining_secs % 60)
    }

    pub fn completion_notice(&self) -> Notice {
        Notice::info(
            "Timer Complete!",
            format!("Step {} is ready!", self.step_number),
        )
    }
}

/// Run a timer to completion in real time, calling `on_tick` every second.
pub async fn run_timer(
    mut timer: CountdownTimer,
    notifier: &dyn Notifier,
    mut on_tick: impl FnMut(&CountdownTimer),
) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    // The first tick completes immediately.
    interval.tick().await;
    timer.start();
    while timer.is_active() {
        interval.tick().await;
        let finished = timer.tick();
        on_tick(&timer);
        if finished {
            notifier.notify(timer.completion_notice());
        }
    }
}

//! Background sweep loop.
//!
//! A single tokio task owns sweeping: it checks the cron schedule on a
//! coarse tick and also accepts out-of-band "run now" events. Because only
//! this loop invokes the driver, two sweeps can never overlap — a tick
//! firing mid-sweep is consumed late instead of racing the previous cycle.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::sweep::SweepDriver;

/// Out-of-band request for an immediate sweep (operator hook).
#[derive(Debug)]
pub struct RunNow;

/// When the scheduled sweep fires.
pub struct SweepSchedule {
    schedule: Schedule,
    last_run: Option<DateTime<Utc>>,
}

impl SweepSchedule {
    /// Parse a 5-field cron expression (6-field accepted as-is).
    pub fn parse(expr: &str) -> Result<Self, cron::error::Error> {
        let normalized = normalize_cron(expr);
        Ok(Self {
            schedule: Schedule::from_str(&normalized)?,
            last_run: None,
        })
    }

    /// Due when a scheduled tick falls in `(last_run, now]`. With no run
    /// recorded yet, looks back one day so a sweep missed while the
    /// process was down is caught up on startup.
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        let check_from = self.last_run.unwrap_or(now - chrono::Duration::days(1));
        match self.schedule.after(&check_from).next() {
            Some(next) => next <= now,
            None => false,
        }
    }

    fn record_run(&mut self, at: DateTime<Utc>) {
        self.last_run = Some(at);
    }
}

/// Normalize a 5-field cron expression to the 6-field form the `cron`
/// crate expects by prepending a seconds column.
fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Drive scheduled and on-demand sweeps until the trigger channel closes.
pub async fn run_sweep_loop(
    driver: SweepDriver,
    mut schedule: SweepSchedule,
    tick_interval: Duration,
    mut run_now: mpsc::Receiver<RunNow>,
) {
    info!("sweep loop started");
    let mut tick = tokio::time::interval(tick_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let now = driver.clock().now();
                if !schedule.is_due(now) {
                    debug!("sweep tick: not due");
                    continue;
                }
                let report = driver.run_sweep().await;
                schedule.record_run(now);
                info!(
                    selected = report.selected,
                    materialized = report.materialized,
                    "scheduled sweep finished"
                );
            }
            msg = run_now.recv() => match msg {
                Some(RunNow) => {
                    let report = driver.run_sweep().await;
                    info!(
                        selected = report.selected,
                        materialized = report.materialized,
                        "on-demand sweep finished"
                    );
                }
                None => {
                    info!("sweep trigger channel closed; loop stopping");
                    break;
                }
            },
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use nr_core::Result;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::orchestrator::{Pipeline, RunSummary};

/// What a trigger attempt did: either a completed run, or a skip because a
/// run was already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Ran(RunSummary),
    Skipped,
}

/// Interval trigger for the pipeline with an explicit single-flight guard:
/// overlapping triggers are skipped, never run concurrently, so duplicate
/// staging races and double-counted audit records cannot happen within one
/// process.
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    feeds: Vec<String>,
    period: Duration,
    gate: Mutex<()>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, feeds: Vec<String>, period: Duration) -> Self {
        Self {
            pipeline,
            feeds,
            period,
            gate: Mutex::new(()),
        }
    }

    /// Single-flight trigger shared by timer ticks and manual refreshes.
    pub async fn try_run(&self) -> Result<TickOutcome> {
        let Ok(_guard) = self.gate.try_lock() else {
            return Ok(TickOutcome::Skipped);
        };
        let summary = self.pipeline.run(&self.feeds).await?;
        Ok(TickOutcome::Ran(summary))
    }

    pub async fn run_forever(&self) -> Result<()> {
        info!(
            "⏰ Scheduling pipeline every {:?} over {} feeds",
            self.period,
            self.feeds.len()
        );
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        loop {
            ticker.tick().await;
            match self.try_run().await {
                Ok(TickOutcome::Ran(summary)) => {
                    info!("tick complete: {} articles published", summary.nlp_success)
                }
                Ok(TickOutcome::Skipped) => warn!("tick skipped: previous run still in flight"),
                Err(e) => warn!("tick failed: {}", e),
            }
        }
    }
}

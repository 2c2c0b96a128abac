//! Background refresh scheduler.
//!
//! A single task owns the refresh timer and the current range. Timer ticks,
//! manual triggers and range changes each spawn a refresh cycle; cycles may
//! overlap and the aggregator drops whichever completes out of order.

use crate::application::aggregator::Aggregator;
use crate::domain::RangeToken;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

const COMMAND_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshCommand {
    Manual,
    ChangeRange(RangeToken),
}

/// Cloneable entry point into a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<RefreshCommand>,
    range: watch::Receiver<RangeToken>,
}

impl SchedulerHandle {
    /// Request an immediate refresh. Returns `false` once the scheduler has
    /// stopped.
    pub fn trigger_refresh(&self) -> bool {
        self.send(RefreshCommand::Manual)
    }

    /// Switch the window, reset the timer and refresh immediately.
    pub fn change_range(&self, range: RangeToken) -> bool {
        self.send(RefreshCommand::ChangeRange(range))
    }

    pub fn current_range(&self) -> RangeToken {
        *self.range.borrow()
    }

    fn send(&self, command: RefreshCommand) -> bool {
        match self.commands.try_send(command) {
            Ok(()) => true,
            // a burst of triggers collapses into the ones already queued
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(?command, "Refresh command queue full, dropping");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

pub struct RefreshScheduler {
    aggregator: Arc<Aggregator>,
    interval: Duration,
    range: watch::Sender<RangeToken>,
    commands: mpsc::Receiver<RefreshCommand>,
}

impl RefreshScheduler {
    /// Start the scheduler task. The first cycle runs immediately.
    ///
    /// The task exits when `shutdown` flips to `true` (or its sender is
    /// dropped). In-flight cycles are left to finish on their own.
    pub fn spawn(
        aggregator: Arc<Aggregator>,
        interval: Duration,
        initial_range: RangeToken,
        shutdown: watch::Receiver<bool>,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (range_tx, range_rx) = watch::channel(initial_range);

        let scheduler = Self {
            aggregator,
            interval: interval.max(Duration::from_secs(1)),
            range: range_tx,
            commands: command_rx,
        };
        let task = tokio::spawn(scheduler.run(shutdown));

        (
            SchedulerHandle {
                commands: command_tx,
                range: range_rx,
            },
            task,
        )
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.interval.as_secs(),
            range = self.range.borrow().as_str(),
            "Refresh scheduler started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => self.spawn_cycle("timer"),
                command = self.commands.recv() => match command {
                    Some(RefreshCommand::Manual) => self.spawn_cycle("manual"),
                    Some(RefreshCommand::ChangeRange(range)) => {
                        let previous = self.range.send_replace(range);
                        info!(from = %previous, to = %range, "Range changed");
                        ticker.reset();
                        self.spawn_cycle("range_change");
                    }
                    None => break,
                },
            }
        }

        info!("Refresh scheduler stopped");
    }

    fn spawn_cycle(&self, trigger: &'static str) {
        let aggregator = self.aggregator.clone();
        let range = *self.range.borrow();
        debug!(trigger, range = %range, "Spawning refresh cycle");
        tokio::spawn(async move {
            aggregator.refresh(range.as_str()).await;
        });
    }
}

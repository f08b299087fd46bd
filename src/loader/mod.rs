//! Incremental loader for lazily rendered ranking tables.
//!
//! The rankings page only shows a first batch of rows; more appear after
//! scrolling or pressing "load more". The loop below keeps nudging the page
//! until the row target is met, the count settles, or the time budget for the
//! tab runs out:
//!
//! ```text
//! Idle ──activate──▶ Scrolling ──target met / count settled──▶ Stable
//!                        │
//!                        └──────────budget spent─────────────▶ TimedOut
//! ```
//!
//! Both terminal states hand over whatever rows are on the page.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

// ── Collaborators ─────────────────────────────────────────────────────────────

/// Page-side half of the loop: nudge the page, then count what is visible.
#[async_trait]
pub trait RowProbe: Send + Sync {
    async fn trigger_load(&self) -> Result<()>;
    async fn count_rows(&self) -> Result<usize>;
}

/// Wait between polls. Swapped for a no-op in tests.
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration);
}

pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Scrolling,
    Stable,
    TimedOut,
}

/// State for one tab's load loop. Built per (year, table) and consumed by
/// [`IncrementalLoader::run`].
#[derive(Debug, Clone)]
pub struct ExtractionSession {
    /// Rows wanted; `None` loads until the count settles.
    pub target: Option<usize>,
    pub poll_interval: Duration,
    pub time_budget: Duration,
    pub waited: Duration,
    pub last_count: Option<usize>,
    pub state: LoadState,
}

impl ExtractionSession {
    pub fn new(target: Option<usize>, poll_interval: Duration, time_budget: Duration) -> Self {
        Self {
            target,
            // A zero interval would never spend the budget.
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            time_budget,
            waited: Duration::ZERO,
            last_count: None,
            state: LoadState::Idle,
        }
    }

    /// Apply one poll result and return the state it leads to.
    fn observe(&mut self, count: usize) -> LoadState {
        let settled = self.last_count == Some(count);
        self.last_count = Some(count);

        self.state = match self.target {
            Some(target) if count >= target => LoadState::Stable,
            None if settled => LoadState::Stable,
            _ if self.waited >= self.time_budget => LoadState::TimedOut,
            _ => LoadState::Scrolling,
        };
        self.state
    }
}

/// Result of a finished load loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub state: LoadState,
    /// Rows visible when the loop stopped.
    pub obtained: usize,
    pub requested: Option<usize>,
    pub waited: Duration,
    pub polls: u32,
    /// Set when a row count failed and ended the loop early.
    pub interrupted: Option<String>,
}

impl LoadOutcome {
    pub fn timed_out(&self) -> bool {
        self.state == LoadState::TimedOut
    }

    pub fn is_short(&self) -> bool {
        self.requested.is_some_and(|target| self.obtained < target)
    }

    /// "35/3118" style progress for the run summary.
    pub fn progress(&self) -> String {
        match self.requested {
            Some(target) => format!("{}/{}", self.obtained, target),
            None => self.obtained.to_string(),
        }
    }
}

// ── Loop ──────────────────────────────────────────────────────────────────────

pub struct IncrementalLoader<'a> {
    probe: &'a dyn RowProbe,
    pause: &'a dyn Pause,
}

impl<'a> IncrementalLoader<'a> {
    pub fn new(probe: &'a dyn RowProbe, pause: &'a dyn Pause) -> Self {
        Self { probe, pause }
    }

    /// Drive the session to `Stable` or `TimedOut`. A failed row count ends
    /// the loop as `TimedOut` with the last count seen, so rows already on
    /// the page are still extracted.
    pub async fn run(&self, mut session: ExtractionSession) -> LoadOutcome {
        session.state = LoadState::Scrolling;
        let mut polls = 0u32;
        let mut interrupted = None;

        loop {
            if let Err(e) = self.probe.trigger_load().await {
                // The count below still tells us where we are.
                debug!("load trigger failed: {:#}", e);
            }

            self.pause.pause(session.poll_interval).await;
            session.waited += session.poll_interval;
            polls += 1;

            let count = match self.probe.count_rows().await {
                Ok(count) => count,
                Err(e) => {
                    warn!("Row count failed on poll {}: {:#}", polls, e);
                    session.state = LoadState::TimedOut;
                    interrupted = Some(format!("{:#}", e));
                    break;
                }
            };
            let previous = session.last_count.unwrap_or(0);
            let state = session.observe(count);

            if count > previous {
                debug!("poll {}: {} rows (+{})", polls, count, count - previous);
            } else {
                debug!("poll {}: {} rows (unchanged)", polls, count);
            }

            if state != LoadState::Scrolling {
                break;
            }
        }

        let outcome = LoadOutcome {
            state: session.state,
            obtained: session.last_count.unwrap_or(0),
            requested: session.target,
            waited: session.waited,
            polls,
            interrupted,
        };

        match outcome.state {
            LoadState::TimedOut if outcome.interrupted.is_some() => {
                warn!("Row loading stopped early: {} rows", outcome.progress())
            }
            LoadState::TimedOut => warn!(
                "Load budget of {:?} spent: {} rows",
                session.time_budget,
                outcome.progress()
            ),
            _ => info!("Rows settled after {} polls: {}", polls, outcome.progress()),
        }

        outcome
    }
}

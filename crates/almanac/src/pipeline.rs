//! The resumable sweep over (league, year) units.
//!
//! Each league is walked in year order by its own worker with its own
//! [`Fetcher`] and checkpoint. A unit's failure is recorded and the sweep moves
//! on; only checkpoint storage problems abort a run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::BASE_URL;
use crate::checkpoint::{self, Checkpoint, CheckpointError, CheckpointStore};
use crate::parser::{PageRecords, ParseError, parse_yearly_page};
use crate::scraper::{FetchError, FetchStats, Fetcher, HttpTransport, RetryPolicy, Transport};
use crate::sink::{RecordSink, SinkError};
use crate::types::{FetchUnit, League};
use crate::utils::{FailedUnit, RecordCounts, RunSummary};

#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
    #[error("sink failed: {0}")]
    Sink(#[from] SinkError),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub base_url: String,
    pub leagues: Vec<League>,
    /// Clamp the sweep to seasons at or after this year.
    pub start_year: Option<i32>,
    /// Clamp the sweep to seasons at or before this year.
    pub end_year: Option<i32>,
    pub request_delay: Duration,
    pub retry_delay: Duration,
    pub concurrent: bool,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            leagues: League::ALL.to_vec(),
            start_year: None,
            end_year: None,
            request_delay: Duration::from_millis(1500),
            retry_delay: Duration::from_secs(30),
            concurrent: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn year_range(&self, league: League) -> (i32, i32) {
        let first = self
            .start_year
            .map_or(league.start_year(), |y| y.max(league.start_year()));
        let last = self
            .end_year
            .map_or(league.end_year(), |y| y.min(league.end_year()));
        (first, last)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub unit: FetchUnit,
    pub era: &'static str,
    pub records: RecordCounts,
}

impl std::fmt::Display for UnitReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] players: {}, pitchers: {}, standings: {}",
            self.unit,
            self.era,
            self.records.player_stats,
            self.records.pitcher_stats,
            self.records.standings
        )
    }
}

/// Fetch and extract one unit. No checkpointing, no sink.
pub async fn scrape_unit<T: Transport>(
    fetcher: &Fetcher<T>,
    unit: &FetchUnit,
) -> Result<PageRecords, UnitError> {
    let html = fetcher.fetch(&unit.url).await?;
    let page = parse_yearly_page(&html, unit)?;
    Ok(page)
}

#[derive(Debug, Default)]
struct LeagueOutcome {
    succeeded: usize,
    failed: BTreeMap<i32, String>,
    records: RecordCounts,
    cancelled: bool,
}

pub struct Pipeline<T, S> {
    config: PipelineConfig,
    transport: T,
    store: CheckpointStore,
    sink: S,
    stats: Arc<FetchStats>,
}

impl<S: RecordSink> Pipeline<HttpTransport, S> {
    pub fn with_http(
        config: PipelineConfig,
        store: CheckpointStore,
        sink: S,
    ) -> Result<Self, FetchError> {
        Ok(Self::new(config, HttpTransport::new()?, store, sink))
    }
}

impl<T: Transport, S: RecordSink> Pipeline<T, S> {
    pub fn new(config: PipelineConfig, transport: T, store: CheckpointStore, sink: S) -> Self {
        Self {
            config,
            transport,
            store,
            sink,
            stats: Arc::new(FetchStats::default()),
        }
    }

    pub fn stats(&self) -> &Arc<FetchStats> {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary, PipelineError> {
        let started_at = Utc::now();
        log::info!(
            "Starting sweep over {} league(s){}",
            self.config.leagues.len(),
            if self.config.concurrent { " concurrently" } else { "" }
        );

        let outcomes = if self.config.concurrent {
            // A fatal error in one league stops its siblings at their next unit
            let abort = cancel.child_token();
            join_all(self.config.leagues.iter().map(|&league| {
                let abort = &abort;
                async move {
                    self.run_league(league, abort)
                        .await
                        .inspect_err(|_| abort.cancel())
                }
            }))
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?
        } else {
            let mut outcomes = Vec::with_capacity(self.config.leagues.len());
            for &league in &self.config.leagues {
                outcomes.push(self.run_league(league, cancel).await?);
            }
            outcomes
        };

        let mut summary = RunSummary {
            started_at,
            finished_at: started_at,
            requests_made: 0,
            requests_failed: 0,
            units_succeeded: 0,
            units_failed: 0,
            records: RecordCounts::default(),
            failed: Vec::new(),
            cancelled: false,
        };

        for (&league, outcome) in self.config.leagues.iter().zip(outcomes) {
            summary.units_succeeded += outcome.succeeded;
            summary.units_failed += outcome.failed.len();
            summary.records.add(outcome.records);
            summary.cancelled |= outcome.cancelled;
            summary
                .failed
                .extend(outcome.failed.into_iter().map(|(year, reason)| FailedUnit {
                    league,
                    year,
                    reason,
                }));
        }

        summary.requests_made = self.stats.requests_made();
        summary.requests_failed = self.stats.requests_failed();
        summary.finished_at = Utc::now();
        Ok(summary)
    }

    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn process_unit(
        &self,
        fetcher: &Fetcher<&T>,
        unit: &FetchUnit,
    ) -> Result<UnitReport, UnitError> {
        let page = scrape_unit(fetcher, unit).await?;
        self.sink.accept(unit, &page.records)?;

        Ok(UnitReport {
            unit: unit.clone(),
            era: page.era,
            records: page.counts(),
        })
    }

    async fn run_league(
        &self,
        league: League,
        cancel: &CancellationToken,
    ) -> Result<LeagueOutcome, PipelineError> {
        let (first, last) = self.config.year_range(league);
        let loaded = self.store.load(league)?;
        let plan = checkpoint::plan(first, last, loaded.as_ref());
        let mut checkpoint = loaded.unwrap_or_else(|| Checkpoint::new(league));
        let fetcher = Fetcher::with_transport(
            &self.transport,
            self.config.retry.clone(),
            self.stats.clone(),
        );
        let mut outcome = LeagueOutcome::default();

        match plan.years.first() {
            Some(start) => log::info!("{}: sweeping {}..={}", league, start, last),
            None => log::info!("{}: nothing left to sweep", league),
        }

        for (i, &year) in plan.years.iter().enumerate() {
            let paused = i == 0 || self.pause(self.config.request_delay, cancel).await;
            if cancel.is_cancelled() || !paused {
                outcome.cancelled = true;
                break;
            }

            let unit = FetchUnit::new(league, year, &self.config.base_url);
            let result = self.process_unit(&fetcher, &unit).await;

            checkpoint.record(year, result.is_ok());
            checkpoint.saved_at = Utc::now();
            self.store.save(&checkpoint)?;

            match result {
                Ok(report) => {
                    log::info!("{}", report);
                    outcome.succeeded += 1;
                    outcome.records.add(report.records);
                }
                Err(e) => {
                    log::warn!("{} failed: {}", unit, e);
                    outcome.failed.insert(year, e.to_string());
                }
            }
        }

        if outcome.cancelled {
            log::info!("{}: cancelled, progress saved", league);
            return Ok(outcome);
        }

        // Failures carried over from earlier runs plus this sweep's own
        let mut retry = plan.retry;
        retry.extend(outcome.failed.keys().copied());
        if !retry.is_empty() {
            log::info!("{}: retrying {} failed year(s)", league, retry.len());
        }

        for year in retry {
            if !self.pause(self.config.retry_delay, cancel).await {
                outcome.cancelled = true;
                break;
            }

            let unit = FetchUnit::new(league, year, &self.config.base_url);
            match self.process_unit(&fetcher, &unit).await {
                Ok(report) => {
                    log::info!("Recovered {}", report);
                    checkpoint.recover(year);
                    checkpoint.saved_at = Utc::now();
                    self.store.save(&checkpoint)?;
                    outcome.failed.remove(&year);
                    outcome.succeeded += 1;
                    outcome.records.add(report.records);
                }
                Err(e) => {
                    log::warn!("{} still failing: {}", unit, e);
                    outcome.failed.insert(year, e.to_string());
                }
            }
        }

        log::info!(
            "{}: {} succeeded, {} failed",
            league,
            outcome.succeeded,
            outcome.failed.len()
        );
        Ok(outcome)
    }
}

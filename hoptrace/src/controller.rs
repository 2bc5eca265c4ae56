use crate::{
    ControllerConfig, Health, Substrate,
    report::{self, Report, StatsRow},
};
use anyhow::Result;
use hoptrace_core::{
    FlowId, FlowSnapshot, MeasurementStore, StoreError, WindowStats, WorstLinkRecord,
    localize_worst_link,
};
use std::{collections::BTreeMap, io, path::PathBuf, time::Duration};
use thiserror::Error;

/// Anything that went wrong during a cycle.
///
/// None of them stops the controller: the failing step is skipped and
/// the cycle carries on.
#[derive(Debug, Error)]
pub enum CycleIssue {
    #[error("Failed to load the measurement store, localization skipped")]
    StoreLoadFailure(#[source] StoreError),
    #[error("Failed to save the measurement store")]
    StoreSaveFailure(#[source] StoreError),
    #[error("Failed to open report `{}'", path.display())]
    OutputOpenFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write report `{}'", path.display())]
    OutputWriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("No traffic in the measurement window")]
    EmptyWindow,
}

/// What a cycle observed and decided.
#[derive(Debug)]
pub struct CycleOutcome {
    /// time of the cycle
    pub now: Duration,
    /// classification of the window that just closed
    pub health: Health,
    pub stats: WindowStats,
    /// `None` if localization did not run or measured no hop
    pub worst_link: Option<WorstLinkRecord>,
    /// when the next cycle is due, `None` once the run is over
    pub next_cycle: Option<Duration>,
    pub issues: Vec<CycleIssue>,
}

/// Periodically classifies the health of the network, localizes the
/// worst link and reports.
///
/// Each call to [`run_cycle`](Self::run_cycle) closes the current
/// measurement window and opens the next one.
pub struct Controller<S> {
    config: ControllerConfig,
    substrate: S,
    health: Health,
    window_start: Duration,
    cycles: u64,
}

impl<S: Substrate> Controller<S> {
    /// # Errors
    ///
    /// If the configuration does not [validate](ControllerConfig::validate).
    pub fn new(config: ControllerConfig, substrate: S) -> Result<Self> {
        config.validate()?;

        tracing::debug!(
            output_base = %config.output_base().display(),
            aggregation = %config.aggregation(),
            "controller ready"
        );

        Ok(Self {
            config,
            substrate,
            health: Health::WarmUp,
            window_start: Duration::ZERO,
            cycles: 0,
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// health as of the last cycle
    pub fn health(&self) -> Health {
        self.health
    }

    pub fn substrate(&self) -> &S {
        &self.substrate
    }

    pub fn substrate_mut(&mut self) -> &mut S {
        &mut self.substrate
    }

    /// number of completed cycles
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Close the window at `now`.
    ///
    /// In order: compute the window statistics, classify them, localize
    /// the worst link (on degraded windows, or always if configured so),
    /// write the reports, reset the substrate's window and schedule the
    /// next cycle from the new health.
    pub fn run_cycle(&mut self, now: Duration) -> CycleOutcome {
        let fresh = self.cycles == 0 && self.config.fresh_outputs();
        let current_cadence = self.health.cadence(&self.config);
        let mut issues = Vec::new();

        tracing::debug!(cycle = self.cycles, ?now, "measurement cycle");

        if fresh {
            let path = self.config.store_path();
            if let Err(error) = MeasurementStore::new().save(&path) {
                tracing::error!(%error, "cannot reset the measurement store");
                issues.push(CycleIssue::StoreSaveFailure(error));
            }
        }

        let snapshots = self.substrate.snapshot();
        let window = self
            .config
            .window()
            .unwrap_or_else(|| now.saturating_sub(self.window_start));
        let stats = WindowStats::compute(&snapshots, window);

        if stats.is_empty() {
            tracing::warn!(?window, "no traffic in the measurement window");
            issues.push(CycleIssue::EmptyWindow);
        }

        let health = Health::classify(self.config.thresholds(), &stats);

        let worst_link = if health == Health::Degraded || self.config.always_localize() {
            self.localize(&snapshots, now, &mut issues)
        } else {
            None
        };

        let report = Report {
            now,
            cadence: current_cadence,
            snapshots: &snapshots,
            stats: &stats,
            thresholds: self.config.thresholds(),
            health,
            worst_link: worst_link.as_ref(),
            classifier: &self.substrate,
        };
        let row = StatsRow {
            now,
            snapshots: &snapshots,
            stats: &stats,
        };
        let writes = [
            report::append(&self.config.report_path(), fresh, report),
            report::append(&self.config.stats_path(), fresh, row),
        ];
        for issue in writes.into_iter().filter_map(Result::err) {
            tracing::error!(%issue, "report skipped");
            issues.push(issue);
        }

        self.substrate.reset_window();
        self.window_start = now;
        self.cycles += 1;

        if health != self.health {
            tracing::info!(from = %self.health, to = %health, "network health changed");
        }
        self.health = health;

        let next_cycle = self.schedule(now);
        if next_cycle.is_none() {
            tracing::info!(cycles = self.cycles, "end of the run");
        }

        CycleOutcome {
            now,
            health,
            stats,
            worst_link,
            next_cycle,
            issues,
        }
    }

    /// Run cycles from `start` until the run length is reached.
    ///
    /// Before each cycle `drive` is given the substrate and the interval
    /// `(from, to)` until the cycle, to feed the traffic of that
    /// interval. Returning `false` stops the run. Without a configured
    /// run length, only `drive` stops the run.
    pub fn run<F>(&mut self, start: Duration, mut drive: F) -> Vec<CycleOutcome>
    where
        F: FnMut(&mut S, Duration, Duration) -> bool,
    {
        self.window_start = start;

        let mut outcomes = Vec::new();
        let mut from = start;
        let mut next = self.schedule(start);

        while let Some(to) = next {
            if !drive(&mut self.substrate, from, to) {
                tracing::debug!(?to, "run interrupted");
                break;
            }

            let outcome = self.run_cycle(to);
            next = outcome.next_cycle;
            from = to;
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Next cycle time, `None` if less than one cadence remains in the run.
    fn schedule(&self, now: Duration) -> Option<Duration> {
        let cadence = self.health.cadence(&self.config);

        match self.config.run_length() {
            Some(run_length) if run_length.saturating_sub(now) < cadence => None,
            _ => Some(now + cadence),
        }
    }

    fn localize(
        &self,
        snapshots: &BTreeMap<FlowId, FlowSnapshot>,
        now: Duration,
        issues: &mut Vec<CycleIssue>,
    ) -> Option<WorstLinkRecord> {
        let path = self.config.store_path();

        let mut store = match MeasurementStore::open(&path) {
            Ok(store) => store,
            Err(error) => {
                tracing::error!(%error, "localization skipped");
                issues.push(CycleIssue::StoreLoadFailure(error));
                return None;
            }
        };

        let probes = self.substrate.probes();
        let record = localize_worst_link(
            &probes,
            snapshots,
            &mut store,
            now,
            self.config.aggregation(),
        )?;

        if let Err(error) = store.save(&path) {
            tracing::error!(%error, "measurements of this cycle are lost");
            issues.push(CycleIssue::StoreSaveFailure(error));
        }

        Some(record)
    }
}

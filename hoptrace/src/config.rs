use anyhow::{Result, ensure};
use hoptrace_core::{
    AggregationPolicy, Thresholds, Throughput,
    defaults::{DEFAULT_DEGRADED_CADENCE, DEFAULT_HEALTHY_CADENCE},
};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

const REPORT_SUFFIX: &str = "_flow_performance_measurements.log";
const STATS_SUFFIX: &str = "_stats.dat";
const STORE_SUFFIX: &str = "_node_to_node_delays.xml";
const DEFAULT_OUTPUT_BASE: &str = "hoptrace";

/// Configuration of the [`Controller`].
///
/// ```
/// # use hoptrace::ControllerConfig;
/// # use std::time::Duration;
/// let config = ControllerConfig::new("out/line")
///     .set_degraded_cadence(Duration::from_millis(50))
///     .set_always_localize(false);
///
/// assert_eq!(
///     config.store_path().to_str(),
///     Some("out/line_node_to_node_delays.xml")
/// );
/// ```
///
/// [`Controller`]: crate::Controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    output_base: PathBuf,
    healthy_cadence: Duration,
    degraded_cadence: Duration,
    thresholds: Thresholds,
    window: Option<Duration>,
    always_localize: bool,
    aggregation: AggregationPolicy,
    fresh_outputs: bool,
    run_length: Option<Duration>,
}

impl Default for ControllerConfig {
    /// Outputs prefixed with `hoptrace` in the working directory.
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_BASE)
    }
}

impl ControllerConfig {
    /// New configuration writing its outputs next to `output_base`.
    ///
    /// `output_base` is a path prefix: `out/line` produces
    /// `out/line_flow_performance_measurements.log`, `out/line_stats.dat`
    /// and `out/line_node_to_node_delays.xml`.
    pub fn new(output_base: impl Into<PathBuf>) -> Self {
        Self {
            output_base: output_base.into(),
            healthy_cadence: DEFAULT_HEALTHY_CADENCE,
            degraded_cadence: DEFAULT_DEGRADED_CADENCE,
            thresholds: Thresholds::default(),
            window: None,
            always_localize: true,
            aggregation: AggregationPolicy::default(),
            fresh_outputs: true,
            run_length: None,
        }
    }

    /// Interval until the next cycle after a healthy window.
    pub fn set_healthy_cadence(mut self, cadence: Duration) -> Self {
        self.healthy_cadence = cadence;
        self
    }

    /// Interval until the next cycle after a degraded window.
    pub fn set_degraded_cadence(mut self, cadence: Duration) -> Self {
        self.degraded_cadence = cadence;
        self
    }

    pub fn set_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Shorthand to only change the mean throughput threshold.
    pub fn set_mean_throughput_threshold(mut self, threshold: Throughput) -> Self {
        self.thresholds.mean_throughput = threshold;
        self
    }

    /// Shorthand to only change the mean delay threshold.
    pub fn set_mean_delay_threshold(mut self, threshold: Duration) -> Self {
        self.thresholds.mean_delay = threshold;
        self
    }

    /// Use a fixed window length to compute throughputs.
    ///
    /// By default the window is the time elapsed since the previous reset.
    pub fn set_window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    /// Whether the worst link is localized on every cycle (`true`, the
    /// default) or on degraded cycles only.
    pub fn set_always_localize(mut self, always_localize: bool) -> Self {
        self.always_localize = always_localize;
        self
    }

    pub fn set_aggregation(mut self, aggregation: AggregationPolicy) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Whether the first cycle truncates the report files and resets the
    /// measurement store (`true` by default).
    pub fn set_fresh_outputs(mut self, fresh_outputs: bool) -> Self {
        self.fresh_outputs = fresh_outputs;
        self
    }

    /// Stop scheduling cycles once less than one cadence remains before
    /// `run_length`.
    pub fn set_run_length(mut self, run_length: Duration) -> Self {
        self.run_length = Some(run_length);
        self
    }

    pub fn healthy_cadence(&self) -> Duration {
        self.healthy_cadence
    }

    pub fn degraded_cadence(&self) -> Duration {
        self.degraded_cadence
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn window(&self) -> Option<Duration> {
        self.window
    }

    pub fn always_localize(&self) -> bool {
        self.always_localize
    }

    pub fn aggregation(&self) -> AggregationPolicy {
        self.aggregation
    }

    pub fn fresh_outputs(&self) -> bool {
        self.fresh_outputs
    }

    pub fn run_length(&self) -> Option<Duration> {
        self.run_length
    }

    pub fn output_base(&self) -> &Path {
        &self.output_base
    }

    /// the human readable per-cycle report
    pub fn report_path(&self) -> PathBuf {
        self.with_suffix(REPORT_SUFFIX)
    }

    /// the tab separated per-cycle statistics
    pub fn stats_path(&self) -> PathBuf {
        self.with_suffix(STATS_SUFFIX)
    }

    /// the measurement store document
    pub fn store_path(&self) -> PathBuf {
        self.with_suffix(STORE_SUFFIX)
    }

    /// Check the configuration can drive a run.
    ///
    /// # Errors
    ///
    /// If a cadence or the fixed window is zero, or the output base has
    /// no file name to derive the output names from.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.healthy_cadence.is_zero(),
            "The healthy cadence cannot be zero"
        );
        ensure!(
            !self.degraded_cadence.is_zero(),
            "The degraded cadence cannot be zero"
        );
        ensure!(
            self.window.is_none_or(|window| !window.is_zero()),
            "The measurement window cannot be zero"
        );
        ensure!(
            self.output_base.file_name().is_some(),
            "Output base `{}' does not name a file",
            self.output_base.display()
        );
        Ok(())
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut path = OsString::from(self.output_base.as_os_str());
        path.push(suffix);
        PathBuf::from(path)
    }
}

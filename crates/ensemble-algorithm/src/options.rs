//! Options understood by the workload-demand algorithm.

use ensemble_state::{AlgorithmOptions, OptionValue};
use tracing::warn;

pub const OPTION_RANDOMIZE: &str = "randomize";
pub const OPTION_TERMINATE_CHECKS: &str = "terminateChecks";
pub const OPTION_SCALE_CHECKS: &str = "scaleChecks";
pub const OPTION_SCALE_UP_STRATEGY: &str = "scaleUpStrategy";
pub const OPTION_SCALE_DOWN_STRATEGY: &str = "scaleDownStrategy";
pub const OPTION_DISABLE_TERMINATION: &str = "disableTermination";

pub const DEFAULT_RANDOMIZE: bool = true;
pub const DEFAULT_TERMINATE_CHECKS: u32 = 10;
pub const DEFAULT_SCALE_CHECKS: u32 = 5;
pub const DEFAULT_DISABLE_TERMINATION: bool = false;

/// How to choose the number of nodes to add when jobs are waiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScaleUpStrategy {
    /// Size of the first entry in `nextJobs`.
    #[default]
    NextJob,
    /// Smallest waiting size.
    SmallestJob,
    /// Largest waiting size.
    LargestJob,
    /// Waiting size drawn in proportion to its queued count.
    RandomJob,
}

impl ScaleUpStrategy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "nextJob" => Some(Self::NextJob),
            "smallestJob" => Some(Self::SmallestJob),
            "largestJob" => Some(Self::LargestJob),
            "randomJob" => Some(Self::RandomJob),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NextJob => "nextJob",
            Self::SmallestJob => "smallestJob",
            Self::LargestJob => "largestJob",
            Self::RandomJob => "randomJob",
        }
    }
}

/// Resolved workload-demand options with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadOptions {
    pub randomize: bool,
    pub terminate_checks: u32,
    pub scale_checks: u32,
    pub scale_up_strategy: ScaleUpStrategy,
    pub disable_termination: bool,
}

impl Default for WorkloadOptions {
    fn default() -> Self {
        Self {
            randomize: DEFAULT_RANDOMIZE,
            terminate_checks: DEFAULT_TERMINATE_CHECKS,
            scale_checks: DEFAULT_SCALE_CHECKS,
            scale_up_strategy: ScaleUpStrategy::default(),
            disable_termination: DEFAULT_DISABLE_TERMINATION,
        }
    }
}

impl WorkloadOptions {
    /// Resolve options, falling back to defaults for unset or unusable values.
    /// An unknown scale-up strategy falls back to `nextJob`.
    pub fn resolve(options: &AlgorithmOptions) -> Self {
        let strategy_name =
            options.string_option(OPTION_SCALE_UP_STRATEGY, ScaleUpStrategy::NextJob.as_str());
        let scale_up_strategy = ScaleUpStrategy::from_name(&strategy_name).unwrap_or_else(|| {
            warn!(strategy = %strategy_name, "unknown scale up strategy, using nextJob");
            ScaleUpStrategy::NextJob
        });

        Self {
            randomize: options.bool_option(OPTION_RANDOMIZE, DEFAULT_RANDOMIZE),
            terminate_checks: options
                .positive_int_option(OPTION_TERMINATE_CHECKS, DEFAULT_TERMINATE_CHECKS),
            scale_checks: options.positive_int_option(OPTION_SCALE_CHECKS, DEFAULT_SCALE_CHECKS),
            scale_up_strategy,
            disable_termination: options
                .bool_option(OPTION_DISABLE_TERMINATION, DEFAULT_DISABLE_TERMINATION),
        }
    }

    /// Check that every known option that is set has a usable value.
    pub fn validate(options: &AlgorithmOptions) -> Result<(), String> {
        for key in [OPTION_RANDOMIZE, OPTION_DISABLE_TERMINATION] {
            if let Some(value) = options.get(key)
                && value.as_bool().is_none()
            {
                return Err(format!("{key} must be a boolean (or yes/no), got {value:?}"));
            }
        }
        for key in [OPTION_TERMINATE_CHECKS, OPTION_SCALE_CHECKS] {
            if let Some(value) = options.get(key) {
                match value.as_int() {
                    Some(v) if v > 0 && u32::try_from(v).is_ok() => {}
                    _ => return Err(format!("{key} must be a positive integer, got {value:?}")),
                }
            }
        }
        for key in [OPTION_SCALE_UP_STRATEGY, OPTION_SCALE_DOWN_STRATEGY] {
            if let Some(value) = options.get(key)
                && !matches!(value, OptionValue::Str(_))
            {
                return Err(format!("{key} must be a string, got {value:?}"));
            }
        }
        Ok(())
    }
}

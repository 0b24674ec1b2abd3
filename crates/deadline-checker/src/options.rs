//! Options of the feasibility check

use std::{fmt, str::FromStr, time::Duration};

use deadline_combine::CombineOptions;
use deadline_smv::DEFAULT_BMC_LENGTH;

/// Timeout of the first bounded model checking run
pub const DEFAULT_BASE_TIMEOUT: Duration = Duration::from_secs(30);

/// Factor between the longest observed solve time and the next timeout
pub const DEFAULT_TIMEOUT_FACTOR: f64 = 4.0;

/// Options of the bounded model checking search
#[derive(Debug, Clone, PartialEq)]
pub struct BmcOptions {
    /// Timeout of the first run
    pub base_timeout: Duration,
    /// The timeout of every further run is this factor times the longest solve
    /// time observed so far
    pub timeout_factor: f64,
    /// Bound of the runs
    pub bmc_length: u32,
}

impl Default for BmcOptions {
    fn default() -> Self {
        Self {
            base_timeout: DEFAULT_BASE_TIMEOUT,
            timeout_factor: DEFAULT_TIMEOUT_FACTOR,
            bmc_length: DEFAULT_BMC_LENGTH,
        }
    }
}

/// Shortcuts for testing the pipeline around the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugArg {
    /// Skip the search for the delay of an infeasible task and assume a delay
    /// of 1
    SimpleDelay,
}

/// Error for unknown debug arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDebugArg(pub String);

impl fmt::Display for UnknownDebugArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown debug argument '{}'", self.0)
    }
}

impl std::error::Error for UnknownDebugArg {}

impl FromStr for DebugArg {
    type Err = UnknownDebugArg;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple_delay" => Ok(DebugArg::SimpleDelay),
            _ => Err(UnknownDebugArg(s.to_string())),
        }
    }
}

impl fmt::Display for DebugArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugArg::SimpleDelay => write!(f, "simple_delay"),
        }
    }
}

/// Options of a feasibility check
#[derive(Debug, Clone, PartialEq)]
pub struct CheckerOptions {
    /// Only consider tasks of this scheduling unit
    pub key_scheduling_unit: Option<String>,
    /// Options of the bounded model checking search
    pub bmc: BmcOptions,
    /// Run full model checking when bounded model checking is inconclusive
    pub fallback_to_full_mc: bool,
    /// Declare a task infeasible without full model checking if the adaptive
    /// timeout of bounded model checking suggests so
    ///
    /// This is not sound: a run that was cut off by the timeout might have
    /// found an earlier completion.
    pub trust_bmc_timeout_heuristic: bool,
    /// Options passed to the combiner
    pub combine: CombineOptions,
    /// Debug shortcuts
    pub debug_args: Vec<DebugArg>,
}

impl CheckerOptions {
    /// Check whether the debug argument `arg` is set
    pub fn has_debug_arg(&self, arg: DebugArg) -> bool {
        self.debug_args.contains(&arg)
    }
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            key_scheduling_unit: None,
            bmc: BmcOptions::default(),
            fallback_to_full_mc: true,
            trust_bmc_timeout_heuristic: false,
            combine: CombineOptions::default(),
            debug_args: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = CheckerOptions::default();
        assert_eq!(opts.bmc.base_timeout, Duration::from_secs(30));
        assert_eq!(opts.bmc.timeout_factor, 4.0);
        assert_eq!(opts.bmc.bmc_length, 100);
        assert!(opts.fallback_to_full_mc);
        assert!(!opts.trust_bmc_timeout_heuristic);
        assert!(!opts.has_debug_arg(DebugArg::SimpleDelay));
    }

    #[test]
    fn test_parse_debug_arg() {
        assert_eq!("simple_delay".parse::<DebugArg>().unwrap(), DebugArg::SimpleDelay);
        assert_eq!(
            "fast".parse::<DebugArg>(),
            Err(UnknownDebugArg("fast".to_string()))
        );
        assert_eq!(DebugArg::SimpleDelay.to_string(), "simple_delay");
    }
}

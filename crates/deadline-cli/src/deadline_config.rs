//! Advanced configuration options of the feasibility checker
//!
//! Options that are rarely changed, like the timeouts of bounded model
//! checking or the model checker executable, can be set in a configuration
//! file or through environment variables instead of the command line.

use std::time::Duration;

use anyhow::anyhow;
use deadline_checker::{BmcOptions, options::DEFAULT_BASE_TIMEOUT, options::DEFAULT_TIMEOUT_FACTOR};
use deadline_combine::CombineOptions;
use deadline_smv::{DEFAULT_BMC_LENGTH, SolverCfg, process::DEFAULT_POLL_INTERVAL};
use serde::Deserialize;

/// Type representing configuration options of the feasibility checker
///
/// This type implements `serde::Deserialize` to parse the configuration out of
/// configuration files and environment variables.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DeadlineConfig {
    /// Model checker executable
    solver: Option<SolverCfg>,
    /// Options of bounded model checking
    #[serde(default)]
    bmc: BmcConfig,
    /// Whether to fall back to full model checking
    fallback_to_full_mc: Option<bool>,
    /// Whether to trust the timeout heuristic of bounded model checking
    trust_bmc_timeout_heuristic: Option<bool>,
    /// External command used to combine models
    combine_command: Option<Vec<String>>,
    /// Default plugins, plugin options and variables of the combination
    combine: Option<CombineOptions>,
}

/// Options of bounded model checking, timeouts in seconds
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct BmcConfig {
    base_timeout: Option<f64>,
    timeout_factor: Option<f64>,
    bmc_length: Option<u32>,
    poll_interval_ms: Option<u64>,
}

impl DeadlineConfig {
    /// Set the configuration of the model checker to the given value
    pub fn set_solver_cfg(&mut self, cfg: SolverCfg) {
        self.solver = Some(cfg);
    }

    /// Get the configuration of the model checker, NuSMV if none is set
    pub fn get_solver_cfg(&self) -> SolverCfg {
        self.solver.clone().unwrap_or_default()
    }

    /// Get the options of bounded model checking
    pub fn get_bmc_options(&self) -> Result<BmcOptions, anyhow::Error> {
        let base_timeout = match self.bmc.base_timeout {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map_err(|e| anyhow!("Invalid base timeout {secs}: {e}"))?,
            None => DEFAULT_BASE_TIMEOUT,
        };

        let timeout_factor = self.bmc.timeout_factor.unwrap_or(DEFAULT_TIMEOUT_FACTOR);
        if !timeout_factor.is_finite() || timeout_factor <= 0.0 {
            return Err(anyhow!(
                "Timeout factor must be a positive number, got {timeout_factor}"
            ));
        }

        Ok(BmcOptions {
            base_timeout,
            timeout_factor,
            bmc_length: self.bmc.bmc_length.unwrap_or(DEFAULT_BMC_LENGTH),
        })
    }

    /// Get the interval in which running model checker processes are polled
    pub fn get_poll_interval(&self) -> Duration {
        self.bmc
            .poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    /// Set whether full model checking is used when bounded model checking is
    /// inconclusive
    pub fn set_fallback_to_full_mc(&mut self, fallback: bool) {
        self.fallback_to_full_mc = Some(fallback);
    }

    /// Whether full model checking is used when bounded model checking is
    /// inconclusive, defaults to `true`
    pub fn get_fallback_to_full_mc(&self) -> bool {
        self.fallback_to_full_mc.unwrap_or(true)
    }

    /// Set whether the timeout heuristic of bounded model checking is trusted
    pub fn set_trust_bmc_timeout_heuristic(&mut self, trust: bool) {
        self.trust_bmc_timeout_heuristic = Some(trust);
    }

    /// Whether the timeout heuristic of bounded model checking is trusted,
    /// defaults to `false`
    pub fn get_trust_bmc_timeout_heuristic(&self) -> bool {
        self.trust_bmc_timeout_heuristic.unwrap_or(false)
    }

    /// External combine command, if configured
    pub fn get_combine_command(&self) -> Option<&[String]> {
        self.combine_command.as_deref()
    }

    /// Get the combine options, with the non-empty lists of `overrides`
    /// replacing the configured ones
    pub fn get_combine_options(&self, overrides: CombineOptions) -> CombineOptions {
        let mut options = self.combine.clone().unwrap_or_default();
        if !overrides.plugins.is_empty() {
            options.plugins = overrides.plugins;
        }
        if !overrides.plugin_options.is_empty() {
            options.plugin_options = overrides.plugin_options;
        }
        if !overrides.variables.is_empty() {
            options.variables = overrides.variables;
        }
        options
    }
}

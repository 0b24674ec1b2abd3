//! Plugins rewriting a combined model before it is rendered
//!
//! Plugins are selected by name (see [`ExistingPlugins`]) and configured with
//! `key=value` options. Every option is offered to every selected plugin; an
//! option that no plugin accepts is rejected.

use std::{fmt, str::FromStr};

use deadline_schedule::spec_builder::COUNTER_PREFIX;
use log::{debug, info};

#[cfg(feature = "config_deserialize")]
use serde::Deserialize;

use crate::{
    CombineError,
    model::{CombinedModel, SectionKind},
};

/// Trait of all plugins operating on combined models
pub trait CombinePlugin {
    /// Name of the plugin as used on the command line
    fn name(&self) -> &'static str;

    /// Offer the option `key=value` to the plugin
    ///
    /// Returns `Ok(true)` if the plugin consumed the option, `Ok(false)` if
    /// the plugin does not know `key`.
    fn configure(&mut self, key: &str, value: &str) -> Result<bool, CombineError>;

    /// Rewrite the combined model
    fn process(&self, model: &mut CombinedModel);
}

/// Plugin that drops the specifications carried by the model fragments
///
/// Specifications of the schedule, i.e. those referring to a task counter
/// variable, always survive, as do specification sections containing one of
/// the configured `keep` patterns. All other specifications are removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropSpecs {
    keep: Vec<String>,
}

impl DropSpecs {
    /// Create a new plugin instance that keeps no specifications
    pub fn new() -> Self {
        Self::default()
    }
}

impl CombinePlugin for DropSpecs {
    fn name(&self) -> &'static str {
        "DropSpecs"
    }

    fn configure(&mut self, key: &str, value: &str) -> Result<bool, CombineError> {
        if key != "keep" {
            return Ok(false);
        }
        if value.is_empty() {
            return Err(CombineError::InvalidPluginOption {
                plugin: self.name().to_string(),
                option: format!("{key}={value}"),
            });
        }
        self.keep.push(value.to_string());
        Ok(true)
    }

    fn process(&self, model: &mut CombinedModel) {
        let counter = format!("{COUNTER_PREFIX}_");
        let n_sections = model.sections().len();
        model.retain_sections(|s| {
            s.kind() != SectionKind::Spec
                || s.body().iter().any(|l| {
                    l.contains(counter.as_str())
                        || self.keep.iter().any(|pattern| l.contains(pattern.as_str()))
                })
        });
        info!(
            "DropSpecs removed {} specification(s)",
            n_sections - model.sections().len()
        );
    }
}

/// Plugin that removes repeated constraints
///
/// Constraint sections (`INIT`, `INVAR`, `TRANS`, `FAIRNESS`) whose body is
/// identical to an earlier one are dropped. This happens when multiple
/// metadata files carry the same assumptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupConstraints {}

impl DedupConstraints {
    /// Create a new plugin instance
    pub fn new() -> Self {
        Self {}
    }
}

impl CombinePlugin for DedupConstraints {
    fn name(&self) -> &'static str {
        "DedupConstraints"
    }

    fn configure(&mut self, _key: &str, _value: &str) -> Result<bool, CombineError> {
        Ok(false)
    }

    fn process(&self, model: &mut CombinedModel) {
        let mut seen: Vec<(SectionKind, Vec<String>)> = Vec::new();
        let n_sections = model.sections().len();

        model.retain_sections(|s| {
            if !matches!(
                s.kind(),
                SectionKind::Init | SectionKind::Invar | SectionKind::Trans | SectionKind::Fairness
            ) {
                return true;
            }

            let body: Vec<String> = s
                .body()
                .iter()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();
            if seen.iter().any(|(k, b)| *k == s.kind() && *b == body) {
                return false;
            }
            seen.push((s.kind(), body));
            true
        });

        debug!(
            "DedupConstraints removed {} constraint(s)",
            n_sections - model.sections().len()
        );
    }
}

/// Enum representing all available plugins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config_deserialize", derive(Deserialize))]
pub enum ExistingPlugins {
    /// Drops the specification sections of the input fragments, keeping
    /// those of the schedule
    DropSpecs,
    /// Drops constraint sections that appear more than once
    DedupConstraints,
}

impl From<ExistingPlugins> for Box<dyn CombinePlugin> {
    fn from(val: ExistingPlugins) -> Self {
        match val {
            ExistingPlugins::DropSpecs => Box::new(DropSpecs::new()),
            ExistingPlugins::DedupConstraints => Box::new(DedupConstraints::new()),
        }
    }
}

impl FromStr for ExistingPlugins {
    type Err = CombineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DropSpecs" => Ok(ExistingPlugins::DropSpecs),
            "DedupConstraints" => Ok(ExistingPlugins::DedupConstraints),
            _ => Err(CombineError::UnknownPlugin(s.to_string())),
        }
    }
}

impl fmt::Display for ExistingPlugins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExistingPlugins::DropSpecs => write!(f, "DropSpecs"),
            ExistingPlugins::DedupConstraints => write!(f, "DedupConstraints"),
        }
    }
}

/// Split a plugin option of the form `key=value`
pub fn parse_plugin_option(option: &str) -> Result<(&str, &str), CombineError> {
    match option.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value.trim())),
        _ => Err(CombineError::InvalidPluginOption {
            plugin: "*".to_string(),
            option: option.to_string(),
        }),
    }
}

/// Instantiate the plugins named in `names` and configure them with `options`
pub fn instantiate_plugins<S: AsRef<str>, O: AsRef<str>>(
    names: &[S],
    options: &[O],
) -> Result<Vec<Box<dyn CombinePlugin>>, CombineError> {
    let mut plugins: Vec<Box<dyn CombinePlugin>> = names
        .iter()
        .map(|n| n.as_ref().parse::<ExistingPlugins>().map(Into::into))
        .collect::<Result<_, _>>()?;

    for option in options.iter() {
        let (key, value) = parse_plugin_option(option.as_ref())?;

        let mut consumed = false;
        for plugin in plugins.iter_mut() {
            consumed |= plugin.configure(key, value)?;
        }
        if !consumed {
            return Err(CombineError::UnknownPluginOption(option.as_ref().to_string()));
        }
    }

    Ok(plugins)
}

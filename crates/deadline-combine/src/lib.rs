//! Combination of SMV model fragments into a single model
//!
//! The feasibility check assembles its model from several files: the process
//! model, the deadline specification of the (sub-)schedule, the initial state
//! constraints of the plant and auxiliary metadata files. This crate merges
//! them into one `MODULE main`.
//!
//! Two implementations of the [`Combiner`] trait exist:
//! - [`SmvCombiner`] combines in-process, threading a [`CombineContext`]
//!   through the merge,
//! - [`ExternalCombiner`] delegates to an external combine command and returns
//!   its output.

use core::{error, fmt};
use std::{
    fs, io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

use log::{debug, info, trace};

#[cfg(feature = "config_deserialize")]
use serde::Deserialize;

pub mod model;
pub mod plugins;

pub use model::{CombineContext, CombinedModel, Fragment, Section, SectionKind};
pub use plugins::{CombinePlugin, ExistingPlugins};

/// Error that can occur while combining models
#[derive(Debug)]
pub enum CombineError {
    /// A plugin name that is not known
    UnknownPlugin(String),
    /// A plugin option that no selected plugin accepts
    UnknownPluginOption(String),
    /// A plugin option that is malformed or has an invalid value
    InvalidPluginOption {
        /// Plugin that rejected the option
        plugin: String,
        /// The option as given
        option: String,
    },
    /// A variable declaration that is not of the form `name : type`
    MalformedDeclaration(String),
    /// The external combine command failed
    ExternalFailed {
        /// Command that was run
        command: String,
        /// Exit status of the command
        status: ExitStatus,
        /// Error output of the command
        stderr: String,
    },
    /// Error while reading a fragment or running the external command
    Io {
        /// File or command the error occurred on
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },
}

impl fmt::Display for CombineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombineError::UnknownPlugin(p) => write!(f, "Unknown plugin '{p}'"),
            CombineError::UnknownPluginOption(o) => {
                write!(f, "Plugin option '{o}' is not accepted by any selected plugin")
            }
            CombineError::InvalidPluginOption { plugin, option } => {
                write!(f, "Invalid option '{option}' for plugin {plugin}")
            }
            CombineError::MalformedDeclaration(d) => write!(
                f,
                "Malformed variable declaration '{d}', expected 'name : type'"
            ),
            CombineError::ExternalFailed {
                command,
                status,
                stderr,
            } => write!(
                f,
                "Combine command '{command}' failed ({status}): {}",
                stderr.trim()
            ),
            CombineError::Io { path, source } => {
                write!(f, "Failed to access '{}': {source}", path.display())
            }
        }
    }
}

impl error::Error for CombineError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            CombineError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Options of a combination
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "config_deserialize", derive(Deserialize))]
pub struct CombineOptions {
    /// Names of the plugins to apply
    #[cfg_attr(feature = "config_deserialize", serde(default))]
    pub plugins: Vec<String>,
    /// Options of the plugins as `key=value`
    #[cfg_attr(feature = "config_deserialize", serde(default))]
    pub plugin_options: Vec<String>,
    /// Additional state variable declarations as `name : type`
    #[cfg_attr(feature = "config_deserialize", serde(default))]
    pub variables: Vec<String>,
}

impl CombineOptions {
    /// Check whether no plugin, option or variable is set
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty() && self.plugin_options.is_empty() && self.variables.is_empty()
    }
}

/// Result of an in-process combination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineResult {
    /// Text of the combined model
    pub model: String,
    /// Context holding all variables declared in the combined model
    pub context: CombineContext,
}

/// Combine the model texts in `sources`
///
/// Sections of later sources are appended to those of earlier ones.
/// Variables already declared in `ctx` are not declared again.
pub fn combine<S: AsRef<str>>(
    sources: &[S],
    options: &CombineOptions,
    mut ctx: CombineContext,
) -> Result<CombineResult, CombineError> {
    let plugins = plugins::instantiate_plugins(&options.plugins, &options.plugin_options)?;

    let fragments: Vec<Fragment> = sources.iter().map(|s| Fragment::parse(s.as_ref())).collect();
    let mut model = CombinedModel::merge(&fragments, &mut ctx)?;

    for decl in options.variables.iter() {
        let (name, ty) = model::parse_declaration(decl)?;
        model.declare(SectionKind::Var, &name, &ty, &mut ctx);
    }

    for plugin in plugins.iter() {
        debug!("Applying plugin {}", plugin.name());
        plugin.process(&mut model);
    }

    trace!(
        "Combined {} fragment(s) into {} section(s)",
        fragments.len(),
        model.sections().len()
    );

    Ok(CombineResult {
        model: model.to_string(),
        context: ctx,
    })
}

/// Trait for types that combine model files into a single model text
pub trait Combiner {
    /// Combine the models in `files`, in order
    fn combine_files(&self, files: &[PathBuf], options: &CombineOptions)
    -> Result<String, CombineError>;
}

/// In-process combiner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmvCombiner {}

impl SmvCombiner {
    /// Create a new in-process combiner
    pub fn new() -> Self {
        Self {}
    }
}

impl Combiner for SmvCombiner {
    fn combine_files(
        &self,
        files: &[PathBuf],
        options: &CombineOptions,
    ) -> Result<String, CombineError> {
        let sources = files
            .iter()
            .map(|path| read_fragment(path))
            .collect::<Result<Vec<_>, _>>()?;

        let result = combine(&sources, options, CombineContext::new())?;
        info!(
            "Combined {} file(s), declaring {} state and {} input variable(s)",
            files.len(),
            result.context.vars().count(),
            result.context.ivars().count()
        );
        Ok(result.model)
    }
}

fn read_fragment(path: &Path) -> Result<String, CombineError> {
    fs::read_to_string(path).map_err(|source| CombineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Combiner delegating to an external command
///
/// The command is invoked as
/// `<argv...> --combine --input <files...> [--plugins ...] [--plugin-options ...] [--variables ...]`
/// and must print the combined model on stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCombiner {
    argv: Vec<String>,
}

impl ExternalCombiner {
    /// Create a combiner running the command `argv`
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    /// Full command line for combining `files`
    pub fn command_line(&self, files: &[PathBuf], options: &CombineOptions) -> Vec<String> {
        let mut argv = self.argv.clone();
        argv.push("--combine".to_string());
        argv.push("--input".to_string());
        argv.extend(files.iter().map(|f| f.display().to_string()));

        let lists = [
            ("--plugins", &options.plugins),
            ("--plugin-options", &options.plugin_options),
            ("--variables", &options.variables),
        ];
        for (flag, values) in lists {
            if !values.is_empty() {
                argv.push(flag.to_string());
                argv.extend(values.iter().cloned());
            }
        }
        argv
    }
}

impl Combiner for ExternalCombiner {
    fn combine_files(
        &self,
        files: &[PathBuf],
        options: &CombineOptions,
    ) -> Result<String, CombineError> {
        let argv = self.command_line(files, options);
        let (program, args) = argv.split_first().ok_or_else(|| CombineError::Io {
            path: PathBuf::new(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty combine command"),
        })?;
        debug!("Running external combine command: {argv:?}");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| CombineError::Io {
                path: PathBuf::from(program),
                source,
            })?;

        if !output.status.success() {
            return Err(CombineError::ExternalFailed {
                command: argv.join(" "),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

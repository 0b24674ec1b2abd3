//! Sections of SMV models and their combination
//!
//! Model fragments (the process model, the schedule specification, the plant
//! state, auxiliary metadata files) are split into their sections. The
//! sections of all fragments are merged into a single `main` module:
//! declarations are deduplicated through a [`CombineContext`], all other
//! sections are concatenated in input order.
//!
//! Modules other than `main` are carried over verbatim, the first definition
//! of a module wins.

use std::fmt;

use indexmap::IndexMap;
use log::{debug, warn};

use crate::CombineError;

/// Kind of a section of an SMV module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectionKind {
    /// State variable declarations
    Var,
    /// Input variable declarations
    IVar,
    /// Frozen variable declarations
    FrozenVar,
    /// Macro definitions
    Define,
    /// Assignments
    Assign,
    /// Initial state constraints
    Init,
    /// Invariant constraints
    Invar,
    /// Transition constraints
    Trans,
    /// Fairness constraints (`FAIRNESS`, `JUSTICE`, `COMPASSION`)
    Fairness,
    /// Specifications (`SPEC`, `CTLSPEC`, `LTLSPEC`, `INVARSPEC`, ...)
    Spec,
}

impl SectionKind {
    /// Section kind introduced by `keyword`
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "VAR" => Some(SectionKind::Var),
            "IVAR" => Some(SectionKind::IVar),
            "FROZENVAR" => Some(SectionKind::FrozenVar),
            "DEFINE" => Some(SectionKind::Define),
            "ASSIGN" => Some(SectionKind::Assign),
            "INIT" => Some(SectionKind::Init),
            "INVAR" => Some(SectionKind::Invar),
            "TRANS" => Some(SectionKind::Trans),
            "FAIRNESS" | "JUSTICE" | "COMPASSION" => Some(SectionKind::Fairness),
            "SPEC" | "CTLSPEC" | "LTLSPEC" | "INVARSPEC" | "PSLSPEC" | "COMPUTE" => {
                Some(SectionKind::Spec)
            }
            _ => None,
        }
    }

    /// Check whether the section declares variables
    pub fn is_declaration(&self) -> bool {
        matches!(
            self,
            SectionKind::Var | SectionKind::IVar | SectionKind::FrozenVar
        )
    }
}

/// A section of a model: its keyword and the lines of its body
///
/// The first body line is the text following the keyword on the same line,
/// if there is any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    kind: SectionKind,
    keyword: String,
    body: Vec<String>,
}

impl Section {
    /// Create a new section
    pub fn new<S: Into<String>>(kind: SectionKind, keyword: S, body: Vec<String>) -> Self {
        Self {
            kind,
            keyword: keyword.into(),
            body,
        }
    }

    /// Kind of the section
    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    /// Keyword that introduced the section
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// Lines of the section body
    pub fn body(&self) -> &[String] {
        &self.body
    }

    /// Body with comments and blank lines removed
    fn content(&self) -> String {
        self.body
            .iter()
            .map(|l| strip_comment(l).trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<&str> = self
            .body
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        match lines.as_slice() {
            [] => write!(f, "{}", self.keyword),
            [line] => write!(f, "{} {line}", self.keyword),
            lines => {
                write!(f, "{}", self.keyword)?;
                for line in lines {
                    write!(f, "\n    {line}")?;
                }
                Ok(())
            }
        }
    }
}

/// Text of `line` before an SMV comment (`--`)
fn strip_comment(line: &str) -> &str {
    match line.find("--") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// A parsed model fragment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    sections: Vec<Section>,
    modules: Vec<(String, String)>,
}

impl Fragment {
    /// Split the text of a model into sections
    ///
    /// Text of the `main` module (or before any module header) is split into
    /// sections, other modules are kept as raw text.
    pub fn parse(text: &str) -> Self {
        let mut fragment = Fragment::default();
        let mut current: Option<Section> = None;
        let mut other_module: Option<(String, Vec<String>)> = None;

        for line in text.lines() {
            let trimmed = line.trim_start();
            let first_word = trimmed
                .split(|c: char| c.is_whitespace() || c == '(')
                .next()
                .unwrap_or("");

            if first_word == "MODULE" {
                fragment.close_section(current.take());
                fragment.close_module(other_module.take());

                let header = trimmed["MODULE".len()..].trim();
                let name = header
                    .split(|c: char| c.is_whitespace() || c == '(')
                    .next()
                    .unwrap_or("");
                if name != "main" {
                    other_module = Some((name.to_string(), vec![line.to_string()]));
                }
                continue;
            }

            if let Some((_, lines)) = other_module.as_mut() {
                lines.push(line.to_string());
                continue;
            }

            if let Some(kind) = SectionKind::from_keyword(first_word) {
                fragment.close_section(current.take());
                let rest = trimmed[first_word.len()..].trim();
                let body = if rest.is_empty() {
                    vec![]
                } else {
                    vec![rest.to_string()]
                };
                current = Some(Section::new(kind, first_word, body));
                continue;
            }

            match current.as_mut() {
                Some(section) => section.body.push(line.to_string()),
                None => {
                    if !strip_comment(line).trim().is_empty() {
                        warn!("Ignoring model text outside of any section: {}", line.trim());
                    }
                }
            }
        }

        fragment.close_section(current);
        fragment.close_module(other_module);
        fragment
    }

    fn close_section(&mut self, section: Option<Section>) {
        if let Some(section) = section {
            self.sections.push(section);
        }
    }

    fn close_module(&mut self, module: Option<(String, Vec<String>)>) {
        if let Some((name, lines)) = module {
            let text = lines.join("\n").trim_end().to_string();
            self.modules.push((name, text));
        }
    }

    /// Sections of the `main` module
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }
}

/// Variables declared while combining fragments
///
/// The context is threaded through [`crate::combine`] and returned with all
/// variables that ended up in the combined model. Passing a context that
/// already holds declarations suppresses redeclaring them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombineContext {
    vars: IndexMap<String, String>,
    frozen_vars: IndexMap<String, String>,
    ivars: IndexMap<String, String>,
}

impl CombineContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// State variables and their types
    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(n, t)| (n.as_str(), t.as_str()))
    }

    /// Frozen variables and their types
    pub fn frozen_vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.frozen_vars.iter().map(|(n, t)| (n.as_str(), t.as_str()))
    }

    /// Input variables and their types
    pub fn ivars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.ivars.iter().map(|(n, t)| (n.as_str(), t.as_str()))
    }

    /// Check whether `name` is declared as any kind of variable
    pub fn is_declared(&self, name: &str) -> bool {
        self.vars.contains_key(name)
            || self.frozen_vars.contains_key(name)
            || self.ivars.contains_key(name)
    }

    /// Type `name` was declared with
    pub fn type_of(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .or_else(|| self.frozen_vars.get(name))
            .or_else(|| self.ivars.get(name))
            .map(|t| t.as_str())
    }

    /// Declare a variable, returns `false` if it was declared before
    ///
    /// The first declaration of a variable wins. A later declaration with a
    /// different type is dropped with a warning.
    pub fn declare(&mut self, kind: SectionKind, name: &str, ty: &str) -> bool {
        if let Some(existing) = self.type_of(name) {
            if existing != ty {
                warn!(
                    "Variable '{name}' is declared with types '{existing}' and '{ty}', keeping '{existing}'"
                );
            } else {
                debug!("Dropping duplicate declaration of variable '{name}'");
            }
            return false;
        }

        let map = match kind {
            SectionKind::IVar => &mut self.ivars,
            SectionKind::FrozenVar => &mut self.frozen_vars,
            _ => &mut self.vars,
        };
        map.insert(name.to_string(), ty.to_string());
        true
    }
}

/// Parse a declaration `name : type` (with or without trailing `;`)
pub fn parse_declaration(decl: &str) -> Result<(String, String), CombineError> {
    let decl = decl.trim().trim_end_matches(';').trim();
    let (name, ty) = decl
        .split_once(':')
        .ok_or_else(|| CombineError::MalformedDeclaration(decl.to_string()))?;
    let (name, ty) = (name.trim(), ty.trim());

    let valid_name = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '#' | '[' | ']'));
    if !valid_name || ty.is_empty() {
        return Err(CombineError::MalformedDeclaration(decl.to_string()));
    }

    Ok((name.to_string(), ty.to_string()))
}

/// Model in the process of being combined
///
/// Plugins operate on this representation before it is rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombinedModel {
    sections: Vec<Section>,
    modules: IndexMap<String, String>,
}

impl CombinedModel {
    /// Merge `fragments` into a single model, recording declarations in `ctx`
    pub fn merge(fragments: &[Fragment], ctx: &mut CombineContext) -> Result<Self, CombineError> {
        let mut model = CombinedModel::default();

        for fragment in fragments.iter() {
            for section in fragment.sections.iter() {
                if section.kind.is_declaration() {
                    model.add_declarations(section, ctx)?;
                } else {
                    model.sections.push(section.clone());
                }
            }

            for (name, text) in fragment.modules.iter() {
                if model.modules.contains_key(name) {
                    debug!("Dropping duplicate definition of module '{name}'");
                    continue;
                }
                model.modules.insert(name.clone(), text.clone());
            }
        }

        Ok(model)
    }

    fn add_declarations(
        &mut self,
        section: &Section,
        ctx: &mut CombineContext,
    ) -> Result<(), CombineError> {
        let content = section.content();
        for decl in content.split(';').filter(|d| !d.trim().is_empty()) {
            let (name, ty) = parse_declaration(decl)?;
            self.declare(section.kind, &name, &ty, ctx);
        }
        Ok(())
    }

    /// Add a declaration to the model unless the variable is already declared
    pub fn declare(&mut self, kind: SectionKind, name: &str, ty: &str, ctx: &mut CombineContext) {
        if ctx.declare(kind, name, ty) {
            self.sections.push(Section::new(
                kind,
                keyword_of(kind),
                vec![format!("{name} : {ty};")],
            ));
        }
    }

    /// All sections of the `main` module in merge order
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Keep only the sections for which `keep` returns true
    pub fn retain_sections<F: FnMut(&Section) -> bool>(&mut self, keep: F) {
        self.sections.retain(keep);
    }

    /// Names of the auxiliary modules
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(|n| n.as_str())
    }
}

/// Keyword used when rendering sections of `kind`
fn keyword_of(kind: SectionKind) -> &'static str {
    match kind {
        SectionKind::Var => "VAR",
        SectionKind::IVar => "IVAR",
        SectionKind::FrozenVar => "FROZENVAR",
        SectionKind::Define => "DEFINE",
        SectionKind::Assign => "ASSIGN",
        SectionKind::Init => "INIT",
        SectionKind::Invar => "INVAR",
        SectionKind::Trans => "TRANS",
        SectionKind::Fairness => "FAIRNESS",
        SectionKind::Spec => "SPEC",
    }
}

impl fmt::Display for CombinedModel {
    /// Renders `main` with its sections grouped by kind in canonical order,
    /// declarations of the same kind in a single block
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MODULE main")?;

        let mut kinds: Vec<SectionKind> = self.sections.iter().map(|s| s.kind).collect();
        kinds.sort();
        kinds.dedup();

        for kind in kinds {
            let sections = self.sections.iter().filter(|s| s.kind == kind);
            if kind.is_declaration() || matches!(kind, SectionKind::Define | SectionKind::Assign) {
                writeln!(f, "{}", keyword_of(kind))?;
                for section in sections {
                    for line in section.body.iter().filter(|l| !l.trim().is_empty()) {
                        writeln!(f, "    {}", line.trim())?;
                    }
                }
            } else {
                for section in sections {
                    writeln!(f, "{section}")?;
                }
            }
        }

        for text in self.modules.values() {
            writeln!(f)?;
            writeln!(f, "{text}")?;
        }

        Ok(())
    }
}

//! Declaration types collected from rules.lua

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// The project declaration from rules.lua
///
/// `env` is re-exported to every external stage command, replacing the
/// ambient-environment passthrough a packaging script would rely on.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectDecl {
    /// Package name
    pub name: String,

    /// Environment variables set for every stage subprocess
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A named pipeline stage
///
/// The pipeline order is fixed: clean, build, docs, test. `docs` is the
/// auxiliary documentation/man generation step that runs only after a
/// successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Clean,
    Build,
    Docs,
    Test,
}

impl StageName {
    /// Parse a stage name as written in rules.lua
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clean" => Some(StageName::Clean),
            "build" => Some(StageName::Build),
            "docs" => Some(StageName::Docs),
            "test" => Some(StageName::Test),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            StageName::Clean => "clean",
            StageName::Build => "build",
            StageName::Docs => "docs",
            StageName::Test => "test",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An external command declaration for a pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageDecl {
    /// Which stage this command belongs to
    pub stage: StageName,

    /// Command argv; the first element is the program
    pub run: Vec<String>,

    /// Stage-specific environment overrides (take precedence over project env)
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory, resolved against the build tree root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl StageDecl {
    /// Validate that the command argv is usable
    pub fn validate(&self) -> Result<(), String> {
        if self.run.is_empty() {
            return Err(format!("stage '{}' has an empty run command", self.stage));
        }
        if self.run[0].trim().is_empty() {
            return Err(format!("stage '{}' has an empty program name", self.stage));
        }
        Ok(())
    }
}

/// A derived-artifact extension set
///
/// Every file whose stem matches a `from` templated source and whose
/// extension is in `strip` is considered disposable and is deleted on
/// clean to force full regeneration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DerivedDecl {
    /// Extension of the templated source files (without dot, e.g. "pyx")
    pub from: String,

    /// Extensions of derived files to strip (e.g. ["cpp", "c", "html"])
    pub strip: Vec<String>,
}

impl DerivedDecl {
    /// Validate and normalize (leading dots are accepted and removed)
    pub fn validate(&self) -> Result<(), String> {
        if self.from.is_empty() {
            return Err("derived{} requires a non-empty 'from' extension".to_string());
        }
        if self.strip.is_empty() {
            return Err(format!(
                "derived{{}} for '.{}' requires at least one 'strip' extension",
                self.from
            ));
        }
        if self.strip.iter().any(|e| e.is_empty()) {
            return Err(format!(
                "derived{{}} for '.{}' has an empty 'strip' extension",
                self.from
            ));
        }
        Ok(())
    }
}

/// A single routing rule inside a bundle
///
/// Exactly one of `glob` or `file` must be set. `glob` rules route
/// whatever matches; `file` rules name a required artifact and installing
/// fails if it is missing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteRule {
    /// Glob pattern, relative to the build tree root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glob: Option<String>,

    /// Fixed file path, relative to the build tree root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Destination directory, relative to the bundle root
    pub to: PathBuf,
}

impl RouteRule {
    /// Validate that exactly one of glob or file is set and that the
    /// destination stays inside the bundle root
    pub fn validate(&self) -> Result<(), String> {
        if self.to.is_absolute() {
            return Err(format!(
                "rule destination '{}' must be relative to the bundle root",
                self.to.display()
            ));
        }
        match (self.glob.is_some(), self.file.is_some()) {
            (false, false) => Err(format!(
                "rule routing to '{}' must specify one of: glob, file",
                self.to.display()
            )),
            (true, true) => Err(format!(
                "rule routing to '{}' cannot specify both glob and file",
                self.to.display()
            )),
            _ => Ok(()),
        }
    }

    /// A required rule aborts install when its source is missing
    pub fn is_required(&self) -> bool {
        self.file.is_some()
    }

    /// Get a description of the rule type for display
    pub fn kind(&self) -> &'static str {
        if self.glob.is_some() { "glob" } else { "file" }
    }
}

/// An output bundle declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleDecl {
    /// Bundle name (e.g. "runtime", "debug", "doc")
    pub name: String,

    /// Staging root the bundle's files are copied under
    pub root: PathBuf,

    /// Routing rules, applied in declaration order
    #[serde(default)]
    pub rules: Vec<RouteRule>,

    /// Subtrees under the bundle root deleted unconditionally before routing
    #[serde(default)]
    pub purge: Vec<PathBuf>,

    /// After routing, delete every staged file not matching this pattern
    /// (debug bundles keep only compiled binaries, e.g. "*.so")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep: Option<String>,
}

impl BundleDecl {
    /// Validate the bundle and all of its rules
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("bundle{} requires a non-empty 'name'".to_string());
        }
        if self.root.as_os_str().is_empty() {
            return Err(format!("bundle '{}' requires a 'root' path", self.name));
        }
        for rule in &self.rules {
            rule.validate()
                .map_err(|e| format!("bundle '{}': {}", self.name, e))?;
        }
        // An absolute purge entry would resolve outside the bundle root
        for path in &self.purge {
            if path.is_absolute() {
                return Err(format!(
                    "bundle '{}': purge path '{}' must be relative to the bundle root",
                    self.name,
                    path.display()
                ));
            }
        }
        Ok(())
    }
}

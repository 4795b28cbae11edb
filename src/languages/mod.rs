//! Language adapters
//!
//! Checks compile and run submissions through a `LanguageAdapter` instead of
//! hardcoding a toolchain. Adapters are built from the language table in
//! `files/languages.toml`:
//! - `compiled`: invokes a compiler with default, overridable flags
//! - `interpreted`: no compile step, runs through an interpreter
//!
//! Both can wrap a run with an external leak checker (valgrind).

pub mod compiled;
pub mod interpreted;
pub mod leak_check;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::context::CheckContext;
use crate::error::CheckError;
use crate::runner::ProcessHandle;

pub use compiled::CompiledAdapter;
pub use interpreted::InterpretedAdapter;

/// Toolchain-specific capabilities used by check bodies
#[async_trait]
pub trait LanguageAdapter: Send + Sync {
    /// Language name from the table
    fn name(&self) -> &str;

    /// Build the requested files; fails with the (truncated) build log
    async fn compile(&self, ctx: &CheckContext, request: &CompileRequest) -> Result<(), CheckError>;

    /// Command line that runs `program`
    fn run_command(&self, program: &str) -> String;

    /// Run `command` under the leak checker; findings fail the check once
    /// the body has finished
    async fn run_with_leak_check(
        &self,
        ctx: &CheckContext,
        command: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<ProcessHandle, CheckError>;
}

/// Value of one compiler flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    Enabled,
    Disabled,
    Value(String),
}

impl TryFrom<&toml::Value> for FlagValue {
    type Error = anyhow::Error;

    fn try_from(value: &toml::Value) -> Result<Self> {
        match value {
            toml::Value::Boolean(true) => Ok(FlagValue::Enabled),
            toml::Value::Boolean(false) => Ok(FlagValue::Disabled),
            toml::Value::String(s) => Ok(FlagValue::Value(s.clone())),
            toml::Value::Integer(i) => Ok(FlagValue::Value(i.to_string())),
            toml::Value::Float(f) => Ok(FlagValue::Value(f.to_string())),
            other => anyhow::bail!("Unsupported flag value: {}", other),
        }
    }
}

/// Ordered compiler flags; later settings replace earlier ones
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileFlags(Vec<(String, FlagValue)>);

impl CompileFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: &toml::Table) -> Result<Self> {
        let mut flags = Self::new();
        for (name, value) in table {
            let value = FlagValue::try_from(value)
                .with_context(|| format!("Invalid value for flag {}", name))?;
            flags.set(name.clone(), value);
        }
        Ok(flags)
    }

    pub fn set(&mut self, name: impl Into<String>, value: FlagValue) {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// These flags with `overrides` applied on top
    pub fn merged(&self, overrides: &CompileFlags) -> CompileFlags {
        let mut merged = self.clone();
        for (name, value) in &overrides.0 {
            merged.set(name.clone(), value.clone());
        }
        merged
    }

    /// Command-line form: `-name` or `-name=value`; disabled and empty flags
    /// are dropped
    pub fn render(&self) -> Vec<String> {
        self.0
            .iter()
            .filter_map(|(name, value)| {
                let name = name.replace('_', "-");
                match value {
                    FlagValue::Enabled => Some(format!("-{}", name)),
                    FlagValue::Disabled => None,
                    FlagValue::Value(v) if v.is_empty() => None,
                    FlagValue::Value(v) => Some(format!("-{}={}", name, v)),
                }
            })
            .collect()
    }
}

/// What to compile
#[derive(Debug, Clone, Default)]
pub struct CompileRequest {
    pub files: Vec<String>,
    /// Output name; defaults to the first file's stem
    pub output: Option<String>,
    /// Overrides for the language's default flags
    pub flags: CompileFlags,
}

impl CompileRequest {
    pub fn new(files: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_flag(mut self, name: impl Into<String>, value: FlagValue) -> Self {
        self.flags.set(name, value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageKind {
    Compiled,
    Interpreted,
}

/// Configuration for a supported programming language
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    pub name: String,
    pub kind: LanguageKind,
    /// Extension of source files, without the dot (e.g., "c")
    pub source_extension: String,
    /// Compiler binary (compiled languages)
    pub compiler: Option<String>,
    pub default_flags: CompileFlags,
    /// Interpreter binary (interpreted languages)
    pub interpreter: Option<String>,
    /// Leak checker binary, if this toolchain supports one
    pub leak_checker: Option<String>,
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
struct RawLanguageConfig {
    kind: LanguageKind,
    source_extension: String,
    compiler: Option<String>,
    #[serde(default)]
    default_flags: toml::Table,
    interpreter: Option<String>,
    leak_checker: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Language configurations keyed by lowercase name and alias
#[derive(Debug, Clone, Default)]
pub struct LanguageTable {
    languages: HashMap<String, LanguageConfig>,
}

impl LanguageTable {
    pub fn parse(content: &str) -> Result<Self> {
        let raw_configs: HashMap<String, RawLanguageConfig> =
            toml::from_str(content).context("Invalid language table")?;

        let mut languages = HashMap::new();
        for (name, raw) in raw_configs {
            match raw.kind {
                LanguageKind::Compiled if raw.compiler.is_none() => {
                    anyhow::bail!("Compiled language {} has no compiler", name)
                }
                LanguageKind::Interpreted if raw.interpreter.is_none() => {
                    anyhow::bail!("Interpreted language {} has no interpreter", name)
                }
                _ => {}
            }

            let config = LanguageConfig {
                name: name.to_lowercase(),
                kind: raw.kind,
                source_extension: raw.source_extension,
                compiler: raw.compiler,
                default_flags: CompileFlags::from_table(&raw.default_flags)
                    .with_context(|| format!("Invalid default flags for {}", name))?,
                interpreter: raw.interpreter,
                leak_checker: raw.leak_checker,
            };

            for alias in raw.aliases {
                languages.insert(alias.to_lowercase(), config.clone());
            }
            languages.insert(name.to_lowercase(), config);
        }

        Ok(Self { languages })
    }

    pub fn get(&self, language: &str) -> Option<&LanguageConfig> {
        self.languages.get(&language.to_lowercase())
    }

    /// All names and aliases
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.languages.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn create_adapter(&self, language: &str) -> Option<Arc<dyn LanguageAdapter>> {
        self.get(language).cloned().map(adapter_for)
    }
}

/// Build the adapter variant matching a language's kind
pub fn adapter_for(config: LanguageConfig) -> Arc<dyn LanguageAdapter> {
    match config.kind {
        LanguageKind::Compiled => Arc::new(CompiledAdapter::new(config)),
        LanguageKind::Interpreted => Arc::new(InterpretedAdapter::new(config)),
    }
}

/// Global language configurations
static LANGUAGES: OnceLock<LanguageTable> = OnceLock::new();

/// Load the built-in language table (idempotent)
pub fn init_languages() -> Result<&'static LanguageTable> {
    if let Some(table) = LANGUAGES.get() {
        return Ok(table);
    }
    let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));
    let table = LanguageTable::parse(content)?;
    Ok(LANGUAGES.get_or_init(|| table))
}

/// Load the language table from a TOML file instead of the built-in one.
/// Must run before anything else touches the table.
pub fn init_languages_from(path: &Path) -> Result<&'static LanguageTable> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read language config from {:?}", path))?;
    let table = LanguageTable::parse(&content)?;
    LANGUAGES
        .set(table)
        .map_err(|_| anyhow::anyhow!("Language table already initialized"))?;
    init_languages()
}

/// Get all supported language names
pub fn get_supported_languages() -> Vec<String> {
    init_languages()
        .map(LanguageTable::names)
        .unwrap_or_default()
}

/// Adapter for a built-in language
pub fn create_adapter(language: &str) -> Result<Arc<dyn LanguageAdapter>> {
    init_languages()?
        .create_adapter(language)
        .ok_or_else(|| anyhow::anyhow!("Unsupported language: {}", language))
}

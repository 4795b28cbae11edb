//! Checks file loader
//!
//! A checks file is TOML: an optional suite-wide `language` and a list of
//! `[[check]]` tables, each with a name, description, optional prerequisite
//! (`depends`) and an ordered list of steps. Every check becomes a
//! `ScriptedCheck` body registered in file order.
//!
//! Anything that can be validated up front (languages, flags, regexes) is
//! rejected here so a broken suite fails before any check runs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::context::CheckContext;
use crate::error::CheckError;
use crate::languages::{init_languages, CompileFlags, CompileRequest, LanguageAdapter, LanguageTable};
use crate::registry::{Check, CheckBody, Registry};
use crate::runner::{Matcher, ProcessHandle};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSuite {
    language: Option<String>,
    #[serde(default, rename = "check")]
    checks: Vec<RawCheck>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCheck {
    name: String,
    description: Option<String>,
    depends: Option<String>,
    language: Option<String>,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawStep {
    Exists(String),
    Include(Vec<String>),
    Compile(RawCompile),
    Run(RawRun),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCompile {
    files: Vec<String>,
    output: Option<String>,
    #[serde(default)]
    flags: toml::Table,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRun {
    command: String,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    leak_check: bool,
    timeout_secs: Option<u64>,
    #[serde(default)]
    expect: Vec<RawExpect>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawExpect {
    Stdin(String),
    Stdout(String),
    StdoutRegex(String),
    Reject(String),
    RejectRegex(String),
    Exit(i32),
    Killed(bool),
}

/// One step of a scripted check
#[derive(Debug, Clone)]
pub enum Step {
    Exists(String),
    Include(Vec<String>),
    Compile(CompileRequest),
    Run(RunStep),
}

#[derive(Debug, Clone)]
pub struct RunStep {
    pub command: String,
    pub env: BTreeMap<String, String>,
    pub leak_check: bool,
    pub timeout: Option<Duration>,
    pub expect: Vec<Expect>,
}

/// Assertion applied to a running process, in order
#[derive(Debug, Clone)]
pub enum Expect {
    Stdin(String),
    Stdout(Matcher),
    Reject(Matcher),
    Exit(i32),
    Killed,
}

/// Check body that runs a fixed list of steps
pub struct ScriptedCheck {
    steps: Vec<Step>,
    adapter: Option<Arc<dyn LanguageAdapter>>,
}

impl ScriptedCheck {
    pub fn new(steps: Vec<Step>, adapter: Option<Arc<dyn LanguageAdapter>>) -> Self {
        Self { steps, adapter }
    }

    fn adapter(&self) -> Result<&dyn LanguageAdapter, CheckError> {
        self.adapter
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no language configured for this check").into())
    }

    async fn run_step(&self, ctx: &CheckContext, step: &RunStep) -> Result<(), CheckError> {
        let mut process = if step.leak_check {
            self.adapter()?
                .run_with_leak_check(ctx, &step.command, &step.env)
                .await?
        } else {
            ctx.run_with_env(&step.command, &step.env).await?
        };
        if let Some(timeout) = step.timeout {
            process = process.timeout(timeout);
        }

        if step.expect.is_empty() {
            process.wait().await?;
            return Ok(());
        }
        for expect in &step.expect {
            process = apply(process, expect).await?;
        }
        Ok(())
    }
}

async fn apply(process: ProcessHandle, expect: &Expect) -> Result<ProcessHandle, CheckError> {
    match expect {
        Expect::Stdin(text) => process.stdin(text).await,
        Expect::Stdout(matcher) => process.stdout(matcher.clone()).await,
        Expect::Reject(matcher) => process.reject(matcher.clone()).await,
        Expect::Exit(code) => process.exit(*code).await,
        Expect::Killed => process.killed().await,
    }
}

#[async_trait]
impl CheckBody for ScriptedCheck {
    async fn run(&self, ctx: CheckContext) -> Result<(), CheckError> {
        for step in &self.steps {
            match step {
                Step::Exists(path) => ctx.exists(path)?,
                Step::Include(names) => ctx.include(names)?,
                Step::Compile(request) => self.adapter()?.compile(&ctx, request).await?,
                Step::Run(run) => self.run_step(&ctx, run).await?,
            }
        }
        Ok(())
    }
}

/// A loaded checks file
pub struct Suite {
    pub registry: Registry,
    /// Directory holding the checks file; `include` copies from here
    pub checks_dir: PathBuf,
}

/// Load a checks file against the built-in language table
pub fn load_suite(path: &Path) -> Result<Suite> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read checks file {:?}", path))?;
    let languages = init_languages()?;
    let registry = parse_suite(&content, languages)
        .with_context(|| format!("Invalid checks file {:?}", path))?;

    let checks_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    info!("Loaded {} checks from {:?}", registry.len(), path);

    Ok(Suite {
        registry,
        checks_dir,
    })
}

/// Parse checks file content into a registry
pub fn parse_suite(content: &str, languages: &LanguageTable) -> Result<Registry> {
    let raw: RawSuite = toml::from_str(content).context("Failed to parse checks file")?;

    let mut registry = Registry::new();
    for check in raw.checks {
        let name = check.name.clone();
        let language = check.language.clone().or_else(|| raw.language.clone());
        let built = build_check(check, language.as_deref(), languages)
            .with_context(|| format!("Invalid check {}", name))?;
        registry.register(built)?;
    }
    Ok(registry)
}

fn build_check(raw: RawCheck, language: Option<&str>, languages: &LanguageTable) -> Result<Check> {
    let adapter = match language {
        Some(language) => Some(
            languages
                .create_adapter(language)
                .ok_or_else(|| anyhow::anyhow!("Unsupported language: {}", language))?,
        ),
        None => None,
    };

    let mut steps = Vec::with_capacity(raw.steps.len());
    for step in raw.steps {
        let step = match step {
            RawStep::Exists(path) => Step::Exists(path),
            RawStep::Include(names) => Step::Include(names),
            RawStep::Compile(compile) => {
                anyhow::ensure!(adapter.is_some(), "compile step requires a language");
                anyhow::ensure!(!compile.files.is_empty(), "compile step requires at least one file");
                Step::Compile(CompileRequest {
                    files: compile.files,
                    output: compile.output,
                    flags: CompileFlags::from_table(&compile.flags)?,
                })
            }
            RawStep::Run(run) => {
                anyhow::ensure!(
                    !run.leak_check || adapter.is_some(),
                    "leak_check requires a language"
                );
                let expect = run
                    .expect
                    .into_iter()
                    .map(build_expect)
                    .collect::<Result<Vec<_>>>()?;
                Step::Run(RunStep {
                    command: run.command,
                    env: run.env,
                    leak_check: run.leak_check,
                    timeout: run.timeout_secs.map(Duration::from_secs),
                    expect,
                })
            }
        };
        steps.push(step);
    }

    debug!("Built check {} with {} steps", raw.name, steps.len());
    let description = raw.description.unwrap_or_else(|| raw.name.clone());
    let mut check = Check::new(raw.name, description, Arc::new(ScriptedCheck::new(steps, adapter)));
    if let Some(prerequisite) = raw.depends {
        check = check.after(prerequisite);
    }
    Ok(check)
}

fn build_expect(raw: RawExpect) -> Result<Expect> {
    let regex = |pattern: &str| {
        Matcher::regex(pattern).with_context(|| format!("Invalid pattern {:?}", pattern))
    };
    Ok(match raw {
        RawExpect::Stdin(text) => Expect::Stdin(text),
        RawExpect::Stdout(text) => Expect::Stdout(Matcher::Literal(text)),
        RawExpect::StdoutRegex(pattern) => Expect::Stdout(regex(&pattern)?),
        RawExpect::Reject(text) => Expect::Reject(Matcher::Literal(text)),
        RawExpect::RejectRegex(pattern) => Expect::Reject(regex(&pattern)?),
        RawExpect::Exit(code) => Expect::Exit(code),
        RawExpect::Killed(true) => Expect::Killed,
        RawExpect::Killed(false) => anyhow::bail!("killed = false is not an expectation; use exit"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SuiteError;

    const LANGUAGES: &str = r#"
[c]
kind = "compiled"
source_extension = "c"
compiler = "clang"
default_flags = { std = "c11" }
"#;

    fn languages() -> LanguageTable {
        LanguageTable::parse(LANGUAGES).unwrap()
    }

    #[test]
    fn test_parse_hello_suite() {
        let content = r#"
language = "c"

[[check]]
name = "exists"
description = "hello.c exists"
steps = [{ exists = "hello.c" }]

[[check]]
name = "compiles"
depends = "exists"
steps = [{ compile = { files = ["hello.c"], flags = { Wall = true } } }]

[[check]]
name = "prints_hello"
description = "prints 'Hello, World!'"
depends = "compiles"
steps = [
    { run = { command = "./hello", expect = [{ stdout = "Hello" }, { exit = 0 }] } },
]
"#;
        let registry = parse_suite(content, &languages()).unwrap();

        let names: Vec<&str> = registry.iter().map(Check::name).collect();
        assert_eq!(names, vec!["exists", "compiles", "prints_hello"]);
        assert_eq!(registry.get("compiles").unwrap().description(), "compiles");
        assert_eq!(registry.get("prints_hello").unwrap().prerequisite(), Some("compiles"));
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_compile_without_language_is_rejected() {
        let content = r#"
[[check]]
name = "compiles"
steps = [{ compile = { files = ["hello.c"] } }]
"#;
        let err = parse_suite(content, &languages()).unwrap_err();
        assert!(format!("{:#}", err).contains("compile step requires a language"));
    }

    #[test]
    fn test_unknown_language_and_bad_regex_are_rejected() {
        let unknown = "[[check]]\nname = \"a\"\nlanguage = \"cobol\"\n";
        let err = parse_suite(unknown, &languages()).unwrap_err();
        assert!(format!("{:#}", err).contains("Unsupported language: cobol"));

        let bad_regex = r#"
[[check]]
name = "a"
steps = [{ run = { command = "true", expect = [{ stdout_regex = "(" }] } }]
"#;
        let err = parse_suite(bad_regex, &languages()).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid pattern"));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let content = "[[check]]\nname = \"a\"\n\n[[check]]\nname = \"a\"\n";
        let err = parse_suite(content, &languages()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SuiteError>(),
            Some(SuiteError::DuplicateCheck(name)) if name == "a"
        ));
    }

    #[tokio::test]
    async fn test_scripted_check_runs_steps_in_order() {
        let content = r#"
[[check]]
name = "greets"

[[check.steps]]
exists = "name.txt"

[[check.steps]]
[check.steps.run]
command = "read n; echo \"hi $n\"; exit 4"
timeout_secs = 2
expect = [
    { stdin = "Ada" },
    { stdout_regex = "hi \\w+" },
    { reject = "bye" },
    { exit = 4 },
]
"#;
        let registry = parse_suite(content, &languages()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("name.txt"), "").unwrap();
        let ctx = CheckContext::new("greets", dir.path(), None, Default::default());

        registry
            .get("greets")
            .unwrap()
            .body()
            .run(ctx.clone())
            .await
            .unwrap();
        assert_eq!(ctx.take_log()[0], "checking that name.txt exists...");
    }

    #[test]
    fn test_load_suite_records_checks_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checks.toml");
        std::fs::write(&path, "[[check]]\nname = \"a\"\nsteps = [{ exists = \"a.txt\" }]\n").unwrap();

        let suite = load_suite(&path).unwrap();
        assert_eq!(suite.checks_dir, dir.path());
        assert_eq!(suite.registry.len(), 1);
    }
}

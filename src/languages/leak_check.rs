//! Leak checking with valgrind
//!
//! The program runs under the checker with an XML report written to a
//! temporary file. Once the check body is done, an after-check hook parses
//! the report, logs every distinct finding and fails the check if any remain.

use anyhow::Context;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::context::CheckContext;
use crate::error::CheckError;
use crate::runner::ProcessHandle;

/// One error entry from the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakFinding {
    pub kind: String,
    pub message: String,
}

/// Run `command` under `tool`, or plainly when no tool is configured
pub async fn run(
    ctx: &CheckContext,
    tool: Option<&str>,
    command: &str,
    env: &BTreeMap<String, String>,
) -> Result<ProcessHandle, CheckError> {
    let Some(tool) = tool else {
        warn!("No leak checker configured for check {}", ctx.name());
        ctx.log("no leak checker available for this language; running without one");
        return ctx.run_with_env(command, env).await;
    };

    let report = tempfile::Builder::new()
        .prefix("grader-leaks-")
        .suffix(".xml")
        .tempfile()
        .context("Failed to create leak report file")?;

    let wrapped = format!(
        "{} --leak-check=full --show-leak-kinds=all --xml=yes --xml-file={} -- {}",
        tool,
        report.path().display(),
        command
    );
    let process = ctx.run_with_env(&wrapped, env).await?;

    let run_dir = ctx.root().to_path_buf();
    ctx.after_check(Box::new(move |ctx| check_report(ctx, report, &run_dir)));
    Ok(process)
}

fn check_report(ctx: &CheckContext, report: NamedTempFile, run_dir: &Path) -> Result<(), CheckError> {
    ctx.log("checking for valgrind errors...");

    let xml = std::fs::read_to_string(report.path()).context("Failed to read valgrind report")?;
    if xml.trim().is_empty() {
        return Err(CheckError::failure_with_help(
            "valgrind produced no report",
            "make sure valgrind is installed and the program runs to completion",
        ));
    }

    let findings = parse_report(&xml, run_dir)?;
    debug!("valgrind reported {} distinct errors", findings.len());
    for finding in &findings {
        ctx.log(finding.message.clone());
    }

    if findings.is_empty() {
        Ok(())
    } else {
        Err(CheckError::failure(
            "valgrind tests failed; see log for more information.",
        ))
    }
}

/// Distinct findings in report order
///
/// File and line come from the first stack frame whose object lies under
/// `run_dir`, so only code from the working area is blamed.
pub fn parse_report(xml: &str, run_dir: &Path) -> Result<Vec<LeakFinding>, CheckError> {
    let doc = roxmltree::Document::parse(xml).context("Malformed valgrind report")?;

    let mut seen = HashSet::new();
    let mut findings = Vec::new();

    for error in doc
        .root_element()
        .children()
        .filter(|node| node.has_tag_name("error"))
    {
        let kind = child_text(error, &["kind"]).unwrap_or_default().to_string();
        let what_path: &[&str] = if kind.starts_with("Leak_") {
            &["xwhat", "text"]
        } else {
            &["what"]
        };
        let what = child_text(error, what_path).unwrap_or_default();

        let mut message = format!("\t{}", what);
        let frames = child(error, "stack")
            .into_iter()
            .flat_map(|stack| stack.children().filter(|node| node.has_tag_name("frame")));
        for frame in frames {
            let in_run_dir = child_text(frame, &["obj"])
                .is_some_and(|obj| Path::new(obj).starts_with(run_dir));
            if !in_run_dir {
                continue;
            }
            if let (Some(file), Some(line)) =
                (child_text(frame, &["file"]), child_text(frame, &["line"]))
            {
                message.push_str(&format!(": (file: {}, line: {})", file, line));
            }
            break;
        }

        if seen.insert((kind.clone(), message.clone())) {
            findings.push(LeakFinding { kind, message });
        }
    }

    Ok(findings)
}

fn child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn child_text<'a>(node: roxmltree::Node<'a, '_>, path: &[&str]) -> Option<&'a str> {
    let mut current = node;
    for name in path {
        current = child(current, name)?;
    }
    current.text().map(str::trim)
}

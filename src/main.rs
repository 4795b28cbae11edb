use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use grader::config::{init_config, EngineConfig};
use grader::languages::{init_languages, init_languages_from};
use grader::{load_suite, CheckResult, FileSet, Scheduler, Verdict};

#[derive(Parser, Debug)]
#[command(name = "grader", version, about = "Run a checks file against a submission")]
struct Cli {
    /// TOML checks file
    checks: PathBuf,
    /// Submission files (default: every non-hidden file under --root)
    files: Vec<PathBuf>,
    /// Checkout root the submission files are relative to
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Only run these checks (and their prerequisites)
    #[arg(long = "target")]
    targets: Vec<String>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
    /// Print each check's log in text output
    #[arg(long)]
    log: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("grader=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_config(EngineConfig::from_env())?;
    match std::env::var("GRADER_LANGUAGES_CONFIG") {
        Ok(path) => {
            init_languages_from(path.as_ref())?;
            info!("Loaded language configurations from {}", path);
        }
        Err(_) => {
            init_languages()?;
        }
    }

    let suite = load_suite(&cli.checks)?;
    let files = if cli.files.is_empty() {
        FileSet::discover(&cli.root)?
    } else {
        FileSet::new(&cli.root, cli.files.clone())
    };
    info!("Grading {} files under {:?}", files.len(), files.root());

    let scheduler = Scheduler::new(suite.registry, files)?.with_checks_dir(suite.checks_dir);
    let results = scheduler.run(&cli.targets).await?;

    match cli.output {
        OutputFormat::Json => {
            for result in &results {
                let line = serde_json::to_string(result).context("Failed to serialize result")?;
                println!("{}", line);
            }
        }
        OutputFormat::Text => {
            for result in &results {
                print_text(result, cli.log);
            }
        }
    }

    let all_passed = results.iter().all(CheckResult::is_passed);
    Ok(if all_passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_text(result: &CheckResult, with_log: bool) {
    let marker = match result.verdict() {
        Verdict::Passed => "PASS",
        Verdict::Failed => "FAIL",
        Verdict::Skipped => "SKIP",
    };
    println!("[{}] {} ({})", marker, result.description, result.name);

    if let Some(cause) = &result.cause {
        println!("    {}", cause.rationale);
        if let Some(help) = &cause.help {
            println!("    {}", help);
        }
    }
    if with_log {
        for line in &result.log {
            println!("    | {}", line);
        }
    }
}

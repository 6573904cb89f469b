//! Sandpit CLI - run untrusted snippets under the sandbox
//!
//! Usage:
//!   sandpit check [FILE]        - static analysis only
//!   sandpit run [FILE]          - one-shot run, input() is not interactive
//!   sandpit interactive FILE    - coordinated run, prompts answered from stdin

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sandpit_core::{Coordinator, ExecutionResult, Sandbox, SandboxConfig, Status};
use sandpit_sandbox::{Analyzer, LimitScope};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often the interactive frontend polls its run
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Parser)]
#[command(name = "sandpit")]
#[command(author = "HeyBattle1")]
#[command(version)]
#[command(about = "Sandboxed execution of untrusted code snippets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report what the static analyzer would reject
    Check {
        /// Source file; stdin when omitted or "-"
        file: Option<PathBuf>,
    },

    /// Run a snippet once and print its output
    Run {
        /// Source file; stdin when omitted or "-"
        file: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        limits: LimitArgs,
    },

    /// Run a snippet and answer its input() prompts from the terminal
    Interactive {
        /// Source file (stdin is reserved for answers)
        file: PathBuf,

        /// Print the final result as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        limits: LimitArgs,
    },
}

/// Overrides applied on top of the profile and any `SANDPIT_*` variables
#[derive(Args)]
struct LimitArgs {
    /// Wall-clock limit in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Memory limit in megabytes
    #[arg(long)]
    max_memory_mb: Option<usize>,

    /// Executed-line budget
    #[arg(long)]
    max_instructions: Option<u64>,

    #[arg(long)]
    max_recursion_depth: Option<usize>,

    #[arg(long)]
    max_output_bytes: Option<usize>,

    /// Seconds one input() may wait for an answer
    #[arg(long)]
    input_wait_secs: Option<u64>,

    /// thread (default) or process; process applies rlimits to this process
    #[arg(long)]
    limit_scope: Option<LimitScope>,
}

impl LimitArgs {
    fn apply(self, base: SandboxConfig) -> anyhow::Result<SandboxConfig> {
        let mut config = base
            .with_env_overrides()
            .context("reading SANDPIT_* environment")?;
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(mb) = self.max_memory_mb {
            config = config.with_max_memory_mb(mb);
        }
        if let Some(count) = self.max_instructions {
            config = config.with_max_instructions(count);
        }
        if let Some(depth) = self.max_recursion_depth {
            config = config.with_max_recursion_depth(depth);
        }
        if let Some(bytes) = self.max_output_bytes {
            config = config.with_max_output_bytes(bytes);
        }
        if let Some(secs) = self.input_wait_secs {
            config = config.with_input_wait(Duration::from_secs(secs));
        }
        if let Some(scope) = self.limit_scope {
            config = config.with_limit_scope(scope);
        }
        Ok(config)
    }
}

fn read_source(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        _ => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .context("reading source from stdin")?;
            Ok(source)
        }
    }
}

fn print_result(result: &ExecutionResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(result.output.as_bytes())?;
    stdout.flush()?;
    if !result.error.is_empty() {
        eprintln!("{}", result.error);
    }
    Ok(())
}

/// Follow a coordinated run, relaying output and feeding stdin to prompts
async fn interact(coordinator: &Coordinator, source: String) -> anyhow::Result<ExecutionResult> {
    let token = coordinator.submit(source).await;
    let mut shown = 0;
    loop {
        let snap = coordinator.poll(token).await?;
        if let Some(fresh) = snap.output.get(shown..) {
            print!("{fresh}");
            std::io::stdout().flush()?;
            shown = snap.output.len();
        }

        match snap.status {
            Status::Completed | Status::Error => {
                let result = snap.result.unwrap_or_default();
                if let Some(rest) = result.output.get(shown..) {
                    print!("{rest}");
                }
                return Ok(result);
            }
            Status::WaitingForInput if snap.input_required => {
                let line = tokio::task::spawn_blocking(|| {
                    let mut line = String::new();
                    std::io::stdin().read_line(&mut line).map(|_| line)
                })
                .await??;
                let answer = line.trim_end_matches(['\r', '\n']).to_string();
                let echoed = answer.len() + 1;
                if coordinator.supply_input(token, answer).await? {
                    // the terminal already shows what was typed
                    shown += echoed;
                }
            }
            _ => tokio::time::sleep(POLL_INTERVAL).await,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only snippet output
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let ok = match cli.command {
        Commands::Check { file } => {
            let source = read_source(file.as_deref())?;
            let issues = Analyzer::default().analyze(&source);
            if issues.is_empty() {
                println!("No issues found.");
            } else {
                println!("Issues detected in code:");
                for issue in &issues {
                    println!("- {issue}");
                }
            }
            issues.is_empty()
        }

        Commands::Run { file, json, limits } => {
            let source = read_source(file.as_deref())?;
            let config = limits.apply(SandboxConfig::default())?;
            let result = Sandbox::new(config).run(&source).await;
            print_result(&result, json)?;
            result.is_success()
        }

        Commands::Interactive { file, json, limits } => {
            let source = read_source(Some(file.as_path()))?;
            let config = limits.apply(SandboxConfig::interactive())?;
            let coordinator = Coordinator::new(Sandbox::new(config));
            let result = interact(&coordinator, source).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if !result.error.is_empty() {
                eprintln!("{}", result.error);
            }
            result.is_success()
        }
    };

    if !ok {
        std::io::stdout().flush()?;
        std::process::exit(1);
    }
    Ok(())
}

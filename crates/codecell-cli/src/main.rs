//! Codecell CLI
//!
//! A command-line tool for running code in disposable Docker sandboxes, and
//! the HTTP front end serving the same core.

use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codecell::{
    Config, EXAMPLE_CONFIG, ExecutionRequest, OutputBuffers, ResourceLimits, Runner,
    SandboxBackend, trace,
};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

mod server;

#[derive(Parser)]
#[command(name = "codecell")]
#[command(about = "A tool for running untrusted code in disposable containers")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: codecell.toml)
        #[arg(short, long, default_value = "codecell.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a program (compiled first if the language needs it)
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID or alias (e.g., python, py, cpp)
        #[arg(short, long)]
        language: String,

        /// Wall clock limit in seconds
        #[arg(short, long, value_parser = parse_timeout)]
        timeout: Option<f64>,

        /// Memory limit in MiB
        #[arg(short, long)]
        memory: Option<u64>,

        /// Hide visualization trace lines and summarize them instead
        #[arg(long)]
        trace: bool,
    },

    /// List available languages
    Languages,

    /// Show the effective configuration
    ShowConfig,

    /// Pull container images for the given languages (default: all)
    Pull {
        #[arg(value_name = "LANG")]
        languages: Vec<String>,
    },

    /// Split a captured multiplexed output stream into stdout and stderr
    Demux {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
}

/// Accept only a positive, finite number of seconds
fn parse_timeout(value: &str) -> Result<f64, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|e| format!("'{value}' is not a number: {e}"))?;
    if seconds > 0.0 && Duration::try_from_secs_f64(seconds).is_ok() {
        Ok(seconds)
    } else {
        Err(format!("'{value}' is not a positive number of seconds"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // Logs go to stderr, keeping stdout clean for program output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
    } else {
        debug!("using default configuration");
    }
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            language,
            timeout,
            memory,
            trace,
        } => run_program(config, &source, &language, timeout, memory, trace).await,
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
        Commands::Pull { languages } => pull_images(config, &languages).await,
        Commands::Demux { input } => demux_capture(&input).await,
        Commands::Serve { addr } => serve(config, addr).await,
    }
}

async fn run_program(
    config: Config,
    source: &Path,
    language_id: &str,
    timeout: Option<f64>,
    memory: Option<u64>,
    show_trace: bool,
) -> Result<()> {
    let source_text = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    // Only explicitly given values, so per-language limits still apply
    let user_limits = ResourceLimits {
        wall_time_limit: timeout,
        memory_limit: memory,
        ..ResourceLimits::none()
    };
    let has_user_limits = timeout.is_some() || memory.is_some();

    let runner = Runner::connect(config).context("failed to connect to Docker")?;
    let request = ExecutionRequest::new(language_id, source_text);

    info!(language = language_id, "running program");
    let result = runner
        .submit(&request, has_user_limits.then_some(&user_limits))
        .await
        .context("request rejected")?;

    if show_trace {
        print!("{}", trace::strip_trace_lines(&result.stdout));
        let steps = trace::parse_output(&result.stdout);
        eprintln!("-- {} trace step(s)", steps.len());
        for (n, step) in steps.iter().enumerate() {
            eprintln!("{n:>4}: {:?} i={:?} j={:?}", step.arr, step.i, step.j);
        }
    } else {
        print!("{}", result.stdout);
    }
    std::io::stdout().flush().context("failed to flush stdout")?;

    if !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
    }

    // Log execution info via tracing (stderr), keeping stdout clean for piping
    info!(
        exit_code = ?result.exit_code,
        timed_out = result.timed_out,
        wall_time = format_args!("{:.3}s", result.wall_time),
        "execution result"
    );

    if result.timed_out {
        warn!("program exceeded its wall clock limit");
    }

    if result.is_success() {
        Ok(())
    } else {
        let code = result
            .exit_code
            .and_then(|code| i32::try_from(code).ok())
            .filter(|&code| code != 0)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn pull_images(config: Config, language_ids: &[String]) -> Result<()> {
    let mut images: Vec<&str> = if language_ids.is_empty() {
        config.languages.values().map(|l| l.image.as_str()).collect()
    } else {
        language_ids
            .iter()
            .map(|id| config.get_language(id).map(|l| l.image.as_str()))
            .collect::<Result<_, _>>()
            .context("unknown language")?
    };
    images.sort_unstable();
    images.dedup();

    let images: Vec<String> = images.into_iter().map(str::to_owned).collect();
    let runner = Runner::connect(config).context("failed to connect to Docker")?;

    for image in &images {
        info!(image, "ensuring image");
        runner
            .backend()
            .ensure_image(image)
            .await
            .with_context(|| format!("failed to pull '{image}'"))?;
        println!("{image}");
    }

    Ok(())
}

async fn demux_capture(input: &Path) -> Result<()> {
    let raw = tokio::fs::read(input)
        .await
        .context("failed to read capture file")?;

    let buffers = OutputBuffers::from_raw(&raw).context("malformed capture")?;

    std::io::stdout()
        .write_all(buffers.stdout())
        .context("failed to write stdout")?;
    std::io::stderr()
        .write_all(buffers.stderr())
        .context("failed to write stderr")?;

    debug!(
        stdout = buffers.stdout().len(),
        stderr = buffers.stderr().len(),
        "capture demultiplexed"
    );
    Ok(())
}

async fn serve(config: Config, addr: SocketAddr) -> Result<()> {
    let runner = Arc::new(Runner::connect(config).context("failed to connect to Docker")?);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("shutting down");
    };

    server::serve(runner, addr, shutdown)
        .await
        .context("HTTP server failed")
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    for (id, lang) in &config.languages {
        let lang_type = if lang.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        let aliases = if lang.aliases.is_empty() {
            String::new()
        } else {
            format!(" [{}]", lang.aliases.join(", "))
        };
        println!(
            "  {:<12} {} {} ({}){}  {}",
            id, lang.name, lang.version, lang_type, aliases, lang.image
        );
    }
}

fn show_config(config: &Config) {
    println!("Default resource limits:");
    println!(
        "  Wall time limit: {:?} s",
        config.default_limits.wall_time_limit
    );
    println!("  Memory limit: {:?} MiB", config.default_limits.memory_limit);
    println!("  Max processes: {:?}", config.default_limits.max_processes);
    println!("  CPUs: {:?}", config.default_limits.cpus);
    println!();
    println!(
        "Docker host: {}",
        config.docker_host.as_deref().unwrap_or("(local default)")
    );
    println!("Staging directory: {}", config.staging_dir.display());
    println!("Container workdir: {}", config.container_workdir);
    println!("Pull missing images: {}", config.pull_missing_images);
    println!();
    println!("Languages configured: {}", config.languages.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}

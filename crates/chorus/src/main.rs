use std::env;
use std::fs;
use std::io::{self, Write as _};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context as _};
use chorus::{client, tui};
use chorus_core::config::{load_config, ConfigFile};
use chorus_core::paths::{compute_paths, ChorusPaths, PathInputs};
use chorus_protocol::{AgentRole, AgentState};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use directories::BaseDirs;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "chorus",
    version,
    about = "Interactive supervisor for coding agents run by the chorus daemon"
)]
struct Cli {
    #[arg(long, global = true, value_name = "DIR", env = "CHORUS_DIR")]
    chorus_dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH", env = "CHORUS_SOCKET_PATH")]
    socket_path: Option<PathBuf>,

    #[arg(long, global = true, env = "CHORUS_LOG", value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the interactive supervisor.
    Tui {
        /// Only show these projects. Defaults to `[tui].projects`, then all.
        projects: Vec<String>,
    },
    /// Print the daemon's agents.
    Status,
    #[command(hide = true)]
    Ping,
    Version,
    Completion {
        #[command(subcommand)]
        command: CompletionCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CompletionCommand {
    Bash,
    Fish,
    Powershell,
    Zsh,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let paths = resolve_paths(cli.chorus_dir.as_ref(), cli.socket_path.as_ref())?;
    let config = load_config(&paths.config_file)?;
    let enable_stderr_logging = !matches!(cli.command, Command::Tui { .. });
    init_logging(
        &paths,
        cli.log_level.as_deref(),
        config.log_level.as_deref(),
        enable_stderr_logging,
    )?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "chorus starting");

    dispatch(cli.command, &paths, &config).await
}

fn resolve_paths(
    chorus_dir_override: Option<&PathBuf>,
    socket_path_override: Option<&PathBuf>,
) -> anyhow::Result<ChorusPaths> {
    let base_dirs = BaseDirs::new().ok_or_else(|| anyhow!("could not determine home directory"))?;
    let home_dir = base_dirs.home_dir().to_path_buf();

    let xdg_config_home = match env::var_os("XDG_CONFIG_HOME") {
        Some(v) => Some(PathBuf::from(v)),
        None => Some(base_dirs.config_dir().to_path_buf()),
    };

    Ok(compute_paths(PathInputs {
        home_dir,
        xdg_config_home,
        chorus_dir_override: chorus_dir_override.cloned(),
        socket_path_override: socket_path_override.cloned(),
    }))
}

fn init_logging(
    paths: &ChorusPaths,
    log_level: Option<&str>,
    config_level: Option<&str>,
    enable_stderr_logging: bool,
) -> anyhow::Result<()> {
    let dir_ok = fs::create_dir_all(&paths.base_dir).is_ok();

    // The flag already carries CHORUS_LOG through clap's env fallback.
    let level = log_level
        .map(str::to_owned)
        .or_else(|| env::var("RUST_LOG").ok())
        .or_else(|| config_level.map(str::to_owned))
        .unwrap_or_else(|| "info".to_owned());

    let filter = EnvFilter::try_new(level).context("parse log level")?;

    let file_layer = if dir_ok {
        tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::NEVER)
            .filename_prefix("chorus")
            .filename_suffix("log")
            .build(&paths.base_dir)
            .ok()
            .map(|file_appender| {
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(file_appender)
            })
    } else {
        None
    };

    if enable_stderr_logging {
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_writer(io::stderr);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(stderr_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();
    }

    Ok(())
}

async fn dispatch(command: Command, paths: &ChorusPaths, config: &ConfigFile) -> anyhow::Result<()> {
    match command {
        Command::Tui { projects } => run_tui(paths, config, projects).await,
        Command::Status => status(paths).await,
        Command::Ping => ping(paths).await,
        Command::Version => version(),
        Command::Completion { command } => completion(command),
    }
}

async fn run_tui(
    paths: &ChorusPaths,
    config: &ConfigFile,
    projects: Vec<String>,
) -> anyhow::Result<()> {
    let tui_config = config.effective_tui();
    let projects = if projects.is_empty() {
        tui_config.projects.clone()
    } else {
        projects
    };
    tracing::info!(projects = ?projects, "opening tui");
    tui::run(paths, projects, tui::Settings::from_config(&tui_config)).await
}

async fn ping(paths: &ChorusPaths) -> anyhow::Result<()> {
    let _ = client::ping(paths).await?;
    println!("ok");
    Ok(())
}

fn version() -> anyhow::Result<()> {
    println!("{}", env!("CARGO_PKG_VERSION"));
    Ok(())
}

async fn status(paths: &ChorusPaths) -> anyhow::Result<()> {
    let agents = client::agent_list(paths).await?.agents;
    if agents.is_empty() {
        println!("No agents");
        return Ok(());
    }

    let mut w = io::BufWriter::new(io::stdout());
    writeln!(&mut w, "ID\tPROJECT\tROLE\tSTATE\tBACKEND\tTASK")?;
    for a in agents {
        writeln!(
            &mut w,
            "{}\t{}\t{}\t{}\t{}\t{}",
            a.id,
            a.project,
            format_agent_role(a.role),
            format_agent_state(a.state),
            a.backend.as_deref().unwrap_or("-"),
            a.task.or(a.description).unwrap_or_default()
        )?;
    }
    w.flush()?;
    Ok(())
}

fn format_agent_role(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Coding => "coding",
        AgentRole::Planner => "planner",
        AgentRole::Manager => "manager",
    }
}

fn format_agent_state(state: AgentState) -> &'static str {
    match state {
        AgentState::Starting => "starting",
        AgentState::Running => "running",
        AgentState::Idle => "idle",
        AgentState::Done => "done",
        AgentState::Error => "error",
    }
}

fn completion(command: CompletionCommand) -> anyhow::Result<()> {
    let shell = match command {
        CompletionCommand::Bash => Shell::Bash,
        CompletionCommand::Fish => Shell::Fish,
        CompletionCommand::Powershell => Shell::PowerShell,
        CompletionCommand::Zsh => Shell::Zsh,
    };

    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    generate(shell, &mut cmd, "chorus", &mut buf);
    match io::stdout().write_all(&buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err).context("write completion script to stdout"),
    }
}

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use apiary::config::{SinkTarget, SshConfig};
use apiary::engine::{self, EngineOptions};

/// All-in-one low-interaction honeypot service.
#[derive(Parser, Debug)]
#[command(name = "apiary", version, about)]
struct Cli {
    /// Address the SSH honeypot listens on
    #[arg(short, long, default_value = ":2022")]
    bind: String,

    /// SSH version banner announced to clients
    #[arg(long, default_value = "SSH-2.0-Open")]
    banner: String,

    /// Maximum password attempts per connection
    #[arg(short = 'r', long, default_value_t = 3)]
    max_retry: u32,

    /// Authorized username; omit to record and reject every attempt
    #[arg(short, long)]
    username: Option<String>,

    /// Authorized password; omit to accept any password for the username
    #[arg(short = 'P', long)]
    password: Option<String>,

    /// Host-key algorithm to announce (repeatable; defaults to all supported)
    #[arg(long = "cipher", value_name = "ALGORITHM")]
    ciphers: Vec<String>,

    /// Home directory for host keys; `~` means the invoking user's home
    #[arg(long, default_value = "~")]
    homedir: String,

    /// Prompt shown in interactive shell sessions
    #[arg(long, default_value = "$ ")]
    prompt: String,

    /// Event sink URL: console://, file://PATH, sqlite://PATH (repeatable)
    #[arg(short, long = "sink", value_name = "URL", default_value = "console://")]
    sinks: Vec<String>,

    /// Bind address for the read-only monitor API
    #[arg(long, value_name = "ADDR")]
    monitor: Option<String>,

    /// Bind address for the fake login form
    #[arg(long, value_name = "ADDR")]
    form: Option<String>,

    /// Show verbose output (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Show no output
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let sinks = cli
        .sinks
        .iter()
        .map(|url| SinkTarget::parse(url))
        .collect::<Result<Vec<_>, _>>()?;

    let mut ssh = SshConfig {
        bind: cli.bind,
        banner: cli.banner,
        max_retry: cli.max_retry,
        username: cli.username,
        password: cli.password,
        homedir: cli.homedir,
        prompt: cli.prompt,
        ..Default::default()
    };
    if !cli.ciphers.is_empty() {
        ssh.ciphers = cli.ciphers;
    }

    let opts = EngineOptions {
        ssh,
        sinks,
        monitor_bind: cli.monitor,
        form_bind: cli.form,
    };

    let shutdown = CancellationToken::new();
    let force = CancellationToken::new();
    spawn_shutdown_signal(shutdown.clone(), force.clone());

    engine::run(opts, shutdown, force).await?;
    info!("honeypot stopped cleanly");
    Ok(())
}

/// Map the verbosity counter onto a tracing filter, the environment winning
/// when `RUST_LOG` is set.
fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "off"
    } else {
        match verbose {
            0 => "error",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// First SIGINT/SIGTERM starts a graceful drain; the second force-closes
/// in-flight sessions.
fn spawn_shutdown_signal(shutdown: CancellationToken, force: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received, draining");
        shutdown.cancel();

        wait_for_signal().await;
        warn!("second signal received, force closing");
        force.cancel();
    });
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

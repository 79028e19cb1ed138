//! Srot: session and task gating controller
//!
//! Logs the user in against the remote authority, checks each task id, runs the
//! countdown and hands off to the recorder.

use clap::Parser;
use srot::config::{self, Config};
use srot::console;
use srot::controller::SessionController;
use srot::launcher::ProcessLauncher;
use srot::remote::RemoteAuthority;
use srot::store::{FileSessionStore, SessionStore};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// How long to wait for a pending stdin read when shutting down
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "srot", about = "Srot session and task gating controller")]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Countdown length in seconds
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    countdown: Option<u32>,

    /// Recorder program or script
    #[arg(long)]
    recorder: Option<PathBuf>,

    /// Interpreter used to run the recorder script
    #[arg(long)]
    interpreter: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Show the saved session
    Status,
    /// Forget the saved session
    Logout,
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand)]
enum ConfigAction {
    /// Write the default config file
    Init,
    /// Print the config file location
    Path,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_env("SROT_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

impl Cli {
    fn load_config(&self) -> Config {
        let mut config = match &self.config {
            Some(path) => config::load_config_from(path),
            None => config::load_config(),
        };
        if let Some(secs) = self.countdown {
            config.countdown_secs = secs;
        }
        if let Some(program) = &self.recorder {
            config.recorder.program = program.clone();
        }
        if let Some(interpreter) = &self.interpreter {
            config.recorder.interpreter = Some(interpreter.clone());
        }
        config
    }
}

fn run_config_action(cli: &Cli, action: &ConfigAction) {
    let path = cli.config.clone().or_else(config::config_path);
    match action {
        ConfigAction::Path => match path {
            Some(p) => println!("{}", p.display()),
            None => println!("No config directory available"),
        },
        ConfigAction::Init => {
            let Some(path) = path else {
                error!("No config directory available");
                return;
            };
            match config::save_config_to(&Config::default(), &path) {
                Ok(()) => println!("Wrote {}", path.display()),
                Err(e) => error!("Failed to write {}: {}", path.display(), e),
            }
        }
    }
}

async fn run_interactive(config: Config, store: FileSessionStore) {
    let authority = match RemoteAuthority::from_config(&config) {
        Ok(a) => a,
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            return;
        }
    };
    let launcher = ProcessLauncher::from_config(&config.recorder);

    let (controller, handle) = SessionController::new(
        authority.clone(),
        authority,
        store,
        launcher,
        config.countdown_secs,
    );
    let controller = tokio::spawn(controller.run());

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    if let Err(e) = console::run(stdin, tokio::io::stdout(), handle).await {
        warn!("console error: {}", e);
    }
    if let Err(e) = controller.await {
        warn!("controller task failed: {}", e);
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(Command::Config { action }) = &cli.command {
        run_config_action(&cli, action);
        return;
    }

    let store = match FileSessionStore::open_default() {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };

    match &cli.command {
        Some(Command::Status) => {
            match store.load() {
                Some(s) => println!("Logged in as {} ({})", s.display_name, s.user_id),
                None => println!("Not logged in"),
            }
            return;
        }
        Some(Command::Logout) => {
            match store.clear() {
                Ok(()) => println!("Logged out"),
                Err(e) => error!("Failed to clear session: {}", e),
            }
            return;
        }
        Some(Command::Config { .. }) | None => {}
    }

    let config = cli.load_config();
    info!(
        identity_url = %config.identity_url,
        assignment_url = %config.assignment_url,
        recorder = %config.recorder.program.display(),
        "starting"
    );

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    rt.block_on(run_interactive(config, store));
    rt.shutdown_timeout(SHUTDOWN_GRACE);
}

// Veto client entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Open the credential store
// 4. Build the authority client
// 5. Dispatch the subcommand (watch spawns the view loop and reads stdin)

use std::io::BufRead;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use veto_app::authority::{HttpAuthority, JoinTeam, MatchAuthority};
use veto_app::config::{self, Config};
use veto_app::join::{join_match, Route};
use veto_app::protocol::UserCommand;
use veto_app::view::{self, ViewConfig};
use veto_cli::render;
use veto_cli::watch::{self, Outcome};
use veto_core::credentials::{CredentialStore, SqliteStore};
use veto_core::model::SeriesType;

#[derive(Parser, Debug)]
#[command(author, version, about = "Two-team map veto client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new match and print its id.
    Create {
        team_a: String,
        team_b: String,
        #[arg(long, value_enum, default_value = "bo1")]
        series: Series,
    },
    /// Join a match as captain of team 0 or 1, or as spectator.
    Join { match_id: String, team: JoinTeam },
    /// Watch a match live and act on it if you hold a captain credential.
    Watch {
        match_id: String,
        /// Team index the credential was stored under.
        #[arg(long)]
        team: Option<String>,
    },
    /// Print the result of a match.
    Summary { match_id: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Series {
    Bo1,
    Bo3,
}

impl From<Series> for SeriesType {
    fn from(series: Series) -> Self {
        match series {
            Series::Bo1 => SeriesType::Bo1,
            Series::Bo3 => SeriesType::Bo3,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 1. Initialize tracing (log to file, not terminal)
    init_tracing()?;
    info!("Veto client starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: authority={}, ws={}",
        config.authority.base_url, config.sync.ws_url
    );

    // 3. Open the credential store
    let credentials = CredentialStore::new(open_store(&config)?);

    // 4. Build the authority client
    let authority: Arc<dyn MatchAuthority> =
        Arc::new(HttpAuthority::from_config(&config.authority));

    // 5. Dispatch
    match cli.command {
        Command::Create {
            team_a,
            team_b,
            series,
        } => {
            let created = authority
                .create(&team_a, &team_b, series.into())
                .await
                .context("failed to create match")?;
            info!("Created match {}", created.match_id);
            println!("{}", created.match_id);
        }
        Command::Join { match_id, team } => {
            let route = join_match(authority.as_ref(), &credentials, &match_id, team)
                .await
                .with_context(|| format!("failed to join match {match_id}"))?;
            match route {
                Route::Captain { match_id, team } => {
                    println!("joined {match_id} as captain of team {team}");
                    println!("next: veto watch {match_id} --team {team}");
                }
                Route::Spectator { match_id } => {
                    println!("joined {match_id} as spectator");
                    println!("next: veto watch {match_id}");
                }
            }
        }
        Command::Watch { match_id, team } => {
            let view_config = ViewConfig::from_config(&config);
            run_watch(authority, credentials, view_config, match_id, team).await?;
        }
        Command::Summary { match_id } => {
            let state = authority
                .get_state(&match_id)
                .await
                .with_context(|| format!("failed to load match {match_id}"))?;
            println!("{}", render::render_summary(&state));
        }
    }

    info!("Veto client shut down cleanly");
    Ok(())
}

async fn run_watch(
    authority: Arc<dyn MatchAuthority>,
    credentials: CredentialStore<SqliteStore>,
    view_config: ViewConfig,
    match_id: String,
    team: Option<String>,
) -> anyhow::Result<()> {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    let view_handle = tokio::spawn(async move {
        if let Err(e) = view::run(authority, credentials, view_config, cmd_rx, ui_tx).await {
            error!("Match view loop error: {}", e);
        }
    });

    cmd_tx
        .send(UserCommand::Navigate { match_id, team })
        .await
        .context("match view loop exited before navigation")?;
    println!("{}", veto_cli::input::HELP);

    let lines = spawn_stdin_reader();
    let outcome = watch::run(lines, std::io::stdout(), ui_rx, cmd_tx.clone()).await?;
    match &outcome {
        Outcome::NavigatedHome => warn!("Watch ended: match could not be loaded"),
        other => info!("Watch ended: {:?}", other),
    }

    // Stop the view loop (it may already be gone) and wait briefly for it.
    let _ = cmd_tx.send(UserCommand::Quit).await;
    drop(cmd_tx);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), view_handle).await;

    if outcome == Outcome::NavigatedHome {
        anyhow::bail!("failed to load match");
    }
    Ok(())
}

/// Forward stdin lines from a detached thread. The channel closes at EOF.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Open the SQLite credential store at the configured path, creating its
/// directory. Falls back to an in-memory store without a home directory.
fn open_store(config: &Config) -> anyhow::Result<SqliteStore> {
    let Some(path) = config.storage.resolved_db_path() else {
        warn!("No data directory available, credentials will not persist");
        return SqliteStore::open(":memory:").context("failed to open in-memory store");
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let path_str = path
        .to_str()
        .with_context(|| format!("non UTF-8 database path {}", path.display()))?;
    let store = SqliteStore::open(path_str).context("failed to open credential store")?;
    info!("Credential store opened at {}", path.display());
    Ok(store)
}

/// Initialize tracing to log to a file (not the terminal, which is used by the watch view).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("veto.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("veto=info,veto_app=info,veto_core=info,veto_cli=info,warn")
        }))
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}

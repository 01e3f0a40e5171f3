mod action;
mod app;
mod app_state;
mod component;
mod components;
mod core;
mod logging;
mod mpv;
mod plugin;
mod plugins;
mod search;
mod stream_proxy;
mod theme;
mod widgets;
mod window;

use std::io::BufRead;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, mpsc};

use radiola_core::config::Config;
use radiola_core::platform;
use radiola_core::secrets::SecretService;
use radiola_core::settings::SettingsStore;
use radiola_core::state::{self, StateManager};

use crate::core::{CoreEvent, MpvOutput, PlayerCore};
use crate::plugin::{PluginContext, PluginManager};
use crate::search::DirectoryClient;
use crate::stream_proxy::{Account, StreamProxy};
use crate::window::{Window, WindowEvent};

#[derive(Parser)]
#[command(name = "radiola", version, about = "Internet radio in the terminal")]
struct Cli {
    /// More log output (-v debug, -vv trace).  RUST_LOG wins.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the account used for stations that need a login.
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Store credentials; the password is read from stdin.
    Login {
        #[arg(long)]
        email: String,
    },
    /// Forget the stored password.
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = Config::config_path();

    if let Some(Commands::Account { action }) = cli.command {
        let store = SettingsStore::load(&config_path)?;
        return run_account(action, &store).await;
    }

    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("radiola.log");

    // ── Window events (core/plugins → UI and plugins) ────────────────────────
    let (events_tx, _) = broadcast::channel::<WindowEvent>(1024);

    let journal = logging::init(&log_path, cli.verbose, events_tx.clone())?;
    eprintln!("radiola log: {}", log_path.display());
    tracing::info!("radiola starting…");

    // ── Load config ──────────────────────────────────────────────────────────
    let store = SettingsStore::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let config = store.config();

    let stations_path = config.stations.stations_toml.clone();
    let stations = if stations_path.exists() {
        state::load_stations_from_toml(&stations_path).unwrap_or_else(|e| {
            tracing::warn!("{}: {}; using built-in stations", stations_path.display(), e);
            state::default_stations()
        })
    } else {
        state::default_stations()
    };
    let state_manager = Arc::new(StateManager::new(
        config.player.state_file.clone(),
        &config.player.ratings_file,
        stations,
    ));

    // ── Stream relay ─────────────────────────────────────────────────────────
    let account = Some(config.account.email.clone())
        .filter(|email| !email.is_empty())
        .map(|email| Account {
            email,
            secrets: SecretService::new(),
        });
    let relay = match StreamProxy::start(
        state_manager.clone(),
        config.network.stream_proxy(),
        account,
    )
    .await
    {
        Ok(relay) => Some(relay),
        Err(e) => {
            tracing::error!("stream relay unavailable, playing stations directly: {}", e);
            None
        }
    };

    // ── Playback core ────────────────────────────────────────────────────────
    let (core_tx, core_rx) = mpsc::channel::<CoreEvent>(1024);
    let volume = state_manager.get_state().await.volume;
    let output = MpvOutput::new(core_tx.clone(), state_manager.clone(), events_tx.clone(), volume);
    let player_core = PlayerCore::new(
        state_manager.clone(),
        events_tx.clone(),
        Box::new(output),
        relay,
        stations_path,
    );
    let loop_tx = core_tx.clone();
    let core_task = tokio::spawn(async move {
        if let Err(e) = player_core.run(loop_tx, core_rx).await {
            tracing::error!("PlayerCore exited with error: {}", e);
        }
    });

    // ── Window mediator and plugins ──────────────────────────────────────────
    let (ui_tx, ui_rx) = mpsc::channel(64);
    let window = Window::new(state_manager.clone(), events_tx.clone(), core_tx.clone(), ui_tx);

    let mut plugins = PluginManager::new(
        PluginContext {
            window: window.clone(),
            journal,
            api_proxy: config.network.api_proxy().map(str::to_string),
        },
        store.clone(),
    );
    plugins.load_plugins().await;

    let directory = match DirectoryClient::new(
        &config.search.api_base,
        config.search.limit,
        config.network.api_proxy(),
    ) {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!("station search disabled: {}", e);
            None
        }
    };

    // ── Run UI ───────────────────────────────────────────────────────────────
    let mut app = app::App::new(window, plugins, directory, ui_rx);
    let result = app.run().await;

    let mut plugins = app.into_plugins();
    plugins.shutdown().await;
    let _ = core_tx.send(CoreEvent::Shutdown).await;
    if let Err(e) = core_task.await {
        tracing::warn!("playback core task failed: {}", e);
    }
    tracing::info!("radiola stopped");
    result
}

async fn run_account(action: AccountAction, store: &SettingsStore) -> anyhow::Result<()> {
    let secrets = SecretService::new();
    let previous = store.config().account.email;
    match action {
        AccountAction::Login { email } => {
            eprintln!("password for {}:", email);
            let mut password = String::new();
            std::io::stdin().lock().read_line(&mut password)?;
            let password = password.trim_end_matches(['\r', '\n']).to_string();

            let changed = secrets
                .set_account_password_async(&email, &password, Some(&previous))
                .await?;
            store.update(|config| config.account.email = email.clone())?;
            if changed {
                println!("stored credentials for {}", email);
            } else {
                println!("credentials for {} unchanged", email);
            }
        }
        AccountAction::Logout => {
            if previous.is_empty() {
                println!("no account configured");
                return Ok(());
            }
            secrets.clear_account_password_async(&previous).await?;
            store.update(|config| config.account.email.clear())?;
            println!("signed out {}", previous);
        }
    }
    Ok(())
}

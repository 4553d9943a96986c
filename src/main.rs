use account_lifecycle::config::LifecycleConfig;
use account_lifecycle::lifecycle::Lifecycle;
use account_lifecycle::stores::memory::{MemoryDocumentStore, MemoryIdentityStore, MemoryObjectStore};
use account_lifecycle::stores::IdentityEvent;
use account_lifecycle::{logging, schedule, FirebaseApp};
use anyhow::{anyhow, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{info, warn};

const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

#[derive(Parser, Debug)]
#[command(name = "account-lifecycle", version, about = "Anonymous account lifecycle reconciler")]
struct Cli {
    /// Sweep and layout configuration (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Service account key; falls back to $GOOGLE_APPLICATION_CREDENTIALS.
    #[arg(long, global = true)]
    key: Option<PathBuf>,

    /// Log filter directive, e.g. `info` or `account_lifecycle=debug`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Run against empty in-memory stores instead of Firebase.
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run all configured sweeps on their intervals until interrupted.
    Serve,
    /// Run stale anonymous sweeps once.
    SweepAnonymous {
        /// Only run the sweep with this name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Run asset retention sweeps once.
    SweepAssets {
        #[arg(long)]
        name: Option<String>,
    },
    /// Handle an identity-created event.
    OnCreated {
        uid: String,
        /// Number of linked sign-in providers; zero means anonymous.
        #[arg(long, default_value_t = 0)]
        providers: usize,
    },
    /// Handle an identity-deleted event.
    OnDeleted { uid: String },
    /// Handle a provider being linked to an anonymous identity.
    OnUpgraded { uid: String },
    /// Record client activity for a uid.
    Touch { uid: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref())?;

    let config = LifecycleConfig::load(cli.config.as_deref())?;
    let (lifecycle, mut events) = build_lifecycle(&cli, &config).await?;

    match cli.command {
        Command::Serve => {
            if let Some(events) = events.take() {
                tokio::spawn(schedule::dispatch_events(lifecycle.clone(), events));
            }
            schedule::run(lifecycle.clone(), &config, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
            })
            .await;
        }
        Command::SweepAnonymous { name } => {
            let sweeps = match name {
                Some(name) => vec![config
                    .stale_sweep(&name)
                    .cloned()
                    .ok_or_else(|| anyhow!("no stale sweep named {:?}", name))?],
                None => config.stale_sweeps.clone(),
            };
            for sweep in &sweeps {
                let report = lifecycle.sweep_stale_anonymous(sweep, Utc::now()).await?;
                println!("{}: {:?}", sweep.name, report);
            }
        }
        Command::SweepAssets { name } => {
            let sweeps = match name {
                Some(name) => vec![config
                    .asset_sweep(&name)
                    .cloned()
                    .ok_or_else(|| anyhow!("no asset sweep named {:?}", name))?],
                None => config.asset_sweeps.clone(),
            };
            for sweep in &sweeps {
                let report = lifecycle.sweep_assets(sweep, Utc::now()).await?;
                println!("{}: {:?}", sweep.name, report);
            }
        }
        Command::OnCreated { uid, providers } => {
            let outcome = lifecycle.on_identity_created(&uid, providers, Utc::now()).await;
            println!("{:?}", outcome);
        }
        Command::OnDeleted { uid } => {
            let report = lifecycle.on_identity_deleted(&uid).await;
            println!("{:?}", report);
        }
        Command::OnUpgraded { uid } => {
            lifecycle.on_identity_upgraded(&uid).await;
        }
        Command::Touch { uid } => {
            lifecycle.record_activity(&uid, Utc::now()).await;
        }
    }

    // One-shot commands can raise identity events in memory mode; handle them
    // before exiting so their cascades show up in the output.
    if let Some(events) = events.as_mut() {
        let handled = schedule::drain_events(&lifecycle, events).await;
        info!(handled, "dispatched queued identity events");
    }

    Ok(())
}

/// Builds the handlers. In memory mode the identity event queue is returned
/// too; Firebase delivers those events through its own triggers.
async fn build_lifecycle(
    cli: &Cli,
    config: &LifecycleConfig,
) -> anyhow::Result<(Arc<Lifecycle>, Option<UnboundedReceiver<IdentityEvent>>)> {
    if cli.in_memory {
        info!("using in-memory stores");
        let (tx, rx) = unbounded_channel();
        let lifecycle = Arc::new(Lifecycle::new(
            Arc::new(MemoryIdentityStore::with_events(tx)),
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(MemoryObjectStore::new()),
            config,
        ));
        return Ok((lifecycle, Some(rx)));
    }

    let key_path = match &cli.key {
        Some(path) => path.clone(),
        None => std::env::var_os(CREDENTIALS_ENV)
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("no --key given and {} is not set", CREDENTIALS_ENV))?,
    };
    let key = yup_oauth2::read_service_account_key(&key_path)
        .await
        .with_context(|| format!("failed to read service account key {}", key_path.display()))?;

    let app = FirebaseApp::new(key);
    info!(project = app.project_id().unwrap_or("<unknown>"), "using firebase project");
    Ok((Arc::new(app.lifecycle(config)), None))
}

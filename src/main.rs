//! # Tavern: campaign bot for multi-tenant chat communities
//!
//! Runs the plugin kernel and the campaign watchdog side by side.
//!
//! Usage:
//!   tavern                                   # Run with ~/.tavern/config.toml
//!   tavern --config ./tavern.toml run        # Custom config
//!   tavern run --events-from-stdin           # Feed NDJSON platform events
//!   tavern create --tenant 1 --title "Art Jam" --number 3 --open 2026-11-01T18:00:00Z
//!   tavern request <campaign-id> announcing  # Queue administrative work
//!   tavern configure --tenant 1 --parent-category 42 --detect-bot
//!   tavern modules                           # List built-in modules
//!   tavern init-config                       # Write a default config

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tavern_channels::DiscordOps;
use tavern_core::traits::{ActionLog, PlatformOps, TracingActionLog, WorkflowStore};
use tavern_core::types::{TenantSettings, Workflow, WorkflowStatus};
use tavern_core::{PlatformEvent, TavernConfig};
use tavern_kernel::{EventDispatcher, ModuleRegistry, PluginContext};
use tavern_scheduler::{MemoryStore, SqliteStore, WorkflowOrchestrator};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tavern",
    version,
    about = "🍺 Tavern — plugin kernel and campaign watchdog for chat communities"
)]
struct Cli {
    /// Config file (default: ~/.tavern/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep all state in memory (nothing survives a restart)
    #[arg(long)]
    in_memory: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run modules and the orchestrator until Ctrl-C
    Run {
        /// Read platform events as JSON lines from stdin and dispatch them
        #[arg(long)]
        events_from_stdin: bool,
    },
    /// Schedule a new campaign
    Create {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        number: u32,
        #[arg(long, default_value = "")]
        description: String,
        /// When submissions open (RFC 3339)
        #[arg(long)]
        open: Option<DateTime<Utc>>,
        /// When voting starts (RFC 3339)
        #[arg(long)]
        vote: Option<DateTime<Utc>>,
        /// When the campaign ends (RFC 3339)
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },
    /// Queue creating_channel, announcing or archiving for a campaign
    Request {
        campaign_id: String,
        state: WorkflowStatus,
    },
    /// Set a tenant's channels, categories and voting marker
    Configure(SettingsArgs),
    /// List campaigns that are not archived
    List {
        #[arg(long)]
        tenant: Option<String>,
    },
    /// List built-in modules
    Modules,
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Tenant settings to change. Fields left out keep their saved value.
#[derive(Args, Debug, Default)]
struct SettingsArgs {
    #[arg(long)]
    tenant: String,
    /// Channel submissions and votes happen in
    #[arg(long)]
    working_channel: Option<String>,
    /// Category new campaign channels are created under
    #[arg(long)]
    parent_category: Option<String>,
    /// Category finished campaign channels are moved into
    #[arg(long)]
    archive_category: Option<String>,
    #[arg(long)]
    announcement_channel: Option<String>,
    /// Role mentioned in announcements
    #[arg(long)]
    notify_role: Option<String>,
    /// Reaction that counts as a vote
    #[arg(long)]
    marker: Option<String>,
    /// The bot's own user id
    #[arg(long, conflicts_with = "detect_bot")]
    bot_user: Option<String>,
    /// Ask Discord for the bot's user id
    #[arg(long)]
    detect_bot: bool,
}

impl SettingsArgs {
    fn apply(&self, settings: &mut TenantSettings) {
        let fields = [
            (&self.working_channel, &mut settings.working_channel_id),
            (&self.parent_category, &mut settings.parent_category_id),
            (&self.archive_category, &mut settings.archive_category_id),
            (&self.announcement_channel, &mut settings.announcement_channel_id),
            (&self.notify_role, &mut settings.notify_role_id),
            (&self.bot_user, &mut settings.bot_user_id),
        ];
        for (value, field) in fields {
            if let Some(value) = value {
                *field = Some(value.clone());
            }
        }
        if let Some(marker) = &self.marker {
            settings.voting_marker = marker.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let config_path = cli.config.clone().unwrap_or_else(TavernConfig::default_path);
    let mut config = if config_path.exists() {
        TavernConfig::load_from(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        TavernConfig::default()
    };
    if cli.in_memory {
        config.store.in_memory = true;
    }

    match cli.command.unwrap_or(Command::Run { events_from_stdin: false }) {
        Command::Run { events_from_stdin } => run(config, events_from_stdin).await,
        Command::Create { tenant, title, number, description, open, vote, end } => {
            let (store, _) = open_store(&config)?;
            let mut workflow = Workflow::new(&tenant, &title, number).with_schedule(open, vote, end);
            workflow.description = description;
            store.insert_workflow(&workflow).await?;
            println!("✅ Campaign {} created for tenant {}", workflow.id, tenant);
            Ok(())
        }
        Command::Request { campaign_id, state } => {
            let (store, action_log) = open_store(&config)?;
            let platform: Arc<dyn PlatformOps> = Arc::new(DiscordOps::new(&config.discord)?);
            let orchestrator =
                WorkflowOrchestrator::new(store, platform, action_log, config.orchestrator.clone());
            orchestrator.request(&campaign_id, state).await?;
            println!("✅ Campaign {campaign_id} queued for {state}");
            Ok(())
        }
        Command::Configure(args) => {
            let (store, _) = open_store(&config)?;
            let mut settings = store.tenant_settings(&args.tenant).await?;
            args.apply(&mut settings);
            if args.detect_bot {
                let bot = DiscordOps::new(&config.discord)?
                    .current_user_id()
                    .await
                    .context("looking up the bot user")?;
                settings.bot_user_id = Some(bot);
            }
            store.save_tenant_settings(&settings).await?;
            println!("✅ Settings saved for tenant {}", settings.tenant_id);
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Command::List { tenant } => {
            let (store, _) = open_store(&config)?;
            let workflows = store.list_non_terminal_workflows(tenant.as_deref()).await?;
            if workflows.is_empty() {
                println!("No campaigns.");
            }
            for w in workflows {
                println!("{}  {:<16} {:<10} {} #{}", w.id, w.status, w.tenant_id, w.title, w.number);
            }
            Ok(())
        }
        Command::Modules => {
            for module in tavern_modules::builtin_modules() {
                let enabled = module.enabled_by_default || config.modules.enabled.contains(&module.id);
                let enabled = enabled && !config.modules.disabled.contains(&module.id);
                println!(
                    "{} {} v{}: {}",
                    if enabled { "🟢" } else { "⚪" },
                    module.id,
                    module.version,
                    module.description
                );
            }
            Ok(())
        }
        Command::InitConfig { force } => {
            if config_path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", config_path.display());
            }
            TavernConfig::default().save_to(&config_path)?;
            println!("✅ Wrote {}", config_path.display());
            Ok(())
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        "info,tavern=debug,tavern_core=debug,tavern_kernel=debug,tavern_scheduler=debug,tavern_modules=debug,tavern_channels=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

fn open_store(config: &TavernConfig) -> Result<(Arc<dyn WorkflowStore>, Arc<dyn ActionLog>)> {
    if config.store.in_memory {
        tracing::warn!("⚠️ Using in-memory store, state is lost on exit");
        return Ok((Arc::new(MemoryStore::new()), Arc::new(TracingActionLog)));
    }
    let path = PathBuf::from(shellexpand::tilde(&config.store.path).to_string());
    let store = Arc::new(
        SqliteStore::open(&path).with_context(|| format!("opening {}", path.display()))?,
    );
    tracing::info!("💾 Store: {}", path.display());
    Ok((store.clone(), store))
}

async fn run(config: TavernConfig, events_from_stdin: bool) -> Result<()> {
    let (store, action_log) = open_store(&config)?;
    let platform: Arc<dyn PlatformOps> = Arc::new(DiscordOps::new(&config.discord)?);

    let context = PluginContext::new(store.clone(), platform.clone(), action_log.clone());
    let registry = Arc::new(ModuleRegistry::new(context));
    for module in tavern_modules::builtin_modules() {
        registry.register(module).await?;
    }
    for id in &config.modules.disabled {
        if registry.is_enabled(id).await
            && let Err(e) = registry.disable(id).await
        {
            tracing::error!("❌ Failed to disable module {id}: {e}");
        }
    }
    for id in &config.modules.enabled {
        if config.modules.disabled.contains(id) || registry.is_enabled(id).await {
            continue;
        }
        if let Err(e) = registry.enable(id).await {
            tracing::error!("❌ Failed to enable module {id}: {e}");
        }
    }
    tracing::info!(
        "🧩 Modules: {} registered, {} enabled",
        registry.count().await,
        registry.get_enabled().await.len()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let orchestrator = Arc::new(WorkflowOrchestrator::new(
        store,
        platform,
        action_log,
        config.orchestrator.clone(),
    ));
    let watchdog = orchestrator.spawn(shutdown_rx);

    let dispatcher = EventDispatcher::new(registry.clone());
    if events_from_stdin {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match serde_json::from_str::<PlatformEvent>(&line) {
                        Ok(event) => {
                            let dispatcher = dispatcher.clone();
                            tokio::spawn(async move { dispatcher.dispatch(event).await });
                        }
                        Err(e) => tracing::warn!("⚠️ Skipping malformed event: {e}"),
                    },
                    Ok(None) => {
                        tracing::info!("📭 Event stream closed, waiting for Ctrl-C");
                        tokio::signal::ctrl_c().await?;
                        break;
                    }
                    Err(e) => {
                        tracing::error!("❌ Event stream failed: {e}");
                        tokio::signal::ctrl_c().await?;
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }
    } else {
        tokio::signal::ctrl_c().await?;
    }

    tracing::info!("🛑 Shutting down");
    let _ = shutdown_tx.send(true);
    if let Err(e) = watchdog.await {
        tracing::error!("❌ Orchestrator task ended abnormally: {e}");
    }
    let failures = registry.shutdown_all().await;
    if failures > 0 {
        tracing::warn!("⚠️ {failures} module(s) failed to shut down cleanly");
    }
    Ok(())
}

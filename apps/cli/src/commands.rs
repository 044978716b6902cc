//! CLI command definitions, routing, and tracing setup.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use netwiki_confluence::{ConfluenceStore, MemoryPageStore};
use netwiki_core::{UpdateOrchestrator, UpdateReport, load_registry, page_title};
use netwiki_shared::{
    AppConfig, ConfluenceSettings, FieldKind, FieldMapping, WebhookPayload, WebhookSettings,
    config_file_path, init_config_at, load_config, load_config_from,
};
use netwiki_storage::Storage;
use netwiki_webhook::{WebhookState, router, serve};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// NetWiki: mirror NetBox field values into Confluence pages.
#[derive(Parser)]
#[command(
    name = "netwiki",
    version,
    about = "Mirror NetBox field values into Confluence pages.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.netwiki/netwiki.toml).
    #[arg(long, global = true, env = "NETWIKI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the webhook server NetBox posts change notifications to.
    Serve {
        /// Listen address (overrides `webhook.bind`).
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Apply one webhook payload from a JSON file.
    Apply {
        /// Path to the payload file.
        payload: PathBuf,

        /// Patch an empty in-memory page and print it instead of pushing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage stored field mappings.
    Fields {
        #[command(subcommand)]
        action: FieldsAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Field mapping subcommands.
#[derive(Subcommand)]
pub(crate) enum FieldsAction {
    /// Start synchronizing a field for a model.
    Add {
        /// NetBox model name (e.g. `site`).
        model: String,
        /// Field name as sent by NetBox.
        field: String,
        /// Extraction policy: text, label, or scalar.
        #[arg(long)]
        kind: FieldKind,
        /// The field lives under `custom_fields`.
        #[arg(long)]
        custom: bool,
    },
    /// List configured and stored mappings.
    List {
        /// Only show mappings for this model.
        #[arg(long)]
        model: Option<String>,
    },
    /// Stop synchronizing a stored field.
    Remove {
        model: String,
        field: String,
        #[arg(long)]
        custom: bool,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "netwiki=info",
        1 => "netwiki=debug",
        _ => "netwiki=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Serve { bind } => cmd_serve(config_path, bind).await,
        Command::Apply { payload, dry_run } => cmd_apply(config_path, &payload, dry_run).await,
        Command::Fields { action } => match action {
            FieldsAction::Add {
                model,
                field,
                kind,
                custom,
            } => {
                let mapping = FieldMapping {
                    model,
                    field,
                    kind,
                    custom,
                };
                cmd_fields_add(config_path, &mapping).await
            }
            FieldsAction::List { model } => cmd_fields_list(config_path, model.as_deref()).await,
            FieldsAction::Remove {
                model,
                field,
                custom,
            } => cmd_fields_remove(config_path, &model, &field, custom).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// serve / apply
// ---------------------------------------------------------------------------

async fn cmd_serve(config_path: Option<&Path>, bind: Option<SocketAddr>) -> Result<()> {
    let config = load(config_path)?;
    let mut webhook = WebhookSettings::resolve(&config)?;
    if let Some(bind) = bind {
        webhook.bind = bind;
    }
    let confluence = ConfluenceSettings::resolve(&config)?;

    let registry = load_registry(&config).await?;
    if registry.is_empty() {
        tracing::warn!("no field mappings configured; triggers will not change any page");
    }
    let store = ConfluenceStore::connect(confluence).await?;
    let orchestrator = Arc::new(UpdateOrchestrator::new(registry, store));

    let listener = tokio::net::TcpListener::bind(webhook.bind)
        .await
        .wrap_err_with(|| format!("failed to bind {}", webhook.bind))?;
    let app = router(WebhookState::new(orchestrator, &webhook));

    serve(listener, app, shutdown_signal())
        .await
        .wrap_err("webhook server error")?;
    info!("webhook server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn cmd_apply(config_path: Option<&Path>, payload_path: &Path, dry_run: bool) -> Result<()> {
    let config = load(config_path)?;
    let raw = std::fs::read(payload_path)
        .wrap_err_with(|| format!("failed to read {}", payload_path.display()))?;
    let payload = WebhookPayload::from_slice(&raw)?;
    let registry = load_registry(&config).await?;

    info!(model = %payload.model, dry_run, "applying payload");

    if dry_run {
        let orchestrator = UpdateOrchestrator::new(registry, MemoryPageStore::new());
        let report = orchestrator.apply_update(&payload).await?;
        print_report(&report, true);
        if let Some(page) = orchestrator.store().page(&page_title(&payload.model)) {
            println!("{}", page.body);
        }
        return Ok(());
    }

    let store = ConfluenceStore::connect(ConfluenceSettings::resolve(&config)?).await?;
    let report = UpdateOrchestrator::new(registry, store)
        .apply_update(&payload)
        .await?;
    print_report(&report, false);
    Ok(())
}

fn print_report(report: &UpdateReport, dry_run: bool) {
    println!();
    if report.pushed {
        println!("  Page {}!", if dry_run { "patched (dry run)" } else { "updated" });
    } else {
        println!("  No fields configured for this model; nothing to do.");
    }
    println!("  Page:    {}", report.page_title);
    if let Some(id) = &report.page_id {
        println!("  ID:      {id}");
    }
    println!("  Created: {}", join_or_dash(&report.created));
    println!("  Updated: {}", join_or_dash(&report.updated));
    println!();
}

fn join_or_dash(names: &[String]) -> String {
    if names.is_empty() {
        "-".into()
    } else {
        names.join(", ")
    }
}

// ---------------------------------------------------------------------------
// fields
// ---------------------------------------------------------------------------

async fn cmd_fields_add(config_path: Option<&Path>, mapping: &FieldMapping) -> Result<()> {
    let config = load(config_path)?;
    if config.fields.contains(mapping) {
        return Err(eyre!(
            "{mapping} is already configured in the config file"
        ));
    }

    let storage = Storage::open(&config.storage.database_path()?).await?;
    let id = storage.insert_mapping(mapping).await?;
    println!("Added mapping #{id}: {mapping}");
    Ok(())
}

async fn cmd_fields_list(config_path: Option<&Path>, model: Option<&str>) -> Result<()> {
    let config = load(config_path)?;
    let wanted = |m: &FieldMapping| model.is_none_or(|model| m.model == model);

    let configured: Vec<&FieldMapping> = config.fields.iter().filter(|m| wanted(*m)).collect();
    let db_path = config.storage.database_path()?;
    let stored = if db_path.exists() {
        Storage::open_readonly(&db_path)
            .await?
            .list_mappings(model)
            .await?
    } else {
        Vec::new()
    };

    if configured.is_empty() && stored.is_empty() {
        println!("No field mappings.");
        return Ok(());
    }

    for mapping in configured {
        println!("  config  {mapping}");
    }
    for row in &stored {
        println!("  #{:<5} {}  (added {})", row.id, row.mapping, row.created_at);
    }
    Ok(())
}

async fn cmd_fields_remove(
    config_path: Option<&Path>,
    model: &str,
    field: &str,
    custom: bool,
) -> Result<()> {
    let config = load(config_path)?;
    let storage = Storage::open(&config.storage.database_path()?).await?;
    if !storage.delete_mapping(model, field, custom).await? {
        return Err(eyre!(
            "no stored mapping for {model} > {field} (custom: {custom})"
        ));
    }
    println!("Removed mapping {model} > {field}");
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    init_config_at(&path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

//! liveryhub - livery manager for MSFS 2020/2024
//!
//! Command-line frontend over the install pipeline: browse the catalog,
//! install/uninstall liveries and reconcile updates.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use liveryhub::api::{ApiClient, HttpClient};
use liveryhub::installer::Installer;
use liveryhub::ledger::Ledger;
use liveryhub::model::{CatalogLivery, Resolution, Simulator};
use liveryhub::progress::ProgressEvent;
use liveryhub::settings::Settings;
use liveryhub::updates;
use liveryhub::versions::VersionStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "liveryhub")]
#[command(version)]
#[command(about = "Livery manager for MSFS 2020/2024")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Catalog backend base URL
    #[arg(long, global = true, default_value = "https://api.liveryhub.io/v1")]
    api: String,

    /// Session token for the catalog backend
    #[arg(long, global = true, env = "LIVERYHUB_TOKEN", default_value = "")]
    token: String,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List installed liveries
    List,

    /// Browse the remote catalog
    Catalog,

    /// Download and install a livery from the catalog
    Install {
        /// Livery name as shown in the catalog
        name: String,

        /// Texture resolution (4K or 8K)
        #[arg(short, long)]
        resolution: Option<Resolution>,

        /// Target simulator (FS20 or FS24)
        #[arg(short, long)]
        simulator: Option<Simulator>,
    },

    /// Remove an installed livery by its install path
    Uninstall {
        /// Install path as shown by `list`
        path: PathBuf,
    },

    /// Check installed liveries for available updates
    Updates,

    /// Update one installed livery to the catalog's current build
    Update {
        /// Livery name as shown by `list`
        name: String,
    },

    /// Show or change settings
    Settings {
        /// MSFS 2020 Community folder
        #[arg(long)]
        msfs2020_path: Option<String>,

        /// MSFS 2024 Community folder
        #[arg(long)]
        msfs2024_path: Option<String>,

        /// Default resolution for installs
        #[arg(long)]
        default_resolution: Option<Resolution>,

        /// Default simulator for installs
        #[arg(long)]
        default_simulator: Option<Simulator>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only initialize logging if verbose or RUST_LOG is set
    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive(
                if cli.verbose { "liveryhub=debug".parse()? } else { "liveryhub=warn".parse()? },
            ))
            .init();
    }

    match cli.command {
        Commands::List => {
            let (api, http) = backend(&cli.api)?;
            let (installer, _rx) = build_installer(api, http)?;
            let records = installer.list_installed();
            if records.is_empty() {
                println!("No liveries installed.");
                return Ok(());
            }
            for record in &records {
                println!(
                    "{}  [{} {}]  v{}  {}",
                    record.original_name,
                    record.resolution,
                    record.simulator,
                    if record.version.is_empty() { "?" } else { &record.version },
                    record.install_path.display()
                );
            }
        }

        Commands::Catalog => {
            let (api, _http) = backend(&cli.api)?;
            let catalog = fetch_catalog(&api, &cli.token).await?;
            for livery in &catalog {
                println!(
                    "{}  [{} {}]  v{}  by {}",
                    livery.name,
                    livery.resolution,
                    livery.simulator,
                    if livery.version.is_empty() { "?" } else { &livery.version },
                    if livery.developer.is_empty() { "unknown" } else { &livery.developer },
                );
            }
            println!("\n{} liveries available", catalog.len());
        }

        Commands::Install { name, resolution, simulator } => {
            let settings = Settings::load();
            let resolution = resolution.unwrap_or(settings.default_resolution);
            let simulator = simulator.unwrap_or(settings.default_simulator);

            let (api, http) = backend(&cli.api)?;
            let catalog = fetch_catalog(&api, &cli.token).await?;
            let livery = find_in_catalog(&catalog, &name)?;

            let (installer, rx) = build_installer(api, http)?;
            let bars = tokio::spawn(render_progress(rx));

            println!("Installing '{}' ({}, {})...", livery.name, resolution, simulator);
            let outcome = installer
                .install_livery(&livery, resolution, simulator, &cli.token)
                .await;
            // Dropping the installer closes the event channel and ends the renderer
            drop(installer);
            let _ = bars.await;

            report_outcome(outcome, &format!("Installed '{}'", livery.name))?;
        }

        Commands::Uninstall { path } => {
            let (api, http) = backend(&cli.api)?;
            let (installer, _rx) = build_installer(api, http)?;
            let outcome = installer.uninstall_by_path(&path).await;
            report_outcome(outcome, &format!("Uninstalled {}", path.display()))?;
        }

        Commands::Updates => {
            let (api, http) = backend(&cli.api)?;
            let catalog = fetch_catalog(&api, &cli.token).await?;
            let (installer, _rx) = build_installer(api.clone(), http)?;

            let available = updates::check_for_updates(
                api.as_ref(),
                installer.ledger(),
                installer.versions(),
                &catalog,
                &cli.token,
            )
            .await
            .map_err(|e| session_hint(e.is_auth_rejection(), e.into()))?;

            if available.is_empty() {
                println!("Everything is up to date.");
                return Ok(());
            }
            for update in &available {
                println!(
                    "{}  {} -> {}  [{} {}]",
                    update.name,
                    update.current_version,
                    update.latest_version,
                    update.resolution,
                    update.simulator
                );
                if let Some(changelog) = &update.changelog {
                    println!("    {}", changelog);
                }
            }
        }

        Commands::Update { name } => {
            let (api, http) = backend(&cli.api)?;
            let catalog = fetch_catalog(&api, &cli.token).await?;
            let livery = find_in_catalog(&catalog, &name)?;

            let (installer, rx) = build_installer(api, http)?;
            let record = installer
                .list_installed()
                .into_iter()
                .find(|r| r.original_name.eq_ignore_ascii_case(&name))
                .ok_or_else(|| anyhow!("'{}' is not installed", name))?;

            let bars = tokio::spawn(render_progress(rx));
            println!(
                "Updating '{}' ({}, {})...",
                record.original_name, record.resolution, record.simulator
            );
            let outcome = installer
                .update_livery(&livery, record.resolution, record.simulator, &cli.token)
                .await;
            drop(installer);
            let _ = bars.await;

            report_outcome(outcome, &format!("Updated '{}'", livery.name))?;
        }

        Commands::Settings {
            msfs2020_path,
            msfs2024_path,
            default_resolution,
            default_simulator,
        } => {
            let mut settings = Settings::load();
            let changed = msfs2020_path.is_some()
                || msfs2024_path.is_some()
                || default_resolution.is_some()
                || default_simulator.is_some();

            if let Some(path) = msfs2020_path {
                settings.msfs2020_path = path;
            }
            if let Some(path) = msfs2024_path {
                settings.msfs2024_path = path;
            }
            if let Some(resolution) = default_resolution {
                settings.default_resolution = resolution;
            }
            if let Some(simulator) = default_simulator {
                settings.default_simulator = simulator;
            }

            if changed {
                settings.save()?;
                println!("Settings saved.");
            }

            println!("MSFS 2020 path:     {}", or_unset(&settings.msfs2020_path));
            println!("MSFS 2024 path:     {}", or_unset(&settings.msfs2024_path));
            println!("Default resolution: {}", settings.default_resolution);
            println!("Default simulator:  {}", settings.default_simulator);
        }
    }

    Ok(())
}

/// One shared transport per invocation; the catalog client and the
/// installer reuse the same connection pool.
fn backend(api_base: &str) -> Result<(Arc<ApiClient>, HttpClient)> {
    let http = HttpClient::new()?;
    let api = Arc::new(ApiClient::new(http.clone(), api_base));
    Ok((api, http))
}

fn build_installer(
    api: Arc<ApiClient>,
    http: HttpClient,
) -> Result<(Installer, mpsc::UnboundedReceiver<ProgressEvent>)> {
    let settings = Settings::load();
    let config_dir = Settings::config_dir()?;
    let ledger = Ledger::open(config_dir.join("installed_liveries.json"));
    let versions = VersionStore::open(config_dir.join("versions.json"));
    Ok(Installer::new(api, http, settings, ledger, versions))
}

async fn fetch_catalog(api: &ApiClient, token: &str) -> Result<Vec<CatalogLivery>> {
    if token.is_empty() {
        bail!("No session token. Pass --token or set LIVERYHUB_TOKEN.");
    }
    api.fetch_catalog(token)
        .await
        .map_err(|e| session_hint(e.is_auth_rejection(), e.into()))
}

fn session_hint(auth_rejected: bool, err: anyhow::Error) -> anyhow::Error {
    if auth_rejected {
        err.context("Session expired or invalid - sign in again to get a fresh token")
    } else {
        err
    }
}

fn find_in_catalog(catalog: &[CatalogLivery], name: &str) -> Result<CatalogLivery> {
    catalog
        .iter()
        .find(|l| l.name.eq_ignore_ascii_case(name))
        .cloned()
        .with_context(|| format!("'{}' not found in the catalog", name))
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() { "(not set)" } else { value }
}

fn report_outcome(outcome: liveryhub::error::InstallOutcome, success_line: &str) -> Result<()> {
    if outcome.success {
        println!("{}", success_line);
        return Ok(());
    }

    let message = outcome.error.unwrap_or_else(|| "unknown failure".to_string());
    match outcome.details {
        Some(details) => bail!("{} ({})", message, details),
        None => bail!("{}", message),
    }
}

/// Drive indicatif bars from the pipeline's progress events. Returns when
/// the sender side (the installer) is dropped.
async fn render_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = rx.recv().await {
        let pb = bar.get_or_insert_with(|| {
            let pb = match event.total {
                Some(total) => {
                    let pb = ProgressBar::new(total);
                    pb.set_style(
                        ProgressStyle::with_template(
                            "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes}",
                        )
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                    );
                    pb
                }
                None => {
                    let pb = ProgressBar::new_spinner();
                    pb.enable_steady_tick(std::time::Duration::from_millis(120));
                    pb
                }
            };
            pb.set_message(event.livery_name.clone());
            pb
        });

        if event.extracting {
            pb.set_message(format!("{} (extracting)", event.livery_name));
        } else {
            if let Some(total) = event.total {
                pb.set_length(total);
            }
            pb.set_position(event.downloaded);
        }
    }

    if let Some(pb) = bar {
        pb.finish_and_clear();
    }
}

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use imagesmith_api::ArmClient;
use imagesmith_engine::{
    ArmCloudClient, BuildArtifact, BuildConfig, CancellationToken, Pipeline, PipelineClients, TracingDiagnostics,
};
use imagesmith_types::{OsImage, OsImageList};
use imagesmith_util::expand_tilde;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Build machine images on Azure Resource Manager.
#[derive(Parser, Debug)]
#[command(name = "imagesmith", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision a VM, capture its OS disk as an image and tear everything down
    Build {
        /// Build config (YAML or JSON); defaults to $IMAGESMITH_CONFIG or ./imagesmith.yaml
        #[arg(long, short)]
        config: Option<String>,
    },
    /// Pick base images from an OS image catalog, newest first
    Images {
        /// Catalog JSON as returned by the image listing API
        #[arg(long)]
        catalog: PathBuf,

        #[arg(long)]
        label: String,

        #[arg(long)]
        location: String,

        /// List every match instead of only the newest
        #[arg(long)]
        all: bool,
    },
    /// Print the resolved config with secrets redacted
    ShowConfig {
        #[arg(long, short)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    match Cli::parse().command {
        Command::Build { config } => run_build(config.as_deref()).await,
        Command::Images {
            catalog,
            label,
            location,
            all,
        } => list_images(&catalog, &label, &location, all),
        Command::ShowConfig { config } => show_config(config.as_deref()),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Filter from `RUST_LOG`, falling back to `info` when unset or unparsable.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

async fn run_build(config_arg: Option<&str>) -> Result<()> {
    let path = BuildConfig::resolve_path(config_arg);
    let config = BuildConfig::load(&path).with_context(|| format!("load config {}", path.display()))?;

    let client = ArmClient::new_from_env(config.subscription_id.clone(), config.polling)?;
    let clients = PipelineClients::from_arm(ArmCloudClient::new(client));
    let cancellation = CancellationToken::new();
    let pipeline = Pipeline::from_config(&config, clients, Arc::new(TracingDiagnostics))?.with_cancellation(cancellation.clone());

    let names = pipeline.names();
    info!(
        resource_group = %names.resource_group,
        compute_name = %names.compute,
        steps = ?pipeline.step_names(),
        "build planned"
    );

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current step");
            cancellation.cancel();
        }
    });

    let report = tokio::task::spawn_blocking(move || pipeline.run())
        .await
        .context("build task panicked")?;
    info!(
        executed = report.executed.len(),
        cleaned_up = report.cleaned_up.len(),
        "build finished"
    );

    let state = report.into_result()?;
    let artifact = BuildArtifact::from_state(&state)?;
    println!("{}", serde_json::to_string_pretty(&artifact)?);
    Ok(())
}

fn list_images(catalog: &Path, label: &str, location: &str, all: bool) -> Result<()> {
    let path = expand_tilde(&catalog.to_string_lossy());
    let content = fs::read_to_string(&path).with_context(|| format!("read catalog {}", path.display()))?;
    let list: OsImageList = serde_json::from_str(&content).with_context(|| format!("parse catalog {}", path.display()))?;

    let mut images = list.filter(label, location);
    OsImageList::sort_by_date_desc(&mut images);
    if images.is_empty() {
        anyhow::bail!("no image labelled '{label}' is available in '{location}'");
    }

    let selected: Vec<&OsImage> = if all { images } else { images.into_iter().take(1).collect() };
    println!("{}", serde_json::to_string_pretty(&selected)?);
    Ok(())
}

fn show_config(config_arg: Option<&str>) -> Result<()> {
    let path = BuildConfig::resolve_path(config_arg);
    let mut config = BuildConfig::from_file(&path)?;
    config.apply_env_overrides();
    if let Err(error) = config.validate() {
        warn!(%error, "config would be rejected by `build`");
    }
    print!("{}", config.render_redacted()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use tracing::level_filters::LevelFilter;

    use super::*;

    #[test]
    fn log_filter_follows_rust_log() {
        temp_env::with_var("RUST_LOG", Some("debug"), || {
            assert_eq!(env_filter().max_level_hint(), Some(LevelFilter::DEBUG));
        });
        temp_env::with_var("RUST_LOG", Some("imagesmith::build=trace"), || {
            assert_eq!(env_filter().max_level_hint(), Some(LevelFilter::TRACE));
        });
    }

    #[test]
    fn log_filter_defaults_to_info() {
        temp_env::with_var_unset("RUST_LOG", || {
            assert_eq!(env_filter().max_level_hint(), Some(LevelFilter::INFO));
        });
    }
}

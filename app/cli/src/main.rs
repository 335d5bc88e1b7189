//! `lumen` - manage and load effect plugins.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use tracing::debug;

use lumen_config::PluginPipelineConfig;
use lumen_plugin::InMemoryEffectRegistry;
use lumen_plugin::PluginLifecycle;

mod commands;

#[derive(Parser)]
#[command(name = "lumen")]
#[command(about = "Install, load and manage lumen effect plugins")]
struct Cli {
    /// Config home (default: $LUMEN_HOME or ~/.lumen)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Emit machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Install a plugin from a local directory or a remote URL
    Install {
        /// Local plugin directory or git/tarball URL
        source: String,
        /// Git branch or tag for remote sources
        #[arg(long = "ref")]
        git_ref: Option<String>,
        /// Override the derived plugin name
        #[arg(long)]
        name: Option<String>,
    },

    /// List configured plugins
    List,

    /// Remove a plugin
    Uninstall {
        name: String,
        /// Also delete the plugin's source directory
        #[arg(long)]
        delete_source: bool,
    },

    /// Re-materialize and re-load a plugin
    Reload { name: String },

    /// Enable or disable a plugin
    Toggle { name: String },

    /// Bootstrap the engine and load every enabled plugin
    LoadAll,

    /// Delete stale processed directories
    Cleanup,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let home = cli.home.clone().unwrap_or_else(lumen_config::find_lumen_home);
    let mut app_config = lumen_config::load_config(&home)?;
    lumen_config::env_loader::apply_env_overrides(&mut app_config);

    let logging = app_config
        .logging
        .clone()
        .unwrap_or_default()
        .to_common_logging();
    lumen_utils_common::init_logging(&logging);

    let config = PluginPipelineConfig::from_app_config(&home, &app_config);
    debug!(home = %home.display(), data_dir = %config.data_dir.display(), "Resolved configuration");

    let registry = Arc::new(InMemoryEffectRegistry::new());
    let lifecycle = PluginLifecycle::with_node_runtime(config, registry);
    let output = commands::Output { json: cli.json };

    match cli.command {
        Command::Install {
            source,
            git_ref,
            name,
        } => {
            let request = commands::install_request(&source, git_ref, name);
            commands::install(&lifecycle, request, output).await
        }
        Command::List => commands::list(&lifecycle, output),
        Command::Uninstall {
            name,
            delete_source,
        } => commands::uninstall(&lifecycle, &name, delete_source, output).await,
        Command::Reload { name } => commands::reload(&lifecycle, &name, output).await,
        Command::Toggle { name } => commands::toggle(&lifecycle, &name).await,
        Command::LoadAll => commands::load_all(&lifecycle, output).await,
        Command::Cleanup => commands::cleanup(&lifecycle, output).await,
    }
}

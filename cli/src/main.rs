mod builtins;
mod confirm;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use toolbelt_core::{
    CONFIG_FILE_NAME, Catalog, Confirm, ConsoleLogger, HelpService, Logger, MetadataIndex, Router,
    RuntimeConfig, ServiceContainer,
};
use toolbelt_plugins::PluginHost;

use crate::builtins::RuntimeInfo;
use crate::confirm::StdinConfirm;

#[derive(Debug, Parser)]
#[command(name = "toolbelt", version)]
#[command(about = "Command runner with built-in commands and cached script plugins")]
struct Cli {
    /// Configuration file (defaults to toolbelt.yml next to the executable).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Plugin directory, overriding the configured one.
    #[arg(long, value_name = "DIR")]
    plugin_dir: Option<PathBuf>,
    /// Skip plugin loading.
    #[arg(long)]
    no_plugins: bool,
    /// List every loaded plugin unit, cached or not.
    #[arg(long)]
    verbose_plugins: bool,
    /// Show debug messages and diagnostic logging.
    #[arg(long, short)]
    verbose: bool,
    /// `[group] <command> [args...]`, or search terms.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    args: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run(cli: Cli) -> Result<i32, String> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let config = if cli.config.is_some() {
        RuntimeConfig::load(&config_path)
    } else {
        RuntimeConfig::load_or_default(&config_path)
    }
    .map_err(|err| format!("{}: {err}", config_path.display()))?;
    debug!(path = %config_path.display(), "configuration loaded");

    let logger: Arc<dyn Logger> = Arc::new(ConsoleLogger::new(cli.verbose));
    let index = MetadataIndex::new();
    let mut catalog = Catalog::discover(&builtins::registry(), &index, &config.program);

    let mut info = RuntimeInfo {
        config_path: config_path.clone(),
        ..RuntimeInfo::default()
    };
    if config.plugins.enabled && !cli.no_plugins {
        let verbose_plugins =
            cli.args.is_empty() || cli.verbose_plugins || config.plugins.verbose;
        let base = config_path.parent().unwrap_or(Path::new("."));
        let host = plugin_host(&config, cli.plugin_dir.as_deref(), base);
        match host.load(&index) {
            Ok(load) => {
                load.report.log(logger.as_ref(), verbose_plugins);
                load.merge_into(&mut catalog);
            }
            Err(err) => {
                warn!(error = %err, "plugin loading failed");
                logger.warning(&format!("Plugins not loaded: {err}"));
            }
        }
        info.plugin_root = Some(host.root().to_path_buf());
        info.plugin_cache = Some(host.cache().dir().to_path_buf());
        info.cache_stats = Some(host.cache().stats());
    }

    let catalog = Arc::new(catalog);
    let mut services = ServiceContainer::new();
    services.register_singleton::<dyn Logger>(Arc::clone(&logger));
    services.register_singleton(Arc::new(HelpService::new(Arc::clone(&catalog))));
    services.register_singleton::<dyn Confirm>(Arc::new(StdinConfirm));
    builtins::runtime_info_service(&mut services, info);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received");
            on_interrupt.cancel();
        }
    });

    let router = Router::new(catalog).with_auto_confirm(config.help.auto_confirm);
    let dispatch = router.dispatch(&cli.args, &services, &cancel).await;
    debug!(?dispatch, "dispatch finished");
    Ok(dispatch.exit_code())
}

fn default_config_path() -> Result<PathBuf, String> {
    let exe = std::env::current_exe().map_err(|err| format!("cannot locate executable: {err}"))?;
    let dir = exe.parent().unwrap_or(Path::new("."));
    Ok(dir.join(CONFIG_FILE_NAME))
}

fn plugin_host(config: &RuntimeConfig, override_dir: Option<&Path>, base: &Path) -> PluginHost {
    let mut plugins = config.plugins.clone();
    if let Some(dir) = override_dir {
        // Relative overrides follow the working directory, not the config file.
        plugins.directory = std::env::current_dir()
            .map(|cwd| cwd.join(dir))
            .unwrap_or_else(|_| dir.to_path_buf());
    }
    PluginHost::from_settings(&plugins, &config.compiler, base)
}

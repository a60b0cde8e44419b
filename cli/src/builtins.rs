//! Commands shipped with the binary.
//!
//! Registered explicitly in [`registry`]; the namespace passed with each
//! registration decides whether a command is top-level or grouped.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use toolbelt_core::{
    BuiltinRegistry, CANCELLED_EXIT_CODE, Command, HelpCommand, HelpService, Logger, Metadata,
    Outcome, ServiceContainer, ValidationRule,
};
use toolbelt_plugins::CacheStats;

/// Startup facts for the `debug` command.
#[derive(Debug, Clone, Default)]
pub struct RuntimeInfo {
    pub config_path: PathBuf,
    pub plugin_root: Option<PathBuf>,
    pub plugin_cache: Option<PathBuf>,
    pub cache_stats: Option<CacheStats>,
}

pub fn registry() -> BuiltinRegistry {
    let mut registry = BuiltinRegistry::new();
    registry
        .command::<HelpCommand>("commands", "Help")
        .command::<Sum>("commands", "Sum")
        .command::<DebugInfo>("commands", "Debug")
        .command::<RunPing>("commands.run", "Ping")
        .command::<Test1>("commands.run", "Test1")
        .command::<NetworkPing>("commands.network", "Ping")
        .group(
            "commands.run",
            Metadata::default()
                .with_description("Run tools and test commands")
                .with_keywords("tools execute"),
        )
        .group(
            "commands.network",
            Metadata::default()
                .with_description("Network diagnostics")
                .with_keywords("net diagnostics"),
        );
    registry
}

#[derive(Debug, Default)]
pub struct Sum;

#[async_trait]
impl Command for Sum {
    fn metadata(&self) -> Option<Metadata> {
        Some(
            Metadata::named("sum")
                .with_description("Adds the specified numbers")
                .with_params("<number1> <number2> ...")
                .with_keywords("add math")
                .with_rule(ValidationRule::MinCount(1))
                .with_rule(ValidationRule::AllNumeric),
        )
    }

    async fn execute(
        &self,
        args: &[String],
        services: &ServiceContainer,
        _cancel: &CancellationToken,
    ) -> Outcome {
        let mut total: i64 = 0;
        for arg in args {
            match arg.parse::<i32>() {
                Ok(n) => total += i64::from(n),
                Err(_) => {
                    if let Some(logger) = services.resolve::<dyn Logger>() {
                        logger.error(&format!("Error: '{arg}' is not a valid number."));
                    }
                    return Outcome::failure();
                }
            }
        }
        if let Some(logger) = services.resolve::<dyn Logger>() {
            logger.success(&total.to_string());
        }
        Outcome::success()
    }
}

/// Hidden; reachable only by its exact name.
#[derive(Debug, Default)]
pub struct DebugInfo;

#[async_trait]
impl Command for DebugInfo {
    fn metadata(&self) -> Option<Metadata> {
        Some(
            Metadata::named("debug")
                .with_description("Internal debug command")
                .hidden(),
        )
    }

    async fn execute(
        &self,
        _args: &[String],
        services: &ServiceContainer,
        _cancel: &CancellationToken,
    ) -> Outcome {
        let Some(logger) = services.resolve::<dyn Logger>() else {
            return Outcome::failure();
        };

        if let Some(help) = services.resolve::<HelpService>() {
            let catalog = help.catalog();
            logger.info(&format!(
                "Catalog: {} command(s) in {} group(s)",
                catalog.command_count(),
                catalog.group_count()
            ));
        }

        let info = services.resolve::<RuntimeInfo>().unwrap_or_default();
        logger.info(&format!("Config: {}", info.config_path.display()));
        match (&info.plugin_root, &info.plugin_cache) {
            (Some(root), Some(cache)) => {
                logger.info(&format!("Plugins: {}", root.display()));
                logger.info(&format!("Plugin cache: {}", cache.display()));
            }
            _ => logger.info("Plugins: disabled"),
        }
        if let Some(stats) = info.cache_stats {
            logger.info(&format!(
                "Compilations: {}, cache loads: {}",
                stats.compilations, stats.cache_loads
            ));
        }
        Outcome::success()
    }
}

#[derive(Debug, Default)]
pub struct RunPing;

#[async_trait]
impl Command for RunPing {
    fn metadata(&self) -> Option<Metadata> {
        Some(
            Metadata::named("ping")
                .with_description("Ping one or more hosts")
                .with_params("<host1> <host2> ...")
                .with_rule(ValidationRule::MinCount(1)),
        )
    }

    async fn execute(
        &self,
        args: &[String],
        services: &ServiceContainer,
        cancel: &CancellationToken,
    ) -> Outcome {
        let logger = services.resolve::<dyn Logger>();
        let mut outcome = Outcome::success();
        for host in args {
            let result = ping(host, logger.as_deref(), cancel).await;
            if result.exit_code == Some(CANCELLED_EXIT_CODE) {
                return result;
            }
            if !result.is_success() {
                outcome = result;
            }
        }
        outcome
    }
}

#[derive(Debug, Default)]
pub struct NetworkPing;

#[async_trait]
impl Command for NetworkPing {
    fn metadata(&self) -> Option<Metadata> {
        Some(
            Metadata::named("ping")
                .with_description("Perform a ping")
                .with_params("<hostname>")
                .with_rule(ValidationRule::ExactCount(1)),
        )
    }

    async fn execute(
        &self,
        args: &[String],
        services: &ServiceContainer,
        cancel: &CancellationToken,
    ) -> Outcome {
        let logger = services.resolve::<dyn Logger>();
        match args.first() {
            Some(host) => ping(host, logger.as_deref(), cancel).await,
            None => Outcome::failure(),
        }
    }
}

/// Sends one echo request with the system `ping`.
async fn ping(host: &str, logger: Option<&dyn Logger>, cancel: &CancellationToken) -> Outcome {
    let count_flag = if cfg!(windows) { "-n" } else { "-c" };
    if let Some(logger) = logger {
        logger.info(&format!("Pinging {host}..."));
    }
    debug!(host, "spawning ping");

    let mut child = match tokio::process::Command::new("ping")
        .args([count_flag, "1", host])
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            warn!(error = %err, "could not start ping");
            if let Some(logger) = logger {
                logger.error(&format!("Error during ping: {err}"));
            }
            return Outcome::failure();
        }
    };

    tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => {
                if let Some(logger) = logger {
                    logger.success(&format!("{host} is reachable"));
                }
                Outcome::success()
            }
            Ok(status) => {
                if let Some(logger) = logger {
                    logger.error(&format!("Ping failed: {host}"));
                }
                Outcome::from_exit_code(status.code().unwrap_or(1))
            }
            Err(err) => {
                warn!(error = %err, "waiting for ping failed");
                Outcome::failure()
            }
        },
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            Outcome::from_exit_code(CANCELLED_EXIT_CODE)
        }
    }
}

#[derive(Debug, Default)]
pub struct Test1;

#[async_trait]
impl Command for Test1 {
    fn metadata(&self) -> Option<Metadata> {
        Some(
            Metadata::named("test1")
                .with_description("Outputs 'Hello, World!'")
                .with_params("[text...]"),
        )
    }

    async fn execute(
        &self,
        args: &[String],
        services: &ServiceContainer,
        _cancel: &CancellationToken,
    ) -> Outcome {
        if let Some(logger) = services.resolve::<dyn Logger>() {
            logger.success("Hello, World!");
            if !args.is_empty() {
                logger.info(&args.join(" "));
            }
        }
        Outcome::success()
    }
}

/// Registers `info` for the `debug` command.
pub fn runtime_info_service(services: &mut ServiceContainer, info: RuntimeInfo) {
    services.register_singleton(Arc::new(info));
}

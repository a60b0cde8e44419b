//! Argument vector to command resolution.
//!
//! Grammar: `<program> [group] <command|subcommand> [args...]`. A top-level
//! command always wins over a group of the same name. A routing miss is not
//! an error; it falls back to help filtered by the raw arguments.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::catalog::{Catalog, CatalogEntry, CommandGroup};
use crate::command::Command;
use crate::help::HelpService;
use crate::logger::Logger;
use crate::services::ServiceContainer;
use crate::types::Outcome;
use crate::validate::ValidationError;

/// Exit code reported when a run is interrupted.
pub const CANCELLED_EXIT_CODE: i32 = 130;

/// Yes/no prompt used for the auto-confirm affordance.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, question: &str, cancel: &CancellationToken) -> bool;
}

/// What an argument vector resolved to.
#[derive(Debug, Clone, Copy)]
pub enum Invocation<'a> {
    /// A leaf command, top-level or inside `group`.
    Command {
        entry: &'a CatalogEntry,
        group: Option<&'a CommandGroup>,
        args: &'a [String],
    },
    /// A group with a missing or unknown subcommand. `args` still holds the
    /// unmatched token, if any.
    Group {
        group: &'a CommandGroup,
        args: &'a [String],
    },
}

/// Result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Executed(Outcome),
    /// Validation blocked execution.
    Rejected(ValidationError),
    /// Nothing matched; help was shown.
    Help,
    Cancelled,
}

impl Dispatch {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Executed(outcome) => outcome.process_code(),
            Self::Rejected(_) => 1,
            Self::Help => 0,
            Self::Cancelled => CANCELLED_EXIT_CODE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Router {
    catalog: Arc<Catalog>,
    auto_confirm: bool,
}

impl Router {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            auto_confirm: true,
        }
    }

    pub fn with_auto_confirm(mut self, enabled: bool) -> Self {
        self.auto_confirm = enabled;
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Resolves `args` against the catalog.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use toolbelt_core::{Catalog, Router};
    ///
    /// let router = Router::new(Arc::new(Catalog::new("toolbelt")));
    /// assert!(router.resolve(&["nothing".to_string()]).is_none());
    /// ```
    pub fn resolve<'a>(&'a self, args: &'a [String]) -> Option<Invocation<'a>> {
        let (first, rest) = args.split_first()?;

        if let Some(entry) = self.catalog.find_command(first) {
            return Some(Invocation::Command {
                entry,
                group: None,
                args: rest,
            });
        }

        let group = self.catalog.find_group(first)?;
        if let Some((second, remaining)) = rest.split_first() {
            if let Some(entry) = group.find(second) {
                return Some(Invocation::Command {
                    entry,
                    group: Some(group),
                    args: remaining,
                });
            }
        }
        Some(Invocation::Group { group, args: rest })
    }

    /// Resolves, validates and executes one invocation.
    pub async fn dispatch(
        &self,
        args: &[String],
        services: &ServiceContainer,
        cancel: &CancellationToken,
    ) -> Dispatch {
        if cancel.is_cancelled() {
            return Dispatch::Cancelled;
        }

        if args.is_empty() {
            self.show_help(args, services);
            return Dispatch::Help;
        }

        match self.resolve(args) {
            Some(Invocation::Command { entry, group, args }) => {
                self.run(entry, group, args, services, cancel).await
            }
            Some(Invocation::Group { group, args }) => {
                debug!(group = %group.name(), "no subcommand matched, running group");
                Dispatch::Executed(group.execute(args, services, cancel).await)
            }
            None => self.fallback(args, services, cancel).await,
        }
    }

    async fn run(
        &self,
        entry: &CatalogEntry,
        group: Option<&CommandGroup>,
        args: &[String],
        services: &ServiceContainer,
        cancel: &CancellationToken,
    ) -> Dispatch {
        if let Err(err) = entry.descriptor.validate(args) {
            if let Some(logger) = services.resolve::<dyn Logger>() {
                logger.error(&format!("Validation error: {err}"));
                logger.info(&format!(
                    "Usage: {}",
                    entry
                        .descriptor
                        .usage(self.catalog.program(), group.map(CommandGroup::name))
                ));
            }
            return Dispatch::Rejected(err);
        }

        info!(
            command = %entry.name(),
            group = group.map(CommandGroup::name).unwrap_or_default(),
            origin = %entry.origin,
            "executing"
        );
        let outcome = entry.command.execute(args, services, cancel).await;
        if cancel.is_cancelled() && !outcome.is_success() {
            return Dispatch::Cancelled;
        }
        Dispatch::Executed(outcome)
    }

    async fn fallback(
        &self,
        args: &[String],
        services: &ServiceContainer,
        cancel: &CancellationToken,
    ) -> Dispatch {
        let help = HelpService::new(Arc::clone(&self.catalog));

        if self.auto_confirm {
            if let (Some(candidate), Some(confirm)) =
                (help.candidate(args), services.resolve::<dyn Confirm>())
            {
                let usage = candidate.usage(self.catalog.program());
                if confirm
                    .confirm(&format!("Run '{usage}'? [y/N]"), cancel)
                    .await
                {
                    return self
                        .run(candidate.entry(), candidate.group(), &[], services, cancel)
                        .await;
                }
                if cancel.is_cancelled() {
                    return Dispatch::Cancelled;
                }
            }
        }

        self.show_help(args, services);
        Dispatch::Help
    }

    fn show_help(&self, terms: &[String], services: &ServiceContainer) {
        let Some(logger) = services.resolve::<dyn Logger>() else {
            return;
        };
        match services.resolve::<HelpService>() {
            Some(help) => help.render(terms, logger.as_ref()),
            None => HelpService::new(Arc::clone(&self.catalog)).render(terms, logger.as_ref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BuiltinRegistry;
    use crate::metadata::MetadataIndex;
    use crate::types::Metadata;

    #[derive(Default)]
    struct Leaf;

    #[async_trait]
    impl Command for Leaf {
        async fn execute(
            &self,
            _args: &[String],
            _services: &ServiceContainer,
            _cancel: &CancellationToken,
        ) -> Outcome {
            Outcome::success()
        }
    }

    #[derive(Default)]
    struct Ping;

    #[async_trait]
    impl Command for Ping {
        fn metadata(&self) -> Option<Metadata> {
            Some(Metadata::named("ping"))
        }

        async fn execute(
            &self,
            _args: &[String],
            _services: &ServiceContainer,
            _cancel: &CancellationToken,
        ) -> Outcome {
            Outcome::success()
        }
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn router() -> Router {
        let mut registry = BuiltinRegistry::new();
        registry
            .command::<Leaf>("commands", "Run")
            .command::<Leaf>("commands", "Sum")
            .command::<Ping>("commands.run", "Ping")
            .command::<Ping>("commands.network", "Ping");
        let index = MetadataIndex::new();
        Router::new(Arc::new(Catalog::discover(&registry, &index, "toolbelt")))
    }

    #[test]
    fn test_top_level_takes_precedence_over_group() {
        let router = router();
        let input = args(&["RUN", "ping"]);
        match router.resolve(&input) {
            Some(Invocation::Command { entry, group, args }) => {
                assert_eq!(entry.name(), "run");
                assert!(group.is_none());
                assert_eq!(args, &input[1..]);
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn test_group_and_subcommand() {
        let router = router();
        let input = args(&["network", "PING", "host"]);
        match router.resolve(&input) {
            Some(Invocation::Command { entry, group, args }) => {
                assert_eq!(entry.name(), "ping");
                assert_eq!(group.map(CommandGroup::name), Some("network"));
                assert_eq!(args, &input[2..]);
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn test_group_with_unknown_subcommand() {
        let router = router();
        let input = args(&["network", "trace"]);
        match router.resolve(&input) {
            Some(Invocation::Group { group, args }) => {
                assert_eq!(group.name(), "network");
                assert_eq!(args, &input[1..]);
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn test_miss_and_empty() {
        let router = router();
        assert!(router.resolve(&[]).is_none());
        assert!(router.resolve(&args(&["nope"])).is_none());
    }

    #[test]
    fn test_dispatch_exit_codes() {
        assert_eq!(Dispatch::Help.exit_code(), 0);
        assert_eq!(Dispatch::Cancelled.exit_code(), CANCELLED_EXIT_CODE);
        assert_eq!(
            Dispatch::Executed(Outcome::from_exit_code(3)).exit_code(),
            3
        );
        assert_eq!(
            Dispatch::Rejected(ValidationError::NotNumeric("x".into())).exit_code(),
            1
        );
    }
}

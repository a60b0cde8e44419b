//! Help listing rendered from a [`SearchIndex`] query.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::command::Command;
use crate::logger::Logger;
use crate::search::{Candidate, SearchIndex};
use crate::services::ServiceContainer;
use crate::types::{Metadata, Outcome};

/// Renders the catalog listing, optionally filtered by search terms.
#[derive(Debug, Clone)]
pub struct HelpService {
    catalog: Arc<Catalog>,
}

impl HelpService {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn title(&self, logger: &dyn Logger) {
        logger.write("");
        logger.write(&format!(" >_ {}", self.catalog.program()));
        logger.write("");
    }

    /// Listing lines for `terms`: groups with their children first, then
    /// top-level commands.
    pub fn listing<S: AsRef<str>>(&self, terms: &[S]) -> Vec<String> {
        let result = SearchIndex::new(&self.catalog).search(terms);
        let mut lines = Vec::new();

        for gm in &result.groups {
            lines.push(format!("  {}", gm.group.name()));
            for child in &gm.children {
                let descriptor = &child.entry.descriptor;
                lines.push(
                    format!(
                        "    └─ {:<13} {:<10}{}",
                        descriptor.name, child.entry.origin, descriptor.description
                    )
                    .trim_end()
                    .to_string(),
                );
            }
            lines.push(String::new());
        }

        let prefix = format!("{} ", self.catalog.program());
        for m in &result.commands {
            let usage = m.entry.descriptor.usage(self.catalog.program(), None);
            let usage = usage.strip_prefix(&prefix).unwrap_or(&usage);
            lines.push(
                format!("  {:<15} {}", usage, m.entry.descriptor.description)
                    .trim_end()
                    .to_string(),
            );
        }
        lines
    }

    /// Writes the title line followed by the filtered listing.
    pub fn render<S: AsRef<str>>(&self, terms: &[S], logger: &dyn Logger) {
        self.title(logger);
        for line in self.listing(terms) {
            logger.write(&line);
        }
    }

    /// Single command the listing for `terms` narrows down to, if any.
    pub fn candidate<S: AsRef<str>>(&self, terms: &[S]) -> Option<Candidate<'_>> {
        SearchIndex::new(&self.catalog).search(terms).single_candidate()
    }
}

/// The built-in `help` command: renders the listing filtered by its args.
#[derive(Debug, Clone, Copy, Default)]
pub struct HelpCommand;

#[async_trait]
impl Command for HelpCommand {
    fn metadata(&self) -> Option<Metadata> {
        Some(
            Metadata::named("help")
                .with_description("Show help text")
                .with_params("[search terms...]"),
        )
    }

    async fn execute(
        &self,
        args: &[String],
        services: &ServiceContainer,
        _cancel: &CancellationToken,
    ) -> Outcome {
        let (Some(help), Some(logger)) = (
            services.resolve::<HelpService>(),
            services.resolve::<dyn Logger>(),
        ) else {
            return Outcome::failure();
        };
        help.render(args, logger.as_ref());
        Outcome::success()
    }
}

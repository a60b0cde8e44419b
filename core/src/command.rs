//! The command capability invoked by the router.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::services::ServiceContainer;
use crate::types::{Metadata, Outcome};

/// Executable command.
///
/// `args` excludes the tokens that selected the command. Implementations
/// must observe `cancel` in every blocking wait; the router never aborts a
/// running command.
#[async_trait]
pub trait Command: Send + Sync {
    /// Declarative metadata. Read once per type by the
    /// [`MetadataIndex`](crate::MetadataIndex).
    fn metadata(&self) -> Option<Metadata> {
        None
    }

    async fn execute(
        &self,
        args: &[String],
        services: &ServiceContainer,
        cancel: &CancellationToken,
    ) -> Outcome;
}

//! The health indicator capability

use async_trait::async_trait;

use crate::Health;

/// Something that can report the health of one dependency.
///
/// Implementations never fail: any error is folded into a DOWN [`Health`].
#[async_trait]
pub trait HealthIndicator: Send + Sync {
    /// Short name of the dependency, e.g. `mail`.
    fn name(&self) -> &str;

    async fn health(&self) -> Health;
}

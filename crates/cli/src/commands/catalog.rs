//! Catalog cache maintenance.

use corner_shop_storefront::app::{self, StartupError};
use corner_shop_storefront::cache::{CatalogSync, SyncError, SyncOptions};
use corner_shop_storefront::config::{ConfigError, StorefrontConfig};

#[derive(Debug, thiserror::Error)]
pub enum CatalogCommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error("Rebuild failed: {0}")]
    Sync(#[from] SyncError),
}

/// Wipe the configured catalog cache and reload it from the primary store.
///
/// # Errors
///
/// Returns `CatalogCommandError` if either backend is unreachable or the
/// rebuild fails after retries.
pub async fn rebuild() -> Result<(), CatalogCommandError> {
    let config = StorefrontConfig::from_env()?;

    let primary = app::connect_store(&config).await?;
    let cache = app::connect_cache(&config.catalog).await?;
    let sync = CatalogSync::spawn(primary.store, cache, SyncOptions::from_config(&config.catalog));

    tracing::info!("Rebuilding catalog cache...");
    let count = sync.rebuild().await?;

    #[allow(clippy::print_stdout)]
    {
        println!("Catalog rebuilt: {count} products");
    }
    Ok(())
}

use anyhow::{Context, Result};
use asset_sync::AssetStore;

/// Forget every recorded checksum and stored asset.
pub async fn run(store: &dyn AssetStore) -> Result<()> {
    store
        .invalidate_cache()
        .await
        .context("failed to invalidate cache")?;

    println!("Cache invalidated; the next sync re-processes every repository.");
    Ok(())
}

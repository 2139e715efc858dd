use crate::config::AppConfig;
use crate::services::storage::LocalBlobStore;
use std::sync::Arc;
use tracing::info;

/// Blob roots for uploaded images and generated models
pub struct BlobStores {
    pub images: Arc<LocalBlobStore>,
    pub models: Arc<LocalBlobStore>,
}

pub async fn setup_blob_stores(config: &AppConfig) -> anyhow::Result<BlobStores> {
    let images = LocalBlobStore::init(&config.upload_dir).await?;
    info!("🗂️  Image storage: {}", images.root().display());

    let models = LocalBlobStore::init(&config.model_dir).await?;
    info!("🗂️  Model storage: {}", models.root().display());

    Ok(BlobStores {
        images: Arc::new(images),
        models: Arc::new(models),
    })
}

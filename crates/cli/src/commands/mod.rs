//! CLI command implementations.

pub mod ids;
pub mod reminders;

use rbl_admin::config::{ConfigError, RecordStoreConfig};
use rbl_admin::store::{RecordStoreClient, StoreError};
use thiserror::Error;

/// Errors shared by every command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Identifier error: {0}")]
    Id(#[from] rbl_admin::services::IdError),

    #[error("Email error: {0}")]
    Email(#[from] rbl_admin::services::EmailError),
}

/// Connect to the record store named by the environment and authenticate.
async fn connect() -> Result<RecordStoreClient, CommandError> {
    dotenvy::dotenv().ok();

    let config = RecordStoreConfig::from_env()?;
    let store = RecordStoreClient::new(&config)?;
    tracing::info!("Connecting to record store at {}...", store.base_url());
    store.authenticate().await?;
    Ok(store)
}

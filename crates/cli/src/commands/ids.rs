//! Business identifier preview.
//!
//! # Environment Variables
//!
//! - `RECORD_STORE_URL`, `RECORD_STORE_ADMIN_EMAIL`, `RECORD_STORE_ADMIN_PASSWORD`
//! - `CURRENT_YEAR` - Pin the year part (defaults to the current UTC year)

use rbl_admin::config::current_year_from_env;
use rbl_admin::services::IdGenerator;
use rbl_core::SequenceKind;

use super::{CommandError, connect};

/// Log the identifier the next create of `kind` would receive.
///
/// Nothing is reserved; a concurrent create may take the same value.
pub async fn next_id(kind: SequenceKind) -> Result<(), CommandError> {
    let store = connect().await?;
    let ids = IdGenerator::new(store, current_year_from_env()?);

    let id = ids.next_id(kind).await?;
    tracing::info!("Next {} id: {}", kind, id);
    Ok(())
}

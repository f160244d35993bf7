//! Command implementations.

pub mod cancel;
pub mod import;
pub mod list;
pub mod migrate;
pub mod recommend;
pub mod record_usage;
pub mod serve;
pub mod status;

use anyhow::{bail, Result};

use crate::domain::models::EmbeddingModelIdentity;

/// Build an identity from a model/provider flag pair named `flags`.
///
/// Both or neither must be given.
pub(crate) fn identity_from_flags(
    model_name: Option<String>,
    provider: Option<String>,
    flags: (&str, &str),
) -> Result<Option<EmbeddingModelIdentity>> {
    let (model_flag, provider_flag) = flags;
    match (model_name, provider) {
        (Some(model_name), Some(provider)) => {
            let identity = EmbeddingModelIdentity::new(model_name, provider);
            if let Err(e) = identity.validate() {
                bail!("Invalid {model_flag}/{provider_flag}: {e}");
            }
            Ok(Some(identity))
        }
        (None, None) => Ok(None),
        _ => bail!("{model_flag} and {provider_flag} must be given together"),
    }
}

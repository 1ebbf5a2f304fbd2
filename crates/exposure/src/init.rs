//! Input checks run before a country's first exposure computation.

use tracing::{info, instrument};

use exposure_common::Iso3;
use storage::{ObjectStorage, StoragePath};

use crate::boundaries::MAX_ADMIN_LEVEL;
use crate::error::{PipelineError, Result};

/// Keys a country needs before exposure can be computed.
pub fn required_inputs(paths: &StoragePath, iso3: &Iso3) -> Vec<String> {
    let mut keys = vec![paths.population(iso3)];
    keys.extend((0..=MAX_ADMIN_LEVEL).map(|level| paths.boundaries(iso3, level)));
    keys
}

/// Fail with the first missing population or boundary input.
#[instrument(skip(storage, paths), fields(iso3 = %iso3))]
pub async fn verify_inputs(storage: &ObjectStorage, paths: &StoragePath, iso3: &Iso3) -> Result<()> {
    for key in required_inputs(paths, iso3) {
        if !storage.exists(&key).await? {
            return Err(PipelineError::MissingInput {
                iso3: iso3.to_string(),
                key,
            });
        }
    }
    info!("Population and boundaries present");
    Ok(())
}

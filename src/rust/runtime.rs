use std::sync::{Arc, OnceLock};

use log::info;

use crate::artifact_store::ArtifactStore;
use crate::classifier::{ArtifactBundle, PredictionError};

static BUNDLE: OnceLock<Arc<ArtifactBundle>> = OnceLock::new();

/// Loads the named bundle into the process-wide slot on first call.
///
/// Later calls return the already-loaded bundle regardless of `name`. A
/// failed load leaves the slot empty, so initialisation can be retried.
pub fn initialize(store: &ArtifactStore, name: &str) -> Result<Arc<ArtifactBundle>, PredictionError> {
    if let Some(bundle) = BUNDLE.get() {
        return Ok(Arc::clone(bundle));
    }

    let bundle = store.load(name)?;
    bundle.validate()?;
    info!("Initialised shared bundle '{}'", name);

    Ok(Arc::clone(BUNDLE.get_or_init(|| Arc::new(bundle))))
}

/// The shared bundle, if [`initialize`] has succeeded.
pub fn shared() -> Option<Arc<ArtifactBundle>> {
    BUNDLE.get().cloned()
}

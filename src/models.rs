//! Listing the models a server advertises on `/v1/models`.

use serde_json::Value;

use crate::endpoints::MODELS;
use crate::error::{ProbeError, Result};
use crate::probe::{ProbeResult, Prober};
use crate::schema::openai_types::{ModelInfo, ModelsResponse};
use crate::schema::request::{Attempt, Prompt};

/// File the raw listing is saved under.
pub const MODELS_FILE: &str = "available_models.json";

#[derive(Debug, Clone)]
pub struct ModelListing {
    pub models: Vec<ModelInfo>,
    /// Body exactly as the server sent it.
    pub raw: Value,
}

pub fn models_attempt() -> Attempt {
    Attempt::new("models", MODELS, Prompt::user(""))
}

/// Fetch `/v1/models` with the bearer scheme.
///
/// # Errors
/// Returns `ProbeError::Remote` when the request fails or the body is not a model listing.
/// The probe result is handed back either way so callers can journal it.
pub async fn fetch_models(prober: &Prober) -> (ProbeResult, Result<ModelListing>) {
    let result = prober.probe(&models_attempt()).await;
    let listing = listing_from(&result);
    (result, listing)
}

fn listing_from(result: &ProbeResult) -> Result<ModelListing> {
    if let Some(failure) = result.failure() {
        return Err(ProbeError::remote(format!(
            "Failed to list models from {}: {}",
            result.url, failure
        )));
    }

    let raw = result
        .json()
        .cloned()
        .ok_or_else(|| ProbeError::remote("Model listing had no JSON body"))?;
    let parsed: ModelsResponse = serde_json::from_value(raw.clone())?;

    Ok(ModelListing {
        models: parsed.data,
        raw,
    })
}

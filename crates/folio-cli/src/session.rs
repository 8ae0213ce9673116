//! A user session: the catalog plus the tracker that enriches it.

use std::sync::Arc;

use serde::Serialize;

use folio::{
    classify, Catalog, CatalogError, Dispatch, EnrichmentState, EnrichmentTracker,
    GeminiClient, RenderUnit, TextGenerator, TrackerConfig,
};

use crate::config::Settings;

/// One entity's enrichment state together with its display units.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentReport {
    pub key: String,
    pub title: String,
    #[serde(flatten)]
    pub state: EnrichmentState,
    /// Classified result text; empty unless the state is `succeeded`.
    pub units: Vec<RenderUnit>,
}

/// Owns the entity catalog and the tracker for one session.
#[derive(Clone)]
pub struct Session {
    catalog: Arc<Catalog>,
    tracker: EnrichmentTracker,
}

impl Session {
    /// Load the catalog and build a Gemini-backed tracker.
    pub fn open(settings: &Settings) -> anyhow::Result<Self> {
        let catalog = settings.catalog.load()?;
        let client = GeminiClient::new(settings.gemini_config()?)?;

        tracing::info!(
            "Session opened: {} entities from {}, model {}",
            catalog.len(),
            settings.catalog.describe(),
            settings.model
        );

        Ok(Self::with_generator(
            catalog,
            Arc::new(client),
            settings.tracker_config(),
        ))
    }

    pub fn with_generator(
        catalog: Catalog,
        generator: Arc<dyn TextGenerator>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            tracker: EnrichmentTracker::with_config(generator, config),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn tracker(&self) -> &EnrichmentTracker {
        &self.tracker
    }

    /// Fire an enrichment request for a catalog entity.
    pub fn request(&self, key: &str) -> Result<Dispatch, CatalogError> {
        let entity = self.catalog.require(key)?;
        Ok(self.tracker.request_enrichment(entity))
    }

    /// Current report for a catalog entity.
    pub fn report(&self, key: &str) -> Result<EnrichmentReport, CatalogError> {
        let entity = self.catalog.require(key)?;
        Ok(build_report(
            entity.key(),
            entity.title(),
            self.tracker.state(key),
        ))
    }

    /// Reports for every catalog entity, in catalog order.
    pub fn reports(&self) -> Vec<EnrichmentReport> {
        self.catalog
            .iter()
            .map(|e| build_report(e.key(), e.title(), self.tracker.state(e.key())))
            .collect()
    }

    /// Request every key at once and wait until all of them settle.
    ///
    /// Unknown keys are rejected before anything is sent.
    pub async fn enrich_and_wait(
        &self,
        keys: &[String],
    ) -> Result<Vec<EnrichmentReport>, CatalogError> {
        for key in keys {
            self.catalog.require(key)?;
        }
        for key in keys {
            self.request(key)?;
        }

        futures::future::join_all(keys.iter().map(|key| self.tracker.wait_until_settled(key)))
            .await;

        keys.iter().map(|key| self.report(key)).collect()
    }
}

fn build_report(key: &str, title: &str, state: EnrichmentState) -> EnrichmentReport {
    let units = state.result().map(classify).unwrap_or_default();
    EnrichmentReport {
        key: key.to_string(),
        title: title.to_string(),
        state,
        units,
    }
}

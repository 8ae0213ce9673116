//! Core data types for entities, enrichment state, and rendered text.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// A project shown on the profile page and the unit of enrichment.
///
/// Entities are immutable once built; the constructor enforces a non-empty
/// key and title and at least one detail line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EntityRecord", into = "EntityRecord")]
pub struct Entity {
    key: String,
    title: String,
    summary: Option<String>,
    details: Vec<String>,
}

/// Wire form of [`Entity`] as it appears in catalog files.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntityRecord {
    id: String,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    details: Vec<String>,
}

impl Entity {
    pub fn new(
        key: impl Into<String>,
        title: impl Into<String>,
        details: Vec<String>,
    ) -> Result<Self, CatalogError> {
        let key = key.into();
        let title = title.into();

        if key.trim().is_empty() {
            return Err(CatalogError::EmptyKey);
        }
        if title.trim().is_empty() {
            return Err(CatalogError::EmptyTitle(key));
        }
        if details.is_empty() {
            return Err(CatalogError::NoDetails(key));
        }

        Ok(Self {
            key,
            title,
            summary: None,
            details,
        })
    }

    /// Attach the one-line blurb shown on the front of a project card.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn details(&self) -> &[String] {
        &self.details
    }
}

impl TryFrom<EntityRecord> for Entity {
    type Error = CatalogError;

    fn try_from(record: EntityRecord) -> Result<Self, Self::Error> {
        let entity = Entity::new(record.id, record.title, record.details)?;
        Ok(match record.summary {
            Some(summary) => entity.with_summary(summary),
            None => entity,
        })
    }
}

impl From<Entity> for EntityRecord {
    fn from(entity: Entity) -> Self {
        Self {
            id: entity.key,
            title: entity.title,
            summary: entity.summary,
            details: entity.details,
        }
    }
}

/// Coarse lifecycle position of one entity's enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Idle,
    InFlight,
    Succeeded,
    Failed,
}

impl EnrichmentStatus {
    /// Whether the status ends a request cycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::InFlight => "in_flight",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.pad(s)
    }
}

/// Per-entity enrichment state.
///
/// The result text and the error message live inside their variants, so a
/// state can never carry both, and entering `InFlight` drops whatever the
/// previous cycle produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrichmentState {
    #[default]
    Idle,
    InFlight,
    Succeeded {
        result: String,
    },
    Failed {
        error_message: String,
    },
}

impl EnrichmentState {
    pub fn status(&self) -> EnrichmentStatus {
        match self {
            Self::Idle => EnrichmentStatus::Idle,
            Self::InFlight => EnrichmentStatus::InFlight,
            Self::Succeeded { .. } => EnrichmentStatus::Succeeded,
            Self::Failed { .. } => EnrichmentStatus::Failed,
        }
    }

    pub fn result(&self) -> Option<&str> {
        match self {
            Self::Succeeded { result } => Some(result),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failed { error_message } => Some(error_message),
            _ => None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight)
    }
}

/// How a block of text should be laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Ordered,
    Unordered,
    Paragraph,
}

/// One display-ready block produced by [`crate::classify`].
///
/// For list kinds `items` are list entries with their markers removed; for
/// `Paragraph` they are the original lines, one paragraph each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderUnit {
    pub kind: UnitKind,
    pub items: Vec<String>,
}

impl RenderUnit {
    pub fn new(kind: UnitKind, items: Vec<String>) -> Self {
        Self { kind, items }
    }
}

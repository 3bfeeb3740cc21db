use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Direction, EntityType, SearchCriterion};

/// User-visible progress and error notices, rendered by a [`crate::StatusSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StatusMessage {
    Loading {
        entity_type: EntityType,
        id: String,
    },
    Loaded {
        entity_type: EntityType,
        id: String,
    },
    LoadingClusterFor {
        id: String,
    },
    LoadedClusterFor {
        id: String,
    },
    NoClusterFor {
        id: String,
    },
    LoadingNeighbors {
        entity_type: EntityType,
        id: String,
        direction: Direction,
    },
    LoadedNeighbors {
        entity_type: EntityType,
        id: String,
        direction: Direction,
    },
    LoadingTagsFor {
        entity_type: EntityType,
        id: String,
    },
    LoadedTagsFor {
        entity_type: EntityType,
        id: String,
    },
    LoadingClusterAddresses {
        id: String,
        limit: usize,
    },
    LoadedClusterAddresses {
        id: String,
        count: usize,
    },
    SearchingNeighbors {
        entity_type: EntityType,
        id: String,
        direction: Direction,
        criterion: SearchCriterion,
    },
    FoundNeighbors {
        count: usize,
        criterion: SearchCriterion,
    },
    RemovedNode {
        entity_type: EntityType,
        id: String,
    },
    SearchFailed {
        keyspace: Option<String>,
        message: String,
    },
    Error {
        message: String,
    },
}

impl StatusMessage {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            StatusMessage::Error { .. } | StatusMessage::SearchFailed { .. }
        )
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMessage::Loading { entity_type, id } => {
                write!(f, "Loading {} {} ...", entity_type, id)
            }
            StatusMessage::Loaded { entity_type, id } => write!(f, "Loaded {} {}", entity_type, id),
            StatusMessage::LoadingClusterFor { id } => {
                write!(f, "Loading cluster for address {} ...", id)
            }
            StatusMessage::LoadedClusterFor { id } => write!(f, "Loaded cluster for address {}", id),
            StatusMessage::NoClusterFor { id } => write!(f, "Address {} has no cluster", id),
            StatusMessage::LoadingNeighbors {
                entity_type,
                id,
                direction,
            } => write!(f, "Loading {} neighbors of {} {} ...", direction, entity_type, id),
            StatusMessage::LoadedNeighbors {
                entity_type,
                id,
                direction,
            } => write!(f, "Loaded {} neighbors of {} {}", direction, entity_type, id),
            StatusMessage::LoadingTagsFor { entity_type, id } => {
                write!(f, "Loading tags for {} {} ...", entity_type, id)
            }
            StatusMessage::LoadedTagsFor { entity_type, id } => {
                write!(f, "Loaded tags for {} {}", entity_type, id)
            }
            StatusMessage::LoadingClusterAddresses { id, limit } => {
                write!(f, "Loading {} addresses of cluster {} ...", limit, id)
            }
            StatusMessage::LoadedClusterAddresses { id, count } => {
                write!(f, "Loaded {} addresses of cluster {}", count, id)
            }
            StatusMessage::SearchingNeighbors {
                entity_type,
                id,
                direction,
                criterion,
            } => write!(
                f,
                "Searching {} neighbors of {} {} for {} ...",
                direction, entity_type, id, criterion
            ),
            StatusMessage::FoundNeighbors { count, criterion } => {
                write!(f, "Found {} paths to {}", count, criterion)
            }
            StatusMessage::RemovedNode { entity_type, id } => {
                write!(f, "Removed {} {} from graph", entity_type, id)
            }
            StatusMessage::SearchFailed { keyspace, message } => match keyspace {
                Some(ks) => write!(f, "Search in {} failed: {}", ks.to_uppercase(), message),
                None => write!(f, "Search failed: {}", message),
            },
            StatusMessage::Error { message } => write!(f, "Error: {}", message),
        }
    }
}

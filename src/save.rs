use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};
use serde_json::Map;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::records::{
    DIAGRAM_ATTRIBUTE, NewRecord, RELATIONSHIP_CATEGORY, RecordStore, RecordUpdate, WorldRecord,
};
use crate::schema::{DiagramBlob, SchemaError};

const EVENT_CAPACITY: usize = 64;

/// Broadcast after every successful save so list views can refresh
/// without querying the store again.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagramSaved {
    pub record: WorldRecord,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveTarget {
    /// Overwrites the diagram attribute of an existing relationship record.
    Existing { record_id: String },
    /// Creates the relationship record together with its first diagram.
    New {
        project_id: String,
        name: String,
        description: Option<String>,
        tags: Vec<String>,
    },
}

impl SaveTarget {
    fn key(&self) -> String {
        match self {
            SaveTarget::Existing { record_id } => record_id.clone(),
            SaveTarget::New {
                project_id, name, ..
            } => format!("new:{project_id}:{name}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("a save for '{0}' is already in progress")]
    InFlight(String),
    #[error("relationship '{0}' does not exist")]
    NotFound(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("record store rejected the diagram: {0:#}")]
    Gateway(anyhow::Error),
}

/// Hands diagram snapshots to the record store, one save per diagram at a
/// time. Last save wins; nothing is merged.
#[derive(Debug)]
pub struct DiagramSaver<S> {
    store: Arc<S>,
    in_flight: Mutex<HashSet<String>>,
    events: broadcast::Sender<DiagramSaved>,
}

struct InFlightGuard<'a> {
    keys: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl<S: RecordStore> DiagramSaver<S> {
    pub fn new(store: Arc<S>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            in_flight: Mutex::new(HashSet::new()),
            events,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiagramSaved> {
        self.events.subscribe()
    }

    pub fn is_in_flight(&self, record_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(record_id)
    }

    fn begin(&self, key: String) -> Result<InFlightGuard<'_>, SaveError> {
        let mut keys = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !keys.insert(key.clone()) {
            return Err(SaveError::InFlight(key));
        }
        Ok(InFlightGuard {
            keys: &self.in_flight,
            key,
        })
    }

    /// Persists a snapshot. On failure nothing is retried; the caller's
    /// session is left as it was.
    pub async fn save(&self, target: SaveTarget, blob: &DiagramBlob) -> Result<WorldRecord, SaveError> {
        let _guard = self.begin(target.key())?;
        let diagram = serde_json::to_value(blob).map_err(SchemaError::from)?;
        let mut attributes = Map::new();
        attributes.insert(DIAGRAM_ATTRIBUTE.to_string(), diagram);

        let record = match target {
            SaveTarget::Existing { record_id } => self
                .store
                .update(
                    &record_id,
                    RecordUpdate {
                        attributes,
                        ..RecordUpdate::default()
                    },
                )
                .await
                .map_err(SaveError::Gateway)?
                .ok_or_else(|| SaveError::NotFound(record_id.clone()))?,
            SaveTarget::New {
                project_id,
                name,
                description,
                tags,
            } => self
                .store
                .insert(NewRecord {
                    project_id,
                    category: RELATIONSHIP_CATEGORY.to_string(),
                    name,
                    description,
                    tags,
                    attributes,
                })
                .await
                .map_err(SaveError::Gateway)?,
        };

        info!(
            "saved diagram for relationship '{}' ({} nodes, {} connections)",
            record.id,
            blob.nodes.len(),
            blob.connections.len()
        );
        let event = DiagramSaved {
            project_id: record.project_id.clone(),
            record: record.clone(),
        };
        if self.events.send(event).is_err() {
            debug!("no listeners for diagram saved event");
        }
        Ok(record)
    }
}

use std::future::Future;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::database::Database;
use crate::diagram::PlaceableEntity;

/// Category of the records that own a diagram.
pub const RELATIONSHIP_CATEGORY: &str = "relationship";
/// Attribute key under which a relationship keeps its diagram blob.
pub const DIAGRAM_ATTRIBUTE: &str = "diagram";

/// Generic "world element" record. Characters, items, relationships and the
/// rest only differ by `category` and the contents of `attributes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldRecord {
    pub id: String,
    pub project_id: String,
    pub category: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorldRecord {
    pub fn is_relationship(&self) -> bool {
        self.category == RELATIONSHIP_CATEGORY
    }

    pub fn diagram_blob(&self) -> Option<&Value> {
        self.attributes.get(DIAGRAM_ATTRIBUTE)
    }

    pub fn to_entity(&self) -> PlaceableEntity {
        PlaceableEntity {
            id: self.id.clone(),
            name: self.name.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    pub project_id: String,
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Fields left as `None` are kept. Attributes are merged key by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Persistence gateway for world records.
pub trait RecordStore: Send + Sync {
    fn insert(&self, record: NewRecord) -> impl Future<Output = Result<WorldRecord>> + Send;

    /// Returns `None` when no record has the given id.
    fn update(
        &self,
        id: &str,
        update: RecordUpdate,
    ) -> impl Future<Output = Result<Option<WorldRecord>>> + Send;

    fn get(&self, id: &str) -> impl Future<Output = Result<Option<WorldRecord>>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Records of a project ordered by name, optionally restricted to one category.
    fn list(
        &self,
        project_id: &str,
        category: Option<&str>,
    ) -> impl Future<Output = Result<Vec<WorldRecord>>> + Send;

    /// Everything in a project that can be placed on a relationship canvas.
    fn list_entities(
        &self,
        project_id: &str,
    ) -> impl Future<Output = Result<Vec<PlaceableEntity>>> + Send {
        async move {
            let records = self.list(project_id, None).await?;
            Ok(records
                .iter()
                .filter(|record| !record.is_relationship())
                .map(WorldRecord::to_entity)
                .collect())
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct WorldRecordRow {
    id: String,
    project_id: String,
    category: String,
    name: String,
    description: Option<String>,
    tags: String,
    attributes: String,
    created_at: String,
    updated_at: String,
}

impl WorldRecordRow {
    fn into_record(self) -> Result<WorldRecord> {
        let tags = serde_json::from_str(&self.tags)
            .with_context(|| format!("record '{}' has malformed tags", self.id))?;
        let attributes = serde_json::from_str(&self.attributes)
            .with_context(|| format!("record '{}' has malformed attributes", self.id))?;
        Ok(WorldRecord {
            created_at: self.created_at.parse().unwrap_or_else(|_| Utc::now()),
            updated_at: self.updated_at.parse().unwrap_or_else(|_| Utc::now()),
            id: self.id,
            project_id: self.project_id,
            category: self.category,
            name: self.name,
            description: self.description,
            tags,
            attributes,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, project_id, category, name, description, tags, attributes, created_at, updated_at FROM world_elements";

impl SqliteRecordStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: &str) -> Result<Option<WorldRecord>> {
        let row: Option<WorldRecordRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get record")?;
        row.map(WorldRecordRow::into_record).transpose()
    }
}

impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: NewRecord) -> Result<WorldRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let tags = serde_json::to_string(&record.tags)?;
        let attributes = serde_json::to_string(&record.attributes)?;

        sqlx::query(
            r#"INSERT INTO world_elements (id, project_id, category, name, description, tags, attributes, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(&record.project_id)
        .bind(&record.category)
        .bind(&record.name)
        .bind(&record.description)
        .bind(&tags)
        .bind(&attributes)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to insert record")?;

        debug!("inserted {} record '{id}'", record.category);
        Ok(WorldRecord {
            id,
            project_id: record.project_id,
            category: record.category,
            name: record.name,
            description: record.description,
            tags: record.tags,
            attributes: record.attributes,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update(&self, id: &str, update: RecordUpdate) -> Result<Option<WorldRecord>> {
        let Some(mut record) = self.fetch(id).await? else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            record.name = name;
        }
        if let Some(description) = update.description {
            record.description = Some(description);
        }
        if let Some(tags) = update.tags {
            record.tags = tags;
        }
        record.attributes.extend(update.attributes);
        record.updated_at = Utc::now();

        sqlx::query(
            r#"UPDATE world_elements
               SET name = ?, description = ?, tags = ?, attributes = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&record.name)
        .bind(&record.description)
        .bind(serde_json::to_string(&record.tags)?)
        .bind(serde_json::to_string(&record.attributes)?)
        .bind(record.updated_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update record")?;

        Ok(Some(record))
    }

    async fn get(&self, id: &str) -> Result<Option<WorldRecord>> {
        self.fetch(id).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM world_elements WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete record")?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn list(&self, project_id: &str, category: Option<&str>) -> Result<Vec<WorldRecord>> {
        let rows: Vec<WorldRecordRow> = match category {
            Some(category) => {
                sqlx::query_as(&format!(
                    "{SELECT_COLUMNS} WHERE project_id = ? AND category = ? ORDER BY name COLLATE NOCASE"
                ))
                .bind(project_id)
                .bind(category)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(&format!(
                    "{SELECT_COLUMNS} WHERE project_id = ? ORDER BY name COLLATE NOCASE"
                ))
                .bind(project_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to list records")?;

        rows.into_iter().map(WorldRecordRow::into_record).collect()
    }
}

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;

use crate::database::{Database, DatabaseConfig};
use crate::records::RELATIONSHIP_CATEGORY;
use crate::render::frame_diagram;
use crate::schema;
use crate::*;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5151;

/// Arguments for running the loreboard web server
#[derive(Debug, Clone, Parser)]
#[command(
    name = "loreboard serve",
    about = "Serve relationship records and their diagrams over HTTP."
)]
pub struct ServeArgs {
    /// SQLite database holding the world records. Falls back to LOREBOARD_DB_PATH.
    #[arg(short = 'd', long = "database")]
    pub database: Option<PathBuf>,

    /// Address to bind the HTTP server to. Falls back to LOREBOARD_HOST.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on. Falls back to LOREBOARD_PORT.
    #[arg(long)]
    pub port: Option<u16>,

    /// Background color for rendered SVG previews.
    #[arg(long = "background-color", default_value = "#f9fafb")]
    pub background_color: String,
}

impl ServeArgs {
    fn address(&self) -> Result<String> {
        let host = match &self.host {
            Some(host) => host.clone(),
            None => env::var("LOREBOARD_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
        };
        let port = match self.port {
            Some(port) => port,
            None => match env::var("LOREBOARD_PORT") {
                Ok(raw) => raw
                    .parse()
                    .with_context(|| format!("LOREBOARD_PORT '{raw}' is not a valid port"))?,
                Err(_) => DEFAULT_PORT,
            },
        };
        Ok(format!("{host}:{port}"))
    }

    fn database_config(&self) -> DatabaseConfig {
        let mut config = DatabaseConfig::default();
        if let Some(path) = &self.database {
            config.path = path.clone();
        }
        config
    }
}

pub struct ServeState {
    saver: DiagramSaver<SqliteRecordStore>,
    background: String,
}

impl ServeState {
    pub fn new(store: SqliteRecordStore, background: impl Into<String>) -> Self {
        Self {
            saver: DiagramSaver::new(Arc::new(store)),
            background: background.into(),
        }
    }

    fn store(&self) -> &SqliteRecordStore {
        self.saver.store()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiagramSaved> {
        self.saver.subscribe()
    }

    async fn relationship(&self, id: &str) -> Result<WorldRecord, (StatusCode, String)> {
        match self.store().get(id).await.map_err(internal_error)? {
            Some(record) if record.is_relationship() => Ok(record),
            _ => Err(not_found(id)),
        }
    }

    async fn load_diagram(&self, id: &str) -> Result<Diagram, (StatusCode, String)> {
        let record = self.relationship(id).await?;
        schema::deserialize(record.diagram_blob().unwrap_or(&Value::Null))
            .with_context(|| format!("stored diagram of '{id}' is unreadable"))
            .map_err(internal_error)
    }
}

pub fn router(state: Arc<ServeState>) -> Router {
    Router::new()
        .route("/api/projects/:project/entities", get(list_entities))
        .route(
            "/api/projects/:project/relationships",
            get(list_relationships).post(create_relationship),
        )
        .route(
            "/api/relationships/:id",
            get(get_relationship).delete(delete_relationship),
        )
        .route("/api/relationships/:id/diagram", get(get_diagram).put(put_diagram))
        .route("/api/relationships/:id/diagram/svg", get(get_svg))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let addr = args.address()?;
    let database = Database::new(args.database_config()).await?;
    let state = Arc::new(ServeState::new(
        SqliteRecordStore::new(&database),
        args.background_color.clone(),
    ));
    spawn_save_log(state.subscribe());

    let app = router(state);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;

    println!("loreboard server listening on http://{addr}");
    println!("Using database {}", database.config().path.display());
    println!("Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}

fn spawn_save_log(mut events: broadcast::Receiver<DiagramSaved>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(
                    "project '{}': relationship '{}' saved",
                    event.project_id, event.record.name
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("save log fell behind, {skipped} events dropped")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[derive(Debug, Deserialize)]
struct CreateRelationshipRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    diagram: Value,
}

#[derive(Debug, Default, Deserialize)]
struct SvgQuery {
    #[serde(default)]
    overview: bool,
}

async fn list_entities(
    State(state): State<Arc<ServeState>>,
    AxumPath(project_id): AxumPath<String>,
) -> Result<Json<Vec<PlaceableEntity>>, (StatusCode, String)> {
    let entities = state
        .store()
        .list_entities(&project_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(entities))
}

async fn list_relationships(
    State(state): State<Arc<ServeState>>,
    AxumPath(project_id): AxumPath<String>,
) -> Result<Json<Vec<WorldRecord>>, (StatusCode, String)> {
    let records = state
        .store()
        .list(&project_id, Some(RELATIONSHIP_CATEGORY))
        .await
        .map_err(internal_error)?;
    Ok(Json(records))
}

async fn create_relationship(
    State(state): State<Arc<ServeState>>,
    AxumPath(project_id): AxumPath<String>,
    Json(request): Json<CreateRelationshipRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "relationship name must not be empty".to_string(),
        ));
    }
    let diagram = schema::deserialize(&request.diagram).map_err(bad_request)?;

    let record = state
        .saver
        .save(
            SaveTarget::New {
                project_id,
                name: name.to_string(),
                description: request.description,
                tags: request.tags,
            },
            &schema::serialize(&diagram),
        )
        .await
        .map_err(save_error)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_relationship(
    State(state): State<Arc<ServeState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<WorldRecord>, (StatusCode, String)> {
    Ok(Json(state.relationship(&id).await?))
}

async fn delete_relationship(
    State(state): State<Arc<ServeState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.relationship(&id).await?;
    if state.store().delete(&id).await.map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&id))
    }
}

async fn get_diagram(
    State(state): State<Arc<ServeState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<DiagramBlob>, (StatusCode, String)> {
    let diagram = state.load_diagram(&id).await?;
    Ok(Json(schema::serialize(&diagram)))
}

async fn put_diagram(
    State(state): State<Arc<ServeState>>,
    AxumPath(id): AxumPath<String>,
    Json(payload): Json<Value>,
) -> Result<Json<WorldRecord>, (StatusCode, String)> {
    let diagram = schema::deserialize(&payload).map_err(bad_request)?;
    state.relationship(&id).await?;

    let record = state
        .saver
        .save(
            SaveTarget::Existing { record_id: id },
            &schema::serialize(&diagram),
        )
        .await
        .map_err(save_error)?;
    Ok(Json(record))
}

async fn get_svg(
    State(state): State<Arc<ServeState>>,
    AxumPath(id): AxumPath<String>,
    Query(query): Query<SvgQuery>,
) -> Result<Response, (StatusCode, String)> {
    let diagram = state.load_diagram(&id).await?;

    let svg = if query.overview {
        let options = RenderOptions {
            background: state.background.clone(),
            ..RenderOptions::default()
        };
        render_overview_svg(&diagram, &options)
    } else {
        let (viewport, width, height) = frame_diagram(&diagram);
        let options = RenderOptions {
            width,
            height,
            background: state.background.clone(),
            ..RenderOptions::default()
        };
        render_svg(&Scene::new(&diagram, &viewport), &options)
    }
    .map_err(internal_error)?;

    let mut response = Response::new(svg.into());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("image/svg+xml"),
    );
    Ok(response)
}

fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}

fn bad_request(err: SchemaError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, err.to_string())
}

fn not_found(id: &str) -> (StatusCode, String) {
    (
        StatusCode::NOT_FOUND,
        format!("relationship '{id}' does not exist"),
    )
}

fn save_error(err: SaveError) -> (StatusCode, String) {
    let status = match &err {
        SaveError::InFlight(_) => StatusCode::CONFLICT,
        SaveError::NotFound(_) => StatusCode::NOT_FOUND,
        SaveError::Schema(_) => StatusCode::BAD_REQUEST,
        SaveError::Gateway(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::NewRecord;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn app() -> (TempDir, Arc<ServeState>, Router) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(DatabaseConfig::at(temp_dir.path().join("serve.db")))
            .await
            .unwrap();
        let state = Arc::new(ServeState::new(SqliteRecordStore::new(&db), "#ffffff"));
        let app = router(state.clone());
        (temp_dir, state, app)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    fn legacy_blob() -> Value {
        json!({
            "nodes": [
                {"id": "c1", "type": "character", "name": "Ayla", "x": 0, "y": 0},
                {"id": "c2", "type": "character", "name": "Bren", "x": 400, "y": 0}
            ],
            "edges": [
                {"source": "c1", "target": "c2", "type": "romance"}
            ]
        })
    }

    #[tokio::test]
    async fn created_relationship_serves_a_normalized_diagram() {
        let (_dir, _state, app) = app().await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/projects/p1/relationships",
            Some(json!({"name": "Lovers", "diagram": legacy_blob()})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let record: WorldRecord = serde_json::from_slice(&body).unwrap();
        assert!(record.is_relationship());

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/relationships/{}/diagram", record.id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let blob: DiagramBlob = serde_json::from_slice(&body).unwrap();
        assert_eq!(blob.schema_version, schema::SCHEMA_VERSION);
        assert_eq!(blob.nodes.len(), 2);
        assert_eq!(blob.connections.len(), 1);
        assert_eq!(blob.connections[0].from_node_id, "c1");
        assert_eq!(blob.connections[0].label, "romance");

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/relationships/{}/diagram/svg", record.id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let svg = String::from_utf8(body).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains(">Ayla<"));
    }

    #[tokio::test]
    async fn put_rejects_malformed_blobs_and_unknown_records() {
        let (_dir, state, app) = app().await;
        let record = state
            .saver
            .save(
                SaveTarget::New {
                    project_id: "p1".to_string(),
                    name: "Court".to_string(),
                    description: None,
                    tags: Vec::new(),
                },
                &schema::serialize(&Diagram::new()),
            )
            .await
            .unwrap();
        let uri = format!("/api/relationships/{}/diagram", record.id);

        let (status, _) = send(&app, Method::PUT, &uri, Some(json!([1, 2, 3]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::PUT, &uri, Some(legacy_blob())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            Method::PUT,
            "/api/relationships/missing/diagram",
            Some(legacy_blob()),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, &format!("/api/relationships/{}", record.id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn entity_listing_hides_relationships() {
        let (_dir, state, app) = app().await;
        state
            .store()
            .insert(NewRecord {
                project_id: "p1".to_string(),
                category: "character".to_string(),
                name: "Ayla".to_string(),
                ..NewRecord::default()
            })
            .await
            .unwrap();
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/projects/p1/relationships",
            Some(json!({"name": "Web"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, Method::GET, "/api/projects/p1/entities", None).await;
        assert_eq!(status, StatusCode::OK);
        let entities: Vec<PlaceableEntity> = serde_json::from_slice(&body).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "Ayla");

        let (_, body) = send(&app, Method::GET, "/api/projects/p1/relationships", None).await;
        let relationships: Vec<WorldRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(relationships.len(), 1);
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let (_dir, _state, app) = app().await;
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/projects/p1/relationships",
            Some(json!({"name": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

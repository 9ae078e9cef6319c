//! Persisted JSON shape of a diagram.
//!
//! Loading runs two passes. Blobs older than [`SCHEMA_VERSION`] first go
//! through [`migrate_legacy`], which folds the field aliases older editors
//! wrote into the current names. Every blob then goes through the
//! per-field defaulting in `NodeRecord::into_node` and
//! `ConnectionRecord::into_connection`, whatever its version.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::diagram::{
    Connection, ConnectionStyle, DEFAULT_ARROW_SIZE, DEFAULT_STROKE_WIDTH, DEFAULT_TEXT_COLOR,
    DashPattern, Diagram, Node, NodeKind, RelationshipType, clamp_stroke_width,
    is_placeholder_label,
};
use crate::geometry::{Point, Size};
use crate::{NODE_HEIGHT, NODE_WIDTH};

pub const SCHEMA_VERSION: u32 = 2;

const FROM_ALIASES: &[&str] = &[
    "from",
    "source",
    "sourceId",
    "sourceNodeId",
    "fromId",
    "fromNode",
    "start",
    "startNodeId",
    "origin",
];
const TO_ALIASES: &[&str] = &[
    "to",
    "target",
    "targetId",
    "targetNodeId",
    "toId",
    "toNode",
    "end",
    "endNodeId",
    "destination",
];
const CONNECTION_LIST_ALIASES: &[&str] = &["edges", "links", "relationships"];

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("diagram blob must be a JSON object, found {0}")]
    NotAnObject(&'static str),
    #[error("diagram blob is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramBlob {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    #[serde(default)]
    pub id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub relationship_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_arrow: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_reverse_arrow: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrow_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_arrow_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrow_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_arrow_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_directional: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_dasharray: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn positive(value: Option<f32>) -> Option<f32> {
    value.filter(|number| number.is_finite() && *number > 0.0)
}

impl NodeRecord {
    fn from_node(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            kind: node.kind.as_str().to_string(),
            name: node.name.clone(),
            x: node.position.x,
            y: node.position.y,
            width: Some(node.size.width),
            height: Some(node.size.height),
            color: node.color.clone(),
        }
    }

    fn into_node(self) -> Node {
        let name = if self.name.trim().is_empty() {
            self.id.clone()
        } else {
            self.name
        };
        let x = if self.x.is_finite() { self.x } else { 0.0 };
        let y = if self.y.is_finite() { self.y } else { 0.0 };
        let mut node = Node::new(self.id, NodeKind::parse(&self.kind), name, Point::new(x, y));
        node.size = Size::new(
            positive(self.width).unwrap_or(NODE_WIDTH),
            positive(self.height).unwrap_or(NODE_HEIGHT),
        );
        node.color = non_empty(self.color);
        node
    }
}

impl ConnectionRecord {
    fn from_connection(connection: &Connection) -> Self {
        let style = &connection.style;
        Self {
            id: connection.id.clone(),
            from_node_id: connection.from_node_id.clone(),
            to_node_id: connection.to_node_id.clone(),
            label: connection.label.clone(),
            relationship_type: connection.relationship_type.as_str().to_string(),
            color: Some(style.color.clone()),
            text_color: Some(style.text_color.clone()),
            has_arrow: Some(style.has_arrow),
            has_reverse_arrow: Some(style.has_reverse_arrow),
            arrow_size: Some(style.arrow_size),
            reverse_arrow_size: Some(style.reverse_arrow_size),
            arrow_color: Some(style.arrow_color.clone()),
            reverse_arrow_color: Some(style.reverse_arrow_color.clone()),
            is_directional: Some(connection.is_directional()),
            stroke_width: Some(style.stroke_width),
            stroke_dasharray: style.dash_pattern.dasharray().map(str::to_string),
        }
    }

    fn into_connection(self) -> Connection {
        let relationship_type = RelationshipType::parse(&self.relationship_type);
        let color = non_empty(self.color)
            .unwrap_or_else(|| relationship_type.default_color().to_string());

        let label = if relationship_type != RelationshipType::Custom {
            if is_placeholder_label(&self.label) {
                relationship_type.default_label().to_string()
            } else {
                self.label
            }
        } else if self.label.trim().is_empty() && !self.relationship_type.trim().is_empty() {
            // Unknown tags read as custom; keep the tag text visible.
            self.relationship_type.trim().to_string()
        } else {
            self.label
        };

        let id = if self.id.trim().is_empty() {
            format!("{}-{}", self.from_node_id, self.to_node_id)
        } else {
            self.id
        };

        let style = ConnectionStyle {
            text_color: non_empty(self.text_color).unwrap_or_else(|| DEFAULT_TEXT_COLOR.to_string()),
            stroke_width: self.stroke_width.map(clamp_stroke_width).unwrap_or(DEFAULT_STROKE_WIDTH),
            dash_pattern: self
                .stroke_dasharray
                .as_deref()
                .map(DashPattern::from_dasharray)
                .unwrap_or_default(),
            has_arrow: self.has_arrow.or(self.is_directional).unwrap_or(true),
            has_reverse_arrow: self.has_reverse_arrow.unwrap_or(false),
            arrow_size: positive(self.arrow_size).unwrap_or(DEFAULT_ARROW_SIZE),
            reverse_arrow_size: positive(self.reverse_arrow_size).unwrap_or(DEFAULT_ARROW_SIZE),
            arrow_color: non_empty(self.arrow_color).unwrap_or_else(|| color.clone()),
            reverse_arrow_color: non_empty(self.reverse_arrow_color).unwrap_or_else(|| color.clone()),
            color,
        };

        Connection {
            id,
            from_node_id: self.from_node_id,
            to_node_id: self.to_node_id,
            label,
            relationship_type,
            style,
        }
    }
}

pub fn serialize(diagram: &Diagram) -> DiagramBlob {
    DiagramBlob {
        schema_version: SCHEMA_VERSION,
        nodes: diagram.nodes().iter().map(NodeRecord::from_node).collect(),
        connections: diagram
            .connections()
            .iter()
            .map(ConnectionRecord::from_connection)
            .collect(),
    }
}

pub fn to_value(diagram: &Diagram) -> Result<Value, SchemaError> {
    Ok(serde_json::to_value(serialize(diagram))?)
}

pub fn to_json_string(diagram: &Diagram) -> Result<String, SchemaError> {
    Ok(serde_json::to_string_pretty(&serialize(diagram))?)
}

pub fn from_json_str(text: &str) -> Result<Diagram, SchemaError> {
    let value: Value = serde_json::from_str(text)?;
    deserialize(&value)
}

/// Builds a diagram from a stored blob. `null` is an empty diagram and a
/// JSON string is parsed as an embedded document. Items that cannot be
/// read are skipped with a warning.
pub fn deserialize(value: &Value) -> Result<Diagram, SchemaError> {
    let mut map = match value {
        Value::Object(map) => map.clone(),
        Value::Null => return Ok(Diagram::new()),
        Value::String(text) => return from_json_str(text),
        Value::Bool(_) => return Err(SchemaError::NotAnObject("a boolean")),
        Value::Number(_) => return Err(SchemaError::NotAnObject("a number")),
        Value::Array(_) => return Err(SchemaError::NotAnObject("an array")),
    };

    let version = map
        .get("schemaVersion")
        .and_then(Value::as_u64)
        .unwrap_or(1);
    if version < u64::from(SCHEMA_VERSION) {
        migrate_legacy(&mut map);
    }

    let mut diagram = Diagram::new();

    for item in take_array(&mut map, "nodes") {
        match serde_json::from_value::<NodeRecord>(item) {
            Ok(record) => {
                let id = record.id.clone();
                if !diagram.place_node(record.into_node()) {
                    warn!("skipping duplicate node '{id}' in diagram blob");
                }
            }
            Err(err) => warn!("skipping unreadable node in diagram blob: {err}"),
        }
    }

    for item in take_array(&mut map, "connections") {
        match serde_json::from_value::<ConnectionRecord>(item) {
            Ok(record) => {
                if let Err(err) = diagram.restore_connection(record.into_connection()) {
                    warn!("dropping stored connection: {err}");
                }
            }
            Err(err) => warn!("skipping unreadable connection in diagram blob: {err}"),
        }
    }

    Ok(diagram)
}

fn take_array(map: &mut Map<String, Value>, key: &str) -> Vec<Value> {
    match map.remove(key) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            warn!("expected '{key}' to be an array, found {other}");
            Vec::new()
        }
    }
}

/// Rewrites a pre-versioned blob in place so it reads as the current schema.
pub fn migrate_legacy(map: &mut Map<String, Value>) {
    if !map.contains_key("connections") {
        for alias in CONNECTION_LIST_ALIASES {
            if let Some(list) = map.remove(*alias) {
                map.insert("connections".to_string(), list);
                break;
            }
        }
    }

    if let Some(Value::Array(nodes)) = map.get_mut("nodes") {
        for node in nodes.iter_mut() {
            if let Value::Object(node) = node {
                migrate_node(node);
            }
        }
    }
    if let Some(Value::Array(connections)) = map.get_mut("connections") {
        for connection in connections.iter_mut() {
            if let Value::Object(connection) = connection {
                migrate_connection(connection);
            }
        }
    }

    map.insert("schemaVersion".to_string(), Value::from(SCHEMA_VERSION));
}

fn migrate_node(node: &mut Map<String, Value>) {
    if let Some(id) = node.get("id").and_then(endpoint_id) {
        node.insert("id".to_string(), Value::String(id));
    }
    fold_alias(node, "name", &["label", "title"]);
    fold_alias(node, "type", &["category", "kind", "entityType"]);

    if let Some(Value::Object(position)) = node.remove("position") {
        for axis in ["x", "y"] {
            if let Some(value) = position.get(axis) {
                node.entry(axis).or_insert_with(|| value.clone());
            }
        }
    }
    if let Some(Value::Object(size)) = node.remove("size") {
        for dimension in ["width", "height"] {
            if let Some(value) = size.get(dimension) {
                node.entry(dimension).or_insert_with(|| value.clone());
            }
        }
    }
}

fn migrate_connection(connection: &mut Map<String, Value>) {
    fold_endpoint(connection, "fromNodeId", FROM_ALIASES);
    fold_endpoint(connection, "toNodeId", TO_ALIASES);
    fold_alias(connection, "type", &["relationshipType", "kind"]);
    fold_alias(connection, "label", &["title", "name"]);
    if let Some(id) = connection.get("id").and_then(endpoint_id) {
        connection.insert("id".to_string(), Value::String(id));
    }
}

fn fold_alias(object: &mut Map<String, Value>, canonical: &str, aliases: &[&str]) {
    if object.get(canonical).is_some_and(|value| !value.is_null()) {
        return;
    }
    for alias in aliases {
        if let Some(value) = object.get(*alias).filter(|value| !value.is_null()) {
            let value = value.clone();
            object.insert(canonical.to_string(), value);
            return;
        }
    }
}

fn fold_endpoint(object: &mut Map<String, Value>, canonical: &str, aliases: &[&str]) {
    let resolved = std::iter::once(canonical)
        .chain(aliases.iter().copied())
        .find_map(|key| object.get(key).and_then(endpoint_id));
    if let Some(id) = resolved {
        object.insert(canonical.to_string(), Value::String(id));
    }
}

/// Node reference written as a string, a number or an object with an `id`.
fn endpoint_id(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Object(object) => object.get("id").and_then(endpoint_id),
        _ => None,
    }
}

use chrono::{DateTime, Utc};
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Point, Rect, Size};
use crate::{NODE_HEIGHT, NODE_WIDTH};

/// Region (diagram space) in which freshly placed nodes land.
pub const PLACEMENT_MIN: Point = Point::new(50.0, 50.0);
pub const PLACEMENT_MAX: Point = Point::new(650.0, 450.0);

pub const MIN_STROKE_WIDTH: f32 = 1.0;
pub const MAX_STROKE_WIDTH: f32 = 8.0;
pub const DEFAULT_STROKE_WIDTH: f32 = 2.0;
pub const DEFAULT_ARROW_SIZE: f32 = 12.0;
pub const DEFAULT_TEXT_COLOR: &str = "#374151";

const PLACEHOLDER_LABELS: &[&str] = &[
    "connection",
    "new connection",
    "relationship",
    "new relationship",
    "label",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiagramError {
    #[error("node '{0}' is not on the canvas")]
    UnknownNode(String),
    #[error("connection '{0}' does not exist")]
    UnknownConnection(String),
    #[error("node '{0}' cannot be connected to itself")]
    SelfLoop(String),
}

/// A world entity that can be dropped onto the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceableEntity {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Category tag of a placed node. Only drives color and badge text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Character,
    Location,
    Item,
    MagicSystem,
    Faction,
    Event,
    Creature,
    Other(String),
}

impl NodeKind {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "character" | "characters" => NodeKind::Character,
            "location" | "locations" => NodeKind::Location,
            "item" | "items" => NodeKind::Item,
            "magic_system" | "magic_systems" | "magic" => NodeKind::MagicSystem,
            "faction" | "factions" => NodeKind::Faction,
            "event" | "events" => NodeKind::Event,
            "creature" | "creatures" => NodeKind::Creature,
            _ => NodeKind::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Character => "character",
            NodeKind::Location => "location",
            NodeKind::Item => "item",
            NodeKind::MagicSystem => "magic_system",
            NodeKind::Faction => "faction",
            NodeKind::Event => "event",
            NodeKind::Creature => "creature",
            NodeKind::Other(tag) => tag.as_str(),
        }
    }

    pub fn badge(&self) -> String {
        match self {
            NodeKind::Character => "Character".to_string(),
            NodeKind::Location => "Location".to_string(),
            NodeKind::Item => "Item".to_string(),
            NodeKind::MagicSystem => "Magic System".to_string(),
            NodeKind::Faction => "Faction".to_string(),
            NodeKind::Event => "Event".to_string(),
            NodeKind::Creature => "Creature".to_string(),
            NodeKind::Other(tag) if tag.is_empty() => "Entity".to_string(),
            NodeKind::Other(tag) => {
                let mut chars = tag.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        }
    }

    pub fn default_color(&self) -> &'static str {
        match self {
            NodeKind::Character => "#3b82f6",
            NodeKind::Location => "#10b981",
            NodeKind::Item => "#f59e0b",
            NodeKind::MagicSystem => "#8b5cf6",
            NodeKind::Faction => "#ef4444",
            NodeKind::Event => "#ec4899",
            NodeKind::Creature => "#14b8a6",
            NodeKind::Other(_) => "#6b7280",
        }
    }
}

impl From<String> for NodeKind {
    fn from(value: String) -> Self {
        NodeKind::parse(&value)
    }
}

impl From<NodeKind> for String {
    fn from(value: NodeKind) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipType {
    #[default]
    Friendship,
    Romance,
    Family,
    Rivalry,
    Conflict,
    Mentor,
    Alliance,
    Professional,
    Neutral,
    Custom,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 10] = [
        RelationshipType::Friendship,
        RelationshipType::Romance,
        RelationshipType::Family,
        RelationshipType::Rivalry,
        RelationshipType::Conflict,
        RelationshipType::Mentor,
        RelationshipType::Alliance,
        RelationshipType::Professional,
        RelationshipType::Neutral,
        RelationshipType::Custom,
    ];

    /// Lenient parse used on persisted data. Empty input reads as neutral,
    /// unknown tags keep their text as a custom label.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return RelationshipType::Neutral;
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .unwrap_or(RelationshipType::Custom)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Friendship => "friendship",
            RelationshipType::Romance => "romance",
            RelationshipType::Family => "family",
            RelationshipType::Rivalry => "rivalry",
            RelationshipType::Conflict => "conflict",
            RelationshipType::Mentor => "mentor",
            RelationshipType::Alliance => "alliance",
            RelationshipType::Professional => "professional",
            RelationshipType::Neutral => "neutral",
            RelationshipType::Custom => "custom",
        }
    }

    pub fn default_label(&self) -> &'static str {
        self.as_str()
    }

    pub fn default_color(&self) -> &'static str {
        match self {
            RelationshipType::Friendship => "#10b981",
            RelationshipType::Romance => "#ec4899",
            RelationshipType::Family => "#f59e0b",
            RelationshipType::Rivalry => "#f97316",
            RelationshipType::Conflict => "#ef4444",
            RelationshipType::Mentor => "#8b5cf6",
            RelationshipType::Alliance => "#3b82f6",
            RelationshipType::Professional => "#6366f1",
            RelationshipType::Neutral => "#6b7280",
            RelationshipType::Custom => "#64748b",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DashPattern {
    #[default]
    Solid,
    Dashed,
    Dotted,
    DashDot,
}

impl DashPattern {
    pub fn dasharray(&self) -> Option<&'static str> {
        match self {
            DashPattern::Solid => None,
            DashPattern::Dashed => Some("8,4"),
            DashPattern::Dotted => Some("2,4"),
            DashPattern::DashDot => Some("8,4,2,4"),
        }
    }

    /// Reads a stored `stroke-dasharray`. Anything unparseable is solid.
    pub fn from_dasharray(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "none" | "0" | "solid" => return DashPattern::Solid,
            "dashed" => return DashPattern::Dashed,
            "dotted" => return DashPattern::Dotted,
            "dash-dot" | "dashdot" => return DashPattern::DashDot,
            _ => {}
        }

        let values: Vec<f32> = trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .filter_map(|part| part.parse::<f32>().ok())
            .collect();

        match values.as_slice() {
            [dash, _] if *dash <= 2.0 => DashPattern::Dotted,
            [_, _] => DashPattern::Dashed,
            [_, _, _, _] => DashPattern::DashDot,
            _ => DashPattern::Solid,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStyle {
    pub color: String,
    pub text_color: String,
    pub stroke_width: f32,
    pub dash_pattern: DashPattern,
    pub has_arrow: bool,
    pub has_reverse_arrow: bool,
    pub arrow_size: f32,
    pub reverse_arrow_size: f32,
    pub arrow_color: String,
    pub reverse_arrow_color: String,
}

impl ConnectionStyle {
    /// Solid line with a single forward arrow in the type's color.
    pub fn for_type(relationship_type: RelationshipType) -> Self {
        let color = relationship_type.default_color().to_string();
        Self {
            text_color: DEFAULT_TEXT_COLOR.to_string(),
            stroke_width: DEFAULT_STROKE_WIDTH,
            dash_pattern: DashPattern::Solid,
            has_arrow: true,
            has_reverse_arrow: false,
            arrow_size: DEFAULT_ARROW_SIZE,
            reverse_arrow_size: DEFAULT_ARROW_SIZE,
            arrow_color: color.clone(),
            reverse_arrow_color: color.clone(),
            color,
        }
    }
}

pub fn clamp_stroke_width(width: f32) -> f32 {
    if width.is_finite() {
        width.clamp(MIN_STROKE_WIDTH, MAX_STROKE_WIDTH)
    } else {
        DEFAULT_STROKE_WIDTH
    }
}

/// True for labels that carry no information of their own and should be
/// replaced by the relationship type's name.
pub fn is_placeholder_label(label: &str) -> bool {
    let trimmed = label.trim();
    trimmed.is_empty()
        || PLACEHOLDER_LABELS
            .iter()
            .any(|placeholder| trimmed.eq_ignore_ascii_case(placeholder))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    pub position: Point,
    pub size: Size,
    pub color: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind, name: impl Into<String>, position: Point) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            position,
            size: Size::new(NODE_WIDTH, NODE_HEIGHT),
            color: None,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::from_origin_size(self.position, self.size)
    }

    pub fn accent_color(&self) -> &str {
        self.color
            .as_deref()
            .unwrap_or_else(|| self.kind.default_color())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    pub label: String,
    pub relationship_type: RelationshipType,
    pub style: ConnectionStyle,
}

impl Connection {
    pub fn is_directional(&self) -> bool {
        self.style.has_arrow || self.style.has_reverse_arrow
    }

    pub fn references(&self, node_id: &str) -> bool {
        self.from_node_id == node_id || self.to_node_id == node_id
    }
}

/// Partial update of a connection. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPatch {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "type")]
    pub relationship_type: Option<RelationshipType>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
    #[serde(default)]
    pub stroke_width: Option<f32>,
    #[serde(default)]
    pub dash_pattern: Option<DashPattern>,
    #[serde(default)]
    pub has_arrow: Option<bool>,
    #[serde(default)]
    pub has_reverse_arrow: Option<bool>,
    #[serde(default)]
    pub arrow_size: Option<f32>,
    #[serde(default)]
    pub reverse_arrow_size: Option<f32>,
    #[serde(default)]
    pub arrow_color: Option<String>,
    #[serde(default)]
    pub reverse_arrow_color: Option<String>,
}

/// In-memory node and connection store of one open diagram.
///
/// Nodes keep insertion order, which is also the paint order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagram {
    nodes: Vec<Node>,
    connections: Vec<Connection>,
}

impl Diagram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.connections.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    pub fn connection(&self, id: &str) -> Option<&Connection> {
        self.connections.iter().find(|connection| connection.id == id)
    }

    /// Places an entity at a random spot inside the placement region.
    /// Returns `false` when the entity is already on the canvas.
    pub fn add_node(&mut self, entity: &PlaceableEntity) -> bool {
        self.add_node_with_rng(entity, &mut rand::thread_rng())
    }

    pub fn add_node_with_rng<R: Rng + ?Sized>(&mut self, entity: &PlaceableEntity, rng: &mut R) -> bool {
        if self.contains_node(&entity.id) {
            debug!("entity '{}' is already on the canvas", entity.id);
            return false;
        }

        let position = Point::new(
            rng.gen_range(PLACEMENT_MIN.x..PLACEMENT_MAX.x),
            rng.gen_range(PLACEMENT_MIN.y..PLACEMENT_MAX.y),
        );
        let node = Node::new(
            entity.id.clone(),
            NodeKind::parse(&entity.category),
            entity.name.clone(),
            position,
        );
        self.nodes.push(node);
        true
    }

    /// Inserts a fully specified node. Returns `false` if the id is taken.
    pub fn place_node(&mut self, node: Node) -> bool {
        if self.contains_node(&node.id) {
            return false;
        }
        self.nodes.push(node);
        true
    }

    /// Moves a node by a screen-space delta observed at the given scale.
    pub fn move_node(&mut self, id: &str, dx: f32, dy: f32, scale: f32) -> Result<Point, DiagramError> {
        let node = self
            .nodes
            .iter_mut()
            .find(|node| node.id == id)
            .ok_or_else(|| DiagramError::UnknownNode(id.to_string()))?;

        let scale = if scale > 0.0 && scale.is_finite() { scale } else { 1.0 };
        node.position = node.position.translate(dx / scale, dy / scale);
        Ok(node.position)
    }

    /// Removes a node and every connection that references it.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|node| node.id != id);
        let existed = before != self.nodes.len();
        if existed {
            self.connections.retain(|connection| !connection.references(id));
        }
        existed
    }

    /// Connects two placed nodes with the default friendship style.
    pub fn add_connection(
        &mut self,
        from: &str,
        to: &str,
        created_at: DateTime<Utc>,
    ) -> Result<&Connection, DiagramError> {
        if from == to {
            return Err(DiagramError::SelfLoop(from.to_string()));
        }
        for id in [from, to] {
            if !self.contains_node(id) {
                return Err(DiagramError::UnknownNode(id.to_string()));
            }
        }

        let relationship_type = RelationshipType::default();
        let id = self.unique_connection_id(&format!(
            "{from}-{to}-{}",
            created_at.timestamp_millis()
        ));
        self.connections.push(Connection {
            id,
            from_node_id: from.to_string(),
            to_node_id: to.to_string(),
            label: relationship_type.default_label().to_string(),
            relationship_type,
            style: ConnectionStyle::for_type(relationship_type),
        });

        Ok(&self.connections[self.connections.len() - 1])
    }

    /// Appends a connection restored from storage. Ids are made unique;
    /// dangling endpoints are kept and skipped at render time.
    pub(crate) fn restore_connection(&mut self, mut connection: Connection) -> Result<(), DiagramError> {
        if connection.from_node_id == connection.to_node_id {
            return Err(DiagramError::SelfLoop(connection.from_node_id));
        }
        connection.id = self.unique_connection_id(&connection.id);
        self.connections.push(connection);
        Ok(())
    }

    pub fn update_connection(&mut self, id: &str, patch: ConnectionPatch) -> Result<&Connection, DiagramError> {
        let connection = self
            .connections
            .iter_mut()
            .find(|connection| connection.id == id)
            .ok_or_else(|| DiagramError::UnknownConnection(id.to_string()))?;

        let previous_type = connection.relationship_type;
        if let Some(next_type) = patch.relationship_type {
            connection.relationship_type = next_type;
            if next_type != previous_type && patch.color.is_none() {
                let old_color = previous_type.default_color();
                let style = &mut connection.style;
                if style.color == old_color {
                    style.color = next_type.default_color().to_string();
                }
                if style.arrow_color == old_color {
                    style.arrow_color = style.color.clone();
                }
                if style.reverse_arrow_color == old_color {
                    style.reverse_arrow_color = style.color.clone();
                }
            }
        }

        if let Some(label) = patch.label {
            connection.label = label;
        }
        if connection.relationship_type != RelationshipType::Custom
            && (is_placeholder_label(&connection.label)
                || connection.label == previous_type.default_label())
        {
            connection.label = connection.relationship_type.default_label().to_string();
        }

        let style = &mut connection.style;
        if let Some(color) = patch.color {
            style.color = color;
        }
        if let Some(text_color) = patch.text_color {
            style.text_color = text_color;
        }
        if let Some(width) = patch.stroke_width {
            style.stroke_width = clamp_stroke_width(width);
        }
        if let Some(dash) = patch.dash_pattern {
            style.dash_pattern = dash;
        }
        if let Some(has_arrow) = patch.has_arrow {
            style.has_arrow = has_arrow;
        }
        if let Some(has_reverse_arrow) = patch.has_reverse_arrow {
            style.has_reverse_arrow = has_reverse_arrow;
        }
        if let Some(size) = patch.arrow_size {
            style.arrow_size = size.max(1.0);
        }
        if let Some(size) = patch.reverse_arrow_size {
            style.reverse_arrow_size = size.max(1.0);
        }
        if let Some(color) = patch.arrow_color {
            style.arrow_color = color;
        }
        if let Some(color) = patch.reverse_arrow_color {
            style.reverse_arrow_color = color;
        }

        Ok(connection)
    }

    pub fn remove_connection(&mut self, id: &str) -> bool {
        let before = self.connections.len();
        self.connections.retain(|connection| connection.id != id);
        before != self.connections.len()
    }

    /// Connections whose endpoints are both placed, with their endpoint nodes.
    pub fn resolved_connections(&self) -> impl Iterator<Item = (&Connection, &Node, &Node)> {
        self.connections.iter().filter_map(|connection| {
            let from = self.node(&connection.from_node_id)?;
            let to = self.node(&connection.to_node_id)?;
            Some((connection, from, to))
        })
    }

    /// Bounding box of all nodes, `None` for an empty canvas.
    pub fn bounds(&self) -> Option<Rect> {
        self.nodes
            .iter()
            .map(Node::rect)
            .reduce(|acc, rect| acc.union(rect))
    }

    fn unique_connection_id(&self, base: &str) -> String {
        if self.connection(base).is_none() {
            return base.to_string();
        }
        let mut suffix = 1;
        loop {
            let candidate = format!("{base}-{suffix}");
            if self.connection(&candidate).is_none() {
                return candidate;
            }
            suffix += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn entity(id: &str, category: &str) -> PlaceableEntity {
        PlaceableEntity {
            id: id.to_string(),
            name: format!("Entity {id}"),
            category: category.to_string(),
            description: None,
        }
    }

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn two_node_diagram() -> Diagram {
        let mut diagram = Diagram::new();
        diagram.place_node(Node::new("c1", NodeKind::Character, "Ayla", Point::new(0.0, 0.0)));
        diagram.place_node(Node::new("c2", NodeKind::Character, "Bren", Point::new(400.0, 0.0)));
        diagram
    }

    #[test]
    fn placing_the_same_entity_twice_keeps_one_node() {
        let mut diagram = Diagram::new();
        let mut rng = StdRng::seed_from_u64(7);

        assert!(diagram.add_node_with_rng(&entity("c1", "character"), &mut rng));
        assert!(!diagram.add_node_with_rng(&entity("c1", "character"), &mut rng));

        assert_eq!(diagram.nodes().len(), 1);
        let node = &diagram.nodes()[0];
        assert_eq!(node.kind, NodeKind::Character);
        assert!(node.position.x >= PLACEMENT_MIN.x && node.position.x < PLACEMENT_MAX.x);
        assert!(node.position.y >= PLACEMENT_MIN.y && node.position.y < PLACEMENT_MAX.y);
        assert_eq!(node.size, Size::new(NODE_WIDTH, NODE_HEIGHT));
    }

    #[test]
    fn move_divides_screen_delta_by_scale() {
        let mut diagram = two_node_diagram();
        let moved = diagram.move_node("c1", 30.0, -12.0, 1.5).unwrap();
        assert!((moved.x - 20.0).abs() < 1e-4);
        assert!((moved.y + 8.0).abs() < 1e-4);

        assert_eq!(
            diagram.move_node("ghost", 1.0, 1.0, 1.0),
            Err(DiagramError::UnknownNode("ghost".to_string()))
        );
    }

    #[test]
    fn new_connection_uses_default_style() {
        let mut diagram = two_node_diagram();
        let connection = diagram.add_connection("c1", "c2", timestamp()).unwrap();

        assert_eq!(connection.id, format!("c1-c2-{}", timestamp().timestamp_millis()));
        assert_eq!(connection.relationship_type, RelationshipType::Friendship);
        assert_eq!(connection.label, "friendship");
        assert_eq!(connection.style.dash_pattern, DashPattern::Solid);
        assert!(connection.style.has_arrow);
        assert!(!connection.style.has_reverse_arrow);
    }

    #[test]
    fn colliding_connection_ids_get_a_suffix() {
        let mut diagram = two_node_diagram();
        let first = diagram.add_connection("c1", "c2", timestamp()).unwrap().id.clone();
        let second = diagram.add_connection("c1", "c2", timestamp()).unwrap().id.clone();
        assert_ne!(first, second);
        assert_eq!(second, format!("{first}-1"));
    }

    #[test]
    fn self_loops_and_unknown_endpoints_are_rejected() {
        let mut diagram = two_node_diagram();
        assert_eq!(
            diagram.add_connection("c1", "c1", timestamp()).unwrap_err(),
            DiagramError::SelfLoop("c1".to_string())
        );
        assert_eq!(
            diagram.add_connection("c1", "zz", timestamp()).unwrap_err(),
            DiagramError::UnknownNode("zz".to_string())
        );
        assert!(diagram.connections().is_empty());
    }

    #[test]
    fn removing_a_node_cascades_to_its_connections() {
        let mut diagram = two_node_diagram();
        diagram.place_node(Node::new("c3", NodeKind::Location, "Keep", Point::new(0.0, 300.0)));
        diagram.add_connection("c1", "c2", timestamp()).unwrap();
        diagram.add_connection("c2", "c3", timestamp()).unwrap();
        diagram.add_connection("c3", "c1", timestamp()).unwrap();

        assert!(diagram.remove_node("c1"));
        assert!(!diagram.remove_node("c1"));
        assert_eq!(diagram.connections().len(), 1);
        assert!(
            diagram
                .connections()
                .iter()
                .all(|c| diagram.contains_node(&c.from_node_id) && diagram.contains_node(&c.to_node_id))
        );
    }

    #[test]
    fn changing_type_rederives_placeholder_label_and_color() {
        let mut diagram = two_node_diagram();
        let id = diagram.add_connection("c1", "c2", timestamp()).unwrap().id.clone();

        let updated = diagram
            .update_connection(
                &id,
                ConnectionPatch {
                    relationship_type: Some(RelationshipType::Rivalry),
                    stroke_width: Some(42.0),
                    ..ConnectionPatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.label, "rivalry");
        assert_eq!(updated.style.color, RelationshipType::Rivalry.default_color());
        assert_eq!(updated.style.arrow_color, RelationshipType::Rivalry.default_color());
        assert_eq!(updated.style.stroke_width, MAX_STROKE_WIDTH);

        let custom = diagram
            .update_connection(
                &id,
                ConnectionPatch {
                    relationship_type: Some(RelationshipType::Custom),
                    label: Some("sworn to".to_string()),
                    ..ConnectionPatch::default()
                },
            )
            .unwrap();
        assert_eq!(custom.label, "sworn to");
    }

    #[test]
    fn user_labels_survive_type_changes() {
        let mut diagram = two_node_diagram();
        let id = diagram.add_connection("c1", "c2", timestamp()).unwrap().id.clone();
        diagram
            .update_connection(
                &id,
                ConnectionPatch {
                    label: Some("childhood friends".to_string()),
                    color: Some("#000000".to_string()),
                    ..ConnectionPatch::default()
                },
            )
            .unwrap();

        let updated = diagram
            .update_connection(
                &id,
                ConnectionPatch {
                    relationship_type: Some(RelationshipType::Family),
                    ..ConnectionPatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.label, "childhood friends");
        assert_eq!(updated.style.color, "#000000");
    }

    #[test]
    fn resolved_connections_skip_dangling_references() {
        let mut diagram = two_node_diagram();
        diagram.add_connection("c1", "c2", timestamp()).unwrap();
        diagram
            .restore_connection(Connection {
                id: "dangling".to_string(),
                from_node_id: "c1".to_string(),
                to_node_id: "missing".to_string(),
                label: "neutral".to_string(),
                relationship_type: RelationshipType::Neutral,
                style: ConnectionStyle::for_type(RelationshipType::Neutral),
            })
            .unwrap();

        assert_eq!(diagram.connections().len(), 2);
        assert_eq!(diagram.resolved_connections().count(), 1);
    }

    #[test]
    fn dash_patterns_parse_from_stored_arrays() {
        assert_eq!(DashPattern::from_dasharray(""), DashPattern::Solid);
        assert_eq!(DashPattern::from_dasharray("none"), DashPattern::Solid);
        assert_eq!(DashPattern::from_dasharray("8,4"), DashPattern::Dashed);
        assert_eq!(DashPattern::from_dasharray("5 5"), DashPattern::Dashed);
        assert_eq!(DashPattern::from_dasharray("2,4"), DashPattern::Dotted);
        assert_eq!(DashPattern::from_dasharray("8,4,2,4"), DashPattern::DashDot);
        assert_eq!(DashPattern::from_dasharray("garbage"), DashPattern::Solid);
    }

    #[test]
    fn kinds_and_types_parse_leniently() {
        assert_eq!(NodeKind::parse("Magic System"), NodeKind::MagicSystem);
        assert_eq!(NodeKind::parse("deity"), NodeKind::Other("deity".to_string()));
        assert_eq!(NodeKind::parse("deity").badge(), "Deity");
        assert_eq!(RelationshipType::parse("Romance"), RelationshipType::Romance);
        assert_eq!(RelationshipType::parse(""), RelationshipType::Neutral);
        assert_eq!(RelationshipType::parse("blood oath"), RelationshipType::Custom);
    }
}

//! Relationship diagram editor for worldbuilding projects.
//!
//! Entities (characters, locations, items, ...) are placed on a pannable,
//! zoomable canvas and joined by labeled, styled connections. The editor is
//! headless: hosts feed it pointer input and render frames as SVG. Diagrams
//! are persisted as a JSON blob on a "relationship" world record.

pub mod database;
pub mod diagram;
pub mod editor;
pub mod geometry;
pub mod interaction;
pub mod overview;
pub mod preferences;
pub mod records;
pub mod render;
pub mod save;
pub mod schema;
#[cfg(feature = "server")]
pub mod serve;
pub mod utils;
pub mod viewport;

/// Size of a freshly placed node card, in diagram units.
pub const NODE_WIDTH: f32 = 150.0;
pub const NODE_HEIGHT: f32 = 80.0;

pub use diagram::{
    Connection, ConnectionPatch, ConnectionStyle, DashPattern, Diagram, DiagramError, Node,
    NodeKind, PlaceableEntity, RelationshipType,
};
pub use editor::EditorSession;
pub use geometry::{
    Anchor, AnchorSide, CubicPath, Point, QuadraticPath, Rect, Size, connection_path,
    overview_path, route_between, select_anchors,
};
pub use interaction::{
    Effect, HitTarget, InteractionMachine, InteractionState, Modifiers, NodeControl, PointerButton,
    PointerInput, Selection, WheelInput,
};
pub use overview::render_overview_svg;
pub use preferences::{EditorPreferences, ViewMode};
pub use records::{NewRecord, RecordStore, RecordUpdate, SqliteRecordStore, WorldRecord};
#[cfg(feature = "raster")]
pub use render::render_png;
pub use render::{RenderOptions, Scene, render_svg};
pub use save::{DiagramSaved, DiagramSaver, SaveError, SaveTarget};
pub use schema::{DiagramBlob, SchemaError};
pub use utils::{escape_xml, estimate_text_width, initial, truncate_label};
pub use viewport::Viewport;

use anyhow::Result;
use chrono::Utc;
use log::debug;
use serde_json::Value;

use crate::*;

/// Extra slack around handles so they are easy to grab.
const HANDLE_HIT_SLACK: f32 = 2.0;

/// One open relationship canvas.
///
/// The session is the only owner of its diagram while open. Hosts feed it
/// pointer input in screen pixels and ask it for frames; [`snapshot`]
/// produces the blob a save hands to the record store.
///
/// [`snapshot`]: EditorSession::snapshot
#[derive(Debug, Clone)]
pub struct EditorSession {
    diagram: Diagram,
    viewport: Viewport,
    machine: InteractionMachine,
    selection: Selection,
    hovered: Option<String>,
    drag_offset: Option<(String, Point)>,
    preferences: EditorPreferences,
    dirty: bool,
}

impl EditorSession {
    pub fn new(diagram: Diagram, preferences: EditorPreferences) -> Self {
        Self {
            diagram,
            viewport: Viewport::default(),
            machine: InteractionMachine::new(),
            selection: Selection::None,
            hovered: None,
            drag_offset: None,
            preferences,
            dirty: false,
        }
    }

    /// Opens the diagram stored on a relationship record.
    pub fn open(blob: &Value, preferences: EditorPreferences) -> Result<Self, SchemaError> {
        Ok(Self::new(schema::deserialize(blob)?, preferences))
    }

    pub fn diagram(&self) -> &Diagram {
        &self.diagram
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn hovered(&self) -> Option<&str> {
        self.hovered.as_deref()
    }

    pub fn interaction(&self) -> &InteractionState {
        self.machine.state()
    }

    pub fn preferences(&self) -> &EditorPreferences {
        &self.preferences
    }

    pub fn preferences_mut(&mut self) -> &mut EditorPreferences {
        &mut self.preferences
    }

    /// True when the diagram changed since it was opened or last saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    pub fn snapshot(&self) -> DiagramBlob {
        schema::serialize(&self.diagram)
    }

    /// Places an entity on the canvas. Already placed entities are ignored.
    pub fn add_entity(&mut self, entity: &PlaceableEntity) -> bool {
        let added = self.diagram.add_node(entity);
        self.dirty |= added;
        added
    }

    pub fn remove_node(&mut self, id: &str) -> bool {
        if !self.diagram.remove_node(id) {
            return false;
        }
        self.dirty = true;

        if self.selection.node_id() == Some(id) {
            self.selection = Selection::None;
        }
        if let Some(connection_id) = self.selection.connection_id() {
            if self.diagram.connection(connection_id).is_none() {
                self.selection = Selection::None;
            }
        }
        if self.hovered.as_deref() == Some(id) {
            self.hovered = None;
        }
        if self.machine.connecting_from().is_some_and(|(from, _)| from == id)
            || self.machine.dragged_node() == Some(id)
        {
            self.cancel_interaction();
        }
        true
    }

    pub fn update_connection(&mut self, id: &str, patch: ConnectionPatch) -> Result<(), DiagramError> {
        self.diagram.update_connection(id, patch)?;
        self.dirty = true;
        Ok(())
    }

    pub fn remove_connection(&mut self, id: &str) -> bool {
        let removed = self.diagram.remove_connection(id);
        if removed {
            self.dirty = true;
            if self.selection.connection_id() == Some(id) {
                self.selection = Selection::None;
            }
        }
        removed
    }

    pub fn select(&mut self, selection: Selection) {
        self.selection = selection;
    }

    /// Enters connection mode from the selected node.
    pub fn start_connection(&mut self) -> bool {
        let Some(node_id) = self.selection.node_id() else {
            return false;
        };
        if !self.diagram.contains_node(node_id) {
            return false;
        }
        let node_id = node_id.to_string();
        self.machine.start_connection(&node_id)
    }

    /// Abandons the current gesture. A drag in progress snaps back.
    pub fn cancel_interaction(&mut self) {
        self.machine.cancel();
        self.drag_offset = None;
    }

    pub fn zoom_in(&mut self) {
        self.viewport.zoom_in();
    }

    pub fn zoom_out(&mut self) {
        self.viewport.zoom_out();
    }

    pub fn reset_view(&mut self) {
        self.viewport.reset();
    }

    pub fn fit_to_screen(&mut self) {
        self.viewport.fit();
    }

    pub fn wheel(&mut self, input: &WheelInput) {
        self.viewport
            .wheel_zoom(input.delta_y, input.position, input.modifiers.precise());
    }

    pub fn set_move_tool(&mut self, enabled: bool) {
        self.preferences.move_tool = enabled;
    }

    /// Resolves what lies under a screen position. Controls of the selected
    /// node come first. Nodes are then tried topmost first, handles before
    /// their own body, so a card painted on top hides handles beneath it.
    /// Labels come last.
    pub fn hit_test(&self, screen: Point) -> HitTarget {
        let point = self.viewport.to_diagram(screen);
        let scene = self.scene();

        if let Some(node) = self.selection.node_id().and_then(|id| self.diagram.node(id)) {
            for (control, center) in render::control_centers(scene.node_rect(node)) {
                if center.distance(point) <= render::CONTROL_RADIUS {
                    return HitTarget::Control {
                        node_id: node.id.clone(),
                        control,
                    };
                }
            }
        }

        for node in self.diagram.nodes().iter().rev() {
            let rect = scene.node_rect(node);
            if scene.shows_handles(&node.id) {
                for (side, center) in render::handle_centers(rect) {
                    if center.distance(point) <= render::HANDLE_RADIUS + HANDLE_HIT_SLACK {
                        return HitTarget::Control {
                            node_id: node.id.clone(),
                            control: NodeControl::Handle(side),
                        };
                    }
                }
            }
            if rect.contains(point) {
                return HitTarget::Node(node.id.clone());
            }
        }

        for (connection, path) in scene.routes().iter().rev() {
            if render::label_rect(path, &connection.label).is_some_and(|rect| rect.contains(point)) {
                return HitTarget::ConnectionLabel(connection.id.clone());
            }
        }

        HitTarget::Background
    }

    pub fn pointer_down(&mut self, input: &PointerInput) {
        // A press always ends any drag whose release was lost.
        self.drag_offset = None;
        let target = self.hit_test(input.position);
        let effect = self
            .machine
            .pointer_down(input, &target, self.preferences.move_tool);
        self.apply(effect);
    }

    pub fn pointer_move(&mut self, position: Point) {
        if self.machine.is_idle() {
            self.hovered = self.hit_test(position).node_id().map(str::to_string);
            return;
        }
        let effect = self.machine.pointer_move(position);
        self.apply(effect);
    }

    pub fn pointer_up(&mut self, position: Point) {
        let target = self.hit_test(position);
        let effect = self.machine.pointer_up(position, &target);
        if self.machine.dragged_node().is_none() {
            self.drag_offset = None;
        }
        self.apply(effect);
    }

    fn apply(&mut self, effect: Option<Effect>) {
        let Some(effect) = effect else {
            return;
        };
        match effect {
            Effect::Pan { dx, dy } => self.viewport.pan_by(dx, dy),
            Effect::DragPreview { node_id, dx, dy } => {
                let (dx, dy) = self.viewport.screen_delta_to_diagram(dx, dy);
                self.drag_offset = Some((node_id, Point::new(dx, dy)));
            }
            Effect::CommitMove { node_id, dx, dy } => {
                self.drag_offset = None;
                match self
                    .diagram
                    .move_node(&node_id, dx, dy, self.viewport.scale())
                {
                    Ok(_) => self.dirty = true,
                    Err(err) => debug!("drop of a vanished node: {err}"),
                }
            }
            Effect::Select(selection) => self.selection = selection,
            Effect::Connect { from, to } => {
                match self.diagram.add_connection(&from, &to, Utc::now()) {
                    Ok(connection) => {
                        self.selection = Selection::Connection(connection.id.clone());
                        self.dirty = true;
                    }
                    Err(err) => debug!("ignoring connection request: {err}"),
                }
            }
            Effect::DeleteNode(node_id) => {
                self.remove_node(&node_id);
            }
        }
    }

    /// Everything the renderer needs for the current frame.
    pub fn scene(&self) -> Scene<'_> {
        Scene {
            diagram: &self.diagram,
            viewport: &self.viewport,
            selected_node: self.selection.node_id(),
            selected_connection: self.selection.connection_id(),
            hovered_node: self.hovered.as_deref(),
            drag: self
                .drag_offset
                .as_ref()
                .map(|(id, offset)| (id.as_str(), *offset)),
            connection_preview: self.machine.connecting_from().and_then(|(from, pointer)| {
                pointer.map(|pointer| (from, self.viewport.to_diagram(pointer)))
            }),
        }
    }

    /// Renders the canvas, or the radial overview when that view is active.
    pub fn render_svg(&self, options: &RenderOptions) -> Result<String> {
        match self.preferences.view_mode {
            ViewMode::Canvas => render::render_svg(&self.scene(), options),
            ViewMode::Overview => overview::render_overview_svg(&self.diagram, options),
        }
    }
}

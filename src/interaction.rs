//! Pointer gesture resolution for the canvas.
//!
//! The machine decides which gesture a pointer sequence belongs to and
//! reports what should happen as an [`Effect`]. It never touches the node
//! or connection store itself; the editor session applies the effects.

use log::debug;

use crate::geometry::{AnchorSide, Point};

/// Screen pixels a node must travel before a press counts as a drag.
pub const DRAG_THRESHOLD: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerButton {
    #[default]
    Primary,
    Secondary,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub alt: bool,
    pub ctrl: bool,
    pub meta: bool,
}

impl Modifiers {
    /// Alt turns a primary press on the background into a pan.
    pub fn pans(&self) -> bool {
        self.alt
    }

    /// Shift selects the finer wheel zoom step.
    pub fn precise(&self) -> bool {
        self.shift
    }
}

/// A pointer event in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerInput {
    pub position: Point,
    pub button: PointerButton,
    pub modifiers: Modifiers,
}

impl PointerInput {
    pub fn primary(x: f32, y: f32) -> Self {
        Self {
            position: Point::new(x, y),
            ..Self::default()
        }
    }

    pub fn with_button(mut self, button: PointerButton) -> Self {
        self.button = button;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelInput {
    pub position: Point,
    pub delta_y: f32,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeControl {
    Connect,
    Delete,
    Handle(AnchorSide),
}

/// What sits under the pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitTarget {
    Background,
    Node(String),
    Control { node_id: String, control: NodeControl },
    ConnectionLabel(String),
}

impl HitTarget {
    pub fn node_id(&self) -> Option<&str> {
        match self {
            HitTarget::Node(id) => Some(id.as_str()),
            HitTarget::Control { node_id, .. } => Some(node_id.as_str()),
            HitTarget::Background | HitTarget::ConnectionLabel(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    Node(String),
    Connection(String),
}

impl Selection {
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Selection::Node(id) => Some(id.as_str()),
            _ => None,
        }
    }

    pub fn connection_id(&self) -> Option<&str> {
        match self {
            Selection::Connection(id) => Some(id.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Panning {
        last: Point,
    },
    DraggingNode {
        node_id: String,
        origin: Point,
        moved: bool,
    },
    Connecting {
        from_node_id: String,
        pointer: Option<Point>,
        /// Set once a fresh press happens after the gesture started, so the
        /// release of the press that opened connection mode is ignored.
        armed: bool,
    },
}

/// Requested store or view change. Deltas are in screen pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Pan { dx: f32, dy: f32 },
    DragPreview { node_id: String, dx: f32, dy: f32 },
    CommitMove { node_id: String, dx: f32, dy: f32 },
    Select(Selection),
    Connect { from: String, to: String },
    DeleteNode(String),
}

#[derive(Debug, Clone, Default)]
pub struct InteractionMachine {
    state: InteractionState,
}

impl InteractionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == InteractionState::Idle
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self.state, InteractionState::Connecting { .. })
    }

    pub fn dragged_node(&self) -> Option<&str> {
        match &self.state {
            InteractionState::DraggingNode { node_id, .. } => Some(node_id.as_str()),
            _ => None,
        }
    }

    pub fn connecting_from(&self) -> Option<(&str, Option<Point>)> {
        match &self.state {
            InteractionState::Connecting {
                from_node_id,
                pointer,
                ..
            } => Some((from_node_id.as_str(), *pointer)),
            _ => None,
        }
    }

    /// Enters connection mode from an explicit control. Only valid from idle.
    pub fn start_connection(&mut self, node_id: &str) -> bool {
        if !self.is_idle() {
            return false;
        }
        self.transition_to(InteractionState::Connecting {
            from_node_id: node_id.to_string(),
            pointer: None,
            armed: false,
        });
        true
    }

    pub fn cancel(&mut self) {
        if !self.is_idle() {
            self.transition_to(InteractionState::Idle);
        }
    }

    pub fn pointer_down(&mut self, input: &PointerInput, target: &HitTarget, move_tool: bool) -> Option<Effect> {
        if let InteractionState::Connecting { armed, .. } = &mut self.state {
            *armed = true;
            return None;
        }
        if !self.is_idle() {
            // A release was lost; drop the stale gesture before starting a new one.
            debug!("discarding unfinished gesture {:?}", self.state);
            self.state = InteractionState::Idle;
        }

        let primary = input.button == PointerButton::Primary;
        let pan_trigger = !primary || input.modifiers.pans() || move_tool;

        match target {
            HitTarget::Background if pan_trigger => {
                self.transition_to(InteractionState::Panning {
                    last: input.position,
                });
                None
            }
            HitTarget::Background => Some(Effect::Select(Selection::None)),
            HitTarget::Node(node_id) if !pan_trigger => {
                self.transition_to(InteractionState::DraggingNode {
                    node_id: node_id.clone(),
                    origin: input.position,
                    moved: false,
                });
                None
            }
            HitTarget::Node(_) => None,
            HitTarget::Control { node_id, control } if primary => match control {
                NodeControl::Connect | NodeControl::Handle(_) => {
                    self.transition_to(InteractionState::Connecting {
                        from_node_id: node_id.clone(),
                        pointer: Some(input.position),
                        armed: false,
                    });
                    Some(Effect::Select(Selection::Node(node_id.clone())))
                }
                NodeControl::Delete => Some(Effect::DeleteNode(node_id.clone())),
            },
            HitTarget::Control { .. } => None,
            HitTarget::ConnectionLabel(id) if primary => {
                Some(Effect::Select(Selection::Connection(id.clone())))
            }
            HitTarget::ConnectionLabel(_) => None,
        }
    }

    pub fn pointer_move(&mut self, position: Point) -> Option<Effect> {
        match &mut self.state {
            InteractionState::Idle => None,
            InteractionState::Panning { last } => {
                let dx = position.x - last.x;
                let dy = position.y - last.y;
                *last = position;
                Some(Effect::Pan { dx, dy })
            }
            InteractionState::DraggingNode {
                node_id,
                origin,
                moved,
            } => {
                let dx = position.x - origin.x;
                let dy = position.y - origin.y;
                if !*moved && (dx * dx + dy * dy).sqrt() > DRAG_THRESHOLD {
                    *moved = true;
                }
                if *moved {
                    Some(Effect::DragPreview {
                        node_id: node_id.clone(),
                        dx,
                        dy,
                    })
                } else {
                    None
                }
            }
            InteractionState::Connecting { pointer, .. } => {
                *pointer = Some(position);
                None
            }
        }
    }

    pub fn pointer_up(&mut self, position: Point, target: &HitTarget) -> Option<Effect> {
        let previous = std::mem::take(&mut self.state);
        let was_idle = previous == InteractionState::Idle;
        let effect = match previous {
            InteractionState::Idle => None,
            InteractionState::Panning { .. } => None,
            InteractionState::DraggingNode {
                node_id,
                origin,
                moved,
            } => {
                if moved {
                    Some(Effect::CommitMove {
                        node_id,
                        dx: position.x - origin.x,
                        dy: position.y - origin.y,
                    })
                } else {
                    Some(Effect::Select(Selection::Node(node_id)))
                }
            }
            InteractionState::Connecting {
                from_node_id,
                pointer,
                armed: false,
            } => {
                self.state = InteractionState::Connecting {
                    from_node_id,
                    pointer: Some(pointer.unwrap_or(position)),
                    armed: false,
                };
                return None;
            }
            InteractionState::Connecting { from_node_id, .. } => match target.node_id() {
                Some(to) if to != from_node_id => Some(Effect::Connect {
                    from: from_node_id,
                    to: to.to_string(),
                }),
                _ => {
                    debug!("connection from '{from_node_id}' cancelled");
                    None
                }
            },
        };

        if !was_idle {
            debug!("canvas interaction -> Idle");
        }
        effect
    }

    fn transition_to(&mut self, state: InteractionState) {
        debug!("canvas interaction -> {:?}", state);
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> HitTarget {
        HitTarget::Node(id.to_string())
    }

    fn connect_control(id: &str) -> HitTarget {
        HitTarget::Control {
            node_id: id.to_string(),
            control: NodeControl::Connect,
        }
    }

    #[test]
    fn default_is_idle() {
        let machine = InteractionMachine::new();
        assert!(machine.is_idle());
        assert_eq!(machine.state(), &InteractionState::Idle);
    }

    #[test]
    fn background_press_with_pan_trigger_pans() {
        let mut machine = InteractionMachine::new();
        let press = PointerInput::primary(10.0, 10.0).with_button(PointerButton::Secondary);
        assert_eq!(machine.pointer_down(&press, &HitTarget::Background, false), None);
        assert!(matches!(machine.state(), InteractionState::Panning { .. }));

        assert_eq!(
            machine.pointer_move(Point::new(15.0, 7.0)),
            Some(Effect::Pan { dx: 5.0, dy: -3.0 })
        );
        assert_eq!(
            machine.pointer_move(Point::new(16.0, 7.0)),
            Some(Effect::Pan { dx: 1.0, dy: 0.0 })
        );
        assert_eq!(machine.pointer_up(Point::new(16.0, 7.0), &HitTarget::Background), None);
        assert!(machine.is_idle());
    }

    #[test]
    fn alt_and_move_tool_are_pan_triggers() {
        let mut machine = InteractionMachine::new();
        let alt = PointerInput::primary(0.0, 0.0).with_modifiers(Modifiers {
            alt: true,
            ..Modifiers::default()
        });
        machine.pointer_down(&alt, &HitTarget::Background, false);
        assert!(matches!(machine.state(), InteractionState::Panning { .. }));
        machine.pointer_up(Point::default(), &HitTarget::Background);

        machine.pointer_down(&PointerInput::primary(0.0, 0.0), &HitTarget::Background, true);
        assert!(matches!(machine.state(), InteractionState::Panning { .. }));
    }

    #[test]
    fn plain_background_press_clears_selection() {
        let mut machine = InteractionMachine::new();
        assert_eq!(
            machine.pointer_down(&PointerInput::primary(0.0, 0.0), &HitTarget::Background, false),
            Some(Effect::Select(Selection::None))
        );
        assert!(machine.is_idle());
    }

    #[test]
    fn small_drag_is_a_click() {
        let mut machine = InteractionMachine::new();
        machine.pointer_down(&PointerInput::primary(100.0, 100.0), &node("c1"), false);
        assert_eq!(machine.dragged_node(), Some("c1"));

        assert_eq!(machine.pointer_move(Point::new(102.0, 101.0)), None);
        assert_eq!(
            machine.pointer_up(Point::new(102.0, 101.0), &node("c1")),
            Some(Effect::Select(Selection::Node("c1".to_string())))
        );
        assert!(machine.is_idle());
    }

    #[test]
    fn drag_past_threshold_previews_then_commits() {
        let mut machine = InteractionMachine::new();
        machine.pointer_down(&PointerInput::primary(100.0, 100.0), &node("c1"), false);

        assert_eq!(
            machine.pointer_move(Point::new(110.0, 100.0)),
            Some(Effect::DragPreview {
                node_id: "c1".to_string(),
                dx: 10.0,
                dy: 0.0
            })
        );
        // Coming back under the threshold still counts as a move.
        assert!(machine.pointer_move(Point::new(101.0, 100.0)).is_some());

        assert_eq!(
            machine.pointer_up(Point::new(130.0, 90.0), &HitTarget::Background),
            Some(Effect::CommitMove {
                node_id: "c1".to_string(),
                dx: 30.0,
                dy: -10.0
            })
        );
        assert!(machine.is_idle());
    }

    #[test]
    fn pan_trigger_on_a_node_does_nothing() {
        let mut machine = InteractionMachine::new();
        let press = PointerInput::primary(0.0, 0.0).with_button(PointerButton::Middle);
        assert_eq!(machine.pointer_down(&press, &node("c1"), false), None);
        assert!(machine.is_idle());
    }

    #[test]
    fn connect_control_commits_on_a_different_node() {
        let mut machine = InteractionMachine::new();
        assert_eq!(
            machine.pointer_down(&PointerInput::primary(0.0, 0.0), &connect_control("c1"), false),
            Some(Effect::Select(Selection::Node("c1".to_string())))
        );
        // Release of the opening press keeps connection mode.
        assert_eq!(machine.pointer_up(Point::default(), &connect_control("c1")), None);
        assert!(machine.is_connecting());

        machine.pointer_move(Point::new(300.0, 40.0));
        assert_eq!(machine.connecting_from(), Some(("c1", Some(Point::new(300.0, 40.0)))));

        assert_eq!(machine.pointer_down(&PointerInput::primary(400.0, 40.0), &node("c2"), false), None);
        assert!(machine.is_connecting());
        assert_eq!(
            machine.pointer_up(Point::new(400.0, 40.0), &node("c2")),
            Some(Effect::Connect {
                from: "c1".to_string(),
                to: "c2".to_string()
            })
        );
        assert!(machine.is_idle());
    }

    #[test]
    fn clicking_the_source_node_cancels_without_connecting() {
        let mut machine = InteractionMachine::new();
        assert!(machine.start_connection("c1"));
        machine.pointer_down(&PointerInput::primary(0.0, 0.0), &node("c1"), false);
        assert_eq!(machine.pointer_up(Point::default(), &node("c1")), None);
        assert!(machine.is_idle());
    }

    #[test]
    fn connecting_blocks_pan_and_drag() {
        let mut machine = InteractionMachine::new();
        machine.start_connection("c1");

        let secondary = PointerInput::primary(0.0, 0.0).with_button(PointerButton::Secondary);
        machine.pointer_down(&secondary, &HitTarget::Background, true);
        assert!(machine.is_connecting());
        assert_eq!(machine.pointer_move(Point::new(50.0, 50.0)), None);

        assert!(!machine.start_connection("c2"));
        machine.cancel();
        assert!(machine.is_idle());
    }

    #[test]
    fn delete_control_requests_removal() {
        let mut machine = InteractionMachine::new();
        let target = HitTarget::Control {
            node_id: "c1".to_string(),
            control: NodeControl::Delete,
        };
        assert_eq!(
            machine.pointer_down(&PointerInput::primary(0.0, 0.0), &target, false),
            Some(Effect::DeleteNode("c1".to_string()))
        );
        assert!(machine.is_idle());
    }
}

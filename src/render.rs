use std::fmt::Write as FmtWrite;

use anyhow::Result;
#[cfg(feature = "raster")]
use anyhow::{anyhow, bail};
use log::debug;
#[cfg(feature = "raster")]
use tiny_skia::{Pixmap, Transform};

use crate::*;

pub const GRID_SPACING: f32 = 24.0;
pub const HALO_EXTRA_WIDTH: f32 = 4.0;
pub const LABEL_FONT_SIZE: f32 = 12.0;
pub const LABEL_PADDING_X: f32 = 10.0;
pub const LABEL_HEIGHT: f32 = 22.0;
pub const TRAVEL_DURATION_SECS: f32 = 3.0;
pub const CONTROL_RADIUS: f32 = 10.0;
pub const HANDLE_RADIUS: f32 = 6.0;

pub const FRAME_MARGIN: f32 = 60.0;
const EMPTY_FRAME: (u32, u32) = (400, 300);

const SELECTION_RING_GAP: f32 = 6.0;
const AVATAR_RADIUS: f32 = 16.0;
const NAME_MAX_CHARS: usize = 14;
const PREVIEW_COLOR: &str = "#6b7280";

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub background: String,
    pub show_grid: bool,
    pub animate_connections: bool,
    /// Markers travelling along each connection when animation is on.
    pub travel_markers: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
            background: "#f9fafb".to_string(),
            show_grid: true,
            animate_connections: true,
            travel_markers: 1,
        }
    }
}

impl RenderOptions {
    pub fn from_preferences(preferences: &EditorPreferences, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            show_grid: preferences.show_grid,
            animate_connections: preferences.animate_connections,
            ..Self::default()
        }
    }
}

/// Read-only view of everything a frame is derived from.
#[derive(Debug, Clone, Copy)]
pub struct Scene<'a> {
    pub diagram: &'a Diagram,
    pub viewport: &'a Viewport,
    pub selected_node: Option<&'a str>,
    pub selected_connection: Option<&'a str>,
    pub hovered_node: Option<&'a str>,
    /// Live drag offset of one node, in diagram space.
    pub drag: Option<(&'a str, Point)>,
    /// Source node and pointer (diagram space) of a connection being drawn.
    pub connection_preview: Option<(&'a str, Point)>,
}

impl<'a> Scene<'a> {
    pub fn new(diagram: &'a Diagram, viewport: &'a Viewport) -> Self {
        Self {
            diagram,
            viewport,
            selected_node: None,
            selected_connection: None,
            hovered_node: None,
            drag: None,
            connection_preview: None,
        }
    }

    /// Node rectangle including any live drag offset.
    pub fn node_rect(&self, node: &Node) -> Rect {
        let rect = node.rect();
        match self.drag {
            Some((id, offset)) if id == node.id => Rect {
                min_x: rect.min_x + offset.x,
                min_y: rect.min_y + offset.y,
                max_x: rect.max_x + offset.x,
                max_y: rect.max_y + offset.y,
            },
            _ => rect,
        }
    }

    pub fn is_selected(&self, node_id: &str) -> bool {
        self.selected_node == Some(node_id)
    }

    pub fn shows_handles(&self, node_id: &str) -> bool {
        self.is_selected(node_id) || self.hovered_node == Some(node_id)
    }

    /// Routed curve of every connection whose endpoints are both placed.
    pub fn routes(&self) -> Vec<(&'a Connection, CubicPath)> {
        let diagram = self.diagram;
        let mut routes = Vec::with_capacity(diagram.connections().len());
        for connection in diagram.connections() {
            let (Some(from), Some(to)) = (
                diagram.node(&connection.from_node_id),
                diagram.node(&connection.to_node_id),
            ) else {
                debug!("skipping connection '{}' with a dangling endpoint", connection.id);
                continue;
            };
            let path = route_between(self.node_rect(from), self.node_rect(to));
            routes.push((connection, path));
        }
        routes
    }
}

/// Viewport and canvas size that show a whole diagram at scale 1 with a
/// margin around it. Used for one-shot exports where nobody has panned.
pub fn frame_diagram(diagram: &Diagram) -> (Viewport, u32, u32) {
    let Some(bounds) = diagram.bounds() else {
        return (Viewport::default(), EMPTY_FRAME.0, EMPTY_FRAME.1);
    };
    let viewport = Viewport::with_transform(
        1.0,
        Point::new(FRAME_MARGIN - bounds.min_x, FRAME_MARGIN - bounds.min_y),
    );
    let width = (bounds.width() + FRAME_MARGIN * 2.0).ceil() as u32;
    let height = (bounds.height() + FRAME_MARGIN * 2.0).ceil() as u32;
    (viewport, width, height)
}

/// Pill behind a connection label, centered on the curve midpoint.
pub fn label_rect(path: &CubicPath, label: &str) -> Option<Rect> {
    if label.trim().is_empty() {
        return None;
    }
    let width = estimate_text_width(label.trim(), LABEL_FONT_SIZE) + LABEL_PADDING_X * 2.0;
    Some(Rect::centered(path.midpoint(), width, LABEL_HEIGHT))
}

/// Connect and delete buttons sit on the card's top edge, right aligned.
pub fn control_centers(rect: Rect) -> [(NodeControl, Point); 2] {
    [
        (
            NodeControl::Connect,
            Point::new(rect.max_x - CONTROL_RADIUS * 3.0, rect.min_y),
        ),
        (NodeControl::Delete, Point::new(rect.max_x, rect.min_y)),
    ]
}

pub fn handle_centers(rect: Rect) -> [(AnchorSide, Point); 4] {
    AnchorSide::ALL.map(|side| (side, rect.anchor(side).point))
}

pub fn render_svg(scene: &Scene<'_>, options: &RenderOptions) -> Result<String> {
    let routes = scene.routes();
    let mut svg = String::new();

    write!(
        svg,
        r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="Inter, system-ui, sans-serif">
  <defs>
    <pattern id="lb-grid" width="{grid}" height="{grid}" patternUnits="userSpaceOnUse" patternTransform="{transform}">
      <circle cx="1" cy="1" r="1" fill="#d1d5db" />
    </pattern>
"##,
        w = options.width,
        h = options.height,
        grid = GRID_SPACING,
        transform = scene.viewport.svg_transform(),
    )?;

    for (index, (connection, _)) in routes.iter().enumerate() {
        write_arrow_markers(&mut svg, index, connection)?;
    }

    write!(
        svg,
        "  </defs>\n  <rect width=\"100%\" height=\"100%\" fill=\"{}\" />\n",
        escape_xml(&options.background)
    )?;
    if options.show_grid {
        svg.push_str("  <rect width=\"100%\" height=\"100%\" fill=\"url(#lb-grid)\" />\n");
    }

    write!(
        svg,
        "  <g class=\"viewport\" transform=\"{}\">\n",
        scene.viewport.svg_transform()
    )?;

    for (index, (connection, path)) in routes.iter().enumerate() {
        let selected = scene.selected_connection == Some(connection.id.as_str());
        write_connection(&mut svg, index, connection, path, selected, options)?;
    }

    if let Some((source_id, pointer)) = scene.connection_preview {
        if let Some(source) = scene.diagram.node(source_id) {
            let path = route_between(scene.node_rect(source), Rect::centered(pointer, 1.0, 1.0));
            write!(
                svg,
                "    <path class=\"connection-preview\" d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"2\" stroke-dasharray=\"6,4\" pointer-events=\"none\" />\n",
                path.to_svg_path(),
                PREVIEW_COLOR
            )?;
        }
    }

    for node in scene.diagram.nodes() {
        write_node(&mut svg, scene, node)?;
    }

    svg.push_str("  </g>\n</svg>\n");
    Ok(svg)
}

fn write_arrow_markers(svg: &mut String, index: usize, connection: &Connection) -> Result<()> {
    let style = &connection.style;
    if style.has_arrow {
        write!(
            svg,
            "    <marker id=\"lb-arrow-end-{index}\" viewBox=\"0 0 10 10\" refX=\"9\" refY=\"5\" markerWidth=\"{size:.1}\" markerHeight=\"{size:.1}\" markerUnits=\"userSpaceOnUse\" orient=\"auto\">\n      <path d=\"M0,0 L10,5 L0,10 z\" fill=\"{color}\" />\n    </marker>\n",
            size = style.arrow_size,
            color = escape_xml(&style.arrow_color),
        )?;
    }
    if style.has_reverse_arrow {
        write!(
            svg,
            "    <marker id=\"lb-arrow-start-{index}\" viewBox=\"0 0 10 10\" refX=\"9\" refY=\"5\" markerWidth=\"{size:.1}\" markerHeight=\"{size:.1}\" markerUnits=\"userSpaceOnUse\" orient=\"auto-start-reverse\">\n      <path d=\"M0,0 L10,5 L0,10 z\" fill=\"{color}\" />\n    </marker>\n",
            size = style.reverse_arrow_size,
            color = escape_xml(&style.reverse_arrow_color),
        )?;
    }
    Ok(())
}

fn write_connection(
    svg: &mut String,
    index: usize,
    connection: &Connection,
    path: &CubicPath,
    selected: bool,
    options: &RenderOptions,
) -> Result<()> {
    let style = &connection.style;
    let d = path.to_svg_path();
    let color = escape_xml(&style.color);
    let stroke_width = if selected {
        style.stroke_width + 1.0
    } else {
        style.stroke_width
    };

    write!(
        svg,
        "    <g class=\"connection\" data-id=\"{}\">\n",
        escape_xml(&connection.id)
    )?;
    write!(
        svg,
        "      <path d=\"{d}\" fill=\"none\" stroke=\"#ffffff\" stroke-opacity=\"0.85\" stroke-width=\"{:.1}\" stroke-linecap=\"round\" />\n",
        stroke_width + HALO_EXTRA_WIDTH
    )?;

    let dash_attr = style
        .dash_pattern
        .dasharray()
        .map(|dash| format!(" stroke-dasharray=\"{dash}\""))
        .unwrap_or_default();
    let marker_end_attr = if style.has_arrow {
        format!(" marker-end=\"url(#lb-arrow-end-{index})\"")
    } else {
        String::new()
    };
    let marker_start_attr = if style.has_reverse_arrow {
        format!(" marker-start=\"url(#lb-arrow-start-{index})\"")
    } else {
        String::new()
    };

    write!(
        svg,
        "      <path id=\"lb-path-{index}\" d=\"{d}\" fill=\"none\" stroke=\"{color}\" stroke-width=\"{stroke_width:.1}\" stroke-linecap=\"round\"{dash_attr}{marker_start_attr}{marker_end_attr} />\n"
    )?;

    if options.animate_connections && options.travel_markers > 0 {
        let count = options.travel_markers;
        for marker in 0..count {
            let delay = TRAVEL_DURATION_SECS * marker as f32 / count as f32;
            write!(
                svg,
                "      <circle r=\"{:.1}\" fill=\"{color}\" pointer-events=\"none\">\n        <animateMotion dur=\"{TRAVEL_DURATION_SECS}s\" begin=\"-{delay:.2}s\" repeatCount=\"indefinite\">\n          <mpath href=\"#lb-path-{index}\" />\n        </animateMotion>\n      </circle>\n",
                style.stroke_width + 1.5
            )?;
        }
    }

    if let Some(rect) = label_rect(path, &connection.label) {
        let center = rect.center();
        write!(
            svg,
            "      <g class=\"connection-label\">\n        <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"{:.1}\" ry=\"{:.1}\" fill=\"white\" fill-opacity=\"0.96\" stroke=\"{color}\" stroke-width=\"{}\" />\n        <text x=\"{:.1}\" y=\"{:.1}\" fill=\"{}\" font-size=\"{LABEL_FONT_SIZE}\" text-anchor=\"middle\" dominant-baseline=\"middle\" xml:space=\"preserve\">{}</text>\n      </g>\n",
            rect.min_x,
            rect.min_y,
            rect.width(),
            rect.height(),
            LABEL_HEIGHT / 2.0,
            LABEL_HEIGHT / 2.0,
            if selected { 2 } else { 1 },
            center.x,
            center.y,
            escape_xml(&style.text_color),
            escape_xml(connection.label.trim())
        )?;
    }

    svg.push_str("    </g>\n");
    Ok(())
}

fn write_node(svg: &mut String, scene: &Scene<'_>, node: &Node) -> Result<()> {
    let rect = scene.node_rect(node);
    let center = rect.center();
    let accent = escape_xml(node.accent_color());
    let selected = scene.is_selected(&node.id);

    write!(
        svg,
        "    <g class=\"node\" data-id=\"{}\" data-kind=\"{}\">\n",
        escape_xml(&node.id),
        escape_xml(node.kind.as_str())
    )?;

    if selected {
        let ring = rect.inflate(SELECTION_RING_GAP);
        write!(
            svg,
            "      <rect class=\"selection-ring\" x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"16\" ry=\"16\" fill=\"none\" stroke=\"{accent}\" stroke-width=\"2\">\n        <animate attributeName=\"stroke-opacity\" values=\"0.9;0.25;0.9\" dur=\"1.6s\" repeatCount=\"indefinite\" />\n      </rect>\n",
            ring.min_x,
            ring.min_y,
            ring.width(),
            ring.height()
        )?;
    }

    write!(
        svg,
        "      <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"12\" ry=\"12\" fill=\"#ffffff\" stroke=\"{accent}\" stroke-width=\"{}\" />\n",
        rect.min_x,
        rect.min_y,
        rect.width(),
        rect.height(),
        if selected { 3 } else { 2 }
    )?;

    let avatar = Point::new(rect.min_x + 12.0 + AVATAR_RADIUS, center.y);
    write!(
        svg,
        "      <circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"{AVATAR_RADIUS}\" fill=\"{accent}\" />\n      <text x=\"{:.1}\" y=\"{:.1}\" fill=\"#ffffff\" font-size=\"14\" font-weight=\"600\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>\n",
        avatar.x,
        avatar.y,
        avatar.x,
        avatar.y,
        escape_xml(&initial(&node.name))
    )?;

    let text_x = avatar.x + AVATAR_RADIUS + 8.0;
    write!(
        svg,
        "      <text x=\"{:.1}\" y=\"{:.1}\" fill=\"#111827\" font-size=\"14\" font-weight=\"600\" dominant-baseline=\"middle\">{}</text>\n",
        text_x,
        center.y - 9.0,
        escape_xml(&truncate_label(&node.name, NAME_MAX_CHARS))
    )?;

    let badge = node.kind.badge();
    let badge_width = estimate_text_width(&badge, 10.0) + 12.0;
    write!(
        svg,
        "      <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"16\" rx=\"8\" ry=\"8\" fill=\"{accent}\" fill-opacity=\"0.15\" />\n      <text x=\"{:.1}\" y=\"{:.1}\" fill=\"{accent}\" font-size=\"10\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>\n",
        text_x,
        center.y + 4.0,
        badge_width,
        text_x + badge_width / 2.0,
        center.y + 12.0,
        escape_xml(&badge)
    )?;

    if scene.shows_handles(&node.id) {
        for (side, point) in handle_centers(rect) {
            write!(
                svg,
                "      <circle class=\"handle\" data-side=\"{}\" cx=\"{:.1}\" cy=\"{:.1}\" r=\"{HANDLE_RADIUS}\" fill=\"#ffffff\" stroke=\"{accent}\" stroke-width=\"2\" />\n",
                side.as_str(),
                point.x,
                point.y
            )?;
        }
    }

    if selected {
        for (control, point) in control_centers(rect) {
            let (class, glyph, fill) = match control {
                NodeControl::Connect => ("control-connect", "+", "#2563eb"),
                NodeControl::Delete => ("control-delete", "\u{00d7}", "#dc2626"),
                NodeControl::Handle(_) => continue,
            };
            write!(
                svg,
                "      <g class=\"{class}\">\n        <circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"{CONTROL_RADIUS}\" fill=\"{fill}\" />\n        <text x=\"{:.1}\" y=\"{:.1}\" fill=\"#ffffff\" font-size=\"14\" text-anchor=\"middle\" dominant-baseline=\"central\">{glyph}</text>\n      </g>\n",
                point.x,
                point.y,
                point.x,
                point.y
            )?;
        }
    }

    svg.push_str("    </g>\n");
    Ok(())
}

/// Rasterizes an SVG produced by this crate.
#[cfg(feature = "raster")]
pub fn rasterize_svg(svg: &str, scale: f32) -> Result<Vec<u8>> {
    if scale <= 0.0 {
        bail!("scale must be greater than zero when rendering PNG output");
    }

    let mut options = resvg::usvg::Options::default();
    options.font_family = "Inter".to_string();
    options.fontdb_mut().load_system_fonts();

    let tree = resvg::usvg::Tree::from_str(svg, &options)
        .map_err(|err| anyhow!("failed to parse generated SVG for PNG export: {err}"))?;

    let size = tree.size().to_int_size();
    let scaled_width = ((size.width() as f32) * scale).ceil();
    let scaled_height = ((size.height() as f32) * scale).ceil();

    if !scaled_width.is_finite() || !scaled_height.is_finite() {
        bail!("scaled dimensions are not finite; try a smaller scale factor");
    }
    if scaled_width < 1.0 || scaled_height < 1.0 {
        bail!("scaled dimensions collapsed below 1px; try a larger scale factor");
    }
    if scaled_width > u32::MAX as f32 || scaled_height > u32::MAX as f32 {
        bail!("scaled dimensions exceed supported limits; try a smaller scale factor");
    }

    let scaled_width = scaled_width as u32;
    let scaled_height = scaled_height as u32;

    let mut pixmap = Pixmap::new(scaled_width, scaled_height).ok_or_else(|| {
        anyhow!("failed to allocate {scaled_width}x{scaled_height} surface for PNG export")
    })?;

    resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|err| anyhow!("failed to encode PNG output: {err}"))
}

#[cfg(feature = "raster")]
pub fn render_png(scene: &Scene<'_>, options: &RenderOptions, scale: f32) -> Result<Vec<u8>> {
    let svg = render_svg(scene, options)?;
    rasterize_svg(&svg, scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Diagram {
        let mut diagram = Diagram::new();
        diagram.place_node(Node::new("c1", NodeKind::Character, "Ayla", Point::new(0.0, 0.0)));
        diagram.place_node(Node::new("c2", NodeKind::Location, "Highkeep", Point::new(400.0, 0.0)));
        diagram
            .add_connection("c1", "c2", chrono::Utc::now())
            .expect("both nodes are placed");
        diagram
    }

    #[test]
    fn renders_halo_stroke_label_and_cards() {
        let diagram = sample();
        let viewport = Viewport::default();
        let svg = render_svg(&Scene::new(&diagram, &viewport), &RenderOptions::default()).unwrap();

        assert!(svg.contains("<svg"));
        assert!(svg.contains("M 150.0 40.0 C 250.0 40.0, 300.0 40.0, 400.0 40.0"));
        assert!(svg.contains("stroke=\"#ffffff\" stroke-opacity=\"0.85\" stroke-width=\"6.0\""));
        assert!(svg.contains("marker-end=\"url(#lb-arrow-end-0)\""));
        assert!(!svg.contains("marker-start"));
        assert!(svg.contains(">friendship</text>"));
        assert!(svg.contains(">Ayla</text>"));
        assert!(svg.contains(">Location</text>"));
        assert!(svg.contains("<animateMotion"));
    }

    #[test]
    fn disabled_animation_and_grid_are_omitted() {
        let diagram = sample();
        let viewport = Viewport::default();
        let options = RenderOptions {
            show_grid: false,
            animate_connections: false,
            ..RenderOptions::default()
        };
        let svg = render_svg(&Scene::new(&diagram, &viewport), &options).unwrap();
        assert!(!svg.contains("<animateMotion"));
        assert!(!svg.contains("url(#lb-grid)"));
    }

    #[test]
    fn dangling_connections_are_skipped() {
        let mut diagram = sample();
        diagram.remove_node("c2");
        diagram.place_node(Node::new("c3", NodeKind::Item, "Lantern", Point::new(0.0, 300.0)));
        diagram
            .restore_connection(Connection {
                id: "ghost".to_string(),
                from_node_id: "c3".to_string(),
                to_node_id: "nobody".to_string(),
                label: "neutral".to_string(),
                relationship_type: RelationshipType::Neutral,
                style: ConnectionStyle::for_type(RelationshipType::Neutral),
            })
            .unwrap();

        let viewport = Viewport::default();
        let svg = render_svg(&Scene::new(&diagram, &viewport), &RenderOptions::default()).unwrap();
        assert!(!svg.contains("data-id=\"ghost\""));
        assert!(svg.contains(">Lantern</text>"));
    }

    #[test]
    fn drag_offset_moves_card_and_route() {
        let diagram = sample();
        let viewport = Viewport::default();
        let mut scene = Scene::new(&diagram, &viewport);
        scene.drag = Some(("c2", Point::new(-400.0, 200.0)));

        let routes = scene.routes();
        let (_, path) = routes[0];
        assert_eq!(path.start, Point::new(75.0, 80.0));
        assert_eq!(path.end, Point::new(75.0, 200.0));
    }

    #[test]
    fn selection_exposes_ring_controls_and_handles() {
        let diagram = sample();
        let viewport = Viewport::default();
        let mut scene = Scene::new(&diagram, &viewport);
        scene.selected_node = Some("c1");

        let svg = render_svg(&scene, &RenderOptions::default()).unwrap();
        assert!(svg.contains("selection-ring"));
        assert!(svg.contains("control-connect"));
        assert!(svg.contains("control-delete"));
        assert_eq!(svg.matches("class=\"handle\"").count(), 4);
    }

    #[test]
    fn framing_shifts_bounds_into_the_margin() {
        let diagram = sample();
        let (viewport, width, height) = frame_diagram(&diagram);
        assert_eq!(viewport.offset(), Point::new(FRAME_MARGIN, FRAME_MARGIN));
        assert_eq!(width, 550 + 120);
        assert_eq!(height, 80 + 120);

        let (empty, width, height) = frame_diagram(&Diagram::new());
        assert_eq!(empty, Viewport::default());
        assert_eq!((width, height), (400, 300));
    }

    #[test]
    fn both_arrowheads_render_with_their_own_markers() {
        let mut diagram = sample();
        let id = diagram.connections()[0].id.clone();
        diagram
            .update_connection(
                &id,
                ConnectionPatch {
                    has_reverse_arrow: Some(true),
                    reverse_arrow_color: Some("#111111".to_string()),
                    dash_pattern: Some(DashPattern::Dotted),
                    ..ConnectionPatch::default()
                },
            )
            .unwrap();

        let viewport = Viewport::default();
        let svg = render_svg(&Scene::new(&diagram, &viewport), &RenderOptions::default()).unwrap();
        assert!(svg.contains("id=\"lb-arrow-start-0\""));
        assert!(svg.contains("orient=\"auto-start-reverse\""));
        assert!(svg.contains("fill=\"#111111\""));
        assert!(svg.contains("stroke-dasharray=\"2,4\""));
    }
}

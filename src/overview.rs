use std::collections::HashMap;
use std::f32::consts::{FRAC_PI_2, TAU};
use std::fmt::Write as FmtWrite;

use anyhow::Result;

use crate::*;

const NODE_RADIUS: f32 = 28.0;
const RING_MARGIN: f32 = 80.0;

/// Centers of every node evenly spaced on a circle around the canvas
/// center, first node at twelve o'clock, in node order.
pub fn radial_positions(diagram: &Diagram, width: f32, height: f32) -> Vec<(&str, Point)> {
    let center = Point::new(width / 2.0, height / 2.0);
    let count = diagram.nodes().len();
    if count == 1 {
        return vec![(diagram.nodes()[0].id.as_str(), center)];
    }

    let radius = (width.min(height) / 2.0 - RING_MARGIN).max(NODE_RADIUS * 2.0);
    diagram
        .nodes()
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let angle = -FRAC_PI_2 + TAU * index as f32 / count as f32;
            (
                node.id.as_str(),
                center.translate(radius * angle.cos(), radius * angle.sin()),
            )
        })
        .collect()
}

/// Read-only network view: automatic radial layout, quadratic curves between
/// node centers, no selection state.
pub fn render_overview_svg(diagram: &Diagram, options: &RenderOptions) -> Result<String> {
    let width = options.width as f32;
    let height = options.height as f32;
    let positions: HashMap<&str, Point> = radial_positions(diagram, width, height)
        .into_iter()
        .collect();

    let mut svg = String::new();
    write!(
        svg,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="Inter, system-ui, sans-serif">
  <rect width="100%" height="100%" fill="{bg}" />
"#,
        w = options.width,
        h = options.height,
        bg = escape_xml(&options.background),
    )?;

    for (connection, from, to) in diagram.resolved_connections() {
        let (Some(start), Some(end)) = (positions.get(from.id.as_str()), positions.get(to.id.as_str()))
        else {
            continue;
        };
        let path = overview_path(*start, *end);
        let style = &connection.style;
        let dash_attr = style
            .dash_pattern
            .dasharray()
            .map(|dash| format!(" stroke-dasharray=\"{dash}\""))
            .unwrap_or_default();
        write!(
            svg,
            "  <path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{:.1}\" stroke-opacity=\"0.8\"{dash_attr} />\n",
            path.to_svg_path(),
            escape_xml(&style.color),
            style.stroke_width
        )?;

        let label = connection.label.trim();
        if !label.is_empty() {
            let mid = path.midpoint();
            write!(
                svg,
                "  <text x=\"{:.1}\" y=\"{:.1}\" fill=\"{}\" font-size=\"11\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>\n",
                mid.x,
                mid.y,
                escape_xml(&style.text_color),
                escape_xml(label)
            )?;
        }
    }

    for node in diagram.nodes() {
        let Some(center) = positions.get(node.id.as_str()) else {
            continue;
        };
        let accent = escape_xml(node.accent_color());
        write!(
            svg,
            "  <g class=\"overview-node\" data-id=\"{}\">\n    <circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"{NODE_RADIUS}\" fill=\"{accent}\" />\n    <text x=\"{:.1}\" y=\"{:.1}\" fill=\"#ffffff\" font-size=\"16\" font-weight=\"600\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>\n    <text x=\"{:.1}\" y=\"{:.1}\" fill=\"#111827\" font-size=\"12\" text-anchor=\"middle\">{}</text>\n  </g>\n",
            escape_xml(&node.id),
            center.x,
            center.y,
            center.x,
            center.y,
            escape_xml(&initial(&node.name)),
            center.x,
            center.y + NODE_RADIUS + 16.0,
            escape_xml(&truncate_label(&node.name, 18))
        )?;
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

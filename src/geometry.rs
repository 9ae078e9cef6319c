use serde::{Deserialize, Serialize};

/// Fraction of the anchor distance used as the bezier control offset.
pub const CONTROL_DISTANCE_RATIO: f32 = 0.4;
pub const MAX_CONTROL_DISTANCE: f32 = 100.0;

pub const OVERVIEW_BULGE_RATIO: f32 = 0.2;
pub const MAX_OVERVIEW_BULGE: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn translate(self, dx: f32, dy: f32) -> Point {
        Point {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    fn toward(self, side: AnchorSide, amount: f32) -> Point {
        let (ux, uy) = side.unit();
        self.translate(ux * amount, uy * amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Axis aligned rectangle in diagram space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Rect {
    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self {
            min_x: origin.x,
            min_y: origin.y,
            max_x: origin.x + size.width,
            max_y: origin.y + size.height,
        }
    }

    pub fn centered(center: Point, width: f32, height: f32) -> Self {
        Self {
            min_x: center.x - width / 2.0,
            min_y: center.y - height / 2.0,
            max_x: center.x + width / 2.0,
            max_y: center.y + height / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point {
        Point {
            x: (self.min_x + self.max_x) / 2.0,
            y: (self.min_y + self.max_y) / 2.0,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
    }

    pub fn inflate(self, amount: f32) -> Rect {
        Rect {
            min_x: self.min_x - amount,
            min_y: self.min_y - amount,
            max_x: self.max_x + amount,
            max_y: self.max_y + amount,
        }
    }

    pub fn union(self, other: Rect) -> Rect {
        Rect {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Mid point of the given edge, tagged with its exit side.
    pub fn anchor(&self, side: AnchorSide) -> Anchor {
        let center = self.center();
        let point = match side {
            AnchorSide::Left => Point::new(self.min_x, center.y),
            AnchorSide::Right => Point::new(self.max_x, center.y),
            AnchorSide::Top => Point::new(center.x, self.min_y),
            AnchorSide::Bottom => Point::new(center.x, self.max_y),
        };
        Anchor { point, side }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorSide {
    Left,
    Right,
    Top,
    Bottom,
}

impl AnchorSide {
    pub const ALL: [AnchorSide; 4] = [
        AnchorSide::Top,
        AnchorSide::Right,
        AnchorSide::Bottom,
        AnchorSide::Left,
    ];

    /// Outward unit vector of the edge.
    pub fn unit(self) -> (f32, f32) {
        match self {
            AnchorSide::Left => (-1.0, 0.0),
            AnchorSide::Right => (1.0, 0.0),
            AnchorSide::Top => (0.0, -1.0),
            AnchorSide::Bottom => (0.0, 1.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorSide::Left => "left",
            AnchorSide::Right => "right",
            AnchorSide::Top => "top",
            AnchorSide::Bottom => "bottom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub point: Point,
    pub side: AnchorSide,
}

/// Picks the attachment edges for a connection between two node rectangles.
///
/// Horizontal wins only when `|dx| > |dy|`; ties route vertically. The left
/// node attaches on its right edge and the upper node on its bottom edge,
/// so swapping the arguments swaps the anchors without changing them.
pub fn select_anchors(from: Rect, to: Rect) -> (Anchor, Anchor) {
    let a = from.center();
    let b = to.center();
    let dx = b.x - a.x;
    let dy = b.y - a.y;

    if dx.abs() > dy.abs() {
        if dx > 0.0 {
            (from.anchor(AnchorSide::Right), to.anchor(AnchorSide::Left))
        } else {
            (from.anchor(AnchorSide::Left), to.anchor(AnchorSide::Right))
        }
    } else if dy > 0.0 {
        (from.anchor(AnchorSide::Bottom), to.anchor(AnchorSide::Top))
    } else {
        (from.anchor(AnchorSide::Top), to.anchor(AnchorSide::Bottom))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicPath {
    pub start: Point,
    pub control1: Point,
    pub control2: Point,
    pub end: Point,
}

impl CubicPath {
    pub fn point_at(&self, t: f32) -> Point {
        let u = 1.0 - t;
        let b0 = u * u * u;
        let b1 = 3.0 * u * u * t;
        let b2 = 3.0 * u * t * t;
        let b3 = t * t * t;
        Point {
            x: b0 * self.start.x + b1 * self.control1.x + b2 * self.control2.x + b3 * self.end.x,
            y: b0 * self.start.y + b1 * self.control1.y + b2 * self.control2.y + b3 * self.end.y,
        }
    }

    pub fn midpoint(&self) -> Point {
        self.point_at(0.5)
    }

    pub fn to_svg_path(&self) -> String {
        format!(
            "M {:.1} {:.1} C {:.1} {:.1}, {:.1} {:.1}, {:.1} {:.1}",
            self.start.x,
            self.start.y,
            self.control1.x,
            self.control1.y,
            self.control2.x,
            self.control2.y,
            self.end.x,
            self.end.y
        )
    }
}

/// Cubic curve that leaves `from` and enters `to` perpendicular to their edges.
pub fn connection_path(from: Anchor, to: Anchor) -> CubicPath {
    let distance = from.point.distance(to.point);
    let control = (distance * CONTROL_DISTANCE_RATIO).min(MAX_CONTROL_DISTANCE);

    CubicPath {
        start: from.point,
        control1: from.point.toward(from.side, control),
        control2: to.point.toward(to.side, control),
        end: to.point,
    }
}

/// Convenience for the common case of routing between two node rectangles.
pub fn route_between(from: Rect, to: Rect) -> CubicPath {
    let (start, end) = select_anchors(from, to);
    connection_path(start, end)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraticPath {
    pub start: Point,
    pub control: Point,
    pub end: Point,
}

impl QuadraticPath {
    pub fn point_at(&self, t: f32) -> Point {
        let u = 1.0 - t;
        Point {
            x: u * u * self.start.x + 2.0 * u * t * self.control.x + t * t * self.end.x,
            y: u * u * self.start.y + 2.0 * u * t * self.control.y + t * t * self.end.y,
        }
    }

    pub fn midpoint(&self) -> Point {
        self.point_at(0.5)
    }

    pub fn to_svg_path(&self) -> String {
        format!(
            "M {:.1} {:.1} Q {:.1} {:.1}, {:.1} {:.1}",
            self.start.x,
            self.start.y,
            self.control.x,
            self.control.y,
            self.end.x,
            self.end.y
        )
    }
}

/// Lighter curve for the read-only overview: centers joined by a quadratic
/// whose control point sits off the chord's midpoint, perpendicular to it.
pub fn overview_path(from: Point, to: Point) -> QuadraticPath {
    let mid = Point::new((from.x + to.x) / 2.0, (from.y + to.y) / 2.0);
    let distance = from.distance(to);
    if distance <= f32::EPSILON {
        return QuadraticPath {
            start: from,
            control: mid,
            end: to,
        };
    }

    let bulge = (distance * OVERVIEW_BULGE_RATIO).min(MAX_OVERVIEW_BULGE);
    let nx = -(to.y - from.y) / distance;
    let ny = (to.x - from.x) / distance;

    QuadraticPath {
        start: from,
        control: mid.translate(nx * bulge, ny * bulge),
        end: to,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::from_origin_size(Point::new(x, y), Size::new(w, h))
    }

    #[test]
    fn horizontal_neighbours_use_facing_edges() {
        let a = rect(0.0, 0.0, 150.0, 80.0);
        let b = rect(400.0, 0.0, 150.0, 80.0);

        let (start, end) = select_anchors(a, b);
        assert_eq!(start.point, Point::new(150.0, 40.0));
        assert_eq!(start.side, AnchorSide::Right);
        assert_eq!(end.point, Point::new(400.0, 40.0));
        assert_eq!(end.side, AnchorSide::Left);

        let path = connection_path(start, end);
        assert_eq!(path.control1, Point::new(250.0, 40.0));
        assert_eq!(path.control2, Point::new(300.0, 40.0));
        assert_eq!(
            path.to_svg_path(),
            "M 150.0 40.0 C 250.0 40.0, 300.0 40.0, 400.0 40.0"
        );
    }

    #[test]
    fn anchor_choice_does_not_depend_on_argument_order() {
        let a = rect(0.0, 0.0, 150.0, 80.0);
        let b = rect(400.0, 10.0, 150.0, 80.0);

        let (ab_start, ab_end) = select_anchors(a, b);
        let (ba_start, ba_end) = select_anchors(b, a);

        assert_eq!(ab_start, ba_end);
        assert_eq!(ab_end, ba_start);
    }

    #[test]
    fn stacked_nodes_route_vertically() {
        let upper = rect(0.0, 0.0, 150.0, 80.0);
        let lower = rect(30.0, 300.0, 150.0, 80.0);

        let (start, end) = select_anchors(lower, upper);
        assert_eq!(start.side, AnchorSide::Top);
        assert_eq!(start.point, Point::new(105.0, 300.0));
        assert_eq!(end.side, AnchorSide::Bottom);
        assert_eq!(end.point, Point::new(75.0, 80.0));
    }

    #[test]
    fn equal_deltas_prefer_vertical_routing() {
        let a = rect(0.0, 0.0, 100.0, 100.0);
        let b = rect(200.0, 200.0, 100.0, 100.0);

        let (start, end) = select_anchors(a, b);
        assert_eq!(start.side, AnchorSide::Bottom);
        assert_eq!(end.side, AnchorSide::Top);
    }

    #[test]
    fn control_distance_scales_then_caps() {
        let near = connection_path(
            Anchor {
                point: Point::new(0.0, 0.0),
                side: AnchorSide::Right,
            },
            Anchor {
                point: Point::new(100.0, 0.0),
                side: AnchorSide::Left,
            },
        );
        assert!((near.control1.x - 40.0).abs() < 1e-4);
        assert!((near.control2.x - 60.0).abs() < 1e-4);

        let far = connection_path(
            Anchor {
                point: Point::new(0.0, 0.0),
                side: AnchorSide::Bottom,
            },
            Anchor {
                point: Point::new(0.0, 1000.0),
                side: AnchorSide::Top,
            },
        );
        assert_eq!(far.control1, Point::new(0.0, 100.0));
        assert_eq!(far.control2, Point::new(0.0, 900.0));
    }

    #[test]
    fn cubic_midpoint_of_symmetric_curve_is_chord_midpoint() {
        let path = route_between(rect(0.0, 0.0, 150.0, 80.0), rect(400.0, 0.0, 150.0, 80.0));
        let mid = path.midpoint();
        assert!((mid.x - 275.0).abs() < 1e-3);
        assert!((mid.y - 40.0).abs() < 1e-3);
    }

    #[test]
    fn overview_curve_bulges_perpendicular_to_chord() {
        let path = overview_path(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        assert_eq!(path.control, Point::new(50.0, 20.0));

        let long = overview_path(Point::new(0.0, 0.0), Point::new(0.0, 1000.0));
        assert_eq!(long.control, Point::new(-50.0, 500.0));

        let degenerate = overview_path(Point::new(5.0, 5.0), Point::new(5.0, 5.0));
        assert_eq!(degenerate.control, Point::new(5.0, 5.0));
    }
}

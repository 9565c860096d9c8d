//! Planar layout geometry: polygons, optical ports and components
//!
//! Coordinates are in µm. Port orientations are in degrees and point out of
//! the component (0 = +x, 90 = +y).

use nalgebra::{Point2, Rotation2, Vector2};
use serde::{Deserialize, Serialize};

use crate::error::{PdkError, Result};
use crate::tech::Layer;

pub type Point = Point2<f64>;

/// Closed polygon on one layer. The last point connects back to the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub layer: Layer,
    pub points: Vec<Point>,
}

impl Polygon {
    pub fn new(layer: Layer, points: Vec<Point>) -> Self {
        Self { layer, points }
    }

    pub fn rect(layer: Layer, min: Point, max: Point) -> Self {
        Self::new(
            layer,
            vec![
                min,
                Point::new(max.x, min.y),
                max,
                Point::new(min.x, max.y),
            ],
        )
    }

    pub fn bbox(&self) -> Option<BBox> {
        BBox::from_points(&self.points)
    }

    /// Mirror about the x axis (y -> -y), keeping the winding order.
    pub fn mirrored_y(&self) -> Self {
        let mut points: Vec<Point> = self.points.iter().map(|p| Point::new(p.x, -p.y)).collect();
        points.reverse();
        Self::new(self.layer, points)
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min: Point,
    pub max: Point,
}

impl BBox {
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = BBox {
            min: *first,
            max: *first,
        };
        for p in &points[1..] {
            bbox.include(p);
        }
        Some(bbox)
    }

    fn include(&mut self, p: &Point) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    pub fn union(&self, other: &BBox) -> BBox {
        let mut out = *self;
        out.include(&other.min);
        out.include(&other.max);
        out
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn expanded(&self, top: f64, bottom: f64, left: f64, right: f64) -> BBox {
        BBox {
            min: Point::new(self.min.x - left, self.min.y - bottom),
            max: Point::new(self.max.x + right, self.max.y + top),
        }
    }
}

/// Optical port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub center: Point,
    pub width: f64,
    /// Outward-facing direction in degrees
    pub orientation: f64,
    pub layer: Layer,
}

impl Port {
    pub fn new(name: &str, center: Point, width: f64, orientation: f64) -> Self {
        Self {
            name: name.to_string(),
            center,
            width,
            orientation,
            layer: Layer::WG,
        }
    }

    /// Unit vector pointing out of the component
    pub fn direction(&self) -> Vector2<f64> {
        Rotation2::new(self.orientation.to_radians()) * Vector2::x()
    }
}

/// A generated cell: polygons plus ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub polygons: Vec<Polygon>,
    pub ports: Vec<Port>,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            polygons: Vec::new(),
            ports: Vec::new(),
        }
    }

    pub fn add_polygon(&mut self, polygon: Polygon) {
        self.polygons.push(polygon);
    }

    pub fn add_port(&mut self, port: Port) {
        self.ports.push(port);
    }

    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// Bounding box over all polygons
    pub fn bbox(&self) -> Option<BBox> {
        self.polygons
            .iter()
            .filter_map(Polygon::bbox)
            .reduce(|a, b| a.union(&b))
    }

    /// Like [`Component::bbox`] but an empty component is an error.
    pub fn require_bbox(&self) -> Result<BBox> {
        self.bbox()
            .ok_or_else(|| PdkError::Geometry(format!("component `{}` has no polygons", self.name)))
    }

    /// Wrap in a container whose floorplan rectangle adds the given margins.
    pub fn with_padding(&self, top: f64, bottom: f64, left: f64, right: f64) -> Result<Component> {
        let bbox = self.require_bbox()?.expanded(top, bottom, left, right);
        let mut padded = self.clone();
        padded.name = format!("{}_padded", self.name);
        padded.add_polygon(Polygon::rect(Layer::FLOORPLAN, bbox.min, bbox.max));
        Ok(padded)
    }

    /// Extend every port outward with a straight section of the port's width.
    pub fn with_extended_ports(&self, length: f64) -> Component {
        let mut extended = self.clone();
        extended.name = format!("{}_extended", self.name);
        if length <= 0.0 {
            return extended;
        }
        for port in extended.ports.iter_mut() {
            let start = port.center;
            let end = start + port.direction() * length;
            extended
                .polygons
                .push(extrude(&[start, end], port.width, port.layer));
            port.center = end;
        }
        extended
    }
}

/// Sweep a polyline into a polygon of constant width.
///
/// Joins use the averaged normal of the adjacent segments.
pub fn extrude(path: &[Point], width: f64, layer: Layer) -> Polygon {
    extrude_varying(path, &vec![width; path.len()], layer)
}

/// Sweep a polyline into a polygon whose width is given per path point.
pub fn extrude_varying(path: &[Point], widths: &[f64], layer: Layer) -> Polygon {
    let n = path.len();
    let mut left = Vec::with_capacity(n);
    let mut right = Vec::with_capacity(n);
    for i in 0..n {
        let incoming = if i > 0 { unit(path[i] - path[i - 1]) } else { Vector2::zeros() };
        let outgoing = if i + 1 < n { unit(path[i + 1] - path[i]) } else { Vector2::zeros() };
        let tangent = incoming + outgoing;
        let tangent = tangent.try_normalize(1e-15).unwrap_or_else(Vector2::x);
        let normal = Vector2::new(-tangent.y, tangent.x);
        let half = widths[i] / 2.0;
        left.push(path[i] + normal * half);
        right.push(path[i] - normal * half);
    }
    right.reverse();
    left.extend(right);
    Polygon::new(layer, left)
}

fn unit(v: Vector2<f64>) -> Vector2<f64> {
    v.try_normalize(1e-12).unwrap_or_else(Vector2::zeros)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn straight() -> Component {
        let mut c = Component::new("straight");
        c.add_polygon(extrude(
            &[Point::new(0.0, 0.0), Point::new(10.0, 0.0)],
            1.0,
            Layer::WG,
        ));
        c.add_port(Port::new("o1", Point::new(0.0, 0.0), 1.0, 180.0));
        c.add_port(Port::new("o2", Point::new(10.0, 0.0), 1.0, 0.0));
        c
    }

    #[test]
    fn test_bbox() {
        let bbox = straight().bbox().unwrap();
        assert_relative_eq!(bbox.min.x, 0.0);
        assert_relative_eq!(bbox.min.y, -0.5);
        assert_relative_eq!(bbox.max.x, 10.0);
        assert_relative_eq!(bbox.max.y, 0.5);
    }

    #[test]
    fn test_padding_grows_bbox_only() {
        let padded = straight().with_padding(2.0, 1.0, 3.0, 4.0).unwrap();
        let bbox = padded.bbox().unwrap();
        assert_relative_eq!(bbox.min.x, -3.0);
        assert_relative_eq!(bbox.min.y, -1.5);
        assert_relative_eq!(bbox.max.x, 14.0);
        assert_relative_eq!(bbox.max.y, 2.5);
        assert_eq!(padded.ports, straight().ports);
    }

    #[test]
    fn test_extend_ports_moves_ports_outward() {
        let c = straight().with_extended_ports(5.0);
        let o1 = c.port("o1").unwrap();
        let o2 = c.port("o2").unwrap();
        assert_relative_eq!(o1.center.x, -5.0, epsilon = 1e-12);
        assert_relative_eq!(o2.center.x, 15.0, epsilon = 1e-12);
        assert_relative_eq!(c.bbox().unwrap().width(), 20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_component_has_no_bbox() {
        let c = Component::new("empty");
        assert!(c.bbox().is_none());
        assert!(matches!(c.with_padding(1.0, 1.0, 1.0, 1.0), Err(PdkError::Geometry(_))));
    }
}

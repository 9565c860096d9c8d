//! GDSII stream output for flat components
//!
//! Each component becomes one structure holding a boundary per polygon and a
//! text label per port. The database unit is 1 nm and the user unit 1 µm.

use chrono::{NaiveDate, NaiveDateTime};
use gds21::{
    GdsBoundary, GdsDateTimes, GdsElement, GdsLibrary, GdsPoint, GdsStruct, GdsTextElem, GdsUnits,
};

use crate::error::{PdkError, Result};
use crate::geometry::{Component, Point, Polygon, Port};
use crate::tech::Layer;

/// Library name written to LIBNAME
pub const LIBRARY_NAME: &str = "SIN_PDK";

/// Stream format version written to HEADER
const GDS_VERSION: i16 = 600;

/// Database units per user unit (nm per µm)
const DB_PER_UM: f64 = 1000.0;

/// XY records are limited to 8191 points; the closing point counts.
const MAX_POLYGON_POINTS: usize = 8190;

/// Serialize a component as a single-structure GDSII library.
pub fn to_gds_bytes(component: &Component) -> Result<Vec<u8>> {
    let lib = to_gds_library(component)?;
    let mut bytes = Vec::new();
    lib.write(&mut bytes)
        .map_err(|e| PdkError::Gds(format!("writing `{}`: {e}", component.name)))?;
    Ok(bytes)
}

/// Build the in-memory library for a component.
pub fn to_gds_library(component: &Component) -> Result<GdsLibrary> {
    let dates = fixed_dates()?;

    let mut elems = Vec::with_capacity(component.polygons.len() + component.ports.len());
    for polygon in &component.polygons {
        elems.push(boundary(polygon)?);
    }
    for port in &component.ports {
        elems.push(label(port)?);
    }

    Ok(GdsLibrary {
        name: LIBRARY_NAME.to_string(),
        version: GDS_VERSION,
        dates: dates.clone(),
        units: GdsUnits::new(1.0 / DB_PER_UM, 1e-9),
        structs: vec![GdsStruct {
            name: component.name.clone(),
            dates,
            elems,
        }],
        ..Default::default()
    })
}

/// Modification and access times are pinned so identical geometry gives identical bytes.
fn fixed_dates() -> Result<GdsDateTimes> {
    let stamp: NaiveDateTime = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| PdkError::Gds("invalid library timestamp".to_string()))?;
    Ok(GdsDateTimes {
        modified: stamp,
        accessed: stamp,
    })
}

fn boundary(polygon: &Polygon) -> Result<GdsElement> {
    let n = polygon.points.len();
    if n < 3 {
        return Err(PdkError::Geometry(format!(
            "polygon on layer {:?} has {n} points, need at least 3",
            polygon.layer
        )));
    }
    if n > MAX_POLYGON_POINTS {
        return Err(PdkError::Geometry(format!(
            "polygon on layer {:?} has {n} points, GDSII allows {MAX_POLYGON_POINTS}",
            polygon.layer
        )));
    }

    let mut xy = polygon
        .points
        .iter()
        .map(to_gds_point)
        .collect::<Result<Vec<_>>>()?;
    // Close the ring
    xy.push(xy[0].clone());

    Ok(GdsBoundary {
        layer: polygon.layer.number(),
        datatype: polygon.layer.datatype(),
        xy,
        ..Default::default()
    }
    .into())
}

fn label(port: &Port) -> Result<GdsElement> {
    Ok(GdsTextElem {
        string: port.name.clone(),
        layer: Layer::LABELS.number(),
        texttype: Layer::LABELS.datatype(),
        xy: to_gds_point(&port.center)?,
        ..Default::default()
    }
    .into())
}

fn to_gds_point(p: &Point) -> Result<GdsPoint> {
    Ok(GdsPoint::new(to_db(p.x)?, to_db(p.y)?))
}

/// Convert µm to integer database units.
fn to_db(um: f64) -> Result<i32> {
    let db = (um * DB_PER_UM).round();
    if !db.is_finite() || db < i32::MIN as f64 || db > i32::MAX as f64 {
        return Err(PdkError::Geometry(format!(
            "coordinate {um} um does not fit in a GDSII database unit"
        )));
    }
    Ok(db as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::CellKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stream_layout() {
        let c = CellKind::Straight.build_default().unwrap();
        let bytes = to_gds_bytes(&c).unwrap();

        // HEADER, version 600
        assert_eq!(bytes[..6], [0x00, 0x06, 0x00, 0x02, 0x02, 0x58]);
        // BGNLIB follows with 12 two-byte ints
        assert_eq!(bytes[6..10], [0x00, 0x1C, 0x01, 0x02]);
        // ENDLIB closes the stream
        assert_eq!(bytes[bytes.len() - 4..], [0x00, 0x04, 0x04, 0x00]);
        assert!(bytes.windows(8).any(|w| w == b"straight"));
    }

    #[test]
    fn test_reads_back_every_cell() {
        for kind in CellKind::ALL {
            let c = kind.build_default().unwrap();
            let lib = GdsLibrary::from_bytes(to_gds_bytes(&c).unwrap()).unwrap();

            assert_eq!(lib.name, LIBRARY_NAME);
            assert_eq!(lib.units, GdsUnits::new(1e-3, 1e-9));
            assert_eq!(lib.structs.len(), 1);
            let s = &lib.structs[0];
            assert_eq!(s.name, c.name);
            assert_eq!(s.elems.len(), c.polygons.len() + c.ports.len());
        }
    }

    #[test]
    fn test_boundaries_are_closed_in_nm() {
        let mut c = Component::new("square");
        c.add_polygon(Polygon::rect(
            Layer::WG,
            Point::new(0.0, 0.0),
            Point::new(1.5, 0.25),
        ));
        c.add_port(Port::new("o1", Point::new(0.0, 0.125), 0.25, 180.0));
        let lib = GdsLibrary::from_bytes(to_gds_bytes(&c).unwrap()).unwrap();

        let GdsElement::GdsBoundary(b) = &lib.structs[0].elems[0] else {
            panic!("expected a boundary");
        };
        assert_eq!((b.layer, b.datatype), (Layer::WG.number(), Layer::WG.datatype()));
        assert_eq!(b.xy.len(), 5);
        assert_eq!(b.xy.first(), b.xy.last());
        assert!(b.xy.contains(&GdsPoint::new(1500, 250)));

        let GdsElement::GdsTextElem(t) = &lib.structs[0].elems[1] else {
            panic!("expected a label");
        };
        assert_eq!(t.string, "o1");
        assert_eq!(t.layer, Layer::LABELS.number());
        assert_eq!(t.xy, GdsPoint::new(0, 125));
    }

    #[test]
    fn test_output_is_deterministic() {
        let c = CellKind::Coupler.build_default().unwrap();
        assert_eq!(to_gds_bytes(&c).unwrap(), to_gds_bytes(&c).unwrap());
    }

    #[test]
    fn test_degenerate_polygon_rejected() {
        let mut c = Component::new("bad");
        c.add_polygon(Polygon::new(Layer::WG, vec![Point::new(0.0, 0.0)]));
        assert!(matches!(to_gds_bytes(&c), Err(PdkError::Geometry(_))));
    }

    #[test]
    fn test_coordinate_overflow_rejected() {
        let mut c = Component::new("huge");
        c.add_polygon(Polygon::rect(
            Layer::WG,
            Point::new(0.0, 0.0),
            Point::new(1e9, 1.0),
        ));
        assert!(matches!(to_gds_bytes(&c), Err(PdkError::Geometry(_))));
    }
}

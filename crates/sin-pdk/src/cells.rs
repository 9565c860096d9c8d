//! Parametric cells of the SiN PDK
//!
//! Each cell declares its parameters through a [`Schema`]; builders only ever
//! see schema-checked values.

use std::f64::consts::PI;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PdkError, Result};
use crate::geometry::{extrude, extrude_varying, Component, Point, Polygon, Port};
use crate::neff::{self, NeffModel};
use crate::params::{ParamSet, ParamSpec, Resolved, Schema};
use crate::tech::{Layer, TARGET_WAVELENGTH, TECH};

/// Points per curved section
const CURVE_POINTS: usize = 121;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Straight,
    BendEuler,
    Coupler,
    TaperAdiabatic,
    Mmi1x2,
}

impl CellKind {
    pub const ALL: [CellKind; 5] = [
        CellKind::Straight,
        CellKind::BendEuler,
        CellKind::Coupler,
        CellKind::TaperAdiabatic,
        CellKind::Mmi1x2,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CellKind::Straight => "straight",
            CellKind::BendEuler => "bend_euler",
            CellKind::Coupler => "coupler",
            CellKind::TaperAdiabatic => "taper_adiabatic",
            CellKind::Mmi1x2 => "mmi1x2",
        }
    }

    pub fn schema(&self) -> Schema {
        let params = match self {
            CellKind::Straight => vec![
                ParamSpec::float("length", 10.0, "length in um").at_least(0.0),
                ParamSpec::float("width", TECH.width, "waveguide width in um").at_least(0.0),
            ],
            CellKind::BendEuler => vec![
                ParamSpec::float("radius", 40.0, "bend radius in um").at_least(0.0),
                ParamSpec::float("angle", 90.0, "bend angle in degrees"),
                ParamSpec::float("p", 1.0, "fraction of the bend that is Euler").at_least(0.0),
                ParamSpec::float("width", TECH.width, "waveguide width in um").at_least(0.0),
            ],
            CellKind::Coupler => vec![
                ParamSpec::float("length", 20.0, "coupling length in um").at_least(0.0),
                ParamSpec::float("gap", TECH.gap_strip, "coupling gap in um").at_least(0.0),
                ParamSpec::float("dy", 4.0, "port to port vertical spacing in um"),
                ParamSpec::float("dx", 20.0, "S-bend length in um").at_least(0.0),
                ParamSpec::float("width", TECH.width, "waveguide width in um").at_least(0.0),
            ],
            CellKind::TaperAdiabatic => vec![
                ParamSpec::float("width1", 1.2, "input width in um").at_least(0.0),
                ParamSpec::float("width2", 5.0, "output width in um").at_least(0.0),
                ParamSpec::float("length", 0.0, "fixed length in um, 0 for the adiabatic length")
                    .at_least(0.0),
                ParamSpec::float("alpha", 1.0, "adiabaticity factor").at_least(0.0),
                ParamSpec::float("wavelength", TARGET_WAVELENGTH, "wavelength in um")
                    .at_least(0.0),
                ParamSpec::float("max_length", 500.0, "length limit in um").at_least(0.0),
                ParamSpec::int("npoints", 200, "width samples").at_least(2.0),
                ParamSpec::string("neff_table", "", "CSV of neff vs width, empty for built-in"),
            ],
            CellKind::Mmi1x2 => vec![
                ParamSpec::float("width", TECH.width, "waveguide width in um").at_least(0.0),
                ParamSpec::float("width_taper", 1.0, "taper width at the MMI in um")
                    .at_least(0.0),
                ParamSpec::float("length_taper", 10.0, "taper length in um").at_least(0.0),
                ParamSpec::float("length_mmi", 5.5, "MMI body length in um").at_least(0.0),
                ParamSpec::float("width_mmi", 2.5, "MMI body width in um").at_least(0.0),
                ParamSpec::float("gap_mmi", 0.25, "gap between output tapers in um")
                    .at_least(0.0),
            ],
        };
        Schema {
            cell: self.name(),
            params,
        }
    }

    pub fn build_default(&self) -> Result<Component> {
        self.build(std::iter::empty::<&ParamSet>())
    }

    /// Resolve parameters against the schema and build the component.
    pub fn build<'a>(&self, layers: impl IntoIterator<Item = &'a ParamSet>) -> Result<Component> {
        let layers: Vec<&ParamSet> = layers.into_iter().collect();
        let params = self.schema().resolve(layers.iter().copied())?;
        let name = component_name(*self, layers.iter().copied());
        let mut c = match self {
            CellKind::Straight => straight(&params)?,
            CellKind::BendEuler => bend_euler(&params)?,
            CellKind::Coupler => coupler(&params)?,
            CellKind::TaperAdiabatic => taper_adiabatic(&params)?,
            CellKind::Mmi1x2 => mmi1x2(&params)?,
        };
        c.name = name;
        Ok(c)
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CellKind {
    type Err = PdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| {
                let known: Vec<_> = CellKind::ALL.iter().map(|k| k.name()).collect();
                PdkError::Config(format!("unknown cell `{s}`. Known cells: {}", known.join(", ")))
            })
    }
}

/// Deterministic component name: the cell name followed by every override.
pub fn component_name<'a>(kind: CellKind, layers: impl IntoIterator<Item = &'a ParamSet>) -> String {
    let mut merged = ParamSet::new();
    for layer in layers {
        for (k, v) in layer {
            merged.insert(k.clone(), v.clone());
        }
    }
    let mut name = kind.name().to_string();
    for (k, v) in &merged {
        let value: String = v
            .to_string()
            .chars()
            .map(|c| match c {
                '.' => 'p',
                '-' => 'm',
                c if c.is_ascii_alphanumeric() => c,
                _ => '_',
            })
            .collect();
        name.push('_');
        name.push_str(k);
        name.push_str(&value);
    }
    name
}

fn straight(p: &Resolved) -> Result<Component> {
    let length = p.float("length")?;
    let width = p.float("width")?;

    let mut c = Component::new("straight");
    c.add_polygon(Polygon::rect(
        Layer::WG,
        Point::new(0.0, -width / 2.0),
        Point::new(length, width / 2.0),
    ));
    c.add_port(Port::new("o1", Point::new(0.0, 0.0), width, 180.0));
    c.add_port(Port::new("o2", Point::new(length, 0.0), width, 0.0));
    Ok(c)
}

/// Centre line of an Euler bend starting at the origin heading +x.
///
/// `p` is the Euler fraction: 0 is circular, 1 is a full clothoid. The curve is
/// scaled so its end point matches a circular bend of `radius`.
pub fn euler_path(radius: f64, angle_deg: f64, p: f64) -> Result<Vec<Point>> {
    if !(0.0..=1.0).contains(&p) {
        return Err(PdkError::Geometry(format!("euler fraction p={p} must be in [0, 1]")));
    }
    if angle_deg == 0.0 || radius <= 0.0 {
        return Err(PdkError::Geometry(format!(
            "bend needs a non-zero angle and positive radius (angle={angle_deg}, radius={radius})"
        )));
    }
    let alpha = angle_deg.to_radians().abs();

    // Unit clothoid constant; spiral sections of length sp bracket an arc of radius rp.
    let sp = (p * alpha).sqrt();
    let rp = if p > 0.0 { 1.0 / sp } else { 1.0 };
    let arc = rp * alpha * (1.0 - p);
    let total = 2.0 * sp + arc;

    let heading = |s: f64| {
        if s <= sp {
            s * s / 2.0
        } else if s <= sp + arc {
            p * alpha / 2.0 + (s - sp) / rp
        } else {
            let r = total - s;
            alpha - r * r / 2.0
        }
    };

    let ds = total / (CURVE_POINTS - 1) as f64;
    let mut points = Vec::with_capacity(CURVE_POINTS);
    let mut pos = Point::new(0.0, 0.0);
    points.push(pos);
    for i in 1..CURVE_POINTS {
        let (s0, s1) = ((i - 1) as f64 * ds, i as f64 * ds);
        // Simpson over the step
        let mid = (s0 + s1) / 2.0;
        let (h0, hm, h1) = (heading(s0), heading(mid), heading(s1));
        pos.x += ds / 6.0 * (h0.cos() + 4.0 * hm.cos() + h1.cos());
        pos.y += ds / 6.0 * (h0.sin() + 4.0 * hm.sin() + h1.sin());
        points.push(pos);
    }

    let end = points[CURVE_POINTS - 1];
    let chord = (end.x * end.x + end.y * end.y).sqrt();
    let target = 2.0 * radius * (alpha / 2.0).sin();
    let scale = target / chord;
    let sign = angle_deg.signum();
    Ok(points
        .into_iter()
        .map(|q| Point::new(q.x * scale, q.y * scale * sign))
        .collect())
}

fn bend_euler(p: &Resolved) -> Result<Component> {
    let radius = p.float("radius")?;
    let angle = p.float("angle")?;
    let width = p.float("width")?;
    let path = euler_path(radius, angle, p.float("p")?)?;

    let end = path[path.len() - 1];
    let mut c = Component::new("bend_euler");
    c.add_polygon(extrude(&path, width, Layer::WG));
    c.add_port(Port::new("o1", Point::new(0.0, 0.0), width, 180.0));
    c.add_port(Port::new("o2", end, width, angle.rem_euclid(360.0)));
    Ok(c)
}

/// Cosine S-bend from (0, 0) to (dx, dy)
fn sbend(dx: f64, dy: f64) -> Vec<Point> {
    (0..CURVE_POINTS)
        .map(|i| {
            let t = i as f64 / (CURVE_POINTS - 1) as f64;
            Point::new(t * dx, dy * (1.0 - (PI * t).cos()) / 2.0)
        })
        .collect()
}

/// Symmetric directional coupler centred on the origin.
fn coupler(p: &Resolved) -> Result<Component> {
    let length = p.float("length")?;
    let gap = p.float("gap")?;
    let dy = p.float("dy")?;
    let dx = p.float("dx")?;
    let width = p.float("width")?;

    let pitch = gap + width;
    if dy < pitch {
        return Err(PdkError::Geometry(format!(
            "port spacing dy={dy} is smaller than the coupling pitch gap+width={pitch}"
        )));
    }
    let offset = (dy - pitch) / 2.0;
    let y0 = pitch / 2.0;

    // Upper arm: rising S-bend on each side of a straight coupling section.
    let mut arm: Vec<Point> = sbend(dx, -offset)
        .into_iter()
        .map(|q| Point::new(q.x - dx - length / 2.0, q.y + y0 + offset))
        .collect();
    arm.extend(
        sbend(dx, offset)
            .into_iter()
            .map(|q| Point::new(q.x + length / 2.0, q.y + y0)),
    );

    let upper = extrude(&arm, width, Layer::WG);
    let lower = upper.mirrored_y();

    let xmax = length / 2.0 + dx;
    let ytop = dy / 2.0;
    let mut c = Component::new("coupler");
    c.add_polygon(lower);
    c.add_polygon(upper);
    c.add_port(Port::new("o1", Point::new(-xmax, -ytop), width, 180.0));
    c.add_port(Port::new("o2", Point::new(-xmax, ytop), width, 180.0));
    c.add_port(Port::new("o3", Point::new(xmax, ytop), width, 0.0));
    c.add_port(Port::new("o4", Point::new(xmax, -ytop), width, 0.0));
    Ok(c)
}

/// Width profile of an adiabatic taper as (position, width) samples.
///
/// The local growth rate obeys `dw/dz = alpha * wavelength / (w * neff(w))`;
/// the integrated length is rescaled to `length` when non-zero and capped at
/// `max_length`.
#[allow(clippy::too_many_arguments)]
pub fn adiabatic_profile(
    model: &NeffModel,
    width1: f64,
    width2: f64,
    length: f64,
    alpha: f64,
    wavelength: f64,
    max_length: f64,
    npoints: usize,
) -> Result<Vec<(f64, f64)>> {
    if npoints < 2 || alpha <= 0.0 || wavelength <= 0.0 {
        return Err(PdkError::Geometry(format!(
            "taper needs npoints >= 2, alpha > 0 and wavelength > 0 \
             (npoints={npoints}, alpha={alpha}, wavelength={wavelength})"
        )));
    }
    let widths: Vec<f64> = (0..npoints)
        .map(|i| width1 + (width2 - width1) * i as f64 / (npoints - 1) as f64)
        .collect();
    let neffs = model.eval_many(&widths)?;

    // dz/dw integrated with the trapezoid rule
    let rate = |w: f64, n: f64| w * n / (alpha * wavelength);
    let mut z = vec![0.0; npoints];
    for i in 1..npoints {
        let dw = (widths[i] - widths[i - 1]).abs();
        z[i] = z[i - 1] + dw * (rate(widths[i - 1], neffs[i - 1]) + rate(widths[i], neffs[i])) / 2.0;
    }

    let natural = z[npoints - 1];
    let mut target = if length > 0.0 { length } else { natural };
    if target > max_length {
        tracing::warn!(
            "adiabatic taper length {:.2} um exceeds max_length {:.2} um, compressing",
            target,
            max_length
        );
        target = max_length;
    }
    let scale = if natural > 0.0 { target / natural } else { 0.0 };
    Ok(z.into_iter().map(|zi| zi * scale).zip(widths).collect())
}

fn taper_adiabatic(p: &Resolved) -> Result<Component> {
    let width1 = p.float("width1")?;
    let width2 = p.float("width2")?;
    let npoints = usize::try_from(p.int("npoints")?)
        .map_err(|_| PdkError::Geometry("npoints must be positive".into()))?;
    let table = p.string("neff_table")?;
    let model: Arc<NeffModel> = if table.is_empty() {
        neff::builtin_model()?
    } else {
        neff::shared_model(Path::new(table))?
    };

    let profile = adiabatic_profile(
        &model,
        width1,
        width2,
        p.float("length")?,
        p.float("alpha")?,
        p.float("wavelength")?,
        p.float("max_length")?,
        npoints,
    )?;
    let total = profile[profile.len() - 1].0;
    if total <= 0.0 {
        return Err(PdkError::Geometry(format!(
            "taper from {width1} um to {width2} um has zero length"
        )));
    }

    let path: Vec<Point> = profile.iter().map(|&(z, _)| Point::new(z, 0.0)).collect();
    let widths: Vec<f64> = profile.iter().map(|&(_, w)| w).collect();

    let mut c = Component::new("taper_adiabatic");
    c.add_polygon(extrude_varying(&path, &widths, Layer::WG));
    c.add_port(Port::new("o1", Point::new(0.0, 0.0), width1, 180.0));
    c.add_port(Port::new("o2", Point::new(total, 0.0), width2, 0.0));
    Ok(c)
}

/// Linear taper polygon from (x0, y) with width w0 to (x1, y) with width w1
fn linear_taper(x0: f64, x1: f64, y: f64, w0: f64, w1: f64) -> Polygon {
    Polygon::new(
        Layer::WG,
        vec![
            Point::new(x0, y - w0 / 2.0),
            Point::new(x1, y - w1 / 2.0),
            Point::new(x1, y + w1 / 2.0),
            Point::new(x0, y + w0 / 2.0),
        ],
    )
}

fn mmi1x2(p: &Resolved) -> Result<Component> {
    let width = p.float("width")?;
    let width_taper = p.float("width_taper")?;
    let length_taper = p.float("length_taper")?;
    let length_mmi = p.float("length_mmi")?;
    let width_mmi = p.float("width_mmi")?;
    let gap_mmi = p.float("gap_mmi")?;

    let pitch = width_taper + gap_mmi;
    if pitch + width_taper > width_mmi {
        return Err(PdkError::Geometry(format!(
            "output tapers ({width_taper} um wide, {gap_mmi} um gap) do not fit in a {width_mmi} um MMI"
        )));
    }
    let y_out = pitch / 2.0;
    let x_end = length_mmi + length_taper;

    let mut c = Component::new("mmi1x2");
    c.add_polygon(Polygon::rect(
        Layer::WG,
        Point::new(0.0, -width_mmi / 2.0),
        Point::new(length_mmi, width_mmi / 2.0),
    ));
    c.add_polygon(linear_taper(-length_taper, 0.0, 0.0, width, width_taper));
    c.add_polygon(linear_taper(length_mmi, x_end, y_out, width_taper, width));
    c.add_polygon(linear_taper(length_mmi, x_end, -y_out, width_taper, width));
    c.add_port(Port::new("o1", Point::new(-length_taper, 0.0), width, 180.0));
    c.add_port(Port::new("o2", Point::new(x_end, y_out), width, 0.0));
    c.add_port(Port::new("o3", Point::new(x_end, -y_out), width, 0.0));
    Ok(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;
    use approx::assert_relative_eq;

    fn set(pairs: &[(&str, ParamValue)]) -> ParamSet {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_every_cell_builds_with_defaults() {
        for kind in CellKind::ALL {
            let c = kind.build_default().unwrap();
            assert!(c.bbox().is_some(), "{kind} has no geometry");
            assert!(c.ports.len() >= 2, "{kind} has too few ports");
            assert_eq!(c.name, kind.name());
        }
    }

    #[test]
    fn test_cell_names_parse() {
        assert_eq!("coupler".parse::<CellKind>().unwrap(), CellKind::Coupler);
        assert!(matches!("ring".parse::<CellKind>(), Err(PdkError::Config(_))));
    }

    #[test]
    fn test_component_name_includes_overrides() {
        let fixed = set(&[("gap", ParamValue::Float(0.5))]);
        let combo = set(&[("length", ParamValue::Int(20))]);
        assert_eq!(
            component_name(CellKind::Coupler, [&fixed, &combo]),
            "coupler_gap0p5_length20"
        );
    }

    #[test]
    fn test_coupler_ports_and_gap() {
        let c = CellKind::Coupler
            .build([&set(&[("gap", ParamValue::Float(0.3)), ("width", ParamValue::Float(1.0))])])
            .unwrap();
        let o3 = c.port("o3").unwrap();
        assert_relative_eq!(o3.center.x, 30.0, epsilon = 1e-9);
        assert_relative_eq!(o3.center.y, 2.0, epsilon = 1e-9);

        // Inner edge of the upper arm at x = 0 sits gap/2 above the axis.
        let upper = c.polygons[1].bbox().unwrap();
        assert_relative_eq!(upper.min.y, 0.15, epsilon = 1e-6);
        assert_relative_eq!(c.bbox().unwrap().max.y, 2.5, epsilon = 1e-6);
    }

    #[test]
    fn test_coupler_rejects_overlapping_arms() {
        let err = CellKind::Coupler
            .build([&set(&[("dy", ParamValue::Float(1.0))])])
            .unwrap_err();
        assert!(matches!(err, PdkError::Geometry(_)));
    }

    #[test]
    fn test_euler_bend_matches_circular_endpoint() {
        let path = euler_path(10.0, 90.0, 1.0).unwrap();
        let end = path[path.len() - 1];
        assert_relative_eq!(end.x, 10.0, epsilon = 1e-6);
        assert_relative_eq!(end.y, 10.0, epsilon = 1e-6);

        let arc = euler_path(10.0, 90.0, 0.0).unwrap();
        let mid = arc[arc.len() / 2];
        let r = (mid.x * mid.x + (mid.y - 10.0) * (mid.y - 10.0)).sqrt();
        assert_relative_eq!(r, 10.0, epsilon = 1e-6);

        assert!(euler_path(10.0, 90.0, 1.5).is_err());
    }

    #[test]
    fn test_adiabatic_profile_monotonic_and_capped() {
        let model = neff::builtin_model().unwrap();
        let profile = adiabatic_profile(&model, 1.2, 5.0, 0.0, 1.0, 1.55, 500.0, 50).unwrap();
        assert_eq!(profile.len(), 50);
        assert!(profile.windows(2).all(|w| w[1].0 > w[0].0));
        assert_relative_eq!(profile[49].1, 5.0, epsilon = 1e-12);

        let capped = adiabatic_profile(&model, 1.2, 5.0, 0.0, 0.01, 1.55, 100.0, 50).unwrap();
        assert_relative_eq!(capped[49].0, 100.0, epsilon = 1e-9);

        let fixed = adiabatic_profile(&model, 1.2, 5.0, 42.0, 1.0, 1.55, 500.0, 50).unwrap();
        assert_relative_eq!(fixed[49].0, 42.0, epsilon = 1e-9);
    }

    #[test]
    fn test_taper_with_table_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("neff.csv");
        std::fs::write(&path, "width(um),neff\n1.0,1.60\n2.0,1.70\n3.0,1.75\n4.0,1.78\n").unwrap();
        let c = CellKind::TaperAdiabatic
            .build([&set(&[
                ("width1", ParamValue::Float(1.0)),
                ("width2", ParamValue::Float(4.0)),
                ("neff_table", ParamValue::Str(path.display().to_string())),
            ])])
            .unwrap();
        assert_relative_eq!(c.port("o2").unwrap().width, 4.0);
    }

    #[test]
    fn test_mmi_ports() {
        let c = CellKind::Mmi1x2.build_default().unwrap();
        let o2 = c.port("o2").unwrap();
        let o3 = c.port("o3").unwrap();
        assert_relative_eq!(o2.center.y, 0.625, epsilon = 1e-12);
        assert_relative_eq!(o3.center.y, -0.625, epsilon = 1e-12);
        assert_relative_eq!(o2.center.x, 15.5, epsilon = 1e-12);
    }
}

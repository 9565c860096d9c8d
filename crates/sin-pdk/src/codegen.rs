//! Solver script generation
//!
//! Lumerical scripts (LSF) set up a layer builder, import the GDS and place
//! one port per component port. Tidy3D scripts build a `ComponentModeler`
//! from the same GDS. Numbers are formatted here and passed to the templates
//! as text, so every template is a plain substitution.

use minijinja::{context, Environment};
use serde::Serialize;

use crate::backend::{LumericalSettings, SimulationConfig, Tidy3dSettings};
use crate::error::{PdkError, Result};
use crate::geometry::{BBox, Component, Port};
use crate::material::Material;
use crate::params::{ParamSet, ParamValue};
use crate::ports::{snap_orientation, Axis};
use crate::sweep::{SweepMode, SweepSpec};
use crate::tech::{LayerStack, UM};

const LAYOUT_LSF: &str = r#"newproject;
addlayerbuilder;
loadprocessfile("{{ process_file }}");
loadgdsfile("{{ gds_file }}");
select("layer group");
set("gds sidewall angle position reference", "Middle");
set("gds position reference", "Centered at origin");
set("x span", {{ x_span }});
set("y span", {{ y_span }});
{% for key, value in layer_builder_settings %}
set({{ key }}, {{ value }});
{% endfor %}
{{ add_command }};
set("x min", {{ x_min }});
set("x max", {{ x_max }});
set("y min", {{ y_min }});
set("y max", {{ y_max }});
{% for port in ports %}
addport;
set("x", {{ port.x }});
set("y", {{ port.y }});
set("x span", {{ port.span }});
set("y span", {{ port.span }});
set("injection axis", "{{ port.axis }}");
set("direction", "{{ port.direction }}");
set("theta", {{ port.theta }});
{% endfor %}
setglobalsource("center wavelength", {{ wavelength }});
setglobalsource("wavelength span", {{ bandwidth }});
save("{{ artifact }}");
"#;

const SWEEP_BUILDER_LSF: &str = r#"{% for sweep in sweeps %}
{% if sweep.previous %}
insertsweep("{{ sweep.previous }}");
{% else %}
addsweep;
{% endif %}
setsweep("sweep", "name", "{{ sweep.name }}");
setsweep("{{ sweep.name }}", "type", "Values");
setsweep("{{ sweep.name }}", "number of points", {{ sweep.points }});
{% for param in sweep.params %}
para = struct;
para.Name = "{{ param.name }}";
para.Type = "Number";
{% for value in param.values %}
para.Value_{{ loop.index }} = {{ value }};
{% endfor %}
addsweepparameter("{{ sweep.name }}", para);
{% endfor %}
{% endfor %}
"#;

const MASTER_LSF: &str = r#"addpath("{{ folder }}");
sweep_builder;
{% for script in scripts %}
feval("{{ script }}");
{% endfor %}
"#;

const TIDY3D_PY: &str = r#"#!/usr/bin/env python3
"""
Tidy3D S-parameter set-up for {{ artifact }}
Parameters: {{ description }}
"""

import pathlib

import gdstk
import numpy as np
import tidy3d as td
from tidy3d.plugins.smatrix import ComponentModeler, Port

HERE = pathlib.Path(__file__).parent
GDS_FILE = HERE / "{{ gds_file }}"
ARTIFACT = "{{ artifact }}"

# Wavelengths in um
WAVELENGTH = {{ wavelength }}
BANDWIDTH = {{ bandwidth }}
NUM_FREQS = {{ num_freqs }}
MIN_STEPS_PER_WVL = {{ min_steps_per_wvl }}
RUN_TIME = {{ run_time }}
FOLDER_NAME = "{{ folder_name }}"

# Waveguide core
CORE_LAYER = ({{ core_layer }}, {{ core_datatype }})
CORE_ZMIN = {{ core_zmin }}
CORE_THICKNESS = {{ core_thickness }}
SIDEWALL_ANGLE = np.deg2rad({{ sidewall_angle }})

core_medium = {{ core_medium }}
clad_medium = {{ clad_medium }}

SIM_CENTER = ({{ sim_cx }}, {{ sim_cy }}, CORE_ZMIN + CORE_THICKNESS / 2)
SIM_SIZE = ({{ sim_sx }}, {{ sim_sy }}, {{ sim_sz }})

# name, centre (x, y), size (x, y), direction
PORTS = [
{% for port in ports %}
    ("{{ port.name }}", ({{ port.x }}, {{ port.y }}), ({{ port.sx }}, {{ port.sy }}), "{{ port.sign }}"),
{% endfor %}
]


def core_polygons():
    library = gdstk.read_gds(str(GDS_FILE))
    cell = library.top_level()[0]
    return [p.points for p in cell.polygons if (p.layer, p.datatype) == CORE_LAYER]


def build_structures():
    return [
        td.Structure(
            geometry=td.PolySlab(
                vertices=vertices,
                axis=2,
                slab_bounds=(CORE_ZMIN, CORE_ZMIN + CORE_THICKNESS),
                sidewall_angle=SIDEWALL_ANGLE,
                reference_plane="middle",
            ),
            medium=core_medium,
        )
        for vertices in core_polygons()
    ]


def build_modeler():
    simulation = td.Simulation(
        center=SIM_CENTER,
        size=SIM_SIZE,
        grid_spec=td.GridSpec.auto(min_steps_per_wvl=MIN_STEPS_PER_WVL, wavelength=WAVELENGTH),
        structures=build_structures(),
        medium=clad_medium,
        boundary_spec=td.BoundarySpec.all_sides(boundary=td.PML()),
        run_time=RUN_TIME,
    )
    ports = [
        Port(
            name=name,
            center=(x, y, SIM_CENTER[2]),
            size=(sx, sy, SIM_SIZE[2]),
            direction=direction,
            mode_spec=td.ModeSpec(num_modes=1, filter_pol="te"),
        )
        for name, (x, y), (sx, sy), direction in PORTS
    ]
    wavelengths = np.linspace(WAVELENGTH - BANDWIDTH / 2, WAVELENGTH + BANDWIDTH / 2, NUM_FREQS)
    return ComponentModeler(
        simulation=simulation,
        ports=ports,
        freqs=td.C_0 / wavelengths,
        folder_name=FOLDER_NAME,
        path_dir=str(HERE / "data" / ARTIFACT),
    )


if __name__ == "__main__":
    modeler = build_modeler()
{% if run %}
    smatrix = modeler.run()
    np.save(HERE / f"{ARTIFACT}_smatrix.npy", smatrix.values)
{% else %}
    for task_name, simulation in modeler.sim_dict.items():
        td.web.upload(simulation, task_name=f"{ARTIFACT}_{task_name}", folder_name=FOLDER_NAME)
{% endif %}
"#;

const RUN_ALL_PY: &str = r#"#!/usr/bin/env python3
"""Run every generated simulation script of the {{ folder }} sweep in order."""

import pathlib
import runpy

HERE = pathlib.Path(__file__).parent
SCRIPTS = [
{% for script in scripts %}
    "{{ script }}",
{% endfor %}
]

if __name__ == "__main__":
    for script in SCRIPTS:
        print(f"running {script}")
        runpy.run_path(str(HERE / "{{ folder }}" / script), run_name="__main__")
"#;

/// Port multiples of the port width for the Tidy3D mode plane
const PORT_SIZE_MULT: f64 = 4.0;

/// Everything the per-combination scripts need about one job.
#[derive(Debug, Clone, Copy)]
pub struct JobScript<'a> {
    /// Artifact stem shared by the GDS and the script
    pub artifact: &'a str,
    /// Combination parameters, for the script header
    pub params: &'a ParamSet,
    /// Component as built, before padding and port extension
    pub component: &'a Component,
    /// Component written to the GDS file
    pub extended: &'a Component,
    pub sim: &'a SimulationConfig,
}

impl JobScript<'_> {
    pub fn gds_file(&self) -> String {
        format!("{}.gds", self.artifact)
    }

    /// Simulation region: the bare component box grown by the margins
    fn region(&self) -> Result<BBox> {
        Ok(self.component.require_bbox()?.expanded(
            self.sim.margin_top,
            self.sim.margin_bottom,
            self.sim.margin_left,
            self.sim.margin_right,
        ))
    }

    fn port_center(&self, port: &Port) -> (f64, f64) {
        let c = port.center + port.direction() * self.sim.port_buffer;
        (c.x, c.y)
    }
}

#[derive(Serialize)]
struct LsfPort {
    x: String,
    y: String,
    span: String,
    axis: String,
    direction: String,
    theta: i64,
}

#[derive(Serialize)]
struct PyPort {
    name: String,
    x: String,
    y: String,
    sx: String,
    sy: String,
    sign: char,
}

#[derive(Serialize)]
struct SweepBlock {
    name: String,
    previous: Option<String>,
    points: usize,
    params: Vec<SweepParam>,
}

#[derive(Serialize)]
struct SweepParam {
    name: String,
    values: Vec<String>,
}

/// Compiled script templates.
pub struct ScriptRenderer {
    env: Environment<'static>,
}

impl ScriptRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        env.add_template("generate_layout.lsf", LAYOUT_LSF)?;
        env.add_template("sweep_builder.lsf", SWEEP_BUILDER_LSF)?;
        env.add_template("master_script.lsf", MASTER_LSF)?;
        env.add_template("simulation.py", TIDY3D_PY)?;
        env.add_template("run_all.py", RUN_ALL_PY)?;
        Ok(Self { env })
    }

    /// Per-combination Lumerical layout script
    pub fn layout_lsf(&self, job: &JobScript<'_>, settings: &LumericalSettings) -> Result<String> {
        let ext = job.extended.require_bbox()?;
        let region = job.region()?;
        let span = |a: f64, b: f64| metres(2.0 * a.abs().max(b.abs()) + 5.0);

        let ports: Vec<LsfPort> = job
            .component
            .ports
            .iter()
            .map(|port| {
                let injection = snap_orientation(port.orientation);
                let (x, y) = job.port_center(port);
                LsfPort {
                    x: metres(x),
                    y: metres(y),
                    span: metres(2.0 * port.width),
                    axis: injection.axis.to_string(),
                    direction: injection.direction.to_string(),
                    theta: injection.theta,
                }
            })
            .collect();

        let layer_builder_settings: Vec<(&str, &str)> = settings
            .layer_builder_settings
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let template = self.env.get_template("generate_layout.lsf")?;
        Ok(template.render(context! {
            process_file => settings.process_file_name(),
            gds_file => job.gds_file(),
            x_span => span(ext.min.x, ext.max.x),
            y_span => span(ext.min.y, ext.max.y),
            layer_builder_settings => layer_builder_settings,
            add_command => settings.sim_type.add_command(),
            x_min => metres(region.min.x),
            x_max => metres(region.max.x),
            y_min => metres(region.min.y),
            y_max => metres(region.max.y),
            ports => ports,
            wavelength => metres(job.sim.wavelength),
            bandwidth => metres(job.sim.bandwidth),
            artifact => job.artifact,
        })?)
    }

    /// Lumerical sweep-object descriptor for the whole spec
    pub fn sweep_builder_lsf(&self, spec: &SweepSpec, mode: SweepMode) -> Result<String> {
        spec.validate(mode)?;
        let params: Vec<SweepParam> = spec
            .iter()
            .map(|(name, values)| SweepParam {
                name: name.to_string(),
                values: values.iter().map(lsf_literal).collect(),
            })
            .collect();

        let sweeps = match mode {
            SweepMode::AllCombinations => {
                let mut previous: Option<String> = None;
                let mut sweeps = Vec::with_capacity(params.len());
                for param in params {
                    let name = param.name.clone();
                    sweeps.push(SweepBlock {
                        name: name.clone(),
                        previous: previous.replace(name),
                        points: param.values.len(),
                        params: vec![param],
                    });
                }
                sweeps
            }
            SweepMode::Paired => {
                let name = spec.names().collect::<Vec<_>>().join("_");
                let points = spec.count(mode)?;
                vec![SweepBlock {
                    name,
                    previous: None,
                    points,
                    params,
                }]
            }
        };

        let template = self.env.get_template("sweep_builder.lsf")?;
        Ok(template.render(context! { sweeps => sweeps })?)
    }

    /// Lumerical script that builds the sweep and every layout in order
    pub fn master_lsf(&self, folder: &str, scripts: &[String]) -> Result<String> {
        let template = self.env.get_template("master_script.lsf")?;
        Ok(template.render(context! { folder => folder, scripts => scripts })?)
    }

    /// Per-combination Tidy3D modeler script
    pub fn tidy3d_py(
        &self,
        job: &JobScript<'_>,
        settings: &Tidy3dSettings,
        stack: &LayerStack,
    ) -> Result<String> {
        let core = stack
            .core()
            .ok_or_else(|| PdkError::Config("layer stack has no core level".into()))?;
        let region = job.region()?;
        let center = region.center();
        let wl = job.sim.wavelength;

        let ports: Vec<PyPort> = job
            .component
            .ports
            .iter()
            .map(|port| {
                let injection = snap_orientation(port.orientation);
                let (x, y) = job.port_center(port);
                let across = PORT_SIZE_MULT * port.width;
                let (sx, sy) = match injection.axis {
                    Axis::X => (0.0, across),
                    Axis::Y => (across, 0.0),
                };
                PyPort {
                    name: port.name.clone(),
                    x: microns(x),
                    y: microns(y),
                    sx: microns(sx),
                    sy: microns(sy),
                    sign: injection.sign(),
                }
            })
            .collect();

        let description = job
            .params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");

        let template = self.env.get_template("simulation.py")?;
        Ok(template.render(context! {
            artifact => job.artifact,
            description => description,
            gds_file => job.gds_file(),
            wavelength => microns(wl),
            bandwidth => microns(job.sim.bandwidth),
            num_freqs => settings.num_freqs,
            min_steps_per_wvl => settings.min_steps_per_wvl,
            run_time => format!("{:e}", settings.run_time),
            folder_name => settings.folder_name.as_str(),
            core_layer => core.layer.number(),
            core_datatype => core.layer.datatype(),
            core_zmin => microns(core.zmin),
            core_thickness => microns(core.thickness),
            sidewall_angle => microns(core.sidewall_angle),
            core_medium => core.material.to_tidy3d_python(wl),
            clad_medium => Material::SiliconDioxide.to_tidy3d_python(wl),
            sim_cx => microns(center.x),
            sim_cy => microns(center.y),
            sim_sx => microns(region.width()),
            sim_sy => microns(region.height()),
            sim_sz => microns(settings.sim_size_z),
            ports => ports,
            run => settings.run,
        })?)
    }

    /// Python runner for every generated Tidy3D script
    pub fn run_all_py(&self, folder: &str, scripts: &[String]) -> Result<String> {
        let template = self.env.get_template("run_all.py")?;
        Ok(template.render(context! { folder => folder, scripts => scripts })?)
    }
}

/// µm to a metre literal, e.g. `2.2e-5`
fn metres(um: f64) -> String {
    let m = um * UM;
    if m == 0.0 {
        "0".to_string()
    } else {
        format!("{m:e}")
    }
}

/// µm literal rounded to the database grid
fn microns(um: f64) -> String {
    let v = (um * 1e6).round() / 1e6;
    if v == 0.0 {
        "0.0".to_string()
    } else {
        format!("{v:?}")
    }
}

fn lsf_literal(value: &ParamValue) -> String {
    match value {
        ParamValue::Bool(b) => u8::from(*b).to_string(),
        ParamValue::Str(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}

//! sin-pdk: 300 nm silicon-nitride process design kit
//!
//! This crate provides:
//! - Technology data: layer map, layer stack and optical materials
//! - Parametric cells with explicit parameter schemas
//! - An effective-index model of waveguide width, used to shape adiabatic tapers
//! - Sweep expansion into GDSII files and Lumerical or Tidy3D scripts
//!
//! Lengths are in µm throughout; generated Lumerical scripts are in metres.

pub mod backend;
pub mod cells;
pub mod codegen;
pub mod error;
pub mod gds;
pub mod geometry;
pub mod job;
pub mod material;
pub mod neff;
pub mod params;
pub mod ports;
pub mod sweep;
pub mod tech;

pub use backend::{Backend, LumericalSettings, SimType, SimulationConfig, Tidy3dSettings};
pub use cells::CellKind;
pub use error::{PdkError, Result};
pub use geometry::{BBox, Component, Point, Polygon, Port};
pub use job::{run_sweep, CombinationFailure, JobArtifacts, SweepReport, SweepRequest};
pub use material::Material;
pub use neff::{Extrapolation, NeffCache, NeffModel, NeffTable};
pub use params::{Assignments, ParamSet, ParamValue};
pub use ports::{snap_orientation, Injection};
pub use sweep::{Combination, SweepMode, SweepSpec};
pub use tech::{Layer, LayerStack, TARGET_BANDWIDTH, TARGET_WAVELENGTH};

/// Parse a JSON sweep request and expand it.
pub fn expand(json: &str) -> Result<SweepReport> {
    let request = SweepRequest::from_json(json)?;
    run_sweep(&request)
}

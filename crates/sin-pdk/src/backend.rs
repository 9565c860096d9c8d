//! Solver backends and simulation region settings

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{PdkError, Result};
use crate::tech::{TARGET_BANDWIDTH, TARGET_WAVELENGTH};

/// Process file loaded by the layer builder when none is configured
pub const DEFAULT_PROCESS_FILE: &str = "SiN_layer_builder_v2.lbr";

/// Simulation region and source settings shared by every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Margin above the component (µm)
    pub margin_top: f64,
    /// Margin below the component (µm)
    pub margin_bottom: f64,
    /// Margin left of the component (µm)
    pub margin_left: f64,
    /// Margin right of the component (µm)
    pub margin_right: f64,
    /// Distance from monitors to the PML (µm)
    pub distance_to_pml: f64,
    /// Extra port clearance (µm)
    pub port_buffer: f64,
    /// Centre wavelength (µm)
    pub wavelength: f64,
    /// Wavelength span (µm)
    pub bandwidth: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            margin_top: 2.0,
            margin_bottom: 2.0,
            margin_left: 2.0,
            margin_right: 2.0,
            distance_to_pml: 5.0,
            port_buffer: 0.0,
            wavelength: TARGET_WAVELENGTH,
            bandwidth: TARGET_BANDWIDTH,
        }
    }
}

impl SimulationConfig {
    pub fn max_margin(&self) -> f64 {
        [
            self.margin_top,
            self.margin_bottom,
            self.margin_left,
            self.margin_right,
        ]
        .into_iter()
        .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Length every port is extended by before export
    pub fn port_extension(&self) -> f64 {
        self.distance_to_pml + self.max_margin()
    }

    pub fn validate(&self) -> Result<()> {
        let lengths = [
            ("margin_top", self.margin_top),
            ("margin_bottom", self.margin_bottom),
            ("margin_left", self.margin_left),
            ("margin_right", self.margin_right),
            ("distance_to_pml", self.distance_to_pml),
            ("port_buffer", self.port_buffer),
        ];
        if let Some((name, v)) = lengths.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
            return Err(PdkError::Config(format!("{name} must be a non-negative length, got {v}")));
        }
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.wavelength) || !positive(self.bandwidth) {
            return Err(PdkError::Config(format!(
                "wavelength and bandwidth must be positive (wavelength={}, bandwidth={})",
                self.wavelength, self.bandwidth
            )));
        }
        Ok(())
    }
}

/// Lumerical simulation object created by the layout script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimType {
    #[default]
    #[serde(rename = "FDTD", alias = "fdtd")]
    Fdtd,
    #[serde(rename = "varFDTD", alias = "varfdtd")]
    VarFdtd,
}

impl SimType {
    /// Script command that adds the solver region
    pub fn add_command(&self) -> &'static str {
        match self {
            SimType::Fdtd => "addfdtd",
            SimType::VarFdtd => "addvarfdtd",
        }
    }
}

impl fmt::Display for SimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimType::Fdtd => f.write_str("FDTD"),
            SimType::VarFdtd => f.write_str("varFDTD"),
        }
    }
}

impl FromStr for SimType {
    type Err = PdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fdtd" => Ok(SimType::Fdtd),
            "varfdtd" => Ok(SimType::VarFdtd),
            _ => Err(PdkError::Config(format!(
                "unknown simulation type `{s}`. Use FDTD or varFDTD"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LumericalSettings {
    pub sim_type: SimType,
    /// Layer builder process file copied next to the generated scripts
    pub process_file: Option<PathBuf>,
    /// Extra `set(key, value)` statements for the layer group, written verbatim
    pub layer_builder_settings: IndexMap<String, String>,
}

impl LumericalSettings {
    /// File name the layout scripts load with `loadprocessfile`
    pub fn process_file_name(&self) -> String {
        self.process_file
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_PROCESS_FILE.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tidy3dSettings {
    /// Run the modeler instead of only uploading it
    pub run: bool,
    pub num_freqs: u32,
    pub min_steps_per_wvl: u32,
    /// Simulation size along z (µm)
    pub sim_size_z: f64,
    pub run_time: f64,
    pub folder_name: String,
}

impl Default for Tidy3dSettings {
    fn default() -> Self {
        Self {
            run: false,
            num_freqs: 21,
            min_steps_per_wvl: 30,
            sim_size_z: 4.0,
            run_time: 1e-12,
            folder_name: "default".to_string(),
        }
    }
}

/// External solver that consumes the generated scripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backend {
    Lumerical(LumericalSettings),
    Tidy3d(Tidy3dSettings),
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Lumerical(LumericalSettings::default())
    }
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Lumerical(_) => "lumerical",
            Backend::Tidy3d(_) => "tidy3d",
        }
    }

    /// Whether the solver has its own sweep object that needs a descriptor script
    pub fn supports_native_sweep(&self) -> bool {
        matches!(self, Backend::Lumerical(_))
    }

    /// Suffix appended to the artifact name for the per-combination script
    pub fn script_suffix(&self) -> &'static str {
        match self {
            Backend::Lumerical(_) => "_generate_layout.lsf",
            Backend::Tidy3d(_) => "_simulation.py",
        }
    }

    pub fn manifest_name(&self) -> &'static str {
        match self {
            Backend::Lumerical(_) => "master_script.lsf",
            Backend::Tidy3d(_) => "run_all.py",
        }
    }
}

impl FromStr for Backend {
    type Err = PdkError;

    /// Backend with default settings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lumerical" | "lum" => Ok(Backend::Lumerical(LumericalSettings::default())),
            "tidy3d" | "td" => Ok(Backend::Tidy3d(Tidy3dSettings::default())),
            _ => Err(PdkError::Config(format!(
                "unknown backend `{s}`. Use lumerical or tidy3d"
            ))),
        }
    }
}

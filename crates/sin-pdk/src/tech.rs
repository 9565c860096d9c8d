//! Technology definitions for the 300 nm SiN C-band process
//!
//! All lengths are in micrometres unless stated otherwise.

use serde::{Deserialize, Serialize};

use crate::material::Material;

/// Target centre wavelength (µm)
pub const TARGET_WAVELENGTH: f64 = 1.55;
/// Target simulation bandwidth (µm)
pub const TARGET_BANDWIDTH: f64 = 0.2;

/// 1 µm in metres
pub const UM: f64 = 1e-6;
/// 1 nm in µm
pub const NM: f64 = 1e-3;

/// A GDS (layer, datatype) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Layer(pub i16, pub i16);

impl Layer {
    pub const WG: Layer = Layer(203, 0);
    pub const ETCH: Layer = Layer(204, 0);
    pub const HEATER: Layer = Layer(39, 0);
    pub const MTL_KPOUT: Layer = Layer(2, 10);
    pub const OPT_IO: Layer = Layer(1, 10);
    pub const PAD: Layer = Layer(41, 0);
    pub const QD: Layer = Layer(50, 0);
    pub const FLOORPLAN: Layer = Layer(99, 0);
    pub const LABELS: Layer = Layer(100, 0);
    pub const OXIDE_WINDOW: Layer = Layer(22, 0);

    pub fn number(&self) -> i16 {
        self.0
    }

    pub fn datatype(&self) -> i16 {
        self.1
    }
}

/// One level of the vertical layer stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerLevel {
    pub name: String,
    pub layer: Layer,
    pub zmin: f64,
    pub thickness: f64,
    pub material: Material,
    /// Sidewall angle in degrees from vertical
    #[serde(default)]
    pub sidewall_angle: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerStack {
    pub levels: Vec<LayerLevel>,
}

impl LayerStack {
    pub fn level(&self, name: &str) -> Option<&LayerLevel> {
        self.levels.iter().find(|l| l.name == name)
    }

    /// Waveguide core level. Every stack built by [`layer_stack`] has one.
    pub fn core(&self) -> Option<&LayerLevel> {
        self.level("core")
    }
}

/// Thicknesses that parameterise [`layer_stack`].
#[derive(Debug, Clone, Copy)]
pub struct StackThicknesses {
    pub wg: f64,
    pub zmin_heater: f64,
    pub heater: f64,
    pub zmin_metal: f64,
    pub metal: f64,
}

impl Default for StackThicknesses {
    fn default() -> Self {
        Self {
            wg: 220.0 * NM,
            zmin_heater: 1.1,
            heater: 700.0 * NM,
            zmin_metal: 1.1,
            metal: 700.0 * NM,
        }
    }
}

pub fn layer_stack(t: StackThicknesses) -> LayerStack {
    LayerStack {
        levels: vec![
            LayerLevel {
                name: "core".into(),
                layer: Layer::WG,
                zmin: 0.0,
                thickness: t.wg,
                material: Material::SiliconNitride,
                sidewall_angle: 10.0,
            },
            LayerLevel {
                name: "heater".into(),
                layer: Layer::HEATER,
                zmin: t.zmin_heater,
                thickness: t.heater,
                material: Material::TitaniumNitride,
                sidewall_angle: 0.0,
            },
            LayerLevel {
                name: "metal".into(),
                layer: Layer::PAD,
                zmin: t.zmin_metal + t.metal,
                thickness: t.metal,
                material: Material::Aluminium,
                sidewall_angle: 0.0,
            },
        ],
    }
}

impl Default for LayerStack {
    fn default() -> Self {
        layer_stack(StackThicknesses::default())
    }
}

/// Default cell dimensions.
#[derive(Debug, Clone, Copy)]
pub struct Tech {
    pub radius: f64,
    pub radius_ro: f64,
    pub width: f64,
    pub width_ro: f64,
    pub width_heater: f64,
    pub width_metal: f64,
    pub gap_strip: f64,
}

pub const TECH: Tech = Tech {
    radius: 30.0,
    radius_ro: 25.0,
    width: 1.2,
    width_ro: 0.5,
    width_heater: 2.5,
    width_metal: 10.0,
    gap_strip: 0.27,
};

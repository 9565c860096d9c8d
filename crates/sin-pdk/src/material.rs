//! Optical material models and their Tidy3D medium expressions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PdkError;

/// Three-term Sellmeier coefficients. `c` terms are in µm².
#[derive(Debug, Clone, Copy)]
pub struct Sellmeier {
    /// Constant offset added to n² (1.0 for the standard form)
    pub a: f64,
    pub b: [f64; 3],
    pub c: [f64; 3],
    /// Wavelength range (µm) the coefficients were fitted over
    pub valid_range: (f64, f64),
}

impl Sellmeier {
    /// Salzberg and Villa (1957)
    pub const SILICON: Sellmeier = Sellmeier {
        a: 1.0,
        b: [10.6684293, 0.0030434748, 1.54133408],
        c: [0.0909122, 1.2876611, 1_218_816.0],
        valid_range: (1.36, 11.0),
    };

    /// Malitson (1965), fused silica
    pub const SILICA: Sellmeier = Sellmeier {
        a: 1.0,
        b: [0.696166300, 0.407942600, 0.897479400],
        c: [4.67914826e-3, 1.35120631e-2, 97.9340025],
        valid_range: (0.21, 6.7),
    };

    pub fn index(&self, wavelength_um: f64) -> f64 {
        let l2 = wavelength_um * wavelength_um;
        let n2 = self.a
            + self
                .b
                .iter()
                .zip(self.c.iter())
                .map(|(b, c)| b * l2 / (l2 - c))
                .sum::<f64>();
        n2.sqrt()
    }

    pub fn in_range(&self, wavelength_um: f64) -> bool {
        wavelength_um >= self.valid_range.0 && wavelength_um <= self.valid_range.1
    }
}

/// Closed set of materials used by the layer stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Material {
    Silicon,
    SiliconDioxide,
    SiliconNitride,
    TitaniumNitride,
    Aluminium,
}

impl Material {
    /// Complex refractive index `(n, k)` at the given wavelength.
    ///
    /// Dispersive models warn when evaluated outside their fitted range.
    pub fn nk(&self, wavelength_um: f64) -> (f64, f64) {
        match self {
            Material::Silicon => (sellmeier_checked(self, &Sellmeier::SILICON, wavelength_um), 0.0),
            Material::SiliconDioxide => {
                (sellmeier_checked(self, &Sellmeier::SILICA, wavelength_um), 0.0)
            }
            Material::SiliconNitride => (2.0, 0.0),
            Material::TitaniumNitride => (3.23, 5.2591),
            // McPeak, refractiveindex.info
            Material::Aluminium => (1.3474, 14.133),
        }
    }

    pub fn is_metal(&self) -> bool {
        matches!(self, Material::TitaniumNitride | Material::Aluminium)
    }

    /// Name used for the medium in generated scripts
    pub fn display_name(&self) -> &'static str {
        match self {
            Material::Silicon => "Si",
            Material::SiliconDioxide => "SiO2",
            Material::SiliconNitride => "SiN",
            Material::TitaniumNitride => "TiN",
            Material::Aluminium => "Al",
        }
    }

    /// Tidy3D Python expression for this medium at the given wavelength.
    pub fn to_tidy3d_python(&self, wavelength_um: f64) -> String {
        let (n, k) = self.nk(wavelength_um);
        if self.is_metal() {
            format!(
                "td.Medium.from_nk(n={:.4}, k={:.4}, freq=td.C_0 / {:.4}, name=\"{}\")",
                n,
                k,
                wavelength_um,
                self.display_name()
            )
        } else {
            format!(
                "td.Medium(name=\"{}\", permittivity={:.6})",
                self.display_name(),
                n * n
            )
        }
    }
}

fn sellmeier_checked(material: &Material, model: &Sellmeier, wavelength_um: f64) -> f64 {
    if !model.in_range(wavelength_um) {
        tracing::warn!(
            "wavelength {} um outside valid range ({}-{} um) for {}",
            wavelength_um,
            model.valid_range.0,
            model.valid_range.1,
            material
        );
    }
    model.index(wavelength_um)
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Material {
    type Err = PdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "si" | "silicon" => Ok(Material::Silicon),
            "sio2" | "silica" | "fused_silica" => Ok(Material::SiliconDioxide),
            "sin" | "si3n4" | "nitride" => Ok(Material::SiliconNitride),
            "tin" => Ok(Material::TitaniumNitride),
            "al" | "aluminum" | "aluminium" => Ok(Material::Aluminium),
            _ => Err(PdkError::Config(format!(
                "unknown material `{s}`. Use: si, sio2, sin, tin, al"
            ))),
        }
    }
}

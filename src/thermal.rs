//! Envelope descriptors read from the simulator input model.
//!
//! The input model is a flat list of `Class, field, field, ...;` objects with
//! `!` line comments. Only the material, construction and simple-glazing
//! classes are read.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::ExtractError;
use crate::units::parse_number;

/// Wall and window thermal descriptors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ThermalDescriptors {
    /// Layer-sum thermal resistance of the first wall construction (m²·K/W),
    /// surface films excluded.
    pub wall_r_value: Option<f64>,
    /// U-factor of the first simple glazing system (W/m²·K).
    pub window_u_value: Option<f64>,
}

/// Thermal resistance contributed by one named layer.
#[derive(Debug, Clone, Copy)]
enum Layer {
    Massive { thickness: f64, conductivity: f64 },
    Resistive { resistance: f64 },
}

impl Layer {
    fn resistance(self) -> Option<f64> {
        match self {
            Self::Massive {
                thickness,
                conductivity,
            } if conductivity > 0.0 => Some(thickness / conductivity),
            Self::Massive { .. } => None,
            Self::Resistive { resistance } => Some(resistance),
        }
    }
}

fn objects(text: &str) -> Vec<Vec<String>> {
    let stripped: String = text
        .lines()
        .map(|line| line.split_once('!').map_or(line, |(code, _)| code))
        .collect::<Vec<_>>()
        .join("\n");
    stripped
        .split(';')
        .map(|obj| obj.split(',').map(|f| f.trim().to_string()).collect::<Vec<_>>())
        .filter(|fields| fields.first().is_some_and(|c| !c.is_empty()))
        .collect()
}

fn field(fields: &[String], idx: usize) -> Option<f64> {
    fields.get(idx).and_then(|f| parse_number(f))
}

impl ThermalDescriptors {
    /// Reads descriptors from input-model text. Missing classes leave the
    /// corresponding descriptor `None`.
    pub fn from_idf_text(text: &str) -> Self {
        let mut layers: HashMap<String, Layer> = HashMap::new();
        let mut constructions: Vec<(String, Vec<String>)> = Vec::new();
        let mut window_u_value = None;

        for obj in objects(text) {
            let class = obj[0].to_ascii_lowercase();
            let Some(name) = obj.get(1).map(|n| n.to_ascii_lowercase()) else {
                continue;
            };
            match class.as_str() {
                "material" => {
                    if let (Some(thickness), Some(conductivity)) =
                        (field(&obj, 3), field(&obj, 4))
                    {
                        layers.insert(
                            name,
                            Layer::Massive {
                                thickness,
                                conductivity,
                            },
                        );
                    }
                }
                "material:nomass" => {
                    if let Some(resistance) = field(&obj, 3) {
                        layers.insert(name, Layer::Resistive { resistance });
                    }
                }
                "material:airgap" => {
                    if let Some(resistance) = field(&obj, 2) {
                        layers.insert(name, Layer::Resistive { resistance });
                    }
                }
                "construction" => {
                    let layer_names = obj[2..]
                        .iter()
                        .filter(|l| !l.is_empty())
                        .map(|l| l.to_ascii_lowercase())
                        .collect();
                    constructions.push((name, layer_names));
                }
                "windowmaterial:simpleglazingsystem" if window_u_value.is_none() => {
                    window_u_value = field(&obj, 2);
                }
                _ => {}
            }
        }

        let wall_r_value = constructions
            .iter()
            .find(|(name, _)| name.contains("wall"))
            .and_then(|(_, layer_names)| {
                let rs: Vec<f64> = layer_names
                    .iter()
                    .filter_map(|l| layers.get(l).and_then(|layer| layer.resistance()))
                    .collect();
                (!rs.is_empty()).then(|| rs.iter().sum::<f64>())
            });

        Self {
            wall_r_value,
            window_u_value,
        }
    }

    /// Reads descriptors from an input-model file.
    ///
    /// # Errors
    ///
    /// Returns `ExtractError::Io` if the file cannot be read.
    pub fn from_idf_file(path: &Path) -> Result<Self, ExtractError> {
        let bytes = fs::read(path).map_err(|e| ExtractError::io(path, e))?;
        Ok(Self::from_idf_text(&String::from_utf8_lossy(&bytes)))
    }

    pub fn is_empty(&self) -> bool {
        self.wall_r_value.is_none() && self.window_u_value.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDF: &str = "\
Version,9.6;

Material,
    Brick,                   !- Name
    MediumRough,             !- Roughness
    0.1016,                  !- Thickness {m}
    0.89,                    !- Conductivity {W/m-K}
    1920,                    !- Density {kg/m3}
    790;                     !- Specific Heat {J/kg-K}

Material:NoMass,
    Wall Insulation,         !- Name
    Rough,                   !- Roughness
    2.5;                     !- Thermal Resistance {m2-K/W}

Material,
    Gypsum,MediumSmooth,0.0127,0.16,800,1090;

Construction,
    Roof Deck,               !- Name
    Gypsum;                  !- Outside Layer

Construction,
    Exterior Wall,           !- Name
    Brick,                   !- Outside Layer
    Wall Insulation;         !- Layer 2

WindowMaterial:SimpleGlazingSystem,
    Double Clear,            !- Name
    2.8,                     !- U-Factor {W/m2-K}
    0.6;                     !- Solar Heat Gain Coefficient

WindowMaterial:SimpleGlazingSystem,
    Single Clear,5.8,0.8;
";

    #[test]
    fn wall_r_value_sums_layers_of_first_wall() {
        let t = ThermalDescriptors::from_idf_text(IDF);
        let expected = 0.1016 / 0.89 + 2.5;
        assert!((t.wall_r_value.unwrap_or(0.0) - expected).abs() < 1e-9);
    }

    #[test]
    fn window_u_value_from_first_glazing_system() {
        let t = ThermalDescriptors::from_idf_text(IDF);
        assert_eq!(t.window_u_value, Some(2.8));
    }

    #[test]
    fn model_without_envelope_is_empty() {
        let t = ThermalDescriptors::from_idf_text("Version,9.6;\nTimestep,4;\n");
        assert!(t.is_empty());
    }

    #[test]
    fn unknown_layers_are_skipped() {
        let idf = "Construction,Wall A,Mystery;\nMaterial:NoMass,Ins,Rough,1.5;\n\
                   Construction,Wall B,Ins;";
        let t = ThermalDescriptors::from_idf_text(idf);
        // First wall construction has no resolvable layers.
        assert_eq!(t.wall_r_value, None);
    }
}

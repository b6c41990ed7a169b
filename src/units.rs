//! Energy and area unit normalization shared by all extractors.
//!
//! Every extractor reports energy in kWh and area in m². Units arrive as
//! bracketed tags (`[J]`, `Electricity [GJ]`, `Area [ft2]`) and are parsed
//! with [`EnergyUnit::from_tag`] / [`AreaUnit::from_tag`].

/// Joules per kWh.
pub const JOULES_PER_KWH: f64 = 3_600_000.0;
/// kWh per gigajoule, as printed by the simulator's tabular reports.
pub const KWH_PER_GJ: f64 = 277.778;
/// kWh per thousand BTU.
pub const KWH_PER_KBTU: f64 = 0.293_071;
/// Square metres per square foot.
pub const M2_PER_FT2: f64 = 0.092_903_04;

/// Converts joules to kWh.
pub fn joules_to_kwh(joules: f64) -> f64 {
    joules / JOULES_PER_KWH
}

/// Converts kWh to joules.
pub fn kwh_to_joules(kwh: f64) -> f64 {
    kwh * JOULES_PER_KWH
}

/// Converts gigajoules to kWh.
pub fn gj_to_kwh(gj: f64) -> f64 {
    gj * KWH_PER_GJ
}

/// Converts square feet to square metres.
pub fn ft2_to_m2(ft2: f64) -> f64 {
    ft2 * M2_PER_FT2
}

/// Energy units seen across simulator artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyUnit {
    Joule,
    Kilojoule,
    Megajoule,
    Gigajoule,
    WattHour,
    KilowattHour,
    MegawattHour,
    Kbtu,
}

impl EnergyUnit {
    /// Parses a unit tag, with or without surrounding brackets or a label.
    ///
    /// `"J"`, `"[GJ]"` and `"Electricity [kWh]"` all parse; power, volume and
    /// intensity units (`W`, `m3`, `MJ/m2`) return `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let inner = bracket_contents(tag).unwrap_or(tag).trim();
        match inner.to_ascii_lowercase().as_str() {
            "j" => Some(Self::Joule),
            "kj" => Some(Self::Kilojoule),
            "mj" => Some(Self::Megajoule),
            "gj" => Some(Self::Gigajoule),
            "wh" => Some(Self::WattHour),
            "kwh" => Some(Self::KilowattHour),
            "mwh" => Some(Self::MegawattHour),
            "kbtu" => Some(Self::Kbtu),
            _ => None,
        }
    }

    /// Converts a value in this unit to kWh.
    pub fn to_kwh(self, value: f64) -> f64 {
        match self {
            Self::Joule => joules_to_kwh(value),
            Self::Kilojoule => joules_to_kwh(value * 1e3),
            Self::Megajoule => joules_to_kwh(value * 1e6),
            Self::Gigajoule => gj_to_kwh(value),
            Self::WattHour => value / 1e3,
            Self::KilowattHour => value,
            Self::MegawattHour => value * 1e3,
            Self::Kbtu => value * KWH_PER_KBTU,
        }
    }
}

/// Area units seen in tabular reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaUnit {
    SquareMetre,
    SquareFoot,
}

impl AreaUnit {
    /// Parses `m2` / `ft2` style tags, bracketed or bare.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let inner = bracket_contents(tag).unwrap_or(tag).trim();
        match inner.to_ascii_lowercase().as_str() {
            "m2" | "m²" | "sq m" => Some(Self::SquareMetre),
            "ft2" | "ft²" | "sq ft" => Some(Self::SquareFoot),
            _ => None,
        }
    }

    /// Converts a value in this unit to m².
    pub fn to_m2(self, value: f64) -> f64 {
        match self {
            Self::SquareMetre => value,
            Self::SquareFoot => ft2_to_m2(value),
        }
    }
}

/// Returns the text between the last `[` and the following `]`, if any.
pub fn bracket_contents(text: &str) -> Option<&str> {
    let open = text.rfind('[')?;
    let close = text[open..].find(']')? + open;
    Some(&text[open + 1..close])
}

/// Parses a numeric cell, tolerating padding and thousands separators.
pub fn parse_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

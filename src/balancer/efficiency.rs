use serde::{Deserialize, Serialize};
use strum::Display;

use crate::index::NodeIndex;

/// kg CO2 emitted per kWh of wasted energy
pub const EMISSION_FACTOR_KG_PER_KWH: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EfficiencyReport {
    /// Σ load × efficiency
    pub global_efficiency: f64,
    pub total_load: f64,
    /// Σ load × (1 − efficiency)
    pub total_losses: f64,
    /// global_efficiency / total_load, 0 when nothing is loaded
    pub efficiency_ratio: f64,
}

/// Full recomputation over every indexed node
pub fn calculate_efficiency(index: &NodeIndex) -> EfficiencyReport {
    let mut report = index
        .iter()
        .fold(EfficiencyReport::default(), |mut acc, (_, attrs)| {
            acc.global_efficiency += attrs.current_load * attrs.efficiency;
            acc.total_losses += attrs.current_load * (1.0 - attrs.efficiency);
            acc.total_load += attrs.current_load;
            acc
        });
    if report.total_load > 0.0 {
        report.efficiency_ratio = report.global_efficiency / report.total_load;
    }
    report
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum EfficiencyClass {
    A,
    B,
    C,
    D,
    E,
}

impl EfficiencyClass {
    pub fn from_co2(total_co2_kg: f64) -> Self {
        match total_co2_kg {
            x if x < 100.0 => EfficiencyClass::A,
            x if x < 250.0 => EfficiencyClass::B,
            x if x < 500.0 => EfficiencyClass::C,
            x if x < 1000.0 => EfficiencyClass::D,
            _ => EfficiencyClass::E,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CarbonReport {
    pub total_co2_kg: f64,
    pub co2_per_kwh: f64,
    pub efficiency_class: EfficiencyClass,
}

pub fn carbon_footprint(index: &NodeIndex) -> CarbonReport {
    let report = calculate_efficiency(index);
    let total_co2_kg = report.total_losses * EMISSION_FACTOR_KG_PER_KWH;
    CarbonReport {
        total_co2_kg,
        co2_per_kwh: if report.total_load > 0.0 {
            total_co2_kg / report.total_load
        } else {
            0.0
        },
        efficiency_class: EfficiencyClass::from_co2(total_co2_kg),
    }
}

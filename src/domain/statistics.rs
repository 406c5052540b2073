// Derived statistics computed before dissemination

use serde::Serialize;

use super::session::TestSession;

/// Volume of the standard 150 mm cube, in cubic meters
pub const CUBE_VOLUME_M3: f64 = 0.003375;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Spread {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub count: usize,
}

impl Spread {
    fn of(values: &[f64]) -> Option<Spread> {
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        Some(Spread {
            min,
            avg,
            max,
            count: values.len(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub sample_age_days: i64,
    /// Strength over specimens with press data, N/mm²
    pub strength: Option<Spread>,
    /// Mass over weighed specimens (cube protocols only), kg
    pub mass: Option<Spread>,
    /// Density over weighed specimens (cube protocols only), kg/m³
    pub density: Option<Spread>,
}

impl SessionReport {
    pub fn compute(session: &TestSession) -> Self {
        let specimens = session.specimens();
        let strengths: Vec<f64> = specimens
            .iter()
            .filter_map(|s| s.press.map(|p| p.strength_mpa))
            .collect();

        let (mass, density) = if session.parameters.protocol.is_cube() {
            let masses: Vec<f64> = specimens
                .iter()
                .filter_map(|s| s.scale.map(|r| r.mass_kg))
                .collect();
            let densities: Vec<f64> = masses.iter().map(|m| m / CUBE_VOLUME_M3).collect();
            (Spread::of(&masses), Spread::of(&densities))
        } else {
            (None, None)
        };

        Self {
            sample_age_days: session.parameters.sample_age_days(),
            strength: Spread::of(&strengths),
            mass,
            density,
        }
    }
}

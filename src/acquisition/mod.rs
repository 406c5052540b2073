// Measurement sources and protocol-specific specimen handlers

pub mod handlers;

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use crate::config::AcquisitionConfig;
use crate::domain::{PressReading, ScaleReading};
use crate::errors::WorkflowError;

pub use handlers::{handler_for, ProtocolHandler};

/// Loaded face area of the standard specimen, mm²
pub const LOADED_AREA_MM2: f64 = 22_500.0;

/// Where readings come from. Failures are device-class errors.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    async fn read_scale(&self) -> Result<ScaleReading, WorkflowError>;
    async fn read_press(&self) -> Result<PressReading, WorkflowError>;
}

/// Stand-in instruments producing plausible random readings
#[derive(Debug, Clone)]
pub struct SimulatedInstruments {
    reading_delay: Duration,
}

impl SimulatedInstruments {
    pub fn new(config: &AcquisitionConfig) -> Self {
        Self {
            reading_delay: Duration::from_millis(config.reading_delay_ms),
        }
    }
}

#[async_trait]
impl MeasurementSource for SimulatedInstruments {
    async fn read_scale(&self) -> Result<ScaleReading, WorkflowError> {
        tokio::time::sleep(self.reading_delay).await;
        let mass_kg = rand::rng().random_range(2.5..=7.8);
        debug!(mass_kg = mass_kg, "Simulated scale reading");
        Ok(ScaleReading { mass_kg })
    }

    async fn read_press(&self) -> Result<PressReading, WorkflowError> {
        tokio::time::sleep(self.reading_delay).await;
        let strength_mpa: f64 = rand::rng().random_range(25.0..=55.0);
        debug!(strength_mpa = strength_mpa, "Simulated press reading");
        Ok(PressReading {
            load_n: strength_mpa * LOADED_AREA_MM2,
            strength_mpa,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_readings_stay_in_range() {
        let instruments = SimulatedInstruments::new(&AcquisitionConfig {
            reading_delay_ms: 0,
            reconnect_delay_ms: 0,
        });
        for _ in 0..50 {
            let scale = instruments.read_scale().await.unwrap();
            assert!((2.5..=7.8).contains(&scale.mass_kg));
            let press = instruments.read_press().await.unwrap();
            assert!((25.0..=55.0).contains(&press.strength_mpa));
            assert!((press.load_n - press.strength_mpa * LOADED_AREA_MM2).abs() < 1e-6);
        }
    }
}

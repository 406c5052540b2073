// Test session aggregate and per-specimen readings

use serde::{Deserialize, Serialize};

use super::parameters::SessionParameters;
use crate::errors::WorkflowError;

/// Scale reading in kilograms
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleReading {
    pub mass_kg: f64,
}

impl ScaleReading {
    pub fn formatted(&self) -> String {
        format!("{:.1} kg", self.mass_kg)
    }
}

/// Press reading: breaking load and the derived strength
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressReading {
    pub load_n: f64,
    pub strength_mpa: f64,
}

impl PressReading {
    pub fn formatted_load(&self) -> String {
        format!("{:.0} N", self.load_n)
    }

    pub fn formatted_strength(&self) -> String {
        format!("{:.2} N/mm²", self.strength_mpa)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecimenMeasurement {
    /// 1-based position within the set
    pub index: u32,
    pub scale: Option<ScaleReading>,
    pub press: Option<PressReading>,
}

/// One testing cycle: parameters plus the specimens measured so far
#[derive(Debug, Clone, PartialEq)]
pub struct TestSession {
    pub parameters: SessionParameters,
    specimens: Vec<SpecimenMeasurement>,
}

impl TestSession {
    pub fn new(parameters: SessionParameters) -> Self {
        let capacity = parameters.set_size as usize;
        Self {
            parameters,
            specimens: Vec::with_capacity(capacity),
        }
    }

    pub fn specimens(&self) -> &[SpecimenMeasurement] {
        &self.specimens
    }

    /// Append a measured specimen; a full set rejects further specimens
    pub fn push_specimen(&mut self, specimen: SpecimenMeasurement) -> Result<(), WorkflowError> {
        if self.is_complete() {
            return Err(WorkflowError::StateMachine(format!(
                "set {} already holds {} specimens",
                self.parameters.set_id, self.parameters.set_size
            )));
        }
        self.specimens.push(specimen);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.specimens.len() == self.parameters.set_size as usize
    }

    /// Index of the next specimen to measure
    pub fn next_index(&self) -> u32 {
        self.specimens.len() as u32 + 1
    }
}

use async_trait::async_trait;
use tracing::debug;

use super::MeasurementSource;
use crate::domain::{Protocol, SpecimenMeasurement};
use crate::errors::WorkflowError;

/// Measures one specimen the way its protocol requires
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn measure(
        &self,
        source: &dyn MeasurementSource,
        index: u32,
    ) -> Result<SpecimenMeasurement, WorkflowError>;
}

/// Cube protocols: weigh, then press
pub struct ScaleAndPress;

/// Beam compression: two press readings, the stronger one is kept
pub struct DualPress;

/// Beam flexural: one press reading
pub struct SinglePress;

#[async_trait]
impl ProtocolHandler for ScaleAndPress {
    fn name(&self) -> &'static str {
        "scale-and-press"
    }

    async fn measure(
        &self,
        source: &dyn MeasurementSource,
        index: u32,
    ) -> Result<SpecimenMeasurement, WorkflowError> {
        let scale = source.read_scale().await?;
        let press = source.read_press().await?;
        Ok(SpecimenMeasurement {
            index,
            scale: Some(scale),
            press: Some(press),
        })
    }
}

#[async_trait]
impl ProtocolHandler for DualPress {
    fn name(&self) -> &'static str {
        "dual-press"
    }

    async fn measure(
        &self,
        source: &dyn MeasurementSource,
        index: u32,
    ) -> Result<SpecimenMeasurement, WorkflowError> {
        let first = source.read_press().await?;
        let second = source.read_press().await?;
        debug!(
            specimen = index,
            first = first.strength_mpa,
            second = second.strength_mpa,
            "Beam halves pressed"
        );
        let stronger = if second.strength_mpa > first.strength_mpa {
            second
        } else {
            first
        };
        Ok(SpecimenMeasurement {
            index,
            scale: None,
            press: Some(stronger),
        })
    }
}

#[async_trait]
impl ProtocolHandler for SinglePress {
    fn name(&self) -> &'static str {
        "single-press"
    }

    async fn measure(
        &self,
        source: &dyn MeasurementSource,
        index: u32,
    ) -> Result<SpecimenMeasurement, WorkflowError> {
        let press = source.read_press().await?;
        Ok(SpecimenMeasurement {
            index,
            scale: None,
            press: Some(press),
        })
    }
}

pub fn handler_for(protocol: Protocol) -> Box<dyn ProtocolHandler> {
    match protocol {
        Protocol::CubeCompression | Protocol::CubeFrost => Box::new(ScaleAndPress),
        Protocol::BeamCompression => Box::new(DualPress),
        Protocol::BeamFlexural => Box::new(SinglePress),
    }
}

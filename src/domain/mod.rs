// Domain model: protocols, parameters, sessions and derived statistics

pub mod parameters;
pub mod protocol;
pub mod session;
pub mod statistics;

pub use parameters::{OutputFormat, RawSubmission, SessionParameters, DATE_FORMAT};
pub use protocol::Protocol;
pub use session::{PressReading, ScaleReading, SpecimenMeasurement, TestSession};
pub use statistics::{SessionReport, Spread};

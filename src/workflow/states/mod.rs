pub mod acquire;
pub mod collect_input;
pub mod disseminate;
pub mod error;
pub mod idle;

pub use acquire::AcquireState;
pub use collect_input::CollectInputState;
pub use disseminate::DisseminateState;
pub use error::{
    user_message, DeviceType, ErrorState, Reconnector, SimulatedReconnector,
    MAX_AUTOMATIC_RECOVERIES,
};
pub use idle::IdleState;

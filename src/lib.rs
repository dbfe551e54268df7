pub mod error;
pub mod util;

mod clock;
pub mod engine;
pub mod noise;
pub mod node;
pub mod parameter;
mod signal_logger;

#[cfg(feature = "cpal_output")]
pub mod output;

pub use clock::{BlockTime, SampleClock};
pub use error::{NodeError, NodeResult};
pub use node::{NodeState, NoiseNode, Voice};
pub use parameter::{ParameterBridge, ParameterId, ParameterRamp};

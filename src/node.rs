mod noise_node;

pub use noise_node::{NoiseNode, DEFAULT_AMPLITUDE, DEFAULT_INERTIA};

use crate::error::NodeResult;

/// Where a node is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// The engine has not finished creating the node's unit, or failed to
    Unattached,
    Stopped,
    Started
}

/// A sound source that can be played as one voice of a polyphonic instrument
pub trait Voice: Send + Sync {
    /// Starts, plays or activates the voice, all mean the same thing
    fn start(&self) -> NodeResult<()>;

    /// Stops or bypasses the voice
    fn stop(&self) -> NodeResult<()>;

    /// Whether the engine is currently rendering the voice
    fn is_started(&self) -> bool;

    /// Creates an independent voice with the same sound
    fn duplicate(&self) -> Box<dyn Voice>;
}

pub mod config;
pub mod offline;

pub use config::EngineConfig;
pub use offline::OfflineEngine;

use std::sync::Arc;

use crate::clock::BlockTime;
use crate::parameter::{ParameterId, ParameterRamp};

/// Builds a four character code the way audio component descriptors spell them, e.g. `fourcc(b"wnoz")`
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    ((code[0] as u32) << 24) | ((code[1] as u32) << 16) | ((code[2] as u32) << 8) | code[3] as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Generator
}

/// Opaque identifier of a kind of processing unit known to an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentDescription {
    pub component_type: ComponentType,
    pub sub_type: u32,
    pub manufacturer: u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationHandle(pub(crate) usize);

/// Handle of a processing unit living inside an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitHandle(pub(crate) usize);

/// Identifies one observer registered on a unit's parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(pub(crate) usize);

/// Callback invoked when the host changes a parameter value
pub type ParameterObserver = Arc<dyn Fn(ParameterId, f32) + Send + Sync>;

/// Callback receiving the result of an asynchronous `instantiate`
pub type InstantiateCallback = Box<dyn FnOnce(EngineResult<UnitHandle>) + Send>;

/// Creates a fresh processing unit for a registered component type
pub type UnitFactory = fn() -> Box<dyn GeneratorUnit>;

/// Timing information handed to a unit for each block it renders
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputInfo {
    pub sample_rate: u32,
    pub block_time: BlockTime
}

impl OutputInfo {
    pub fn new(sample_rate: u32, block_time: BlockTime) -> Self {
        Self { sample_rate, block_time }
    }
}

/// The render side of a node. Lives inside the engine and is only touched from the render context
pub trait GeneratorUnit: Send {
    /// Hands the unit the render end of one of its parameters
    fn bind_parameter(&mut self, id: ParameterId, ramp: ParameterRamp) -> EngineResult<()>;

    /// Fills a mono buffer with the unit's output
    fn render(&mut self, buffer: &mut [f32], output_info: &OutputInfo);
}

/// The graph/engine a node attaches to.
///
/// Implementations own the processing units and the render loop. Nodes only ever hold handles.
pub trait AudioEngine: Send + Sync {
    /// Makes a component type instantiable. Registering the same description again returns the
    /// handle of the first registration
    fn register_generator_type(
        &self, description: ComponentDescription, name: &str, factory: UnitFactory
    ) -> RegistrationHandle;

    /// Creates a unit for `description`. `completion` may run later, on any thread
    fn instantiate(&self, description: ComponentDescription, completion: InstantiateCallback);

    /// Adds the unit to the render graph
    fn attach(&self, unit: UnitHandle) -> EngineResult<()>;

    /// Removes the unit from the graph and destroys it. Unknown handles are ignored
    fn detach(&self, unit: UnitHandle);

    fn start(&self, unit: UnitHandle) -> EngineResult<()>;

    fn stop(&self, unit: UnitHandle) -> EngineResult<()>;

    fn is_running(&self, unit: UnitHandle) -> bool;

    /// Passes the render end of a parameter to the unit
    fn bind_parameter(&self, unit: UnitHandle, id: ParameterId, ramp: ParameterRamp) -> EngineResult<()>;

    /// Subscribes `observer` to host-side changes of parameter `id` on `unit`
    fn register_observer(
        &self, unit: UnitHandle, id: ParameterId, observer: ParameterObserver
    ) -> EngineResult<ObserverToken>;

    /// Unknown tokens are ignored
    fn remove_observer(&self, unit: UnitHandle, token: ObserverToken);

    /// Sets a parameter through the host's parameter tree. Every observer except `originator` is told
    fn set_value(
        &self, unit: UnitHandle, id: ParameterId, value: f32, originator: Option<ObserverToken>
    ) -> EngineResult<()>;
}

/// An observer registration that is removed from the engine when dropped
pub struct ObserverRegistration {
    engine: Arc<dyn AudioEngine>,
    unit: UnitHandle,
    token: ObserverToken
}

impl ObserverRegistration {
    pub fn register(
        engine: Arc<dyn AudioEngine>, unit: UnitHandle, id: ParameterId, observer: ParameterObserver
    ) -> EngineResult<Self> {
        let token = engine.register_observer(unit, id, observer)?;
        Ok(Self { engine, unit, token })
    }

    pub fn token(&self) -> ObserverToken {
        self.token
    }
}

impl Drop for ObserverRegistration {
    fn drop(&mut self) {
        self.engine.remove_observer(self.unit, self.token);
    }
}

impl std::fmt::Debug for ObserverRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistration")
            .field("unit", &self.unit)
            .field("token", &self.token)
            .finish()
    }
}

/// Error type returned by engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// No component type is registered for the description
    UnregisteredType,
    /// The engine has no room for another unit
    CapacityExceeded,
    /// The handle does not name a live unit
    UnknownUnit,
    /// The unit exists but is not part of the render graph
    NotAttached,
    /// The unit has no parameter with that id
    UnknownParameter(ParameterId)
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::UnregisteredType => write!(f, "No component registered for description"),
            EngineError::CapacityExceeded => write!(f, "Engine unit capacity exceeded"),
            EngineError::UnknownUnit => write!(f, "Unknown unit"),
            EngineError::NotAttached => write!(f, "Unit is not attached to the graph"),
            EngineError::UnknownParameter(id) => write!(f, "Unit has no parameter {}", id)
        }
    }
}

impl std::error::Error for EngineError {}

pub type EngineResult<T> = Result<T, EngineError>;

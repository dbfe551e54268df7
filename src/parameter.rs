mod bridge;
mod ramp;

pub use bridge::ParameterBridge;
pub use ramp::ParameterRamp;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Typed address of an automatable parameter on a generator unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterId {
    /// Output gain of a generator, 0 is silent and 1 is full scale
    Amplitude
}

impl ParameterId {
    pub fn name(&self) -> &'static str {
        match self {
            ParameterId::Amplitude => "amplitude"
        }
    }

    /// Inclusive range of values the parameter accepts from callers
    pub fn range(&self) -> (f32, f32) {
        match self {
            ParameterId::Amplitude => (0.0, 1.0)
        }
    }

    pub fn accepts(&self, value: f32) -> bool {
        let (min, max) = self.range();
        value.is_finite() && value >= min && value <= max
    }
}

impl std::fmt::Display for ParameterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// f32 stored as its bit pattern so it can be shared between threads without a lock
#[derive(Debug)]
pub struct AtomicF32 {
    bits: AtomicU32
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self { bits: AtomicU32::new(value.to_bits()) }
    }

    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// The scalar state shared by a bridge and its ramp.
///
/// `target`, `inertia`, `external` and `snap` are written from the control context and published
/// by bumping `generation` with release ordering. `current` is written by the ramp after every
/// block, and by the control context when the host reports an external change.
#[derive(Debug)]
pub(crate) struct ParameterState {
    target: AtomicF32,
    current: AtomicF32,
    inertia: AtomicF32,
    /// Value reported by the host, picked up by the ramp when `snap` is set
    external: AtomicF32,
    snap: AtomicBool,
    generation: AtomicU32
}

impl ParameterState {
    fn new(initial: f32, inertia: f32) -> Self {
        Self {
            target: AtomicF32::new(initial),
            current: AtomicF32::new(initial),
            inertia: AtomicF32::new(inertia),
            external: AtomicF32::new(initial),
            snap: AtomicBool::new(false),
            generation: AtomicU32::new(0)
        }
    }

    fn publish(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    fn set_target(&self, value: f32) {
        self.target.set(value);
        self.publish();
    }

    fn set_inertia(&self, seconds: f32) {
        self.inertia.set(seconds);
        self.publish();
    }

    fn notify_external_change(&self, value: f32) {
        self.target.set(value);
        self.external.set(value);
        self.current.set(value);
        self.snap.store(true, Ordering::Relaxed);
        self.publish();
    }
}

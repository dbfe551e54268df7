use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use super::{ParameterId, ParameterRamp, ParameterState};
use crate::engine::{ObserverRegistration, ObserverToken, ParameterObserver};

/// Control end of one automatable parameter.
///
/// Exactly one control-context writer uses the bridge while exactly one render-context reader owns
/// the `ParameterRamp` it hands out. Writes land in atomics and are picked up by the ramp at the
/// next block boundary; rapid writes collapse to the latest one. The observer registration sits
/// behind a mutex that only the control context ever takes.
pub struct ParameterBridge {
    id: ParameterId,
    state: Arc<ParameterState>,
    observer: Mutex<Option<ObserverRegistration>>
}

impl ParameterBridge {
    pub fn new(id: ParameterId, initial: f32, inertia: f32) -> Self {
        let state = Arc::new(ParameterState::new(initial, inertia));
        let observer = Mutex::new(None);
        Self { id, state, observer }
    }

    pub fn id(&self) -> ParameterId {
        self.id
    }

    /// Records a new target. The value is accepted as-is
    pub fn set_target(&self, value: f32) {
        trace!(parameter = %self.id, value, "parameter target set");
        self.state.set_target(value);
    }

    /// The most recently requested value
    pub fn target(&self) -> f32 {
        self.state.target.get()
    }

    /// The value in effect at the render path's last block
    pub fn current_value(&self) -> f32 {
        self.state.current.get()
    }

    pub fn inertia(&self) -> f32 {
        self.state.inertia.get()
    }

    /// Changes the ramp time. The ramp is recomputed from its current position on the next block
    pub fn set_inertia(&self, seconds: f32) {
        self.state.set_inertia(seconds);
    }

    /// Brings the bridge in line with a value the host applied on its own
    pub fn notify_external_change(&self, value: f32) {
        trace!(parameter = %self.id, value, "external parameter change");
        self.state.notify_external_change(value);
    }

    /// Creates the render end. Only one ramp may be advancing at a time
    pub fn ramp(&self) -> ParameterRamp {
        ParameterRamp::new(self.state.clone())
    }

    /// Callback for the host's parameter tree that forwards changes of this parameter
    pub fn observer(&self) -> ParameterObserver {
        let id = self.id;
        let state = self.state.clone();
        Arc::new(move |address: ParameterId, value: f32| {
            if address == id {
                trace!(parameter = %id, value, "external parameter change");
                state.notify_external_change(value);
            }
        })
    }

    fn registration(&self) -> MutexGuard<Option<ObserverRegistration>> {
        self.observer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Keeps `registration` alive for as long as the bridge, replacing any previous one
    pub fn set_observer_registration(&self, registration: ObserverRegistration) {
        let previous = self.registration().replace(registration);
        drop(previous);
    }

    pub fn observer_registered(&self) -> bool {
        self.registration().is_some()
    }

    /// Token of the registered observer, used as originator for writes through the host tree
    pub fn observer_token(&self) -> Option<ObserverToken> {
        self.registration().as_ref().map(|registration| registration.token())
    }

    /// Deregisters the change notification channel. Safe to call more than once
    pub fn teardown(&self) {
        // Deregistration calls into the engine, so it happens after the lock is released
        let registration = self.registration().take();
        drop(registration);
    }
}

impl Drop for ParameterBridge {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for ParameterBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterBridge")
            .field("id", &self.id)
            .field("target", &self.target())
            .field("current", &self.current_value())
            .field("inertia", &self.inertia())
            .field("observer_registered", &self.observer_registered())
            .finish()
    }
}

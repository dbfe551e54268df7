use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use super::{
    AudioEngine, ComponentDescription, EngineConfig, EngineError, EngineResult, GeneratorUnit,
    InstantiateCallback, ObserverToken, OutputInfo, ParameterObserver, RegistrationHandle,
    UnitFactory, UnitHandle
};
use crate::clock::SampleClock;
use crate::parameter::{ParameterId, ParameterRamp};
use crate::signal_logger::SignalLogger;

struct Registration {
    handle: RegistrationHandle,
    name: String,
    factory: UnitFactory
}

struct ObserverEntry {
    token: ObserverToken,
    id: ParameterId,
    observer: ParameterObserver
}

struct UnitSlot {
    unit: Box<dyn GeneratorUnit>,
    name: String,
    attached: bool,
    running: bool,
    observers: Vec<ObserverEntry>,
    /// Last value written through the host's parameter tree
    values: HashMap<ParameterId, f32>
}

impl UnitSlot {
    fn new(unit: Box<dyn GeneratorUnit>, name: String) -> Self {
        let attached = false;
        let running = false;
        let observers = Vec::new();
        let values = HashMap::new();
        Self { unit, name, attached, running, observers, values }
    }
}

/// Keyed storage of the engine's live units
struct UnitTable {
    units: HashMap<UnitHandle, UnitSlot>,
    next_key: usize
}

impl UnitTable {
    fn new() -> Self {
        Self {
            units: HashMap::new(),
            next_key: 1
        }
    }

    fn add(&mut self, slot: UnitSlot) -> UnitHandle {
        let handle = UnitHandle(self.next_key);
        self.units.insert(handle, slot);
        self.next_key += 1;
        handle
    }

    fn get(&self, handle: UnitHandle) -> EngineResult<&UnitSlot> {
        self.units.get(&handle).ok_or(EngineError::UnknownUnit)
    }

    fn get_mut(&mut self, handle: UnitHandle) -> EngineResult<&mut UnitSlot> {
        self.units.get_mut(&handle).ok_or(EngineError::UnknownUnit)
    }

    fn get_attached_mut(&mut self, handle: UnitHandle) -> EngineResult<&mut UnitSlot> {
        let slot = self.get_mut(handle)?;
        if !slot.attached {
            return Err(EngineError::NotAttached);
        }
        Ok(slot)
    }

    fn remove(&mut self, handle: UnitHandle) -> Option<UnitSlot> {
        self.units.remove(&handle)
    }

    fn len(&self) -> usize {
        self.units.len()
    }
}

struct PendingInstantiation {
    description: ComponentDescription,
    completion: InstantiateCallback
}

/// A unit that has been granted a place in the table but is still being built
struct Reservation {
    description: ComponentDescription,
    factory: UnitFactory,
    name: String
}

struct EngineState {
    registrations: HashMap<ComponentDescription, Registration>,
    units: UnitTable,
    pending: Vec<PendingInstantiation>,
    /// Units counted against `max_units` while their factory runs
    reserved: usize,
    next_token: usize,
    clock: SampleClock,
    mix_buffer: Vec<f32>,
    signal_logger: SignalLogger
}

/// An in-process engine that renders its graph when asked to.
///
/// Instantiation is deferred: `instantiate` only queues the request and `resolve_pending` creates
/// the units and runs the completions, the way a host finishes loading a component on its own
/// schedule. `render` mixes every attached, running unit into an interleaved buffer.
pub struct OfflineEngine {
    config: EngineConfig,
    state: Mutex<EngineState>
}

impl OfflineEngine {
    pub fn new(config: EngineConfig) -> Self {
        #[cfg(feature = "signal_logging")]
        let signal_logger = match SignalLogger::new("engine_signal.txt") {
            Ok(signal_logger) => signal_logger,
            Err(err) => {
                warn!(%err, "could not open signal log, signal logging disabled");
                SignalLogger::new_sink()
            }
        };
        #[cfg(not(feature = "signal_logging"))]
        let signal_logger = SignalLogger::new_sink();

        let state = EngineState {
            registrations: HashMap::new(),
            units: UnitTable::new(),
            pending: Vec::new(),
            reserved: 0,
            next_token: 1,
            clock: SampleClock::new(config.sample_rate),
            mix_buffer: vec![0.0; config.max_block_frames.max(1)],
            signal_logger
        };
        Self { config, state: Mutex::new(state) }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<EngineState> {
        // A panic in a unit must not take the whole engine down with it
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates the units for every queued `instantiate` call and runs their completions.
    /// Returns the number of requests that were resolved.
    ///
    /// Factories run without the engine lock held, so `render` is never kept waiting on a unit
    /// being built.
    pub fn resolve_pending(&self) -> usize {
        let requests: Vec<(InstantiateCallback, EngineResult<Reservation>)> = {
            let mut state = self.lock();
            let pending = std::mem::take(&mut state.pending);
            pending.into_iter().map(|request| {
                let reservation = Self::reserve_unit(&mut state, self.config.max_units, request.description);
                (request.completion, reservation)
            }).collect()
        };

        let n_resolved = requests.len();
        for (completion, reservation) in requests {
            let result = reservation.map(|reservation| {
                let unit = (reservation.factory)();
                let mut state = self.lock();
                state.reserved -= 1;
                let handle = state.units.add(UnitSlot::new(unit, reservation.name));
                debug!(?handle, description = ?reservation.description, "unit instantiated");
                handle
            });
            // Completions call back into the engine, so the lock must be released first
            completion(result);
        }
        n_resolved
    }

    fn reserve_unit(
        state: &mut EngineState, max_units: usize, description: ComponentDescription
    ) -> EngineResult<Reservation> {
        let (factory, name) = match state.registrations.get(&description) {
            Some(registration) => (registration.factory, registration.name.clone()),
            None => {
                warn!(?description, "instantiation requested for unregistered component");
                return Err(EngineError::UnregisteredType);
            }
        };
        if state.units.len() + state.reserved >= max_units {
            warn!(max_units, "instantiation refused, engine is full");
            return Err(EngineError::CapacityExceeded);
        }
        state.reserved += 1;
        Ok(Reservation { description, factory, name })
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn unit_count(&self) -> usize {
        self.lock().units.len()
    }

    pub fn is_attached(&self, unit: UnitHandle) -> bool {
        self.lock().units.get(unit).map(|slot| slot.attached).unwrap_or(false)
    }

    pub fn unit_name(&self, unit: UnitHandle) -> Option<String> {
        self.lock().units.get(unit).map(|slot| slot.name.clone()).ok()
    }

    /// Value of `id` in the unit's parameter tree, if anything was ever written there
    pub fn parameter_value(&self, unit: UnitHandle, id: ParameterId) -> Option<f32> {
        self.lock().units.get(unit).ok().and_then(|slot| slot.values.get(&id).copied())
    }

    pub fn observer_count(&self, unit: UnitHandle) -> usize {
        self.lock().units.get(unit).map(|slot| slot.observers.len()).unwrap_or(0)
    }

    /// Frames rendered since the engine was created
    pub fn rendered_frames(&self) -> u64 {
        self.lock().clock.get_frame()
    }

    /// Renders into `output`, interleaved with `channel_count` channels.
    ///
    /// Stopped or detached units are skipped and their parameters are not advanced. Buffers longer
    /// than `max_block_frames` are rendered as several blocks; nothing is allocated here.
    pub fn render(&self, output: &mut [f32]) {
        let channel_count = (self.config.channel_count as usize).max(1);

        let mut guard = self.lock();
        let state = &mut *guard;
        let block_len = state.mix_buffer.len() * channel_count;
        for block in output.chunks_mut(block_len) {
            self.render_block(state, block, channel_count);
        }

        if state.signal_logger.log("mix", output).is_err() {
            state.signal_logger = SignalLogger::new_sink();
        }
    }

    fn render_block(&self, state: &mut EngineState, output: &mut [f32], channel_count: usize) {
        let n_frames = output.len() / channel_count;
        let block_time = state.clock.next_block(n_frames);
        let output_info = OutputInfo::new(self.config.sample_rate, block_time);

        for sample in output.iter_mut() {
            *sample = 0.0;
        }
        let mix_buffer = &mut state.mix_buffer[..n_frames];

        for slot in state.units.units.values_mut() {
            if !(slot.attached && slot.running) {
                continue;
            }
            slot.unit.render(mix_buffer, &output_info);
            for (frame, sample) in output.chunks_mut(channel_count).zip(mix_buffer.iter()) {
                for channel_sample in frame.iter_mut() {
                    *channel_sample += *sample;
                }
            }
        }
    }

    /// Renders `n_frames` frames into a freshly allocated buffer
    pub fn render_frames(&self, n_frames: usize) -> Vec<f32> {
        let mut output = vec![0_f32; n_frames * self.config.channel_count as usize];
        self.render(&mut output);
        output
    }
}

impl AudioEngine for OfflineEngine {
    fn register_generator_type(
        &self, description: ComponentDescription, name: &str, factory: UnitFactory
    ) -> RegistrationHandle {
        let mut state = self.lock();
        if let Some(registration) = state.registrations.get(&description) {
            return registration.handle;
        }
        let handle = RegistrationHandle(state.registrations.len() + 1);
        let name = name.to_string();
        debug!(?handle, %name, "component type registered");
        state.registrations.insert(description, Registration { handle, name, factory });
        handle
    }

    fn instantiate(&self, description: ComponentDescription, completion: InstantiateCallback) {
        let mut state = self.lock();
        state.pending.push(PendingInstantiation { description, completion });
    }

    fn attach(&self, unit: UnitHandle) -> EngineResult<()> {
        let mut state = self.lock();
        state.units.get_mut(unit)?.attached = true;
        Ok(())
    }

    fn detach(&self, unit: UnitHandle) {
        let removed = self.lock().units.remove(unit);
        // Observers may own the last references to node state, drop them outside the lock
        if removed.is_some() {
            debug!(?unit, "unit detached");
        }
    }

    fn start(&self, unit: UnitHandle) -> EngineResult<()> {
        let mut state = self.lock();
        state.units.get_attached_mut(unit)?.running = true;
        Ok(())
    }

    fn stop(&self, unit: UnitHandle) -> EngineResult<()> {
        let mut state = self.lock();
        state.units.get_attached_mut(unit)?.running = false;
        Ok(())
    }

    fn is_running(&self, unit: UnitHandle) -> bool {
        self.lock().units.get(unit).map(|slot| slot.running).unwrap_or(false)
    }

    fn bind_parameter(&self, unit: UnitHandle, id: ParameterId, ramp: ParameterRamp) -> EngineResult<()> {
        let mut state = self.lock();
        state.units.get_mut(unit)?.unit.bind_parameter(id, ramp)
    }

    fn register_observer(
        &self, unit: UnitHandle, id: ParameterId, observer: ParameterObserver
    ) -> EngineResult<ObserverToken> {
        let mut state = self.lock();
        let token = ObserverToken(state.next_token);
        state.units.get_mut(unit)?.observers.push(ObserverEntry { token, id, observer });
        state.next_token += 1;
        Ok(token)
    }

    fn remove_observer(&self, unit: UnitHandle, token: ObserverToken) {
        let removed: Vec<ObserverEntry> = {
            let mut state = self.lock();
            match state.units.get_mut(unit) {
                Ok(slot) => {
                    let (removed, kept) = std::mem::take(&mut slot.observers)
                        .into_iter()
                        .partition(|entry| entry.token == token);
                    slot.observers = kept;
                    removed
                }
                Err(_) => Vec::new()
            }
        };
        drop(removed);
    }

    fn set_value(
        &self, unit: UnitHandle, id: ParameterId, value: f32, originator: Option<ObserverToken>
    ) -> EngineResult<()> {
        let observers: Vec<ParameterObserver> = {
            let mut state = self.lock();
            let slot = state.units.get_mut(unit)?;
            slot.values.insert(id, value);
            slot.observers.iter()
                .filter(|entry| entry.id == id && Some(entry.token) != originator)
                .map(|entry| entry.observer.clone())
                .collect()
        };
        for observer in observers {
            observer(id, value);
        }
        Ok(())
    }
}

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, warn};

use super::{NodeState, Voice};
use crate::engine::{AudioEngine, EngineResult, ObserverRegistration, UnitHandle};
use crate::error::{NodeError, NodeResult};
use crate::noise::{WhiteNoiseUnit, WHITE_NOISE, WHITE_NOISE_NAME};
use crate::parameter::{ParameterBridge, ParameterId};

pub const DEFAULT_AMPLITUDE: f32 = 1.0;

/// Seconds a parameter change takes to fully apply
pub const DEFAULT_INERTIA: f32 = 0.0002;

#[derive(Debug, Clone, PartialEq)]
enum Attachment {
    Pending,
    Attached(UnitHandle),
    Failed(NodeError)
}

/// State shared between a node and its pending instantiation
struct NodeShared {
    engine: Arc<dyn AudioEngine>,
    amplitude: ParameterBridge,
    attachment: Mutex<Attachment>
}

impl NodeShared {
    fn attachment(&self) -> MutexGuard<Attachment> {
        self.attachment.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn unit(&self) -> Option<UnitHandle> {
        match *self.attachment() {
            Attachment::Attached(unit) => Some(unit),
            _ => None
        }
    }

    /// The unit to drive, or why there is none
    fn attached_unit(&self) -> NodeResult<UnitHandle> {
        match &*self.attachment() {
            Attachment::Attached(unit) => Ok(*unit),
            Attachment::Pending => Err(NodeError::NotAttached),
            Attachment::Failed(err) => Err(err.clone())
        }
    }

    /// Wires a freshly instantiated unit to this node
    fn connect(&self, unit: UnitHandle) -> EngineResult<()> {
        self.engine.attach(unit)?;
        self.engine.bind_parameter(unit, ParameterId::Amplitude, self.amplitude.ramp())?;
        let registration = ObserverRegistration::register(
            self.engine.clone(), unit, ParameterId::Amplitude, self.amplitude.observer()
        )?;
        let token = registration.token();
        self.amplitude.set_observer_registration(registration);

        // The host tree starts out with whatever was written while the unit was being created
        self.engine.set_value(unit, ParameterId::Amplitude, self.amplitude.target(), Some(token))
    }

    fn complete_instantiation(&self, result: EngineResult<UnitHandle>) {
        let outcome = result.and_then(|unit| match self.connect(unit) {
            Ok(()) => Ok(unit),
            Err(err) => {
                self.amplitude.teardown();
                self.engine.detach(unit);
                Err(err)
            }
        });
        let attachment = match outcome {
            Ok(unit) => {
                debug!(?unit, "noise node attached");
                Attachment::Attached(unit)
            }
            Err(err) => {
                warn!(%err, "noise node could not be attached");
                Attachment::Failed(NodeError::InstantiationFailed(err.to_string()))
            }
        };
        *self.attachment() = attachment;
    }
}

impl Drop for NodeShared {
    fn drop(&mut self) {
        self.amplitude.teardown();
        let attachment = self.attachment.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Attachment::Attached(unit) = *attachment {
            debug!(?unit, "noise node destroyed, detaching unit");
            self.engine.detach(unit);
        }
    }
}

/// White noise generator.
///
/// Amplitude and inertia read like plain properties. Writes go through a `ParameterBridge` so the
/// render context picks them up at the next block without either side blocking. The node asks the
/// engine for its processing unit on construction and becomes usable for `start`/`stop` once the
/// engine reports the unit ready; parameter writes made before that are kept.
pub struct NoiseNode {
    shared: Arc<NodeShared>
}

impl NoiseNode {
    /// Creates a node and requests its unit from `engine`.
    ///
    /// `amplitude` must lie in [0, 1].
    pub fn new(engine: Arc<dyn AudioEngine>, amplitude: f32) -> NodeResult<Self> {
        check_range(ParameterId::Amplitude, amplitude)?;
        Ok(Self::spawn(engine, amplitude, DEFAULT_INERTIA))
    }

    /// Creates a node at full amplitude
    pub fn with_defaults(engine: Arc<dyn AudioEngine>) -> Self {
        Self::spawn(engine, DEFAULT_AMPLITUDE, DEFAULT_INERTIA)
    }

    fn spawn(engine: Arc<dyn AudioEngine>, amplitude: f32, inertia: f32) -> Self {
        engine.register_generator_type(WHITE_NOISE, WHITE_NOISE_NAME, WhiteNoiseUnit::create);

        let shared = Arc::new(NodeShared {
            engine: engine.clone(),
            amplitude: ParameterBridge::new(ParameterId::Amplitude, amplitude, inertia),
            attachment: Mutex::new(Attachment::Pending)
        });

        let node = Arc::downgrade(&shared);
        let weak_engine = Arc::downgrade(&engine);
        engine.instantiate(WHITE_NOISE, Box::new(move |result: EngineResult<UnitHandle>| {
            Self::on_instantiated(node, weak_engine, result);
        }));

        debug!(amplitude, inertia, "noise node created");
        Self { shared }
    }

    fn on_instantiated(
        node: Weak<NodeShared>, engine: Weak<dyn AudioEngine>, result: EngineResult<UnitHandle>
    ) {
        match node.upgrade() {
            Some(shared) => shared.complete_instantiation(result),
            None => {
                // Nobody is left to own the unit
                if let (Ok(unit), Some(engine)) = (result, engine.upgrade()) {
                    warn!(?unit, "noise node dropped before its unit was ready");
                    engine.detach(unit);
                }
            }
        }
    }

    /// Amplitude the node is heading toward, in [0, 1]
    pub fn amplitude(&self) -> f32 {
        self.shared.amplitude.target()
    }

    /// Sets the amplitude. Values outside [0, 1] are rejected, unchanged values are ignored.
    ///
    /// The render path always picks up the new value. An error after that means the engine's
    /// parameter tree could not be told, e.g. because the host removed the unit.
    pub fn set_amplitude(&self, amplitude: f32) -> NodeResult<()> {
        check_range(ParameterId::Amplitude, amplitude)?;
        let bridge = &self.shared.amplitude;
        if bridge.target() == amplitude {
            return Ok(());
        }
        bridge.set_target(amplitude);

        // Let other observers of the host's parameter tree know, without echoing back to us
        if let Some(unit) = self.shared.unit() {
            let originator = bridge.observer_token();
            if let Err(err) = self.shared.engine.set_value(unit, ParameterId::Amplitude, amplitude, originator) {
                warn!(%err, "could not publish amplitude to engine");
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Amplitude in effect at the last rendered block
    pub fn current_amplitude(&self) -> f32 {
        self.shared.amplitude.current_value()
    }

    /// Seconds a parameter change takes to fully apply
    pub fn inertia(&self) -> f32 {
        self.shared.amplitude.inertia()
    }

    /// Changes the inertia. Takes effect on the next rendered block
    pub fn set_inertia(&self, seconds: f32) -> NodeResult<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(NodeError::InvalidParameterRange { parameter: "inertia", value: seconds });
        }
        if self.inertia() != seconds {
            debug!(inertia = seconds, "noise node inertia changed");
            self.shared.amplitude.set_inertia(seconds);
        }
        Ok(())
    }

    pub fn state(&self) -> NodeState {
        match self.shared.unit() {
            Some(_) if self.is_started() => NodeState::Started,
            Some(_) => NodeState::Stopped,
            None => NodeState::Unattached
        }
    }

    pub fn is_attached(&self) -> bool {
        self.shared.unit().is_some()
    }

    /// Handle of the engine unit backing the node, once attached
    pub fn unit(&self) -> Option<UnitHandle> {
        self.shared.unit()
    }

    /// The reason the engine could not provide a unit, if it failed. `start` and `stop` report
    /// the same error
    pub fn attachment_error(&self) -> Option<NodeError> {
        match &*self.shared.attachment() {
            Attachment::Failed(err) => Some(err.clone()),
            _ => None
        }
    }

    pub fn amplitude_bridge(&self) -> &ParameterBridge {
        &self.shared.amplitude
    }

    /// Fails with `NotAttached` while the unit is still being created, and with
    /// `InstantiationFailed` once the engine has refused it
    pub fn start(&self) -> NodeResult<()> {
        let unit = self.shared.attached_unit()?;
        self.shared.engine.start(unit)?;
        debug!(?unit, "noise node started");
        Ok(())
    }

    pub fn stop(&self) -> NodeResult<()> {
        let unit = self.shared.attached_unit()?;
        self.shared.engine.stop(unit)?;
        debug!(?unit, "noise node stopped");
        Ok(())
    }

    /// Asks the engine, since the host may stop the unit on its own
    pub fn is_started(&self) -> bool {
        match self.shared.unit() {
            Some(unit) => self.shared.engine.is_running(unit),
            None => false
        }
    }

    /// Creates an independent node with the same amplitude and the default inertia
    pub fn duplicate(&self) -> NoiseNode {
        let amplitude = self.amplitude();
        debug!(amplitude, "duplicating noise node");
        Self::spawn(self.shared.engine.clone(), amplitude, DEFAULT_INERTIA)
    }
}

impl Voice for NoiseNode {
    fn start(&self) -> NodeResult<()> {
        NoiseNode::start(self)
    }

    fn stop(&self) -> NodeResult<()> {
        NoiseNode::stop(self)
    }

    fn is_started(&self) -> bool {
        NoiseNode::is_started(self)
    }

    fn duplicate(&self) -> Box<dyn Voice> {
        Box::new(NoiseNode::duplicate(self))
    }
}

impl std::fmt::Debug for NoiseNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseNode")
            .field("amplitude", &self.shared.amplitude)
            .field("attachment", &*self.shared.attachment())
            .finish()
    }
}

fn check_range(parameter: ParameterId, value: f32) -> NodeResult<()> {
    if parameter.accepts(value) {
        Ok(())
    }
    else {
        Err(NodeError::InvalidParameterRange { parameter: parameter.name(), value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineConfig, OfflineEngine};
    use crate::util::float_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn new_engine() -> Arc<OfflineEngine> {
        Arc::new(OfflineEngine::new(EngineConfig::default()))
    }

    fn attached_node(engine: &Arc<OfflineEngine>, amplitude: f32) -> NoiseNode {
        let node = NoiseNode::new(engine.clone(), amplitude).unwrap();
        engine.resolve_pending();
        assert!(node.is_attached());
        node
    }

    #[test]
    fn test_lifecycle_scenario() {
        let engine = new_engine();
        let node = NoiseNode::new(engine.clone(), 0.5).unwrap();
        assert_eq!(node.state(), NodeState::Unattached);
        assert!(!node.is_started());
        assert_eq!(node.start(), Err(NodeError::NotAttached));
        assert_eq!(node.stop(), Err(NodeError::NotAttached));

        engine.resolve_pending();
        assert_eq!(node.state(), NodeState::Stopped);
        node.start().unwrap();
        assert!(node.is_started());
        assert_eq!(node.state(), NodeState::Started);
        node.stop().unwrap();
        assert!(!node.is_started());
        assert_eq!(node.state(), NodeState::Stopped);
    }

    #[test]
    fn test_amplitude_ramps_to_zero() {
        let engine = new_engine();
        let node = attached_node(&engine, 1.0);
        assert_eq!(node.inertia(), DEFAULT_INERTIA);
        node.start().unwrap();

        node.set_amplitude(0.0).unwrap();
        assert_eq!(node.amplitude(), 0.0);
        // 4 blocks of 64 frames at 44.1kHz are far longer than 5 * inertia
        for _ in 0..4 {
            engine.render_frames(64);
        }
        assert!(float_eq(node.current_amplitude(), 0.0, 0.000_001));
        let output = engine.render_frames(64);
        assert!(output.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_writes_before_attach_are_kept() {
        let engine = new_engine();
        let node = NoiseNode::new(engine.clone(), 1.0).unwrap();
        node.set_inertia(0.0).unwrap();
        node.set_amplitude(0.25).unwrap();
        engine.resolve_pending();
        node.start().unwrap();
        engine.render_frames(16);
        assert_eq!(node.current_amplitude(), 0.25);
    }

    #[test]
    fn test_out_of_range_amplitude_rejected() {
        let engine = new_engine();
        let err = NoiseNode::new(engine.clone(), 1.5).unwrap_err();
        assert_eq!(err, NodeError::InvalidParameterRange { parameter: "amplitude", value: 1.5 });
        assert_eq!(engine.pending_count(), 0);

        let node = NoiseNode::new(engine.clone(), 0.5).unwrap();
        assert!(node.set_amplitude(-0.1).is_err());
        assert!(node.set_amplitude(f32::NAN).is_err());
        assert_eq!(node.amplitude(), 0.5);
    }

    #[test]
    fn test_negative_inertia_rejected() {
        let engine = new_engine();
        let node = NoiseNode::with_defaults(engine.clone());
        assert_eq!(node.amplitude(), DEFAULT_AMPLITUDE);
        assert!(node.set_inertia(-1.0).is_err());
        assert!(node.set_inertia(f32::INFINITY).is_err());
        assert_eq!(node.inertia(), DEFAULT_INERTIA);
        node.set_inertia(0.01).unwrap();
        assert_eq!(node.inertia(), 0.01);
    }

    #[test]
    fn test_unchanged_amplitude_is_not_republished() {
        let engine = new_engine();
        let node = attached_node(&engine, 0.5);
        let unit = node.unit().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        engine.register_observer(unit, ParameterId::Amplitude, Arc::new(move |_: ParameterId, _: f32| {
            counter.fetch_add(1, Ordering::SeqCst);
        })).unwrap();

        node.set_amplitude(0.5).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        node.set_amplitude(0.75).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // The node's own observer is the originator and is not echoed
        assert_eq!(node.amplitude(), 0.75);
    }

    #[test]
    fn test_host_automation_updates_node() {
        let engine = new_engine();
        let node = attached_node(&engine, 1.0);
        let unit = node.unit().unwrap();
        engine.set_value(unit, ParameterId::Amplitude, 0.3, None).unwrap();
        assert_eq!(node.amplitude(), 0.3);
        assert_eq!(node.current_amplitude(), 0.3);
    }

    #[test]
    fn test_duplicate_is_independent() {
        let engine = new_engine();
        let node = attached_node(&engine, 0.4);
        node.set_inertia(0.5).unwrap();

        let copy = node.duplicate();
        assert_eq!(copy.amplitude(), 0.4);
        assert_eq!(copy.inertia(), DEFAULT_INERTIA);
        assert!(!copy.is_attached());
        engine.resolve_pending();
        assert!(copy.is_attached());
        assert_ne!(copy.unit(), node.unit());

        copy.set_amplitude(0.9).unwrap();
        assert_eq!(node.amplitude(), 0.4);
        node.set_amplitude(0.1).unwrap();
        assert_eq!(copy.amplitude(), 0.9);

        copy.start().unwrap();
        assert!(copy.is_started());
        assert!(!node.is_started());
    }

    #[test]
    fn test_voices_duplicate_through_trait() {
        let engine = new_engine();
        let voice: Box<dyn Voice> = Box::new(attached_node(&engine, 0.5));
        let voices: Vec<Box<dyn Voice>> = (0..3).map(|_| voice.duplicate()).collect();
        engine.resolve_pending();
        for voice in voices.iter() {
            voice.start().unwrap();
            assert!(voice.is_started());
        }
        assert!(!voice.is_started());
        assert_eq!(engine.unit_count(), 4);
    }

    #[test]
    fn test_instantiation_failure_leaves_node_unattached() {
        let engine = Arc::new(OfflineEngine::new(EngineConfig::default().with_max_units(1)));
        let first = attached_node(&engine, 1.0);
        let second = first.duplicate();
        engine.resolve_pending();

        assert_eq!(second.state(), NodeState::Unattached);
        match second.attachment_error() {
            Some(NodeError::InstantiationFailed(_)) => {}
            other => panic!("Unexpected attachment result {:?}", other)
        }
        assert!(first.attachment_error().is_none());
    }

    #[test]
    fn test_start_after_refused_instantiation_reports_failure() {
        let engine = Arc::new(OfflineEngine::new(EngineConfig::default().with_max_units(0)));
        let node = NoiseNode::new(engine.clone(), 0.5).unwrap();
        assert_eq!(node.start(), Err(NodeError::NotAttached));

        engine.resolve_pending();
        let expected = node.attachment_error().unwrap();
        match &expected {
            NodeError::InstantiationFailed(msg) => assert!(msg.contains("capacity")),
            other => panic!("Unexpected attachment error {:?}", other)
        }
        assert_eq!(node.start(), Err(expected.clone()));
        assert_eq!(node.stop(), Err(expected));
        assert!(!node.is_started());
    }

    #[test]
    fn test_amplitude_written_before_attach_reaches_host_tree() {
        let engine = new_engine();
        let node = NoiseNode::new(engine.clone(), 1.0).unwrap();
        node.set_amplitude(0.25).unwrap();
        engine.resolve_pending();
        let unit = node.unit().unwrap();
        assert_eq!(engine.parameter_value(unit, ParameterId::Amplitude), Some(0.25));

        node.set_amplitude(0.75).unwrap();
        assert_eq!(engine.parameter_value(unit, ParameterId::Amplitude), Some(0.75));
    }

    #[test]
    fn test_amplitude_publish_failure_is_reported() {
        let engine = new_engine();
        let node = attached_node(&engine, 1.0);
        let unit = node.unit().unwrap();
        // The host drops the unit behind the node's back
        engine.detach(unit);

        assert_eq!(node.set_amplitude(0.5), Err(NodeError::NotAttached));
        // The render side still sees the write
        assert_eq!(node.amplitude(), 0.5);
    }

    #[test]
    fn test_out_of_band_stop_is_visible() {
        let engine = new_engine();
        let node = attached_node(&engine, 1.0);
        node.start().unwrap();
        engine.stop(node.unit().unwrap()).unwrap();
        assert!(!node.is_started());
    }

    #[test]
    fn test_drop_detaches_and_deregisters() {
        let engine = new_engine();
        let node = attached_node(&engine, 1.0);
        let unit = node.unit().unwrap();
        assert!(node.amplitude_bridge().observer_registered());
        assert_eq!(engine.observer_count(unit), 1);

        drop(node);
        assert_eq!(engine.unit_count(), 0);
        assert!(!engine.is_attached(unit));
    }

    #[test]
    fn test_drop_before_attach_releases_unit() {
        let engine = new_engine();
        let node = NoiseNode::new(engine.clone(), 1.0).unwrap();
        drop(node);
        assert_eq!(engine.resolve_pending(), 1);
        assert_eq!(engine.unit_count(), 0);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let engine = new_engine();
        let node = attached_node(&engine, 1.0);
        let unit = node.unit().unwrap();
        node.amplitude_bridge().teardown();
        node.amplitude_bridge().teardown();
        assert!(!node.amplitude_bridge().observer_registered());
        assert_eq!(engine.observer_count(unit), 0);
    }
}

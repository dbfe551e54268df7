use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::ParameterState;

/// Render end of a `ParameterBridge`.
///
/// Owned by exactly one processing unit. `advance` is called once per block and moves the value
/// linearly toward the latest target so that it arrives `inertia` seconds after the target was set.
/// It never blocks or allocates.
#[derive(Debug)]
pub struct ParameterRamp {
    state: Arc<ParameterState>,
    seen_generation: u32,
    value: f32,
    goal: f32,
    /// Change in value per second of rendered audio while ramping
    slope: f32,
    /// Seconds left until `value` reaches `goal`
    remaining: f32
}

impl ParameterRamp {
    pub(crate) fn new(state: Arc<ParameterState>) -> Self {
        let seen_generation = state.generation.load(Ordering::Acquire);
        let value = state.current.get();
        let goal = state.target.get();
        let mut ramp = Self { state, seen_generation, value, goal: value, slope: 0.0, remaining: 0.0 };
        let inertia = ramp.state.inertia.get();
        ramp.retarget(goal, inertia);
        ramp
    }

    /// Moves the ramp forward by one block and returns the value to use for that block
    pub fn advance(&mut self, block_duration: f32) -> f32 {
        let generation = self.state.generation.load(Ordering::Acquire);
        if generation != self.seen_generation {
            self.seen_generation = generation;
            if self.state.snap.swap(false, Ordering::Relaxed) {
                let external = self.state.external.get();
                self.jump_to(external);
            }
            let target = self.state.target.get();
            let inertia = self.state.inertia.get();
            self.retarget(target, inertia);
        }

        if self.remaining > 0.0 && block_duration > 0.0 {
            if block_duration >= self.remaining {
                self.value = self.goal;
                self.remaining = 0.0;
            }
            else {
                self.value += self.slope * block_duration;
                self.remaining -= block_duration;
                // Rounding must never carry the value past the goal
                self.value = if self.slope > 0.0 {
                    self.value.min(self.goal)
                }
                else {
                    self.value.max(self.goal)
                };
            }
        }

        self.state.current.set(self.value);
        self.value
    }

    /// The value returned by the last `advance`
    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining > 0.0
    }

    fn retarget(&mut self, goal: f32, inertia: f32) {
        if !(inertia > 0.0) || !inertia.is_finite() || self.value == goal {
            self.jump_to(goal);
            return;
        }
        self.goal = goal;
        self.slope = (goal - self.value) / inertia;
        self.remaining = inertia;
    }

    fn jump_to(&mut self, value: f32) {
        self.value = value;
        self.goal = value;
        self.slope = 0.0;
        self.remaining = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use crate::parameter::{ParameterBridge, ParameterId};
    use crate::util::float_eq;

    const BLOCK: f32 = 64.0 / 44_100.0;
    const EPSILON: f32 = 0.000_001;

    fn run_blocks(ramp: &mut super::ParameterRamp, n_blocks: usize, block: f32) -> Vec<f32> {
        (0..n_blocks).map(|_| ramp.advance(block)).collect()
    }

    #[test]
    fn test_zero_inertia_jumps_on_next_advance() {
        let bridge = ParameterBridge::new(ParameterId::Amplitude, 1.0, 0.0);
        let mut ramp = bridge.ramp();
        bridge.set_target(0.3);
        assert_eq!(ramp.advance(BLOCK), 0.3);
        assert!(!ramp.is_ramping());
    }

    #[test]
    fn test_converges_to_last_target() {
        let bridge = ParameterBridge::new(ParameterId::Amplitude, 0.0, 0.01);
        let mut ramp = bridge.ramp();
        for target in [0.9_f32, 0.1, 0.75, 0.2, 0.6].iter() {
            bridge.set_target(*target);
            ramp.advance(BLOCK);
        }
        run_blocks(&mut ramp, 1000, BLOCK);
        assert!(float_eq(ramp.value(), 0.6, EPSILON));
        assert!(float_eq(bridge.current_value(), 0.6, EPSILON));
    }

    #[test]
    fn test_no_overshoot_rising() {
        let bridge = ParameterBridge::new(ParameterId::Amplitude, 0.0, 0.005);
        let mut ramp = bridge.ramp();
        bridge.set_target(1.0);
        let values = run_blocks(&mut ramp, 200, BLOCK);
        for pair in values.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert!(values.iter().all(|v| *v <= 1.0));
        assert_eq!(*values.last().unwrap(), 1.0);
    }

    #[test]
    fn test_no_overshoot_falling() {
        let bridge = ParameterBridge::new(ParameterId::Amplitude, 1.0, 0.005);
        let mut ramp = bridge.ramp();
        bridge.set_target(0.25);
        let values = run_blocks(&mut ramp, 200, BLOCK);
        for pair in values.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
        assert!(values.iter().all(|v| *v >= 0.25));
        assert_eq!(*values.last().unwrap(), 0.25);
    }

    #[test]
    fn test_reaches_target_after_inertia_elapsed() {
        let inertia = 0.0002;
        let bridge = ParameterBridge::new(ParameterId::Amplitude, 1.0, inertia);
        let mut ramp = bridge.ramp();
        bridge.set_target(0.0);

        // 5 * inertia split into small blocks
        let block = inertia / 4.0;
        let values = run_blocks(&mut ramp, 20, block);
        assert!(values[0] > 0.0 && values[0] < 1.0);
        assert!(float_eq(*values.last().unwrap(), 0.0, EPSILON));
    }

    #[test]
    fn test_retarget_starts_from_current_position() {
        let bridge = ParameterBridge::new(ParameterId::Amplitude, 0.0, 0.01);
        let mut ramp = bridge.ramp();
        bridge.set_target(1.0);
        let halfway = ramp.advance(0.005);
        assert!(float_eq(halfway, 0.5, 0.0001));

        bridge.set_target(0.0);
        let next = ramp.advance(0.005);
        assert!(next < halfway);
        assert!(float_eq(next, 0.25, 0.0001));
    }

    #[test]
    fn test_inertia_change_applies_on_next_block() {
        let bridge = ParameterBridge::new(ParameterId::Amplitude, 0.0, 1.0);
        let mut ramp = bridge.ramp();
        bridge.set_target(1.0);
        let slow = ramp.advance(0.01);
        assert!(slow < 0.02);

        bridge.set_inertia(0.0);
        assert_eq!(ramp.advance(0.01), 1.0);
    }

    #[test]
    fn test_degenerate_durations_hold_value() {
        let bridge = ParameterBridge::new(ParameterId::Amplitude, 0.0, 0.01);
        let mut ramp = bridge.ramp();
        bridge.set_target(1.0);
        assert_eq!(ramp.advance(0.0), 0.0);
        assert_eq!(ramp.advance(-1.0), 0.0);
        assert_eq!(ramp.advance(f32::NAN), 0.0);
        assert!(ramp.is_ramping());
    }

    #[test]
    fn test_external_change_snaps_without_ramp() {
        let bridge = ParameterBridge::new(ParameterId::Amplitude, 1.0, 0.5);
        let mut ramp = bridge.ramp();
        bridge.notify_external_change(0.4);
        assert_eq!(bridge.target(), 0.4);
        assert_eq!(bridge.current_value(), 0.4);
        assert_eq!(ramp.advance(BLOCK), 0.4);
        assert!(!ramp.is_ramping());
    }

    #[test]
    fn test_target_after_external_change_ramps_again() {
        let bridge = ParameterBridge::new(ParameterId::Amplitude, 1.0, 0.5);
        let mut ramp = bridge.ramp();
        bridge.notify_external_change(0.4);
        bridge.set_target(0.8);
        let value = ramp.advance(BLOCK);
        assert!(value > 0.4 && value < 0.41);
        assert!(ramp.is_ramping());
    }

    #[test]
    fn test_writes_before_ramp_exists_are_kept() {
        let bridge = ParameterBridge::new(ParameterId::Amplitude, 1.0, 0.0);
        bridge.set_target(0.2);
        bridge.set_target(0.7);
        let mut ramp = bridge.ramp();
        assert_eq!(ramp.advance(BLOCK), 0.7);
    }
}

use std::error::Error;
use std::sync::Arc;

use tracing::info;

use whitenoise::engine::{EngineConfig, OfflineEngine};
use whitenoise::NoiseNode;

const BLOCK_FRAMES: usize = 512;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    run()
}

/// Renders a few seconds of automated noise without an audio device and reports the peak level
#[cfg(not(feature = "cpal_output"))]
fn run() -> Result<(), Box<dyn Error>> {
    let engine = Arc::new(OfflineEngine::new(EngineConfig::default()));
    let node = NoiseNode::new(engine.clone(), 0.5)?;
    engine.resolve_pending();
    node.set_inertia(0.05)?;
    node.start()?;

    let blocks_per_second = engine.config().sample_rate as usize / BLOCK_FRAMES;
    for amplitude in [0.5_f32, 0.0, 1.0, 0.25].iter() {
        node.set_amplitude(*amplitude)?;
        let mut peak = 0_f32;
        for _ in 0..blocks_per_second {
            let block = engine.render_frames(BLOCK_FRAMES);
            peak = block.iter().fold(peak, |peak, sample| peak.max(sample.abs()));
        }
        info!(target_amplitude = *amplitude, peak, current = node.current_amplitude(), "rendered one second");
    }

    node.stop()?;
    info!(frames = engine.rendered_frames(), "done");
    Ok(())
}

/// Plays noise on the default output device, fading it down halfway through
#[cfg(feature = "cpal_output")]
fn run() -> Result<(), Box<dyn Error>> {
    use std::thread;
    use std::time::Duration;
    use whitenoise::output::AudioInterface;

    let mut audio_interface = AudioInterface::new()?;
    info!(device = %audio_interface.get_device_name(), "playing noise");

    let engine = Arc::new(OfflineEngine::new(audio_interface.engine_config()));
    let node = NoiseNode::new(engine.clone(), 0.2)?;
    engine.resolve_pending();
    node.set_inertia(0.5)?;
    node.start()?;
    audio_interface.play(engine.clone())?;

    thread::sleep(Duration::from_secs(2));
    node.set_amplitude(0.02)?;
    thread::sleep(Duration::from_secs(2));

    node.stop()?;
    audio_interface.pause()?;
    Ok(())
}

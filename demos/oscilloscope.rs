//! Oscilloscope example.
//!
//! Runs a software mixer on its own thread, feeds a sine into an analyzer
//! rack and prints trigger-aligned windows and levels.
//!
//! Run with: cargo run --example oscilloscope

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use audio_patchbay::{
    event_callback, software_mixer, AnalyzerRack, BusRegistry, FabricConfig, MeterUnit,
    MixerConfig, MockSource, OscilloscopeUnit, ProviderConfig, TriggerMode, WindowView,
};
use tracing_subscriber::EnvFilter;

const FRAMES_PER_BLOCK: u32 = 480;
const SAMPLE_RATE: u32 = 48000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let registry = BusRegistry::new(FabricConfig::default());
    registry.on_event(event_callback(|event| tracing::info!(?event, "fabric event")));

    let (mixer, mut renderer) = software_mixer(
        MixerConfig::default()
            .with_frames_per_block(FRAMES_PER_BLOCK)
            .with_sample_rate(SAMPLE_RATE)
            .with_channel_count(1),
    );
    registry.attach_device(mixer);

    let rack = AnalyzerRack::new(registry.clone(), 1);
    let scope = Arc::new(OscilloscopeUnit::new(
        "scope",
        ProviderConfig {
            time_window: Duration::from_millis(5),
            analysis_period: Duration::from_millis(50),
            trigger_mode: TriggerMode::RisingEdge,
            ..Default::default()
        },
    ));
    scope.on_view_generated(Arc::new(|view: &WindowView| {
        let peak = view.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        println!(
            "window @ frame {:>7}: {} frames, first {:+.3}, peak {:.3}",
            view.first_frame_index,
            view.frames(),
            view.samples.first().copied().unwrap_or_default(),
            peak
        );
    }));
    let meter = Arc::new(MeterUnit::new("level", Duration::from_millis(20)));
    rack.add_unit(scope.clone())?;
    rack.add_unit(meter.clone())?;
    rack.start_processing()?;

    // Stand-in for the device audio callback.
    let mut send = rack.send(FRAMES_PER_BLOCK * 4, 0.8);
    let running = Arc::new(AtomicBool::new(true));
    let render_running = running.clone();
    let render = std::thread::spawn(move || {
        let mut source = MockSource::new(SAMPLE_RATE, 1);
        let block = Duration::from_secs_f64(f64::from(FRAMES_PER_BLOCK) / f64::from(SAMPLE_RATE));
        while render_running.load(Ordering::Acquire) {
            if source.frames() < FRAMES_PER_BLOCK as usize {
                source.generate_sine(440.0, 0.9, 100);
            }
            send.push(&source.take_frames(FRAMES_PER_BLOCK as usize));
            renderer.process_block();
            std::thread::sleep(block);
        }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;

    if let Some(reading) = meter.reading() {
        println!(
            "level: peak {:.1} dBFS, rms {:.1} dBFS",
            reading.peak_db[0], reading.rms_db[0]
        );
    }

    running.store(false, Ordering::Release);
    render.join().map_err(|_| "render thread panicked")?;
    rack.destroy_analyzers();
    registry.pump();

    Ok(())
}

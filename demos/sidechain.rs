//! Sidechain example.
//!
//! A "ducker" keys off a drum bus instead of its own input. The drum bus is
//! a configured default bus. Midway through, the render device is detached
//! and replaced; the bus comes back with the new device and the key input
//! reconnects on its own.
//!
//! Run with: cargo run --example sidechain

use audio_patchbay::{
    event_callback, software_mixer, AudioBusAsset, BusKey, BusRegistry, DefaultBusEntry,
    FabricConfig, KeySource, KeySourceResolver, MixerConfig, MockSource,
};
use tracing_subscriber::EnvFilter;

const FRAMES: u32 = 256;

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let registry = BusRegistry::new(FabricConfig::default());
    registry.on_event(event_callback(|event| println!("event: {event:?}")));

    let config = MixerConfig::default()
        .with_frames_per_block(FRAMES)
        .with_channel_count(1);
    let (mixer, mut renderer) = software_mixer(config.clone());
    registry.attach_device(mixer);

    let drums = BusKey::from_object_id(1);
    registry.initialize(&vec![DefaultBusEntry {
        asset: AudioBusAsset {
            object_id: Some(1),
            channel_count: 1,
        },
        name: "Drums".into(),
    }]);

    let mut resolver = KeySourceResolver::new(registry.clone(), 1, FRAMES as usize);
    resolver.set_key_source(KeySource::Bus(drums));

    let mut kick = MockSource::new(48000, 1);
    let mut own = MockSource::new(48000, 1);
    let mut send = registry.add_patch_input(drums, FRAMES * 4, 1, 1.0);

    for block in 0..12 {
        if block == 6 {
            println!("-- swapping render device --");
            registry.detach_device();
            let (mixer, next) = software_mixer(config.clone());
            registry.attach_device(mixer);
            renderer = next;
            // The old send went stale with the old device
            send = registry.add_patch_input(drums, FRAMES * 4, 1, 1.0);
        }

        kick.generate_noise(10, if block % 2 == 0 { 0.8 } else { 0.1 });
        own.generate_sine(220.0, 0.3, 10);
        send.push(&kick.take_frames(FRAMES as usize));
        let own_input = own.take_frames(FRAMES as usize);

        let status = resolver.validate();
        renderer.process_block();
        let key = resolver.key_signal(&own_input, FRAMES as usize);
        println!("block {block:>2}: {status:?}, key rms {:.3}", rms(key));
    }

    registry.teardown();
}

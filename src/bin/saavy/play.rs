use std::sync::Arc;
use std::time::{Duration, Instant};

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use saavy_host::{BlockProcessor, BlockStatus, CompiledModule, EngineConfig};

const ARPEGGIO: [u8; 6] = [60, 64, 67, 72, 67, 64];
const STEP: Duration = Duration::from_millis(250);

pub fn run(module: Arc<CompiledModule>, config: EngineConfig, seconds: f32) -> EyreResult<()> {
    // Set up audio
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| eyre!("no default output device available"))?;
    let stream_config = device
        .default_output_config()
        .wrap_err("failed to fetch default output config")?;

    let channels = stream_config.channels() as usize;
    let mut config = config.with_sample_rate(stream_config.sample_rate().0);
    // Notes only sound through the voice manager.
    if config.voices == 0 {
        config = config.with_voices(8);
    }

    let (mut processor, mut handle) = BlockProcessor::new(&module, &config)?;

    println!("=== saavy ===");
    println!("Module: {} ({})", module.name(), module.fingerprint().short());
    println!("Sample rate: {} Hz", config.sample_rate);
    println!("Channels: {}", channels);
    println!("Voices: {}", processor.plan().polyphony().voices());
    println!("Effect: {}", if processor.has_effect() { "yes" } else { "no" });
    println!();

    // The device asks for arbitrary frame counts; render fixed blocks and drain them.
    let block_len = config.block_len;
    let no_inputs: [Vec<f32>; 0] = [];
    let mut block = vec![vec![0.0f32; block_len]; module.outputs()];
    let mut cursor = block_len;

    let stream = device.build_output_stream(
        &stream_config.into(),
        move |data: &mut [f32], _| {
            for frame in data.chunks_mut(channels) {
                if cursor == block_len {
                    if processor.process(&no_inputs, &mut block, std::iter::empty()) != BlockStatus::Rendered {
                        for channel in block.iter_mut() {
                            channel.fill(0.0);
                        }
                    }
                    cursor = 0;
                }
                for (ch, sample) in frame.iter_mut().enumerate() {
                    *sample = match block.len() {
                        0 => 0.0,
                        n => block[ch % n][cursor],
                    };
                }
                cursor += 1;
            }
        },
        |err| eprintln!("Audio error: {}", err),
        None,
    )?;

    stream.play()?;
    println!("Playing for {:.1}s...", seconds);

    let start = Instant::now();
    let mut played = 0usize;
    while start.elapsed().as_secs_f32() < seconds {
        let pitch = ARPEGGIO[played % ARPEGGIO.len()];
        handle.note_on(0, pitch, 100);
        handle.control_change(0, 74, (played * 16 % 128) as u8);
        std::thread::sleep(STEP);
        handle.note_off(0, pitch, 0);

        if let Some(level) = handle.get_parameter("/organ/level") {
            log::debug!(target: "saavy::play", "note {} level {:.3}", pitch, level);
        }
        played += 1;
    }

    handle.all_notes_off();
    std::thread::sleep(Duration::from_millis(400));
    handle.destroy();

    println!(
        "Played {} notes ({} events logged)",
        played,
        handle.event_log().next_seq()
    );
    Ok(())
}

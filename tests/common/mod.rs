//! Mock compiler, loader and kernels shared by the integration tests.
//!
//! Programs are named by the first `;`-separated token of their source:
//!
//! - `synth`: 0 in, 2 out voice with freq/gain/gate, a CC-bound cutoff and a level bargraph
//! - `amp`:   2 in, 2 out gain stage with a CC-bound gain, a pitch-wheel offset and a peak meter
//! - `crash`: 0 in, 1 out module that faults on its third block
//!
//! A source containing `effect = volume` also yields an effect companion.

#![allow(dead_code)]

use std::cell::RefCell;
use std::sync::Arc;

use saavy_host::cache::{CompileRequest, Compiler, CompilerOutput, Loader, ModuleCache, EFFECT_CLASS_NAME};
use saavy_host::memory::{Arena, Fault};
use saavy_host::module::{Kernel, MemoryMode};
use saavy_host::CompiledModule;

pub const SYNTH: &str = "synth; effect = volume;";
pub const SYNTH_DRY: &str = "synth;";
pub const AMP: &str = "amp;";
pub const CRASH: &str = "crash;";

const SYNTH_METADATA: &str = r#"{
    "name": "synth", "size": 28, "inputs": 0, "outputs": 2,
    "ui": [{ "type": "vgroup", "label": "synth", "items": [
        { "type": "hslider", "label": "freq", "address": "/synth/freq", "index": 0,
          "init": 440, "min": 20, "max": 2000, "step": 1 },
        { "type": "hslider", "label": "gain", "address": "/synth/gain", "index": 4,
          "init": 0.5, "min": 0, "max": 1, "step": 0.01 },
        { "type": "button", "label": "gate", "address": "/synth/gate", "index": 8 },
        { "type": "hslider", "label": "cutoff", "address": "/synth/cutoff", "index": 12,
          "init": 1, "min": 0, "max": 1, "step": 0.01, "meta": [{ "midi": "ctrl 74" }] },
        { "type": "vbargraph", "label": "level", "address": "/synth/level", "index": 16,
          "min": 0, "max": 1 }
    ]}]
}"#;

const AMP_METADATA: &str = r#"{
    "name": "amp", "size": 16, "inputs": 2, "outputs": 2,
    "ui": [{ "type": "hgroup", "label": "amp", "items": [
        { "type": "hslider", "label": "gain", "address": "/amp/gain", "index": 0,
          "init": 1, "min": 0, "max": 2, "step": 0.01, "meta": [{ "midi": "ctrl 7" }] },
        { "type": "hslider", "label": "offset", "address": "/amp/offset", "index": 4,
          "init": 0, "min": -1, "max": 1, "step": 0.01, "meta": [{ "midi": "pitchwheel" }] },
        { "type": "button", "label": "gate", "address": "/amp/gate", "index": 8 },
        { "type": "hbargraph", "label": "peak", "address": "/amp/peak", "index": 12,
          "min": 0, "max": 4 }
    ]}]
}"#;

const CRASH_METADATA: &str = r#"{
    "name": "crash", "size": 4, "inputs": 0, "outputs": 1, "ui": []
}"#;

const VOLUME_METADATA: &str = r#"{
    "name": "effect", "size": 4, "inputs": 2, "outputs": 2,
    "ui": [{ "type": "vgroup", "label": "effect", "items": [
        { "type": "hslider", "label": "volume", "address": "/effect/volume", "index": 0,
          "init": 1, "min": 0, "max": 1, "step": 0.01, "meta": [{ "midi": "ctrl 11" }] }
    ]}]
}"#;

/// Records every invocation so tests can count compiles.
#[derive(Default)]
pub struct MockCompiler {
    pub calls: RefCell<Vec<String>>,
}

impl MockCompiler {
    pub fn calls_for(&self, name: &str) -> usize {
        self.calls.borrow().iter().filter(|n| *n == name).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Compiler for MockCompiler {
    fn compile(
        &self,
        name: &str,
        source: &str,
        _args: &[String],
        _memory_mode: MemoryMode,
    ) -> Result<CompilerOutput, String> {
        self.calls.borrow_mut().push(name.to_string());

        let output = |binary: &str, metadata: &str| CompilerOutput {
            binary: binary.as_bytes().to_vec(),
            metadata: metadata.to_string(),
        };

        if name == EFFECT_CLASS_NAME {
            return if source.contains("effect = volume") {
                Ok(output("volume", VOLUME_METADATA))
            } else {
                Err("undefined symbol: effect".to_string())
            };
        }

        match source.split(';').next().map(str::trim) {
            Some("synth") => Ok(output("synth", SYNTH_METADATA)),
            Some("amp") => Ok(output("amp", AMP_METADATA)),
            Some("crash") => Ok(output("crash", CRASH_METADATA)),
            other => Err(format!("unknown program {:?}", other)),
        }
    }
}

pub struct MockLoader;

impl Loader for MockLoader {
    fn load(&self, binary: &[u8]) -> Result<Arc<dyn Kernel>, String> {
        match binary {
            b"synth" => Ok(Arc::new(Synth { outputs: 2 })),
            b"amp" => Ok(Arc::new(Amp { channels: 2 })),
            b"crash" => Ok(Arc::new(Crash)),
            b"volume" => Ok(Arc::new(Volume { channels: 2 })),
            _ => Err("unknown binary".to_string()),
        }
    }
}

pub fn cache() -> ModuleCache<MockCompiler, MockLoader> {
    ModuleCache::new(MockCompiler::default(), MockLoader)
}

/// Compile `source` through a fresh cache.
pub fn module(source: &str) -> Arc<CompiledModule> {
    let name = source.split(';').next().unwrap_or_default().trim();
    cache()
        .get_or_compile(&CompileRequest::new(name, source))
        .expect("mock program compiles")
}

fn channel_ptr(mem: &Arena, table: usize, channel: usize) -> Result<usize, Fault> {
    mem.load_ptr(table + channel * mem.ptr_width().bytes())
}

/// Sawtooth voice. Level jumps to 1 while the gate is high and halves every block after.
pub struct Synth {
    outputs: usize,
}

impl Synth {
    pub const FREQ: usize = 0;
    pub const GAIN: usize = 4;
    pub const GATE: usize = 8;
    pub const CUTOFF: usize = 12;
    pub const LEVEL: usize = 16;
    pub const PHASE: usize = 20;
    pub const SAMPLE_RATE: usize = 24;
}

impl Kernel for Synth {
    fn init(&self, mem: &mut Arena, dsp: usize, sample_rate: u32) -> Result<(), Fault> {
        mem.store_f32(dsp + Self::FREQ, 440.0)?;
        mem.store_f32(dsp + Self::GAIN, 0.5)?;
        mem.store_f32(dsp + Self::GATE, 0.0)?;
        mem.store_f32(dsp + Self::CUTOFF, 1.0)?;
        mem.store_f32(dsp + Self::SAMPLE_RATE, sample_rate as f32)?;
        self.instance_clear(mem, dsp)
    }

    fn instance_clear(&self, mem: &mut Arena, dsp: usize) -> Result<(), Fault> {
        mem.store_f32(dsp + Self::LEVEL, 0.0)?;
        mem.store_f32(dsp + Self::PHASE, 0.0)
    }

    fn compute(
        &self,
        mem: &mut Arena,
        dsp: usize,
        count: usize,
        _inputs: usize,
        outputs: usize,
    ) -> Result<(), Fault> {
        let sr = mem.load_f32(dsp + Self::SAMPLE_RATE)?;
        let freq = mem.load_f32(dsp + Self::FREQ)?;
        let amp = mem.load_f32(dsp + Self::GAIN)? * mem.load_f32(dsp + Self::CUTOFF)?;
        let level = if mem.load_f32(dsp + Self::GATE)? > 0.0 {
            1.0
        } else {
            mem.load_f32(dsp + Self::LEVEL)? * 0.5
        };
        let start = mem.load_f32(dsp + Self::PHASE)?;

        let mut end = start;
        for ch in 0..self.outputs {
            let out = channel_ptr(mem, outputs, ch)?;
            let mut phase = start;
            for i in 0..count {
                phase = (phase + freq / sr).fract();
                mem.store_f32(out + i * 4, (2.0 * phase - 1.0) * amp * level)?;
            }
            end = phase;
        }

        mem.store_f32(dsp + Self::LEVEL, level)?;
        mem.store_f32(dsp + Self::PHASE, end)
    }
}

/// `out = in * gain + offset`, with the block peak written to a bargraph.
pub struct Amp {
    channels: usize,
}

impl Kernel for Amp {
    fn init(&self, mem: &mut Arena, dsp: usize, _sample_rate: u32) -> Result<(), Fault> {
        mem.store_f32(dsp, 1.0)?;
        mem.store_f32(dsp + 4, 0.0)?;
        mem.store_f32(dsp + 8, 0.0)?;
        mem.store_f32(dsp + 12, 0.0)
    }

    fn instance_clear(&self, mem: &mut Arena, dsp: usize) -> Result<(), Fault> {
        mem.store_f32(dsp + 12, 0.0)
    }

    fn compute(
        &self,
        mem: &mut Arena,
        dsp: usize,
        count: usize,
        inputs: usize,
        outputs: usize,
    ) -> Result<(), Fault> {
        let gain = mem.load_f32(dsp)?;
        let offset = mem.load_f32(dsp + 4)?;
        let mut peak = 0.0f32;

        for ch in 0..self.channels {
            let (src, dst) = (channel_ptr(mem, inputs, ch)?, channel_ptr(mem, outputs, ch)?);
            for i in 0..count {
                let y = mem.load_f32(src + i * 4)? * gain + offset;
                peak = peak.max(y.abs());
                mem.store_f32(dst + i * 4, y)?;
            }
        }
        mem.store_f32(dsp + 12, peak)
    }
}

/// In-place volume stage run on the mixed voices.
pub struct Volume {
    channels: usize,
}

impl Kernel for Volume {
    fn init(&self, mem: &mut Arena, dsp: usize, _sample_rate: u32) -> Result<(), Fault> {
        mem.store_f32(dsp, 1.0)
    }

    fn instance_clear(&self, _mem: &mut Arena, _dsp: usize) -> Result<(), Fault> {
        Ok(())
    }

    fn compute(
        &self,
        mem: &mut Arena,
        dsp: usize,
        count: usize,
        inputs: usize,
        outputs: usize,
    ) -> Result<(), Fault> {
        let volume = mem.load_f32(dsp)?;
        for ch in 0..self.channels {
            let (src, dst) = (channel_ptr(mem, inputs, ch)?, channel_ptr(mem, outputs, ch)?);
            for i in 0..count {
                let x = mem.load_f32(src + i * 4)?;
                mem.store_f32(dst + i * 4, x * volume)?;
            }
        }
        Ok(())
    }
}

/// Writes silence twice, then writes past the end of the arena.
pub struct Crash;

impl Kernel for Crash {
    fn init(&self, mem: &mut Arena, dsp: usize, _sample_rate: u32) -> Result<(), Fault> {
        mem.store_u32(dsp, 0)
    }

    fn instance_clear(&self, _mem: &mut Arena, _dsp: usize) -> Result<(), Fault> {
        Ok(())
    }

    fn compute(
        &self,
        mem: &mut Arena,
        dsp: usize,
        count: usize,
        _inputs: usize,
        outputs: usize,
    ) -> Result<(), Fault> {
        let calls = mem.load_u32(dsp)? + 1;
        mem.store_u32(dsp, calls)?;
        if calls == 3 {
            return mem.store_f32(mem.len(), 1.0);
        }

        let out = channel_ptr(mem, outputs, 0)?;
        for i in 0..count {
            mem.store_f32(out + i * 4, 0.0)?;
        }
        Ok(())
    }
}

/// Input blocks holding a deterministic ramp per channel.
pub fn ramp(channels: usize, frames: usize) -> Vec<Vec<f32>> {
    (0..channels)
        .map(|ch| {
            (0..frames)
                .map(|i| (i as f32 / frames as f32) - 0.5 * ch as f32)
                .collect()
        })
        .collect()
}

pub fn silence(channels: usize, frames: usize) -> Vec<Vec<f32>> {
    vec![vec![0.0; frames]; channels]
}

pub fn no_automation() -> std::iter::Empty<(&'static str, f32)> {
    std::iter::empty()
}

/// Render `blocks` blocks of the ramp input and return every output sample.
pub fn render(processor: &mut saavy_host::BlockProcessor, blocks: usize) -> Vec<f32> {
    let plan = processor.plan();
    let (inputs, outputs, len) = (plan.inputs(), plan.outputs(), plan.block_len());
    let input = ramp(inputs, len);

    let mut samples = Vec::new();
    for _ in 0..blocks {
        let mut output = silence(outputs, len);
        assert_eq!(
            processor.process(&input, &mut output, no_automation()),
            saavy_host::BlockStatus::Rendered
        );
        samples.extend(output.into_iter().flatten());
    }
    samples
}

pub fn bits(samples: &[f32]) -> Vec<u32> {
    samples.iter().map(|s| s.to_bits()).collect()
}

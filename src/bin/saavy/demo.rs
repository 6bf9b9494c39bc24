//! Built-in demo organ, so `saavy play` works without an external compiler.
//!
//! The "compiler" only recognizes [`ORGAN_SOURCE`] and its effect companion;
//! the "binaries" name native kernels that follow the same memory contract
//! as compiled code.

use std::sync::Arc;

use saavy_host::cache::{Compiler, CompilerOutput, Loader, EFFECT_CLASS_NAME};
use saavy_host::memory::{Arena, Fault};
use saavy_host::module::{Kernel, MemoryMode};

pub const ORGAN_SOURCE: &str = r#"import("stdfaust.lib");
freq = hslider("freq", 440, 20, 2000, 1);
gain = hslider("gain", 0.5, 0, 1, 0.01);
gate = button("gate");
bright = hslider("bright[midi:ctrl 74]", 0.3, 0.01, 1, 0.01);
bend = hslider("bend[midi:pitchwheel]", 0, -2, 2, 0.01);
env = en.asr(0.01, 1, 0.3, gate) : hbargraph("level", 0, 1);
process = os.sawtooth(freq * ba.semi2ratio(bend)) : fi.lowpass(1, bright * 8000) * env * gain;
effect = *(hslider("volume[midi:ctrl 7]", 0.8, 0, 1, 0.01));
"#;

const ORGAN_METADATA: &str = r#"{
    "name": "organ", "filename": "organ.dsp", "size": 36, "inputs": 0, "outputs": 1,
    "ui": [{ "type": "vgroup", "label": "organ", "items": [
        { "type": "hslider", "label": "freq", "address": "/organ/freq", "index": 0,
          "init": 440, "min": 20, "max": 2000, "step": 1 },
        { "type": "hslider", "label": "gain", "address": "/organ/gain", "index": 4,
          "init": 0.5, "min": 0, "max": 1, "step": 0.01 },
        { "type": "button", "label": "gate", "address": "/organ/gate", "index": 8 },
        { "type": "hslider", "label": "bright", "address": "/organ/bright", "index": 12,
          "init": 0.3, "min": 0.01, "max": 1, "step": 0.01, "meta": [{ "midi": "ctrl 74" }] },
        { "type": "hslider", "label": "bend", "address": "/organ/bend", "index": 16,
          "init": 0, "min": -2, "max": 2, "step": 0.01, "meta": [{ "midi": "pitchwheel" }] },
        { "type": "hbargraph", "label": "level", "address": "/organ/level", "index": 20,
          "min": 0, "max": 1 }
    ]}]
}"#;

const VOLUME_METADATA: &str = r#"{
    "name": "effect", "size": 4, "inputs": 1, "outputs": 1,
    "ui": [{ "type": "vgroup", "label": "effect", "items": [
        { "type": "hslider", "label": "volume", "address": "/effect/volume", "index": 0,
          "init": 0.8, "min": 0, "max": 1, "step": 0.01, "meta": [{ "midi": "ctrl 7" }] }
    ]}]
}"#;

const ORGAN_BINARY: &[u8] = b"builtin:organ";
const VOLUME_BINARY: &[u8] = b"builtin:volume";

pub struct BuiltinCompiler;

impl Compiler for BuiltinCompiler {
    fn compile(
        &self,
        name: &str,
        source: &str,
        _args: &[String],
        _memory_mode: MemoryMode,
    ) -> Result<CompilerOutput, String> {
        if !source.contains(ORGAN_SOURCE) {
            return Err("the built-in compiler only knows the demo organ".to_string());
        }
        let (binary, metadata) = if name == EFFECT_CLASS_NAME {
            (VOLUME_BINARY, VOLUME_METADATA)
        } else {
            (ORGAN_BINARY, ORGAN_METADATA)
        };
        Ok(CompilerOutput {
            binary: binary.to_vec(),
            metadata: metadata.to_string(),
        })
    }
}

pub struct BuiltinLoader;

impl Loader for BuiltinLoader {
    fn load(&self, binary: &[u8]) -> Result<Arc<dyn Kernel>, String> {
        match binary {
            ORGAN_BINARY => Ok(Arc::new(Organ)),
            VOLUME_BINARY => Ok(Arc::new(Volume)),
            _ => Err(format!("unknown built-in binary ({} bytes)", binary.len())),
        }
    }
}

/// Sawtooth voice with a one-pole lowpass and a linear attack/release envelope.
struct Organ;

impl Organ {
    const FREQ: usize = 0;
    const GAIN: usize = 4;
    const GATE: usize = 8;
    const BRIGHT: usize = 12;
    const BEND: usize = 16;
    const LEVEL: usize = 20;
    const PHASE: usize = 24;
    const LOWPASS: usize = 28;
    const SAMPLE_RATE: usize = 32;

    const ATTACK: f32 = 0.01;
    const RELEASE: f32 = 0.3;
}

impl Kernel for Organ {
    fn init(&self, mem: &mut Arena, dsp: usize, sample_rate: u32) -> Result<(), Fault> {
        mem.store_f32(dsp + Self::FREQ, 440.0)?;
        mem.store_f32(dsp + Self::GAIN, 0.5)?;
        mem.store_f32(dsp + Self::GATE, 0.0)?;
        mem.store_f32(dsp + Self::BRIGHT, 0.3)?;
        mem.store_f32(dsp + Self::BEND, 0.0)?;
        mem.store_f32(dsp + Self::SAMPLE_RATE, sample_rate as f32)?;
        self.instance_clear(mem, dsp)
    }

    fn instance_clear(&self, mem: &mut Arena, dsp: usize) -> Result<(), Fault> {
        mem.store_f32(dsp + Self::LEVEL, 0.0)?;
        mem.store_f32(dsp + Self::PHASE, 0.0)?;
        mem.store_f32(dsp + Self::LOWPASS, 0.0)
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
        let gate = mem.load_f32(dsp + Self::GATE)? > 0.0;
        let gain = mem.load_f32(dsp + Self::GAIN)?;
        let bend = mem.load_f32(dsp + Self::BEND)?;
        let freq = mem.load_f32(dsp + Self::FREQ)? * 2.0_f32.powf(bend / 12.0);
        let bright = mem.load_f32(dsp + Self::BRIGHT)?;
        let mut level = mem.load_f32(dsp + Self::LEVEL)?;
        let mut phase = mem.load_f32(dsp + Self::PHASE)?;
        let mut lowpass = mem.load_f32(dsp + Self::LOWPASS)?;

        let step = if gate {
            1.0 / (Self::ATTACK * sr)
        } else {
            -1.0 / (Self::RELEASE * sr)
        };
        let out = mem.load_ptr(outputs)?;

        for i in 0..count {
            level = (level + step).clamp(0.0, 1.0);
            phase = (phase + freq / sr).fract();
            lowpass += (2.0 * phase - 1.0 - lowpass) * bright;
            mem.store_f32(out + i * 4, lowpass * level * gain * 0.3)?;
        }

        mem.store_f32(dsp + Self::LEVEL, level)?;
        mem.store_f32(dsp + Self::PHASE, phase)?;
        mem.store_f32(dsp + Self::LOWPASS, lowpass)
    }
}

/// Master volume, run in place on the mixed voices.
struct Volume;

impl Kernel for Volume {
    fn init(&self, mem: &mut Arena, dsp: usize, _sample_rate: u32) -> Result<(), Fault> {
        mem.store_f32(dsp, 0.8)
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
        let (src, dst) = (mem.load_ptr(inputs)?, mem.load_ptr(outputs)?);
        for i in 0..count {
            let sample = mem.load_f32(src + i * 4)?;
            mem.store_f32(dst + i * 4, sample * volume)?;
        }
        Ok(())
    }
}

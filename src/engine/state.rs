use std::sync::Arc;

use crate::control::params::ParameterTable;
use crate::control::router::{self, Route};
use crate::io::converter::{midi_note_to_freq, velocity_to_gain};
use crate::memory::{Arena, Fault, MemoryPlan};
use crate::module::Kernel;
use crate::synth::{MessageReceiver, Readback, SynthMessage, VoiceManager};

/// Why a processor stopped rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    Destroyed,
    Faulted(Fault),
}

/// Everything the audio callback mutates, owned in one place.
///
/// Nothing in here allocates after construction.
pub struct ProcessorState {
    pub(super) arena: Arena,
    pub(super) plan: MemoryPlan,
    pub(super) table: Arc<ParameterTable>,
    pub(super) voices: Option<VoiceManager>,
    pub(super) kernel: Arc<dyn Kernel>,
    pub(super) effect: Option<Arc<dyn Kernel>>,
    pub(super) halt: Option<Halt>,
}

impl ProcessorState {
    /// Apply every pending message.
    ///
    /// Stops at a Destroy; anything queued behind it is discarded with the
    /// processor. A fault while applying stops the processor as well.
    pub fn drain<R: MessageReceiver>(&mut self, rx: &mut R) -> Result<(), Fault> {
        while let Some(msg) = rx.pop() {
            if msg == SynthMessage::Destroy {
                self.halt = Some(Halt::Destroyed);
                return Ok(());
            }
            if let Err(fault) = self.apply(msg) {
                self.halt = Some(Halt::Faulted(fault));
                return Err(fault);
            }
        }
        Ok(())
    }

    pub fn apply(&mut self, msg: SynthMessage) -> Result<(), Fault> {
        match msg {
            SynthMessage::NoteOn { pitch, velocity } => self.note_on(pitch, velocity)?,
            SynthMessage::NoteOff { pitch } => self.note_off(pitch),
            SynthMessage::ControlChange { controller, value } => {
                if matches!(controller, 120 | 123) {
                    self.all_notes_off();
                }
                self.route().control_change(controller, value);
            }
            SynthMessage::PitchWheel { value } => self.route().pitch_wheel(value),
            SynthMessage::SetParameter { binding, value } => self.route().set(binding, value),
            SynthMessage::AllNotesOff => self.all_notes_off(),
            SynthMessage::Destroy => self.halt = Some(Halt::Destroyed),
        }
        Ok(())
    }

    fn route(&mut self) -> Route<'_> {
        Route {
            arena: &mut self.arena,
            plan: &self.plan,
            table: &self.table,
        }
    }

    /// Allocate a voice, reset its signal state and start it. No-op in mono mode.
    fn note_on(&mut self, pitch: u8, velocity: u8) -> Result<(), Fault> {
        let Some((_, region)) = self.voices.as_mut().and_then(|v| v.note_on(pitch)) else {
            return Ok(());
        };

        self.kernel.instance_clear(&mut self.arena, region.offset())?;

        let keys = self.table.voice_keys();
        let mut route = self.route();
        if let Some(freq) = keys.freq {
            route.set_on_voice(region, freq, midi_note_to_freq(pitch));
        }
        if let Some(gain) = keys.gain {
            route.set_on_voice(region, gain, velocity_to_gain(velocity));
        }
        if let Some(gate) = keys.gate {
            route.set_on_voice(region, gate, 1.0);
        }
        Ok(())
    }

    /// Close the gate of the oldest voice playing `pitch`. Unknown pitches are ignored.
    fn note_off(&mut self, pitch: u8) {
        let Some(voices) = self.voices.as_mut() else {
            return;
        };
        let Some(index) = voices.note_off(pitch) else {
            return;
        };
        let region = voices.voice(index).map(|v| v.instance());

        if let (Some(region), Some(gate)) = (region, self.table.voice_keys().gate) {
            self.route().set_on_voice(region, gate, 0.0);
        }
    }

    /// Close every gate and move every voice to Releasing.
    fn all_notes_off(&mut self) {
        let Some(voices) = self.voices.as_mut() else {
            return;
        };
        voices.all_notes_off();

        if let Some(gate) = self.table.voice_keys().gate {
            let mut route = Route {
                arena: &mut self.arena,
                plan: &self.plan,
                table: &self.table,
            };
            for voice in voices.voices() {
                route.set_on_voice(voice.instance(), gate, 0.0);
            }
        }
    }

    /// Run the kernel(s) over one block already staged in the input region.
    pub fn render(&mut self, count: usize) -> Result<(), Fault> {
        let plan = &self.plan;
        let inputs = plan.inputs_table().offset();
        let outputs = plan.outputs_table().offset();

        let Some(mixing) = plan.mixing_table() else {
            let instance = plan.voice_instance(0).map_or(0, |r| r.offset());
            return self
                .kernel
                .compute(&mut self.arena, instance, count, inputs, outputs);
        };

        // The output region is the accumulator.
        for buf in plan.output_buffers() {
            self.arena.zero(buf.offset(), buf.byte_len())?;
        }

        for region in plan.voice_instances() {
            self.kernel
                .compute(&mut self.arena, region.offset(), count, inputs, mixing.offset())?;
            for (out, mix) in plan.mix_pairs() {
                self.arena.accumulate(out, mix);
            }
        }

        if let (Some(effect), Some(region)) = (&self.effect, plan.effect_instance()) {
            effect.compute(&mut self.arena, region.offset(), count, outputs, outputs)?;
        }
        Ok(())
    }

    /// Push the current value of every bargraph. Drops readbacks when the queue is full.
    pub fn read_back(&self, tx: &mut rtrb::Producer<Readback>) {
        for &binding in self.table.outputs() {
            if let Some(value) = router::read(&self.arena, &self.plan, &self.table, binding) {
                let _ = tx.push(Readback { binding, value });
            }
        }
    }

    pub fn read(&self, path: &str) -> Option<f32> {
        let id = self.table.lookup(path)?;
        router::read(&self.arena, &self.plan, &self.table, id)
    }

    /// Write a host automation value. Unknown and output-only paths are ignored.
    pub fn automate(&mut self, path: &str, value: f32) {
        self.route().set_path(path, value);
    }
}

use std::sync::Arc;

use rtrb::{Consumer, Producer};

use crate::io::converter::{is_all_notes_off, midi_to_event};
use crate::io::midi::{MidiEvent, PERCUSSION_CHANNEL, PITCH_WHEEL_MAX};
use crate::synth::message::{Readback, SynthMessage};

use super::params::{ParameterDescriptor, ParameterTable};
use super::{ControlError, Event, EventLog};

/// Control-side end of a block processor.
///
/// Events are validated and resolved here, then pushed as [`SynthMessage`]s
/// onto a wait-free queue the processor drains at the start of each block.
/// The handle keeps a mirror of every input value it sent plus the latest
/// bargraph readbacks, so [`get_parameter`](Self::get_parameter) never
/// touches the audio thread.
pub struct ControlHandle {
    tx: Producer<SynthMessage>,
    readbacks: Consumer<Readback>,
    table: Arc<ParameterTable>,
    values: Vec<f32>,
    log: EventLog,
    destroyed: bool,
}

impl ControlHandle {
    pub(crate) fn new(
        tx: Producer<SynthMessage>,
        readbacks: Consumer<Readback>,
        table: Arc<ParameterTable>,
        log: EventLog,
    ) -> Self {
        let values = table.iter().map(|(_, b)| b.default).collect();
        Self {
            tx,
            readbacks,
            table,
            values,
            log,
            destroyed: false,
        }
    }

    /// Validate, mirror, log and enqueue one event.
    ///
    /// Events after teardown, and note/controller events on the percussion
    /// channel, are dropped silently. A full queue drops the message with a
    /// warning and leaves the mirror and the log untouched; the processor is
    /// never blocked.
    pub fn send(&mut self, event: Event) -> Result<(), ControlError> {
        if self.destroyed {
            log::debug!(target: "saavy_host::control", "ignoring {:?} after destroy", event);
            return Ok(());
        }
        // CC 120/123 pass from the drum channel so a panic always silences every voice.
        if event.channel() == Some(PERCUSSION_CHANNEL) && !is_panic(&event) {
            return Ok(());
        }

        let msg = match &event {
            Event::NoteOn { pitch, velocity, .. } => {
                if *velocity == 0 {
                    SynthMessage::NoteOff { pitch: *pitch & 0x7f }
                } else {
                    SynthMessage::NoteOn {
                        pitch: *pitch & 0x7f,
                        velocity: *velocity & 0x7f,
                    }
                }
            }
            Event::NoteOff { pitch, .. } => SynthMessage::NoteOff { pitch: *pitch & 0x7f },
            Event::ControlChange {
                controller, value, ..
            } => {
                SynthMessage::ControlChange {
                    controller: *controller & 0x7f,
                    value: *value & 0x7f,
                }
            }
            Event::PitchWheel { value, .. } => SynthMessage::PitchWheel {
                value: (*value).min(PITCH_WHEEL_MAX),
            },
            Event::RawParameterSet { path, value } => {
                let binding = self
                    .table
                    .lookup(path)
                    .ok_or_else(|| ControlError::UnknownPath(path.clone()))?;
                if self.table.get(binding).is_some_and(|b| b.is_output()) {
                    return Err(ControlError::OutputOnly(path.clone()));
                }
                if self.table.is_voice_managed(binding) {
                    return Err(ControlError::VoiceManaged(path.clone()));
                }
                SynthMessage::SetParameter {
                    binding,
                    value: *value,
                }
            }
            Event::AllNotesOff => SynthMessage::AllNotesOff,
            Event::Destroy => SynthMessage::Destroy,
        };

        if self.tx.push(msg).is_err() {
            log::warn!(target: "saavy_host::control", "control queue full, dropped {:?}", msg);
            return Ok(());
        }
        self.mirror(msg);
        self.log.append(event);
        Ok(())
    }

    /// Apply a delivered message to the control-side state.
    fn mirror(&mut self, msg: SynthMessage) {
        match msg {
            SynthMessage::ControlChange { controller, value } => self.mirror_control_change(controller, value),
            SynthMessage::PitchWheel { value } => self.mirror_pitch_wheel(value),
            SynthMessage::SetParameter { binding, value } => self.values[binding.index()] = value,
            SynthMessage::Destroy => self.destroyed = true,
            _ => {}
        }
    }

    fn mirror_control_change(&mut self, controller: u8, value: u8) {
        for &id in self.table.controller(controller) {
            if let Some(binding) = self.table.get(id) {
                self.values[id.index()] = binding.remap_cc(value);
            }
        }
    }

    fn mirror_pitch_wheel(&mut self, value: u16) {
        for &id in self.table.pitch_wheel() {
            if let Some(binding) = self.table.get(id) {
                self.values[id.index()] = binding.remap_pitch_wheel(value);
            }
        }
    }

    fn send_infallible(&mut self, event: Event) {
        if let Err(e) = self.send(event) {
            log::warn!(target: "saavy_host::control", "{}", e);
        }
    }

    pub fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        self.send_infallible(Event::NoteOn {
            channel,
            pitch,
            velocity,
        });
    }

    pub fn note_off(&mut self, channel: u8, pitch: u8, velocity: u8) {
        self.send_infallible(Event::NoteOff {
            channel,
            pitch,
            velocity,
        });
    }

    pub fn control_change(&mut self, channel: u8, controller: u8, value: u8) {
        self.send_infallible(Event::ControlChange {
            channel,
            controller,
            value,
        });
    }

    pub fn pitch_wheel(&mut self, channel: u8, value: u16) {
        self.send_infallible(Event::PitchWheel { channel, value });
    }

    /// Set a control by path. Instrument controls apply to every voice.
    pub fn set_parameter(&mut self, path: &str, value: f32) -> Result<(), ControlError> {
        self.send(Event::RawParameterSet {
            path: path.to_string(),
            value,
        })
    }

    pub fn all_notes_off(&mut self) {
        self.send_infallible(Event::AllNotesOff);
    }

    /// Decode a raw MIDI message and send it. Unsupported messages are ignored.
    pub fn midi_message(&mut self, bytes: &[u8]) {
        match MidiEvent::parse(bytes).and_then(midi_to_event) {
            Some(event) => self.send_infallible(event),
            None => log::trace!(target: "saavy_host::control", "unrouted midi {:02x?}", bytes),
        }
    }

    /// Stop the processor. Later calls, and every event after, are ignored.
    pub fn destroy(&mut self) {
        self.send_infallible(Event::Destroy);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Drain pending readbacks into the mirror. Returns how many arrived.
    pub fn poll_readbacks(&mut self) -> usize {
        let mut count = 0;
        while let Ok(Readback { binding, value }) = self.readbacks.pop() {
            if let Some(slot) = self.values.get_mut(binding.index()) {
                *slot = value;
            }
            count += 1;
        }
        count
    }

    /// Last known value of a control.
    ///
    /// Inputs report the last value sent (or their default); bargraphs report
    /// the latest readback from the processor.
    pub fn get_parameter(&mut self, path: &str) -> Option<f32> {
        self.poll_readbacks();
        let id = self.table.lookup(path)?;
        self.values.get(id.index()).copied()
    }

    pub fn parameter_descriptors(&self) -> Vec<ParameterDescriptor> {
        self.table.descriptors()
    }

    pub fn table(&self) -> &ParameterTable {
        &self.table
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }
}

fn is_panic(event: &Event) -> bool {
    match *event {
        Event::ControlChange {
            channel,
            controller,
            value,
        } => is_all_notes_off(MidiEvent::ControlChange {
            channel,
            controller,
            value,
        }),
        _ => false,
    }
}

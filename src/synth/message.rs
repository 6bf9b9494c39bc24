use rtrb::Consumer;

use crate::control::params::BindingId;

/// Control message delivered to the audio thread.
///
/// Messages are `Copy` so draining them never frees memory on the audio
/// thread; control paths are resolved to a [`BindingId`] before sending.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SynthMessage {
    NoteOn { pitch: u8, velocity: u8 },
    NoteOff { pitch: u8 },
    ControlChange { controller: u8, value: u8 },
    PitchWheel { value: u16 },
    SetParameter { binding: BindingId, value: f32 },
    AllNotesOff,
    Destroy,
}

/// Output-only value read back from the module for host UI feedback.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Readback {
    pub binding: BindingId,
    pub value: f32,
}

pub trait MessageReceiver {
    fn pop(&mut self) -> Option<SynthMessage>;
}

impl MessageReceiver for Consumer<SynthMessage> {
    fn pop(&mut self) -> Option<SynthMessage> {
        Consumer::pop(self).ok()
    }
}

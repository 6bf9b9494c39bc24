// Purpose - control path from the host to a running block processor

pub mod event_log;
pub mod handle;
pub mod params;
pub mod router;

use serde::{Deserialize, Serialize};

pub use event_log::{EventLog, LogEntry};
pub use handle::ControlHandle;
pub use params::{BindingId, ParameterBinding, ParameterDescriptor, ParameterTable};

/// Host-facing control event.
///
/// MIDI-shaped events carry a channel so the percussion filter can act on
/// them; parameter sets are addressed by control path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    PitchWheel { channel: u8, value: u16 },
    RawParameterSet { path: String, value: f32 },
    AllNotesOff,
    Destroy,
}

impl Event {
    /// MIDI channel of channel-voice events.
    pub fn channel(&self) -> Option<u8> {
        match *self {
            Event::NoteOn { channel, .. }
            | Event::NoteOff { channel, .. }
            | Event::ControlChange { channel, .. }
            | Event::PitchWheel { channel, .. } => Some(channel),
            Event::RawParameterSet { .. } | Event::AllNotesOff | Event::Destroy => None,
        }
    }
}

/// Errors that can occur when sending control events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// No control with this path exists in the module or its effect
    UnknownPath(String),
    /// The path names an output-only control
    OutputOnly(String),
    /// The path names a gate/freq/gain control the voice manager drives
    VoiceManaged(String),
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlError::UnknownPath(path) => write!(f, "unknown control path {}", path),
            ControlError::OutputOnly(path) => write!(f, "control {} is output-only", path),
            ControlError::VoiceManaged(path) => write!(f, "control {} is driven by note events", path),
        }
    }
}

impl std::error::Error for ControlError {}

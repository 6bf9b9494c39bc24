/// MIDI channel reserved for percussion; events on it are not routed.
pub const PERCUSSION_CHANNEL: u8 = 9;
/// Highest pitch-wheel value (14-bit, centre 8192).
pub const PITCH_WHEEL_MAX: u16 = 16_383;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// 14-bit value, 0..=16383.
    PitchBend { channel: u8, value: u16 },
    ProgramChange { channel: u8, program: u8 },
}

impl MidiEvent {
    /// Decode one short channel-voice message.
    ///
    /// A NoteOn with velocity 0 is a NoteOff. Running status, system and
    /// unsupported messages yield `None`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        let channel = status & 0x0f;
        let d1 = data.first().map(|b| b & 0x7f);
        let d2 = data.get(1).map(|b| b & 0x7f);

        match status >> 4 {
            0x8 => Some(MidiEvent::NoteOff {
                channel,
                key: d1?,
                velocity: d2?,
            }),
            0x9 => {
                let (key, velocity) = (d1?, d2?);
                if velocity == 0 {
                    Some(MidiEvent::NoteOff { channel, key, velocity })
                } else {
                    Some(MidiEvent::NoteOn { channel, key, velocity })
                }
            }
            0xb => Some(MidiEvent::ControlChange {
                channel,
                controller: d1?,
                value: d2?,
            }),
            0xc => Some(MidiEvent::ProgramChange { channel, program: d1? }),
            0xe => Some(MidiEvent::PitchBend {
                channel,
                value: u16::from(d1?) | (u16::from(d2?) << 7),
            }),
            _ => None,
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::PitchBend { channel, .. }
            | MidiEvent::ProgramChange { channel, .. } => channel,
        }
    }
}

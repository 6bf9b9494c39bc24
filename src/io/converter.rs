use crate::{
    control::Event,
    io::midi::{MidiEvent, PERCUSSION_CHANNEL},
};

/// Translate a decoded MIDI message into a control event.
///
/// Program changes have no counterpart and the percussion channel is not
/// routed, except for the channel-mode "all notes off" controllers which are
/// honoured on every channel.
pub fn midi_to_event(midi: MidiEvent) -> Option<Event> {
    // CC 120/123 pass from the drum channel so a panic always silences every voice.
    if midi.channel() == PERCUSSION_CHANNEL && !is_all_notes_off(midi) {
        return None;
    }

    match midi {
        MidiEvent::NoteOn {
            channel,
            key,
            velocity,
        } => Some(Event::NoteOn {
            channel,
            pitch: key,
            velocity,
        }),
        MidiEvent::NoteOff {
            channel,
            key,
            velocity,
        } => Some(Event::NoteOff {
            channel,
            pitch: key,
            velocity,
        }),
        MidiEvent::ControlChange {
            channel,
            controller,
            value,
        } => Some(Event::ControlChange {
            channel,
            controller,
            value,
        }),
        MidiEvent::PitchBend { channel, value } => Some(Event::PitchWheel { channel, value }),
        MidiEvent::ProgramChange { .. } => None,
    }
}

/// Controllers 120 (all sound off) and 123 (all notes off).
pub fn is_all_notes_off(midi: MidiEvent) -> bool {
    matches!(
        midi,
        MidiEvent::ControlChange {
            controller: 120 | 123,
            ..
        }
    )
}

pub fn midi_note_to_freq(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

/// Velocity 0..=127 as a linear gain 0..=1.
pub fn velocity_to_gain(velocity: u8) -> f32 {
    velocity as f32 / 127.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        assert_eq!(midi_note_to_freq(69), 440.0);
        assert!((midi_note_to_freq(81) - 880.0).abs() < 1e-3);
        assert!((midi_note_to_freq(60) - 261.6256).abs() < 1e-3);
    }

    #[test]
    fn velocity_maps_to_unit_gain() {
        assert_eq!(velocity_to_gain(0), 0.0);
        assert_eq!(velocity_to_gain(127), 1.0);
    }

    #[test]
    fn percussion_channel_is_dropped() {
        let note = MidiEvent::NoteOn { channel: 9, key: 36, velocity: 100 };
        assert_eq!(midi_to_event(note), None);

        let cc = MidiEvent::ControlChange { channel: 9, controller: 1, value: 10 };
        assert_eq!(midi_to_event(cc), None);

        let panic = MidiEvent::ControlChange { channel: 9, controller: 123, value: 0 };
        assert_eq!(
            midi_to_event(panic),
            Some(Event::ControlChange { channel: 9, controller: 123, value: 0 })
        );
    }

    #[test]
    fn program_change_has_no_event() {
        assert_eq!(midi_to_event(MidiEvent::ProgramChange { channel: 0, program: 3 }), None);
    }
}

use crate::memory::InstanceRegion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Free,       // Never allocated; instance holds its initial state
    Active(u8), // Sounding the given pitch, gate high
    Releasing,  // Gate low, envelope decaying
}

/// Position of a voice in the fixed voice table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VoiceIndex(usize);

impl VoiceIndex {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

/// One module instance realizing one note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    index: VoiceIndex,
    state: VoiceState,
    sequence: u64,
    instance: InstanceRegion,
}

impl Voice {
    pub fn new(index: usize, instance: InstanceRegion) -> Self {
        Self {
            index: VoiceIndex(index),
            state: VoiceState::Free,
            sequence: 0,
            instance,
        }
    }

    /// Any state -> Active(pitch), stamped with `sequence`.
    pub fn start(&mut self, pitch: u8, sequence: u64) {
        self.state = VoiceState::Active(pitch);
        self.sequence = sequence;
    }

    /// Active -> Releasing. Other states are left alone.
    pub fn release(&mut self) -> bool {
        if matches!(self.state, VoiceState::Active(_)) {
            self.state = VoiceState::Releasing;
            true
        } else {
            false
        }
    }

    /// Unconditional transition used by "all notes off".
    pub fn force_release(&mut self) {
        self.state = VoiceState::Releasing;
    }

    pub fn index(&self) -> VoiceIndex {
        self.index
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_free(&self) -> bool {
        self.state == VoiceState::Free
    }

    pub fn is_releasing(&self) -> bool {
        self.state == VoiceState::Releasing
    }

    /// Pitch this voice is holding, if active.
    pub fn pitch(&self) -> Option<u8> {
        match self.state {
            VoiceState::Active(pitch) => Some(pitch),
            _ => None,
        }
    }

    /// Logical allocation time; smaller is older.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn instance(&self) -> InstanceRegion {
        self.instance
    }
}

use crate::memory::{InstanceRegion, MemoryPlan};
use crate::synth::voice::{Voice, VoiceIndex, VoiceState};

/// How [`VoiceManager::get_free_voice`] found its voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceChoice {
    /// A voice that has never been allocated.
    Free(VoiceIndex),
    /// The oldest releasing voice, taken because nothing was free.
    StoleReleasing(VoiceIndex),
    /// The oldest active voice, taken because nothing was free or releasing.
    StoleActive(VoiceIndex),
}

impl VoiceChoice {
    pub fn index(self) -> VoiceIndex {
        match self {
            VoiceChoice::Free(v) | VoiceChoice::StoleReleasing(v) | VoiceChoice::StoleActive(v) => v,
        }
    }
}

/// Fixed-size voice table with least-recently-allocated stealing.
///
/// The table never grows or shrinks after construction and no operation
/// allocates, so it can live on the audio thread.
pub struct VoiceManager {
    voices: Vec<Voice>,
    clock: u64,
}

impl VoiceManager {
    /// One voice per instance region.
    pub fn new(instances: impl IntoIterator<Item = InstanceRegion>) -> Self {
        let voices = instances
            .into_iter()
            .enumerate()
            .map(|(i, region)| Voice::new(i, region))
            .collect();

        Self { voices, clock: 0 }
    }

    /// Voices for a polyphonic plan; `None` for a monophonic one.
    pub fn for_plan(plan: &MemoryPlan) -> Option<Self> {
        plan.polyphony()
            .is_poly()
            .then(|| Self::new(plan.voice_instances()))
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn voice(&self, index: VoiceIndex) -> Option<&Voice> {
        self.voices.get(index.get())
    }

    /// Pick the voice for a new note.
    ///
    /// Free voice with the lowest index, else the oldest releasing voice, else
    /// the oldest active voice. Ties break on the lowest index. Only returns
    /// `None` for an empty table.
    pub fn get_free_voice(&self) -> Option<VoiceChoice> {
        if let Some(v) = self.voices.iter().find(|v| v.is_free()) {
            return Some(VoiceChoice::Free(v.index()));
        }

        if let Some(v) = self.oldest(|v| v.is_releasing()) {
            return Some(VoiceChoice::StoleReleasing(v));
        }

        self.oldest(|v| v.pitch().is_some())
            .map(VoiceChoice::StoleActive)
    }

    fn oldest(&self, filter: impl Fn(&Voice) -> bool) -> Option<VoiceIndex> {
        self.voices
            .iter()
            .filter(|v| filter(v))
            .min_by_key(|v| (v.sequence(), v.index()))
            .map(|v| v.index())
    }

    /// Any state -> Active(pitch) with a fresh allocation stamp.
    ///
    /// Returns the instance the caller must reset to its initial condition.
    pub fn allocate(&mut self, index: VoiceIndex, pitch: u8) -> Option<InstanceRegion> {
        let voice = self.voices.get_mut(index.get())?;
        self.clock += 1;
        voice.start(pitch, self.clock);
        Some(voice.instance())
    }

    /// Active -> Releasing.
    pub fn release(&mut self, index: VoiceIndex) -> bool {
        self.voices
            .get_mut(index.get())
            .is_some_and(|v| v.release())
    }

    /// Oldest active voice holding `pitch`.
    pub fn get_playing_voice(&self, pitch: u8) -> Option<VoiceIndex> {
        self.oldest(|v| v.pitch() == Some(pitch))
    }

    /// Choose and allocate a voice for `pitch`.
    pub fn note_on(&mut self, pitch: u8) -> Option<(VoiceChoice, InstanceRegion)> {
        let choice = self.get_free_voice()?;
        let region = self.allocate(choice.index(), pitch)?;
        Some((choice, region))
    }

    /// Release the oldest voice playing `pitch`, if any.
    pub fn note_off(&mut self, pitch: u8) -> Option<VoiceIndex> {
        let index = self.get_playing_voice(pitch)?;
        self.release(index);
        Some(index)
    }

    /// Every voice -> Releasing, whatever its state.
    pub fn all_notes_off(&mut self) {
        for voice in &mut self.voices {
            voice.force_release();
        }
    }

    pub fn states(&self) -> impl Iterator<Item = VoiceState> + '_ {
        self.voices.iter().map(|v| v.state())
    }
}

// Purpose: Voice management, polyphony, control messages
// This layer sits between the control handle and the block processor

pub mod allocator;
pub mod message;
pub mod voice;

pub use allocator::{VoiceChoice, VoiceManager};
pub use message::{MessageReceiver, Readback, SynthMessage};
pub use voice::{Voice, VoiceIndex, VoiceState};

// Purpose - external interfaces, format conversions

pub mod converter;
pub mod midi;

/// Owned host-side input block, one buffer per channel.
#[derive(Debug, Default, Clone)]
pub struct AudioInput {
    pub buffers: Vec<Vec<f32>>,
}

impl AudioInput {
    pub fn silence(channels: usize, frames: usize) -> Self {
        Self {
            buffers: vec![vec![0.0; frames]; channels],
        }
    }
}

/// Owned host-side output block, one buffer per channel.
#[derive(Debug, Default, Clone)]
pub struct AudioOutput {
    pub buffers: Vec<Vec<f32>>,
}

impl AudioOutput {
    pub fn silence(channels: usize, frames: usize) -> Self {
        Self {
            buffers: vec![vec![0.0; frames]; channels],
        }
    }

    /// Every sample of every channel, channel after channel.
    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        self.buffers.iter().flat_map(|c| c.iter().copied())
    }
}

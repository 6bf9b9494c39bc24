//! Compiled modules and the contract their executable code fulfils.

pub mod metadata;

use std::sync::Arc;

use crate::cache::Fingerprint;
use crate::memory::{Arena, Fault};

pub use metadata::{MetadataError, ModuleMetadata, UiItem};

/// Who allocates the module's linear memory.
///
/// Polyphony needs one shared arena holding every voice, so modules meant for
/// a block processor are compiled for [`MemoryMode::External`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryMode {
    /// The host provides the arena.
    #[default]
    External,
    /// The module allocates its own memory.
    Internal,
}

impl MemoryMode {
    /// Stable tag used when fingerprinting.
    pub fn tag(self) -> &'static str {
        match self {
            MemoryMode::External => "external_memory",
            MemoryMode::Internal => "internal_memory",
        }
    }
}

/// Executable entry points of a loaded module.
///
/// Implementations are stateless: all state lives in the instance region at
/// `dsp` inside the arena. Addresses are byte offsets. `inputs`/`outputs` are
/// pointer tables with one buffer address per channel. Every entry point runs
/// on the audio thread and must not block or allocate.
pub trait Kernel: Send + Sync {
    /// Set up a fresh instance: constants, default control values, cleared state.
    fn init(&self, mem: &mut Arena, dsp: usize, sample_rate: u32) -> Result<(), Fault>;

    /// Reset signal state (delay lines, envelopes) without touching control values.
    fn instance_clear(&self, mem: &mut Arena, dsp: usize) -> Result<(), Fault>;

    /// Render `count` frames.
    fn compute(
        &self,
        mem: &mut Arena,
        dsp: usize,
        count: usize,
        inputs: usize,
        outputs: usize,
    ) -> Result<(), Fault>;
}

/// An immutable compiled artifact, ready to attach to a block processor.
pub struct CompiledModule {
    name: String,
    fingerprint: Fingerprint,
    source: String,
    binary: Vec<u8>,
    metadata_json: String,
    metadata: ModuleMetadata,
    kernel: Arc<dyn Kernel>,
    effect: Option<Arc<CompiledModule>>,
}

impl CompiledModule {
    /// Assemble a module from compiler output and its loaded code.
    ///
    /// Fails if the metadata document is malformed; nothing is built in that case.
    pub fn new(
        name: impl Into<String>,
        fingerprint: Fingerprint,
        source: impl Into<String>,
        binary: Vec<u8>,
        metadata_json: impl Into<String>,
        kernel: Arc<dyn Kernel>,
    ) -> Result<Self, MetadataError> {
        let metadata_json = metadata_json.into();
        let metadata = ModuleMetadata::parse(&metadata_json)?;

        Ok(Self {
            name: name.into(),
            fingerprint,
            source: source.into(),
            binary,
            metadata_json,
            metadata,
            kernel,
            effect: None,
        })
    }

    /// Attach a companion effect that runs after all voices are mixed.
    pub fn with_effect(mut self, effect: Arc<CompiledModule>) -> Self {
        self.effect = Some(effect);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn binary(&self) -> &[u8] {
        &self.binary
    }

    pub fn metadata_json(&self) -> &str {
        &self.metadata_json
    }

    pub fn metadata(&self) -> &ModuleMetadata {
        &self.metadata
    }

    pub fn kernel(&self) -> &Arc<dyn Kernel> {
        &self.kernel
    }

    pub fn effect(&self) -> Option<&Arc<CompiledModule>> {
        self.effect.as_ref()
    }

    pub fn inputs(&self) -> usize {
        self.metadata.inputs
    }

    pub fn outputs(&self) -> usize {
        self.metadata.outputs
    }

    pub fn instance_size(&self) -> usize {
        self.metadata.size
    }

    /// UI document with the effect panel nested next to the instrument.
    pub fn combined_ui(&self) -> Vec<UiItem> {
        metadata::combined_ui(
            &self.metadata.ui,
            self.effect.as_deref().map(|e| e.metadata.ui.as_slice()),
        )
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("name", &self.name)
            .field("fingerprint", &self.fingerprint)
            .field("inputs", &self.inputs())
            .field("outputs", &self.outputs())
            .field("instance_size", &self.instance_size())
            .field("binary_len", &self.binary.len())
            .field("effect", &self.effect.as_ref().map(|e| e.name()))
            .finish()
    }
}

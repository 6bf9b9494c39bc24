//! The real-time block processor.
//!
//! One [`BlockProcessor`] hosts one compiled module (and, in polyphonic mode,
//! its companion effect) inside a planned arena. The host calls
//! [`process`](BlockProcessor::process) once per audio block; control events
//! arrive through the paired [`ControlHandle`].

mod state;

use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use crate::config::{ConfigError, EngineConfig};
use crate::control::{ControlHandle, EventLog, ParameterTable};
use crate::io::{AudioInput, AudioOutput};
use crate::memory::{Arena, Fault, LayoutError, LayoutRequest, MemoryPlan, Polyphony};
use crate::module::CompiledModule;
use crate::synth::{Readback, SynthMessage, VoiceManager, VoiceState};

pub use state::Halt;
use state::ProcessorState;

/// Outcome of one [`BlockProcessor::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Outputs hold a freshly rendered block.
    Rendered,
    /// A declared channel was missing or too short; nothing was written.
    Skipped,
    /// The processor was destroyed or has faulted; nothing was written.
    Stopped,
    /// The module accessed memory outside the arena. The processor is now stopped.
    Faulted(Fault),
}

/// Errors that can occur when attaching a module to a processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    /// The engine configuration is out of range
    Config(ConfigError),
    /// The arena could not be planned
    Layout(LayoutError),
    /// A module faulted while initializing its instance
    Init(Fault),
}

impl std::fmt::Display for SetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetupError::Config(e) => write!(f, "{}", e),
            SetupError::Layout(e) => write!(f, "layout failed: {}", e),
            SetupError::Init(fault) => write!(f, "module init faulted: {}", fault),
        }
    }
}

impl std::error::Error for SetupError {}

impl From<ConfigError> for SetupError {
    fn from(e: ConfigError) -> Self {
        SetupError::Config(e)
    }
}

impl From<LayoutError> for SetupError {
    fn from(e: LayoutError) -> Self {
        SetupError::Layout(e)
    }
}

impl From<Fault> for SetupError {
    fn from(fault: Fault) -> Self {
        SetupError::Init(fault)
    }
}

pub struct BlockProcessor {
    state: ProcessorState,
    rx: Consumer<SynthMessage>,
    readback_tx: Producer<Readback>,
    bargraph_interval: u64,
    blocks_rendered: u64,
}

/// Point every pointer-table slot at its sample buffer.
fn write_pointer_tables(arena: &mut Arena, plan: &MemoryPlan) -> Result<(), Fault> {
    let inputs = plan.inputs_table();
    for ch in 0..plan.inputs() {
        if let (Some(slot), Some(buf)) = (inputs.slot(ch), plan.input_buffer(ch)) {
            arena.store_ptr(slot, buf.offset())?;
        }
    }

    let outputs = plan.outputs_table();
    let mixing = plan.mixing_table();
    for ch in 0..plan.outputs() {
        if let (Some(slot), Some(buf)) = (outputs.slot(ch), plan.output_buffer(ch)) {
            arena.store_ptr(slot, buf.offset())?;
        }
        if let Some(slot) = mixing.and_then(|t| t.slot(ch)) {
            if let Some(buf) = plan.mixing_buffer(ch) {
                arena.store_ptr(slot, buf.offset())?;
            }
        }
    }
    Ok(())
}

impl BlockProcessor {
    /// Plan an arena for `module`, initialize every instance and open the control channel.
    ///
    /// The effect companion is only hosted in polyphonic mode, and only when it
    /// reads and writes as many channels as the module outputs.
    pub fn new(
        module: &CompiledModule,
        config: &EngineConfig,
    ) -> Result<(Self, ControlHandle), SetupError> {
        config.validate()?;

        let polyphony = Polyphony::for_requested(config.voices);
        let effect = module.effect().filter(|_| polyphony.is_poly()).filter(|effect| {
            let fits = effect.inputs() == module.outputs() && effect.outputs() == module.outputs();
            if !fits {
                log::warn!(
                    target: "saavy_host::engine",
                    "effect {}x{} does not match {} outputs, running without it",
                    effect.inputs(),
                    effect.outputs(),
                    module.outputs()
                );
            }
            fits
        });

        let mut request = LayoutRequest::new(
            module.instance_size(),
            module.inputs(),
            module.outputs(),
            config.block_len,
        )
        .voices(config.voices)
        .ptr_width(config.ptr_width()?)
        .page_size(config.page_size);
        if let Some(effect) = effect {
            request = request.effect(effect.instance_size());
        }
        let plan = request.plan()?;

        let mut arena = Arena::for_plan(&plan);
        write_pointer_tables(&mut arena, &plan)?;

        let kernel = Arc::clone(module.kernel());
        for region in plan.voice_instances() {
            kernel.init(&mut arena, region.offset(), config.sample_rate)?;
        }
        let effect_kernel = match (effect, plan.effect_instance()) {
            (Some(effect), Some(region)) => {
                effect
                    .kernel()
                    .init(&mut arena, region.offset(), config.sample_rate)?;
                Some(Arc::clone(effect.kernel()))
            }
            _ => None,
        };

        let table = Arc::new(ParameterTable::build(
            module.metadata(),
            effect.map(|e| e.metadata()),
            polyphony.is_poly(),
        ));

        let (tx, rx) = RingBuffer::new(config.queue_capacity);
        let (readback_tx, readbacks) = RingBuffer::new(config.readback_capacity);
        let handle = ControlHandle::new(
            tx,
            readbacks,
            Arc::clone(&table),
            EventLog::with_capacity(config.event_log_capacity),
        );

        log::info!(
            target: "saavy_host::engine",
            "attached {} ({} voices{}, {} controls, {} byte arena)",
            module.name(),
            polyphony.voices(),
            if effect_kernel.is_some() { " + effect" } else { "" },
            table.len(),
            plan.arena_size()
        );

        let state = ProcessorState {
            voices: VoiceManager::for_plan(&plan),
            arena,
            plan,
            table,
            kernel,
            effect: effect_kernel,
            halt: None,
        };

        let processor = Self {
            state,
            rx,
            readback_tx,
            bargraph_interval: u64::from(config.bargraph_interval),
            blocks_rendered: 0,
        };
        Ok((processor, handle))
    }

    /// Render one block.
    ///
    /// `inputs` and `outputs` hold one buffer per channel, each at least one
    /// block long. `automation` values are applied after pending control
    /// messages, just before rendering. Never allocates, blocks or logs.
    pub fn process<'a, I, O, A>(&mut self, inputs: &[I], outputs: &mut [O], automation: A) -> BlockStatus
    where
        I: AsRef<[f32]>,
        O: AsMut<[f32]>,
        A: IntoIterator<Item = (&'a str, f32)>,
    {
        if self.state.halt.is_some() {
            return BlockStatus::Stopped;
        }

        if let Err(fault) = self.state.drain(&mut self.rx) {
            return BlockStatus::Faulted(fault);
        }
        if self.state.halt.is_some() {
            return BlockStatus::Stopped;
        }

        let plan = &self.state.plan;
        let len = plan.block_len();
        if inputs.len() < plan.inputs()
            || outputs.len() < plan.outputs()
            || inputs[..plan.inputs()].iter().any(|c| c.as_ref().len() < len)
            || outputs[..plan.outputs()].iter_mut().any(|c| c.as_mut().len() < len)
        {
            return BlockStatus::Skipped;
        }

        for (ch, input) in inputs.iter().take(plan.inputs()).enumerate() {
            if let Some(buf) = plan.input_buffer(ch) {
                self.state.arena.write_samples(buf, input.as_ref());
            }
        }

        for (path, value) in automation {
            self.state.automate(path, value);
        }

        if let Err(fault) = self.state.render(len) {
            self.state.halt = Some(Halt::Faulted(fault));
            return BlockStatus::Faulted(fault);
        }
        self.blocks_rendered += 1;

        if self.blocks_rendered % self.bargraph_interval == 0 {
            self.state.read_back(&mut self.readback_tx);
        }

        let plan = &self.state.plan;
        for (ch, output) in outputs.iter_mut().take(plan.outputs()).enumerate() {
            if let Some(buf) = plan.output_buffer(ch) {
                self.state.arena.read_samples(buf, output.as_mut());
            }
        }

        BlockStatus::Rendered
    }

    /// [`process`](Self::process) over owned host buffers, without automation.
    pub fn process_block(&mut self, input: &AudioInput, output: &mut AudioOutput) -> BlockStatus {
        self.process(&input.buffers, &mut output.buffers, std::iter::empty())
    }

    /// Current value of a control read from instance memory.
    ///
    /// Instrument controls report voice 0 (or the mono instance); effect
    /// controls report the effect instance.
    pub fn parameter(&self, path: &str) -> Option<f32> {
        self.state.read(path)
    }

    pub fn voices(&self) -> Option<&VoiceManager> {
        self.state.voices.as_ref()
    }

    /// State of every voice, in index order. Empty in mono mode.
    pub fn voice_states(&self) -> Vec<VoiceState> {
        self.voices()
            .map(|v| v.states().collect())
            .unwrap_or_default()
    }

    pub fn plan(&self) -> &MemoryPlan {
        &self.state.plan
    }

    pub fn table(&self) -> &ParameterTable {
        &self.state.table
    }

    pub fn has_effect(&self) -> bool {
        self.state.effect.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.state.halt.is_some()
    }

    pub fn halt(&self) -> Option<Halt> {
        self.state.halt
    }

    pub fn blocks_rendered(&self) -> u64 {
        self.blocks_rendered
    }
}

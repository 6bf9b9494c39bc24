/*
Arena Layout
============

A compiled module never sees host buffers directly. It receives byte
addresses of *pointer tables* and follows one word per channel to find the
sample block it should read or write. Everything lives in one arena:

Monophonic (one instance, placed first)

    ┌──────────┬────────┬─────────┬───────────┬────────────┐
    │ instance │ in ptr │ out ptr │ in samples│ out samples│
    └──────────┴────────┴─────────┴───────────┴────────────┘

Polyphonic (V voices + optional effect, instances last)

    ┌────────┬─────────┬─────────┬───────────┬────────────┬────────────┬─────┬─────┬───┬────────┐
    │ in ptr │ out ptr │ mix ptr │ in samples│ out samples│ mix samples│ v0  │ v1  │ … │ effect │
    └────────┴─────────┴─────────┴───────────┴────────────┴────────────┴─────┴─────┴───┴────────┘

Each voice computes into the *mixing* buffers; the host then adds them into
the output buffers, which double as the accumulator the effect runs on.


Sizing
------

  - V is max(4, requested) whenever polyphony is requested, leaving headroom
    to reconfigure without re-planning.
  - Region starts are aligned to max(pointer width, sample width); instance
    footprints are padded to the same alignment.
  - The arena size is the smallest power-of-two number of pages covering every
    region, never fewer than two pages. The sandbox memory can only grow, so a
    power-of-two page count keeps later growth cheap.

The plan is computed once and never mutated.
*/

use std::ops::Range;

/// Size of one sandbox memory page in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 65_536;
/// Smallest arena, in pages.
pub const MIN_PAGES: usize = 2;
/// Smallest voice count used for polyphonic sizing.
pub const MIN_POLY_VOICES: usize = 4;
/// Width of one sample in bytes (32-bit float).
pub const SAMPLE_WIDTH: usize = 4;

/// Width of one pointer-table word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PtrWidth {
    #[default]
    Four,
    Eight,
}

impl PtrWidth {
    pub fn bytes(self) -> usize {
        match self {
            PtrWidth::Four => 4,
            PtrWidth::Eight => 8,
        }
    }

    pub fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            4 => Some(PtrWidth::Four),
            8 => Some(PtrWidth::Eight),
            _ => None,
        }
    }
}

/// Monophonic vs. polyphonic arrangement of instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polyphony {
    Mono,
    Poly { voices: usize },
}

impl Polyphony {
    /// Voice count actually planned for a requested count (0 = mono).
    pub fn for_requested(requested: usize) -> Self {
        if requested == 0 {
            Polyphony::Mono
        } else {
            Polyphony::Poly {
                voices: requested.max(MIN_POLY_VOICES),
            }
        }
    }

    pub fn voices(self) -> usize {
        match self {
            Polyphony::Mono => 0,
            Polyphony::Poly { voices } => voices,
        }
    }

    pub fn is_poly(self) -> bool {
        matches!(self, Polyphony::Poly { .. })
    }
}

/// One block of samples for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleBuffer {
    offset: usize,
    frames: usize,
    sample_width: usize,
}

impl SampleBuffer {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn sample_width(&self) -> usize {
        self.sample_width
    }

    pub fn byte_len(&self) -> usize {
        self.frames * self.sample_width
    }
}

/// The state block of one module instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceRegion {
    offset: usize,
    size: usize,
}

impl InstanceRegion {
    pub fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// Base address handed to the compiled code.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Footprint declared by the module (without alignment padding).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Absolute address of a field at `index` bytes into the instance.
    ///
    /// `None` if a 4-byte value at `index` would not fit inside the footprint.
    pub fn field(&self, index: usize) -> Option<usize> {
        if index.checked_add(4)? <= self.size {
            Some(self.offset + index)
        } else {
            None
        }
    }
}

/// A table of buffer addresses, one word per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerTable {
    offset: usize,
    entries: usize,
    width: PtrWidth,
}

impl PointerTable {
    /// Address handed to the compiled code.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Address of the word for `channel`.
    pub fn slot(&self, channel: usize) -> Option<usize> {
        (channel < self.entries).then(|| self.offset + channel * self.width.bytes())
    }

    fn byte_len(&self) -> usize {
        self.entries * self.width.bytes()
    }
}

/// Names every region of a plan, for inspection and overlap checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Instance,
    InputTable,
    OutputTable,
    MixingTable,
    InputSamples,
    OutputSamples,
    MixingSamples,
    Voice(usize),
    Effect,
}

/// Errors that can occur when planning an arena
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Block length must be at least one sample
    ZeroBlockLength,
    /// Page size must be non-zero
    ZeroPageSize,
    /// Only 32-bit samples are supported
    UnsupportedSampleWidth(usize),
    /// The arena does not fit in the address space
    TooLarge,
}

impl std::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutError::ZeroBlockLength => write!(f, "block length must be at least 1 sample"),
            LayoutError::ZeroPageSize => write!(f, "page size must be non-zero"),
            LayoutError::UnsupportedSampleWidth(w) => {
                write!(f, "unsupported sample width: {} bytes (expected {})", w, SAMPLE_WIDTH)
            }
            LayoutError::TooLarge => write!(f, "arena layout overflows the address space"),
        }
    }
}

impl std::error::Error for LayoutError {}

/// Everything the planner needs to know about a module and its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutRequest {
    pub instance_size: usize,
    pub inputs: usize,
    pub outputs: usize,
    /// Requested voices; 0 selects monophonic mode.
    pub voices: usize,
    pub block_len: usize,
    pub ptr_width: PtrWidth,
    pub sample_width: usize,
    /// Footprint of the companion effect instance, if any. Ignored in mono mode.
    pub effect_size: Option<usize>,
    pub page_size: usize,
}

impl LayoutRequest {
    /// Monophonic request with 32-bit pointers and samples.
    pub fn new(instance_size: usize, inputs: usize, outputs: usize, block_len: usize) -> Self {
        Self {
            instance_size,
            inputs,
            outputs,
            voices: 0,
            block_len,
            ptr_width: PtrWidth::Four,
            sample_width: SAMPLE_WIDTH,
            effect_size: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn voices(mut self, voices: usize) -> Self {
        self.voices = voices;
        self
    }

    pub fn effect(mut self, effect_size: usize) -> Self {
        self.effect_size = Some(effect_size);
        self
    }

    pub fn ptr_width(mut self, width: PtrWidth) -> Self {
        self.ptr_width = width;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn sample_width(mut self, width: usize) -> Self {
        self.sample_width = width;
        self
    }

    pub fn plan(&self) -> Result<MemoryPlan, LayoutError> {
        MemoryPlan::new(self)
    }
}

/// Immutable map of the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryPlan {
    polyphony: Polyphony,
    block_len: usize,
    sample_width: usize,
    ptr_width: PtrWidth,
    inputs_table: PointerTable,
    outputs_table: PointerTable,
    mixing_table: Option<PointerTable>,
    input_samples: usize,
    output_samples: usize,
    mixing_samples: Option<usize>,
    inputs: usize,
    outputs: usize,
    instances: usize,
    instance_stride: usize,
    instance_size: usize,
    effect: Option<InstanceRegion>,
    used: usize,
    page_size: usize,
    arena_size: usize,
}

/// Bump cursor with overflow checks.
struct Cursor {
    at: usize,
    align: usize,
}

impl Cursor {
    fn take(&mut self, len: usize) -> Result<usize, LayoutError> {
        let start = align_up(self.at, self.align)?;
        self.at = start.checked_add(len).ok_or(LayoutError::TooLarge)?;
        Ok(start)
    }
}

fn align_up(value: usize, align: usize) -> Result<usize, LayoutError> {
    value
        .checked_next_multiple_of(align)
        .ok_or(LayoutError::TooLarge)
}

fn mul(a: usize, b: usize) -> Result<usize, LayoutError> {
    a.checked_mul(b).ok_or(LayoutError::TooLarge)
}

impl MemoryPlan {
    pub fn new(req: &LayoutRequest) -> Result<Self, LayoutError> {
        if req.block_len == 0 {
            return Err(LayoutError::ZeroBlockLength);
        }
        if req.page_size == 0 {
            return Err(LayoutError::ZeroPageSize);
        }
        if req.sample_width != SAMPLE_WIDTH {
            return Err(LayoutError::UnsupportedSampleWidth(req.sample_width));
        }

        let polyphony = Polyphony::for_requested(req.voices);
        let align = req.ptr_width.bytes().max(req.sample_width);
        let stride = align_up(req.instance_size, align)?;
        let channel_bytes = mul(req.block_len, req.sample_width)?;
        let table = |offset, entries| PointerTable {
            offset,
            entries,
            width: req.ptr_width,
        };

        let mut cursor = Cursor { at: 0, align };

        // Mono: the single instance sits in front of everything else.
        let mono_instance = match polyphony {
            Polyphony::Mono => Some(cursor.take(stride)?),
            Polyphony::Poly { .. } => None,
        };

        let ptr = req.ptr_width.bytes();
        let inputs_table = table(cursor.take(mul(req.inputs, ptr)?)?, req.inputs);
        let outputs_table = table(cursor.take(mul(req.outputs, ptr)?)?, req.outputs);
        let mixing_table = match polyphony {
            Polyphony::Poly { .. } => Some(table(cursor.take(mul(req.outputs, ptr)?)?, req.outputs)),
            Polyphony::Mono => None,
        };

        let input_samples = cursor.take(mul(req.inputs, channel_bytes)?)?;
        let output_samples = cursor.take(mul(req.outputs, channel_bytes)?)?;
        let mixing_samples = match polyphony {
            Polyphony::Poly { .. } => Some(cursor.take(mul(req.outputs, channel_bytes)?)?),
            Polyphony::Mono => None,
        };

        let instances = match (mono_instance, polyphony) {
            (Some(offset), _) => offset,
            (None, polyphony) => cursor.take(mul(stride, polyphony.voices())?)?,
        };

        let effect = match (polyphony, req.effect_size) {
            (Polyphony::Poly { .. }, Some(size)) => {
                let padded = align_up(size, align)?;
                Some(InstanceRegion::new(cursor.take(padded)?, size))
            }
            _ => None,
        };

        let used = cursor.at;
        let pages = used
            .div_ceil(req.page_size)
            .checked_next_power_of_two()
            .ok_or(LayoutError::TooLarge)?
            .max(MIN_PAGES);
        let arena_size = mul(pages, req.page_size)?;

        Ok(Self {
            polyphony,
            block_len: req.block_len,
            sample_width: req.sample_width,
            ptr_width: req.ptr_width,
            inputs_table,
            outputs_table,
            mixing_table,
            input_samples,
            output_samples,
            mixing_samples,
            inputs: req.inputs,
            outputs: req.outputs,
            instances,
            instance_stride: stride,
            instance_size: req.instance_size,
            effect,
            used,
            page_size: req.page_size,
            arena_size,
        })
    }

    pub fn polyphony(&self) -> Polyphony {
        self.polyphony
    }

    pub fn block_len(&self) -> usize {
        self.block_len
    }

    pub fn ptr_width(&self) -> PtrWidth {
        self.ptr_width
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    /// Total arena size in bytes (a power-of-two number of pages).
    pub fn arena_size(&self) -> usize {
        self.arena_size
    }

    pub fn pages(&self) -> usize {
        self.arena_size / self.page_size
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Bytes actually covered by regions, before rounding to pages.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    pub fn inputs_table(&self) -> PointerTable {
        self.inputs_table
    }

    pub fn outputs_table(&self) -> PointerTable {
        self.outputs_table
    }

    /// Pointer table of the per-voice mixing buffers (polyphonic only).
    pub fn mixing_table(&self) -> Option<PointerTable> {
        self.mixing_table
    }

    fn buffer(&self, base: usize, channel: usize, channels: usize) -> Option<SampleBuffer> {
        (channel < channels).then(|| SampleBuffer {
            offset: base + channel * self.block_len * self.sample_width,
            frames: self.block_len,
            sample_width: self.sample_width,
        })
    }

    pub fn input_buffer(&self, channel: usize) -> Option<SampleBuffer> {
        self.buffer(self.input_samples, channel, self.inputs)
    }

    pub fn output_buffer(&self, channel: usize) -> Option<SampleBuffer> {
        self.buffer(self.output_samples, channel, self.outputs)
    }

    pub fn mixing_buffer(&self, channel: usize) -> Option<SampleBuffer> {
        self.mixing_samples
            .and_then(|base| self.buffer(base, channel, self.outputs))
    }

    pub fn input_buffers(&self) -> impl Iterator<Item = SampleBuffer> + '_ {
        (0..self.inputs).filter_map(|ch| self.input_buffer(ch))
    }

    pub fn output_buffers(&self) -> impl Iterator<Item = SampleBuffer> + '_ {
        (0..self.outputs).filter_map(|ch| self.output_buffer(ch))
    }

    /// Pairs of (output, mixing) buffers per channel. Empty in mono mode.
    pub fn mix_pairs(&self) -> impl Iterator<Item = (SampleBuffer, SampleBuffer)> + '_ {
        (0..self.outputs).filter_map(|ch| Some((self.output_buffer(ch)?, self.mixing_buffer(ch)?)))
    }

    /// Number of module instances excluding the effect (1 in mono mode).
    pub fn instance_count(&self) -> usize {
        match self.polyphony {
            Polyphony::Mono => 1,
            Polyphony::Poly { voices } => voices,
        }
    }

    /// The single instance of a monophonic plan, or voice `index` of a polyphonic one.
    pub fn voice_instance(&self, index: usize) -> Option<InstanceRegion> {
        (index < self.instance_count()).then(|| {
            InstanceRegion::new(self.instances + index * self.instance_stride, self.instance_size)
        })
    }

    pub fn voice_instances(&self) -> impl Iterator<Item = InstanceRegion> + '_ {
        (0..self.instance_count()).filter_map(|i| self.voice_instance(i))
    }

    pub fn effect_instance(&self) -> Option<InstanceRegion> {
        self.effect
    }

    /// Every non-empty region with its byte range.
    pub fn regions(&self) -> Vec<(RegionKind, Range<usize>)> {
        let buffers = |base: usize, channels: usize| base..base + channels * self.block_len * self.sample_width;
        let table = |t: PointerTable| t.offset..t.offset + t.byte_len();

        let mut regions = vec![
            (RegionKind::InputTable, table(self.inputs_table)),
            (RegionKind::OutputTable, table(self.outputs_table)),
            (RegionKind::InputSamples, buffers(self.input_samples, self.inputs)),
            (RegionKind::OutputSamples, buffers(self.output_samples, self.outputs)),
        ];
        if let Some(t) = self.mixing_table {
            regions.push((RegionKind::MixingTable, table(t)));
        }
        if let Some(base) = self.mixing_samples {
            regions.push((RegionKind::MixingSamples, buffers(base, self.outputs)));
        }
        match self.polyphony {
            Polyphony::Mono => {
                regions.push((RegionKind::Instance, self.instances..self.instances + self.instance_size));
            }
            Polyphony::Poly { voices } => {
                for v in 0..voices {
                    let start = self.instances + v * self.instance_stride;
                    regions.push((RegionKind::Voice(v), start..start + self.instance_size));
                }
            }
        }
        if let Some(effect) = self.effect {
            regions.push((RegionKind::Effect, effect.offset..effect.offset + effect.size));
        }

        regions.retain(|(_, range)| !range.is_empty());
        regions
    }
}

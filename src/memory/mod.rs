//! Linear memory shared between the host and compiled modules.
//!
//! The [`Arena`] is a flat, zero-initialized byte buffer. Compiled code only
//! ever sees byte addresses into it; every access goes through the checked
//! `load_*`/`store_*` accessors, so a misbehaving module faults instead of
//! corrupting the host. The host side moves whole sample blocks through the
//! typed regions described by a [`MemoryPlan`](plan::MemoryPlan).

pub mod plan;

pub use plan::{
    InstanceRegion, LayoutError, LayoutRequest, MemoryPlan, PointerTable, Polyphony, PtrWidth,
    RegionKind, SampleBuffer,
};

/// Out-of-bounds arena access by compiled code.
///
/// The equivalent of a sandbox trap: the block that produced it is abandoned
/// and the processor stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    /// First byte of the rejected access.
    pub addr: usize,
    /// Width of the access in bytes.
    pub len: usize,
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "out-of-bounds arena access at byte {} ({} bytes)",
            self.addr, self.len
        )
    }
}

impl std::error::Error for Fault {}

/// Byte-addressable memory owned by exactly one block processor.
///
/// Values are stored little-endian, matching the sandbox memory model of the
/// compiled modules.
pub struct Arena {
    bytes: Vec<u8>,
    ptr_width: PtrWidth,
}

impl Arena {
    /// Allocate a zeroed arena of `size` bytes.
    pub fn new(size: usize, ptr_width: PtrWidth) -> Self {
        Self {
            bytes: vec![0; size],
            ptr_width,
        }
    }

    /// Allocate an arena sized for `plan`.
    pub fn for_plan(plan: &MemoryPlan) -> Self {
        Self::new(plan.arena_size(), plan.ptr_width())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn ptr_width(&self) -> PtrWidth {
        self.ptr_width
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn window(&self, addr: usize, len: usize) -> Result<&[u8], Fault> {
        addr.checked_add(len)
            .and_then(|end| self.bytes.get(addr..end))
            .ok_or(Fault { addr, len })
    }

    fn window_mut(&mut self, addr: usize, len: usize) -> Result<&mut [u8], Fault> {
        addr.checked_add(len)
            .and_then(|end| self.bytes.get_mut(addr..end))
            .ok_or(Fault { addr, len })
    }

    pub fn load_u32(&self, addr: usize) -> Result<u32, Fault> {
        let b = self.window(addr, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn store_u32(&mut self, addr: usize, value: u32) -> Result<(), Fault> {
        self.window_mut(addr, 4)?
            .copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn load_f32(&self, addr: usize) -> Result<f32, Fault> {
        self.load_u32(addr).map(f32::from_bits)
    }

    pub fn store_f32(&mut self, addr: usize, value: f32) -> Result<(), Fault> {
        self.store_u32(addr, value.to_bits())
    }

    /// Read one pointer-table word.
    pub fn load_ptr(&self, addr: usize) -> Result<usize, Fault> {
        match self.ptr_width {
            PtrWidth::Four => self.load_u32(addr).map(|p| p as usize),
            PtrWidth::Eight => {
                let b = self.window(addr, 8)?;
                let word = u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
                usize::try_from(word).map_err(|_| Fault { addr, len: 8 })
            }
        }
    }

    /// Write one pointer-table word.
    pub fn store_ptr(&mut self, addr: usize, value: usize) -> Result<(), Fault> {
        match self.ptr_width {
            PtrWidth::Four => {
                let word = u32::try_from(value).map_err(|_| Fault { addr, len: 4 })?;
                self.store_u32(addr, word)
            }
            PtrWidth::Eight => {
                self.window_mut(addr, 8)?
                    .copy_from_slice(&(value as u64).to_le_bytes());
                Ok(())
            }
        }
    }

    /// Zero `len` bytes starting at `addr`.
    pub fn zero(&mut self, addr: usize, len: usize) -> Result<(), Fault> {
        self.window_mut(addr, len)?.fill(0);
        Ok(())
    }

    /// Copy host samples into a planned buffer. Copies at most `buf.frames()` samples.
    pub fn write_samples(&mut self, buf: SampleBuffer, src: &[f32]) {
        debug_assert_eq!(buf.sample_width(), 4);
        let frames = buf.frames().min(src.len());
        let dst = &mut self.bytes[buf.offset()..buf.offset() + frames * 4];
        for (bytes, sample) in dst.chunks_exact_mut(4).zip(src) {
            bytes.copy_from_slice(&sample.to_le_bytes());
        }
    }

    /// Copy a planned buffer out to the host. Copies at most `buf.frames()` samples.
    pub fn read_samples(&self, buf: SampleBuffer, dst: &mut [f32]) {
        debug_assert_eq!(buf.sample_width(), 4);
        let frames = buf.frames().min(dst.len());
        let src = &self.bytes[buf.offset()..buf.offset() + frames * 4];
        for (sample, b) in dst.iter_mut().zip(src.chunks_exact(4)) {
            *sample = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        }
    }

    /// `dst[i] += src[i]` for every sample of two disjoint planned buffers.
    pub fn accumulate(&mut self, dst: SampleBuffer, src: SampleBuffer) {
        debug_assert_eq!(dst.sample_width(), 4);
        let len = dst.byte_len().min(src.byte_len());
        debug_assert!(
            dst.offset() + len <= src.offset() || src.offset() + len <= dst.offset(),
            "accumulate on overlapping buffers"
        );

        let (d, s) = if src.offset() < dst.offset() {
            let (lo, hi) = self.bytes.split_at_mut(dst.offset());
            (&mut hi[..len], &lo[src.offset()..src.offset() + len])
        } else {
            let (lo, hi) = self.bytes.split_at_mut(src.offset());
            (&mut lo[dst.offset()..dst.offset() + len], &hi[..len])
        };

        for (d, s) in d.chunks_exact_mut(4).zip(s.chunks_exact(4)) {
            let sum = f32::from_le_bytes([d[0], d[1], d[2], d[3]])
                + f32::from_le_bytes([s[0], s[1], s[2], s[3]]);
            d.copy_from_slice(&sum.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_access_faults() {
        let mut arena = Arena::new(16, PtrWidth::Four);
        assert!(arena.store_f32(12, 1.0).is_ok());
        assert_eq!(arena.store_f32(13, 1.0), Err(Fault { addr: 13, len: 4 }));
        assert_eq!(arena.load_u32(usize::MAX), Err(Fault { addr: usize::MAX, len: 4 }));
    }

    #[test]
    fn pointer_words_follow_width() {
        let mut narrow = Arena::new(16, PtrWidth::Four);
        narrow.store_ptr(4, 0x1234).unwrap();
        assert_eq!(narrow.load_ptr(4).unwrap(), 0x1234);
        assert_eq!(narrow.load_u32(4).unwrap(), 0x1234);

        let mut wide = Arena::new(16, PtrWidth::Eight);
        wide.store_ptr(8, 0xdead_beef).unwrap();
        assert_eq!(wide.load_ptr(8).unwrap(), 0xdead_beef);
        assert!(wide.store_ptr(12, 1).is_err());
    }

    #[test]
    fn accumulate_sums_both_directions() {
        let plan = LayoutRequest::new(16, 0, 1, 4).voices(1).plan().unwrap();
        let mut arena = Arena::for_plan(&plan);
        let out = plan.output_buffer(0).unwrap();
        let mix = plan.mixing_buffer(0).unwrap();

        arena.write_samples(out, &[1.0, 2.0, 3.0, 4.0]);
        arena.write_samples(mix, &[0.5, 0.5, 0.5, 0.5]);
        arena.accumulate(out, mix);
        arena.accumulate(mix, out);

        let mut got = [0.0; 4];
        arena.read_samples(out, &mut got);
        assert_eq!(got, [1.5, 2.5, 3.5, 4.5]);
        arena.read_samples(mix, &mut got);
        assert_eq!(got, [2.0, 3.0, 4.0, 5.0]);
    }
}

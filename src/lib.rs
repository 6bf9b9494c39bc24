pub mod cache; // Fingerprint-memoized compilation, artifact bundles
pub mod config;
pub mod control; // Host events, parameter routing, event log
pub mod engine; // Real-time block processing
pub mod io;
pub mod memory; // Arena planning and checked access
pub mod module; // Compiled modules and their metadata
pub mod synth; // Voice management and polyphony

pub use cache::{CompileRequest, Fingerprint, ModuleCache};
pub use config::EngineConfig;
pub use control::{ControlHandle, Event};
pub use engine::{BlockProcessor, BlockStatus};
pub use module::{CompiledModule, Kernel};

/// Longest block a processor accepts.
pub const MAX_BLOCK_SIZE: usize = 2048;

//! Fingerprint-memoized access to the external compiler.
//!
//! A [`ModuleCache`] owns a [`Compiler`] and a [`Loader`]. Every request is
//! reduced to a [`Fingerprint`]; a repeated fingerprint returns the module
//! already built without calling the compiler again. After each successful
//! primary compile the cache also tries to build the companion effect, whose
//! failure only costs the effect stage. Entries leave the cache only when the
//! caller evicts them.

mod bundle;
mod fingerprint;

use std::collections::HashMap;
use std::sync::Arc;

pub use bundle::{ArtifactBundle, BundleError};
pub use fingerprint::Fingerprint;

use crate::module::{CompiledModule, Kernel, MemoryMode, MetadataError};

/// Class name the effect companion is compiled under.
pub const EFFECT_CLASS_NAME: &str = "effect";

/// Prelude that matches the instrument's output arity to the effect's input arity.
const EFFECT_ADAPTER: &str = "\
adapt(1,1) = _;
adapt(2,2) = _,_;
adapt(1,2) = _ <: _,_;
adapt(2,1) = _,_ :> _;
adaptor(F,G) = adapt(outputs(F),inputs(G));
dsp_code = environment{
";

/// Source of the effect companion for `source`.
///
/// The effect is whatever `source` defines as `effect`, fed through an
/// adapter so it accepts the instrument's output channels.
pub fn effect_source(source: &str) -> String {
    format!(
        "{}{}\n}};\nprocess = adaptor(dsp_code.process, dsp_code.effect) : dsp_code.effect;\n",
        EFFECT_ADAPTER, source
    )
}

/// What the external compiler hands back for one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOutput {
    pub binary: Vec<u8>,
    /// Metadata JSON document describing the binary.
    pub metadata: String,
}

/// The external source-to-binary compiler.
pub trait Compiler {
    fn compile(
        &self,
        name: &str,
        source: &str,
        args: &[String],
        memory_mode: MemoryMode,
    ) -> Result<CompilerOutput, String>;
}

/// Turns a binary into executable code (the sandbox runtime).
pub trait Loader {
    fn load(&self, binary: &[u8]) -> Result<Arc<dyn Kernel>, String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    pub name: String,
    pub source: String,
    pub args: Vec<String>,
    pub memory_mode: MemoryMode,
}

impl CompileRequest {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            args: Vec::new(),
            memory_mode: MemoryMode::default(),
        }
    }

    pub fn args<S: Into<String>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn memory_mode(mut self, memory_mode: MemoryMode) -> Self {
        self.memory_mode = memory_mode;
        self
    }

    /// Argument list passed to the compiler, class name included.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.args.clone();
        argv.push("-cn".to_string());
        argv.push(self.name.clone());
        argv
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(&self.source, self.memory_mode, &self.argv())
    }

    /// Request for this program's effect companion.
    pub fn effect_companion(&self) -> Self {
        Self {
            name: EFFECT_CLASS_NAME.to_string(),
            source: effect_source(&self.source),
            args: self.args.clone(),
            memory_mode: self.memory_mode,
        }
    }
}

/// Errors that can occur when building a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The external compiler rejected the program
    Compiler(String),
    /// The compiler's metadata document is unusable
    Metadata(MetadataError),
    /// The binary could not be loaded
    Load(String),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Compiler(msg) => write!(f, "compilation failed: {}", msg),
            CompileError::Metadata(e) => write!(f, "{}", e),
            CompileError::Load(msg) => write!(f, "could not load module: {}", msg),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<MetadataError> for CompileError {
    fn from(e: MetadataError) -> Self {
        CompileError::Metadata(e)
    }
}

pub struct ModuleCache<C, L> {
    compiler: C,
    loader: L,
    entries: HashMap<Fingerprint, Arc<CompiledModule>>,
    effects: HashMap<Fingerprint, Arc<CompiledModule>>,
    hits: u64,
    misses: u64,
}

impl<C: Compiler, L: Loader> ModuleCache<C, L> {
    pub fn new(compiler: C, loader: L) -> Self {
        Self {
            compiler,
            loader,
            entries: HashMap::new(),
            effects: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Return the module for `request`, compiling it on first use.
    ///
    /// Errors are returned as-is and nothing is cached for a failed request.
    pub fn get_or_compile(&mut self, request: &CompileRequest) -> Result<Arc<CompiledModule>, CompileError> {
        let fingerprint = request.fingerprint();
        if let Some(module) = self.entries.get(&fingerprint) {
            self.hits += 1;
            log::debug!(target: "saavy_host::cache", "hit {} ({})", request.name, fingerprint.short());
            return Ok(Arc::clone(module));
        }
        self.misses += 1;

        let mut module = self.build(request, fingerprint.clone())?;
        if let Some(effect) = self.compile_effect(request) {
            module = module.with_effect(effect);
        }
        log::info!(
            target: "saavy_host::cache",
            "compiled {} ({}, {} bytes{})",
            request.name,
            fingerprint.short(),
            module.binary().len(),
            if module.effect().is_some() { ", with effect" } else { "" }
        );

        let module = Arc::new(module);
        self.entries.insert(fingerprint, Arc::clone(&module));
        Ok(module)
    }

    fn build(&self, request: &CompileRequest, fingerprint: Fingerprint) -> Result<CompiledModule, CompileError> {
        let output = self
            .compiler
            .compile(&request.name, &request.source, &request.argv(), request.memory_mode)
            .map_err(CompileError::Compiler)?;
        let kernel = self.loader.load(&output.binary).map_err(CompileError::Load)?;

        Ok(CompiledModule::new(
            request.name.clone(),
            fingerprint,
            request.source.clone(),
            output.binary,
            output.metadata,
            kernel,
        )?)
    }

    fn compile_effect(&mut self, request: &CompileRequest) -> Option<Arc<CompiledModule>> {
        let effect_request = request.effect_companion();
        let fingerprint = effect_request.fingerprint();
        if let Some(effect) = self.effects.get(&fingerprint) {
            return Some(Arc::clone(effect));
        }

        match self.build(&effect_request, fingerprint.clone()) {
            Ok(effect) => {
                let effect = Arc::new(effect);
                self.effects.insert(fingerprint, Arc::clone(&effect));
                Some(effect)
            }
            Err(e) => {
                log::warn!(target: "saavy_host::cache", "no effect for {}: {}", request.name, e);
                None
            }
        }
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<CompiledModule>> {
        self.entries.get(fingerprint).cloned()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    /// Drop one module and its effect companion. Processors already holding it are unaffected.
    pub fn evict(&mut self, fingerprint: &Fingerprint) -> Option<Arc<CompiledModule>> {
        let module = self.entries.remove(fingerprint)?;
        if let Some(effect) = module.effect() {
            self.effects.remove(effect.fingerprint());
        }
        log::debug!(target: "saavy_host::cache", "evicted {} ({})", module.name(), fingerprint.short());
        Some(module)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.effects.clear();
    }

    /// Portable copy of a cached module.
    pub fn export(&self, fingerprint: &Fingerprint) -> Option<ArtifactBundle> {
        self.entries
            .get(fingerprint)
            .map(|module| ArtifactBundle::from_module(module))
    }

    /// Rebuild a module from a bundle without invoking the compiler.
    ///
    /// An already cached fingerprint returns the cached module. A bundled
    /// effect that fails to load is dropped, as after a failed effect compile.
    pub fn import(&mut self, bundle: ArtifactBundle) -> Result<Arc<CompiledModule>, CompileError> {
        if let Some(module) = self.entries.get(&bundle.fingerprint) {
            return Ok(Arc::clone(module));
        }

        let ArtifactBundle {
            fingerprint,
            name,
            binary,
            source,
            metadata,
            effect,
        } = bundle;

        let kernel = self.loader.load(&binary).map_err(CompileError::Load)?;
        let mut module = CompiledModule::new(name, fingerprint.clone(), source, binary, metadata, kernel)?;

        if let Some(effect) = effect {
            match self.import_effect(*effect) {
                Ok(effect) => module = module.with_effect(effect),
                Err(e) => log::warn!(target: "saavy_host::cache", "dropping bundled effect: {}", e),
            }
        }

        log::info!(target: "saavy_host::cache", "imported {} ({})", module.name(), fingerprint.short());
        let module = Arc::new(module);
        self.entries.insert(fingerprint, Arc::clone(&module));
        Ok(module)
    }

    fn import_effect(&mut self, bundle: ArtifactBundle) -> Result<Arc<CompiledModule>, CompileError> {
        if let Some(effect) = self.effects.get(&bundle.fingerprint) {
            return Ok(Arc::clone(effect));
        }
        let kernel = self.loader.load(&bundle.binary).map_err(CompileError::Load)?;
        let effect = Arc::new(CompiledModule::new(
            bundle.name,
            bundle.fingerprint.clone(),
            bundle.source,
            bundle.binary,
            bundle.metadata,
            kernel,
        )?);
        self.effects.insert(bundle.fingerprint, Arc::clone(&effect));
        Ok(effect)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }
}

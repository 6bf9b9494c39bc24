use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::module::MemoryMode;

/// Content digest identifying one compilation.
///
/// SHA-256 over the source text, the memory-mode tag and each compiler
/// argument, every field prefixed by its byte length, rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(source: &str, memory_mode: MemoryMode, args: &[String]) -> Self {
        let mut hasher = Sha256::new();
        field(&mut hasher, source);
        field(&mut hasher, memory_mode.tag());
        hasher.update((args.len() as u64).to_le_bytes());
        for arg in args {
            field(&mut hasher, arg);
        }
        Fingerprint(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

fn field(hasher: &mut Sha256, text: &str) {
    hasher.update((text.len() as u64).to_le_bytes());
    hasher.update(text.as_bytes());
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn stable_for_identical_input() {
        let a = Fingerprint::compute("process = _;", MemoryMode::External, &args(&["-ftz", "2"]));
        let b = Fingerprint::compute("process = _;", MemoryMode::External, &args(&["-ftz", "2"]));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn each_input_changes_the_digest() {
        let base = Fingerprint::compute("process = _;", MemoryMode::External, &args(&["-ftz", "2"]));
        let source = Fingerprint::compute("process = *(2);", MemoryMode::External, &args(&["-ftz", "2"]));
        let mode = Fingerprint::compute("process = _;", MemoryMode::Internal, &args(&["-ftz", "2"]));
        let arg = Fingerprint::compute("process = _;", MemoryMode::External, &args(&["-ftz", "1"]));

        assert_ne!(base, source);
        assert_ne!(base, mode);
        assert_ne!(base, arg);
    }

    #[test]
    fn fields_do_not_run_together() {
        let a = Fingerprint::compute("ab", MemoryMode::External, &[]);
        let b = Fingerprint::compute("a", MemoryMode::External, &args(&["b"]));
        assert_ne!(a, b);
    }

    #[test]
    fn argument_boundaries_are_part_of_the_digest() {
        let joined = Fingerprint::compute("process = _;", MemoryMode::External, &args(&["-I a"]));
        let split = Fingerprint::compute("process = _;", MemoryMode::External, &args(&["-I", "a"]));
        let empty = Fingerprint::compute("process = _;", MemoryMode::External, &args(&[""]));
        let none = Fingerprint::compute("process = _;", MemoryMode::External, &[]);

        assert_ne!(joined, split);
        assert_ne!(empty, none);
    }
}

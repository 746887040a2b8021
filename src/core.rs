use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A type-erased, thread-safe container.
pub(crate) type Dynamic = Arc<dyn Any + Send + Sync>;

/// A 32-byte BLAKE3 hash used as a content fingerprint.
///
/// In `tracehouse`, this serves two purposes:
/// 1. It identifies the inputs of a computed artifact, so that equivalent
///    inputs coming from different call sites share one cache entry.
/// 2. It summarizes large immutable inputs (like a whole trace) once, so that
///    they can be hashed cheaply every time they are used as a cache key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for byte in self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }

    /// First eight hex digits, enough to tell entries apart in logs.
    pub fn short(self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(8);
        hex
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl std::fmt::Display for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Adapter that lets any [`std::hash::Hash`] value be fed into BLAKE3.
#[derive(Default)]
pub(crate) struct Blake3Hasher(blake3::Hasher);

impl From<Blake3Hasher> for Hash32 {
    fn from(value: Blake3Hasher) -> Self {
        let bytes: [u8; 32] = value.0.finalize().into();
        Hash32::from(bytes)
    }
}

impl std::hash::Hasher for Blake3Hasher {
    fn finish(&self) -> u64 {
        let mut output = [0u8; 8];
        self.0.finalize_xof().fill(&mut output);
        u64::from_le_bytes(output)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }
}

/// How network and CPU throttling was applied while the trace was recorded.
///
/// Simulated throttling rewrites timings after the fact, so the recorded
/// trace timestamps no longer line up with what the metrics report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottlingMethod {
    /// Throttling is simulated from an unthrottled load.
    #[default]
    Simulate,
    /// Throttling is applied by the browser while loading.
    Devtools,
    /// Throttling is provided by the environment, nothing is applied.
    Provided,
}

/// Typed settings of a single audit run.
///
/// Loading and merging configuration files happens elsewhere; the core only
/// ever sees an already validated value of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub throttling_method: ThrottlingMethod,
}

/// The result of a computation that may not apply to the audited page.
///
/// `NotApplicable` is not a failure. Callers are expected to skip the audit
/// and report the reason, never to treat it as an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "camelCase")]
pub enum Outcome<T> {
    Applicable(T),
    NotApplicable(String),
}

impl<T> Outcome<T> {
    pub fn not_applicable(reason: impl Into<String>) -> Self {
        Outcome::NotApplicable(reason.into())
    }

    pub fn is_applicable(&self) -> bool {
        matches!(self, Outcome::Applicable(_))
    }

    pub fn applicable(self) -> Option<T> {
        match self {
            Outcome::Applicable(value) => Some(value),
            Outcome::NotApplicable(_) => None,
        }
    }

    /// Borrowing counterpart of [`applicable`](Self::applicable), usable on
    /// a shared `Arc<Outcome<T>>` handed out by the cache.
    pub fn applicable_ref(&self) -> Option<&T> {
        match self {
            Outcome::Applicable(value) => Some(value),
            Outcome::NotApplicable(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Applicable(_) => None,
            Outcome::NotApplicable(reason) => Some(reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Applicable(value) => Outcome::Applicable(f(value)),
            Outcome::NotApplicable(reason) => Outcome::NotApplicable(reason),
        }
    }
}

#[cfg(test)]
mod test {
    use std::hash::Hash;

    use super::*;

    #[test]
    fn test_hash_hex() {
        let hash = Hash32::hash(b"trace");
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash.short(), hex[..8]);
    }

    #[test]
    fn test_hasher_is_deterministic() {
        let digest = |value: &(&str, u64)| {
            let mut hasher = Blake3Hasher::default();
            value.hash(&mut hasher);
            Hash32::from(hasher)
        };

        assert_eq!(digest(&("tasks", 1)), digest(&("tasks", 1)));
        assert_ne!(digest(&("tasks", 1)), digest(&("tasks", 2)));
    }

    #[test]
    fn test_settings_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.throttling_method, ThrottlingMethod::Simulate);

        let settings: Settings =
            serde_json::from_str(r#"{"throttlingMethod":"devtools"}"#).unwrap();
        assert_eq!(settings.throttling_method, ThrottlingMethod::Devtools);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome: Outcome<u32> = Outcome::not_applicable("no interaction");
        assert_eq!(
            serde_json::to_string(&outcome).unwrap(),
            r#"{"status":"notApplicable","value":"no interaction"}"#
        );
        assert_eq!(Outcome::Applicable(3).map(|v| v * 2).applicable(), Some(6));
    }

    #[test]
    fn test_outcome_behind_arc() {
        let shared = Arc::new(Outcome::Applicable(String::from("breakdown")));
        assert_eq!(shared.applicable_ref().map(String::as_str), Some("breakdown"));
        assert_eq!(shared.reason(), None);

        let skipped: Arc<Outcome<String>> = Arc::new(Outcome::not_applicable("simulated"));
        assert_eq!(skipped.applicable_ref(), None);
        assert_eq!(skipped.reason(), Some("simulated"));
    }
}

//! Persisted snapshot of upstream module versions.
//!
//! The file is one contiguous little-endian buffer:
//!
//! ```text
//! HEADER
//!   u8        module_count        (0-255)
//!   u64       cache_time          (unix seconds, UTC)
//! BODY (module_count times)
//!   u16       name_length
//!   u16       version_length      (0 = empty version)
//!   [u8]      name                (UTF-8)
//!   [u8]      version             (UTF-8)
//! ```
//!
//! An absent, truncated or inconsistent file loads as a cold cache
//! (epoch-zero timestamp, no modules). Bytes after the declared body are
//! ignored.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Largest number of modules the header's count field can describe.
pub const MAX_MODULES: usize = u8::MAX as usize;

/// Largest name or version the length fields can describe, in bytes.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache holds {0} modules, the format allows at most {max}", max = MAX_MODULES)]
    TooManyModules(usize),

    #[error(
        "{field} of module '{module}' is {len} bytes, the format allows at most {max}",
        max = MAX_FIELD_LEN
    )]
    FieldTooLong {
        module: String,
        field: &'static str,
        len: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cached upstream versions and when they were observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    /// Unix seconds (UTC) of the observation; 0 means "never".
    pub cached_at: u64,
    /// Module name to version; an empty version means "unknown".
    pub modules: BTreeMap<String, String>,
}

impl CacheSnapshot {
    pub fn new(cached_at: SystemTime, modules: BTreeMap<String, String>) -> Self {
        let cached_at = cached_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self { cached_at, modules }
    }

    pub fn cached_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.cached_at)
    }

    /// True when the snapshot is older than `ttl` at `now`.
    pub fn is_stale(&self, ttl: Duration, now: SystemTime) -> bool {
        match now.duration_since(self.cached_at()) {
            Ok(age) => age > ttl,
            // Timestamp in the future: the clock moved, refresh.
            Err(_) => true,
        }
    }

    /// True when any of `modules` has no known version or the snapshot is stale.
    pub fn needs_refresh(&self, modules: &BTreeSet<String>, ttl: Duration, now: SystemTime) -> bool {
        let missing = modules
            .iter()
            .any(|m| self.modules.get(m).map_or(true, String::is_empty));
        missing || self.is_stale(ttl, now)
    }

    /// Snapshot of a fresh registry pass taken at `now`.
    ///
    /// Keys of `upstream` are the working set; other modules are dropped.
    /// A failed lookup keeps the previous known version, or leaves the
    /// module out when there is none.
    pub fn merge(&self, upstream: BTreeMap<String, Option<String>>, now: SystemTime) -> Self {
        let modules = upstream
            .into_iter()
            .filter_map(|(module, version)| {
                let version = version
                    .or_else(|| self.modules.get(&module).cloned())
                    .filter(|v| !v.is_empty())?;
                Some((module, version))
            })
            .collect();
        Self::new(now, modules)
    }

    /// Serialize to the on-disk layout.
    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        let count = u8::try_from(self.modules.len())
            .map_err(|_| CacheError::TooManyModules(self.modules.len()))?;

        let body_len: usize = self.modules.iter().map(|(n, v)| 4 + n.len() + v.len()).sum();
        let mut buf = Vec::with_capacity(9 + body_len);
        buf.push(count);
        buf.extend_from_slice(&self.cached_at.to_le_bytes());

        for (name, version) in &self.modules {
            let name_len = field_len(name, "name", name)?;
            let version_len = field_len(name, "version", version)?;
            buf.extend_from_slice(&name_len.to_le_bytes());
            buf.extend_from_slice(&version_len.to_le_bytes());
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(version.as_bytes());
        }

        Ok(buf)
    }

    /// Parse the on-disk layout; `None` if the buffer is malformed.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let mut reader = Reader { data, pos: 0 };

        let count = reader.take(1)?[0];
        let cached_at = u64::from_le_bytes(reader.take(8)?.try_into().ok()?);

        let mut modules = BTreeMap::new();
        for _ in 0..count {
            let name_len = reader.u16()?;
            let version_len = reader.u16()?;
            let name = std::str::from_utf8(reader.take(name_len.into())?).ok()?;
            let version = std::str::from_utf8(reader.take(version_len.into())?).ok()?;
            modules.insert(name.to_string(), version.to_string());
        }

        Some(Self { cached_at, modules })
    }
}

fn field_len(module: &str, field: &'static str, value: &str) -> Result<u16, CacheError> {
    u16::try_from(value.len()).map_err(|_| CacheError::FieldTooLong {
        module: module.to_string(),
        field,
        len: value.len(),
    })
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let out = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(out)
    }

    fn u16(&mut self) -> Option<u16> {
        Some(u16::from_le_bytes(self.take(2)?.try_into().ok()?))
    }
}

/// File-backed module version cache.
#[derive(Debug, Clone)]
pub struct ModuleVersionCache {
    path: PathBuf,
}

impl ModuleVersionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cache file. Never fails; problems yield an empty snapshot.
    pub fn load(&self) -> CacheSnapshot {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(path = ?self.path, error = %e, "Module cache unavailable");
                return CacheSnapshot::default();
            }
        };

        CacheSnapshot::decode(&data).unwrap_or_else(|| {
            tracing::debug!(path = ?self.path, len = data.len(), "Module cache is corrupt, ignoring");
            CacheSnapshot::default()
        })
    }

    /// Replace the cache file with `snapshot`.
    ///
    /// The buffer goes to a sibling temp file first and is renamed over the
    /// target, so readers see either the old or the new file.
    pub fn save(&self, snapshot: &CacheSnapshot) -> Result<(), CacheError> {
        let buf = snapshot.encode()?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("bin.tmp");
        fs::write(&temp_path, &buf)?;
        fs::rename(&temp_path, &self.path)?;

        tracing::debug!(
            path = ?self.path,
            modules = snapshot.modules.len(),
            "Saved module cache"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CacheSnapshot {
        let mut modules = BTreeMap::new();
        modules.insert("plg-build".to_string(), "1.2.0".to_string());
        modules.insert("plg-lint".to_string(), String::new());
        modules.insert("zürich-tools".to_string(), "0.1.dev0".to_string());
        CacheSnapshot {
            cached_at: 1_700_000_000,
            modules,
        }
    }

    #[test]
    fn test_layout() {
        let mut modules = BTreeMap::new();
        modules.insert("ab".to_string(), "1".to_string());
        let snapshot = CacheSnapshot {
            cached_at: 0x0102,
            modules,
        };

        let buf = snapshot.encode().unwrap();
        assert_eq!(
            buf,
            [1, 0x02, 0x01, 0, 0, 0, 0, 0, 0, 2, 0, 1, 0, b'a', b'b', b'1']
        );
    }

    #[test]
    fn test_round_trip_keeps_empty_versions() {
        let snapshot = sample();
        let decoded = CacheSnapshot::decode(&snapshot.encode().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
        assert_eq!(decoded.modules.get("plg-lint").map(String::as_str), Some(""));
    }

    #[test]
    fn test_every_truncation_is_cold() {
        let buf = sample().encode().unwrap();
        for cut in 0..buf.len() {
            assert_eq!(CacheSnapshot::decode(&buf[..cut]), None, "cut at {cut}");
        }
    }

    #[test]
    fn test_declared_length_past_end() {
        // One module whose name claims 300 bytes.
        let mut buf = vec![1];
        buf.extend_from_slice(&5u64.to_le_bytes());
        buf.extend_from_slice(&300u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(b"short");
        assert_eq!(CacheSnapshot::decode(&buf), None);
    }

    #[test]
    fn test_capacity_limits() {
        let mut snapshot = CacheSnapshot::default();
        for i in 0..=MAX_MODULES {
            snapshot.modules.insert(format!("m{i}"), String::new());
        }
        assert!(matches!(snapshot.encode(), Err(CacheError::TooManyModules(256))));

        snapshot.modules.pop_first();
        assert_eq!(snapshot.encode().unwrap()[0], u8::MAX);

        let mut snapshot = CacheSnapshot::default();
        snapshot
            .modules
            .insert("big".to_string(), "x".repeat(MAX_FIELD_LEN + 1));
        assert!(matches!(
            snapshot.encode(),
            Err(CacheError::FieldTooLong { field: "version", .. })
        ));
    }

    #[test]
    fn test_staleness() {
        let snapshot = CacheSnapshot::new(UNIX_EPOCH + Duration::from_secs(1000), BTreeMap::new());
        let ttl = Duration::from_secs(60);

        assert!(!snapshot.is_stale(ttl, UNIX_EPOCH + Duration::from_secs(1030)));
        assert!(snapshot.is_stale(ttl, UNIX_EPOCH + Duration::from_secs(1061)));
        assert!(snapshot.is_stale(ttl, UNIX_EPOCH + Duration::from_secs(10)));
        assert!(CacheSnapshot::default().is_stale(ttl, SystemTime::now()));
    }

    #[test]
    fn test_merge_keeps_only_the_working_set() {
        let mut previous = CacheSnapshot::default();
        for i in 0..MAX_MODULES {
            previous.modules.insert(format!("old{i}"), "1.0".to_string());
        }
        previous.modules.insert("plg-lint".to_string(), "0.8".to_string());

        let upstream = BTreeMap::from([
            ("plg-build".to_string(), None),
            ("plg-lint".to_string(), None),
            ("plg-pack".to_string(), Some("2.1".to_string())),
        ]);
        let now = UNIX_EPOCH + Duration::from_secs(5000);
        let merged = previous.merge(upstream, now);

        assert_eq!(merged.cached_at, 5000);
        assert_eq!(merged.modules.len(), 2);
        // Failed lookup with nothing cached stays out of the snapshot.
        assert_eq!(merged.modules.get("plg-build"), None);
        assert_eq!(merged.modules["plg-lint"], "0.8");
        assert_eq!(merged.modules["plg-pack"], "2.1");
        assert!(merged.encode().is_ok());
    }

    #[test]
    fn test_needs_refresh() {
        let now = UNIX_EPOCH + Duration::from_secs(1000);
        let ttl = Duration::from_secs(60);
        let snapshot = CacheSnapshot::new(now, BTreeMap::from([
            ("plg-build".to_string(), "1.0".to_string()),
            ("plg-lint".to_string(), String::new()),
        ]));

        let built = BTreeSet::from(["plg-build".to_string()]);
        assert!(!snapshot.needs_refresh(&built, ttl, now));
        assert!(snapshot.needs_refresh(&built, ttl, now + Duration::from_secs(61)));

        // Empty versions from older files count as missing.
        let lint = BTreeSet::from(["plg-lint".to_string()]);
        assert!(snapshot.needs_refresh(&lint, ttl, now));
        let pack = BTreeSet::from(["plg-pack".to_string()]);
        assert!(snapshot.needs_refresh(&pack, ttl, now));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModuleVersionCache::new(dir.path().join("cache").join("pip_modules.bin"));

        assert_eq!(cache.load(), CacheSnapshot::default());

        cache.save(&sample()).unwrap();
        assert_eq!(cache.load(), sample());
        assert!(!cache.path().with_extension("bin.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_loads_cold() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModuleVersionCache::new(dir.path().join("pip_modules.bin"));
        fs::write(cache.path(), [3, 1, 2]).unwrap();
        assert_eq!(cache.load(), CacheSnapshot::default());
    }
}

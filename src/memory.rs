//! In-memory key store.
//!
//! `MemoryStore` implements [`KeyStore`] over a map of keys held in process.
//! It supports mutation through a shared reference, so a store lent to a
//! [`Tree`](crate::Tree) can still be changed underneath it, which is how
//! refresh behaviour is exercised.

use crate::config::DEFAULT_SEPARATOR;
use crate::error::{ExplorerError, Result};
use crate::store::KeyStore;
use crate::utils::eq_ignore_case;
use crate::value::{ValueData, ValueKind};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Handle to a key of a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryKey {
    path: String,
}

impl MemoryKey {
    /// Absolute path of the key.
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug, Clone)]
struct StoredValue {
    name: String,
    kind: ValueKind,
    data: Option<ValueData>,
}

#[derive(Debug, Clone)]
struct KeyEntry {
    /// Path with the casing it was created with.
    path: String,
    /// Direct subkey names in creation order.
    subkeys: Vec<String>,
    values: Vec<StoredValue>,
    denied: bool,
}

impl KeyEntry {
    fn new(path: String) -> Self {
        Self {
            path,
            subkeys: Vec::new(),
            values: Vec::new(),
            denied: false,
        }
    }

    fn find_value(&self, name: &str) -> Option<&StoredValue> {
        self.values.iter().find(|v| eq_ignore_case(&v.name, name))
    }
}

/// A mutable, in-process key store.
///
/// Keys are addressed by absolute path and compared case-insensitively.
/// Subkeys enumerate in the order they were created.
#[derive(Debug)]
pub struct MemoryStore {
    /// Lowercased path -> key.
    keys: RwLock<HashMap<String, KeyEntry>>,
    separator: char,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store using `\` as path separator.
    pub fn new() -> Self {
        Self::with_separator(DEFAULT_SEPARATOR)
    }

    /// Creates an empty store with a custom path separator.
    pub fn with_separator(separator: char) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            separator,
        }
    }

    fn normalize(path: &str) -> String {
        path.to_lowercase()
    }

    fn segments<'a>(&self, path: &'a str) -> Vec<&'a str> {
        path.split(self.separator).filter(|s| !s.is_empty()).collect()
    }

    /// Creates a key and any missing ancestors.
    pub fn create_key(&self, path: &str) -> Result<()> {
        let segments = self.segments(path);
        if segments.is_empty() {
            return Err(ExplorerError::not_found("key", path));
        }

        let mut keys = self.keys.write().expect("key store lock poisoned");
        let mut current = String::new();
        let mut parent: Option<String> = None;

        for segment in segments {
            if !current.is_empty() {
                current.push(self.separator);
            }
            current.push_str(segment);
            let normalized = Self::normalize(&current);

            if !keys.contains_key(&normalized) {
                debug!(path = %current, "Creating key");
                keys.insert(normalized.clone(), KeyEntry::new(current.clone()));
                if let Some(parent) = parent.as_ref().and_then(|p| keys.get_mut(p)) {
                    parent.subkeys.push(segment.to_string());
                }
            }

            // Continue with the canonical casing of existing keys.
            if let Some(entry) = keys.get(&normalized) {
                current = entry.path.clone();
            }
            parent = Some(normalized);
        }

        Ok(())
    }

    /// Removes a key together with all of its descendants.
    pub fn remove_key(&self, path: &str) -> Result<()> {
        let normalized = Self::normalize(path.trim_end_matches(self.separator));
        let mut keys = self.keys.write().expect("key store lock poisoned");

        let entry = keys
            .remove(&normalized)
            .ok_or_else(|| ExplorerError::not_found("key", path))?;

        let descendant_prefix = format!("{}{}", normalized, self.separator);
        keys.retain(|k, _| !k.starts_with(&descendant_prefix));

        if let Some((parent, name)) = entry.path.rsplit_once(self.separator) {
            if let Some(parent) = keys.get_mut(&Self::normalize(parent)) {
                parent.subkeys.retain(|s| !eq_ignore_case(s, name));
            }
        }

        debug!(path = %entry.path, "Removed key");
        Ok(())
    }

    /// Sets a value, creating the key if necessary.
    pub fn set_value(&self, path: &str, name: &str, data: ValueData) -> Result<()> {
        let kind = data.kind();
        self.put_value(path, name, kind, Some(data))
    }

    /// Sets a value that reports `kind` but has no payload.
    pub fn set_absent_value(&self, path: &str, name: &str, kind: ValueKind) -> Result<()> {
        self.put_value(path, name, kind, None)
    }

    /// Sets a value from its registry encoding.
    ///
    /// # Arguments
    ///
    /// * `type_code` - Registry type code (1 = REG_SZ, 4 = REG_DWORD, ...)
    /// * `data` - Raw bytes as stored by the registry
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not valid for the type.
    pub fn set_raw_value(&self, path: &str, name: &str, type_code: u32, data: &[u8]) -> Result<()> {
        let kind = ValueKind::from_u32(type_code);
        let parsed = ValueData::parse(data, kind)?;
        self.put_value(path, name, kind, Some(parsed))
    }

    fn put_value(&self, path: &str, name: &str, kind: ValueKind, data: Option<ValueData>) -> Result<()> {
        self.create_key(path)?;
        let mut keys = self.keys.write().expect("key store lock poisoned");
        let entry = keys
            .get_mut(&Self::normalize(path.trim_end_matches(self.separator)))
            .ok_or_else(|| ExplorerError::not_found("key", path))?;

        let stored = StoredValue {
            name: name.to_string(),
            kind,
            data,
        };
        match entry.values.iter_mut().find(|v| eq_ignore_case(&v.name, name)) {
            Some(existing) => *existing = stored,
            None => entry.values.push(stored),
        }
        Ok(())
    }

    /// Removes a value from a key.
    pub fn remove_value(&self, path: &str, name: &str) -> Result<()> {
        let mut keys = self.keys.write().expect("key store lock poisoned");
        let entry = keys
            .get_mut(&Self::normalize(path.trim_end_matches(self.separator)))
            .ok_or_else(|| ExplorerError::not_found("key", path))?;

        let before = entry.values.len();
        entry.values.retain(|v| !eq_ignore_case(&v.name, name));
        if entry.values.len() == before {
            return Err(ExplorerError::not_found("value", name));
        }
        Ok(())
    }

    /// Marks a key as unreadable: opening it fails with access denied.
    pub fn deny_access(&self, path: &str) -> Result<()> {
        let mut keys = self.keys.write().expect("key store lock poisoned");
        let entry = keys
            .get_mut(&Self::normalize(path.trim_end_matches(self.separator)))
            .ok_or_else(|| ExplorerError::not_found("key", path))?;
        entry.denied = true;
        Ok(())
    }

    /// Opens a key by absolute path.
    pub fn open_root(&self, path: &str) -> Result<MemoryKey> {
        let keys = self.keys.read().expect("key store lock poisoned");
        let entry = keys
            .get(&Self::normalize(path.trim_end_matches(self.separator)))
            .ok_or_else(|| ExplorerError::not_found("key", path))?;
        if entry.denied {
            return Err(ExplorerError::access_denied(&entry.path));
        }
        Ok(MemoryKey {
            path: entry.path.clone(),
        })
    }

    /// Runs `f` against the entry behind an open handle.
    ///
    /// A handle whose key was removed reports an enumeration failure.
    fn with_entry<T>(&self, key: &MemoryKey, f: impl FnOnce(&KeyEntry) -> Result<T>) -> Result<T> {
        let keys = self.keys.read().expect("key store lock poisoned");
        match keys.get(&Self::normalize(&key.path)) {
            Some(entry) => f(entry),
            None => Err(ExplorerError::enumeration(&key.path, "key has been deleted")),
        }
    }
}

impl KeyStore for MemoryStore {
    type Handle = MemoryKey;

    fn key_path(&self, key: &MemoryKey) -> String {
        key.path.clone()
    }

    fn subkey_names(&self, key: &MemoryKey) -> Result<Vec<String>> {
        self.with_entry(key, |entry| Ok(entry.subkeys.clone()))
    }

    fn open_subkey(&self, key: &MemoryKey, name: &str) -> Result<MemoryKey> {
        let child_path = format!("{}{}{}", key.path, self.separator, name);
        let keys = self.keys.read().expect("key store lock poisoned");
        let entry = keys
            .get(&Self::normalize(&child_path))
            .ok_or_else(|| ExplorerError::not_found("key", &child_path))?;
        if entry.denied {
            return Err(ExplorerError::access_denied(&entry.path));
        }
        Ok(MemoryKey {
            path: entry.path.clone(),
        })
    }

    fn subkey_count(&self, key: &MemoryKey) -> Result<usize> {
        self.with_entry(key, |entry| Ok(entry.subkeys.len()))
    }

    fn value_names(&self, key: &MemoryKey) -> Result<Vec<String>> {
        self.with_entry(key, |entry| {
            Ok(entry.values.iter().map(|v| v.name.clone()).collect())
        })
    }

    fn value_count(&self, key: &MemoryKey) -> Result<usize> {
        self.with_entry(key, |entry| Ok(entry.values.len()))
    }

    fn value_kind(&self, key: &MemoryKey, name: &str) -> Result<ValueKind> {
        self.with_entry(key, |entry| {
            entry
                .find_value(name)
                .map(|v| v.kind)
                .ok_or_else(|| ExplorerError::not_found("value", name))
        })
    }

    fn value(&self, key: &MemoryKey, name: &str) -> Result<Option<ValueData>> {
        self.with_entry(key, |entry| {
            entry
                .find_value(name)
                .map(|v| v.data.clone())
                .ok_or_else(|| ExplorerError::not_found("value", name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_key_builds_ancestors_in_order() {
        let store = MemoryStore::new();
        store.create_key("HKCU\\Software\\B").unwrap();
        store.create_key("HKCU\\Software\\A").unwrap();
        store.create_key("hkcu\\software\\b\\Inner").unwrap();

        let root = store.open_root("HKCU").unwrap();
        let software = store.open_subkey(&root, "Software").unwrap();
        assert_eq!(store.subkey_names(&software).unwrap(), vec!["B", "A"]);

        let b = store.open_subkey(&software, "b").unwrap();
        assert_eq!(store.key_path(&b), "HKCU\\Software\\B");
        assert_eq!(store.subkey_count(&b).unwrap(), 1);
    }

    #[test]
    fn test_remove_key_drops_descendants() {
        let store = MemoryStore::new();
        store.create_key("HKLM\\A\\B\\C").unwrap();
        store.remove_key("HKLM\\A\\B").unwrap();

        let root = store.open_root("HKLM").unwrap();
        let a = store.open_subkey(&root, "A").unwrap();
        assert!(store.subkey_names(&a).unwrap().is_empty());
        assert!(store.open_root("HKLM\\A\\B\\C").is_err());
    }

    #[test]
    fn test_denied_key() {
        let store = MemoryStore::new();
        store.create_key("HKLM\\SAM").unwrap();
        store.deny_access("HKLM\\SAM").unwrap();

        let root = store.open_root("HKLM").unwrap();
        let err = store.open_subkey(&root, "SAM").unwrap_err();
        assert!(matches!(err, ExplorerError::AccessDenied { .. }));
    }

    #[test]
    fn test_values() {
        let store = MemoryStore::new();
        store.set_value("HKCU\\Env", "Path", ValueData::ExpandString("%X%".into())).unwrap();
        store.set_raw_value("HKCU\\Env", "Flags", 4, &[0x10, 0, 0, 0]).unwrap();
        store.set_absent_value("HKCU\\Env", "", ValueKind::String).unwrap();

        let key = store.open_root("HKCU\\Env").unwrap();
        assert_eq!(store.value_names(&key).unwrap(), vec!["Path", "Flags", ""]);
        assert_eq!(store.value_kind(&key, "flags").unwrap(), ValueKind::DWord);
        assert_eq!(store.value(&key, "Flags").unwrap(), Some(ValueData::DWord(16)));
        assert_eq!(store.value(&key, "").unwrap(), None);
        assert!(store.value(&key, "Missing").is_err());

        store.remove_value("HKCU\\Env", "Path").unwrap();
        assert_eq!(store.value_count(&key).unwrap(), 2);
    }

    #[test]
    fn test_malformed_raw_value_rejected() {
        let store = MemoryStore::new();
        store.create_key("HKCU\\Env").unwrap();
        assert!(matches!(
            store.set_raw_value("HKCU\\Env", "Short", 4, &[0x10, 0]),
            Err(ExplorerError::TruncatedData { expected: 4, actual: 2 })
        ));
        assert!(matches!(
            store.set_raw_value("HKCU\\Env", "Odd", 1, &[0x41, 0x00, 0x42]),
            Err(ExplorerError::InvalidUtf16)
        ));

        let key = store.open_root("HKCU\\Env").unwrap();
        assert_eq!(store.value_count(&key).unwrap(), 0);
    }

    #[test]
    fn test_deleted_handle_fails_enumeration() {
        let store = MemoryStore::new();
        store.create_key("HKCU\\Gone").unwrap();
        let key = store.open_root("HKCU\\Gone").unwrap();
        store.remove_key("HKCU\\Gone").unwrap();

        let err = store.subkey_names(&key).unwrap_err();
        assert!(matches!(err, ExplorerError::Enumeration { .. }));
    }
}

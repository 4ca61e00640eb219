//! The read-only key store contract consumed by the tree.
//!
//! Implementations wrap whatever actually holds the keys (the live registry,
//! a parsed hive, a remote session). All calls are synchronous and may
//! block; the tree only ever calls them from the thread that owns it.

use crate::error::Result;
use crate::value::{ValueData, ValueKind};

/// Read access to a hierarchical key/value store.
///
/// Handles are owned by the tree node they were opened for and are released
/// by dropping them when the node is discarded.
///
/// # Example
///
/// ```rust
/// use reg_explorer::{KeyStore, MemoryStore, ValueData};
///
/// # fn main() -> reg_explorer::Result<()> {
/// let store = MemoryStore::new();
/// store.set_value("HKCU\\Software\\Vendor", "Version", ValueData::DWord(3))?;
///
/// let root = store.open_root("HKCU")?;
/// assert_eq!(store.subkey_names(&root)?, vec!["Software"]);
/// let software = store.open_subkey(&root, "Software")?;
/// assert_eq!(store.key_path(&software), "HKCU\\Software");
/// # Ok(())
/// # }
/// ```
pub trait KeyStore {
    /// An open key.
    type Handle;

    /// Absolute path of an open key, e.g. `HKEY_CURRENT_USER\Software`.
    fn key_path(&self, key: &Self::Handle) -> String;

    /// Names of the direct subkeys, in store order.
    fn subkey_names(&self, key: &Self::Handle) -> Result<Vec<String>>;

    /// Opens a direct subkey for reading.
    ///
    /// Fails with [`ExplorerError::AccessDenied`](crate::ExplorerError::AccessDenied)
    /// when the caller may not read it.
    fn open_subkey(&self, key: &Self::Handle, name: &str) -> Result<Self::Handle>;

    /// Number of direct subkeys. Used to skip enumeration of leaf keys.
    fn subkey_count(&self, key: &Self::Handle) -> Result<usize>;

    /// Names of the values held by the key, in store order.
    fn value_names(&self, key: &Self::Handle) -> Result<Vec<String>>;

    /// Number of values held by the key.
    fn value_count(&self, key: &Self::Handle) -> Result<usize>;

    /// Kind of the named value.
    fn value_kind(&self, key: &Self::Handle, name: &str) -> Result<ValueKind>;

    /// Payload of the named value, `None` if the store has no data for it.
    fn value(&self, key: &Self::Handle, name: &str) -> Result<Option<ValueData>>;
}

impl<S: KeyStore + ?Sized> KeyStore for &S {
    type Handle = S::Handle;

    fn key_path(&self, key: &Self::Handle) -> String {
        (**self).key_path(key)
    }

    fn subkey_names(&self, key: &Self::Handle) -> Result<Vec<String>> {
        (**self).subkey_names(key)
    }

    fn open_subkey(&self, key: &Self::Handle, name: &str) -> Result<Self::Handle> {
        (**self).open_subkey(key, name)
    }

    fn subkey_count(&self, key: &Self::Handle) -> Result<usize> {
        (**self).subkey_count(key)
    }

    fn value_names(&self, key: &Self::Handle) -> Result<Vec<String>> {
        (**self).value_names(key)
    }

    fn value_count(&self, key: &Self::Handle) -> Result<usize> {
        (**self).value_count(key)
    }

    fn value_kind(&self, key: &Self::Handle, name: &str) -> Result<ValueKind> {
        (**self).value_kind(key, name)
    }

    fn value(&self, key: &Self::Handle, name: &str) -> Result<Option<ValueData>> {
        (**self).value(key, name)
    }
}

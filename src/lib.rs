//! # Registry Explorer Core
//!
//! A lazily-materialized tree model over a hierarchical key/value store (such
//! as the Windows registry) plus a typed multi-term value search.
//!
//! ## Features
//!
//! - **Lazy tree**: keys are loaded from the store only when expanded, with a
//!   one-level prefetch so every visible node knows whether it has children
//! - **Exact path lookup**: case-insensitive navigation over what is loaded
//! - **Refresh**: discard and reload any subtree when the store changes
//! - **Typed search**: AND/OR terms matched per value kind (text, binary,
//!   DWORD/QWORD, multi-string) with optional case sensitivity
//! - **Background search**: the scope is loaded up front, then searched on a
//!   worker thread that cannot reach the store
//! - **Consistent rendering**: search results and the detail view share one formatter
//!
//! ## Architecture
//!
//! ```text
//! presentation ──► Tree (expand / refresh / go_to_path / select)
//!                   │
//!                   ├──► KeyStore  (open_subkey, subkey_names, value, ...)
//!                   │
//!                   └──► search: prepopulate_full ──► SearchEngine on worker
//!                                                        │
//!                                                        └──► Vec<SearchResult>
//! ```
//!
//! The store itself is a black box behind the [`KeyStore`] trait;
//! [`MemoryStore`] is an in-process implementation.
//!
//! ## Examples
//!
//! ### Browsing
//!
//! ```rust
//! use reg_explorer::{MemoryStore, Tree, ValueData};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! store.set_value("HKCU\\Software\\Vendor", "Version", ValueData::DWord(3))?;
//!
//! let mut tree = Tree::new(&store);
//! let root = tree.add_root(store.open_root("HKCU")?);
//! tree.expand(root)?;
//!
//! let ticket = tree.go_to_path("HKCU\\Software\\Vendor\\")?.ok_or("not loaded")?;
//! let rows = tree.details_for(&ticket)?.unwrap_or_default();
//! assert_eq!(rows[0].value, "0x3 (3)");
//! # Ok(())
//! # }
//! ```
//!
//! ### Searching
//!
//! ```rust
//! use reg_explorer::{CombineMode, MemoryStore, SearchQuery, Tree, ValueData};
//!
//! # fn main() -> reg_explorer::Result<()> {
//! let store = MemoryStore::new();
//! store.set_value("HKLM\\Software\\A", "InstallDir", ValueData::String("C:\\A".into()))?;
//! store.set_value("HKLM\\Software\\B", "Port", ValueData::DWord(8080))?;
//!
//! let mut tree = Tree::new(&store);
//! let root = tree.add_root(store.open_root("HKLM")?);
//!
//! let query = SearchQuery::parse("8080 install", CombineMode::Or, false, vec![root])?;
//! let results = tree.search(&query)?;
//! assert_eq!(results.len(), 2);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod format;
pub mod memory;
pub mod search;
pub mod selection;
pub mod store;
pub mod terms;
pub mod tree;
pub mod utils;
pub mod value;

// Re-export main types for convenience
pub use config::ExplorerConfig;
pub use error::{ExplorerError, Result};
pub use format::{detail_rows, format_value, DetailRow, FormattedValue};
pub use memory::{MemoryKey, MemoryStore};
pub use search::{group_by_key_path, CombineMode, ResultGroup, SearchEngine, SearchQuery, SearchResult};
pub use selection::{SelectionChange, SelectionTicket, SelectionTracker};
pub use store::KeyStore;
pub use tree::{BatchGuard, Node, NodeId, ResidentTree, Tree, TreeEvent};
pub use value::{Value, ValueData, ValueKind};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

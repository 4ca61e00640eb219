//! Explorer configuration.

use std::time::Duration;

/// Default path separator used by registry key names.
pub const DEFAULT_SEPARATOR: char = '\\';

/// Default delay before loading the details of a newly selected key.
pub const DEFAULT_SELECTION_DELAY: Duration = Duration::from_millis(200);

/// Tunables shared by the tree, selection tracking and search.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExplorerConfig {
    /// Separator between key path segments.
    pub separator: char,

    /// How long a selection must stay unchanged before its values are loaded.
    pub selection_delay: Duration,

    /// Name given to the background search thread.
    pub search_thread_name: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
            selection_delay: DEFAULT_SELECTION_DELAY,
            search_thread_name: String::from("reg-search"),
        }
    }
}

impl ExplorerConfig {
    /// Sets the path separator.
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Sets the selection debounce delay.
    pub fn with_selection_delay(mut self, delay: Duration) -> Self {
        self.selection_delay = delay;
        self
    }

    /// Sets the search worker thread name.
    pub fn with_search_thread_name(mut self, name: impl Into<String>) -> Self {
        self.search_thread_name = name.into();
        self
    }
}

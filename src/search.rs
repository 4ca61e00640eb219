//! Multi-term value search over resident subtrees.
//!
//! A search walks nodes that are already in memory and tests every value
//! against the query terms. Which test applies depends on the value kind:
//!
//! | Kind                   | A term matches when                                   |
//! |------------------------|-------------------------------------------------------|
//! | any                    | the value name contains it                            |
//! | String / ExpandString  | the text contains it                                  |
//! | MultiString            | any one of the strings contains it                    |
//! | Binary                 | the bytes, read as UTF-8 or else UTF-16LE, contain it |
//! | DWord / QWord          | it parses as an integer equal to the value            |
//! | None / Unknown         | never (beyond the name)                               |
//!
//! [`Tree::search`] loads the scope completely on the calling thread and then
//! runs the engine on a worker thread that only sees a [`ResidentTree`].

use crate::error::{ExplorerError, Result};
use crate::format::{display_name, format_value};
use crate::store::KeyStore;
use crate::terms;
use crate::tree::{NodeId, ResidentTree, Tree};
use crate::utils::{decode_utf16le, decode_utf8};
use crate::value::{Value, ValueData, ValueKind};
use std::collections::HashMap;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// How the terms of a query are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CombineMode {
    /// Every term must match.
    #[default]
    And,
    /// At least one term must match.
    Or,
}

/// A validated search request.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    terms: Vec<String>,
    combine_mode: CombineMode,
    case_sensitive: bool,
    scope: Vec<NodeId>,
}

impl SearchQuery {
    /// Creates a query.
    ///
    /// # Errors
    ///
    /// Returns [`ExplorerError::EmptyQuery`] if `terms` is empty.
    pub fn new(
        terms: Vec<String>,
        combine_mode: CombineMode,
        case_sensitive: bool,
        scope: Vec<NodeId>,
    ) -> Result<Self> {
        if terms.is_empty() {
            return Err(ExplorerError::EmptyQuery);
        }
        Ok(Self {
            terms,
            combine_mode,
            case_sensitive,
            scope,
        })
    }

    /// Creates a query from raw user input, see [`terms::parse`].
    pub fn parse(
        input: &str,
        combine_mode: CombineMode,
        case_sensitive: bool,
        scope: Vec<NodeId>,
    ) -> Result<Self> {
        Self::new(terms::parse(input), combine_mode, case_sensitive, scope)
    }

    /// Search terms, in input order.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// How terms are combined.
    pub fn combine_mode(&self) -> CombineMode {
        self.combine_mode
    }

    /// Whether text comparison is case-sensitive.
    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Roots of the subtrees to search.
    pub fn scope(&self) -> &[NodeId] {
        &self.scope
    }
}

/// One matching value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchResult {
    /// Path of the key holding the value.
    pub key_path: String,
    /// Value name, empty for the default value.
    pub value_name: String,
    /// Value kind.
    pub kind: ValueKind,
    /// Value rendered as in the detail view.
    pub formatted_value: String,
    /// Size descriptor, possibly empty.
    pub length_descriptor: String,
}

impl SearchResult {
    fn new(key_path: &str, value: &Value) -> Self {
        let formatted = format_value(value.data());
        Self {
            key_path: key_path.to_string(),
            value_name: value.name().to_string(),
            kind: value.kind(),
            formatted_value: formatted.display,
            length_descriptor: formatted.length,
        }
    }

    /// Name to display, `(Default)` for the unnamed value.
    pub fn display_name(&self) -> &str {
        display_name(&self.value_name)
    }
}

/// A term read as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumericTerm {
    /// Decimal literal, compared with the signed value.
    Decimal(i64),
    /// `0x` literal, compared with the unsigned bit pattern.
    Hex(u64),
}

impl NumericTerm {
    fn parse(term: &str) -> Option<Self> {
        let term = term.trim();
        let (negative, body) = match term.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, term.strip_prefix('+').unwrap_or(term)),
        };

        if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
            if negative {
                return None;
            }
            return u64::from_str_radix(hex, 16).ok().map(NumericTerm::Hex);
        }

        let grouped = body.starts_with(',') || body.ends_with(',') || body.contains(",,");
        if body.is_empty() || grouped || !body.chars().all(|c| c.is_ascii_digit() || c == ',') {
            return None;
        }

        let mut digits = String::with_capacity(body.len() + 1);
        if negative {
            digits.push('-');
        }
        digits.extend(body.chars().filter(|&c| c != ','));
        digits.parse().ok().map(NumericTerm::Decimal)
    }

    fn matches_dword(self, value: i32) -> bool {
        match self {
            NumericTerm::Decimal(n) => n == i64::from(value),
            NumericTerm::Hex(h) => h == u64::from(value as u32),
        }
    }

    fn matches_qword(self, value: i64) -> bool {
        match self {
            NumericTerm::Decimal(n) => n == value,
            NumericTerm::Hex(h) => h == value as u64,
        }
    }
}

/// A term prepared for matching.
#[derive(Debug)]
struct CompiledTerm {
    /// Lowercased unless the search is case-sensitive.
    needle: String,
    numeric: Option<NumericTerm>,
}

/// Evaluates a query against values and resident subtrees.
#[derive(Debug)]
pub struct SearchEngine<'q> {
    query: &'q SearchQuery,
    terms: Vec<CompiledTerm>,
}

impl<'q> SearchEngine<'q> {
    /// Prepares `query` for matching.
    pub fn new(query: &'q SearchQuery) -> Self {
        let terms = query
            .terms
            .iter()
            .map(|term| CompiledTerm {
                needle: if query.case_sensitive {
                    term.clone()
                } else {
                    term.to_lowercase()
                },
                numeric: NumericTerm::parse(term),
            })
            .collect();
        Self { query, terms }
    }

    /// Returns true if `value` satisfies the query.
    pub fn matches(&self, value: &Value) -> bool {
        match self.query.combine_mode {
            CombineMode::And => self.terms.iter().all(|term| self.term_matches(term, value)),
            CombineMode::Or => self.terms.iter().any(|term| self.term_matches(term, value)),
        }
    }

    fn contains(&self, haystack: &str, term: &CompiledTerm) -> bool {
        if self.query.case_sensitive {
            haystack.contains(&term.needle)
        } else {
            haystack.to_lowercase().contains(&term.needle)
        }
    }

    fn term_matches(&self, term: &CompiledTerm, value: &Value) -> bool {
        if self.contains(value.name(), term) {
            return true;
        }

        match value.data() {
            Some(ValueData::String(s)) | Some(ValueData::ExpandString(s)) => self.contains(s, term),
            Some(ValueData::MultiString(strings)) => strings.iter().any(|s| self.contains(s, term)),
            Some(ValueData::Binary(bytes)) => {
                decode_utf8(bytes).map_or(false, |text| self.contains(&text, term))
                    || decode_utf16le(bytes).map_or(false, |text| self.contains(&text, term))
            }
            Some(ValueData::DWord(d)) => term.numeric.map_or(false, |n| n.matches_dword(*d)),
            Some(ValueData::QWord(q)) => term.numeric.map_or(false, |n| n.matches_qword(*q)),
            Some(ValueData::None) | Some(ValueData::Unknown(_)) | None => false,
        }
    }

    /// Walks every scope root in order, pre-order, and collects the matches.
    ///
    /// Only values already loaded into the nodes are considered.
    pub fn run(&self, tree: ResidentTree<'_>) -> Vec<SearchResult> {
        let mut results = Vec::new();
        let mut visited = 0usize;

        for &root in &self.query.scope {
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                let node = match tree.node(id) {
                    Some(node) => node,
                    None => {
                        debug!(?id, "Skipping stale node");
                        continue;
                    }
                };
                visited += 1;

                for value in node.values().unwrap_or(&[]) {
                    if self.matches(value) {
                        results.push(SearchResult::new(node.absolute_path(), value));
                    }
                }
                stack.extend(node.children().iter().rev().copied());
            }
        }

        debug!(visited, matches = results.len(), "Search walk complete");
        results
    }
}

impl<S: KeyStore> Tree<S> {
    /// Runs a search over the query scope.
    ///
    /// Every scope root is first loaded completely on the calling thread;
    /// the walk itself then runs on a worker thread without store access.
    /// The tree is borrowed mutably for the whole call, so nothing can
    /// change it while the worker runs.
    #[instrument(skip(self, query), fields(terms = query.terms().len(), roots = query.scope().len()))]
    pub fn search(&mut self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        if let Some(&stale) = query.scope().iter().find(|&&id| self.node(id).is_none()) {
            return Err(ExplorerError::StaleNode(stale));
        }

        let start = Instant::now();
        {
            let mut batch = self.batch();
            for &root in query.scope() {
                batch.prepopulate_full(root)?;
            }
        }
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Scope loaded");

        let engine = SearchEngine::new(query);
        let resident = self.resident();
        let thread_name = self.config().search_thread_name.clone();

        let results = thread::scope(|scope| -> Result<Vec<SearchResult>> {
            let worker = thread::Builder::new()
                .name(thread_name)
                .spawn_scoped(scope, || engine.run(resident))?;
            worker
                .join()
                .map_err(|_| ExplorerError::SearchWorker("search thread panicked".to_string()))
        })?;

        info!(
            results = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Search finished"
        );
        Ok(results)
    }
}

/// Results sharing one key path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultGroup<'a> {
    /// The key path.
    pub key_path: &'a str,
    /// Results under that key, in search order.
    pub results: Vec<&'a SearchResult>,
}

/// Groups results by key path, ordering groups by first appearance.
pub fn group_by_key_path(results: &[SearchResult]) -> Vec<ResultGroup<'_>> {
    let mut groups: Vec<ResultGroup<'_>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for result in results {
        let slot = *index.entry(result.key_path.as_str()).or_insert_with(|| {
            groups.push(ResultGroup {
                key_path: &result.key_path,
                results: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].results.push(result);
    }

    groups
}

//! Cache Key Module
//!
//! Canonical identifiers for coalescible work.

use std::collections::BTreeSet;
use std::fmt;

// == Cache Key ==
/// Opaque key identifying one unit of coalescible backend work.
///
/// Built from the operation kind, the app user and any request parameters in
/// canonical order, so two equivalent requests always produce equal keys.
/// Parts are compared field by field, never as a joined string, so a user id
/// containing spaces cannot collide with an identifier list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    operation: &'static str,
    app_user_id: String,
    identifiers: IdentifierSet,
}

impl CacheKey {
    /// Creates a key scoped to an operation kind and an app user.
    pub fn user_scoped(operation: &'static str, app_user_id: &str) -> Self {
        Self {
            operation,
            app_user_id: app_user_id.to_string(),
            identifiers: IdentifierSet::new(),
        }
    }

    /// Creates a key scoped to an operation kind, an app user and a set of identifiers.
    pub fn with_identifiers(
        operation: &'static str,
        app_user_id: &str,
        ids: &IdentifierSet,
    ) -> Self {
        Self {
            operation,
            app_user_id: app_user_id.to_string(),
            identifiers: ids.clone(),
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn app_user_id(&self) -> &str {
        &self.app_user_id
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operation, self.app_user_id)?;
        if !self.identifiers.is_empty() {
            write!(f, " {}", self.identifiers.joined(" "))?;
        }
        Ok(())
    }
}

// == Identifier Set ==
/// A canonical, ordered set of product identifiers.
///
/// Used both as the request shape for the catalog and as the coalescing key
/// for its in-flight store queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentifierSet(BTreeSet<String>);

impl IdentifierSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.0.insert(id.into())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates identifiers in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns the subset of identifiers matching `predicate`.
    pub fn filter(&self, mut predicate: impl FnMut(&str) -> bool) -> Self {
        Self(self.0.iter().filter(|id| predicate(id.as_str())).cloned().collect())
    }

    /// Joins identifiers in sorted order with `separator`.
    pub fn joined(&self, separator: &str) -> String {
        self.0
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(separator)
    }
}

impl<S: Into<String>> FromIterator<S> for IdentifierSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl IntoIterator for IdentifierSet {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for IdentifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.joined(", "))
    }
}

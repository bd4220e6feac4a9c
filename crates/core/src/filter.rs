//! Typed metadata filters for retrieval.
//!
//! A [`QueryFilter`] is a conjunction of clauses; each clause is a
//! disjunction of typed [`Predicate`]s over the two metadata fields the
//! index understands (`doc_id` and `private`). Predicates are validated when
//! they are constructed, so an index backend can apply any filter it receives
//! without re-checking it.
//!
//! [`QueryFilterBuilder`] turns a caller's allow-list into the visibility
//! filter: private documents are excluded unless their `doc_id` is allowed.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::document::Chunk;
use crate::error::FilterError;

/// Metadata fields a filter can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    DocId,
    Private,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocId => "doc_id",
            Self::Private => "private",
        }
    }

    fn check(&self, value: &FilterValue) -> Result<(), FilterError> {
        match (self, value) {
            (Self::DocId, FilterValue::Text(id)) if id.trim().is_empty() => {
                Err(FilterError::EmptyDocId)
            }
            (Self::DocId, FilterValue::Text(_)) | (Self::Private, FilterValue::Bool(_)) => Ok(()),
            (Self::DocId, _) => Err(FilterError::ValueType {
                field: "doc_id",
                expected: "text",
            }),
            (Self::Private, _) => Err(FilterError::ValueType {
                field: "private",
                expected: "boolean",
            }),
        }
    }
}

/// A literal compared against a metadata field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Text(String),
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// The closed set of predicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Equals { field: Field, value: FilterValue },
    NotEquals { field: Field, value: FilterValue },
    In { field: Field, values: Vec<FilterValue> },
}

impl Predicate {
    pub fn equals(field: Field, value: impl Into<FilterValue>) -> Result<Self, FilterError> {
        let value = value.into();
        field.check(&value)?;
        Ok(Self::Equals { field, value })
    }

    pub fn not_equals(field: Field, value: impl Into<FilterValue>) -> Result<Self, FilterError> {
        let value = value.into();
        field.check(&value)?;
        Ok(Self::NotEquals { field, value })
    }

    /// Membership test. An empty set matches nothing.
    pub fn one_of<I, V>(field: Field, values: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        let mut set = BTreeSet::new();
        for value in values {
            let value = value.into();
            field.check(&value)?;
            set.insert(value);
        }
        Ok(Self::In {
            field,
            values: set.into_iter().collect(),
        })
    }

    pub fn field(&self) -> Field {
        match self {
            Self::Equals { field, .. } | Self::NotEquals { field, .. } | Self::In { field, .. } => {
                *field
            }
        }
    }

    /// Evaluate against a chunk's metadata.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        let actual = match self.field() {
            Field::DocId => FilterValue::Text(chunk.doc_id.clone()),
            Field::Private => FilterValue::Bool(chunk.is_private()),
        };
        match self {
            Self::Equals { value, .. } => &actual == value,
            Self::NotEquals { value, .. } => &actual != value,
            Self::In { values, .. } => values.contains(&actual),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals { field, value } => write!(f, "{} == {value:?}", field.as_str()),
            Self::NotEquals { field, value } => write!(f, "{} != {value:?}", field.as_str()),
            Self::In { field, values } => write!(f, "{} in {values:?}", field.as_str()),
        }
    }
}

/// One or more predicates joined by OR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Clause {
    any_of: Vec<Predicate>,
}

impl Clause {
    pub fn any_of(predicates: Vec<Predicate>) -> Result<Self, FilterError> {
        if predicates.is_empty() {
            return Err(FilterError::EmptyDisjunction);
        }
        Ok(Self { any_of: predicates })
    }

    pub fn single(predicate: Predicate) -> Self {
        Self {
            any_of: vec![predicate],
        }
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.any_of
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.any_of.iter().any(|p| p.matches(chunk))
    }
}

/// A conjunction of clauses. The empty filter matches every chunk, so it is
/// only available through [`QueryFilter::match_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryFilter {
    all_of: Vec<Clause>,
}

impl QueryFilter {
    /// A filter that admits every chunk.
    pub fn match_all() -> Self {
        Self { all_of: Vec::new() }
    }

    /// Only documents not flagged private.
    pub fn public_only() -> Self {
        Self::match_all().and(Clause::single(Predicate::NotEquals {
            field: Field::Private,
            value: FilterValue::Bool(true),
        }))
    }

    /// AND another clause onto this filter.
    pub fn and(mut self, clause: Clause) -> Self {
        self.all_of.push(clause);
        self
    }

    /// AND every clause of another filter onto this one.
    pub fn and_filter(mut self, other: QueryFilter) -> Self {
        self.all_of.extend(other.all_of);
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.all_of
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.all_of.iter().all(|c| c.matches(chunk))
    }
}

impl fmt::Display for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.all_of.is_empty() {
            return write!(f, "<all>");
        }
        let rendered: Vec<String> = self
            .all_of
            .iter()
            .map(|clause| {
                let parts: Vec<String> = clause.any_of.iter().map(|p| p.to_string()).collect();
                format!("({})", parts.join(" OR "))
            })
            .collect();
        write!(f, "{}", rendered.join(" AND "))
    }
}

/// How an allow-list interacts with public documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityPolicy {
    /// Public documents plus any allow-listed private ones.
    #[default]
    PublicPlusAllowList,
    /// A non-empty allow-list narrows retrieval to exactly those documents.
    ScopeToAllowList,
}

/// Builds the visibility filter for one request. Performs no I/O.
#[derive(Debug, Clone, Default)]
pub struct QueryFilterBuilder {
    policy: VisibilityPolicy,
    allow: Vec<String>,
    restrict: Option<Vec<String>>,
}

impl QueryFilterBuilder {
    pub fn new(policy: VisibilityPolicy) -> Self {
        Self {
            policy,
            allow: Vec::new(),
            restrict: None,
        }
    }

    /// Authorize these `doc_id`s, private or not.
    pub fn allow<I, S>(mut self, doc_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow.extend(doc_ids.into_iter().map(Into::into));
        self
    }

    /// Additionally narrow retrieval to these `doc_id`s. Does not grant access.
    pub fn restrict_to<I, S>(mut self, doc_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.restrict
            .get_or_insert_with(Vec::new)
            .extend(doc_ids.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Result<QueryFilter, FilterError> {
        let not_private = Predicate::not_equals(Field::Private, true)?;

        let mut filter = if self.allow.is_empty() {
            QueryFilter::match_all().and(Clause::single(not_private))
        } else {
            let allowed = Predicate::one_of(Field::DocId, self.allow)?;
            match self.policy {
                VisibilityPolicy::PublicPlusAllowList => {
                    QueryFilter::match_all().and(Clause::any_of(vec![not_private, allowed])?)
                }
                VisibilityPolicy::ScopeToAllowList => {
                    QueryFilter::match_all().and(Clause::single(allowed))
                }
            }
        };

        if let Some(restrict) = self.restrict {
            filter = filter.and(Clause::single(Predicate::one_of(Field::DocId, restrict)?));
        }
        Ok(filter)
    }
}

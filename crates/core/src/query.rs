//! Search facets and the structured query they compose into.
//!
//! Clause order is fixed: tag terms (in insertion order), then full text, then the
//! upload date range. Identical facets always yield identical queries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Document field carrying tags.
pub const TAGS_FIELD: &str = "tags";
/// Document field searched by the free-text facet.
pub const TEXT_FIELD: &str = "text";

/// Optional bounds on the upload date. A missing bound is unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

/// The independently adjustable search filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterFacets {
    #[serde(default)]
    text: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    uploaded: DateRange,
}

impl FilterFacets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn uploaded(&self) -> DateRange {
        self.uploaded
    }

    /// Replaces the free-text query. Surrounding whitespace is dropped, so edits that
    /// only add or remove it are not changes.
    pub fn set_text(&mut self, text: impl AsRef<str>) -> bool {
        let text = text.as_ref().trim();
        if self.text == text {
            return false;
        }
        self.text = text.to_string();
        true
    }

    /// Adds a required tag. Blank and duplicate tags are ignored.
    pub fn add_tag(&mut self, tag: impl AsRef<str>) -> bool {
        let tag = tag.as_ref().trim();
        if tag.is_empty() || self.tags.iter().any(|t| t == tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn remove_tag(&mut self, tag: impl AsRef<str>) -> bool {
        let tag = tag.as_ref().trim();
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }

    pub fn clear_tags(&mut self) -> bool {
        if self.tags.is_empty() {
            return false;
        }
        self.tags.clear();
        true
    }

    pub fn set_uploaded(&mut self, range: DateRange) -> bool {
        if self.uploaded == range {
            return false;
        }
        self.uploaded = range;
        true
    }

    /// True when no facet contributes a clause.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.tags.is_empty() && self.uploaded.is_unbounded()
    }

    /// Builds the conjunctive query for the current facets.
    ///
    /// Every tag becomes its own `term` clause so a hit must carry all of them.
    /// Empty facets are omitted rather than matched as wildcards.
    pub fn combined_query(&self) -> SearchQuery {
        let mut must: Vec<Clause> = self
            .tags
            .iter()
            .map(|tag| Clause::Term(TermClause { tags: tag.clone() }))
            .collect();

        let text = self.text.trim();
        if !text.is_empty() {
            must.push(Clause::QueryString(QueryStringClause {
                query: text.to_string(),
                default_field: TEXT_FIELD.to_string(),
                default_operator: "AND".to_string(),
            }));
        }

        if !self.uploaded.is_unbounded() {
            must.push(Clause::Range(RangeClause {
                uploaded: DateBounds {
                    gte: self.uploaded.from,
                    lte: self.uploaded.to,
                },
            }));
        }

        SearchQuery {
            query: QueryBody {
                bool_query: BoolQuery { must },
            },
            aggregations: QueryAggregations::default(),
        }
    }
}

/// Structured search request body (`POST search`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: QueryBody,
    pub aggregations: QueryAggregations,
}

impl SearchQuery {
    pub fn clauses(&self) -> &[Clause] {
        &self.query.bool_query.must
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryBody {
    #[serde(rename = "bool")]
    pub bool_query: BoolQuery,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoolQuery {
    #[serde(default)]
    pub must: Vec<Clause>,
}

/// One required condition of the combined query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Clause {
    Term(TermClause),
    QueryString(QueryStringClause),
    Range(RangeClause),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermClause {
    pub tags: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStringClause {
    pub query: String,
    pub default_field: String,
    pub default_operator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeClause {
    pub uploaded: DateBounds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<NaiveDate>,
}

/// Aggregations requested alongside every search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAggregations {
    pub tags: TagsAggregation,
}

impl Default for QueryAggregations {
    fn default() -> Self {
        Self {
            tags: TagsAggregation {
                terms: TermsSpec {
                    field: TAGS_FIELD.to_string(),
                    min_doc_count: 1,
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagsAggregation {
    pub terms: TermsSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermsSpec {
    pub field: String,
    pub min_doc_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_duplicate_tags_are_ignored() {
        let mut facets = FilterFacets::new();
        assert!(facets.add_tag("tax"));
        assert!(!facets.add_tag("tax"));
        assert!(!facets.add_tag("  "));
        assert!(facets.add_tag(" 2024 "));
        assert_eq!(facets.tags(), ["tax".to_string(), "2024".to_string()]);
    }

    #[test]
    fn setters_report_changes() {
        let mut facets = FilterFacets::new();
        assert!(facets.set_text("invoice"));
        assert!(!facets.set_text("invoice"));
        assert!(!facets.remove_tag("missing"));
        assert!(!facets.clear_tags());
        assert!(!facets.set_uploaded(DateRange::default()));
    }

    #[test]
    fn whitespace_text_is_empty() {
        let mut facets = FilterFacets::new();
        assert!(!facets.set_text("   "));
        assert!(facets.is_empty());
        assert!(facets.combined_query().clauses().is_empty());
    }

    #[test]
    fn surrounding_whitespace_is_not_a_text_change() {
        let mut facets = FilterFacets::new();
        assert!(facets.set_text("rent "));
        assert_eq!(facets.text(), "rent");
        assert!(!facets.set_text("  rent"));
        assert!(facets.set_text("rent 2024"));
    }
}

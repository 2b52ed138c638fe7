//! Faceted search: the composer that owns the facets and the view fetcher.

use std::time::Duration;

use adacta_core::api::{SearchResponse, TagBucket};
use adacta_core::query::{DateRange, FilterFacets, SearchQuery};
use serde::Serialize;
use tokio::sync::watch;

use crate::api::ApiClient;
use crate::fetcher::{ReactiveFetcher, RequestDescriptor};

/// Owns the current facets and announces every effective change.
///
/// Mutations that leave the facets unchanged send no notification.
#[derive(Debug)]
pub struct QueryComposer {
    facets: watch::Sender<FilterFacets>,
}

impl Default for QueryComposer {
    fn default() -> Self {
        Self::new(FilterFacets::default())
    }
}

impl QueryComposer {
    pub fn new(facets: FilterFacets) -> Self {
        let (facets, _) = watch::channel(facets);
        Self { facets }
    }

    pub fn set_text(&self, text: impl AsRef<str>) -> bool {
        self.facets.send_if_modified(|f| f.set_text(text))
    }

    pub fn add_tag(&self, tag: impl AsRef<str>) -> bool {
        self.facets.send_if_modified(|f| f.add_tag(tag))
    }

    pub fn remove_tag(&self, tag: impl AsRef<str>) -> bool {
        self.facets.send_if_modified(|f| f.remove_tag(tag))
    }

    pub fn clear_tags(&self) -> bool {
        self.facets.send_if_modified(FilterFacets::clear_tags)
    }

    pub fn set_uploaded(&self, range: DateRange) -> bool {
        self.facets.send_if_modified(|f| f.set_uploaded(range))
    }

    /// Resets every facet.
    pub fn clear(&self) -> bool {
        self.facets.send_if_modified(|f| {
            if f.is_empty() {
                return false;
            }
            *f = FilterFacets::default();
            true
        })
    }

    pub fn facets(&self) -> FilterFacets {
        self.facets.borrow().clone()
    }

    pub fn combined_query(&self) -> SearchQuery {
        self.facets.borrow().combined_query()
    }

    pub fn subscribe(&self) -> watch::Receiver<FilterFacets> {
        self.facets.subscribe()
    }
}

/// What the search view renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResults {
    pub documents: Vec<String>,
    pub tags: Vec<TagBucket>,
}

impl SearchResults {
    pub fn from_response(response: SearchResponse) -> Self {
        Self {
            documents: response.hits.hits.into_iter().map(|hit| hit.id).collect(),
            tags: response.aggregations.tags.buckets,
        }
    }
}

/// A fetcher that re-runs the search once the facets have settled for `window`.
pub fn search_fetcher(
    api: ApiClient,
    composer: &QueryComposer,
    window: Duration,
) -> ReactiveFetcher<SearchResults> {
    ReactiveFetcher::watching(
        composer.subscribe(),
        move |facets: &FilterFacets| {
            let api = api.clone();
            let query = facets.combined_query();
            RequestDescriptor::with_transform(
                move || {
                    let api = api.clone();
                    let query = query.clone();
                    async move { api.search(&query).await }
                },
                |response: SearchResponse| Ok(SearchResults::from_response(response)),
            )
        },
        window,
    )
}

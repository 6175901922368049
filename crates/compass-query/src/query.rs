use serde::{Deserialize, Serialize};

use crate::filter::Filter;
use crate::sort::Sort;

/// A find request: filter plus optional sort, row cap and projection.
///
/// Only one sort key is carried; setting it again replaces the previous one.
/// A `limit` of zero means no limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub filter: Filter,
    pub sort: Option<Sort>,
    pub limit: Option<u64>,
    pub projection: Option<Vec<String>>,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    /// The effective row cap, treating zero as unlimited.
    pub fn effective_limit(&self) -> Option<u64> {
        self.limit.filter(|n| *n > 0)
    }
}

use schema::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Meta carries read metadata alongside reassembled elements; `Total` holds
/// the full matching count independent of paging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub counts: BTreeMap<String, i64>,
}

impl Meta {
    pub fn with_total(total: i64) -> Self {
        let mut counts = BTreeMap::new();
        counts.insert("Total".to_string(), total);
        Meta { counts }
    }

    pub fn total(&self) -> i64 {
        self.counts.get("Total").copied().unwrap_or_default()
    }
}

/// QueryResult is the outcome of a read (or a completed write): the
/// reassembled elements plus optional metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub elements: Vec<Value>,
    pub metadata: Option<Meta>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of(elements: Vec<Value>, metadata: Option<Meta>) -> Self {
        Self { elements, metadata }
    }

    /// The first element, the common case for single-record requests.
    pub fn element(&self) -> Option<&Value> {
        self.elements.first()
    }
}

//! Search criteria and request body construction.

use serde_json::{Map, Value, json};

/// Default page size, matching the engine's default `max_result_window`.
pub const DEFAULT_SIZE: u64 = 10_000;

/// Search intent handed to the manager.
///
/// The query and sort structures are passed through to the engine untouched.
pub trait SearchCriteria: Send + Sync {
    /// Pagination offset.
    fn from(&self) -> u64;

    /// Maximum number of hits.
    fn size(&self) -> u64;

    /// Query structure; an empty map means "match everything".
    fn query(&self) -> &Map<String, Value>;

    /// Sort structure; `null`, `{}` and `[]` mean "engine default".
    fn sort(&self) -> &Value;
}

/// Plain search value object.
#[derive(Debug, Clone, PartialEq)]
pub struct Search {
    from: u64,
    size: u64,
    query: Map<String, Value>,
    sort: Value,
}

impl Default for Search {
    fn default() -> Self {
        Self::empty()
    }
}

impl Search {
    /// Create a search from a query and sort structure.
    pub fn new(query: Map<String, Value>, sort: Value) -> Self {
        Self {
            from: 0,
            size: DEFAULT_SIZE,
            query,
            sort,
        }
    }

    /// Match all documents.
    pub fn empty() -> Self {
        Self::new(Map::new(), Value::Null)
    }

    /// Match documents by id.
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = ids.into_iter().map(Into::into).collect();
        Self::empty().with_query(json!({ "ids": { "values": values } }))
    }

    /// Exact match on a single field value.
    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut term = Map::new();
        term.insert(field.into(), value.into());
        Self::empty().with_query(json!({ "term": term }))
    }

    /// Exact match on any of several field values.
    pub fn terms<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let mut terms = Map::new();
        terms.insert(field.into(), Value::Array(values));
        Self::empty().with_query(json!({ "terms": terms }))
    }

    /// Replace the query. Non-object values are ignored.
    pub fn with_query(mut self, query: Value) -> Self {
        if let Value::Object(map) = query {
            self.query = map;
        }
        self
    }

    /// Replace the sort structure.
    pub fn with_sort(mut self, sort: Value) -> Self {
        self.sort = sort;
        self
    }

    /// Append a sort clause on a field.
    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        let mut clause = Map::new();
        clause.insert(field.into(), json!({ "order": order.as_str() }));
        let clause = Value::Object(clause);
        self.sort = match self.sort {
            Value::Array(mut clauses) => {
                clauses.push(clause);
                Value::Array(clauses)
            }
            Value::Null => Value::Array(vec![clause]),
            Value::Object(ref map) if map.is_empty() => Value::Array(vec![clause]),
            existing => Value::Array(vec![existing, clause]),
        };
        self
    }

    /// Set pagination offset.
    pub fn from(mut self, from: u64) -> Self {
        self.from = from;
        self
    }

    /// Set result size limit.
    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }
}

impl SearchCriteria for Search {
    fn from(&self) -> u64 {
        self.from
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn query(&self) -> &Map<String, Value> {
        &self.query
    }

    fn sort(&self) -> &Value {
        &self.sort
    }
}

/// Sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl SortOrder {
    fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Build a search request body: `from` and `size` always, `query` and `sort`
/// only when non-empty.
pub fn search_body(search: &dyn SearchCriteria) -> Value {
    let mut body = Map::new();
    body.insert("from".to_string(), json!(search.from()));
    body.insert("size".to_string(), json!(search.size()));
    if !search.query().is_empty() {
        body.insert("query".to_string(), Value::Object(search.query().clone()));
    }
    if !is_blank(search.sort()) {
        body.insert("sort".to_string(), search.sort().clone());
    }
    Value::Object(body)
}

/// Build a count request body: only `query`, when non-empty.
pub fn count_body(search: &dyn SearchCriteria) -> Value {
    let mut body = Map::new();
    if !search.query().is_empty() {
        body.insert("query".to_string(), Value::Object(search.query().clone()));
    }
    Value::Object(body)
}

/// Total hit count of a search response.
///
/// Accepts both the legacy numeric form and the `{ "value": n }` object form.
/// Returns `None` when the engine did not report a total, as with
/// `track_total_hits: false`.
pub(crate) fn total_hits(response: &Value) -> Option<u64> {
    let total = &response["hits"]["total"];
    total.as_u64().or_else(|| total["value"].as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_search_body() {
        let body = search_body(&Search::empty());
        assert_eq!(body, json!({ "from": 0, "size": 10000 }));
        assert_eq!(count_body(&Search::empty()), json!({}));
    }

    #[test]
    fn test_ids_search() {
        let search = Search::ids(["a", "b"]);
        assert_eq!(
            Value::Object(search.query().clone()),
            json!({ "ids": { "values": ["a", "b"] } })
        );
    }

    #[test]
    fn test_term_and_terms_search() {
        let term = Search::term("status", "published").from(20).size(10);
        assert_eq!(
            search_body(&term),
            json!({ "from": 20, "size": 10, "query": { "term": { "status": "published" } } })
        );

        let terms = Search::terms("tags", ["rust", "search"]);
        assert_eq!(
            count_body(&terms),
            json!({ "query": { "terms": { "tags": ["rust", "search"] } } })
        );
    }

    #[test]
    fn test_count_body_differs_only_in_pagination_and_sort() {
        let search = Search::term("author", "ada")
            .sort_by("published_at", SortOrder::Desc)
            .from(5)
            .size(15);

        let mut search_body = search_body(&search);
        let count_body = count_body(&search);

        let map = search_body.as_object_mut().unwrap();
        assert!(map.remove("from").is_some());
        assert!(map.remove("size").is_some());
        assert!(map.remove("sort").is_some());
        assert_eq!(search_body, count_body);
    }

    #[test]
    fn test_sort_by_accumulates() {
        let search = Search::empty()
            .sort_by("a", SortOrder::Asc)
            .sort_by("b", SortOrder::Desc);
        assert_eq!(
            search.sort(),
            &json!([{ "a": { "order": "asc" } }, { "b": { "order": "desc" } }])
        );
    }

    #[test]
    fn test_blank_sort_is_omitted() {
        let search = Search::empty().with_sort(json!({}));
        assert!(search_body(&search).get("sort").is_none());

        let search = Search::empty().with_sort(json!([]));
        assert!(search_body(&search).get("sort").is_none());
    }

    #[test]
    fn test_total_hits_forms() {
        assert_eq!(total_hits(&json!({ "hits": { "total": 3 } })), Some(3));
        assert_eq!(
            total_hits(&json!({ "hits": { "total": { "value": 7, "relation": "eq" } } })),
            Some(7)
        );
        assert_eq!(total_hits(&json!({ "hits": { "total": { "value": 0 } } })), Some(0));
    }

    #[test]
    fn test_total_hits_unknown() {
        assert_eq!(total_hits(&json!({})), None);
        assert_eq!(total_hits(&json!({ "hits": { "hits": [] } })), None);
        assert_eq!(total_hits(&json!({ "hits": { "total": "many" } })), None);
    }
}

use crate::eval;
use query::Query;
use schema::{Record, Value};
use shred::Meta;
use std::collections::HashMap;
use std::sync::RwLock;

/// RecordCache is the write-through cache of root records, keyed by their
/// primary-key rendering. Mutations never fire callbacks; the service
/// handler owns dispatch and invokes the cache around every write.
pub struct RecordCache {
    primary: Vec<String>,
    inner: RwLock<HashMap<String, Value>>,
}

impl RecordCache {
    pub fn new(primary: Vec<String>) -> Self {
        Self {
            primary,
            inner: RwLock::new(HashMap::new()),
        }
    }

    fn key_of(&self, record: &Record) -> Option<String> {
        let parts: Vec<String> = self
            .primary
            .iter()
            .map(|f| record.get(f).map(|v| v.plain_string()).unwrap_or_default())
            .collect();
        let key = parts.join(",");
        if key.chars().all(|c| c == ',') {
            None
        } else {
            Some(key)
        }
    }

    /// Upsert by primary key. Elements without a usable key are ignored.
    pub fn post(&self, element: &Value) {
        let Some(record) = element.as_record() else {
            return;
        };
        let Some(key) = self.key_of(record) else {
            return;
        };
        self.inner.write().unwrap().insert(key, element.clone());
    }

    pub fn put(&self, element: &Value) {
        self.post(element)
    }

    /// Partial merge by primary key: non-zero fields of the patch overlay
    /// the cached record. Returns false on miss so the handler can fetch
    /// the current record from the database first.
    pub fn patch(&self, element: &Value) -> bool {
        let Some(patch) = element.as_record() else {
            return false;
        };
        let Some(key) = self.key_of(patch) else {
            return false;
        };
        let mut inner = self.inner.write().unwrap();
        let Some(Value::Record(cached)) = inner.get_mut(&key) else {
            return false;
        };
        for (field, value) in &patch.fields {
            if !value.is_zero() {
                cached.fields.insert(field.clone(), value.clone());
            }
        }
        true
    }

    pub fn delete(&self, element: &Value) {
        let Some(record) = element.as_record() else {
            return;
        };
        let Some(key) = self.key_of(record) else {
            return;
        };
        self.inner.write().unwrap().remove(&key);
    }

    /// Primary-key lookup from an example element.
    pub fn get(&self, example: &Value) -> Option<Value> {
        let record = example.as_record()?;
        let key = self.key_of(record)?;
        self.inner.read().unwrap().get(&key).cloned()
    }

    /// Drop every cached record matching the query's criteria.
    pub fn remove_matching(&self, query: &Query) {
        self.inner.write().unwrap().retain(|_, value| {
            value
                .as_record()
                .map(|r| !eval::matches(query.criteria(), r))
                .unwrap_or(true)
        });
    }

    /// Predicate scan: the records matching the query's criteria, in sort
    /// order, sliced to `[start, start+size)`, with the matching total in
    /// the metadata.
    pub fn fetch(&self, start: usize, size: usize, query: &Query) -> (Vec<Value>, Meta) {
        let inner = self.inner.read().unwrap();
        let mut matching: Vec<&Value> = inner
            .values()
            .filter(|value| {
                value
                    .as_record()
                    .map(|r| eval::matches(query.criteria(), r))
                    .unwrap_or(false)
            })
            .collect();

        let sort_field = if query.sort_by().is_empty() {
            self.primary.first().cloned().unwrap_or_default()
        } else {
            query.sort_by().to_string()
        };
        matching.sort_by(|a, b| {
            compare_plain(&sort_value(a, &sort_field), &sort_value(b, &sort_field))
        });
        if query.descending() {
            matching.reverse();
        }

        let meta = Meta::with_total(matching.len() as i64);
        let page: Vec<Value> = matching
            .into_iter()
            .skip(start)
            .take(size)
            .cloned()
            .collect();
        (page, meta)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metadata(&self) -> Meta {
        Meta::with_total(self.len() as i64)
    }
}

fn sort_value(value: &Value, field: &str) -> String {
    value
        .as_record()
        .and_then(|r| r.get(field))
        .map(|v| v.plain_string())
        .unwrap_or_default()
}

// Numeric fields order numerically, as SQL ORDER BY does on their native
// columns; everything else orders lexically.
fn compare_plain(left: &str, right: &str) -> std::cmp::Ordering {
    match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(std::cmp::Ordering::Equal),
        _ => left.cmp(right),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use schema::{TypeDef, TypeRegistry};

    fn target(id: &str, state: i32) -> Value {
        Value::Record(
            Record::new("Target")
                .set("TargetId", Value::str(id))
                .set("State", Value::I32(state)),
        )
    }

    fn cache() -> RecordCache {
        RecordCache::new(vec!["TargetId".to_string()])
    }

    fn registry() -> TypeRegistry {
        let reg = TypeRegistry::new();
        reg.register(
            TypeDef::new("Target")
                .field("TargetId", "string")
                .field("State", "TargetState"),
        )
        .unwrap();
        reg
    }

    #[test]
    fn post_get_delete_by_primary_key() {
        let cache = cache();
        cache.post(&target("a", 1));
        assert_eq!(cache.len(), 1);

        let example = target("a", 0);
        assert_eq!(cache.get(&example), Some(target("a", 1)));

        cache.delete(&example);
        assert!(cache.get(&example).is_none());
    }

    #[test]
    fn keyless_elements_are_ignored() {
        let cache = cache();
        cache.post(&Value::Record(Record::new("Target")));
        assert!(cache.is_empty());
    }

    #[test]
    fn patch_merges_non_zero_fields() {
        let cache = cache();
        assert!(!cache.patch(&target("a", 2)), "patch misses before post");

        cache.post(&target("a", 1));
        assert!(cache.patch(&target("a", 2)));
        assert_eq!(cache.get(&target("a", 0)), Some(target("a", 2)));

        // A zero-valued field leaves the cached value alone.
        assert!(cache.patch(&target("a", 0)));
        assert_eq!(cache.get(&target("a", 0)), Some(target("a", 2)));
    }

    #[test]
    fn fetch_filters_sorts_and_pages() {
        let reg = registry();
        let cache = cache();
        for i in 1..=9 {
            cache.post(&target(&format!("t{i}"), if i % 2 == 0 { 2 } else { 1 }));
        }

        let q = Query::parse("select * from target where state=1 limit 2", &reg).unwrap();
        let (page, meta) = cache.fetch(0, 2, &q);
        assert_eq!(meta.total(), 5);
        let ids: Vec<&str> = page
            .iter()
            .map(|v| v.as_record().unwrap().get("TargetId").unwrap().as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["t1", "t3"]);

        let (page, _) = cache.fetch(4, 2, &q);
        assert_eq!(page.len(), 1, "last partial page");
    }

    #[test]
    fn fetch_orders_numeric_fields_numerically() {
        let reg = registry();
        let cache = cache();
        cache.post(&target("a", 10));
        cache.post(&target("b", 2));
        cache.post(&target("c", 1));

        // SQL ORDER BY on the integer column yields 1, 2, 10; the cache
        // must agree, not sort "10" before "2".
        let q = Query::parse("select * from target sortby state", &reg).unwrap();
        let (page, _) = cache.fetch(0, 10, &q);
        let states: Vec<i32> = page
            .iter()
            .map(|v| match v.as_record().unwrap().get("State").unwrap() {
                Value::I32(n) => *n,
                other => panic!("unexpected state value {:?}", other),
            })
            .collect();
        assert_eq!(states, vec![1, 2, 10]);
    }

    #[test]
    fn remove_matching_follows_criteria() {
        let reg = registry();
        let cache = cache();
        cache.post(&target("a", 1));
        cache.post(&target("b", 2));

        let q = Query::parse("select * from target where state=1", &reg).unwrap();
        cache.remove_matching(&q);
        assert!(cache.get(&target("a", 0)).is_none());
        assert!(cache.get(&target("b", 0)).is_some());
    }
}

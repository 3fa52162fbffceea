mod callback;
mod convert;

pub mod cache;
pub mod eval;

pub use callback::{Flow, ServiceCallback};
pub use cache::RecordCache;
pub use convert::ConvertService;

use anyhow::Context as _;
use query::Query;
use schema::{Resources, Value};
use shred::{Action, QueryResult, Store};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("empty primary key for type {0:?}")]
    EmptyKey(String),
    #[error("element type {got:?} does not match service item type {want:?}")]
    TypeMismatch { got: String, want: String },
    #[error("request carries no elements")]
    EmptyRequest,
}

/// The activation options of one ORM service area.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub service_name: String,
    pub service_area: u16,
    /// Root record type persisted by this service.
    pub item_type: String,
    /// The list wrapper type; a single element of this type flattens into
    /// its `List`-shaped slice on writes.
    pub item_list_type: String,
    pub enable_cache: bool,
    pub primary_keys: Vec<String>,
    pub unique_keys: Vec<String>,
}

/// Request is the payload of one verb: elements (filter mode) or a query.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub elements: Vec<Value>,
    pub query: Option<Query>,
}

impl Request {
    pub fn of_element(element: Value) -> Self {
        Self {
            elements: vec![element],
            ..Default::default()
        }
    }

    pub fn of_elements(elements: Vec<Value>) -> Self {
        Self {
            elements,
            ..Default::default()
        }
    }

    pub fn of_query(query: Query) -> Self {
        Self {
            query: Some(query),
            ..Default::default()
        }
    }

    /// Filter mode: the payload is an example object rather than a query.
    pub fn is_filter_mode(&self) -> bool {
        self.query.is_none()
    }
}

/// OrmService glues the verbs together: callbacks fire around the store,
/// the cache is consulted before it and updated after it, and by-example
/// filters synthesize the equivalent primary-key query.
pub struct OrmService {
    options: ServiceOptions,
    store: Arc<dyn Store>,
    callback: Option<Arc<dyn ServiceCallback>>,
    cache: Option<RecordCache>,
    res: Resources,
}

impl OrmService {
    /// Register the key decorators of the item type, validate its type
    /// graph, and initialize the optional cache (empty population).
    pub fn activate(
        options: ServiceOptions,
        store: Arc<dyn Store>,
        callback: Option<Arc<dyn ServiceCallback>>,
        res: Resources,
    ) -> anyhow::Result<Arc<OrmService>> {
        let primary: Vec<&str> = options.primary_keys.iter().map(String::as_str).collect();
        res.registry.decorate_primary(&options.item_type, &primary);
        if !options.unique_keys.is_empty() {
            let unique: Vec<&str> = options.unique_keys.iter().map(String::as_str).collect();
            res.registry.decorate_unique(&options.item_type, &unique);
        }
        // Building the node tree rejects unknown and cyclic type graphs up
        // front.
        res.registry
            .node(&options.item_type)
            .with_context(|| format!("cannot activate service {}", options.service_name))?;

        let cache = options
            .enable_cache
            .then(|| RecordCache::new(options.primary_keys.clone()));
        tracing::info!(
            service = options.service_name.as_str(),
            area = options.service_area,
            item = options.item_type.as_str(),
            cache = options.enable_cache,
            "ORM service activated"
        );
        Ok(Arc::new(OrmService {
            options,
            store,
            callback,
            cache,
            res,
        }))
    }

    pub async fn deactivate(&self) -> anyhow::Result<()> {
        self.store.close().await
    }

    pub fn cache(&self) -> Option<&RecordCache> {
        self.cache.as_ref()
    }

    pub async fn post(&self, request: Request) -> anyhow::Result<QueryResult> {
        self.do_write(Action::Post, request).await
    }

    pub async fn put(&self, request: Request) -> anyhow::Result<QueryResult> {
        self.do_write(Action::Put, request).await
    }

    pub async fn patch(&self, request: Request) -> anyhow::Result<QueryResult> {
        self.do_write(Action::Patch, request).await
    }

    pub async fn delete(&self, request: Request) -> anyhow::Result<QueryResult> {
        if !request.is_filter_mode() {
            let query = request.query.as_ref().unwrap();
            if let Some(cache) = &self.cache {
                cache.remove_matching(query);
            }
            self.store.delete(query).await?;
            return Ok(QueryResult::empty());
        }

        let Some(elements) = self.apply(Side::Before, Action::Delete, request.elements)? else {
            return Ok(QueryResult::empty());
        };
        for element in &elements {
            let query = self.example_query(element)?;
            if let Some(cache) = &self.cache {
                cache.delete(element);
            }
            self.store.delete(&query).await?;
        }
        self.apply(Side::After, Action::Delete, elements)?;
        Ok(QueryResult::empty())
    }

    pub async fn get(&self, request: Request) -> anyhow::Result<QueryResult> {
        if request.is_filter_mode() {
            let element = request
                .elements
                .first()
                .ok_or(ServiceError::EmptyRequest)?;
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache.get(element) {
                    tracing::debug!(service = self.options.service_name.as_str(), "cache hit");
                    return Ok(QueryResult::of(vec![hit], Some(cache.metadata())));
                }
            }
            let query = self.example_query(element)?;
            let result = self.store.read(&query).await?;
            self.populate_cache(&result);
            return Ok(result);
        }

        let query = request.query.as_ref().unwrap();
        if let Some(cache) = &self.cache {
            if let Some(result) = self.cache_fetch(cache, query) {
                return Ok(result);
            }
        }
        let result = self.store.read(query).await?;
        self.populate_cache(&result);
        Ok(result)
    }

    /// The transaction-coordination key of a request: the query's key when
    /// one is present, the element's primary-key value otherwise. An empty
    /// key is a programmer error and fails the request.
    pub fn key_of(&self, request: &Request) -> anyhow::Result<String> {
        if let Some(query) = &request.query {
            let key = query.key_of(&self.res.registry);
            if key.is_empty() {
                return Err(ServiceError::EmptyKey(query.root_type().to_string()).into());
            }
            return Ok(key);
        }
        let element = request
            .elements
            .first()
            .ok_or(ServiceError::EmptyRequest)?;
        let record = element
            .as_record()
            .ok_or_else(|| ServiceError::TypeMismatch {
                got: element.kind_name().to_string(),
                want: self.options.item_type.clone(),
            })?;
        let key = self
            .res
            .registry
            .primary_key_value(record)
            .unwrap_or_default();
        if key.is_empty() || key.chars().all(|c| c == ',') {
            return Err(ServiceError::EmptyKey(record.type_name.clone()).into());
        }
        Ok(key)
    }

    async fn do_write(&self, action: Action, request: Request) -> anyhow::Result<QueryResult> {
        let elements = self.flatten(request.elements);
        let Some(elements) = self.apply(Side::Before, action, elements)? else {
            return Ok(QueryResult::empty());
        };

        if let Some(cache) = &self.cache {
            for element in &elements {
                match action {
                    Action::Patch => {
                        if !cache.patch(element) {
                            // Miss: pull the current record into the cache
                            // first, then apply the partial merge.
                            if let Some(current) = self.fetch_by_example(element).await? {
                                cache.post(&current);
                                cache.patch(element);
                            }
                        }
                    }
                    _ => cache.post(element),
                }
            }
        }

        self.store.write(action, elements.clone()).await?;
        self.apply(Side::After, action, elements)?;
        Ok(QueryResult::empty())
    }

    /// A single element of the list wrapper type flattens into its slice of
    /// items, accommodating list-shaped payloads.
    fn flatten(&self, elements: Vec<Value>) -> Vec<Value> {
        if elements.len() == 1 {
            if let Some(items) = self.list_items(&elements[0]) {
                return items;
            }
        }
        elements
    }

    fn list_items(&self, element: &Value) -> Option<Vec<Value>> {
        let record = element.as_record()?;
        if record.type_name != self.options.item_list_type {
            return None;
        }
        let node = self.res.registry.node(&record.type_name).ok()?;
        for (name, attr) in node.attributes.iter() {
            if attr.is_slice && attr.type_name == self.options.item_type {
                if let Some(Value::List(items)) = record.get(name) {
                    return Some(items.clone());
                }
            }
        }
        None
    }

    fn apply(
        &self,
        side: Side,
        action: Action,
        elements: Vec<Value>,
    ) -> anyhow::Result<Option<Vec<Value>>> {
        let Some(callback) = &self.callback else {
            return Ok(Some(elements));
        };
        let mut out = Vec::with_capacity(elements.len());
        for element in &elements {
            let flow = match side {
                Side::Before => callback.before(action, element)?,
                Side::After => callback.after(action, element)?,
            };
            match flow {
                Flow::Next => out.push(element.clone()),
                Flow::Replace(value) => out.push(value),
                Flow::ReplaceMany(values) => out.extend(values),
                Flow::Stop => return Ok(None),
            }
        }
        Ok(Some(out))
    }

    /// Synthesize the by-example query of an element: equality over every
    /// primary-key field, string-kinded values quoted, others bare.
    pub fn example_query(&self, element: &Value) -> anyhow::Result<Query> {
        let record = element
            .as_record()
            .ok_or_else(|| ServiceError::TypeMismatch {
                got: element.kind_name().to_string(),
                want: self.options.item_type.clone(),
            })?;
        if record.type_name != self.options.item_type {
            return Err(ServiceError::TypeMismatch {
                got: record.type_name.clone(),
                want: self.options.item_type.clone(),
            }
            .into());
        }
        let fields = self.res.registry.primary_fields(&record.type_name);
        if fields.is_empty() {
            return Err(ServiceError::EmptyKey(record.type_name.clone()).into());
        }
        let node = self.res.registry.node(&record.type_name)?;

        let mut text = format!("select * from {} where ", record.type_name);
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                text.push_str(" and ");
            }
            let value = record
                .get(field)
                .map(|v| v.plain_string())
                .unwrap_or_default();
            let is_string = node
                .attributes
                .get(field)
                .map(|a| a.type_name == "string")
                .unwrap_or(false);
            if is_string {
                text.push_str(&format!("{field}='{value}'"));
            } else {
                text.push_str(&format!("{field}={value}"));
            }
        }
        Ok(Query::parse(&text, &self.res.registry)?)
    }

    async fn fetch_by_example(&self, element: &Value) -> anyhow::Result<Option<Value>> {
        let query = self.example_query(element)?;
        let result = self.store.read(&query).await?;
        Ok(result.elements.into_iter().next())
    }

    fn populate_cache(&self, result: &QueryResult) {
        if let Some(cache) = &self.cache {
            for element in &result.elements {
                cache.post(element);
            }
        }
    }

    fn cache_fetch(&self, cache: &RecordCache, query: &Query) -> Option<QueryResult> {
        if cache.is_empty() {
            return None;
        }
        let start = query.page() as usize * query.limit() as usize;
        let block = if query.limit() == 0 {
            100
        } else {
            query.limit() as usize
        };
        let (values, meta) = cache.fetch(start, block, query);
        if values.is_empty() && start == 0 {
            return None;
        }
        Some(QueryResult::of(values, Some(meta)))
    }
}

enum Side {
    Before,
    After,
}

/*!
 * @file memory.rs
 * @brief In-memory implementation of the store facade
 */

use std::cmp::Ordering;

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::{PersistorError, Result};
use crate::options::{FindOptions, UpdateOptions, WriteOption};
use crate::persistor_debug;
use crate::store::DocStore;

/// Store facade over process-local collections. Used for development and
/// hermetic tests; mirrors the driver-visible behavior of the real backend
/// for equality/comparison queries, the `$set` operator family, sort, skip,
/// limit, and projections. Acknowledgement levels are accepted and ignored.
pub struct MemoryStore {
    collections: RwLock<IndexMap<String, Vec<Document>>>,
    use_object_id: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(IndexMap::new()),
            use_object_id: false,
        }
    }

    /// Generated ids become BSON ObjectIds instead of hex strings.
    pub fn with_object_ids(mut self) -> Self {
        self.use_object_id = true;
        self
    }

    fn new_id(&self) -> (Bson, String) {
        let oid = ObjectId::new();
        let hex = oid.to_hex();
        let value = if self.use_object_id {
            Bson::ObjectId(oid)
        } else {
            Bson::String(hex.clone())
        };
        (value, hex)
    }

    fn assign_id(&self, document: &mut Document) -> Option<String> {
        if document.contains_key("_id") {
            return None;
        }
        let (value, hex) = self.new_id();
        document.insert("_id", value);
        Some(hex)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocStore for MemoryStore {
    async fn save_with_options(
        &self,
        collection: &str,
        document: Document,
        _write_option: Option<WriteOption>,
    ) -> Result<Option<String>> {
        let mut document = document;
        let generated = self.assign_id(&mut document);

        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();

        if generated.is_some() {
            docs.push(document);
            return Ok(generated);
        }

        // Upsert by _id: replace in place, or append when absent.
        let id = document.get("_id").cloned().unwrap_or(Bson::Null);
        match docs
            .iter()
            .position(|doc| doc.get("_id").map_or(false, |v| values_equal(v, &id)))
        {
            Some(pos) => docs[pos] = document,
            None => docs.push(document),
        }
        Ok(None)
    }

    async fn insert_with_options(
        &self,
        collection: &str,
        document: Document,
        _write_option: Option<WriteOption>,
    ) -> Result<Option<String>> {
        let mut document = document;
        let generated = self.assign_id(&mut document);

        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();

        if let Some(id) = document.get("_id") {
            if docs
                .iter()
                .any(|doc| doc.get("_id").map_or(false, |v| values_equal(v, id)))
            {
                return Err(PersistorError::Store(format!(
                    "E11000 duplicate key error collection: {} dup key: {}",
                    collection, id
                )));
            }
        }

        docs.push(document);
        Ok(generated)
    }

    async fn update_with_options(
        &self,
        collection: &str,
        query: Document,
        update: Document,
        options: UpdateOptions,
    ) -> Result<()> {
        validate_update(&update)?;

        let mut collections = self.collections.write();

        if let Some(docs) = collections.get_mut(collection) {
            let mut updated = 0usize;
            for doc in docs.iter_mut() {
                if matches_query(doc, &query) {
                    apply_update(doc, &update)?;
                    updated += 1;
                    if !options.multi {
                        break;
                    }
                }
            }
            if updated > 0 {
                return Ok(());
            }
        }

        if options.upsert {
            let mut seed = upsert_seed(&query);
            apply_update(&mut seed, &update)?;
            if !seed.contains_key("_id") {
                let (value, _) = self.new_id();
                seed.insert("_id", value);
            }
            collections
                .entry(collection.to_string())
                .or_default()
                .push(seed);
        }
        Ok(())
    }

    async fn replace_with_options(
        &self,
        collection: &str,
        query: Document,
        replacement: Document,
        options: UpdateOptions,
    ) -> Result<()> {
        if replacement.keys().any(|key| key.starts_with('$')) {
            return Err(PersistorError::Store(
                "replacement document must not contain update operators".to_string(),
            ));
        }

        let mut collections = self.collections.write();

        if let Some(docs) = collections.get_mut(collection) {
            if let Some(pos) = docs.iter().position(|doc| matches_query(doc, &query)) {
                let id = docs[pos].get("_id").cloned().unwrap_or(Bson::Null);
                let mut stored = replacement;
                match stored.get("_id") {
                    Some(existing) if !values_equal(existing, &id) => {
                        return Err(PersistorError::Store(
                            "the _id field cannot be changed".to_string(),
                        ));
                    }
                    Some(_) => {}
                    None => {
                        stored.insert("_id", id);
                    }
                }
                docs[pos] = stored;
                return Ok(());
            }
        }

        if options.upsert {
            let mut stored = replacement;
            if !stored.contains_key("_id") {
                match upsert_seed(&query).get("_id") {
                    Some(id) => {
                        stored.insert("_id", id.clone());
                    }
                    None => {
                        let (value, _) = self.new_id();
                        stored.insert("_id", value);
                    }
                }
            }
            collections
                .entry(collection.to_string())
                .or_default()
                .push(stored);
        }
        Ok(())
    }

    async fn find_with_options(
        &self,
        collection: &str,
        query: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        let collections = self.collections.read();
        let mut results: Vec<Document> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| matches_query(doc, &query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(collections);

        if let Some(sort) = &options.sort {
            sort_documents(&mut results, sort);
        }
        if options.skip > 0 {
            let skip = (options.skip as usize).min(results.len());
            results = results.split_off(skip);
        }
        if options.limit > 0 {
            results.truncate(options.limit as usize);
        }
        if let Some(fields) = &options.fields {
            if !fields.is_empty() {
                results = results
                    .iter()
                    .map(|doc| apply_projection(doc, fields))
                    .collect();
            }
        }
        Ok(results)
    }

    async fn find_one_with_fields(
        &self,
        collection: &str,
        query: Document,
        fields: Option<Document>,
    ) -> Result<Option<Document>> {
        let collections = self.collections.read();
        let found = collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| matches_query(doc, &query)).cloned());

        match (found, fields) {
            (Some(doc), Some(fields)) if !fields.is_empty() => {
                Ok(Some(apply_projection(&doc, &fields)))
            }
            (found, _) => Ok(found),
        }
    }

    async fn count(&self, collection: &str, query: Document) -> Result<i64> {
        let collections = self.collections.read();
        let count = collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| matches_query(doc, &query)).count())
            .unwrap_or(0);
        Ok(count as i64)
    }

    async fn remove_with_options(
        &self,
        collection: &str,
        query: Document,
        _write_option: Option<WriteOption>,
    ) -> Result<()> {
        let mut collections = self.collections.write();
        if let Some(docs) = collections.get_mut(collection) {
            docs.retain(|doc| !matches_query(doc, &query));
        }
        Ok(())
    }

    async fn remove_one_with_options(
        &self,
        collection: &str,
        query: Document,
        _write_option: Option<WriteOption>,
    ) -> Result<()> {
        let mut collections = self.collections.write();
        if let Some(docs) = collections.get_mut(collection) {
            if let Some(pos) = docs.iter().position(|doc| matches_query(doc, &query)) {
                docs.remove(pos);
            }
        }
        Ok(())
    }

    async fn create_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(PersistorError::Store(format!(
                "collection '{}' already exists",
                name
            )));
        }
        collections.insert(name.to_string(), Vec::new());
        Ok(())
    }

    async fn get_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.read();
        Ok(collections.keys().cloned().collect())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write();
        collections.shift_remove(name);
        Ok(())
    }

    async fn run_command(&self, command: Document) -> Result<Document> {
        let name = match command.keys().next() {
            Some(name) => name.clone(),
            None => {
                return Err(PersistorError::Store(
                    "empty command document".to_string(),
                ))
            }
        };

        match name.as_str() {
            "ping" => {
                let mut response = Document::new();
                response.insert("ok", 1.0);
                Ok(response)
            }
            "isMaster" | "ismaster" | "hello" => {
                let mut response = Document::new();
                response.insert("ismaster", true);
                response.insert("maxBsonObjectSize", 16777216);
                response.insert("maxMessageSizeBytes", 48000000);
                response.insert("maxWriteBatchSize", 100000);
                response.insert("localTime", chrono::Utc::now().to_rfc3339());
                response.insert("minWireVersion", 0);
                response.insert("maxWireVersion", 17);
                response.insert("readOnly", false);
                response.insert("ok", 1.0);
                Ok(response)
            }
            "buildInfo" => {
                let mut response = Document::new();
                response.insert("version", "7.0.0");
                response.insert("gitVersion", "persistor-memory");
                response.insert("versionArray", vec![7, 0, 0, 0]);
                response.insert("bits", 64);
                response.insert("debug", false);
                response.insert("maxBsonObjectSize", 16777216);
                response.insert("ok", 1.0);
                Ok(response)
            }
            other => Err(PersistorError::Store(format!(
                "no such command: '{}'",
                other
            ))),
        }
    }

    async fn start(&self) -> Result<()> {
        persistor_debug!("In-memory store ready");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        persistor_debug!("In-memory store released");
        Ok(())
    }
}

fn validate_update(update: &Document) -> Result<()> {
    if update.is_empty() {
        return Err(PersistorError::Store(
            "update document must have at least one element".to_string(),
        ));
    }
    if !update.keys().all(|key| key.starts_with('$')) {
        return Err(PersistorError::Store(
            "update document must contain only update operators".to_string(),
        ));
    }
    Ok(())
}

fn apply_update(target: &mut Document, update: &Document) -> Result<()> {
    for (op, operand) in update {
        let fields = match operand {
            Bson::Document(fields) => fields,
            _ => {
                return Err(PersistorError::Store(format!(
                    "operator '{}' requires a document operand",
                    op
                )))
            }
        };
        match op.as_str() {
            "$set" => {
                for (key, value) in fields {
                    target.insert(key.as_str(), value.clone());
                }
            }
            "$unset" => {
                for (key, _) in fields {
                    target.remove(key);
                }
            }
            "$inc" => {
                for (key, value) in fields {
                    let current = target.get(key).cloned().unwrap_or(Bson::Int32(0));
                    let sum = numeric_add(&current, value).ok_or_else(|| {
                        PersistorError::Store(format!(
                            "cannot apply $inc to field '{}'",
                            key
                        ))
                    })?;
                    target.insert(key.as_str(), sum);
                }
            }
            "$push" => {
                for (key, value) in fields {
                    match target.get(key).cloned() {
                        None => {
                            target.insert(key.as_str(), Bson::Array(vec![value.clone()]));
                        }
                        Some(Bson::Array(mut items)) => {
                            items.push(value.clone());
                            target.insert(key.as_str(), Bson::Array(items));
                        }
                        Some(_) => {
                            return Err(PersistorError::Store(format!(
                                "cannot apply $push to non-array field '{}'",
                                key
                            )))
                        }
                    }
                }
            }
            other => {
                return Err(PersistorError::Store(format!(
                    "unsupported update operator '{}'",
                    other
                )))
            }
        }
    }
    Ok(())
}

/// Equality fields of the query become the base of an upserted document,
/// mirroring server-side upsert construction.
fn upsert_seed(query: &Document) -> Document {
    let mut seed = Document::new();
    for (key, value) in query {
        if key.starts_with('$') {
            continue;
        }
        if let Bson::Document(cond) = value {
            if is_operator_doc(cond) {
                continue;
            }
        }
        seed.insert(key.as_str(), value.clone());
    }
    seed
}

fn is_operator_doc(doc: &Document) -> bool {
    doc.keys().next().map_or(false, |key| key.starts_with('$'))
}

fn matches_query(document: &Document, query: &Document) -> bool {
    query.iter().all(|(key, expected)| {
        let actual = document.get(key);
        match expected {
            Bson::Document(cond) if is_operator_doc(cond) => matches_operators(actual, cond),
            _ => actual.map_or(false, |value| values_equal(value, expected)),
        }
    })
}

fn matches_operators(actual: Option<&Bson>, cond: &Document) -> bool {
    cond.iter().all(|(op, operand)| match op.as_str() {
        "$eq" => actual.map_or(false, |value| values_equal(value, operand)),
        "$ne" => !actual.map_or(false, |value| values_equal(value, operand)),
        "$gt" => compare_matches(actual, operand, |ord| ord == Ordering::Greater),
        "$gte" => compare_matches(actual, operand, |ord| ord != Ordering::Less),
        "$lt" => compare_matches(actual, operand, |ord| ord == Ordering::Less),
        "$lte" => compare_matches(actual, operand, |ord| ord != Ordering::Greater),
        "$in" => match operand {
            Bson::Array(items) => actual
                .map_or(false, |value| items.iter().any(|item| values_equal(value, item))),
            _ => false,
        },
        "$nin" => match operand {
            Bson::Array(items) => !actual
                .map_or(false, |value| items.iter().any(|item| values_equal(value, item))),
            _ => false,
        },
        "$exists" => actual.is_some() == truthy(operand),
        _ => false,
    })
}

fn compare_matches(actual: Option<&Bson>, operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
    match actual {
        Some(value) if type_rank(value) == type_rank(operand) => {
            accept(bson_cmp(value, operand))
        }
        _ => false,
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (bson_to_f64(a), bson_to_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn bson_to_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(d) => Some(*d),
        _ => None,
    }
}

/// Cross-type ordering follows the server's type brackets so mixed-type
/// sorts are deterministic.
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        _ => 12,
    }
}

fn bson_cmp(a: &Bson, b: &Bson) -> Ordering {
    let (rank_a, rank_b) = (type_rank(a), type_rank(b));
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            x.timestamp_millis().cmp(&y.timestamp_millis())
        }
        _ => match (bson_to_f64(a), bson_to_f64(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

fn sort_direction(value: &Bson) -> i64 {
    match value {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        Bson::Double(d) => {
            if *d < 0.0 {
                -1
            } else {
                1
            }
        }
        _ => 1,
    }
}

fn sort_documents(documents: &mut [Document], sort: &Document) {
    documents.sort_by(|a, b| {
        for (key, dir) in sort {
            let left = a.get(key).unwrap_or(&Bson::Null);
            let right = b.get(key).unwrap_or(&Bson::Null);
            let ordering = bson_cmp(left, right);
            if ordering != Ordering::Equal {
                return if sort_direction(dir) < 0 {
                    ordering.reverse()
                } else {
                    ordering
                };
            }
        }
        Ordering::Equal
    });
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(d) => *d != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

/// Projection follows the server's rules: any truthy non-`_id` key selects
/// inclusion mode, `_id` stays unless explicitly excluded, and exclusion
/// mode drops only the listed keys.
fn apply_projection(document: &Document, fields: &Document) -> Document {
    let include_mode = fields
        .iter()
        .any(|(key, value)| key != "_id" && truthy(value));
    let id_spec = fields.get("_id").map(truthy);

    let mut result = Document::new();
    if include_mode {
        for (key, value) in document {
            let keep = if key == "_id" {
                id_spec.unwrap_or(true)
            } else {
                fields.get(key).map(truthy).unwrap_or(false)
            };
            if keep {
                result.insert(key.as_str(), value.clone());
            }
        }
    } else {
        for (key, value) in document {
            let excluded = if key == "_id" {
                id_spec.map(|keep| !keep).unwrap_or(false)
            } else {
                fields.get(key).map(|value| !truthy(value)).unwrap_or(false)
            };
            if !excluded {
                result.insert(key.as_str(), value.clone());
            }
        }
    }
    result
}

fn numeric_add(a: &Bson, b: &Bson) -> Option<Bson> {
    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => Some(Bson::Int32(x.wrapping_add(*y))),
        (Bson::Int32(x), Bson::Int64(y)) => Some(Bson::Int64(i64::from(*x).wrapping_add(*y))),
        (Bson::Int64(x), Bson::Int32(y)) => Some(Bson::Int64(x.wrapping_add(i64::from(*y)))),
        (Bson::Int64(x), Bson::Int64(y)) => Some(Bson::Int64(x.wrapping_add(*y))),
        _ => match (bson_to_f64(a), bson_to_f64(b)) {
            (Some(x), Some(y)) => Some(Bson::Double(x + y)),
            _ => None,
        },
    }
}

/*!
 * Action dispatch table for the store service proxy
 * Routes named actions from request metadata to facade calls
 */

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bson::{Bson, Document};
use futures::future::BoxFuture;

use crate::envelope::{Reply, Request};
use crate::error::{PersistorError, Result};
use crate::options::{read_write_option, FindOptions, UpdateOptions};
use crate::store::DocStore;
use crate::{persistor_debug, persistor_info, persistor_warn};

pub type HandlerFuture = BoxFuture<'static, Result<Option<Bson>>>;
pub type ActionHandler = Box<dyn Fn(Arc<dyn DocStore>, Document) -> HandlerFuture + Send + Sync>;

/// Routes requests to facade calls by the action named in the request
/// metadata. The handler table is built once and never mutated afterwards;
/// the only shared state is the store handle itself.
///
/// Every dispatched request resolves to exactly one outcome: a reply
/// (success or failure), no reply for the lifecycle actions, or a protocol
/// error when the action is missing or unknown. Protocol errors are raised
/// before any facade call and are the caller's to surface; they never turn
/// into failure replies.
pub struct ActionDispatcher {
    store: Arc<dyn DocStore>,
    handlers: HashMap<String, ActionHandler>,
}

impl ActionDispatcher {
    pub fn new(store: Arc<dyn DocStore>) -> Self {
        let mut dispatcher = Self {
            store,
            handlers: HashMap::new(),
        };
        dispatcher.register_catalogue();
        persistor_info!(
            "Action dispatcher initialized with {} actions",
            dispatcher.handlers.len()
        );
        dispatcher
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.handlers.contains_key(action)
    }

    pub fn actions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Dispatches one request. `Ok(Some(reply))` carries the single reply,
    /// `Ok(None)` means the action produces no reply (start/stop), and
    /// `Err` is a protocol error raised before any facade call.
    pub async fn dispatch(&self, request: &Request) -> Result<Option<Reply>> {
        let action = request
            .action()
            .ok_or_else(|| PersistorError::Protocol("action not specified".to_string()))?;

        let handler = self
            .handlers
            .get(action)
            .ok_or_else(|| PersistorError::Protocol(format!("Invalid action: {}", action)))?;

        persistor_debug!("Dispatching action: {}", action);

        match handler(Arc::clone(&self.store), request.body.clone()).await {
            Ok(Some(value)) => Ok(Some(Reply::Success(value))),
            Ok(None) => Ok(None),
            Err(err) => {
                let message = err.to_string();
                persistor_warn!("Action '{}' failed: {}", action, message);
                Ok(Some(Reply::failure(message)))
            }
        }
    }

    fn register<F, Fut>(&mut self, action: &str, handler: F)
    where
        F: Fn(Arc<dyn DocStore>, Document) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Bson>>> + Send + 'static,
    {
        self.handlers.insert(
            action.to_string(),
            Box::new(move |store, payload| Box::pin(handler(store, payload))),
        );
    }

    fn register_catalogue(&mut self) {
        self.register("save", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let document = required_document(&payload, "document")?;
            let id = store.save(&collection, document).await?;
            Ok(id_value(id))
        });

        self.register("saveWithOptions", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let document = required_document(&payload, "document")?;
            let write_option = read_write_option(&payload, "writeOption")?;
            let id = store
                .save_with_options(&collection, document, write_option)
                .await?;
            Ok(id_value(id))
        });

        self.register("insert", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let document = required_document(&payload, "document")?;
            let id = store.insert(&collection, document).await?;
            Ok(id_value(id))
        });

        self.register("insertWithOptions", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let document = required_document(&payload, "document")?;
            let write_option = read_write_option(&payload, "writeOption")?;
            let id = store
                .insert_with_options(&collection, document, write_option)
                .await?;
            Ok(id_value(id))
        });

        self.register("update", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let query = required_document(&payload, "query")?;
            let update = required_document(&payload, "update")?;
            store.update(&collection, query, update).await?;
            Ok(Some(Bson::Null))
        });

        self.register("updateWithOptions", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let query = required_document(&payload, "query")?;
            let update = required_document(&payload, "update")?;
            let options =
                UpdateOptions::from_document(optional_document(&payload, "options")?.as_ref())?;
            store
                .update_with_options(&collection, query, update, options)
                .await?;
            Ok(Some(Bson::Null))
        });

        self.register("replace", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let query = required_document(&payload, "query")?;
            let replacement = required_document(&payload, "replace")?;
            store.replace(&collection, query, replacement).await?;
            Ok(Some(Bson::Null))
        });

        self.register("replaceWithOptions", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let query = required_document(&payload, "query")?;
            let replacement = required_document(&payload, "replace")?;
            let options =
                UpdateOptions::from_document(optional_document(&payload, "options")?.as_ref())?;
            store
                .replace_with_options(&collection, query, replacement, options)
                .await?;
            Ok(Some(Bson::Null))
        });

        self.register("find", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let query = required_document(&payload, "query")?;
            let results = store.find(&collection, query).await?;
            Ok(Some(document_array(results)))
        });

        self.register("findWithOptions", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let query = required_document(&payload, "query")?;
            let options =
                FindOptions::from_document(optional_document(&payload, "options")?.as_ref())?;
            let results = store
                .find_with_options(&collection, query, options)
                .await?;
            Ok(Some(document_array(results)))
        });

        self.register("findOne", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let query = required_document(&payload, "query")?;
            let result = store.find_one(&collection, query).await?;
            Ok(Some(result.map(Bson::Document).unwrap_or(Bson::Null)))
        });

        self.register("findOneWithFields", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let query = required_document(&payload, "query")?;
            let fields = optional_document(&payload, "fields")?;
            let result = store
                .find_one_with_fields(&collection, query, fields)
                .await?;
            Ok(Some(result.map(Bson::Document).unwrap_or(Bson::Null)))
        });

        self.register("count", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let query = required_document(&payload, "query")?;
            let count = store.count(&collection, query).await?;
            Ok(Some(Bson::Int64(count)))
        });

        self.register("remove", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let query = required_document(&payload, "query")?;
            store.remove(&collection, query).await?;
            Ok(Some(Bson::Null))
        });

        self.register("removeWithOptions", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let query = required_document(&payload, "query")?;
            let write_option = read_write_option(&payload, "writeOption")?;
            store
                .remove_with_options(&collection, query, write_option)
                .await?;
            Ok(Some(Bson::Null))
        });

        self.register("removeOne", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let query = required_document(&payload, "query")?;
            store.remove_one(&collection, query).await?;
            Ok(Some(Bson::Null))
        });

        self.register("removeOneWithOptions", |store, payload| async move {
            let collection = required_str(&payload, "collection")?;
            let query = required_document(&payload, "query")?;
            let write_option = read_write_option(&payload, "writeOption")?;
            store
                .remove_one_with_options(&collection, query, write_option)
                .await?;
            Ok(Some(Bson::Null))
        });

        self.register("createCollection", |store, payload| async move {
            let name = required_str(&payload, "collectionName")?;
            store.create_collection(&name).await?;
            Ok(Some(Bson::Null))
        });

        self.register("getCollections", |store, _payload| async move {
            let names = store.get_collections().await?;
            Ok(Some(Bson::Array(
                names.into_iter().map(Bson::String).collect(),
            )))
        });

        self.register("dropCollection", |store, payload| async move {
            let name = required_str(&payload, "collection")?;
            store.drop_collection(&name).await?;
            Ok(Some(Bson::Null))
        });

        self.register("runCommand", |store, payload| async move {
            let command = required_document(&payload, "command")?;
            let response = store.run_command(command).await?;
            Ok(Some(Bson::Document(response)))
        });

        // Lifecycle actions complete without a reply.
        self.register("start", |store, _payload| async move {
            store.start().await?;
            Ok(None)
        });

        self.register("stop", |store, _payload| async move {
            store.stop().await?;
            Ok(None)
        });
    }
}

fn id_value(id: Option<String>) -> Option<Bson> {
    Some(id.map(Bson::String).unwrap_or(Bson::Null))
}

fn document_array(documents: Vec<Document>) -> Bson {
    Bson::Array(documents.into_iter().map(Bson::Document).collect())
}

fn required_str(payload: &Document, key: &str) -> Result<String> {
    match payload.get(key) {
        Some(Bson::String(value)) => Ok(value.clone()),
        Some(_) => Err(PersistorError::Argument(format!(
            "field '{}' must be a string",
            key
        ))),
        None => Err(PersistorError::Argument(format!(
            "missing required field '{}'",
            key
        ))),
    }
}

fn required_document(payload: &Document, key: &str) -> Result<Document> {
    match payload.get(key) {
        Some(Bson::Document(value)) => Ok(value.clone()),
        Some(_) => Err(PersistorError::Argument(format!(
            "field '{}' must be a document",
            key
        ))),
        None => Err(PersistorError::Argument(format!(
            "missing required field '{}'",
            key
        ))),
    }
}

fn optional_document(payload: &Document, key: &str) -> Result<Option<Document>> {
    match payload.get(key) {
        None | Some(Bson::Null) => Ok(None),
        Some(Bson::Document(value)) => Ok(Some(value.clone())),
        Some(_) => Err(PersistorError::Argument(format!(
            "field '{}' must be a document",
            key
        ))),
    }
}

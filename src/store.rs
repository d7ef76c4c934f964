/*!
 * @file store.rs
 * @brief Facade trait over the backing document store
 */

use async_trait::async_trait;
use bson::Document;

use crate::error::Result;
use crate::options::{FindOptions, UpdateOptions, WriteOption};

/// The operation catalogue exposed over the bus. One method per action; the
/// dispatcher holds a shared `Arc<dyn DocStore>` and forwards payload fields
/// positionally.
///
/// Mutating methods that return `Option<String>` reply with the generated
/// document id only when the submitted document carried no `_id`; documents
/// arriving with an `_id` yield `None`.
///
/// The plain variants delegate to their `*_with_options` counterparts with
/// default options, so backends only implement the option-taking forms.
#[async_trait]
pub trait DocStore: Send + Sync {
    /// Inserts the document, or fully replaces the stored document sharing
    /// its `_id` when one already exists.
    async fn save(&self, collection: &str, document: Document) -> Result<Option<String>> {
        self.save_with_options(collection, document, None).await
    }

    async fn save_with_options(
        &self,
        collection: &str,
        document: Document,
        write_option: Option<WriteOption>,
    ) -> Result<Option<String>>;

    /// Inserts the document; fails if its `_id` is already present.
    async fn insert(&self, collection: &str, document: Document) -> Result<Option<String>> {
        self.insert_with_options(collection, document, None).await
    }

    async fn insert_with_options(
        &self,
        collection: &str,
        document: Document,
        write_option: Option<WriteOption>,
    ) -> Result<Option<String>>;

    /// Applies update operators to the first matching document.
    async fn update(&self, collection: &str, query: Document, update: Document) -> Result<()> {
        self.update_with_options(collection, query, update, UpdateOptions::default())
            .await
    }

    async fn update_with_options(
        &self,
        collection: &str,
        query: Document,
        update: Document,
        options: UpdateOptions,
    ) -> Result<()>;

    /// Replaces the first matching document wholesale.
    async fn replace(
        &self,
        collection: &str,
        query: Document,
        replacement: Document,
    ) -> Result<()> {
        self.replace_with_options(collection, query, replacement, UpdateOptions::default())
            .await
    }

    async fn replace_with_options(
        &self,
        collection: &str,
        query: Document,
        replacement: Document,
        options: UpdateOptions,
    ) -> Result<()>;

    /// Returns every matching document, in result order.
    async fn find(&self, collection: &str, query: Document) -> Result<Vec<Document>> {
        self.find_with_options(collection, query, FindOptions::default())
            .await
    }

    async fn find_with_options(
        &self,
        collection: &str,
        query: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>>;

    async fn find_one(&self, collection: &str, query: Document) -> Result<Option<Document>> {
        self.find_one_with_fields(collection, query, None).await
    }

    /// Like `find_one` with a projection; `None` fields means all fields.
    async fn find_one_with_fields(
        &self,
        collection: &str,
        query: Document,
        fields: Option<Document>,
    ) -> Result<Option<Document>>;

    async fn count(&self, collection: &str, query: Document) -> Result<i64>;

    /// Deletes every matching document.
    async fn remove(&self, collection: &str, query: Document) -> Result<()> {
        self.remove_with_options(collection, query, None).await
    }

    async fn remove_with_options(
        &self,
        collection: &str,
        query: Document,
        write_option: Option<WriteOption>,
    ) -> Result<()>;

    /// Deletes at most one matching document.
    async fn remove_one(&self, collection: &str, query: Document) -> Result<()> {
        self.remove_one_with_options(collection, query, None).await
    }

    async fn remove_one_with_options(
        &self,
        collection: &str,
        query: Document,
        write_option: Option<WriteOption>,
    ) -> Result<()>;

    /// Creates an empty collection; fails if it already exists.
    async fn create_collection(&self, name: &str) -> Result<()>;

    async fn get_collections(&self) -> Result<Vec<String>>;

    /// Drops the collection when present.
    async fn drop_collection(&self, name: &str) -> Result<()>;

    /// Runs a raw database command; the first key names the command.
    async fn run_command(&self, command: Document) -> Result<Document>;

    /// Verifies connectivity. Produces no reply value.
    async fn start(&self) -> Result<()>;

    /// Releases backend resources. Produces no reply value.
    async fn stop(&self) -> Result<()>;
}

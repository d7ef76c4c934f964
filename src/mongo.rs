/*!
 * @file mongo.rs
 * @brief MongoDB-backed implementation of the store facade
 */

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use futures::stream::StreamExt;
use mongodb::options::{Acknowledgment, ClientOptions, Credential, WriteConcern};
use mongodb::{Client, Database};
use std::time::Duration;

use crate::config::DriverConfig;
use crate::error::{PersistorError, Result};
use crate::options::{FindOptions, UpdateOptions, WriteOption};
use crate::store::DocStore;
use crate::{persistor_debug, persistor_info};

/// Store facade backed by the MongoDB driver. Document ids are generated
/// client-side before the write so the reply id and the stored `_id` agree
/// at every acknowledgement level.
pub struct MongoStore {
    client: Client,
    database: Database,
    use_object_id: bool,
}

impl MongoStore {
    /// Builds a client from the driver configuration. A configured
    /// `connection_string` wins over the individual connection fields;
    /// `db_name` and `use_object_id` apply either way. Connectivity is not
    /// verified here; `start` performs the ping.
    pub async fn connect(config: &DriverConfig) -> Result<Self> {
        let options = match &config.connection_string {
            Some(uri) => ClientOptions::parse(uri).await.map_err(|err| {
                PersistorError::Config(format!("invalid connection string: {}", err))
            })?,
            None => Self::options_from_fields(config).await?,
        };

        let client = Client::with_options(options)?;
        let database = client.database(&config.db_name);

        persistor_info!(
            "Store client configured for database '{}'",
            config.db_name
        );

        Ok(Self {
            client,
            database,
            use_object_id: config.use_object_id,
        })
    }

    async fn options_from_fields(config: &DriverConfig) -> Result<ClientOptions> {
        let seeds = if config.hosts.is_empty() {
            format!("{}:{}", config.host, config.port)
        } else {
            config.hosts.join(",")
        };
        let mut options = ClientOptions::parse(format!("mongodb://{}", seeds))
            .await
            .map_err(|err| {
                PersistorError::Config(format!("invalid host list '{}': {}", seeds, err))
            })?;

        options.repl_set_name = config.replica_set.clone();
        options.max_pool_size = Some(config.max_pool_size);
        options.min_pool_size = Some(config.min_pool_size);
        options.connect_timeout = Some(Duration::from_millis(config.connect_timeout_ms));
        options.server_selection_timeout =
            Some(Duration::from_millis(config.server_selection_timeout_ms));
        if config.max_idle_time_ms > 0 {
            options.max_idle_time = Some(Duration::from_millis(config.max_idle_time_ms));
        }
        options.app_name = Some("persistor".to_string());

        if let Some(username) = &config.username {
            options.credential = Some(
                Credential::builder()
                    .username(username.clone())
                    .password(config.password.clone())
                    .source(config.auth_source.clone())
                    .build(),
            );
        }

        Ok(options)
    }

    /// Stamps a fresh `_id` into documents that arrive without one and
    /// returns its hex form; documents that already carry an `_id` are left
    /// alone and yield `None`.
    fn assign_id(&self, document: &mut Document) -> Option<String> {
        if document.contains_key("_id") {
            return None;
        }
        let oid = ObjectId::new();
        let hex = oid.to_hex();
        if self.use_object_id {
            document.insert("_id", Bson::ObjectId(oid));
        } else {
            document.insert("_id", hex.clone());
        }
        Some(hex)
    }
}

fn write_concern(option: WriteOption) -> WriteConcern {
    match option {
        WriteOption::Acknowledged => WriteConcern::builder().w(Acknowledgment::Nodes(1)).build(),
        WriteOption::Unacknowledged => {
            WriteConcern::builder().w(Acknowledgment::Nodes(0)).build()
        }
        // The standalone fsync acknowledgement is retired in current
        // servers; journal acknowledgement is its closest equivalent.
        WriteOption::Fsynced | WriteOption::Journaled => WriteConcern::builder()
            .w(Acknowledgment::Nodes(1))
            .journal(true)
            .build(),
        WriteOption::ReplicaAcknowledged => {
            WriteConcern::builder().w(Acknowledgment::Nodes(2)).build()
        }
        WriteOption::Majority => WriteConcern::builder().w(Acknowledgment::Majority).build(),
    }
}

#[async_trait]
impl DocStore for MongoStore {
    async fn save_with_options(
        &self,
        collection: &str,
        document: Document,
        write_option: Option<WriteOption>,
    ) -> Result<Option<String>> {
        let mut document = document;
        match self.assign_id(&mut document) {
            Some(id) => {
                let coll = self.database.collection::<Document>(collection);
                let mut action = coll.insert_one(document);
                if let Some(option) = write_option {
                    action = action.write_concern(write_concern(option));
                }
                action.await?;
                Ok(Some(id))
            }
            None => {
                let id = document
                    .get("_id")
                    .cloned()
                    .unwrap_or(Bson::Null);
                let coll = self.database.collection::<Document>(collection);
                let mut action = coll.replace_one(doc! { "_id": id }, document).upsert(true);
                if let Some(option) = write_option {
                    action = action.write_concern(write_concern(option));
                }
                action.await?;
                Ok(None)
            }
        }
    }

    async fn insert_with_options(
        &self,
        collection: &str,
        document: Document,
        write_option: Option<WriteOption>,
    ) -> Result<Option<String>> {
        let mut document = document;
        let generated = self.assign_id(&mut document);

        let coll = self.database.collection::<Document>(collection);
        let mut action = coll.insert_one(document);
        if let Some(option) = write_option {
            action = action.write_concern(write_concern(option));
        }
        action.await?;
        Ok(generated)
    }

    async fn update_with_options(
        &self,
        collection: &str,
        query: Document,
        update: Document,
        options: UpdateOptions,
    ) -> Result<()> {
        let coll = self.database.collection::<Document>(collection);

        if options.multi {
            let mut action = coll.update_many(query, update).upsert(options.upsert);
            if let Some(option) = options.write_option {
                action = action.write_concern(write_concern(option));
            }
            action.await?;
        } else {
            let mut action = coll.update_one(query, update).upsert(options.upsert);
            if let Some(option) = options.write_option {
                action = action.write_concern(write_concern(option));
            }
            action.await?;
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
        let coll = self.database.collection::<Document>(collection);
        let mut action = coll
            .replace_one(query, replacement)
            .upsert(options.upsert);
        if let Some(option) = options.write_option {
            action = action.write_concern(write_concern(option));
        }
        action.await?;
        Ok(())
    }

    async fn find_with_options(
        &self,
        collection: &str,
        query: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        let coll = self.database.collection::<Document>(collection);

        let mut action = coll.find(query);
        if let Some(sort) = options.sort {
            action = action.sort(sort);
        }
        if let Some(fields) = options.fields {
            action = action.projection(fields);
        }
        if options.skip > 0 {
            action = action.skip(options.skip as u64);
        }
        if options.limit >= 0 {
            action = action.limit(options.limit);
        }

        let mut cursor = action.await?;
        let mut results = Vec::new();
        while let Some(next) = cursor.next().await {
            results.push(next?);
        }
        Ok(results)
    }

    async fn find_one_with_fields(
        &self,
        collection: &str,
        query: Document,
        fields: Option<Document>,
    ) -> Result<Option<Document>> {
        let coll = self.database.collection::<Document>(collection);
        let mut action = coll.find_one(query);
        if let Some(fields) = fields {
            action = action.projection(fields);
        }
        Ok(action.await?)
    }

    async fn count(&self, collection: &str, query: Document) -> Result<i64> {
        let coll = self.database.collection::<Document>(collection);
        let count = coll.count_documents(query).await?;
        Ok(count as i64)
    }

    async fn remove_with_options(
        &self,
        collection: &str,
        query: Document,
        write_option: Option<WriteOption>,
    ) -> Result<()> {
        let coll = self.database.collection::<Document>(collection);
        let mut action = coll.delete_many(query);
        if let Some(option) = write_option {
            action = action.write_concern(write_concern(option));
        }
        action.await?;
        Ok(())
    }

    async fn remove_one_with_options(
        &self,
        collection: &str,
        query: Document,
        write_option: Option<WriteOption>,
    ) -> Result<()> {
        let coll = self.database.collection::<Document>(collection);
        let mut action = coll.delete_one(query);
        if let Some(option) = write_option {
            action = action.write_concern(write_concern(option));
        }
        action.await?;
        Ok(())
    }

    async fn create_collection(&self, name: &str) -> Result<()> {
        self.database.create_collection(name).await?;
        Ok(())
    }

    async fn get_collections(&self) -> Result<Vec<String>> {
        Ok(self.database.list_collection_names().await?)
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        let coll = self.database.collection::<Document>(name);
        coll.drop().await?;
        Ok(())
    }

    async fn run_command(&self, command: Document) -> Result<Document> {
        Ok(self.database.run_command(command).await?)
    }

    async fn start(&self) -> Result<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        persistor_info!("Store connection verified");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        persistor_debug!("Shutting down store client");
        self.client.clone().shutdown().await;
        Ok(())
    }
}

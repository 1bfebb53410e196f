//! MongoDB connection/context management

use config::MongoConfig;
use mongodb::bson::doc;
use mongodb::{Client, Database, IndexModel};
use repo_core::{Entity, NamingPolicy, StoreError, ValidatedTableName};

use crate::repository::MongoRepository;

/// Connection manager for the MongoDB provider.
#[derive(Clone)]
pub struct MongoContext {
    client: Client,
    database: Database,
    naming: NamingPolicy,
    enforce_soft_delete: bool,
    use_transactions: bool,
}

impl MongoContext {
    pub async fn connect(config: &MongoConfig, naming: NamingPolicy) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(&config.uri)
            .await
            .map_err(|e| StoreError::store("connect", "mongodb", e))?;
        let database = client.database(&config.database);
        Ok(Self {
            client,
            database,
            naming,
            enforce_soft_delete: config.enforce_soft_delete,
            use_transactions: config.use_transactions,
        })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Derive and validate the collection name for an entity type. The same
    /// validation as the relational provider applies so a layout valid on
    /// one provider is valid on the other.
    pub fn collection_name<T: Entity>(&self) -> Result<String, StoreError> {
        let name = ValidatedTableName::new(&self.naming.collection_name(T::type_name()))?;
        Ok(name.into_string())
    }

    /// Build a repository for an entity type; capability flags are read once
    /// here and cached on the repository.
    pub fn repository<T: Entity>(&self) -> Result<MongoRepository<T>, StoreError> {
        Ok(MongoRepository::new(
            self.database
                .collection(&self.collection_name::<T>()?),
            self.client.clone(),
            T::soft_delete_capable() && self.enforce_soft_delete,
            self.use_transactions,
        ))
    }

    /// Create the standing-filter index for soft-delete-capable types.
    pub async fn ensure_indexes<T: Entity>(&self) -> Result<(), StoreError> {
        let Some(flag) = T::deleted_flag_field() else {
            return Ok(());
        };
        let collection = self
            .database
            .collection::<mongodb::bson::Document>(&self.collection_name::<T>()?);
        let index = IndexModel::builder().keys(doc! { flag: 1 }).build();
        collection
            .create_index(index)
            .await
            .map_err(|e| StoreError::store("ensure_indexes", T::type_name(), e))?;
        tracing::debug!(entity = T::type_name(), field = flag, "index bootstrap complete");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::store("health_check", "mongodb", e))?;
        Ok(())
    }
}

use crate::models::{Application, ApplicationFilter};
use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};
use mongodb::{Collection, Database, IndexModel};

/// Result of a conditional replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced,
    /// The record was changed by someone else since it was read.
    Stale,
    Missing,
}

/// Persistence for submitted applications.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn health_check(&self) -> Result<()>;

    async fn insert(&self, application: Application) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Application>>;

    /// Page of applications matching `filter`, newest first, with the total
    /// number of matches.
    async fn list(
        &self,
        filter: &ApplicationFilter,
        limit: u64,
        skip: u64,
    ) -> Result<(Vec<Application>, u64)>;

    /// Replace `current` with `updated`, but only while the stored record
    /// still has the status and `updated_at` of `current`.
    async fn replace(
        &self,
        current: &Application,
        updated: &Application,
    ) -> Result<ReplaceOutcome>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, id: &str) -> Result<bool>;
}

#[derive(Clone)]
pub struct MongoApplicationStore {
    db: Database,
    collection: Collection<Application>,
}

impl MongoApplicationStore {
    pub fn new(db: &Database) -> Self {
        Self {
            db: db.clone(),
            collection: db.collection("applications"),
        }
    }

    pub async fn init_indexes(&self) -> Result<()> {
        let email_index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(
                IndexOptions::builder()
                    .name("application_email_idx".to_string())
                    .build(),
            )
            .build();

        // Serves the status-filtered, newest-first listing
        let status_index = IndexModel::builder()
            .keys(doc! { "status": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("application_status_created_idx".to_string())
                    .build(),
            )
            .build();

        self.collection
            .create_indexes([email_index, status_index], None)
            .await?;

        tracing::info!("Application store indexes initialized");
        Ok(())
    }

    fn filter_document(filter: &ApplicationFilter) -> Result<Document> {
        let mut document = doc! {};
        if let Some(status) = filter.status {
            document.insert("status", mongodb::bson::to_bson(&status)?);
        }
        Ok(document)
    }
}

#[async_trait]
impl ApplicationStore for MongoApplicationStore {
    async fn health_check(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }

    async fn insert(&self, application: Application) -> Result<()> {
        self.collection.insert_one(application, None).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Application>> {
        let application = self.collection.find_one(doc! { "_id": id }, None).await?;
        Ok(application)
    }

    async fn list(
        &self,
        filter: &ApplicationFilter,
        limit: u64,
        skip: u64,
    ) -> Result<(Vec<Application>, u64)> {
        let filter = Self::filter_document(filter)?;

        let total = self.collection.count_documents(filter.clone(), None).await?;
        if skip >= total {
            return Ok((Vec::new(), total));
        }

        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .skip(skip)
            .limit(limit as i64)
            .build();

        let cursor = self.collection.find(filter, options).await?;
        let applications: Vec<Application> = cursor.try_collect().await?;

        Ok((applications, total))
    }

    async fn replace(
        &self,
        current: &Application,
        updated: &Application,
    ) -> Result<ReplaceOutcome> {
        let filter = doc! {
            "_id": &current.id,
            "status": mongodb::bson::to_bson(&current.status)?,
            "updated_at": BsonDateTime::from_chrono(current.updated_at),
        };

        let result = self.collection.replace_one(filter, updated, None).await?;
        if result.matched_count > 0 {
            return Ok(ReplaceOutcome::Replaced);
        }

        let exists = self
            .collection
            .count_documents(doc! { "_id": &current.id }, None)
            .await?
            > 0;
        Ok(if exists {
            ReplaceOutcome::Stale
        } else {
            ReplaceOutcome::Missing
        })
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = self.collection.delete_one(doc! { "_id": id }, None).await?;
        Ok(result.deleted_count > 0)
    }
}

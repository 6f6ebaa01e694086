use crate::connection::AdapterConfig;
use crate::core::record::{into_record, match_filter, set_patch, to_document};
use crate::core::{DbError, Result};
use crate::interface::{
    Collection, DatabaseConnection, DatabaseGetOne, DatabaseInsertOne, DatabaseTransaction,
    DatabaseUpdateOne,
};
use crate::transaction::{SessionSlot, TransactionId};
use async_trait::async_trait;
use mongodb::bson::{Document, doc};
use mongodb::options::{ClientOptions, ReturnDocument};
use mongodb::{Client, ClientSession, Database};
use tracing::{debug, info, warn};

/// Database used when neither the config nor the URI names one.
pub const DEFAULT_DATABASE: &str = "test";

/// Adapter over the MongoDB driver
///
/// Holds the client while connected and at most one session with an open
/// transaction. Every data operation runs inside that session when present.
///
/// # Examples
///
/// ```no_run
/// use mongo_adapter::{DatabaseConnection, MongoDbAdapter};
///
/// # async fn example() -> mongo_adapter::Result<()> {
/// let mut db = MongoDbAdapter::from_uri("mongodb://localhost:27001,localhost:27002")?;
/// db.connect().await?;
/// assert!(db.is_connected());
/// db.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct MongoDbAdapter {
    config: AdapterConfig,
    client: Option<Client>,
    database: Option<Database>,
    session: SessionSlot<ClientSession>,
}

impl MongoDbAdapter {
    /// Create an adapter. No I/O happens until `connect`.
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            config,
            client: None,
            database: None,
            session: SessionSlot::new(),
        }
    }

    /// Create an adapter for a connection string
    pub fn from_uri(uri: &str) -> Result<Self> {
        Ok(Self::new(AdapterConfig::from_url(uri)?))
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Name of the database operations run against, once connected
    pub fn database_name(&self) -> Option<&str> {
        self.database.as_ref().map(Database::name)
    }

    /// Id of the open transaction, if any
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.session.transaction_id()
    }

    async fn client_options(&self) -> Result<ClientOptions> {
        let mut options = ClientOptions::parse(self.config.uri.as_str()).await?;

        // The URI wins for the app name; explicit settings win for the rest
        if options.app_name.is_none() {
            options.app_name = self.config.app_name.clone();
        }
        if let Some(timeout) = self.config.connect_timeout {
            options.connect_timeout = Some(timeout);
        }
        if let Some(timeout) = self.config.server_selection_timeout {
            options.server_selection_timeout = Some(timeout);
        }
        if let Some(max) = self.config.max_pool_size {
            options.max_pool_size = Some(max);
        }
        if let Some(min) = self.config.min_pool_size {
            options.min_pool_size = Some(min);
        }

        Ok(options)
    }

    fn select_database(&self, client: &Client) -> Database {
        match &self.config.database {
            Some(name) => client.database(name),
            None => client
                .default_database()
                .unwrap_or_else(|| client.database(DEFAULT_DATABASE)),
        }
    }

    fn collection<C: Collection>(&self) -> Result<mongodb::Collection<Document>> {
        let database = self.database.as_ref().ok_or(DbError::NotConnected)?;
        Ok(database.collection::<Document>(C::NAME))
    }

    /// Abort and drop the open transaction, if any.
    ///
    /// The session is discarded whether or not the abort succeeds.
    async fn abort_session(&mut self) -> Result<()> {
        let Some(mut active) = self.session.take() else {
            debug!("rollback requested without an open transaction");
            return Ok(());
        };

        let id = active.id();
        let outcome = active.handle_mut().abort_transaction().await;

        match &outcome {
            Ok(()) => info!(transaction = %id, "transaction rolled back"),
            Err(e) => warn!(transaction = %id, error = %e, "abort failed, session discarded"),
        }

        outcome.map_err(DbError::from)
    }
}

#[async_trait]
impl DatabaseConnection for MongoDbAdapter {
    async fn connect(&mut self) -> Result<()> {
        if self.client.is_some() {
            return Ok(());
        }

        self.config.validate()?;
        let options = self.client_options().await?;
        let client = Client::with_options(options)?;
        let database = self.select_database(&client);

        // The driver connects lazily; ping so that network and auth
        // failures surface here rather than on the first operation.
        database.run_command(doc! { "ping": 1 }).await?;

        info!(
            uri = %self.config.to_url(),
            database = database.name(),
            "connected"
        );

        self.client = Some(client);
        self.database = Some(database);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        // Sessions must be gone before shutdown, or it waits for them
        let aborted = self.abort_session().await;

        self.database = None;
        if let Some(client) = self.client.take() {
            client.shutdown().await;
            info!(uri = %self.config.to_url(), "disconnected");
        }

        aborted
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }
}

#[async_trait]
impl DatabaseTransaction for MongoDbAdapter {
    async fn start_transaction(&mut self) -> Result<()> {
        self.session.ensure_vacant()?;
        let client = self.client.as_ref().ok_or(DbError::NotConnected)?;

        let mut session = client.start_session().await?;
        session.start_transaction().await?;

        let id = self.session.install(session)?;
        debug!(transaction = %id, "transaction started");
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        let active = self
            .session
            .active_mut()
            .ok_or(DbError::NoActiveTransaction)?;

        // On failure the session stays so the caller can retry or roll back
        active.handle_mut().commit_transaction().await?;

        if let Some(active) = self.session.take() {
            let id = active.id();
            let duration = active.duration();
            info!(transaction = %id, ?duration, "transaction committed");
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.abort_session().await
    }

    fn in_transaction(&self) -> bool {
        self.session.is_active()
    }
}

#[async_trait]
impl DatabaseInsertOne for MongoDbAdapter {
    async fn insert_one<C: Collection>(
        &mut self,
        record: &C::Record,
    ) -> Result<Option<C::Record>> {
        let collection = self.collection::<C>()?;
        let document = to_document(record)?;

        let action = collection.insert_one(&document);
        let inserted = match self.session.handle_mut() {
            Some(session) => action.session(session).await?,
            None => action.await?,
        };

        debug!(
            collection = C::NAME,
            id = %inserted.inserted_id,
            in_transaction = self.session.is_active(),
            "inserted one"
        );
        Ok(Some(into_record(document)?))
    }
}

#[async_trait]
impl DatabaseGetOne for MongoDbAdapter {
    async fn get_one<C: Collection>(&mut self, key: &C::Key) -> Result<Option<C::Record>> {
        let collection = self.collection::<C>()?;

        let action = collection.find_one(match_filter(key));
        let found = match self.session.handle_mut() {
            Some(session) => action.session(session).await?,
            None => action.await?,
        };

        debug!(collection = C::NAME, found = found.is_some(), "get one");
        found.map(into_record).transpose()
    }
}

#[async_trait]
impl DatabaseUpdateOne for MongoDbAdapter {
    async fn update_one<C: Collection>(
        &mut self,
        key: &C::Key,
        patch: &C::Patch,
    ) -> Result<Option<C::Record>> {
        let collection = self.collection::<C>()?;
        let update = set_patch(to_document(patch)?);

        let action = collection
            .find_one_and_update(match_filter(key), update)
            .return_document(ReturnDocument::After);
        let updated = match self.session.handle_mut() {
            Some(session) => action.session(session).await?,
            None => action.await?,
        };

        debug!(collection = C::NAME, found = updated.is_some(), "update one");
        updated.map(into_record).transpose()
    }
}

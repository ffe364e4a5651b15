//! # entstack-core
//!
//! Entry point for embedding entstack: a [`Database`] owns a shared
//! in-memory entity set together with the settings its queries run under.
//!
//! ```
//! use entstack_core::{Database, EntityStore};
//!
//! let db = Database::open();
//! db.query(r#"@es ["/component/title" "text"] !d + drop"#).unwrap();
//! assert_eq!(db.store().read().defs().len(), 1);
//! ```

pub mod config;

pub use config::{Config, ConfigError};
pub use entstack_query::{
    export_program, ErrorContext, QueryConfig, QueryError, QueryOptions, QueryStack, StackValue, StoreQuery,
};
pub use entstack_store::{
    shared, AddItem, AddOptions, BitField, Component, ComponentDef, DefSchema, Entity, EntitySet, EntityStore,
    Populate, PropertyType, StoreConfig, StoreError, StoreRef,
};
pub use entstack_types::{ComponentId, DefId, EntityId};

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A shared store plus the configuration its queries run with
#[derive(Clone)]
pub struct Database {
    store: StoreRef,
    config: Config,
}

impl Database {
    /// Empty in-memory database with default settings
    pub fn open() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = shared(EntitySet::with_config(config.store.clone()));
        tracing::debug!("opened database {}", store.read().uuid());
        Self { store, config }
    }

    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::from_file(path)?;
        Ok(Self::with_config(config))
    }

    pub fn store(&self) -> &StoreRef {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run a program on a fresh stack
    pub fn query(&self, source: &str) -> Result<QueryStack> {
        self.query_with(source, QueryOptions::default())
    }

    pub fn query_with(&self, source: &str, options: QueryOptions) -> Result<QueryStack> {
        let stack = entstack_query::query_with(&self.store, source, options, self.config.query.clone())?;
        Ok(stack)
    }

    /// Program text that rebuilds this database's defs and components
    pub fn export(&self) -> String {
        export_program(&*self.store.read())
    }

    /// Run an exported program against this database
    pub fn import(&self, program: &str) -> Result<()> {
        self.query(program)?;
        let store = self.store.read();
        tracing::info!(
            "imported into {}: {} entities, {} components",
            store.uuid(),
            store.entity_count(),
            store.component_count()
        );
        Ok(())
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::open()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store.read();
        f.debug_struct("Database")
            .field("uuid", &store.uuid())
            .field("entities", &store.entity_count())
            .field("config", &self.config)
            .finish()
    }
}

//! Object store declarations.

use crate::error::{CoreError, CoreResult};
use crate::query::Query;
use crate::shape::Shape;
use crate::store::ObjectStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_schema::{FieldPath, ObjectSchema};
use tessera_storage::{Connection, IndexDef, VersionChange};

/// Declaration of one named collection: its schema, primary key path and
/// secondary indexes.
///
/// Builders are values: [`add_index`](Self::add_index) returns a new
/// builder and leaves the receiver untouched. Cloning is cheap; the schema
/// and index set are shared.
///
/// ```
/// use tessera_core::ObjectStoreBuilder;
/// use tessera_schema::{FieldType, ObjectSchema};
///
/// let schema = ObjectSchema::new()
///     .field("id", FieldType::String)
///     .field("email", FieldType::String);
/// let users = ObjectStoreBuilder::new("users", schema, "id").unwrap();
/// let indexed = users.add_index("by_email", "email").unwrap();
///
/// assert_eq!(users.index_names().count(), 0);
/// assert_eq!(indexed.index_names().collect::<Vec<_>>(), ["by_email"]);
/// ```
#[derive(Debug, Clone)]
pub struct ObjectStoreBuilder {
    name: String,
    schema: Arc<ObjectSchema>,
    key_path: String,
    indexes: Arc<BTreeMap<String, IndexDef>>,
}

impl ObjectStoreBuilder {
    /// Declares a store keyed by the dotted `key_path`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDeclaration` if the name is empty, or the key path
    /// does not name a required field of a key type (string or integer).
    pub fn new(
        name: impl Into<String>,
        schema: impl Into<Arc<ObjectSchema>>,
        key_path: &str,
    ) -> CoreResult<Self> {
        let name = name.into();
        let schema = schema.into();
        if name.is_empty() {
            return Err(CoreError::invalid_declaration("store name is empty"));
        }

        let path = FieldPath::parse(key_path).map_err(|e| {
            CoreError::invalid_declaration(format!("key path of store '{name}': {e}"))
        })?;
        let field = schema.resolve(&path).ok_or_else(|| {
            CoreError::invalid_declaration(format!(
                "key path '{key_path}' of store '{name}' is not a declared field"
            ))
        })?;
        if field.is_optional() {
            return Err(CoreError::invalid_declaration(format!(
                "key path '{key_path}' of store '{name}' is optional"
            )));
        }
        if !field.ty().is_key_compatible() {
            return Err(CoreError::invalid_declaration(format!(
                "key path '{key_path}' of store '{name}' has type {}, which cannot be a key",
                field.ty().name()
            )));
        }

        Ok(Self {
            name,
            schema,
            key_path: key_path.to_string(),
            indexes: Arc::new(BTreeMap::new()),
        })
    }

    /// Returns a builder with a non-unique index added.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateIndex`, `IndexOnKeyPath` or `UnknownField`. The
    /// receiver is never modified.
    pub fn add_index(&self, name: &str, path: &str) -> CoreResult<Self> {
        self.with_index(IndexDef::new(name, path))
    }

    /// Returns a builder with a unique index added.
    ///
    /// # Errors
    ///
    /// As [`add_index`](Self::add_index).
    pub fn add_unique_index(&self, name: &str, path: &str) -> CoreResult<Self> {
        self.with_index(IndexDef::new(name, path).unique(true))
    }

    fn with_index(&self, index: IndexDef) -> CoreResult<Self> {
        if self.indexes.contains_key(&index.name) {
            return Err(CoreError::DuplicateIndex {
                store: self.name.clone(),
                index: index.name,
            });
        }
        if index.path == self.key_path {
            return Err(CoreError::IndexOnKeyPath {
                store: self.name.clone(),
                index: index.name,
                path: index.path,
            });
        }
        let declared = FieldPath::parse(&index.path)
            .ok()
            .and_then(|path| self.schema.resolve(&path))
            .is_some();
        if !declared {
            return Err(CoreError::unknown_field(index.path));
        }

        let mut indexes = (*self.indexes).clone();
        indexes.insert(index.name.clone(), index);
        Ok(Self {
            indexes: Arc::new(indexes),
            ..self.clone()
        })
    }

    /// Store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record schema.
    pub fn schema(&self) -> &ObjectSchema {
        &self.schema
    }

    /// Shared handle to the record schema.
    pub fn shared_schema(&self) -> Arc<ObjectSchema> {
        Arc::clone(&self.schema)
    }

    /// Primary key path.
    pub fn key_path(&self) -> &str {
        &self.key_path
    }

    /// Declared index, by name.
    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.get(name)
    }

    /// Declared indexes in name order.
    pub fn indexes(&self) -> impl Iterator<Item = &IndexDef> {
        self.indexes.values()
    }

    /// Declared index names in order.
    pub fn index_names(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    /// Builds a projection query over this store's record type.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` or `ShapeMismatch`.
    pub fn select(&self, shape: Shape) -> CoreResult<Query> {
        Query::new(Arc::clone(&self.schema), shape)
    }

    /// Creates the collection and every declared index.
    ///
    /// Only possible inside an upgrade.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the collection or an index exists.
    pub fn create(&self, tx: &mut dyn VersionChange) -> CoreResult<()> {
        tx.create_collection(&self.name, &self.key_path)?;
        for index in self.indexes.values() {
            tx.create_index(&self.name, index.clone())?;
        }
        tracing::debug!(store = %self.name, indexes = self.indexes.len(), "store created");
        Ok(())
    }

    /// Drops the collection.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the collection does not exist.
    pub fn delete(&self, tx: &mut dyn VersionChange) -> CoreResult<()> {
        tx.delete_collection(&self.name)?;
        tracing::debug!(store = %self.name, "store deleted");
        Ok(())
    }

    /// Binds the declaration to a live connection.
    #[must_use]
    pub fn bind(&self, connection: Arc<dyn Connection>) -> ObjectStore {
        ObjectStore::new(self.clone(), Some(connection))
    }

    /// A store handle with no connection. Every operation fails with
    /// `NotConnected`.
    #[must_use]
    pub fn unbound(&self) -> ObjectStore {
        ObjectStore::new(self.clone(), None)
    }
}

//! Startup-built collection of every entity's schema descriptor.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};

use sqlx::PgConnection;
use tracing::debug;

use crate::db::{
    errors::{DbError, Result},
    mapper::Mapper,
    schema::{Entity, SchemaDescriptor, TableSchema, describe, table_name_of},
};

/// Owns the descriptors of all registered entities.
///
/// Built once at startup and shared read-only afterwards; registration order is the order tables
/// are initialized in.
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    descriptors: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    tables: Vec<Arc<TableSchema>>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// Descriptor of a registered entity
    pub fn descriptor<T: Entity>(&self) -> Result<Arc<SchemaDescriptor<T>>> {
        self.descriptors
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|any| any.downcast::<SchemaDescriptor<T>>().ok())
            .ok_or_else(|| DbError::Configuration {
                entity: table_name_of::<T>(),
                message: "entity is not registered".to_string(),
            })
    }

    /// Tables of all registered entities, in registration order
    pub fn tables(&self) -> &[Arc<TableSchema>] {
        &self.tables
    }

    /// Mapper for `T` over the given connection
    pub fn mapper<'c, T: Entity>(&self, db: &'c mut PgConnection) -> Result<Mapper<'c, T>> {
        Ok(Mapper::new(db, self.descriptor::<T>()?))
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("tables", &self.tables.iter().map(|t| t.table.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Default)]
pub struct SchemaRegistryBuilder {
    registry: SchemaRegistry,
}

impl SchemaRegistryBuilder {
    /// Describe and register `T`. Registering the same type twice is a no-op.
    pub fn register<T: Entity>(mut self) -> Result<Self> {
        let type_id = TypeId::of::<T>();
        if self.registry.descriptors.contains_key(&type_id) {
            return Ok(self);
        }

        let descriptor = describe::<T>()?;
        let table = descriptor.shared_table();
        if self.registry.tables.iter().any(|t| t.table == table.table) {
            return Err(DbError::Configuration {
                entity: table_name_of::<T>(),
                message: format!("table {} is already used by another entity", table.table),
            });
        }

        debug!(table = %table.table, columns = table.columns.len(), "Registered entity schema");
        self.registry.tables.push(table);
        self.registry.descriptors.insert(type_id, Arc::new(descriptor));
        Ok(self)
    }

    pub fn build(self) -> SchemaRegistry {
        self.registry
    }
}

//! スキーマのメタデータ取得と親子関係の分類。

pub(crate) mod catalog_sql;
pub mod classify;
pub mod in_memory;
pub mod introspect;
pub mod model;

pub use classify::{AggregationIndex, AggregationInfo, AggregationInfoSource, AggregationType};
pub use in_memory::{ForeignKeyDef, InMemorySchema, TableDef};
pub use introspect::{CatalogIntrospector, SchemaIntrospector};
pub use model::{ManyToManyRef, ParentReference, ReferencingTable, SelfReference, TableMetadata};

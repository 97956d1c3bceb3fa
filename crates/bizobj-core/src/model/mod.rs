//! Property metadata, model schemas and in-memory model graphs

pub mod collection;
pub mod instance;
pub mod property;
pub mod record;
pub mod schema;
pub mod transfer;
pub mod value;

pub use collection::ModelCollection;
pub use instance::{ChildMut, ChildRef, ModelInstance, MutationState, Slot};
pub use property::{ChildModel, PropertyDescriptor, PropertyFlags};
pub use record::Record;
pub use schema::{ModelKind, ModelSchema, ModelSchemaBuilder};
pub use value::{DataType, Value};

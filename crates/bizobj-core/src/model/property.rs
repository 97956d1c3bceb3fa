use std::sync::Arc;

use super::schema::ModelSchema;
use super::value::DataType;

/// Behavior flags of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyFlags {
    pub is_key: bool,
    pub is_parent_key: bool,
    pub is_read_only: bool,
    pub is_on_transfer_out: bool,
    pub is_on_transfer_in: bool,
}

impl Default for PropertyFlags {
    fn default() -> Self {
        Self {
            is_key: false,
            is_parent_key: false,
            is_read_only: false,
            is_on_transfer_out: true,
            is_on_transfer_in: true,
        }
    }
}

/// Model held by a child property
#[derive(Debug, Clone)]
pub enum ChildModel {
    /// A single owned child instance
    Object(Arc<ModelSchema>),
    /// An owned, ordered collection of child instances
    Collection(Arc<ModelSchema>),
}

impl ChildModel {
    pub fn schema(&self) -> &Arc<ModelSchema> {
        match self {
            ChildModel::Object(schema) | ChildModel::Collection(schema) => schema,
        }
    }
}

/// Static metadata of one named, typed property
///
/// Built with the consuming setters below while a schema is being defined;
/// once moved into a `ModelSchema` it is only reachable by shared reference.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    name: String,
    data_type: DataType,
    flags: PropertyFlags,
    child_model: Option<ChildModel>,
}

impl PropertyDescriptor {
    /// Scalar property
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            flags: PropertyFlags::default(),
            child_model: None,
        }
    }

    /// Property owning a single child instance of `schema`
    pub fn child(name: impl Into<String>, schema: Arc<ModelSchema>) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Model,
            flags: PropertyFlags::default(),
            child_model: Some(ChildModel::Object(schema)),
        }
    }

    /// Property owning a collection of `schema` items
    pub fn collection(name: impl Into<String>, schema: Arc<ModelSchema>) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Collection,
            flags: PropertyFlags::default(),
            child_model: Some(ChildModel::Collection(schema)),
        }
    }

    pub fn key(mut self) -> Self {
        self.flags.is_key = true;
        self
    }

    pub fn parent_key(mut self) -> Self {
        self.flags.is_parent_key = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.flags.is_read_only = true;
        self
    }

    pub fn not_on_transfer_out(mut self) -> Self {
        self.flags.is_on_transfer_out = false;
        self
    }

    pub fn not_on_transfer_in(mut self) -> Self {
        self.flags.is_on_transfer_in = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    pub fn is_key(&self) -> bool {
        self.flags.is_key
    }

    pub fn is_parent_key(&self) -> bool {
        self.flags.is_parent_key
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.is_read_only
    }

    pub fn is_on_transfer_out(&self) -> bool {
        self.flags.is_on_transfer_out
    }

    pub fn is_on_transfer_in(&self) -> bool {
        self.flags.is_on_transfer_in
    }

    pub fn child_model(&self) -> Option<&ChildModel> {
        self.child_model.as_ref()
    }

    /// True for child object and child collection properties
    pub fn is_child(&self) -> bool {
        self.child_model.is_some()
    }
}

//! Model instances
//!
//! An instance holds one slot per schema property, in declaration order.
//! Scalar slots hold a `Value`; child slots exclusively own a child instance
//! or a child collection. The parent schema is kept only to look up the
//! parent's context, never to reach back into the parent.

use std::sync::Arc;

use crate::errors::{BoError, Result};
use crate::rules::{
    AuthAction, AuthorizationInput, BrokenRuleTree, NoAccessBehavior, PropertyValues, UserInfo,
};

use super::collection::ModelCollection;
use super::property::{ChildModel, PropertyDescriptor};
use super::record::Record;
use super::schema::ModelSchema;
use super::value::Value;

/// Persistence state of one node
///
/// `Created --insert--> Pristine --edit--> Changed --update--> Pristine`;
/// `remove()` moves any live state to `MarkedForRemoval`, or straight to
/// `Removed` for nodes that were never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationState {
    Pristine,
    Created,
    Changed,
    MarkedForRemoval,
    Removed,
}

impl MutationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationState::Pristine => "pristine",
            MutationState::Created => "created",
            MutationState::Changed => "changed",
            MutationState::MarkedForRemoval => "markedForRemoval",
            MutationState::Removed => "removed",
        }
    }

    /// Marked for removal or already removed
    pub fn is_removing(&self) -> bool {
        matches!(self, MutationState::MarkedForRemoval | MutationState::Removed)
    }
}

impl std::fmt::Display for MutationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum Slot {
    Scalar(Value),
    Object(Box<ModelInstance>),
    Collection(ModelCollection),
}

/// Shared borrow of a child slot
pub enum ChildRef<'a> {
    Object {
        property: &'a PropertyDescriptor,
        instance: &'a ModelInstance,
    },
    Collection {
        property: &'a PropertyDescriptor,
        collection: &'a ModelCollection,
    },
}

/// Exclusive borrow of a child slot; siblings can be borrowed together
pub enum ChildMut<'a> {
    Object {
        property: &'a PropertyDescriptor,
        instance: &'a mut ModelInstance,
    },
    Collection {
        property: &'a PropertyDescriptor,
        collection: &'a mut ModelCollection,
    },
}

#[derive(Debug, Clone)]
pub struct ModelInstance {
    schema: Arc<ModelSchema>,
    slots: Vec<Slot>,
    state: MutationState,
    broken_rules: BrokenRuleTree,
    parent: Option<Arc<ModelSchema>>,
}

impl ModelInstance {
    /// Brand-new instance in `Created` state
    ///
    /// Child objects are built recursively; child collections start empty.
    pub fn new(schema: Arc<ModelSchema>) -> Self {
        Self::with_parent(schema, None)
    }

    pub(crate) fn with_parent(schema: Arc<ModelSchema>, parent: Option<Arc<ModelSchema>>) -> Self {
        let slots = schema
            .properties()
            .iter()
            .map(|property| match property.child_model() {
                None => Slot::Scalar(Value::Null),
                Some(ChildModel::Object(child)) => Slot::Object(Box::new(Self::with_parent(
                    child.clone(),
                    Some(schema.clone()),
                ))),
                Some(ChildModel::Collection(item)) => {
                    Slot::Collection(ModelCollection::new(item.clone(), Some(schema.clone())))
                }
            })
            .collect();

        Self {
            schema,
            slots,
            state: MutationState::Created,
            broken_rules: BrokenRuleTree::new(),
            parent,
        }
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn model_name(&self) -> &str {
        self.schema.name()
    }

    /// Schema of the owning parent, for child nodes
    pub fn parent_schema(&self) -> Option<&Arc<ModelSchema>> {
        self.parent.as_ref()
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    // ===== Property access =====

    fn slot_index(&self, property: &str) -> Result<usize> {
        self.schema
            .index_of(property)
            .ok_or_else(|| self.schema.unknown_property(property))
    }

    fn not_a_scalar(&self, property: &str) -> BoError {
        BoError::NotAScalar {
            model: self.schema.name().to_string(),
            property: property.to_string(),
        }
    }

    /// # Errors
    ///
    /// `UnknownProperty`, or `NotAScalar` for child properties.
    pub fn get(&self, property: &str) -> Result<&Value> {
        match &self.slots[self.slot_index(property)?] {
            Slot::Scalar(value) => Ok(value),
            _ => Err(self.not_a_scalar(property)),
        }
    }

    /// Assign a scalar property
    ///
    /// A `Pristine` node becomes `Changed`; assigning the current value is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// * `UnknownProperty` / `NotAScalar`
    /// * `ReadOnlyProperty` - the property or the whole model is read-only
    /// * `TypeMismatch` - the value does not fit the declared type
    /// * `InvalidState` - the node is being removed
    pub fn set(&mut self, property: &str, value: impl Into<Value>) -> Result<()> {
        if self.state.is_removing() {
            return Err(BoError::InvalidState {
                model: self.schema.name().to_string(),
                action: "set".to_string(),
                state: self.state,
            });
        }

        let index = self.slot_index(property)?;
        let descriptor = &self.schema.properties()[index];
        if descriptor.is_child() {
            return Err(self.not_a_scalar(property));
        }
        if descriptor.is_read_only() || self.schema.kind().is_read_only() {
            return Err(BoError::ReadOnlyProperty {
                model: self.schema.name().to_string(),
                property: property.to_string(),
            });
        }

        let value = value.into();
        let actual = value.type_name();
        let data_type = descriptor.data_type();
        let value = data_type
            .coerce(value)
            .ok_or_else(|| BoError::TypeMismatch {
                model: self.schema.name().to_string(),
                property: property.to_string(),
                expected: data_type,
                actual: actual.to_string(),
            })?;

        if let Slot::Scalar(current) = &mut self.slots[index] {
            if *current == value {
                return Ok(());
            }
            *current = value;
        }
        if self.state == MutationState::Pristine {
            self.state = MutationState::Changed;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// `UnknownProperty`, or `NotAChild` when the property is not a child object.
    pub fn child(&self, property: &str) -> Result<&ModelInstance> {
        match &self.slots[self.slot_index(property)?] {
            Slot::Object(instance) => Ok(instance),
            _ => Err(not_a_child(&self.schema, property, "object")),
        }
    }

    /// # Errors
    ///
    /// `UnknownProperty`, or `NotAChild` when the property is not a child object.
    pub fn child_mut(&mut self, property: &str) -> Result<&mut ModelInstance> {
        let index = self.slot_index(property)?;
        let schema = &self.schema;
        match &mut self.slots[index] {
            Slot::Object(instance) => Ok(instance),
            _ => Err(not_a_child(schema, property, "object")),
        }
    }

    /// # Errors
    ///
    /// `UnknownProperty`, or `NotAChild` when the property is not a collection.
    pub fn collection(&self, property: &str) -> Result<&ModelCollection> {
        match &self.slots[self.slot_index(property)?] {
            Slot::Collection(collection) => Ok(collection),
            _ => Err(not_a_child(&self.schema, property, "collection")),
        }
    }

    /// # Errors
    ///
    /// `UnknownProperty`, or `NotAChild` when the property is not a collection.
    pub fn collection_mut(&mut self, property: &str) -> Result<&mut ModelCollection> {
        let index = self.slot_index(property)?;
        let schema = &self.schema;
        match &mut self.slots[index] {
            Slot::Collection(collection) => Ok(collection),
            _ => Err(not_a_child(schema, property, "collection")),
        }
    }

    pub fn children(&self) -> impl Iterator<Item = ChildRef<'_>> {
        self.schema
            .properties()
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(property, slot)| match slot {
                Slot::Scalar(_) => None,
                Slot::Object(instance) => Some(ChildRef::Object { property, instance }),
                Slot::Collection(collection) => Some(ChildRef::Collection {
                    property,
                    collection,
                }),
            })
    }

    /// Every child slot, borrowed disjointly so siblings can be driven at once
    pub fn children_mut(&mut self) -> impl Iterator<Item = ChildMut<'_>> {
        let schema: &ModelSchema = &self.schema;
        schema
            .properties()
            .iter()
            .zip(self.slots.iter_mut())
            .filter_map(|(property, slot)| match slot {
                Slot::Scalar(_) => None,
                Slot::Object(instance) => Some(ChildMut::Object {
                    property,
                    instance: instance.as_mut(),
                }),
                Slot::Collection(collection) => Some(ChildMut::Collection {
                    property,
                    collection,
                }),
            })
    }

    // ===== Records =====

    /// Values of the key properties
    pub fn key(&self) -> Record {
        self.scalars()
            .filter(|(property, _)| property.is_key())
            .map(|(property, value)| (property.name(), value.clone()))
            .collect()
    }

    /// Every scalar property, as sent to insert and update
    pub fn to_record(&self) -> Record {
        self.scalars()
            .map(|(property, value)| (property.name(), value.clone()))
            .collect()
    }

    /// Hydrate scalar values from storage without touching the mutation
    /// state; read-only flags do not apply and unknown fields are ignored
    ///
    /// # Errors
    ///
    /// `TypeMismatch` when a known field holds a value of the wrong type.
    pub fn load_record(&mut self, record: &Record) -> Result<()> {
        for (field, value) in record.iter() {
            let Some(index) = self.schema.index_of(field) else {
                continue;
            };
            let data_type = self.schema.properties()[index].data_type();
            if let Slot::Scalar(slot) = &mut self.slots[index] {
                *slot = data_type
                    .coerce(value.clone())
                    .ok_or_else(|| BoError::TypeMismatch {
                        model: self.schema.name().to_string(),
                        property: field.to_string(),
                        expected: data_type,
                        actual: value.type_name().to_string(),
                    })?;
            }
        }
        Ok(())
    }

    /// Copy parent key values into the matching `parent_key` properties
    pub fn apply_parent_key(&mut self, parent_key: &Record) {
        for (field, value) in parent_key.iter() {
            let Some(index) = self.schema.index_of(field) else {
                continue;
            };
            if !self.schema.properties()[index].is_parent_key() {
                continue;
            }
            if let Slot::Scalar(slot) = &mut self.slots[index] {
                *slot = value.clone();
            }
        }
    }

    fn scalars(&self) -> impl Iterator<Item = (&PropertyDescriptor, &Value)> {
        self.schema
            .properties()
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(property, slot)| match slot {
                Slot::Scalar(value) => Some((property, value)),
                _ => None,
            })
    }

    // ===== Mutation state =====

    pub fn mark_pristine(&mut self) {
        self.state = MutationState::Pristine;
    }

    pub fn mark_removed(&mut self) {
        self.state = MutationState::Removed;
    }

    /// Schedule this node and everything it owns for removal
    ///
    /// Never-persisted nodes go straight to `Removed`. Nothing is deleted
    /// until the root is saved.
    pub fn remove(&mut self) {
        self.state = match self.state {
            MutationState::Created | MutationState::Removed => MutationState::Removed,
            _ => MutationState::MarkedForRemoval,
        };
        for slot in &mut self.slots {
            match slot {
                Slot::Object(instance) => instance.remove(),
                Slot::Collection(collection) => collection.mark_all_removed(),
                Slot::Scalar(_) => {}
            }
        }
    }

    pub fn is_new(&self) -> bool {
        self.state == MutationState::Created
    }

    /// The node itself needs a persistence action
    pub fn is_self_dirty(&self) -> bool {
        matches!(
            self.state,
            MutationState::Created | MutationState::Changed | MutationState::MarkedForRemoval
        )
    }

    /// The node or anything it owns needs a persistence action
    pub fn is_dirty(&self) -> bool {
        self.is_self_dirty()
            || self.children().any(|child| match child {
                ChildRef::Object { instance, .. } => instance.is_dirty(),
                ChildRef::Collection { collection, .. } => collection.is_dirty(),
            })
    }

    // ===== Rules =====

    /// Re-run every validation rule on this node and all descendants
    ///
    /// Non-preserved notices from the previous run are discarded first.
    pub fn check_rules(&mut self) {
        let mut tree = std::mem::take(&mut self.broken_rules);
        tree.clear(None);
        for property in self.schema.scalar_properties() {
            self.schema.rules().validate(property.name(), &*self, &mut tree);
        }
        self.broken_rules = tree;

        for slot in &mut self.slots {
            match slot {
                Slot::Object(instance) => instance.check_rules(),
                Slot::Collection(collection) => collection.check_rules(),
                Slot::Scalar(_) => {}
            }
        }
    }

    /// Notices recorded on this node only
    pub fn own_broken_rules(&self) -> &BrokenRuleTree {
        &self.broken_rules
    }

    pub fn own_broken_rules_mut(&mut self) -> &mut BrokenRuleTree {
        &mut self.broken_rules
    }

    /// Tree of this node with every non-empty descendant tree attached
    ///
    /// Collection items keep their index; items being removed are skipped.
    pub fn broken_rules(&self) -> BrokenRuleTree {
        let mut tree = self.broken_rules.clone();
        for child in self.children() {
            match child {
                ChildRef::Object { property, instance } => {
                    let subtree = instance.broken_rules();
                    if !subtree.is_empty() {
                        tree.add_child(property.name(), subtree);
                    }
                }
                ChildRef::Collection {
                    property,
                    collection,
                } => {
                    for (index, item) in collection.iter().enumerate() {
                        if item.state().is_removing() {
                            continue;
                        }
                        let subtree = item.broken_rules();
                        if !subtree.is_empty() {
                            tree.add_child_item(property.name(), index, subtree);
                        }
                    }
                }
            }
        }
        tree
    }

    pub fn is_valid(&self) -> bool {
        self.broken_rules.is_valid()
            && self.children().all(|child| match child {
                ChildRef::Object { instance, .. } => instance.is_valid(),
                ChildRef::Collection { collection, .. } => collection.is_valid(),
            })
    }

    /// Read a property subject to its `readProperty` rules
    ///
    /// Returns `None` when access is denied in record or silent mode.
    ///
    /// # Errors
    ///
    /// Property lookup errors, or `AuthorizationDenied` in throw mode.
    pub fn read_value(
        &mut self,
        property: &str,
        user: Option<&dyn UserInfo>,
        default_behavior: NoAccessBehavior,
    ) -> Result<Option<Value>> {
        self.get(property)?;
        let schema: &ModelSchema = &self.schema;
        let input = AuthorizationInput::new(AuthAction::ReadProperty, schema.name())
            .with_target(property)
            .with_user(user);
        if !schema
            .rules()
            .has_permission(&input, &mut self.broken_rules, default_behavior)?
        {
            return Ok(None);
        }
        self.get(property).map(|v| Some(v.clone()))
    }

    /// Assign a property subject to its `writeProperty` rules
    ///
    /// Returns `false` when access is denied in record or silent mode.
    ///
    /// # Errors
    ///
    /// Everything `set` returns, or `AuthorizationDenied` in throw mode.
    pub fn write_value(
        &mut self,
        property: &str,
        value: impl Into<Value>,
        user: Option<&dyn UserInfo>,
        default_behavior: NoAccessBehavior,
    ) -> Result<bool> {
        self.get(property)?;
        let schema: &ModelSchema = &self.schema;
        let input = AuthorizationInput::new(AuthAction::WriteProperty, schema.name())
            .with_target(property)
            .with_user(user);
        if !schema
            .rules()
            .has_permission(&input, &mut self.broken_rules, default_behavior)?
        {
            return Ok(false);
        }
        self.set(property, value)?;
        Ok(true)
    }
}

impl PropertyValues for ModelInstance {
    fn value(&self, property: &str) -> Option<&Value> {
        match self.slots.get(self.schema.index_of(property)?)? {
            Slot::Scalar(value) => Some(value),
            _ => None,
        }
    }
}

fn not_a_child(schema: &ModelSchema, property: &str, expected: &'static str) -> BoError {
    BoError::NotAChild {
        model: schema.name().to_string(),
        property: property.to_string(),
        expected,
    }
}

use std::sync::Arc;

use crate::errors::{BoError, Result};

use super::instance::{ModelInstance, MutationState};
use super::record::Record;
use super::schema::ModelSchema;

/// Ordered child collection that exclusively owns its items
///
/// Removed items stay in the collection, marked for removal, until the root
/// is saved; `len` counts them too.
#[derive(Debug, Clone)]
pub struct ModelCollection {
    schema: Arc<ModelSchema>,
    parent: Option<Arc<ModelSchema>>,
    items: Vec<ModelInstance>,
}

impl ModelCollection {
    pub fn new(schema: Arc<ModelSchema>, parent: Option<Arc<ModelSchema>>) -> Self {
        Self {
            schema,
            parent,
            items: Vec::new(),
        }
    }

    /// Schema of the items
    pub fn item_schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items not being removed
    pub fn active_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| !item.state().is_removing())
            .count()
    }

    pub fn get(&self, index: usize) -> Option<&ModelInstance> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ModelInstance> {
        self.items.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ModelInstance> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ModelInstance> {
        self.items.iter_mut()
    }

    /// Append a new, `Created` item and return it for editing
    pub fn add_new(&mut self) -> &mut ModelInstance {
        let index = self.items.len();
        self.items.push(ModelInstance::with_parent(
            self.schema.clone(),
            self.parent.clone(),
        ));
        &mut self.items[index]
    }

    /// Append an existing item
    ///
    /// # Errors
    ///
    /// `InvalidChildModel` when the item is of another model.
    pub fn push(&mut self, item: ModelInstance) -> Result<()> {
        if !Arc::ptr_eq(item.schema(), &self.schema) {
            return Err(BoError::InvalidChildModel {
                model: self
                    .parent
                    .as_ref()
                    .map_or_else(String::new, |p| p.name().to_string()),
                property: String::new(),
                child: item.model_name().to_string(),
                reason: format!("collection holds {} items", self.schema.name()),
            });
        }
        self.items.push(item);
        Ok(())
    }

    /// Remove the item at `index`
    ///
    /// Never-persisted items are dropped at once; others are marked and
    /// deleted on save.
    ///
    /// # Errors
    ///
    /// `InvalidState` when there is no item at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<()> {
        let Some(item) = self.items.get_mut(index) else {
            return Err(BoError::InvalidState {
                model: self.schema.name().to_string(),
                action: format!("remove item {index} of"),
                state: MutationState::Removed,
            });
        };
        if item.is_new() {
            self.items.remove(index);
        } else {
            item.remove();
        }
        Ok(())
    }

    /// Schedule every item for removal
    ///
    /// Never-persisted items are dropped at once, as in `remove_at`.
    pub fn mark_all_removed(&mut self) {
        for item in &mut self.items {
            item.remove();
        }
        self.purge_removed();
    }

    /// Drop items whose removal is complete or needs no storage call
    pub fn purge_removed(&mut self) {
        self.items
            .retain(|item| item.state() != MutationState::Removed);
    }

    /// Replace the contents with hydrated, `Pristine` items
    ///
    /// # Errors
    ///
    /// `TypeMismatch` from any record.
    pub fn load_items(&mut self, records: &[Record]) -> Result<()> {
        self.items.clear();
        for record in records {
            let item = self.add_new();
            item.load_record(record)?;
            item.mark_pristine();
        }
        Ok(())
    }

    /// Index of the item whose key equals `key`
    pub fn find_by_key(&self, key: &Record) -> Option<usize> {
        if key.is_empty() {
            return None;
        }
        self.items.iter().position(|item| item.key() == *key)
    }

    pub fn is_dirty(&self) -> bool {
        self.items.iter().any(ModelInstance::is_dirty)
    }

    /// Items being removed are ignored
    pub fn is_valid(&self) -> bool {
        self.items
            .iter()
            .filter(|item| !item.state().is_removing())
            .all(ModelInstance::is_valid)
    }

    pub fn check_rules(&mut self) {
        for item in &mut self.items {
            item.check_rules();
        }
    }
}

impl<'a> IntoIterator for &'a ModelCollection {
    type Item = &'a ModelInstance;
    type IntoIter = std::slice::Iter<'a, ModelInstance>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<'a> IntoIterator for &'a mut ModelCollection {
    type Item = &'a mut ModelInstance;
    type IntoIter = std::slice::IterMut<'a, ModelInstance>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, ModelKind, PropertyDescriptor};

    fn line() -> Arc<ModelSchema> {
        ModelSchema::builder("OrderItem", ModelKind::EditableChild)
            .property(PropertyDescriptor::new("itemKey", DataType::Integer).key())
            .property(PropertyDescriptor::new("productName", DataType::Text))
            .build()
            .unwrap()
    }

    #[test]
    fn test_remove_new_item_drops_it() {
        let mut items = ModelCollection::new(line(), None);
        items.add_new();
        items.remove_at(0).unwrap();
        assert!(items.is_empty());
        assert!(items.remove_at(0).is_err());
    }

    #[test]
    fn test_remove_loaded_item_marks_it() {
        let mut items = ModelCollection::new(line(), None);
        items
            .load_items(&[
                Record::new().with("itemKey", 1),
                Record::new().with("itemKey", 2),
            ])
            .unwrap();

        items.remove_at(1).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items.active_count(), 1);
        assert_eq!(
            items.get(1).map(ModelInstance::state),
            Some(MutationState::MarkedForRemoval)
        );
        assert!(items.is_dirty());

        if let Some(item) = items.get_mut(1) {
            item.mark_removed();
        }
        items.purge_removed();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_mark_all_removed_drops_unsaved_items() {
        let mut items = ModelCollection::new(line(), None);
        items
            .load_items(&[Record::new().with("itemKey", 1)])
            .unwrap();
        items.add_new();

        items.mark_all_removed();
        assert_eq!(items.len(), 1);
        assert_eq!(
            items.get(0).map(ModelInstance::state),
            Some(MutationState::MarkedForRemoval)
        );

        let mut unsaved = ModelCollection::new(line(), None);
        unsaved.add_new();
        unsaved.mark_all_removed();
        assert!(unsaved.is_empty());
        assert!(!unsaved.is_dirty());
    }

    #[test]
    fn test_find_by_key() {
        let mut items = ModelCollection::new(line(), None);
        items
            .load_items(&[
                Record::new().with("itemKey", 10),
                Record::new().with("itemKey", 20),
            ])
            .unwrap();
        assert_eq!(items.find_by_key(&Record::new().with("itemKey", 20)), Some(1));
        assert_eq!(items.find_by_key(&Record::new().with("itemKey", 30)), None);
        assert!(!items.is_dirty());
    }

    #[test]
    fn test_push_rejects_other_models() {
        let mut items = ModelCollection::new(line(), None);
        assert!(items.push(ModelInstance::new(line())).is_err());
        let same = ModelInstance::new(items.item_schema().clone());
        assert!(items.push(same).is_ok());
    }
}

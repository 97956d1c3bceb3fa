//! Transfer-object conversion
//!
//! Plain JSON views of a graph for clients. Scalars are rendered by value;
//! child objects and collections delegate to their own conversion.

use serde_json::{Map, Value as Json};

use crate::errors::{BoError, Result};

use super::collection::ModelCollection;
use super::instance::{ModelInstance, Slot};
use super::property::ChildModel;
use super::record::Record;
use super::schema::ModelSchema;

fn json_type(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn expect_shape(model: &str, what: &str, json: &Json) -> BoError {
    BoError::Serialization {
        message: format!(
            "transfer object for {model} must be {what}, got {}",
            json_type(json)
        ),
    }
}

impl ModelInstance {
    /// Properties flagged `on_transfer_out`, keyed by name
    pub fn to_transfer(&self) -> Json {
        let mut map = Map::new();
        for (property, slot) in self.schema().properties().iter().zip(self.slots()) {
            if !property.is_on_transfer_out() {
                continue;
            }
            let value = match slot {
                Slot::Scalar(value) => value.to_json(),
                Slot::Object(instance) => instance.to_transfer(),
                Slot::Collection(collection) => collection.to_transfer(),
            };
            map.insert(property.name().to_string(), value);
        }
        Json::Object(map)
    }

    /// Apply a client transfer object
    ///
    /// Only properties flagged `on_transfer_in` and not read-only are
    /// applied; absent properties are left alone.
    ///
    /// # Errors
    ///
    /// * `Serialization` - wrong JSON shape for an object or collection
    /// * `TypeMismatch` - a scalar does not convert to its declared type
    /// * `InvalidState` - the model is read-only or being removed
    pub fn from_transfer(&mut self, dto: &Json) -> Result<()> {
        let schema = self.schema().clone();
        if schema.kind().is_read_only() {
            return Err(BoError::InvalidState {
                model: schema.name().to_string(),
                action: "apply a transfer object to".to_string(),
                state: self.state(),
            });
        }
        let Some(map) = dto.as_object() else {
            return Err(expect_shape(schema.name(), "an object", dto));
        };

        for property in schema.properties() {
            if !property.is_on_transfer_in() || property.is_read_only() {
                continue;
            }
            let Some(json) = map.get(property.name()) else {
                continue;
            };
            match property.child_model() {
                None => {
                    let data_type = property.data_type();
                    let value =
                        data_type
                            .from_json(json)
                            .ok_or_else(|| BoError::TypeMismatch {
                                model: schema.name().to_string(),
                                property: property.name().to_string(),
                                expected: data_type,
                                actual: json_type(json).to_string(),
                            })?;
                    self.set(property.name(), value)?;
                }
                Some(ChildModel::Object(_)) => {
                    self.child_mut(property.name())?.from_transfer(json)?;
                }
                Some(ChildModel::Collection(_)) => {
                    self.collection_mut(property.name())?.from_transfer(json)?;
                }
            }
        }
        Ok(())
    }
}

/// Key record of an incoming item; `None` when any key value is missing
fn incoming_key(schema: &ModelSchema, entry: &Map<String, Json>) -> Result<Option<Record>> {
    let mut key = Record::new();
    for property in schema.key_properties() {
        let json = entry.get(property.name()).unwrap_or(&Json::Null);
        let value = property
            .data_type()
            .from_json(json)
            .ok_or_else(|| BoError::TypeMismatch {
                model: schema.name().to_string(),
                property: property.name().to_string(),
                expected: property.data_type(),
                actual: json_type(json).to_string(),
            })?;
        if value.is_null() {
            return Ok(None);
        }
        key.insert(property.name(), value);
    }
    Ok((!key.is_empty()).then_some(key))
}

impl ModelCollection {
    /// Items not being removed, in order
    pub fn to_transfer(&self) -> Json {
        Json::Array(
            self.iter()
                .filter(|item| !item.state().is_removing())
                .map(ModelInstance::to_transfer)
                .collect(),
        )
    }

    /// Merge a client array into the collection
    ///
    /// Incoming entries are matched to live items by key. Unmatched entries
    /// become new items; live items absent from the input are removed.
    ///
    /// # Errors
    ///
    /// Everything `ModelInstance::from_transfer` returns, or `Serialization`
    /// when `dto` is not an array.
    pub fn from_transfer(&mut self, dto: &Json) -> Result<()> {
        let schema = self.item_schema().clone();
        let Some(entries) = dto.as_array() else {
            return Err(expect_shape(schema.name(), "an array", dto));
        };

        let mut matched = vec![false; self.len()];
        for entry in entries {
            let Some(fields) = entry.as_object() else {
                return Err(expect_shape(schema.name(), "an object", entry));
            };
            let key = incoming_key(&schema, fields)?;
            let existing = key.as_ref().and_then(|key| {
                self.iter()
                    .enumerate()
                    .position(|(i, item)| {
                        i < matched.len()
                            && !matched[i]
                            && !item.state().is_removing()
                            && item.key() == *key
                    })
            });

            match existing {
                Some(index) => {
                    matched[index] = true;
                    if let Some(item) = self.get_mut(index) {
                        item.from_transfer(entry)?;
                    }
                }
                None => {
                    let item = self.add_new();
                    if let Some(key) = &key {
                        item.load_record(key)?;
                    }
                    item.from_transfer(entry)?;
                }
            }
        }

        // reverse order keeps earlier indices valid while new items are dropped
        for index in (0..matched.len()).rev() {
            let live = self
                .get(index)
                .is_some_and(|item| !item.state().is_removing());
            if !matched[index] && live {
                self.remove_at(index)?;
            }
        }
        Ok(())
    }
}

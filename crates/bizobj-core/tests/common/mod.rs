#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bizobj_core::model::{DataType, ModelKind, ModelSchema, PropertyDescriptor};
use bizobj_core::rules::builtin::{MaxLength, Required};
use bizobj_core::rules::{RuleDescriptor, RuleInput, RuleOutcome, ValidationRule};

/// Validation rule that records every evaluation in a shared log
pub struct Recording {
    name: String,
    fails: bool,
    log: Arc<Mutex<Vec<String>>>,
}

impl Recording {
    pub fn passing(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            fails: false,
            log: log.clone(),
        }
    }

    pub fn failing(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            fails: true,
            ..Self::passing(name, log)
        }
    }
}

impl ValidationRule for Recording {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        self.log.lock().unwrap().push(self.name.clone());
        if self.fails {
            RuleOutcome::error(format!("{} failed on {}", self.name, input.property))
        } else {
            RuleOutcome::success()
        }
    }
}

pub fn new_log() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn address_schema() -> Arc<ModelSchema> {
    ModelSchema::builder("Address", ModelKind::EditableChild)
        .property(PropertyDescriptor::new("orderKey", DataType::Integer).parent_key())
        .property(PropertyDescriptor::new("street", DataType::Text))
        .property(PropertyDescriptor::new("city", DataType::Text))
        .build()
        .unwrap()
}

pub fn order_item_schema() -> Arc<ModelSchema> {
    ModelSchema::builder("OrderItem", ModelKind::EditableChild)
        .property(PropertyDescriptor::new("orderItemKey", DataType::Integer).key())
        .property(PropertyDescriptor::new("orderKey", DataType::Integer).parent_key())
        .property(PropertyDescriptor::new("productName", DataType::Text))
        .property(PropertyDescriptor::new("quantity", DataType::Integer))
        .property(PropertyDescriptor::new("unitPrice", DataType::Decimal))
        .rule(RuleDescriptor::validation("productName", Required))
        .rule(RuleDescriptor::validation("productName", MaxLength::new(30)))
        .rule(RuleDescriptor::validation("quantity", Required))
        .rule(RuleDescriptor::validation("unitPrice", Required))
        .build()
        .unwrap()
}

pub fn order_schema() -> Arc<ModelSchema> {
    ModelSchema::builder("Order", ModelKind::EditableRoot)
        .property(PropertyDescriptor::new("orderKey", DataType::Integer).key())
        .property(PropertyDescriptor::new("vendorName", DataType::Text))
        .property(PropertyDescriptor::new("orderDate", DataType::DateTime))
        .property(PropertyDescriptor::child("address", address_schema()))
        .property(PropertyDescriptor::collection("items", order_item_schema()))
        .rule(RuleDescriptor::validation("vendorName", Required))
        .build()
        .unwrap()
}

//! Broken-rule tree
//!
//! Accumulates rule outcomes for one node of an object graph, with named
//! slots for child objects and indexed slots for collection items. The shape
//! mirrors the object graph exactly so a UI can walk both in lock-step.

use std::collections::BTreeMap;

use serde::Serialize;

/// Outcome severity of a rule evaluation; only `Error` affects validity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Information,
    Warning,
    Error,
}

/// One recorded rule outcome below success
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokenRule {
    pub rule_name: String,
    pub property: String,
    pub message: String,
    pub severity: Severity,
    pub is_preserved: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub affected_properties: Vec<String>,
}

impl BrokenRule {
    pub fn new(
        rule_name: impl Into<String>,
        property: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            rule_name: rule_name.into(),
            property: property.into(),
            message: message.into(),
            severity,
            is_preserved: false,
            affected_properties: Vec::new(),
        }
    }

    pub fn preserved(mut self) -> Self {
        self.is_preserved = true;
        self
    }

    pub fn with_affected(mut self, properties: &[String]) -> Self {
        self.affected_properties = properties.to_vec();
        self
    }
}

/// Child slot of a tree: a single child object or indexed collection items
#[derive(Debug, Clone, PartialEq)]
pub enum ChildBrokenRules {
    Object(BrokenRuleTree),
    Items(BTreeMap<usize, BrokenRuleTree>),
}

/// Key in `to_json` output for notices raised on a property that is also a
/// child slot
pub const SLOT_NOTICES_KEY: &str = "$notices";

/// Key of a collection item slot in `to_json` output
///
/// Zero-padded to five digits, so lexical order equals index order below
/// 100000. Larger indices get longer keys that stay unique but no longer
/// sort lexically; the tree itself keeps items in numeric order.
pub fn item_key(index: usize) -> String {
    format!("{index:05}")
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrokenRuleTree {
    notices: BTreeMap<String, Vec<BrokenRule>>,
    children: BTreeMap<String, ChildBrokenRules>,
}

/// Flat, serializable summary of a tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrokenRulesResponse {
    pub message: String,
    /// Distinct property paths carrying at least one notice
    pub length: usize,
    /// Total notices
    pub count: usize,
    pub data: serde_json::Value,
}

impl BrokenRuleTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a notice for `property` at this node
    pub fn add_notice(
        &mut self,
        property: &str,
        message: impl Into<String>,
        severity: Severity,
        is_preserved: bool,
    ) {
        let mut rule = BrokenRule::new(property, property, message, severity);
        rule.is_preserved = is_preserved;
        self.add(rule);
    }

    /// Append a fully described notice under its own property
    pub fn add(&mut self, rule: BrokenRule) {
        self.notices
            .entry(rule.property.clone())
            .or_default()
            .push(rule);
    }

    /// Attach the tree of a single child object
    pub fn add_child(&mut self, slot: &str, tree: BrokenRuleTree) {
        self.children
            .insert(slot.to_string(), ChildBrokenRules::Object(tree));
    }

    /// Attach the tree of the collection item at `index`
    pub fn add_child_item(&mut self, slot: &str, index: usize, tree: BrokenRuleTree) {
        let entry = self
            .children
            .entry(slot.to_string())
            .or_insert_with(|| ChildBrokenRules::Items(BTreeMap::new()));
        match entry {
            ChildBrokenRules::Items(items) => {
                items.insert(index, tree);
            }
            ChildBrokenRules::Object(_) => {
                let mut items = BTreeMap::new();
                items.insert(index, tree);
                *entry = ChildBrokenRules::Items(items);
            }
        }
    }

    /// Notices recorded for `property` at this node
    pub fn notices(&self, property: &str) -> &[BrokenRule] {
        self.notices.get(property).map_or(&[], Vec::as_slice)
    }

    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.notices.keys().map(String::as_str)
    }

    pub fn child(&self, slot: &str) -> Option<&BrokenRuleTree> {
        match self.children.get(slot) {
            Some(ChildBrokenRules::Object(tree)) => Some(tree),
            _ => None,
        }
    }

    pub fn item(&self, slot: &str, index: usize) -> Option<&BrokenRuleTree> {
        match self.children.get(slot) {
            Some(ChildBrokenRules::Items(items)) => items.get(&index),
            _ => None,
        }
    }

    /// True when no notice here or below has error severity
    pub fn is_valid(&self) -> bool {
        let own = self
            .notices
            .values()
            .flatten()
            .all(|n| n.severity != Severity::Error);
        own && self.subtrees().all(BrokenRuleTree::is_valid)
    }

    /// True when neither this node nor any child slot holds a notice
    pub fn is_empty(&self) -> bool {
        self.notices.values().all(Vec::is_empty) && self.subtrees().all(BrokenRuleTree::is_empty)
    }

    /// Remove non-preserved notices of one property, or of every property
    ///
    /// Child slots are left alone.
    pub fn clear(&mut self, property: Option<&str>) {
        match property {
            Some(name) => {
                if let Some(list) = self.notices.get_mut(name) {
                    list.retain(|n| n.is_preserved);
                    if list.is_empty() {
                        self.notices.remove(name);
                    }
                }
            }
            None => {
                for list in self.notices.values_mut() {
                    list.retain(|n| n.is_preserved);
                }
                self.notices.retain(|_, list| !list.is_empty());
            }
        }
    }

    /// Remove everything, preserved notices and child slots included
    pub fn clear_all(&mut self) {
        self.notices.clear();
        self.children.clear();
    }

    /// Distinct property paths with at least one notice, recursively
    pub fn length(&self) -> usize {
        let own = self.notices.values().filter(|l| !l.is_empty()).count();
        own + self.subtrees().map(BrokenRuleTree::length).sum::<usize>()
    }

    /// Total notices, recursively
    pub fn count(&self) -> usize {
        let own: usize = self.notices.values().map(Vec::len).sum();
        own + self.subtrees().map(BrokenRuleTree::count).sum::<usize>()
    }

    /// Read-only JSON snapshot: properties map to notice arrays, child
    /// objects to nested objects, collections to objects keyed by item index
    ///
    /// Notices on a property that also owns a child slot move into that
    /// slot's object under `SLOT_NOTICES_KEY`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (property, list) in &self.notices {
            if list.is_empty() {
                continue;
            }
            let notices = list
                .iter()
                .filter_map(|n| serde_json::to_value(n).ok())
                .collect();
            map.insert(property.clone(), serde_json::Value::Array(notices));
        }
        for (slot, child) in &self.children {
            let mut value = match child {
                ChildBrokenRules::Object(tree) => tree.to_json(),
                ChildBrokenRules::Items(items) => serde_json::Value::Object(
                    items
                        .iter()
                        .map(|(index, tree)| (item_key(*index), tree.to_json()))
                        .collect(),
                ),
            };
            if let Some(own) = map.remove(slot) {
                if let serde_json::Value::Object(nested) = &mut value {
                    nested.insert(SLOT_NOTICES_KEY.to_string(), own);
                }
            }
            map.insert(slot.clone(), value);
        }
        serde_json::Value::Object(map)
    }

    pub fn to_response(&self, message: impl Into<String>) -> BrokenRulesResponse {
        BrokenRulesResponse {
            message: message.into(),
            length: self.length(),
            count: self.count(),
            data: self.to_json(),
        }
    }

    fn subtrees(&self) -> impl Iterator<Item = &BrokenRuleTree> {
        self.children.values().flat_map(|child| match child {
            ChildBrokenRules::Object(tree) => vec![tree],
            ChildBrokenRules::Items(items) => items.values().collect(),
        })
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use crate::dao::{Dao, PortalAction};
use crate::errors::{BoError, Result};
use crate::rules::{AuthAction, RuleDescriptor, RuleEngine, RuleKind};

use super::property::{ChildModel, PropertyDescriptor};

/// Role a model plays in an object graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Top of an editable graph; the only kind that can be saved
    EditableRoot,
    /// Editable node owned by a parent object or collection
    EditableChild,
    /// Top of a read-only graph
    ReadOnlyRoot,
    /// Read-only node owned by a parent
    ReadOnlyChild,
    /// Command object: one `execute` round-trip, no persisted state
    Command,
}

impl ModelKind {
    pub fn is_root(&self) -> bool {
        matches!(
            self,
            ModelKind::EditableRoot | ModelKind::ReadOnlyRoot | ModelKind::Command
        )
    }

    pub fn is_child(&self) -> bool {
        matches!(self, ModelKind::EditableChild | ModelKind::ReadOnlyChild)
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, ModelKind::EditableRoot | ModelKind::EditableChild)
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, ModelKind::ReadOnlyRoot | ModelKind::ReadOnlyChild)
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModelKind::EditableRoot => "editable root",
            ModelKind::EditableChild => "editable child",
            ModelKind::ReadOnlyRoot => "read-only root",
            ModelKind::ReadOnlyChild => "read-only child",
            ModelKind::Command => "command",
        };
        f.write_str(s)
    }
}

/// Immutable metadata of a model: properties in declaration order, rules,
/// data source and per-action DAO overrides
///
/// Created once at model-definition time and shared (`Arc`) by every instance.
pub struct ModelSchema {
    name: String,
    kind: ModelKind,
    properties: Vec<PropertyDescriptor>,
    index: HashMap<String, usize>,
    rules: RuleEngine,
    data_source: Option<String>,
    overrides: HashMap<PortalAction, Arc<dyn Dao>>,
}

impl ModelSchema {
    pub fn builder(name: impl Into<String>, kind: ModelKind) -> ModelSchemaBuilder {
        ModelSchemaBuilder::new(name, kind)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.index.get(name).map(|&i| &self.properties[i])
    }

    /// Slot position of a property in every instance of this model
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn key_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| p.is_key())
    }

    pub fn child_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| p.is_child())
    }

    pub fn scalar_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| !p.is_child())
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn data_source(&self) -> Option<&str> {
        self.data_source.as_deref()
    }

    /// Custom data access registered for one action, used instead of the
    /// model's registered DAO
    pub fn dao_override(&self, action: PortalAction) -> Option<&Arc<dyn Dao>> {
        self.overrides.get(&action)
    }

    pub(crate) fn unknown_property(&self, property: &str) -> BoError {
        BoError::UnknownProperty {
            model: self.name.clone(),
            property: property.to_string(),
        }
    }
}

impl std::fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("properties", &self.properties)
            .field("data_source", &self.data_source)
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Collects properties and rules, then validates them into a `ModelSchema`
pub struct ModelSchemaBuilder {
    name: String,
    kind: ModelKind,
    properties: Vec<PropertyDescriptor>,
    rules: Vec<RuleDescriptor>,
    data_source: Option<String>,
    composite_key: bool,
    overrides: HashMap<PortalAction, Arc<dyn Dao>>,
}

impl ModelSchemaBuilder {
    pub fn new(name: impl Into<String>, kind: ModelKind) -> Self {
        Self {
            name: name.into(),
            kind,
            properties: Vec::new(),
            rules: Vec::new(),
            data_source: None,
            composite_key: false,
            overrides: HashMap::new(),
        }
    }

    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    pub fn rule(mut self, rule: RuleDescriptor) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn data_source(mut self, name: impl Into<String>) -> Self {
        self.data_source = Some(name.into());
        self
    }

    /// Allow more than one `key` property
    pub fn composite_key(mut self) -> Self {
        self.composite_key = true;
        self
    }

    pub fn override_dao(mut self, action: PortalAction, dao: Arc<dyn Dao>) -> Self {
        self.overrides.insert(action, dao);
        self
    }

    /// Validate and freeze the definition
    ///
    /// # Errors
    ///
    /// * `InvalidSchema` - empty model name or empty property name
    /// * `DuplicateProperty` - two properties share a name
    /// * `MultipleKeys` - several keys without `composite_key()`
    /// * `InvalidChildModel` - child property holding a root model, or an
    ///   editable child under a read-only parent
    /// * `InvalidRule` / `UnknownProperty` - malformed rule or rule bound to
    ///   an undeclared property
    pub fn build(self) -> Result<Arc<ModelSchema>> {
        let model = self.name.clone();
        if model.trim().is_empty() {
            return Err(BoError::InvalidSchema {
                model,
                reason: "model name cannot be empty".to_string(),
            });
        }

        let mut index = HashMap::with_capacity(self.properties.len());
        for (i, property) in self.properties.iter().enumerate() {
            if property.name().trim().is_empty() {
                return Err(BoError::InvalidSchema {
                    model,
                    reason: format!("property #{i} has an empty name"),
                });
            }
            if index.insert(property.name().to_string(), i).is_some() {
                return Err(BoError::DuplicateProperty {
                    model,
                    property: property.name().to_string(),
                });
            }
            if let Some(child) = property.child_model() {
                check_child_model(&model, self.kind, property.name(), child)?;
            }
        }

        let keys = self.properties.iter().filter(|p| p.is_key()).count();
        if keys > 1 && !self.composite_key {
            return Err(BoError::MultipleKeys { model });
        }

        let mut rules = RuleEngine::new();
        for rule in self.rules {
            check_rule_targets(&model, &index, &self.properties, &rule)?;
            rules.add(rule)?;
        }

        Ok(Arc::new(ModelSchema {
            name: self.name,
            kind: self.kind,
            properties: self.properties,
            index,
            rules,
            data_source: self.data_source,
            overrides: self.overrides,
        }))
    }
}

fn check_child_model(
    model: &str,
    parent_kind: ModelKind,
    property: &str,
    child: &ChildModel,
) -> Result<()> {
    let child_schema = child.schema();
    let invalid = |reason: &str| BoError::InvalidChildModel {
        model: model.to_string(),
        property: property.to_string(),
        child: child_schema.name().to_string(),
        reason: reason.to_string(),
    };

    let child_kind = child_schema.kind();
    if !child_kind.is_child() {
        return Err(invalid(&format!(
            "a {child_kind} model cannot be owned by a parent"
        )));
    }
    if (parent_kind.is_read_only() || parent_kind == ModelKind::Command)
        && child_kind == ModelKind::EditableChild
    {
        return Err(invalid(&format!(
            "a {parent_kind} model can only own read-only children"
        )));
    }
    Ok(())
}

fn check_rule_targets(
    model: &str,
    index: &HashMap<String, usize>,
    properties: &[PropertyDescriptor],
    rule: &RuleDescriptor,
) -> Result<()> {
    let unknown = |property: &str| BoError::UnknownProperty {
        model: model.to_string(),
        property: property.to_string(),
    };

    match rule.kind() {
        RuleKind::Validation => match index.get(rule.primary_property()) {
            Some(&i) if !properties[i].is_child() => {}
            Some(_) => {
                return Err(BoError::InvalidRule {
                    rule: rule.rule_name().to_string(),
                    reason: "validation rules apply to scalar properties".to_string(),
                })
            }
            None => return Err(unknown(rule.primary_property())),
        },
        RuleKind::Authorization => {
            let property_scoped = matches!(
                rule.auth_action(),
                Some(AuthAction::ReadProperty | AuthAction::WriteProperty)
            );
            if property_scoped {
                match index.get(rule.primary_property()) {
                    Some(&i) if !properties[i].is_child() => {}
                    Some(_) => {
                        return Err(BoError::InvalidRule {
                            rule: rule.rule_name().to_string(),
                            reason: "property authorization applies to scalar properties"
                                .to_string(),
                        })
                    }
                    None => return Err(unknown(rule.primary_property())),
                }
            }
        }
    }

    for affected in rule.affected_properties() {
        if !index.contains_key(affected.as_str()) {
            return Err(unknown(affected));
        }
    }
    Ok(())
}

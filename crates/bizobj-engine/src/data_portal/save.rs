use bizobj_core::errors::Result;
use bizobj_core::model::ChildMut;
use bizobj_core::{
    AuthAction, ModelCollection, ModelInstance, ModelKind, MutationState, PortalAction, Record,
};
use futures::future::BoxFuture;
use futures::FutureExt;

use super::{begin, current_user, dao_failure, invalid_root, save_action, DataPortal, NodeCall};
use crate::events::EventPhase;
use crate::join::join_branches;

impl DataPortal {
    /// Persist an editable root and everything it owns in one transaction
    ///
    /// Each node is inserted, updated or removed according to its own
    /// mutation state. A graph with nothing dirty is left alone without
    /// opening a transaction.
    ///
    /// # Errors
    ///
    /// * `InvalidState` - not an editable root, or already removed
    /// * `AuthorizationDenied` - denied in throw mode
    /// * `UnsupportedOperation` / `DataAccess` / `DaoNotRegistered` - from any
    ///   node, after rollback
    /// * `Transaction` / `RollbackFailed`
    pub async fn save(&self, instance: &mut ModelInstance) -> Result<()> {
        match save_action(instance) {
            Some(action) => self.save_as(action, instance).await,
            None => Err(invalid_root(instance, PortalAction::Update)),
        }
    }

    /// Save a root that has never been persisted
    ///
    /// # Errors
    ///
    /// As `save`; `InvalidState` unless the root is new.
    pub async fn insert(&self, instance: &mut ModelInstance) -> Result<()> {
        if instance.state() != MutationState::Created {
            return Err(invalid_root(instance, PortalAction::Insert));
        }
        self.save_as(PortalAction::Insert, instance).await
    }

    /// Save changes to a persisted root and its children
    ///
    /// # Errors
    ///
    /// As `save`; `InvalidState` unless the root is pristine or changed.
    pub async fn update(&self, instance: &mut ModelInstance) -> Result<()> {
        if !matches!(
            instance.state(),
            MutationState::Pristine | MutationState::Changed
        ) {
            return Err(invalid_root(instance, PortalAction::Update));
        }
        self.save_as(PortalAction::Update, instance).await
    }

    /// Delete a root and everything it owns
    ///
    /// Children are deleted before their parent. A root that was never
    /// persisted is only marked removed.
    ///
    /// # Errors
    ///
    /// As `save`; `InvalidState` when the root is already removed.
    pub async fn remove(&self, instance: &mut ModelInstance) -> Result<()> {
        if instance.state() == MutationState::Removed {
            return Err(invalid_root(instance, PortalAction::Remove));
        }
        instance.remove();
        if instance.state() == MutationState::Removed {
            return Ok(());
        }
        self.save_as(PortalAction::Remove, instance).await
    }

    async fn save_as(&self, action: PortalAction, instance: &mut ModelInstance) -> Result<()> {
        let schema = instance.schema().clone();
        if schema.kind() != ModelKind::EditableRoot {
            return Err(invalid_root(instance, action));
        }

        let (request, started) = begin(action, &schema);
        if !instance.is_dirty() {
            tracing::debug!(model = schema.name(), "nothing to save");
            return self.finish(action, &schema, &request, started, Ok(()));
        }

        let user = current_user(self);
        let request_ref = &request;
        let user_ref = user.as_deref();

        let result = self
            .transactions
            .run(self.data_source(&schema), |connection| async move {
                let call = NodeCall {
                    portal: self,
                    connection: &connection,
                    request: request_ref,
                    user: user_ref,
                };
                save_node(call, instance, None).await
            })
            .await;
        self.finish(action, &schema, &request, started, result)
    }
}

/// Dispatch one node on its mutation state
fn save_node<'a>(
    call: NodeCall<'a>,
    instance: &'a mut ModelInstance,
    parent_key: Option<&'a Record>,
) -> BoxFuture<'a, Result<()>> {
    async move {
        match instance.state() {
            MutationState::Created => insert_node(call, instance, parent_key).await,
            MutationState::Pristine | MutationState::Changed => {
                update_node(call, instance, parent_key).await
            }
            MutationState::MarkedForRemoval => remove_node(call, instance, parent_key).await,
            MutationState::Removed => Ok(()),
        }
    }
    .boxed()
}

async fn insert_node(
    call: NodeCall<'_>,
    instance: &mut ModelInstance,
    parent_key: Option<&Record>,
) -> Result<()> {
    let schema = instance.schema().clone();
    if !call.authorize(instance, AuthAction::Create, None)? {
        return Ok(());
    }
    if let Some(parent_key) = parent_key {
        instance.apply_parent_key(parent_key);
    }

    let dao = call.dao(&schema, PortalAction::Insert)?;
    call.emit(&schema, EventPhase::Pre, PortalAction::Insert, None);
    let saved = dao
        .insert(call.context(&schema, parent_key), &instance.to_record())
        .await
        .map_err(|e| dao_failure(e, PortalAction::Insert, schema.name()))?;
    instance.load_record(&saved)?;
    instance.mark_pristine();

    let key = instance.key();
    save_children(call, instance, &key).await?;

    call.emit(&schema, EventPhase::Post, PortalAction::Insert, None);
    Ok(())
}

/// Update the node if it changed; children are visited either way
async fn update_node(
    call: NodeCall<'_>,
    instance: &mut ModelInstance,
    parent_key: Option<&Record>,
) -> Result<()> {
    let schema = instance.schema().clone();
    let changed = instance.state() == MutationState::Changed;
    if changed {
        if !call.authorize(instance, AuthAction::Update, None)? {
            return Ok(());
        }

        let dao = call.dao(&schema, PortalAction::Update)?;
        call.emit(&schema, EventPhase::Pre, PortalAction::Update, None);
        let saved = dao
            .update(call.context(&schema, parent_key), &instance.to_record())
            .await
            .map_err(|e| dao_failure(e, PortalAction::Update, schema.name()))?;
        instance.load_record(&saved)?;
        instance.mark_pristine();
    }

    let key = instance.key();
    save_children(call, instance, &key).await?;

    if changed {
        call.emit(&schema, EventPhase::Post, PortalAction::Update, None);
    }
    Ok(())
}

/// Remove every child first, then the node itself
async fn remove_node(
    call: NodeCall<'_>,
    instance: &mut ModelInstance,
    parent_key: Option<&Record>,
) -> Result<()> {
    let schema = instance.schema().clone();
    if !call.authorize(instance, AuthAction::Remove, None)? {
        return Ok(());
    }
    // re-apply the cascade to anything attached after the node was marked
    instance.remove();

    let dao = call.dao(&schema, PortalAction::Remove)?;
    call.emit(&schema, EventPhase::Pre, PortalAction::Remove, None);
    let key = instance.key();
    save_children(call, instance, &key).await?;

    dao.remove(call.context(&schema, parent_key), &key)
        .await
        .map_err(|e| dao_failure(e, PortalAction::Remove, schema.name()))?;
    instance.mark_removed();

    call.emit(&schema, EventPhase::Post, PortalAction::Remove, None);
    Ok(())
}

/// Fan out over every child object and collection of `instance`
async fn save_children(
    call: NodeCall<'_>,
    instance: &mut ModelInstance,
    key: &Record,
) -> Result<()> {
    let schema = instance.schema().clone();
    let branches = instance
        .children_mut()
        .filter_map(|child| match child {
            ChildMut::Object { instance, .. } if instance.is_dirty() => {
                Some(save_node(call, instance, Some(key)))
            }
            ChildMut::Collection { collection, .. } if collection.is_dirty() => {
                Some(save_collection(call, collection, key))
            }
            _ => None,
        })
        .collect();
    join_branches("save", schema.name(), call.request, branches).await
}

/// Save every item concurrently, then drop the ones deleted from storage
fn save_collection<'a>(
    call: NodeCall<'a>,
    collection: &'a mut ModelCollection,
    parent_key: &'a Record,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let model = collection.item_schema().name().to_string();
        let branches = collection
            .iter_mut()
            .filter(|item| item.is_dirty())
            .map(|item| save_node(call, item, Some(parent_key)))
            .collect();
        join_branches("save", &model, call.request, branches).await?;
        collection.purge_removed();
        Ok(())
    }
    .boxed()
}

use bizobj_core::errors::{BoError, Result};
use bizobj_core::model::ChildMut;
use bizobj_core::{AuthAction, ModelCollection, ModelInstance, PortalAction, Record};
use futures::future::BoxFuture;
use futures::FutureExt;

use super::{begin, current_user, dao_failure, invalid_root, DataPortal, NodeCall};
use crate::events::EventPhase;
use crate::join::join_branches;

impl DataPortal {
    /// Load a root and its whole graph
    ///
    /// `method` routes the root query to `Dao::fetch_by_name`. Children are
    /// fetched with their parent's key as filter, siblings concurrently; the
    /// call returns only after every branch has finished.
    ///
    /// # Errors
    ///
    /// * `InvalidState` - not a root
    /// * `NotFound` - the root query returned no rows
    /// * `AuthorizationDenied` - denied in throw mode
    /// * `UnsupportedOperation` / `DataAccess` / `DaoNotRegistered` - from any
    ///   node; the first by completion order
    /// * `Transaction` - the connection could not be opened or released
    pub async fn fetch(
        &self,
        instance: &mut ModelInstance,
        filter: &Record,
        method: Option<&str>,
    ) -> Result<()> {
        let schema = instance.schema().clone();
        if !schema.kind().is_root() {
            return Err(invalid_root(instance, PortalAction::Fetch));
        }

        let (request, started) = begin(PortalAction::Fetch, &schema);
        let user = current_user(self);
        let request_ref = &request;
        let user_ref = user.as_deref();

        let result = self
            .transactions
            .with_connection(self.data_source(&schema), |connection| async move {
                let call = NodeCall {
                    portal: self,
                    connection: &connection,
                    request: request_ref,
                    user: user_ref,
                };
                fetch_object(call, instance, filter, method, true).await
            })
            .await;
        self.finish(PortalAction::Fetch, &schema, &request, started, result)
    }
}

/// Fetch one object, then its children
///
/// A root (`required`) with no matching row is `NotFound`; a child object
/// with no row is left as it was.
fn fetch_object<'a>(
    call: NodeCall<'a>,
    instance: &'a mut ModelInstance,
    filter: &'a Record,
    method: Option<&'a str>,
    required: bool,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let schema = instance.schema().clone();
        if !call.authorize(instance, AuthAction::Fetch, None)? {
            return Ok(());
        }

        let dao = call.dao(&schema, PortalAction::Fetch)?;
        call.emit(&schema, EventPhase::Pre, PortalAction::Fetch, method);
        let parent_key = (!required).then_some(filter);
        let ctx = call.context(&schema, parent_key);
        let rows = match method {
            Some(method) => dao.fetch_by_name(ctx, method, filter).await,
            None => dao.fetch(ctx, filter).await,
        }
        .map_err(|e| dao_failure(e, PortalAction::Fetch, schema.name()))?;

        let Some(row) = rows.first() else {
            if required {
                return Err(BoError::NotFound {
                    model: schema.name().to_string(),
                    filter: filter.to_string(),
                });
            }
            return Ok(());
        };
        instance.load_record(row)?;
        instance.mark_pristine();

        let key = instance.key();
        fetch_children(call, instance, &key).await?;

        call.emit(&schema, EventPhase::Post, PortalAction::Fetch, method);
        Ok(())
    }
    .boxed()
}

/// One DAO call for the whole collection, then each item's children
fn fetch_collection<'a>(
    call: NodeCall<'a>,
    collection: &'a mut ModelCollection,
    parent_key: &'a Record,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let schema = collection.item_schema().clone();
        if !call.authorize_model(&schema, AuthAction::Fetch)? {
            return Ok(());
        }

        let dao = call.dao(&schema, PortalAction::Fetch)?;
        call.emit(&schema, EventPhase::Pre, PortalAction::Fetch, None);
        let rows = dao
            .fetch(call.context(&schema, Some(parent_key)), parent_key)
            .await
            .map_err(|e| dao_failure(e, PortalAction::Fetch, schema.name()))?;
        collection.load_items(&rows)?;

        if schema.child_properties().next().is_some() {
            let branches = collection.iter_mut().map(|item| fetch_item(call, item)).collect();
            join_branches("fetch", schema.name(), call.request, branches).await?;
        }

        call.emit(&schema, EventPhase::Post, PortalAction::Fetch, None);
        Ok(())
    }
    .boxed()
}

fn fetch_item<'a>(call: NodeCall<'a>, item: &'a mut ModelInstance) -> BoxFuture<'a, Result<()>> {
    async move {
        let key = item.key();
        fetch_children(call, item, &key).await
    }
    .boxed()
}

/// Fan out over every child object and collection of `instance`
///
/// Also used to refresh the read-only children of a command after execute.
pub(super) async fn fetch_children(
    call: NodeCall<'_>,
    instance: &mut ModelInstance,
    key: &Record,
) -> Result<()> {
    let schema = instance.schema().clone();
    let branches = instance
        .children_mut()
        .map(|child| match child {
            ChildMut::Object { instance, .. } => fetch_object(call, instance, key, None, false),
            ChildMut::Collection { collection, .. } => fetch_collection(call, collection, key),
        })
        .collect();
    join_branches("fetch", schema.name(), call.request, branches).await
}

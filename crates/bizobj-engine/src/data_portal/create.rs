use bizobj_core::errors::Result;
use bizobj_core::model::ChildMut;
use bizobj_core::{AuthAction, ModelInstance, PortalAction};
use futures::future::BoxFuture;
use futures::FutureExt;

use super::{begin, current_user, dao_failure, invalid_root, DataPortal, NodeCall};
use crate::events::EventPhase;
use crate::join::join_branches;

impl DataPortal {
    /// Fill a brand-new root and its child objects with default values
    ///
    /// Child collections stay empty. When create is denied in record or
    /// silent mode the instance is returned untouched.
    ///
    /// # Errors
    ///
    /// * `InvalidState` - not a new, editable root or command
    /// * `AuthorizationDenied` - denied in throw mode
    /// * `UnsupportedOperation` / `DataAccess` / `DaoNotRegistered`
    /// * `Transaction` - the connection could not be opened or released
    pub async fn create(&self, instance: &mut ModelInstance) -> Result<()> {
        let schema = instance.schema().clone();
        let kind = schema.kind();
        if !kind.is_root() || kind.is_read_only() || !instance.is_new() {
            return Err(invalid_root(instance, PortalAction::Create));
        }

        let (request, started) = begin(PortalAction::Create, &schema);
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
                create_node(call, instance).await
            })
            .await;
        self.finish(PortalAction::Create, &schema, &request, started, result)
    }
}

fn create_node<'a>(call: NodeCall<'a>, instance: &'a mut ModelInstance) -> BoxFuture<'a, Result<()>> {
    async move {
        let schema = instance.schema().clone();
        if !call.authorize(instance, AuthAction::Create, None)? {
            return Ok(());
        }

        let dao = call.dao(&schema, PortalAction::Create)?;
        call.emit(&schema, EventPhase::Pre, PortalAction::Create, None);
        let defaults = dao
            .create(call.context(&schema, None))
            .await
            .map_err(|e| dao_failure(e, PortalAction::Create, schema.name()))?;
        instance.load_record(&defaults)?;

        let branches = instance
            .children_mut()
            .filter_map(|child| match child {
                ChildMut::Object { instance, .. } => Some(create_node(call, instance)),
                ChildMut::Collection { .. } => None,
            })
            .collect();
        join_branches("create", schema.name(), call.request, branches).await?;

        call.emit(&schema, EventPhase::Post, PortalAction::Create, None);
        Ok(())
    }
    .boxed()
}

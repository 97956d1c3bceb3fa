use bizobj_core::errors::Result;
use bizobj_core::{AuthAction, ModelInstance, ModelKind, PortalAction};

use super::fetch::fetch_children;
use super::{begin, current_user, dao_failure, invalid_root, DataPortal, NodeCall};
use crate::events::EventPhase;

impl DataPortal {
    /// Run a command object's `method` in one DAO round-trip
    ///
    /// The command's scalar properties go out and the returned record is
    /// copied back; its read-only children are then re-fetched with the
    /// command's key.
    ///
    /// # Errors
    ///
    /// * `InvalidState` - not a command object
    /// * `AuthorizationDenied` - `executeMethod` denied in throw mode
    /// * `UnsupportedOperation` / `DataAccess` / `DaoNotRegistered`
    /// * `Transaction` - the connection could not be opened or released
    pub async fn execute(&self, instance: &mut ModelInstance, method: &str) -> Result<()> {
        let schema = instance.schema().clone();
        if schema.kind() != ModelKind::Command {
            return Err(invalid_root(instance, PortalAction::Execute));
        }

        let (request, started) = begin(PortalAction::Execute, &schema);
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
                execute_node(call, instance, method).await
            })
            .await;
        self.finish(PortalAction::Execute, &schema, &request, started, result)
    }
}

async fn execute_node(call: NodeCall<'_>, instance: &mut ModelInstance, method: &str) -> Result<()> {
    let schema = instance.schema().clone();
    if !call.authorize(instance, AuthAction::ExecuteMethod, Some(method))? {
        return Ok(());
    }

    let dao = call.dao(&schema, PortalAction::Execute)?;
    call.emit(&schema, EventPhase::Pre, PortalAction::Execute, Some(method));
    let returned = dao
        .execute(call.context(&schema, None), method, &instance.to_record())
        .await
        .map_err(|e| dao_failure(e, PortalAction::Execute, schema.name()))?;
    instance.load_record(&returned)?;
    instance.mark_pristine();

    let key = instance.key();
    fetch_children(call, instance, &key).await?;

    call.emit(&schema, EventPhase::Post, PortalAction::Execute, Some(method));
    Ok(())
}

use takt_types::UserAction;

use super::events::DispatchEvent;
use crate::context::ProcessContext;
use crate::error::TransmissionError;
use crate::state::SystemState;

pub(super) fn dispatch_user(
    action: &UserAction,
    state: &SystemState,
    ctx: &ProcessContext,
    effects: &mut Vec<DispatchEvent>,
) -> Result<(), TransmissionError> {
    let mut users = state.write_users(ctx)?;
    match action {
        UserAction::Add(user) => {
            if user.name.trim().is_empty() {
                return Err(TransmissionError::Validation("user name is empty".into()));
            }
            users.add(user.clone())?;
            log::info!(target: "dispatch", "added user {} '{}'", user.id, user.name);
        }
        UserAction::Remove(id) => {
            let removed = users.remove(*id)?;
            log::info!(target: "dispatch", "removed user {} '{}'", removed.id, removed.name);
        }
        UserAction::Rename(id, name) => {
            if name.trim().is_empty() {
                return Err(TransmissionError::Validation("user name is empty".into()));
            }
            users.rename(*id, name.clone())?;
        }
        UserAction::SetPermission(id, permission) => {
            users.get_mut(*id)?.permission = *permission;
        }
        UserAction::SetActive(id, active) => {
            users.get_mut(*id)?.active = *active;
        }
    }
    effects.push(DispatchEvent::UsersChanged);
    Ok(())
}

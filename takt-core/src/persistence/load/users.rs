use takt_types::{User, UserId, UserPermission};

use crate::error::CodecError;
use crate::persistence::codec::Reader;
use crate::persistence::versions::{VersionTable, V_BASE, V_USER_PERMISSIONS};

pub(crate) static USER: VersionTable<User> = VersionTable::new(
    "user",
    &[(V_USER_PERMISSIONS, read_user_v300), (V_BASE, read_user_v100)],
);

pub fn read_user(r: &mut Reader<'_>) -> Result<User, CodecError> {
    USER.decode(r)
}

fn read_user_v300(r: &mut Reader<'_>) -> Result<User, CodecError> {
    let id = UserId::new(r.u64()?);
    let name = r.string()?;
    let permission = permission_from_code(r.u8()?)?;
    let mut user = User::new(id, name, permission);
    user.active = r.bool()?;
    user.password_hash = r.string()?;
    user.last_login = r.option(|r| r.datetime())?;
    Ok(user)
}

/// Before permission levels, users were either administrators or planners.
fn read_user_v100(r: &mut Reader<'_>) -> Result<User, CodecError> {
    let id = UserId::new(r.u64()?);
    let name = r.string()?;
    let permission = if r.bool()? {
        UserPermission::Administrator
    } else {
        UserPermission::Planner
    };
    let mut user = User::new(id, name, permission);
    user.active = r.bool()?;
    user.password_hash = r.string()?;
    Ok(user)
}

fn permission_from_code(code: u8) -> Result<UserPermission, CodecError> {
    match code {
        0 => Ok(UserPermission::Viewer),
        1 => Ok(UserPermission::Planner),
        2 => Ok(UserPermission::Administrator),
        other => Err(CodecError::Corrupt(format!("unknown permission code {}", other))),
    }
}

//! Authorization predicates over the acting principal. Each one either lets
//! the request through or ends it with `Forbidden`.

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;

pub fn require_admin(user: &CurrentUser) -> AppResult<()> {
    if user.is_admin {
        Ok(())
    } else {
        Err(AppError::Forbidden("not allowed, only admin".into()))
    }
}

/// The route subject must be the principal.
pub fn require_self(user: &CurrentUser, subject_id: &str) -> AppResult<()> {
    if user.id == subject_id {
        Ok(())
    } else {
        Err(AppError::Forbidden("not allowed, only the user themself".into()))
    }
}

pub fn require_self_or_admin(user: &CurrentUser, subject_id: &str) -> AppResult<()> {
    if user.id == subject_id || user.is_admin {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "not allowed, only the user themself or an admin".into(),
        ))
    }
}

/// The principal must own the resource.
pub fn require_owner(user: &CurrentUser, owner_id: &str) -> AppResult<()> {
    if user.id == owner_id {
        Ok(())
    } else {
        Err(AppError::Forbidden("access denied, you are not the owner".into()))
    }
}

pub fn require_owner_or_admin(user: &CurrentUser, owner_id: &str) -> AppResult<()> {
    if user.id == owner_id || user.is_admin {
        Ok(())
    } else {
        Err(AppError::Forbidden("access denied, forbidden".into()))
    }
}

use crate::stores::{IdentityError, IdentityStore};

/// What [`reconfirm_before_delete`] found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconfirmation {
    /// The identity was still anonymous and has been deleted.
    Deleted,
    /// The identity no longer existed, either at lookup or at delete time.
    AlreadyGone,
    /// The identity now has linked providers and was left alone.
    Upgraded { provider_count: usize },
}

/// Deletes `uid` only if the identity store, read immediately beforehand,
/// still reports it as anonymous.
///
/// Tracker documents cache the anonymous flag and may lag behind a link to a
/// permanent credential, so they must never be the only input to a delete.
/// Every destructive call on identities goes through here.
pub async fn reconfirm_before_delete(
    identities: &dyn IdentityStore,
    uid: &str,
) -> Result<Reconfirmation, IdentityError> {
    let identity = match identities.get_identity(uid).await {
        Ok(identity) => identity,
        Err(IdentityError::NotFound) => return Ok(Reconfirmation::AlreadyGone),
        Err(e) => return Err(e),
    };

    if !identity.is_anonymous() {
        return Ok(Reconfirmation::Upgraded {
            provider_count: identity.provider_count,
        });
    }

    match identities.delete_identity(uid).await {
        Ok(()) => Ok(Reconfirmation::Deleted),
        Err(IdentityError::NotFound) => Ok(Reconfirmation::AlreadyGone),
        Err(e) => Err(e),
    }
}

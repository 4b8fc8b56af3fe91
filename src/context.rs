//! Process-wide slot holding the handle of the currently mounted provider.
//!
//! Code anywhere in the application calls [`use_fathom`] instead of threading the handle
//! through every layer.

use std::sync::{LazyLock, PoisonError, RwLock};

use crate::provider::Fathom;

static CURRENT: LazyLock<RwLock<Option<(u64, Fathom)>>> = LazyLock::new(|| RwLock::new(None));

/// Handle of the most recently mounted provider that is still mounted.
pub fn use_fathom() -> Option<Fathom> {
    CURRENT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .map(|(_, fathom)| fathom.clone())
}

pub(crate) fn provide(mount_id: u64, fathom: Fathom) {
    *CURRENT.write().unwrap_or_else(PoisonError::into_inner) = Some((mount_id, fathom));
}

/// Clears the slot, unless a newer mount has replaced `mount_id` in the meantime.
pub(crate) fn withdraw(mount_id: u64) {
    let mut current = CURRENT.write().unwrap_or_else(PoisonError::into_inner);
    if matches!(current.as_ref(), Some((id, _)) if *id == mount_id) {
        *current = None;
    }
}

use std::sync::Arc;

use crate::cloud::{CloudStore, DocumentStore, UserId};
use crate::db::LocalStore;
use crate::store::EntityStore;

/// The storage backend for one authentication state.
///
/// A session is built once per auth state and owns exactly one adapter, so a
/// single operation can never reach both backends. Signing in or out means
/// building a new session.
pub struct Session {
    backend: Backend,
}

enum Backend {
    Guest(Arc<LocalStore>),
    SignedIn(CloudStore),
}

impl Session {
    /// Anonymous use: everything goes to the on-device store.
    pub fn guest(local: Arc<LocalStore>) -> Self {
        Self {
            backend: Backend::Guest(local),
        }
    }

    /// Signed in: everything goes to `user`'s namespace in the document store.
    pub fn signed_in(user: UserId, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            backend: Backend::SignedIn(CloudStore::new(documents, user)),
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn EntityStore {
        match &self.backend {
            Backend::Guest(local) => local.as_ref(),
            Backend::SignedIn(cloud) => cloud,
        }
    }

    #[must_use]
    pub fn identity(&self) -> Option<&UserId> {
        match &self.backend {
            Backend::Guest(_) => None,
            Backend::SignedIn(cloud) => Some(cloud.user()),
        }
    }

    #[must_use]
    pub fn is_guest(&self) -> bool {
        matches!(self.backend, Backend::Guest(_))
    }
}

use std::sync::Arc;

use tracing::debug;
use url::Url;

use super::connection::{LiveConnection, Session};
use super::interrupt::Interrupt;
use super::target::normalize_target;
use crate::cache::ResourceCaches;
use crate::error::{Result, SessionError};
use crate::transport::Transport;

impl<T: Transport> Session<T> {
    /// Derive a session for `target`, always sharing this session's credential.
    ///
    /// For the same target the child aliases this session's live connection
    /// and caches. For any other target it starts unconnected with fresh
    /// caches that keep this session's caching-enabled flag.
    pub fn derive_child(&self, target: &str) -> Result<Arc<Session<T>>> {
        let target = normalize_target(target)?;
        Ok(Arc::new(self.child_for(target)))
    }

    pub async fn derive_child_by_id(&self, id: &str) -> Result<Arc<Session<T>>> {
        self.derive_child_by_id_with(id, &Interrupt::none()).await
    }

    /// Resolve `id` to a site URI over this session's connection, then derive
    /// a child for it as [`Session::derive_child`] does.
    ///
    /// Connects first if needed. When that connect is what made resolution
    /// possible, the child is also stored in the owning registry.
    pub async fn derive_child_by_id_with(&self, id: &str, interrupt: &Interrupt) -> Result<Arc<Session<T>>> {
        let was_connected = self.is_connected();
        if !was_connected {
            self.connect_with(false, interrupt).await?;
        }

        let handle = self.current_handle()?;

        let resolved = interrupt
            .run(async {
                self.connector
                    .transport()
                    .resolve_id(&handle, id)
                    .await
                    .map_err(SessionError::from)
            })
            .await?;
        let target = normalize_target(resolved.as_str())?;
        debug!(id = id, parent = %self.target, resolved = %target, "Resolved resource id");

        let child = Arc::new(self.child_for(target));
        if !was_connected && self.is_connected() {
            self.register_derived(&child);
        }
        Ok(child)
    }

    fn child_for(&self, target: Url) -> Session<T> {
        if target == self.target {
            Session {
                credential: Arc::clone(&self.credential),
                target,
                connector: Arc::clone(&self.connector),
                live: Arc::clone(&self.live),
                caches: Arc::clone(&self.caches),
                registry: self.registry.clone(),
            }
        } else {
            Session {
                credential: Arc::clone(&self.credential),
                target,
                connector: Arc::clone(&self.connector),
                live: Arc::new(LiveConnection::new()),
                caches: Arc::new(ResourceCaches::new(self.caches.is_enabled())),
                registry: self.registry.clone(),
            }
        }
    }

    fn register_derived(&self, child: &Arc<Session<T>>) {
        let Some(registry) = self.owning_registry() else {
            return;
        };
        match registry.store(Arc::clone(child)) {
            Ok(()) => debug!(target = %child.target, "Registered derived session"),
            Err(err) => debug!(target = %child.target, reason = %err, "Derived session not registered"),
        }
    }
}

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::connector::Connector;
use super::interrupt::Interrupt;
use super::state::{InitOutcome, SessionState};
use super::target::normalize_target;
use crate::auth::Credential;
use crate::cache::{ResourceCache, ResourceCaches};
use crate::error::{Result, SessionError};
use crate::registry::store::RegistryInner;
use crate::registry::SessionKey;
use crate::transport::{ProbeError, Transport, TransportError};

struct Status<H> {
    state: SessionState,
    handle: Option<Arc<H>>,
}

/// Connection state shared by a session and its same-target children.
///
/// `transition` is held for the whole of a connect or init, so at most one
/// state transition is in flight per live connection. `status` is only
/// locked for short synchronous reads and writes.
pub(crate) struct LiveConnection<H> {
    transition: Mutex<()>,
    status: RwLock<Status<H>>,
}

impl<H> LiveConnection<H> {
    pub(crate) fn new() -> Self {
        Self {
            transition: Mutex::new(()),
            status: RwLock::new(Status {
                state: SessionState::Unconnected,
                handle: None,
            }),
        }
    }
}

/// An authenticated, cached connection to one site for one identity.
pub struct Session<T: Transport> {
    pub(crate) credential: Arc<Credential>,
    pub(crate) target: Url,
    pub(crate) connector: Arc<Connector<T>>,
    pub(crate) live: Arc<LiveConnection<T::Handle>>,
    pub(crate) caches: Arc<ResourceCaches>,
    /// Set once, by whichever registry first holds the session.
    pub(crate) registry: OnceLock<Weak<RegistryInner<T>>>,
}

impl<T: Transport> Session<T> {
    /// Build an unconnected session. It joins a registry once stored there.
    pub fn new(credential: Arc<Credential>, target: &str, connector: Arc<Connector<T>>) -> Result<Self> {
        let target = normalize_target(target)?;
        Ok(Self::unconnected(credential, target, connector, None))
    }

    pub(crate) fn unconnected(
        credential: Arc<Credential>,
        target: Url,
        connector: Arc<Connector<T>>,
        registry: Option<Weak<RegistryInner<T>>>,
    ) -> Self {
        let caching = connector.config().caching_enabled;
        Self {
            credential,
            target,
            connector,
            live: Arc::new(LiveConnection::new()),
            caches: Arc::new(ResourceCaches::new(caching)),
            registry: registry.map(OnceLock::from).unwrap_or_default(),
        }
    }

    /// Attach the owning registry. Returns false if one is already attached.
    pub(crate) fn bind_registry(&self, registry: Weak<RegistryInner<T>>) -> bool {
        self.registry.set(registry).is_ok()
    }

    pub(crate) fn owning_registry(&self) -> Option<Arc<RegistryInner<T>>> {
        self.registry.get()?.upgrade()
    }

    pub(crate) fn owned_by(&self, registry: &Arc<RegistryInner<T>>) -> bool {
        self.registry
            .get()
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(registry)))
    }

    pub fn credential(&self) -> &Arc<Credential> {
        &self.credential
    }

    pub fn username(&self) -> &str {
        self.credential.username()
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.username(), self.target.clone())
    }

    pub fn connector(&self) -> &Arc<Connector<T>> {
        &self.connector
    }

    pub fn state(&self) -> SessionState {
        self.live.status.read().state
    }

    /// Connected means a transport handle exists, whatever the state label says.
    pub fn is_connected(&self) -> bool {
        let status = self.live.status.read();
        status.state.is_connected() && status.handle.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// The live transport handle. Only available once the session is ready.
    pub fn transport_handle(&self) -> Result<Arc<T::Handle>> {
        let status = self.live.status.read();
        match (&status.state, &status.handle) {
            (SessionState::Ready, Some(handle)) => Ok(Arc::clone(handle)),
            _ => Err(self.not_ready()),
        }
    }

    pub fn caches(&self) -> &Arc<ResourceCaches> {
        &self.caches
    }

    pub fn folder_cache(&self) -> ResourceCache<'_> {
        self.caches.folder()
    }

    pub fn list_cache(&self) -> ResourceCache<'_> {
        self.caches.list()
    }

    pub fn content_type_cache(&self) -> ResourceCache<'_> {
        self.caches.content_type()
    }

    pub async fn connect(&self, force: bool) -> Result<()> {
        self.connect_with(force, &Interrupt::none()).await
    }

    /// Resolve auth material and build the transport handle. A no-op when
    /// already connected, unless `force` is set.
    pub async fn connect_with(&self, force: bool, interrupt: &Interrupt) -> Result<()> {
        let _transition = interrupt.run(async { Ok(self.live.transition.lock().await) }).await?;
        self.connect_locked(force, interrupt).await
    }

    pub async fn init(&self) -> Result<InitOutcome> {
        self.init_with(&Interrupt::none()).await
    }

    /// Confirm the connection authenticates with one probe round trip.
    ///
    /// An authorization denial is retried once, after the configured delay
    /// and a forced reconnect, provided the credential carries a secret.
    /// Otherwise, or if the retry is denied too, init returns normally and
    /// the session stays not ready. Unrecoverable identity failures raise
    /// `SecurityError`; any other failure propagates without retry.
    pub async fn init_with(&self, interrupt: &Interrupt) -> Result<InitOutcome> {
        let _transition = interrupt.run(async { Ok(self.live.transition.lock().await) }).await?;
        // Without a handle there is nothing to initialize; the state stays as is.
        let handle = self.current_handle()?;

        let result = self.init_locked(handle, interrupt).await;
        if result.is_err() && self.state() != SessionState::ConnectFailed {
            self.set_state(SessionState::InitFailed);
        }
        result
    }

    pub async fn ensure_ready(&self, auto_connect: bool) -> Result<()> {
        self.ensure_ready_with(auto_connect, &Interrupt::none()).await
    }

    /// Drive connect (if `auto_connect`) and init until the session is ready.
    pub async fn ensure_ready_with(&self, auto_connect: bool, interrupt: &Interrupt) -> Result<()> {
        if !self.is_connected() && auto_connect {
            self.connect_with(false, interrupt).await?;
        }
        if !self.is_ready() && self.is_connected() {
            self.init_with(interrupt).await?;
        }
        if self.is_ready() {
            Ok(())
        } else {
            Err(self.not_ready())
        }
    }

    async fn connect_locked(&self, force: bool, interrupt: &Interrupt) -> Result<()> {
        if !force && self.is_connected() {
            debug!(target = %self.target, "Already connected");
            return Ok(());
        }

        self.set_state(SessionState::Connecting);
        info!(target = %self.target, username = self.username(), force, "Connecting");

        match interrupt.run(self.open_handle()).await {
            Ok(handle) => {
                let mut status = self.live.status.write();
                status.handle = Some(Arc::new(handle));
                status.state = SessionState::Connected;
                Ok(())
            }
            Err(err) => {
                {
                    let mut status = self.live.status.write();
                    status.handle = None;
                    status.state = SessionState::ConnectFailed;
                }
                warn!(target = %self.target, error = %err, "Connect failed");
                Err(err)
            }
        }
    }

    async fn open_handle(&self) -> Result<T::Handle> {
        let material = self
            .credential
            .resolve(&self.target, self.connector.resolvers())
            .await?;
        self.connector
            .transport()
            .open(&self.target, &material)
            .await
            .map_err(|source| SessionError::Connect {
                target: self.target.to_string(),
                source,
            })
    }

    async fn init_locked(&self, handle: Arc<T::Handle>, interrupt: &Interrupt) -> Result<InitOutcome> {
        self.set_state(SessionState::Initializing);

        match self.probe(&handle, interrupt).await? {
            Ok(()) => return Ok(self.mark_ready()),
            Err(ProbeError::AuthDenied) => {}
            Err(err) => return Err(self.probe_failure(err)),
        }

        if let Err(err) = self.credential.validate(true) {
            debug!(
                target = %self.target,
                reason = %err,
                "Authorization denied; credential cannot re-authenticate"
            );
            return Ok(InitOutcome::ReauthUnavailable);
        }

        let delay = self.connector.config().retry_delay();
        warn!(
            target = %self.target,
            delay_ms = delay.as_millis() as u64,
            "Authorization denied; reconnecting before retry"
        );
        interrupt.sleep(delay).await?;
        self.connect_locked(true, interrupt).await?;

        let handle = self.current_handle()?;
        self.set_state(SessionState::Initializing);

        match self.probe(&handle, interrupt).await? {
            Ok(()) => Ok(self.mark_ready()),
            Err(ProbeError::AuthDenied) => {
                warn!(target = %self.target, attempt = 2, "Authorization denied again; giving up");
                Ok(InitOutcome::AuthRetryExhausted)
            }
            Err(err) => Err(self.probe_failure(err)),
        }
    }

    /// Outer result: interrupted. Inner result: what the probe reported.
    async fn probe(
        &self,
        handle: &T::Handle,
        interrupt: &Interrupt,
    ) -> Result<std::result::Result<(), ProbeError>> {
        interrupt
            .run(async { Ok(self.connector.transport().probe(handle).await) })
            .await
    }

    fn probe_failure(&self, err: ProbeError) -> SessionError {
        match err {
            ProbeError::UnrecoverableIdentity(reason) => {
                warn!(target = %self.target, reason = %reason, "Identity provider rejected account");
                SessionError::Security {
                    target: self.target.to_string(),
                    reason,
                }
            }
            ProbeError::AuthDenied => SessionError::Transport(TransportError::Unauthorized),
            ProbeError::Other(err) => SessionError::Transport(err),
        }
    }

    pub(super) fn current_handle(&self) -> Result<Arc<T::Handle>> {
        self.live
            .status
            .read()
            .handle
            .clone()
            .ok_or_else(|| self.not_ready())
    }

    fn mark_ready(&self) -> InitOutcome {
        self.set_state(SessionState::Ready);
        info!(target = %self.target, username = self.username(), "Session ready");
        InitOutcome::Ready
    }

    fn set_state(&self, state: SessionState) {
        let mut status = self.live.status.write();
        debug!(target = %self.target, from = status.state.as_str(), to = state.as_str(), "Session transition");
        status.state = state;
    }

    fn not_ready(&self) -> SessionError {
        SessionError::NotReady {
            target: self.target.to_string(),
        }
    }
}

impl<T: Transport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username())
            .field("target", &self.target.as_str())
            .field("state", &self.state())
            .field("caches", &self.caches)
            .finish()
    }
}

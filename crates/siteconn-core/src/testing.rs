//! Scripted in-memory transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use crate::auth::{AuthMaterial, AuthResolvers};
use crate::config::SessionConfig;
use crate::session::Connector;
use crate::transport::{ProbeError, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProbeScript {
    Ok,
    AuthDenied,
    Unrecoverable,
    NetworkDown,
}

#[derive(Debug)]
pub(crate) struct MockHandle;

pub(crate) struct MockTransport {
    script: Mutex<VecDeque<ProbeScript>>,
    fallback: ProbeScript,
    resolutions: HashMap<String, String>,
    fail_open: bool,
    stall_resolve: bool,
    opens: AtomicUsize,
    probes: AtomicUsize,
    resolves: AtomicUsize,
}

impl MockTransport {
    /// Every probe succeeds.
    pub fn new() -> Self {
        Self::always(ProbeScript::Ok)
    }

    pub fn always(outcome: ProbeScript) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: outcome,
            resolutions: HashMap::new(),
            fail_open: false,
            stall_resolve: false,
            opens: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            resolves: AtomicUsize::new(0),
        }
    }

    /// Probes follow `outcomes` in order, then succeed.
    pub fn scripted(outcomes: impl IntoIterator<Item = ProbeScript>) -> Self {
        let transport = Self::new();
        transport.script.lock().extend(outcomes);
        transport
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::new()
        }
    }

    /// `resolve_id` never completes.
    pub fn stalled_resolution() -> Self {
        Self {
            stall_resolve: true,
            ..Self::new()
        }
    }

    pub fn with_resolution(mut self, id: &str, url: &str) -> Self {
        self.resolutions.insert(id.to_string(), url.to_string());
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Handle = MockHandle;

    async fn open(&self, _target: &Url, _auth: &AuthMaterial) -> Result<MockHandle, TransportError> {
        if self.fail_open {
            return Err(TransportError::ServerError("site unavailable".to_string()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to interleave.
        tokio::task::yield_now().await;
        Ok(MockHandle)
    }

    async fn probe(&self, _handle: &MockHandle) -> Result<(), ProbeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script.lock().pop_front().unwrap_or(self.fallback);
        match outcome {
            ProbeScript::Ok => Ok(()),
            ProbeScript::AuthDenied => Err(ProbeError::AuthDenied),
            ProbeScript::Unrecoverable => Err(ProbeError::UnrecoverableIdentity("invalid_realm".to_string())),
            ProbeScript::NetworkDown => Err(ProbeError::Other(TransportError::InvalidResponse(
                "connection reset".to_string(),
            ))),
        }
    }

    async fn resolve_id(&self, _handle: &MockHandle, id: &str) -> Result<Url, TransportError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if self.stall_resolve {
            std::future::pending::<()>().await;
        }
        let url = self
            .resolutions
            .get(id)
            .ok_or_else(|| TransportError::NotFound(id.to_string()))?;
        Url::parse(url).map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }
}

pub(crate) fn connector(transport: MockTransport) -> Arc<Connector<MockTransport>> {
    connector_with(transport, SessionConfig::default())
}

pub(crate) fn connector_with(transport: MockTransport, config: SessionConfig) -> Arc<Connector<MockTransport>> {
    Arc::new(Connector::new(transport, AuthResolvers::new(), config))
}

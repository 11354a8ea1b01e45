use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{ApiCall, ApiReply, DirectTransport, ProxyTransport, Transport, TransportCapability};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct,
    Proxy,
}

/// Picks a transport for every call by probing the execution context at
/// send time. Nothing is cached, so a call made before the extension
/// becomes reachable goes direct and the next one is proxied.
pub struct TransportSelector {
    capability: Arc<dyn TransportCapability>,
    direct: Arc<dyn Transport>,
    proxy: Arc<dyn Transport>,
}

impl TransportSelector {
    pub fn new(
        capability: Arc<dyn TransportCapability>,
        direct: Arc<dyn Transport>,
        proxy: Arc<dyn Transport>,
    ) -> Self {
        Self {
            capability,
            direct,
            proxy,
        }
    }

    /// Uses the proxy's own channel as the capability probe.
    pub fn probing(direct: DirectTransport, proxy: ProxyTransport) -> Self {
        let proxy = Arc::new(proxy);
        Self {
            capability: proxy.clone(),
            direct: Arc::new(direct),
            proxy,
        }
    }

    pub fn route(&self) -> Route {
        if self.capability.privileged_channel_reachable() {
            Route::Proxy
        } else {
            Route::Direct
        }
    }
}

#[async_trait]
impl Transport for TransportSelector {
    async fn send(&self, call: ApiCall) -> ApiReply {
        let route = self.route();
        debug!(target: "bridge.transport", ?route, method = %call.method, path = %call.path, "routing api call");
        match route {
            Route::Proxy => self.proxy.send(call).await,
            Route::Direct => self.direct.send(call).await,
        }
    }
}

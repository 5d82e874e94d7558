//! Client IP resolution.
//!
//! The caller IP ends up in the audit message, so `X-Forwarded-For` is only
//! honoured when the direct peer is a trusted proxy.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
    response::Response,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::domain::config::SecurityConfig;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolved caller address, inserted as a request extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// IP protection layer
#[derive(Clone)]
pub struct IpProtectionLayer {
    config: Arc<SecurityConfig>,
}

impl IpProtectionLayer {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for IpProtectionLayer {
    type Service = IpProtectionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IpProtectionService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

/// IP protection service
#[derive(Clone)]
pub struct IpProtectionService<S> {
    inner: S,
    config: Arc<SecurityConfig>,
}

impl<S> Service<Request<Body>> for IpProtectionService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // Without ConnectInfo (in-process tests) the peer is treated as local.
        let direct_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let client_ip = determine_client_ip(&req, direct_ip, &self.config);
        req.extensions_mut().insert(ClientIp(client_ip));

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}

/// Pick the caller address according to the trusted proxy settings.
fn determine_client_ip<B>(req: &Request<B>, direct_ip: IpAddr, config: &SecurityConfig) -> IpAddr {
    let forwarded = req
        .headers()
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok());

    let Some(forwarded) = forwarded else {
        return direct_ip;
    };

    if !is_trusted_proxy(direct_ip, config) {
        warn!(
            direct_ip = %direct_ip,
            forwarded = forwarded,
            "Ignoring X-Forwarded-For from untrusted source"
        );
        return direct_ip;
    }

    // client, proxy1, proxy2: skip `proxy_count` entries from the right
    let ips: Vec<&str> = forwarded.split(',').map(|s| s.trim()).collect();
    let index = ips.len().saturating_sub(config.proxy_count + 1);
    match ips.get(index).and_then(|s| s.parse::<IpAddr>().ok()) {
        Some(ip) => {
            debug!(forwarded = forwarded, extracted_ip = %ip, "Client IP from header");
            ip
        }
        None => direct_ip,
    }
}

fn is_trusted_proxy(ip: IpAddr, config: &SecurityConfig) -> bool {
    config.trusted_proxies.contains(&ip)
        || (config.trust_localhost && ip.is_loopback())
        || (config.trust_private_ips && is_private_ip(ip))
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => ipv4.is_private() || ipv4.is_link_local(),
        // fc00::/7
        IpAddr::V6(ipv6) => (ipv6.octets()[0] & 0xfe) == 0xfc,
    }
}

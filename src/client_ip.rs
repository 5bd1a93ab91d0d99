//! Optional client IP address extractor.
//!
//! `axum_client_ip` rejects when no address can be determined; visits and
//! audit entries should still go through without one.

use std::convert::Infallible;
use std::net::IpAddr;

use axum::extract::FromRequestParts as _;
use axum::extract::OptionalFromRequestParts;
use axum::http::request::Parts;
use axum_client_ip::ClientIpSource;

use crate::utils::env_var_or_else;

/// Client IP address extractor.
#[derive(Clone, Debug)]
pub struct ClientAddress {
    /// Internal IP address
    ip_address: axum_client_ip::ClientIp,
}

impl ClientAddress {
    /// The plain address
    pub fn ip(self) -> IpAddr {
        self.ip_address.0
    }
}

impl<S> OptionalFromRequestParts<S> for ClientAddress
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let ip_address = axum_client_ip::ClientIp::from_request_parts(parts, state).await;

        Ok(ip_address.ok().map(|ip_address| Self { ip_address }))
    }
}

/// Where the client address comes from, per deployment
///
/// Behind a reverse proxy the connection address is the proxy; the
/// `CLIENT_IP_SOURCE` environment variable picks the right header.
pub fn source_from_environment() -> ClientIpSource {
    let source = env_var_or_else("CLIENT_IP_SOURCE", || "ConnectInfo".to_string());

    match source.as_str() {
        "RightmostForwarded" => ClientIpSource::RightmostForwarded,
        "RightmostXForwardedFor" => ClientIpSource::RightmostXForwardedFor,
        "XRealIp" => ClientIpSource::XRealIp,
        "FlyClientIp" => ClientIpSource::FlyClientIp,
        "TrueClientIp" => ClientIpSource::TrueClientIp,
        "CfConnectingIp" => ClientIpSource::CfConnectingIp,
        _ => ClientIpSource::ConnectInfo,
    }
}

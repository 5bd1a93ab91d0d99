//! Audit trail service

use std::net::IpAddr;

use axum::Extension;
use axum::RequestPartsExt;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::client_ip::ClientAddress;
use crate::storage::AuditEntry;
use crate::storage::Storage;

use super::CurrentPrincipal;
use super::Error;

/// Audit trail service
pub struct AuditTrail<S: Storage> {
    /// Storage in where the trail is saved
    storage: S,

    /// The principal acting
    principal: CurrentPrincipal,

    /// The IP address associated with the action
    ip_address: Option<IpAddr>,
}

impl<S: Storage> AuditTrail<S> {
    /// Register an entry on the audit trail
    ///
    /// The trail is best effort; a failing write is logged, never
    /// propagated.
    pub async fn register(&self, entry: AuditEntry<'_>) {
        let result = self
            .storage
            .register_audit_trail(&self.principal.username, &entry, self.ip_address.as_ref())
            .await;

        if let Err(err) = result {
            tracing::error!("Could not register audit trail entry: {err}");
        }
    }
}

impl<B, S: Storage> FromRequestParts<B> for AuditTrail<S>
where
    B: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &B) -> Result<Self, Self::Rejection> {
        let Extension(storage) = parts
            .extract::<Extension<S>>()
            .await
            .map_err(|_| Error::internal_server_error("Could not get a storage handle"))?;

        let principal = CurrentPrincipal::from_request_parts(parts, state).await?;

        let ip_address = parts
            .extract::<Option<ClientAddress>>()
            .await
            .map_err(|_| Error::internal_server_error("Missing address"))?
            .map(ClientAddress::ip);

        Ok(AuditTrail {
            storage,
            principal,
            ip_address,
        })
    }
}

//! Shared plumbing for the test suite
//!
//! Builds the full router against the in-memory storage, with a stub
//! reputation oracle and no reachability probe, and drives it with plain
//! `tower::Service` calls.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::Method;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::http::header::COOKIE;
use axum::http::header::LOCATION;
use axum::http::header::REFERER;
use axum::http::header::SET_COOKIE;
use axum::http::header::USER_AGENT;
use http_body_util::BodyExt;
use regex::Regex;
use serde_json::Value;
use serde_json::json;
use tower::Service;
use uuid::Uuid;

use crate::api::PRINCIPAL_HEADER;
use crate::create_router;
use crate::geo::GeoLocator;
use crate::geo::Location;
use crate::geo::UnknownLocator;
use crate::roles;
use crate::security::DestinationPolicy;
use crate::security::ReputationOracle;
use crate::storage::Memory;
use crate::storage::Storage;

/// The seeded administrator
pub const ADMIN: &str = "boss";

/// A regular link owner
pub const OWNER: &str = "jdoe";

/// Somebody else entirely
pub const OTHER: &str = "asmith";

/// Destinations under this host are "dangerous" in tests
pub const FLAGGED_HOST: &str = "flagged.test";

/// Oracle flagging a fixed host, everything else clean
pub struct StubOracle;

#[async_trait]
impl ReputationOracle for StubOracle {
    async fn flagged(&self, destination: &str) -> anyhow::Result<bool> {
        Ok(destination.contains(FLAGGED_HOST))
    }
}

/// Locator answering from a fixed address table
pub struct MapLocator {
    /// Address to location
    pub locations: HashMap<IpAddr, Location>,
}

#[async_trait]
impl GeoLocator for MapLocator {
    async fn locate(&self, ip: IpAddr) -> Location {
        self.locations.get(&ip).cloned().unwrap_or_default()
    }
}

/// The screening policy every test app runs with
///
/// One regex rule (anything mentioning `evil.test`), the stub oracle, no
/// probe.
pub fn test_policy() -> DestinationPolicy {
    DestinationPolicy::new(
        vec![Regex::new(r"evil\.test").expect("valid pattern")],
        Arc::new(StubOracle),
        None,
    )
}

/// Build the app plus a handle on its storage
pub async fn setup_test_app() -> (Router, Memory) {
    let storage = Memory::new();

    storage
        .grant_role(roles::ADMIN, ADMIN, "test-setup")
        .await
        .unwrap();

    let app = create_router(storage.clone(), test_policy(), Arc::new(UnknownLocator));

    (app, storage)
}

/// Fire a request with an optional principal and JSON body
pub async fn send(
    app: &mut Router,
    method: Method,
    uri: &str,
    principal: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(principal) = principal {
        builder = builder.header(PRINCIPAL_HEADER, principal);
    }

    let request = if let Some(body) = body {
        builder
            .header(CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    } else {
        builder.body(Body::empty()).unwrap()
    };

    let response = app.call(request).await.unwrap();
    let status_code = response.status();

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body[..]).unwrap()
    };

    (status_code, value)
}

/// Create a link and hand back the response body
pub async fn create_link(
    app: &mut Router,
    principal: &str,
    title: &str,
    destination: &str,
) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/api/links",
        Some(principal),
        Some(json!({ "title": title, "destination": destination })),
    )
    .await
}

/// Attach an alias; `None` asks for a generated code
pub async fn create_alias(
    app: &mut Router,
    principal: &str,
    link_id: &Uuid,
    alias: Option<&str>,
) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        &format!("/api/links/{link_id}/aliases"),
        Some(principal),
        Some(json!({ "alias": alias, "description": "test alias" })),
    )
    .await
}

/// The `data.id` of a response body
pub fn data_id(value: &Value) -> Uuid {
    value["data"]["id"]
        .as_str()
        .map(Uuid::parse_str)
        .unwrap()
        .unwrap()
}

/// The `data.alias` of a response body
pub fn data_alias(value: &Value) -> String {
    value["data"]["alias"].as_str().unwrap().to_string()
}

/// The error message of a response body
pub fn error_message(value: &Value) -> String {
    value["error"].as_str().unwrap().to_string()
}

/// Follow an alias like a browser would
///
/// Returns the status, the `Location` header and the `Set-Cookie` header.
pub async fn visit(
    app: &mut Router,
    path_and_query: &str,
) -> (StatusCode, Option<String>, Option<String>) {
    visit_with(app, path_and_query, None, None, None).await
}

/// Follow an alias with optional cookie, user agent and referer
pub async fn visit_with(
    app: &mut Router,
    path_and_query: &str,
    cookie: Option<&str>,
    user_agent: Option<&str>,
    referer: Option<&str>,
) -> (StatusCode, Option<String>, Option<String>) {
    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(format!("/{path_and_query}"));

    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }

    if let Some(user_agent) = user_agent {
        builder = builder.header(USER_AGENT, user_agent);
    }

    if let Some(referer) = referer {
        builder = builder.header(REFERER, referer);
    }

    let request = builder.body(Body::empty()).unwrap();

    let response = app.call(request).await.unwrap();

    let status_code = response.status();
    let headers = response.headers();

    let location = headers
        .get(LOCATION)
        .map(|header| header.to_str().unwrap().to_string());

    let set_cookie = headers
        .get(SET_COOKIE)
        .map(|header| header.to_str().unwrap().to_string());

    (status_code, location, set_cookie)
}

/// Turn a `Set-Cookie` header back into a `Cookie` header value
pub fn cookie_from_set_cookie(set_cookie: &str) -> String {
    set_cookie
        .split(';')
        .next()
        .expect("split always yields one piece")
        .to_string()
}

//! Registry authentication
//!
//! Pings `/v2/`, over https first and then plain http for local registries.
//! When the registry answers 401 it follows the `WWW-Authenticate` challenge: a Bearer challenge is exchanged for a token
//! scoped to push+pull on the target repository, a Basic challenge means the
//! credentials are sent with every request.

use crate::error::RegistryError;
use crate::error::handlers::HttpErrorHandler;
use crate::reference::Repository;
use crate::registry::Credentials;
use crate::registry::transport::Transport;
use reqwest::header::WWW_AUTHENTICATE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
    Basic,
}

/// How requests to one repository are authorized
#[derive(Clone, PartialEq, Eq)]
pub enum Authorization {
    Anonymous,
    Basic { username: String, password: String },
    Bearer(String),
}

impl std::fmt::Debug for Authorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Authorization::Anonymous => f.write_str("Anonymous"),
            Authorization::Basic { username, .. } => write!(f, "Basic({})", username),
            Authorization::Bearer(_) => f.write_str("Bearer(..)"),
        }
    }
}

impl Authorization {
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Authorization::Anonymous => request,
            Authorization::Basic { username, password } => request.basic_auth(username, Some(password)),
            Authorization::Bearer(token) => request.bearer_auth(token),
        }
    }
}

/// Where and how requests for one repository are sent
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Registry root that answered the ping
    pub base: Url,
    pub auth: Authorization,
}

/// Find a reachable registry root and work out the authorization for
/// pushing to `repository`
///
/// Every candidate root except the last is pinged once through `first_try`; the
/// last one goes through `transport`, so its failures carry the caller's
/// retry policy.
pub async fn authorize(
    http: &Client,
    first_try: &dyn Transport,
    transport: &dyn Transport,
    repository: &Repository,
    credentials: &Credentials,
) -> Result<Endpoint, RegistryError> {
    let (base, response) = ping(http, first_try, transport, repository).await?;

    let auth = match response.status() {
        status if status.is_success() => {
            debug!(registry = %repository.registry(), "registry does not require authentication");
            Authorization::Anonymous
        }
        StatusCode::UNAUTHORIZED => {
            let header = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|h| h.to_str().ok())
                .ok_or_else(|| RegistryError::Auth("401 without WWW-Authenticate challenge".to_string()))?;

            match parse_challenge(header) {
                Some(Challenge::Bearer { realm, service, .. }) => {
                    let scope = format!("repository:{}:push,pull", repository.path());
                    let token =
                        fetch_token(http, transport, &realm, service.as_deref(), &scope, credentials).await?;
                    Authorization::Bearer(token)
                }
                Some(Challenge::Basic) if !credentials.is_anonymous() => Authorization::Basic {
                    username: credentials.username.clone(),
                    password: credentials.password.clone(),
                },
                Some(Challenge::Basic) => {
                    return Err(RegistryError::Auth(
                        "registry requires basic auth but no credentials were configured".to_string(),
                    ));
                }
                None => return Err(RegistryError::Auth(format!("unsupported challenge: {}", header))),
            }
        }
        _ => return Err(HttpErrorHandler::from_response(response, "registry ping").await),
    };

    Ok(Endpoint { base, auth })
}

/// Candidate registry roots, in the order they are tried
pub fn base_urls(repository: &Repository) -> Result<Vec<Url>, RegistryError> {
    repository
        .schemes()
        .iter()
        .map(|scheme| Ok(Url::parse(&format!("{}://{}/", scheme, repository.registry()))?))
        .collect()
}

async fn ping(
    http: &Client,
    first_try: &dyn Transport,
    transport: &dyn Transport,
    repository: &Repository,
) -> Result<(Url, Response), RegistryError> {
    let mut candidates = base_urls(repository)?;
    let last = candidates
        .pop()
        .ok_or_else(|| RegistryError::Protocol(format!("no endpoint for {}", repository.registry())))?;

    for base in candidates {
        let request = http.get(base.join("v2/")?).build()?;
        match first_try.send(request).await {
            Ok(response) => return Ok((base, response)),
            Err(err) => debug!(base = %base, error = %err, "registry unreachable, trying next scheme"),
        }
    }

    let request = http.get(last.join("v2/")?).build()?;
    let response = transport.send(request).await?;
    Ok((last, response))
}

async fn fetch_token(
    http: &Client,
    transport: &dyn Transport,
    realm: &str,
    service: Option<&str>,
    scope: &str,
    credentials: &Credentials,
) -> Result<String, RegistryError> {
    let mut url = Url::parse(realm)?;
    {
        let mut query = url.query_pairs_mut();
        if let Some(service) = service {
            query.append_pair("service", service);
        }
        query.append_pair("scope", scope);
    }

    debug!(realm = %realm, scope = %scope, "requesting registry token");

    let mut request = http.get(url);
    if !credentials.is_anonymous() {
        request = request.basic_auth(&credentials.username, Some(&credentials.password));
    }
    let response = transport.send(request.build()?).await?;

    if !response.status().is_success() {
        let err = HttpErrorHandler::from_response(response, "token request").await;
        return Err(RegistryError::Auth(err.to_string()));
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| RegistryError::Auth(format!("failed to parse token response: {}", e)))?;

    body.token
        .or(body.access_token)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| RegistryError::Auth("token response did not contain a token".to_string()))
}

/// Parse a `WWW-Authenticate` header value
///
/// Parameter values may be quoted and may contain commas, as in
/// `scope="repository:app:push,pull"`.
pub fn parse_challenge(header: &str) -> Option<Challenge> {
    let (scheme, params) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));

    if scheme.eq_ignore_ascii_case("basic") {
        return Some(Challenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut params = parse_params(params);
    let realm = params.remove("realm")?;
    Some(Challenge::Bearer {
        realm,
        service: params.remove("service"),
        scope: params.remove("scope"),
    })
}

fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }

        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    other => value.push(other),
                }
            }
        } else {
            while let Some(c) = chars.peek() {
                if *c == ',' {
                    break;
                }
                value.push(*c);
                chars.next();
            }
        }

        params.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    params
}

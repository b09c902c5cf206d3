//! Registry authentication negotiation.
//!
//! A stored Basic credential is tried against `/v2/` first. Registries that
//! accept it directly get the Basic header; registries that answer with a
//! `Bearer` challenge get a repository-scoped token from the challenge realm.

use crate::credentials::DockerCredentials;
use crate::http::RegistryHttp;
use regsweep_core::error::SweepError;
use regsweep_core::Outcome;
use reqwest::blocking::RequestBuilder;
use serde::Deserialize;
use tracing::{debug, warn};

/// What the negotiated credential must allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Pull,
    Delete,
}

impl Action {
    fn scope_actions(self) -> &'static str {
        match self {
            Action::Pull => "pull",
            Action::Delete => "pull,delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthHeader {
    /// Base64 `user:password`
    Basic(String),
    Bearer(String),
}

impl AuthHeader {
    pub fn header_value(&self) -> String {
        match self {
            AuthHeader::Basic(encoded) => format!("Basic {encoded}"),
            AuthHeader::Bearer(token) => format!("Bearer {token}"),
        }
    }

    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", self.header_value())
    }
}

/// Parsed `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

/// Parse a Bearer challenge. Quoted values may contain commas.
pub fn parse_bearer_challenge(header: &str) -> Option<BearerChallenge> {
    let header = header.trim();
    let (scheme, params) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut realm = None;
    let mut service = None;
    let mut scope = None;
    for (key, value) in split_auth_params(params) {
        match key.to_ascii_lowercase().as_str() {
            "realm" => realm = Some(value),
            "service" => service = Some(value),
            "scope" => scope = Some(value),
            _ => {}
        }
    }

    Some(BearerChallenge {
        realm: realm.filter(|r| !r.is_empty())?,
        service,
        scope,
    })
}

fn split_auth_params(params: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut chars = params.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| *c == ',' || c.is_whitespace()) {
            chars.next();
        }
        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.is_empty() {
            break;
        }
        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut escaped = false;
            for c in chars.by_ref() {
                match (escaped, c) {
                    (false, '\\') => escaped = true,
                    (false, '"') => break,
                    _ => {
                        value.push(c);
                        escaped = false;
                    }
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
        pairs.push((key.trim().to_string(), value.trim().to_string()));
    }
    pairs
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Negotiates an [`AuthHeader`] for one registry.
#[derive(Clone)]
pub struct RegistryAuthNegotiator {
    registry: String,
    http: RegistryHttp,
    credentials: DockerCredentials,
}

impl RegistryAuthNegotiator {
    pub fn new(registry: &str, http: RegistryHttp, credentials: DockerCredentials) -> Self {
        Self {
            registry: registry.to_string(),
            http,
            credentials,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.credentials.basic_for(&self.registry).is_some()
    }

    /// Resolve a header valid for `action` on `repository`.
    ///
    /// Without a stored credential this is
    /// `Failed(SweepError::AuthUnavailable)`: the repository must be skipped,
    /// never treated as empty.
    pub fn resolve(&self, repository: &str, action: Action) -> Outcome<AuthHeader> {
        let Some(basic) = self.credentials.basic_for(&self.registry) else {
            return Outcome::Failed(SweepError::AuthUnavailable {
                registry: self.registry.clone(),
            });
        };
        let basic = AuthHeader::Basic(basic.to_string());

        let probe_url = self.http.url("/v2/");
        let probe = match self
            .http
            .send(basic.apply(self.http.get(&probe_url)), "GET /v2/")
        {
            Ok(response) => response,
            Err(e) => return Outcome::Failed(e),
        };

        if probe.is_success() {
            debug!(registry = %self.registry, "Registry accepts basic credentials");
            return Outcome::Ok(basic);
        }
        if probe.status != 401 {
            return Outcome::from_status(probe.status, "GET /v2/");
        }

        let challenge = probe
            .www_authenticate
            .as_deref()
            .and_then(parse_bearer_challenge);
        match challenge {
            Some(challenge) => self.exchange_token(&challenge, &basic, repository, action),
            None => Outcome::Failed(SweepError::AccessDenied(format!(
                "{} rejected the stored credential",
                self.registry
            ))),
        }
    }

    fn exchange_token(
        &self,
        challenge: &BearerChallenge,
        basic: &AuthHeader,
        repository: &str,
        action: Action,
    ) -> Outcome<AuthHeader> {
        let scope = format!("repository:{}:{}", repository, action.scope_actions());
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(service) = challenge.service.as_deref() {
            query.push(("service", service));
        }
        query.push(("scope", scope.as_str()));

        let request = basic.apply(self.http.get(&challenge.realm).query(&query));
        let response = match self.http.execute(request, "token exchange") {
            Outcome::Ok(response) => response,
            Outcome::NotFound => {
                warn!(realm = %challenge.realm, "Token endpoint returned 404");
                return Outcome::Failed(SweepError::Transient(format!(
                    "token endpoint {} returned HTTP 404",
                    challenge.realm
                )));
            }
            Outcome::Failed(e) => return Outcome::Failed(e),
        };

        let parsed: TokenResponse = match response.json() {
            Ok(parsed) => parsed,
            Err(e) => return Outcome::Failed(e),
        };
        match parsed.token.or(parsed.access_token) {
            Some(token) if !token.is_empty() => {
                debug!(repository = %repository, scope = %scope, "Obtained bearer token");
                Outcome::Ok(AuthHeader::Bearer(token))
            }
            _ => Outcome::Failed(SweepError::Parse(
                "token response contained neither token nor access_token".into(),
            )),
        }
    }
}

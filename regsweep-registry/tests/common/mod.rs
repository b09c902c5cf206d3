//! A fake Docker Registry v2 served by axum on a background thread.

#![allow(dead_code)]

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regsweep_registry::credentials::DockerCredentials;
use regsweep_registry::distribution::{content_digest, DistributionBackend, DistributionSettings};
use regsweep_registry::manifest::{DOCKER_MANIFEST, OCI_INDEX};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
    /// `/v2/` accepts the Basic credential directly.
    #[default]
    Basic,
    /// `/v2/` answers with a Bearer challenge pointing at `/token`.
    Bearer,
}

#[derive(Default)]
pub struct RegistryState {
    auth: AuthMode,
    user: String,
    password: String,
    realm: String,
    repos: HashMap<String, BTreeMap<String, String>>,
    manifests: HashMap<String, (String, Vec<u8>)>,
    blobs: HashMap<String, Vec<u8>>,
    deleted: Vec<String>,
    token_scopes: Vec<String>,
    requests: usize,
}

impl RegistryState {
    fn basic(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.user, self.password))
    }

    fn authorized(&self, headers: &HeaderMap, path: Option<&str>, action: &str) -> bool {
        let provided = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        match self.auth {
            AuthMode::Basic => provided == format!("Basic {}", self.basic()),
            AuthMode::Bearer => {
                let Some(scope) = provided.strip_prefix("Bearer tok:") else {
                    return false;
                };
                match path {
                    None => true,
                    Some(path) => {
                        scope.starts_with(&format!("repository:{path}:"))
                            && scope
                                .rsplit(':')
                                .next()
                                .unwrap_or("")
                                .split(',')
                                .any(|a| a == action)
                    }
                }
            }
        }
    }

    fn challenge(&self, path: Option<&str>, action: &str) -> Response {
        let value = match self.auth {
            AuthMode::Basic => r#"Basic realm="fake-registry""#.to_string(),
            AuthMode::Bearer => match path {
                Some(path) => format!(
                    r#"Bearer realm="{}",service="fake-registry",scope="repository:{}:{}""#,
                    self.realm, path, action
                ),
                None => format!(r#"Bearer realm="{}",service="fake-registry""#, self.realm),
            },
        };
        let mut response = (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        if let Ok(value) = HeaderValue::from_str(&value) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

type Shared = Arc<Mutex<RegistryState>>;

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"errors": [{"code": "NAME_UNKNOWN"}]})),
    )
        .into_response()
}

async fn root(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = state.lock().expect("state lock");
    state.requests += 1;
    if state.authorized(&headers, None, "pull") {
        StatusCode::OK.into_response()
    } else {
        state.challenge(None, "pull")
    }
}

async fn token(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().expect("state lock");
    state.requests += 1;
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided != format!("Basic {}", state.basic()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let scope = query.get("scope").cloned().unwrap_or_default();
    state.token_scopes.push(scope.clone());
    Json(json!({"access_token": format!("tok:{scope}")})).into_response()
}

async fn v2(
    State(state): State<Shared>,
    method: Method,
    headers: HeaderMap,
    Path(rest): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().expect("state lock");
    state.requests += 1;

    if let Some(path) = rest.strip_suffix("/tags/list") {
        if !state.authorized(&headers, Some(path), "pull") {
            return state.challenge(Some(path), "pull");
        }
        let Some(tags) = state.repos.get(path) else {
            return not_found();
        };
        let n = query
            .get("n")
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(usize::MAX);
        let last = query.get("last");
        let remaining: Vec<&String> = tags
            .keys()
            .filter(|t| last.map_or(true, |l| t.as_str() > l.as_str()))
            .collect();
        let page: Vec<&String> = remaining.iter().take(n).copied().collect();
        let mut response = Json(json!({"name": path, "tags": page})).into_response();
        if remaining.len() > n {
            if let Some(last) = page.last() {
                let link = format!(r#"</v2/{path}/tags/list?n={n}&last={last}>; rel="next""#);
                if let Ok(value) = HeaderValue::from_str(&link) {
                    response.headers_mut().insert(header::LINK, value);
                }
            }
        }
        return response;
    }

    if let Some((path, reference)) = rest.rsplit_once("/manifests/") {
        let action = if method == Method::DELETE { "delete" } else { "pull" };
        if !state.authorized(&headers, Some(path), action) {
            return state.challenge(Some(path), action);
        }
        let Some(repo) = state.repos.get(path) else {
            return not_found();
        };
        let digest = if reference.starts_with("sha256:") {
            reference.to_string()
        } else {
            match repo.get(reference) {
                Some(digest) => digest.clone(),
                None => return not_found(),
            }
        };

        if method == Method::DELETE {
            if state.manifests.remove(&digest).is_none() {
                return not_found();
            }
            if let Some(repo) = state.repos.get_mut(path) {
                repo.retain(|_, d| *d != digest);
            }
            state.deleted.push(format!("{path}@{digest}"));
            return StatusCode::ACCEPTED.into_response();
        }

        let Some((media_type, body)) = state.manifests.get(&digest).cloned() else {
            return not_found();
        };
        let mut response = (StatusCode::OK, body).into_response();
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&media_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        if let Ok(value) = HeaderValue::from_str(&digest) {
            headers.insert("docker-content-digest", value);
        }
        return response;
    }

    if let Some((path, digest)) = rest.rsplit_once("/blobs/") {
        if !state.authorized(&headers, Some(path), "pull") {
            return state.challenge(Some(path), "pull");
        }
        return match state.blobs.get(digest) {
            Some(body) => (StatusCode::OK, body.clone()).into_response(),
            None => not_found(),
        };
    }

    not_found()
}

pub struct FakeRegistry {
    state: Shared,
    pub host: String,
}

impl FakeRegistry {
    pub fn start(auth: AuthMode) -> Self {
        let state = Arc::new(Mutex::new(RegistryState {
            auth,
            user: "sweeper".into(),
            password: "s3cret".into(),
            ..RegistryState::default()
        }));

        let app = Router::new()
            .route("/v2/", get(root))
            .route("/v2/{*rest}", any(v2))
            .route("/token", get(token))
            .with_state(state.clone());

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("should build runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("should bind");
                tx.send(listener.local_addr().expect("should have address"))
                    .expect("should send address");
                axum::serve(listener, app).await.expect("server should run");
            });
        });

        let host = rx.recv().expect("server should start").to_string();
        state.lock().expect("state lock").realm = format!("http://{host}/token");
        Self { state, host }
    }

    fn store_manifest(&self, media_type: &str, body: serde_json::Value) -> String {
        let body = serde_json::to_vec(&body).expect("should encode manifest");
        let digest = content_digest(&body);
        self.state
            .lock()
            .expect("state lock")
            .manifests
            .insert(digest.clone(), (media_type.to_string(), body));
        digest
    }

    /// Store a single-platform manifest whose config records `created`.
    pub fn push_manifest(&self, path: &str, created: &str) -> String {
        let config = serde_json::to_vec(&json!({"created": created, "architecture": "amd64"}))
            .expect("should encode config");
        let config_digest = content_digest(&config);
        {
            let mut state = self.state.lock().expect("state lock");
            state.blobs.insert(config_digest.clone(), config);
            state.repos.entry(path.to_string()).or_default();
        }
        self.store_manifest(
            DOCKER_MANIFEST,
            json!({
                "schemaVersion": 2,
                "mediaType": DOCKER_MANIFEST,
                "config": {
                    "mediaType": "application/vnd.docker.container.image.v1+json",
                    "digest": config_digest,
                    "size": 1
                },
                "layers": []
            }),
        )
    }

    pub fn push_image(&self, path: &str, tag: &str, created: &str) -> String {
        let digest = self.push_manifest(path, created);
        self.tag(path, tag, &digest);
        digest
    }

    /// Tag an OCI index over `children`. The index has no annotations.
    pub fn push_index(&self, path: &str, tag: &str, children: &[&str]) -> String {
        let manifests: Vec<_> = children
            .iter()
            .map(|digest| json!({"mediaType": DOCKER_MANIFEST, "digest": digest, "size": 1}))
            .collect();
        let digest = self.store_manifest(
            OCI_INDEX,
            json!({"schemaVersion": 2, "mediaType": OCI_INDEX, "manifests": manifests}),
        );
        self.tag(path, tag, &digest);
        digest
    }

    pub fn tag(&self, path: &str, tag: &str, digest: &str) {
        self.state
            .lock()
            .expect("state lock")
            .repos
            .entry(path.to_string())
            .or_default()
            .insert(tag.to_string(), digest.to_string());
    }

    pub fn tags(&self, path: &str) -> Vec<String> {
        self.state
            .lock()
            .expect("state lock")
            .repos
            .get(path)
            .map(|tags| tags.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().expect("state lock").deleted.clone()
    }

    pub fn token_scopes(&self) -> Vec<String> {
        self.state.lock().expect("state lock").token_scopes.clone()
    }

    pub fn requests(&self) -> usize {
        self.state.lock().expect("state lock").requests
    }

    pub fn credentials(&self) -> DockerCredentials {
        let basic = self.state.lock().expect("state lock").basic();
        DockerCredentials::from_json(
            &json!({"auths": {self.host.clone(): {"auth": basic}}}).to_string(),
        )
        .expect("should parse credentials")
    }

    pub fn backend(&self, namespaces: &[&str], page_size: usize) -> DistributionBackend {
        self.backend_with(namespaces, page_size, self.credentials())
    }

    pub fn backend_with(
        &self,
        namespaces: &[&str],
        page_size: usize,
        credentials: DockerCredentials,
    ) -> DistributionBackend {
        DistributionBackend::new(
            DistributionSettings {
                registry: self.host.clone(),
                plain_http: true,
                namespaces: namespaces.iter().map(|n| n.to_string()).collect(),
                timeout: Duration::from_secs(5),
                page_size,
            },
            credentials,
        )
        .expect("should build backend")
    }
}

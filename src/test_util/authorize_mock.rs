//! In-process stand-in for the remote aggregator's authorize endpoint,
//! ported from `pkg/authorize/tollbooth/mock.go`: validates method,
//! content type, cluster id, and token-set membership, and returns 201 on
//! the first registration for a `(token, cluster)` pair and 200 after.
//!
//! Unlike the Go mock, the JSON response carries a `token` field, matching
//! this agent's authorize contract.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use http::{Method, Request, Response, StatusCode, Uri};
use hyper::Body;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::http::spawn_blackhole_http_server;

#[derive(Debug, Deserialize)]
struct AuthorizeRequest {
    #[serde(default)]
    authorization_token: String,
    #[serde(default)]
    cluster_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct AuthorizeResponse {
    token: String,
}

#[derive(Debug, Hash, Eq, PartialEq, Clone)]
struct Key {
    token: String,
    cluster: String,
}

pub struct AuthorizeMock {
    pub uri: Uri,
    requests: Arc<RwLock<Vec<(String, String)>>>,
}

impl AuthorizeMock {
    /// `valid_tokens` are the only `authorization_token`s that are accepted.
    pub async fn start(valid_tokens: impl IntoIterator<Item = &'static str>) -> Self {
        let tokens: HashSet<String> = valid_tokens.into_iter().map(str::to_owned).collect();
        let responses: Arc<RwLock<HashMap<Key, AuthorizeResponse>>> = Arc::new(RwLock::new(HashMap::new()));
        let requests: Arc<RwLock<Vec<(String, String)>>> = Arc::new(RwLock::new(Vec::new()));

        let handler_tokens = Arc::new(tokens);
        let handler_responses = responses.clone();
        let handler_requests = requests.clone();

        let uri = spawn_blackhole_http_server(move |req: Request<Body>| {
            let tokens = handler_tokens.clone();
            let responses = handler_responses.clone();
            let requests = handler_requests.clone();
            async move { Ok(handle(req, tokens, responses, requests).await) }
        })
        .await;

        AuthorizeMock { uri, requests }
    }

    pub async fn requests(&self) -> Vec<(String, String)> {
        self.requests.read().await.clone()
    }
}

async fn handle(
    req: Request<Body>,
    tokens: Arc<HashSet<String>>,
    responses: Arc<RwLock<HashMap<Key, AuthorizeResponse>>>,
    requests: Arc<RwLock<Vec<(String, String)>>>,
) -> Response<Body> {
    if req.method() != Method::POST {
        return json_response(StatusCode::METHOD_NOT_ALLOWED, "only POST is accepted");
    }

    let content_type_ok = req
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);
    if !content_type_ok {
        return json_response(StatusCode::BAD_REQUEST, "only application/json is accepted");
    }

    let bytes = match hyper::body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(_) => return json_response(StatusCode::BAD_REQUEST, "unable to read body"),
    };
    let parsed: AuthorizeRequest = match serde_json::from_slice(&bytes) {
        Ok(parsed) => parsed,
        Err(_) => return json_response(StatusCode::BAD_REQUEST, "unable to parse body as JSON"),
    };

    if parsed.cluster_id.is_empty() {
        return json_response(StatusCode::BAD_REQUEST, "no cluster ID provided");
    }

    if !tokens.contains(&parsed.authorization_token) {
        return json_response(StatusCode::UNAUTHORIZED, "the provided token is not recognized");
    }

    requests
        .write()
        .await
        .push((parsed.authorization_token.clone(), parsed.cluster_id.clone()));

    let key = Key {
        token: parsed.authorization_token.clone(),
        cluster: parsed.cluster_id.clone(),
    };

    let mut responses = responses.write().await;
    match responses.get(&key) {
        Some(existing) => ok_json(StatusCode::OK, existing.clone()),
        None => {
            let issued = AuthorizeResponse {
                token: format!("upload-token-for-{}", parsed.cluster_id),
            };
            responses.insert(key, issued.clone());
            ok_json(StatusCode::CREATED, issued)
        }
    }
}

fn ok_json(status: StatusCode, body: AuthorizeResponse) -> Response<Body> {
    let payload = serde_json::to_vec(&body).expect("AuthorizeResponse is always representable as JSON");
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload))
        .expect("response is always well-formed")
}

fn json_response(status: StatusCode, reason: &str) -> Response<Body> {
    #[derive(Serialize)]
    struct RegistrationError<'a> {
        reason: &'a str,
    }
    let payload = serde_json::to_vec(&RegistrationError { reason }).unwrap_or_default();
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload))
        .expect("response is always well-formed")
}

#[cfg(test)]
mod test {
    use super::*;

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn fresh_state() -> (Arc<HashSet<String>>, Arc<RwLock<HashMap<Key, AuthorizeResponse>>>, Arc<RwLock<Vec<(String, String)>>>) {
        (
            Arc::new(["tok".to_owned()].into_iter().collect()),
            Arc::new(RwLock::new(HashMap::new())),
            Arc::new(RwLock::new(Vec::new())),
        )
    }

    #[tokio::test]
    async fn rejects_non_post_methods() {
        let (tokens, responses, requests) = fresh_state().await;
        let req = Request::builder().method(Method::GET).body(Body::empty()).unwrap();
        let resp = handle(req, tokens, responses, requests).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn rejects_unknown_tokens() {
        let (tokens, responses, requests) = fresh_state().await;
        let req = post(r#"{"authorization_token":"nope","cluster_id":"c1"}"#);
        let resp = handle(req, tokens, responses, requests).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejects_empty_cluster_id() {
        let (tokens, responses, requests) = fresh_state().await;
        let req = post(r#"{"authorization_token":"tok","cluster_id":""}"#);
        let resp = handle(req, tokens, responses, requests).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn first_registration_is_201_repeat_is_200() {
        let (tokens, responses, requests) = fresh_state().await;
        let body = r#"{"authorization_token":"tok","cluster_id":"c1"}"#;

        let first = handle(post(body), tokens.clone(), responses.clone(), requests.clone()).await;
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = handle(post(body), tokens, responses, requests).await;
        assert_eq!(second.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn response_body_carries_a_token_field() {
        let (tokens, responses, requests) = fresh_state().await;
        let req = post(r#"{"authorization_token":"tok","cluster_id":"c1"}"#);
        let resp = handle(req, tokens, responses, requests).await;
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        let parsed: AuthorizeResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.token, "upload-token-for-c1");
    }
}

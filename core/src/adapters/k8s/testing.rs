//! A `kube::Client` backed by an in-process handler instead of an API server.

use std::sync::Arc;

use http::{Request, Response, StatusCode};
use kube::client::Body;
use kube::Client;
use parking_lot::Mutex;
use serde_json::{json, Value};

/// What the handler gets to see of a request.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub query: String,
}

/// Records every request made through its client.
#[derive(Clone, Default)]
pub struct MockApi {
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl MockApi {
    /// Builds a client whose requests are answered by `handler`.
    pub fn client<H>(handler: H) -> (Client, MockApi)
    where
        H: Fn(&SeenRequest) -> (StatusCode, Value) + Send + Sync + 'static,
    {
        let api = MockApi::default();
        let seen = Arc::clone(&api.seen);
        let handler = Arc::new(handler);

        let service = tower::service_fn(move |req: Request<Body>| {
            let request = SeenRequest {
                method: req.method().to_string(),
                path: req.uri().path().to_string(),
                query: req.uri().query().unwrap_or_default().to_string(),
            };
            let (status, body) = handler(&request);
            seen.lock().push(request);

            let response = Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string().into_bytes()));
            std::future::ready(response)
        });

        (Client::new(service, "default"), api)
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().clone()
    }

    /// Requests whose path is exactly `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.seen.lock().iter().filter(|r| r.path == path).count()
    }
}

pub fn pod(namespace: &str, name: &str, phase: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": { "name": name, "namespace": namespace },
        "status": { "phase": phase }
    })
}

pub fn pod_list(namespace: &str, names: &[&str]) -> Value {
    let items: Vec<Value> = names
        .iter()
        .map(|name| pod(namespace, name, "Running"))
        .collect();
    json!({
        "apiVersion": "v1",
        "kind": "PodList",
        "metadata": { "resourceVersion": "1" },
        "items": items
    })
}

pub fn service(namespace: &str, name: &str, selector: Option<Value>) -> Value {
    let spec = match selector {
        Some(selector) => json!({ "selector": selector, "ports": [{ "port": 80 }] }),
        None => json!({ "type": "ExternalName", "externalName": "db.example.com" }),
    };
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": name, "namespace": namespace },
        "spec": spec
    })
}

/// API `Status` body for an error response.
pub fn status(code: StatusCode, reason: &str, message: &str) -> (StatusCode, Value) {
    let body = json!({
        "apiVersion": "v1",
        "kind": "Status",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code.as_u16()
    });
    (code, body)
}

pub fn not_found(kind: &str, name: &str) -> (StatusCode, Value) {
    status(
        StatusCode::NOT_FOUND,
        "NotFound",
        &format!("{} \"{}\" not found", kind, name),
    )
}

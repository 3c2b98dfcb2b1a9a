//! HTTP collaborator tests against in-process fake servers.
//!
//! Each test binds a small axum app to 127.0.0.1:0 that speaks just enough
//! of the etcd v2 keys and members APIs, or the Kubernetes pods API.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Form, Json, Router};
use boot_core::cluster::AdminError;
use boot_core::discovery::DiscoveryError;
use boot_core::heartbeat::{beat, HeartbeatConfig};
use boot_core::resources::ResourceError;
use boot_core::{
    ClusterAdmin, DiscoveryStore, HttpClusterAdmin, HttpDiscovery, KubernetesPods, Member,
    ResourceLister,
};
use serde_json::{json, Value};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ============================================================================
// Fake keys API
// ============================================================================

#[derive(Default)]
struct Keys {
    values: BTreeMap<String, String>,
    ttls: BTreeMap<String, String>,
}

type SharedKeys = Arc<Mutex<Keys>>;

fn key_error(code: u32, status: StatusCode, key: &str) -> Response {
    let body = json!({"errorCode": code, "message": "error", "cause": key, "index": 1});
    (status, Json(body)).into_response()
}

async fn get_key(
    State(keys): State<SharedKeys>,
    Path(key): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let key = format!("/{}", key);
    let keys = keys.lock().unwrap();

    if let Some(value) = keys.values.get(&key) {
        return Json(json!({"action": "get", "node": {"key": key, "value": value}}))
            .into_response();
    }

    let prefix = format!("{}/", key);
    let children: Vec<Value> = keys
        .values
        .iter()
        .filter(|(k, _)| k.starts_with(&prefix))
        .map(|(k, v)| json!({"key": k, "value": v, "ttl": 7200}))
        .collect();
    if children.is_empty() {
        return key_error(100, StatusCode::NOT_FOUND, &key);
    }

    assert_eq!(params.get("recursive").map(String::as_str), Some("true"));
    Json(json!({"action": "get", "node": {"key": key, "dir": true, "nodes": children}}))
        .into_response()
}

async fn put_key(
    State(keys): State<SharedKeys>,
    Path(key): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let key = format!("/{}", key);
    let mut keys = keys.lock().unwrap();

    if form.get("prevExist").map(String::as_str) == Some("false") && keys.values.contains_key(&key) {
        return key_error(105, StatusCode::PRECONDITION_FAILED, &key);
    }

    let value = form.get("value").cloned().unwrap_or_default();
    keys.values.insert(key.clone(), value.clone());
    if let Some(ttl) = form.get("ttl") {
        keys.ttls.insert(key.clone(), ttl.clone());
    }
    (
        StatusCode::CREATED,
        Json(json!({"action": "set", "node": {"key": key, "value": value}})),
    )
        .into_response()
}

async fn delete_key(State(keys): State<SharedKeys>, Path(key): Path<String>) -> Response {
    let key = format!("/{}", key);
    match keys.lock().unwrap().values.remove(&key) {
        Some(_) => Json(json!({"action": "delete", "node": {"key": key}})).into_response(),
        None => key_error(100, StatusCode::NOT_FOUND, &key),
    }
}

async fn keys_server() -> (HttpDiscovery, SharedKeys) {
    let keys = SharedKeys::default();
    let app = Router::new()
        .route("/v2/keys/{*key}", get(get_key).put(put_key).delete(delete_key))
        .with_state(keys.clone());
    let url = serve(app).await;
    (HttpDiscovery::new(&url, TIMEOUT).unwrap(), keys)
}

#[tokio::test]
async fn test_keys_directory_listing() {
    let (store, keys) = keys_server().await;
    {
        let mut keys = keys.lock().unwrap();
        keys.values.insert("/deis/status/tok/etcd-a".into(), "t1".into());
        keys.values.insert("/deis/status/tok/etcd-b".into(), "t2".into());
    }

    let node = store.get("/deis/status/tok", true).await.unwrap();

    assert!(node.dir);
    let names: Vec<_> = node.nodes.iter().map(|n| n.name()).collect();
    assert_eq!(names, vec!["etcd-a", "etcd-b"]);
}

#[tokio::test]
async fn test_keys_missing_key_is_not_found() {
    let (store, _keys) = keys_server().await;

    let result = store.get("/deis/status/none", true).await;

    assert!(matches!(result, Err(DiscoveryError::NotFound(_))));
}

#[tokio::test]
async fn test_keys_set_sends_ttl() {
    let (store, keys) = keys_server().await;

    assert!(beat(&store, "/deis/status/tok/etcd-a", &HeartbeatConfig::default()).await);

    let keys = keys.lock().unwrap();
    assert_eq!(keys.ttls.get("/deis/status/tok/etcd-a").map(String::as_str), Some("7200"));
    let value = keys.values.get("/deis/status/tok/etcd-a").unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(value).is_ok());
}

#[tokio::test]
async fn test_keys_create_conflict() {
    let (store, _keys) = keys_server().await;

    store.create("/deis/discovery/tok/_config/size", "3").await.unwrap();
    let second = store.create("/deis/discovery/tok/_config/size", "5").await;

    assert!(matches!(second, Err(DiscoveryError::AlreadyExists(_))));
    let node = store.get("/deis/discovery/tok/_config/size", false).await.unwrap();
    assert_eq!(node.value.as_deref(), Some("3"));
}

#[tokio::test]
async fn test_keys_delete() {
    let (store, keys) = keys_server().await;
    keys.lock().unwrap().values.insert("/deis/x".into(), "1".into());

    store.delete("/deis/x").await.unwrap();

    assert!(matches!(store.delete("/deis/x").await, Err(DiscoveryError::NotFound(_))));
}

#[tokio::test]
async fn test_keys_unreachable_is_request_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let store = HttpDiscovery::new(&url, Duration::from_secs(1)).unwrap();

    let result = store.get("/deis", false).await;

    assert!(matches!(result, Err(DiscoveryError::Request(_))));
}

// ============================================================================
// Fake members API
// ============================================================================

type SharedMembers = Arc<Mutex<Vec<Member>>>;

async fn list_members(State(members): State<SharedMembers>) -> Json<Value> {
    Json(json!({"members": *members.lock().unwrap()}))
}

async fn add_member(State(members): State<SharedMembers>, Json(body): Json<Value>) -> Response {
    let peer_urls: Vec<String> = serde_json::from_value(body["peerURLs"].clone()).unwrap();
    let mut members = members.lock().unwrap();

    if members
        .iter()
        .any(|m| m.peer_urls.iter().any(|u| peer_urls.contains(u)))
    {
        return (StatusCode::CONFLICT, "etcdserver: peerURL exists").into_response();
    }

    let member = Member {
        id: format!("{:x}", 0xabc0 + members.len()),
        name: String::new(),
        peer_urls,
        client_urls: Vec::new(),
    };
    members.push(member.clone());
    (StatusCode::CREATED, Json(member)).into_response()
}

async fn remove_member(State(members): State<SharedMembers>, Path(id): Path<String>) -> StatusCode {
    let mut members = members.lock().unwrap();
    let before = members.len();
    members.retain(|m| m.id != id);
    if members.len() < before {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn members_server(initial: Vec<Member>) -> (HttpClusterAdmin, SharedMembers) {
    let members = Arc::new(Mutex::new(initial));
    let app = Router::new()
        .route("/v2/members", get(list_members).post(add_member))
        .route("/v2/members/{id}", delete(remove_member))
        .with_state(members.clone());
    let url = serve(app).await;
    (HttpClusterAdmin::new(&url, TIMEOUT).unwrap(), members)
}

#[tokio::test]
async fn test_members_list_add_remove() {
    let (admin, members) =
        members_server(vec![Member::new("a1", "etcd-a", "http://10.0.0.1:2380")]).await;

    let listed = admin.list_members().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "etcd-a");
    assert_eq!(listed[0].peer_urls, vec!["http://10.0.0.1:2380"]);

    let added = admin
        .add_member(&["http://10.0.0.9:2380".to_string()])
        .await
        .unwrap();
    assert!(added.name.is_empty());
    assert_eq!(added.peer_urls, vec!["http://10.0.0.9:2380"]);

    admin.remove_member("a1").await.unwrap();
    let remaining = members.lock().unwrap().clone();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, added.id);
}

#[tokio::test]
async fn test_members_errors_map_to_variants() {
    let (admin, _members) =
        members_server(vec![Member::new("a1", "etcd-a", "http://10.0.0.1:2380")]).await;

    let duplicate = admin.add_member(&["http://10.0.0.1:2380".to_string()]).await;
    assert!(matches!(duplicate, Err(AdminError::Conflict(_))));

    let missing = admin.remove_member("ffff").await;
    assert!(matches!(missing, Err(AdminError::NotFound(_))));
}

// ============================================================================
// Fake pods API
// ============================================================================

const BEARER: &str = "Bearer sa-token";

async fn list_pods(
    Path(namespace): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == BEARER);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    let items: Vec<Value> = match (namespace.as_str(), params.get("labelSelector").map(String::as_str)) {
        ("deis", Some("name=deis-etcd-1")) => vec![
            json!({"metadata": {"name": "etcd-a", "namespace": "deis"}}),
            json!({"metadata": {"name": "etcd-b", "namespace": "deis"}}),
        ],
        _ => Vec::new(),
    };
    Json(json!({"kind": "PodList", "items": items})).into_response()
}

async fn pods_server() -> String {
    let app = Router::new().route("/api/v1/namespaces/{namespace}/pods", get(list_pods));
    serve(app).await
}

#[tokio::test]
async fn test_pods_listed_by_namespace_and_selector() {
    let url = pods_server().await;
    let pods = KubernetesPods::new(&url, Some("sa-token".to_string()), TIMEOUT).unwrap();

    let names = pods.live_names("deis", "name=deis-etcd-1").await.unwrap();
    assert_eq!(names.len(), 2);
    assert!(names.contains("etcd-a"));
    assert!(names.contains("etcd-b"));

    let other = pods.live_names("default", "name=deis-etcd-1").await.unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn test_pods_without_token_are_rejected() {
    let url = pods_server().await;
    let pods = KubernetesPods::new(&url, None, TIMEOUT).unwrap();

    let result = pods.live_names("deis", "name=deis-etcd-1").await;

    assert!(matches!(result, Err(ResourceError::Request(_))));
}

//! In-process stand-in for the Koji API, served over plain HTTP/1.1.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;

use koji_store::{Client, ClientOptions, Endpoint, ProjectConfig};

pub const PROJECT_ID: &str = "p1";
pub const PROJECT_TOKEN: &str = "t1";

/// One request as the mock saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub content_type: String,
    /// Parsed JSON body, or `Value::Null` for non-JSON bodies
    pub body: Value,
    pub raw: Bytes,
}

type Collections = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Default)]
struct MockState {
    documents: Mutex<Collections>,
    requests: Mutex<Vec<RecordedRequest>>,
    forced_status: Mutex<Option<u16>>,
}

pub struct MockKoji {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: watch::Sender<bool>,
}

impl MockKoji {
    pub async fn start() -> MockKoji {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState::default());
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let accept_state = state.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { continue };
                        let state = accept_state.clone();
                        tokio::spawn(async move {
                            let service = service_fn(move |req| handle(state.clone(), req));
                            let _ = http1::Builder::new()
                                .serve_connection(TokioIo::new(stream), service)
                                .await;
                        });
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        MockKoji {
            addr,
            state,
            shutdown_tx,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> Client {
        self.client_with(ProjectConfig::new(PROJECT_ID, PROJECT_TOKEN))
    }

    pub fn client_with(&self, config: ProjectConfig) -> Client {
        let options = ClientOptions {
            endpoint: Endpoint::custom(&self.url()).unwrap(),
            timeout_ms: 5_000,
        };
        Client::with_options(config, options).unwrap()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    /// Answer every following request with `status` (after auth).
    pub fn force_status(&self, status: u16) {
        *self.state.forced_status.lock().unwrap() = Some(status);
    }

    pub fn document(&self, collection: &str, name: &str) -> Option<Value> {
        self.state
            .documents
            .lock()
            .unwrap()
            .get(collection)
            .and_then(|docs| docs.get(name))
            .cloned()
    }
}

impl Drop for MockKoji {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

async fn handle(state: Arc<MockState>, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    if !authorized(&req) {
        return Ok(reply(StatusCode::UNAUTHORIZED, Bytes::from_static(b"invalid project credentials")));
    }

    let path = req.uri().path().to_string();
    let content_type = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let raw = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return Ok(reply(StatusCode::BAD_REQUEST, Bytes::from_static(b"unreadable body"))),
    };
    let body = if content_type.starts_with("application/json") {
        serde_json::from_slice(&raw).unwrap_or(Value::Null)
    } else {
        Value::Null
    };

    state.requests.lock().unwrap().push(RecordedRequest {
        path: path.clone(),
        content_type: content_type.clone(),
        body: body.clone(),
        raw: raw.clone(),
    });

    if let Some(status) = *state.forced_status.lock().unwrap() {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Ok(reply(status, Bytes::from_static(b"forced failure")));
    }

    let result = route(&state, &path, &content_type, &body, &raw);
    Ok(match result {
        Ok(value) => reply(StatusCode::OK, Bytes::from(value.to_string())),
        Err(status) => reply(status, Bytes::from(status.canonical_reason().unwrap_or("error"))),
    })
}

fn reply(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(body))
        .unwrap()
}

/// Constant-time check of both project headers.
fn authorized<B>(req: &Request<B>) -> bool {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let id_ok: bool = subtle::ConstantTimeEq::ct_eq(header("x-koji-project-id").as_bytes(), PROJECT_ID.as_bytes()).into();
    let token_ok: bool =
        subtle::ConstantTimeEq::ct_eq(header("x-koji-project-token").as_bytes(), PROJECT_TOKEN.as_bytes()).into();
    id_ok && token_ok
}

fn route(state: &MockState, path: &str, content_type: &str, body: &Value, raw: &Bytes) -> Result<Value, StatusCode> {
    match path {
        "/v1/objectStore/upload" => upload(content_type, raw),
        "/v1/objectStore/generateSignedRequest" => {
            let file_name = str_field(body, "fileName")?;
            Ok(json!({
                "url": format!("https://objects.koji.test/{}", file_name),
                "signedRequest": {
                    "url": "https://upload.koji.test",
                    "fields": {"key": file_name, "policy": "mock-policy"}
                }
            }))
        }
        "/v1/objectStore/transcode" => {
            let asset = str_field(body, "path")?;
            Ok(json!({
                "url": format!("https://objects.koji.test/{}.m3u8", asset),
                "callbackTokens": [format!("cb-{}", asset)]
            }))
        }
        "/v1/objectStore/transcode/status" => {
            let token = str_field(body, "callbackToken")?;
            Ok(json!({"isResolved": token.starts_with("cb-")}))
        }
        "/v1/store/transaction" => {
            let operations = body["operations"].as_array().ok_or(StatusCode::BAD_REQUEST)?;
            let mut documents = state.documents.lock().unwrap();
            for op in operations {
                let uri = op["uri"].as_str().ok_or(StatusCode::BAD_REQUEST)?;
                let op_path = uri.find("/v1/").map(|i| &uri[i..]).ok_or(StatusCode::BAD_REQUEST)?;
                mutate(&mut documents, op_path, &op["body"])?;
            }
            Ok(json!({}))
        }
        _ => {
            let mut documents = state.documents.lock().unwrap();
            match path {
                "/v1/store/get" => get(&documents, body),
                "/v1/store/getCollections" => Ok(json!({"collections": documents.keys().collect::<Vec<_>>()})),
                "/v1/store/search" => search(&documents, body),
                "/v1/store/getAll" => get_all(&documents, body),
                "/v1/store/getAllWhere" => get_all_where(&documents, body),
                _ => mutate(&mut documents, path, body).map(|_| json!({})),
            }
        }
    }
}

fn str_field<'a>(body: &'a Value, name: &str) -> Result<&'a str, StatusCode> {
    body[name].as_str().ok_or(StatusCode::BAD_REQUEST)
}

fn with_id(name: &str, doc: &Value) -> Value {
    let mut doc = doc.clone();
    if let Some(obj) = doc.as_object_mut() {
        obj.insert("_id".to_string(), json!(name));
    }
    doc
}

fn collection<'a>(documents: &'a Collections, body: &Value) -> Result<Option<&'a BTreeMap<String, Value>>, StatusCode> {
    Ok(documents.get(str_field(body, "collection")?))
}

fn get(documents: &Collections, body: &Value) -> Result<Value, StatusCode> {
    let docs = collection(documents, body)?;

    if let Some(predicate) = body.get("predicate") {
        let key = str_field(predicate, "key")?;
        let operation = str_field(predicate, "operation")?;
        let matches: Vec<Value> = docs
            .into_iter()
            .flatten()
            .filter(|(_, doc)| compare(&doc[key], operation, &predicate["value"]))
            .map(|(name, doc)| with_id(name, doc))
            .collect();
        return Ok(json!({ "document": matches }));
    }

    let name = str_field(body, "documentName")?;
    docs.and_then(|docs| docs.get(name))
        .map(|doc| json!({ "document": with_id(name, doc) }))
        .ok_or(StatusCode::NOT_FOUND)
}

fn compare(field: &Value, operation: &str, value: &Value) -> bool {
    match (operation, field.as_f64(), value.as_f64()) {
        ("==", _, _) => field == value,
        ("!=", _, _) => field != value,
        (">", Some(a), Some(b)) => a > b,
        (">=", Some(a), Some(b)) => a >= b,
        ("<", Some(a), Some(b)) => a < b,
        ("<=", Some(a), Some(b)) => a <= b,
        ("in", _, _) => value.as_array().is_some_and(|values| values.contains(field)),
        ("array-contains", _, _) => field.as_array().is_some_and(|items| items.contains(value)),
        _ => false,
    }
}

fn search(documents: &Collections, body: &Value) -> Result<Value, StatusCode> {
    let key = str_field(body, "queryKey")?;
    let needle = str_field(body, "queryValue")?.to_lowercase();
    let results: Vec<Value> = collection(documents, body)?
        .into_iter()
        .flatten()
        .filter(|(_, doc)| doc[key].as_str().is_some_and(|s| s.to_lowercase().contains(&needle)))
        .map(|(name, doc)| with_id(name, doc))
        .collect();
    Ok(json!({ "results": results }))
}

fn get_all(documents: &Collections, body: &Value) -> Result<Value, StatusCode> {
    let names = body["documentNames"].as_array().ok_or(StatusCode::BAD_REQUEST)?;
    let docs = collection(documents, body)?;
    let results: Vec<Value> = names
        .iter()
        .filter_map(|name| name.as_str())
        .filter_map(|name| docs.and_then(|d| d.get(name)).map(|doc| with_id(name, doc)))
        .collect();
    Ok(json!({ "results": results }))
}

fn get_all_where(documents: &Collections, body: &Value) -> Result<Value, StatusCode> {
    let key = str_field(body, "predicateKey")?;
    let operation = str_field(body, "predicateOperation")?;
    let values = body["predicateValues"].as_array().ok_or(StatusCode::BAD_REQUEST)?;
    let results: Vec<Value> = collection(documents, body)?
        .into_iter()
        .flatten()
        .filter(|(_, doc)| values.iter().any(|v| compare(&doc[key], if operation == "in" { "==" } else { operation }, v)))
        .map(|(name, doc)| with_id(name, doc))
        .collect();
    Ok(json!({ "results": results }))
}

fn mutate(documents: &mut Collections, path: &str, body: &Value) -> Result<(), StatusCode> {
    let collection = str_field(body, "collection")?.to_string();
    let name = str_field(body, "documentName")?.to_string();
    let docs = documents.entry(collection).or_default();

    match path {
        "/v1/store/set" => {
            docs.insert(name, body["documentBody"].clone());
        }
        "/v1/store/update" => {
            let doc = docs.get_mut(&name).ok_or(StatusCode::NOT_FOUND)?;
            for (field, value) in object(&body["documentBody"])? {
                let current = doc.get(field.as_str()).cloned().unwrap_or(Value::Null);
                let next = if value["__kojiValueType"] == "increment" {
                    json!(current.as_f64().unwrap_or(0.0) + value["value"].as_f64().unwrap_or(0.0))
                } else {
                    value.clone()
                };
                doc[field.as_str()] = next;
            }
        }
        "/v1/store/update/push" | "/v1/store/update/remove" => {
            let doc = docs.get_mut(&name).ok_or(StatusCode::NOT_FOUND)?;
            for (field, value) in object(&body["documentBody"])? {
                let items = value.as_array().cloned().unwrap_or_else(|| vec![value.clone()]);
                if !doc[field.as_str()].is_array() {
                    doc[field.as_str()] = json!([]);
                }
                let array = doc[field.as_str()].as_array_mut().ok_or(StatusCode::BAD_REQUEST)?;
                if path.ends_with("push") {
                    array.extend(items);
                } else {
                    array.retain(|existing| !items.contains(existing));
                }
            }
        }
        "/v1/store/delete" => {
            docs.remove(&name).ok_or(StatusCode::NOT_FOUND)?;
        }
        _ => return Err(StatusCode::NOT_FOUND),
    }
    Ok(())
}

fn object(value: &Value) -> Result<&Map<String, Value>, StatusCode> {
    value.as_object().ok_or(StatusCode::BAD_REQUEST)
}

fn upload(content_type: &str, raw: &Bytes) -> Result<Value, StatusCode> {
    if !content_type.starts_with("multipart/form-data; boundary=") {
        return Err(StatusCode::BAD_REQUEST);
    }
    let text = String::from_utf8_lossy(raw);
    let start = text.find("filename=\"").ok_or(StatusCode::BAD_REQUEST)? + "filename=\"".len();
    let end = text[start..].find('"').ok_or(StatusCode::BAD_REQUEST)? + start;
    Ok(json!({ "url": format!("https://objects.koji.test/{}", &text[start..end]) }))
}

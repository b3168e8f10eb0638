//! テスト用のドキュメントストア
//!
//! - `InMemoryDocumentStore`: 呼び出し履歴と障害注入を持つメモリ実装
//! - `LoopbackDocumentServer`: HTTPクライアントを検証するためのループバックHTTPサーバー

use crate::models::Trip;
use crate::services::document_client::DocumentStore;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::AUTHORIZATION;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// メモリ上のドキュメントストア
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: Mutex<HashMap<String, Trip>>,
    replaced: Mutex<Vec<(String, Trip)>>,
    create_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    failing: AtomicBool,
    hanging: AtomicBool,
}

impl InMemoryDocumentStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 他の端末による更新を模擬してドキュメントを直接書き込む
    pub fn insert(&self, document_id: &str, trip: Trip) {
        self.documents
            .lock()
            .unwrap()
            .insert(document_id.to_string(), trip);
    }

    pub fn document(&self, document_id: &str) -> Option<Trip> {
        self.documents.lock().unwrap().get(document_id).cloned()
    }

    /// 以降の呼び出しを失敗させるかどうかを切り替える
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 以降の要求を応答しないままにするかどうかを切り替える
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn create_count(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn replaced(&self) -> Vec<(String, Trip)> {
        self.replaced.lock().unwrap().clone()
    }

    async fn wait_if_hanging(&self) {
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    fn check_failing(&self) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::external_service("InMemory", "接続失敗"));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create(&self, trip: &Trip) -> AppResult<String> {
        self.wait_if_hanging().await;
        self.check_failing()?;
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("doc-{n}");
        self.insert(&id, trip.clone());
        Ok(id)
    }

    async fn fetch(&self, document_id: &str) -> AppResult<Trip> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_if_hanging().await;
        self.check_failing()?;
        self.document(document_id)
            .ok_or_else(|| AppError::not_found("共有ドキュメント"))
    }

    async fn replace(&self, document_id: &str, trip: &Trip) -> AppResult<()> {
        self.wait_if_hanging().await;
        self.check_failing()?;
        self.replaced
            .lock()
            .unwrap()
            .push((document_id.to_string(), trip.clone()));
        self.insert(document_id, trip.clone());
        Ok(())
    }
}

struct ServerState {
    expected_authorization: String,
    documents: Mutex<HashMap<String, String>>,
    next_id: AtomicUsize,
}

/// ループバックHTTPドキュメントストア
pub struct LoopbackDocumentServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl LoopbackDocumentServer {
    /// 空きポートでサーバーを開始する
    ///
    /// # 引数
    /// * `api_token` - 受け付けるBearerトークン
    pub async fn start(api_token: &str) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("ループバックサーバーの起動に失敗");
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(ServerState {
            expected_authorization: format!("Bearer {api_token}"),
            documents: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
        });

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle_request(req, Arc::clone(&state)));
                    if let Err(err) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        log::error!("HTTP接続処理エラー: {err}");
                    }
                });
            }
        });

        Self { addr, task }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/documents", self.addr)
    }
}

impl Drop for LoopbackDocumentServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn respond(status: StatusCode, body: String) -> Response<String> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<ServerState>,
) -> Result<Response<String>, Infallible> {
    let authorized = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == state.expected_authorization)
        .unwrap_or(false);
    if !authorized {
        return Ok(respond(StatusCode::UNAUTHORIZED, "unauthorized".to_string()));
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let body = match req.into_body().collect().await {
        Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
        Err(_) => return Ok(respond(StatusCode::BAD_REQUEST, String::new())),
    };

    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let mut documents = state.documents.lock().unwrap();

    let response = match (method, segments.as_slice()) {
        (Method::POST, ["documents"]) => {
            let id = format!("doc-{}", state.next_id.fetch_add(1, Ordering::SeqCst));
            documents.insert(id.clone(), body);
            respond(StatusCode::CREATED, serde_json::json!({ "id": id }).to_string())
        }
        (Method::GET, ["documents", id]) => match documents.get(*id) {
            Some(document) => respond(StatusCode::OK, document.clone()),
            None => respond(StatusCode::NOT_FOUND, "not found".to_string()),
        },
        (Method::PUT, ["documents", id]) => {
            if documents.contains_key(*id) {
                documents.insert(id.to_string(), body);
                respond(StatusCode::OK, "{}".to_string())
            } else {
                respond(StatusCode::NOT_FOUND, "not found".to_string())
            }
        }
        _ => respond(StatusCode::NOT_FOUND, "not found".to_string()),
    };

    Ok(response)
}

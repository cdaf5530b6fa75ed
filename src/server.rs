//! HTTP 接口
//!
//! - `POST /api/{preview|organize|history|undo}`：body `{ "folderPath", "sessionId"? }`
//! - `POST /api/sessions`：运行 history 并返回解析后的会话列表（撤销前选择用）
//! - `GET /api/health`
//!
//! 每个请求在独立任务中处理，彼此不共享可变状态；同一路径的并发整理不做串行化。

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Request, State},
    http::{header, HeaderValue, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use crate::core::DispatchError;
use crate::dispatcher::{Dispatcher, OperationKind, OperationRequest, OperationResult, MISSING_PATH_MESSAGE};
use crate::sessions::SessionRecord;

/// 服务状态：只读，按请求共享
pub struct ServerState {
    pub dispatcher: Dispatcher,
}

impl ServerState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

/// 请求体；字段名沿用前端的 camelCase
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    #[serde(default)]
    pub folder_path: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionsResponse {
    success: bool,
    sessions: Vec<SessionRecord>,
    output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// 创建路由
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/sessions", post(api_sessions).fallback(method_not_allowed))
        .route("/api/:endpoint", post(api_operation).fallback(method_not_allowed))
        .fallback(fallback)
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// 解析请求体并取出非空的 folderPath；失败时直接给出 400 响应
fn parse_body(body: &Bytes) -> Result<(String, Option<String>), Response> {
    let req: ApiRequest = serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "JSON parse error");
        error_response(StatusCode::BAD_REQUEST, "Invalid JSON")
    })?;
    let folder_path = req
        .folder_path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, MISSING_PATH_MESSAGE))?;
    // 空字符串视为未选择会话
    let session_id = req.session_id.filter(|s| !s.is_empty());
    Ok((folder_path, session_id))
}

fn invalid_request(err: DispatchError) -> Response {
    error_response(StatusCode::BAD_REQUEST, err.client_message())
}

fn operation_response(result: OperationResult) -> Response {
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(result)).into_response()
}

async fn api_operation(
    State(state): State<Arc<ServerState>>,
    Path(endpoint): Path<String>,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("api", %request_id, endpoint = %endpoint);
    async move {
        let (folder_path, session_id) = match parse_body(&body) {
            Ok(parsed) => parsed,
            Err(resp) => return resp,
        };
        let kind: OperationKind = match endpoint.parse() {
            Ok(kind) => kind,
            Err(_) => return error_response(StatusCode::BAD_REQUEST, "Unknown endpoint"),
        };

        let mut request = OperationRequest::new(kind, folder_path);
        if let Some(session_id) = session_id {
            request = request.with_session(session_id);
        }

        match state.dispatcher.dispatch(&request).await {
            Ok(result) => {
                if !result.success {
                    tracing::error!(
                        error = result.error_message.as_deref().unwrap_or_default(),
                        "API error"
                    );
                }
                operation_response(result)
            }
            Err(e) => invalid_request(e),
        }
    }
    .instrument(span)
    .await
}

async fn api_sessions(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("api", %request_id, endpoint = "sessions");
    async move {
        let (folder_path, _) = match parse_body(&body) {
            Ok(parsed) => parsed,
            Err(resp) => return resp,
        };
        match state.dispatcher.list_sessions(&folder_path).await {
            Ok(listing) => {
                let status = if listing.result.success {
                    StatusCode::OK
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                let body = SessionsResponse {
                    success: listing.result.success,
                    sessions: listing.sessions,
                    output: listing.result.output,
                    error: listing.result.error_message,
                };
                (status, Json(body)).into_response()
            }
            Err(e) => invalid_request(e),
        }
    }
    .instrument(span)
    .await
}

async fn method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// 未匹配的路径：`/api/` 下按接口错误处理（先 405，再校验 body，最后 Unknown endpoint），其余 404
async fn fallback(method: Method, uri: Uri, body: Bytes) -> Response {
    if !uri.path().starts_with("/api/") {
        return (StatusCode::NOT_FOUND, "404 Not Found").into_response();
    }
    if method != Method::POST {
        return method_not_allowed().await;
    }
    if let Err(resp) = parse_body(&body) {
        return resp;
    }
    tracing::warn!(path = uri.path(), "unknown API endpoint");
    error_response(StatusCode::BAD_REQUEST, "Unknown endpoint")
}

/// 宽松 CORS：所有响应带允许头，OPTIONS 预检直接返回 200
async fn cors(req: Request, next: Next) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(req).await
    };
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

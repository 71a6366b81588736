//! リクエスト処理パイプライン
//!
//! マッチング → ボディのバッファ → リクエスト検証 → 下流呼び出し →
//! レスポンス検証 → 監査レコード送出 の順に処理する。
//! どの経路で終わっても監査レコードはちょうど1件送出される。

/// リクエスト単位のコンテキスト
pub mod context;

/// axumミドルウェア
pub mod middleware;

use crate::audit::{build_record, AuditSink, HeaderSanitizer, RequestInfo, ResponseInfo};
use crate::contract::types::OperationContract;
use crate::contract::ContractIndex;
use crate::validation::request::header_text;
use crate::validation::types::{
    ErrorDetail, Observation, METHOD_NOT_FOUND, MIDDLEWARE_ERROR, REQUEST_VALIDATION_FAILED,
    RESPONSE_HANDLER_FAILED, ROUTE_NOT_FOUND, UNSUPPORTED_REQUEST_CONTENT_TYPE,
};
use crate::validation::{request as request_validator, response as response_validator};
use axum::body::Body;
use axum::http::{header, request, HeaderMap, Method, Request};
use axum::response::{IntoResponse, Response};
use context::RequestContext;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub use middleware::firetail_middleware;

/// 検証・監査パイプライン
///
/// Clone可能（内部状態を共有する）。
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

struct Inner {
    index: Arc<ContractIndex>,
    sanitizer: HeaderSanitizer,
    sink: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("index", &self.inner.index)
            .finish()
    }
}

/// 終端の出力（返すレスポンスと、差し替えた場合はその本文）
struct Outcome {
    response: Response,
    replaced_body: Option<String>,
}

impl Outcome {
    fn pass(response: Response) -> Self {
        Self {
            response,
            replaced_body: None,
        }
    }
}

impl Pipeline {
    /// パイプラインを作成する
    pub fn new(
        index: Arc<ContractIndex>,
        sanitizer: HeaderSanitizer,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                index,
                sanitizer,
                sink,
            }),
        }
    }

    /// コントラクトインデックス
    pub fn index(&self) -> &ContractIndex {
        &self.inner.index
    }

    /// 1リクエストを処理する
    ///
    /// `continuation` は下流のハンドラー。検証を通過した場合だけ呼ばれ、
    /// バッファしたボディを先頭から読める状態のリクエストを受け取る。
    pub async fn handle<F, Fut>(&self, request: Request<Body>, continuation: F) -> Response
    where
        F: FnOnce(Request<Body>) -> Fut,
        Fut: Future<Output = Response>,
    {
        let (parts, body) = request.into_parts();
        let mut audit = AuditGuard {
            pipeline: self.clone(),
            context: RequestContext::new(parts.method.as_str()),
            request: RequestInfo::capture(&parts),
            completed: false,
        };

        let outcome = self
            .process(parts, body, &mut audit.context, &audit.request, continuation)
            .await;

        let response_info = ResponseInfo {
            status: outcome.response.status().as_u16(),
            headers: outcome.response.headers().clone(),
            replaced_body: outcome.replaced_body,
        };
        audit.finish(response_info);
        outcome.response
    }

    async fn process<F, Fut>(
        &self,
        parts: request::Parts,
        body: Body,
        context: &mut RequestContext,
        request_info: &RequestInfo,
        continuation: F,
    ) -> Outcome
    where
        F: FnOnce(Request<Body>) -> Fut,
        Fut: Future<Output = Response>,
    {
        // Matching
        let resolution = self.inner.index.resolve(parts.uri.path(), parts.method.as_str());
        context.bind(resolution);

        if context.path_item.is_none() {
            let observation = Observation::new(
                404,
                ROUTE_NOT_FOUND,
                format!("No route available for path {}", request_info.uri),
                Vec::new(),
            );
            return intercept(context, observation);
        }

        if let Some(content_type) =
            unsupported_content_type(&parts.headers, context.operation.as_deref())
        {
            let observation = Observation::new(
                415,
                UNSUPPORTED_REQUEST_CONTENT_TYPE,
                "Unsupported content type",
                vec![
                    ErrorDetail::new(415, format!("Unsupported content type: {content_type}"))
                        .with_content_type(content_type),
                ],
            );
            return intercept(context, observation);
        }

        if context.operation.is_none() {
            let observation = Observation::new(
                405,
                METHOD_NOT_FOUND,
                format!(
                    "Method {} not available for path {}",
                    context.method, request_info.uri
                ),
                Vec::new(),
            );
            return intercept(context, observation);
        }
        trace!(template = %context.matched_template, method = %context.method, "Matched operation");

        // BufferingBody
        let (body, body_text) = if carries_body(&parts.method) {
            match axum::body::to_bytes(body, usize::MAX).await {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    context.request_body = Some(text.clone());
                    (Body::from(bytes), text)
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read request body");
                    return intercept(context, middleware_error(e.to_string()));
                }
            }
        } else {
            (body, String::new())
        };

        // RequestValidating
        let errors = request_validator::validate(&parts, &body_text, context);
        if let Some(status) = errors.first().map(|first| first.status) {
            debug!(
                template = %context.matched_template,
                errors = errors.len(),
                "Request failed contract validation"
            );
            let observation = Observation::new(
                status,
                REQUEST_VALIDATION_FAILED,
                "Failed to validate request",
                errors,
            );
            return intercept(context, observation);
        }

        // Forwarding
        let accept = header_text(&parts.headers, header::ACCEPT.as_str());
        let request = Request::from_parts(parts, body);
        let downstream = async move { continuation(request).await };
        let response = match AssertUnwindSafe(downstream).catch_unwind().await {
            Ok(response) => response,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(error = %message, "Downstream handler panicked");
                return intercept(context, middleware_error(message));
            }
        };

        // ResponseCapturing
        let (response_parts, response_body) = response.into_parts();
        let bytes = match axum::body::to_bytes(response_body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to capture downstream response");
                context.original_status = response_parts.status.as_u16();
                let observation = Observation::new(
                    500,
                    RESPONSE_HANDLER_FAILED,
                    "Response handler threw an error",
                    vec![ErrorDetail::new(500, e.to_string())],
                );
                return intercept(context, observation);
            }
        };
        let response_text = String::from_utf8_lossy(&bytes).into_owned();

        // ResponseValidating
        let observations =
            response_validator::validate(&response_parts, &response_text, accept.as_deref(), context);
        let blocking = observations.iter().find(|o| o.is_blocking()).cloned();
        for observation in observations {
            context.observe(observation);
        }

        match blocking {
            Some(first) => {
                debug!(
                    template = %context.matched_template,
                    kind = %first.kind,
                    "Response failed contract validation"
                );
                context.response_modified = true;
                context.intercepted = true;
                respond_with(first)
            }
            None => Outcome::pass(Response::from_parts(response_parts, Body::from(bytes))),
        }
    }

    fn emit(&self, context: &RequestContext, request: &RequestInfo, response: &ResponseInfo) {
        let record = build_record(context, request, response, &self.inner.sanitizer);
        trace!(
            method = %record.request.method,
            resource = %record.request.resource,
            status = record.response.status_code,
            log_action = %record.log_action,
            "audit record captured"
        );
        self.inner.sink.submit(record);
    }
}

/// 監査レコードを必ず1件送出するためのガード
///
/// `finish` されないまま破棄された場合（リクエストのキャンセル）も送出する。
struct AuditGuard {
    pipeline: Pipeline,
    context: RequestContext,
    request: RequestInfo,
    completed: bool,
}

impl AuditGuard {
    fn finish(mut self, response: ResponseInfo) {
        self.completed = true;
        self.pipeline.emit(&self.context, &self.request, &response);
    }
}

impl Drop for AuditGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        debug!(uri = %self.request.uri, "Request cancelled before completion");
        let response = ResponseInfo {
            status: self.context.original_status,
            headers: HeaderMap::new(),
            replaced_body: None,
        };
        self.pipeline.emit(&self.context, &self.request, &response);
    }
}

/// エラードキュメントで応答し、観測結果として記録する
fn intercept(context: &mut RequestContext, observation: Observation) -> Outcome {
    context.intercepted = true;
    context.observe(observation.clone());
    respond_with(observation)
}

fn respond_with(observation: Observation) -> Outcome {
    let body = observation.to_problem_json();
    Outcome {
        response: observation.into_response(),
        replaced_body: Some(body),
    }
}

fn middleware_error(message: String) -> Observation {
    Observation::new(
        500,
        MIDDLEWARE_ERROR,
        "Failed to handle request",
        vec![ErrorDetail::new(500, message)],
    )
}

fn carries_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// 受け付けないContent-Typeならその値を返す
///
/// `application/json` と、オペレーションのリクエストボディで宣言されたメディアタイプは受け付ける。
fn unsupported_content_type(
    headers: &HeaderMap,
    operation: Option<&OperationContract>,
) -> Option<String> {
    let value = headers.get(header::CONTENT_TYPE)?;
    let content_type = String::from_utf8_lossy(value.as_bytes()).trim().to_string();
    if content_type.is_empty() {
        return None;
    }
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();
    if media_type.eq_ignore_ascii_case("application/json") {
        return None;
    }
    let declared = operation
        .and_then(|op| op.request_body.as_ref())
        .is_some_and(|body| body.media_type(media_type).is_some());
    if declared {
        None
    } else {
        Some(content_type)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "downstream handler panicked".to_string()
    }
}

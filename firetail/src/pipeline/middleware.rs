//! axumミドルウェアとしての組み込み
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/instances", post(create_instance))
//!     .layer(axum::middleware::from_fn_with_state(pipeline, firetail_middleware));
//! ```

use crate::pipeline::Pipeline;
use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};

/// 全リクエストをパイプラインに通すミドルウェア
pub async fn firetail_middleware(
    State(pipeline): State<Pipeline>,
    request: Request<Body>,
    next: Next,
) -> Response {
    pipeline.handle(request, |request| next.run(request)).await
}

//! HTTP 服务
//!
//! - `POST /api/answer-questions`：题目数组 → 结果数组（顺序一致，失败题目单独标记）
//! - `GET /health`：健康检查
//!
//! 每个响应都带 `X-Request-ID`，请求处理过程在同名 tracing span 中。

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, Instrument};

use crate::models::{ProcessingResult, Question};
use crate::orchestrator::BatchOrchestrator;
use crate::services::ReasoningClient;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

struct ApiState<C: ReasoningClient + 'static> {
    orchestrator: Arc<BatchOrchestrator<C>>,
    batch_timeout: Option<Duration>,
}

impl<C: ReasoningClient + 'static> Clone for ApiState<C> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            batch_timeout: self.batch_timeout,
        }
    }
}

/// 构建路由
pub fn router<C: ReasoningClient + 'static>(
    orchestrator: Arc<BatchOrchestrator<C>>,
    batch_timeout: Option<Duration>,
) -> Router {
    let state = ApiState {
        orchestrator,
        batch_timeout,
    };

    Router::new()
        .route("/api/answer-questions", post(answer_questions::<C>))
        .route("/health", get(health))
        .layer(middleware::from_fn(request_id))
        .with_state(state)
}

/// 启动 HTTP 服务，Ctrl-C 时优雅退出
pub async fn serve(router: Router, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 HTTP 服务已启动: http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("收到退出信号，正在关闭服务...");
        })
        .await?;

    Ok(())
}

async fn answer_questions<C: ReasoningClient + 'static>(
    State(state): State<ApiState<C>>,
    Json(questions): Json<Vec<Question>>,
) -> Json<Vec<ProcessingResult>> {
    info!("收到 {} 道题目", questions.len());

    let results = match state.batch_timeout {
        Some(deadline) => {
            state
                .orchestrator
                .process_with_deadline(questions, deadline)
                .await
        }
        None => state.orchestrator.process(questions).await,
    };

    Json(results)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "ready": true,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn request_id(request: Request, next: Next) -> Response {
    let id = uuid::Uuid::new_v4().to_string();
    let span = info_span!("request", request_id = %id);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    async move {
        info!("{} {}", method, path);
        let mut response = next.run(request).await;
        info!("{} {} - Status: {}", method, path, response.status());

        if let Ok(value) = HeaderValue::from_str(&id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}

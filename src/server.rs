//! Webhook HTTP server.

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header::CONTENT_TYPE};
use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;
use teloxide::types::Update;
use tokio::net::TcpListener;

use crate::bots::TelegramBot;

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Telegram Bots</title></head>
<body>
<h1>Telegram Bots</h1>
<p>Echo bot and gplinks.co bypasser are served from this host.</p>
</body>
</html>
"#;

/// Index and keep-alive routes plus one webhook route per bot.
pub fn router(bots: &[Arc<dyn TelegramBot>]) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/keep-alive", get(keep_alive));

    bots.iter()
        .fold(router, |router, bot| bot.clone().register_route(router))
}

/// Mount `POST <bot route>` delivering updates to `bot`.
pub fn webhook_route(router: Router, bot: Arc<dyn TelegramBot>) -> Router {
    let route = bot.route();
    router.route(route, post(receive_update).with_state(bot))
}

pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Answer pings that keep the host awake.
async fn keep_alive() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Accept the update and handle it on its own task.
async fn receive_update(
    State(bot): State<Arc<dyn TelegramBot>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if !is_json(&headers) {
        log::warn!(target: bot.log_target(), "rejected webhook call without json content type");
        return StatusCode::FORBIDDEN;
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(err) => {
            log::warn!(target: bot.log_target(), "undecodable update: {err}");
            return StatusCode::BAD_REQUEST;
        }
    };

    tokio::spawn(async move {
        bot.handle_update(update).await;
    });
    StatusCode::NO_CONTENT
}

/// `application/json`, parameters such as `charset` allowed.
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

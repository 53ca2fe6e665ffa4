//! Embedded browser assets.

use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

const CHALLENGE_JS: &[u8] = include_bytes!("../../assets/challenge.js");
const POW_WORKER_JS: &[u8] = include_bytes!("../../assets/pow.worker.js");
const STYLE_CSS: &[u8] = include_bytes!("../../assets/style.css");

/// Serve an embedded asset. Content is immutable per build, so clients may
/// cache aggressively.
pub async fn serve(Path(path): Path<String>) -> Response {
    let (body, content_type): (&'static [u8], &'static str) = match path.as_str() {
        "challenge.js" => (CHALLENGE_JS, "application/javascript"),
        "pow.worker.js" => (POW_WORKER_JS, "application/javascript"),
        "style.css" => (STYLE_CSS, "text/css"),
        _ => return (StatusCode::NOT_FOUND, "Not found").into_response(),
    };

    (
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CACHE_CONTROL,
                "public, max-age=31536000, immutable",
            ),
            (header::VARY, "Accept-Encoding"),
        ],
        body,
    )
        .into_response()
}

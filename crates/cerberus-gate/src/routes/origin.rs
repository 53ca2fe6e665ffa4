//! Stand-in for the protected origin.
//!
//! In a deployment the host proxies screened requests upstream; this handler
//! takes that place so the gate can be run and exercised on its own.

use axum::response::Html;

pub async fn serve() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>Origin</title></head>
<body>
    <h1>Request passed</h1>
    <p>This response came from the protected origin.</p>
</body>
</html>"#,
    )
}

use axum::{extract::Request, middleware::Next, response::Response};
use metrics::{counter, histogram};
use std::time::Instant;
use uuid::Uuid;

/// Collapse path segments that parse as UUIDs so route ids do not explode
/// label cardinality (`/invoices/3f2a.../details/9c1b...` becomes
/// `/invoices/:id/details/:id`).
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if Uuid::parse_str(segment).is_ok() {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status().as_u16().to_string();

    let labels = [("method", method), ("path", path), ("status", status)];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::normalize_path;

    #[test]
    fn uuid_segments_are_collapsed() {
        let path = "/invoices/0d4bd739-02f9-4b98-8a9c-8a21e21f1ed5/details/5f9c2b61-8f3e-4e0a-b58c-f9f2ac94f39a";
        assert_eq!(normalize_path(path), "/invoices/:id/details/:id");
    }

    #[test]
    fn plain_paths_are_untouched() {
        assert_eq!(normalize_path("/invoices"), "/invoices");
        assert_eq!(normalize_path("/health"), "/health");
    }
}

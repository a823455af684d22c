//! Request/response logging middleware.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{Span, debug_span, info};

/// Span for one request under the trace layer.
///
/// Records the path only: the query string may carry a credential.
pub fn http_span<B>(request: &Request<B>) -> Span {
    debug_span!("http", method = %request.method(), path = %request.uri().path())
}

/// Logs request method, path, status, and duration.
pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "HTTP request"
    );

    response
}

#[cfg(test)]
mod tests {
    use std::fmt::Debug;
    use std::sync::{Arc, Mutex};

    use tracing::Subscriber;
    use tracing::field::{Field, Visit};
    use tracing::span::{Attributes, Id};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    use super::*;

    /// Collects the fields of every new span.
    #[derive(Clone, Default)]
    struct SpanFields(Arc<Mutex<Vec<String>>>);

    impl Visit for SpanFields {
        fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
            self.0
                .lock()
                .unwrap()
                .push(format!("{}={:?}", field.name(), value));
        }
    }

    impl<S: Subscriber> Layer<S> for SpanFields {
        fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
            attrs.record(&mut self.clone());
        }
    }

    #[test]
    fn test_http_span_leaves_out_query_string() {
        let fields = SpanFields::default();
        let subscriber = tracing_subscriber::registry().with(fields.clone());

        tracing::subscriber::with_default(subscriber, || {
            let request = axum::http::Request::get("/ws?token=a.b.c&instance=web")
                .body(())
                .unwrap();
            let _span = http_span(&request);
        });

        let recorded = fields.0.lock().unwrap().join(" ");
        assert!(recorded.contains("method=GET"), "{recorded}");
        assert!(recorded.contains("path=/ws"), "{recorded}");
        assert!(!recorded.contains("token"), "{recorded}");
    }
}

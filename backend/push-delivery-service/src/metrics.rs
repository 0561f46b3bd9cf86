use std::rc::Rc;
use std::time::{Duration, Instant};

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpResponse};
use futures::future::{ready, LocalBoxFuture, Ready};
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, TextEncoder,
};

use crate::models::DeliveryOutcome;

const UNMATCHED_ROUTE: &str = "unmatched";

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "push_delivery_http_requests_total",
            "Total HTTP requests handled by push-delivery-service",
        ),
        &["method", "path", "status"],
    )
    .expect("failed to create push_delivery_http_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register push_delivery_http_requests_total");
    counter
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "push_delivery_http_request_duration_seconds",
            "HTTP request latency for push-delivery-service",
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "path", "status"],
    )
    .expect("failed to create push_delivery_http_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register push_delivery_http_request_duration_seconds");
    histogram
});

static DELIVERY_OUTCOMES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "push_delivery_outcomes_total",
            "Per-recipient delivery outcomes by channel and status",
        ),
        &["channel", "status"],
    )
    .expect("failed to create push_delivery_outcomes_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register push_delivery_outcomes_total");
    counter
});

static DISPATCH_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            "push_dispatch_duration_seconds",
            "Wall time to fan a notification out to all recipients",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .expect("failed to create push_dispatch_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register push_dispatch_duration_seconds");
    histogram
});

pub fn observe_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    let status_label = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status_label])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path, &status_label])
        .observe(elapsed.as_secs_f64());
}

pub fn observe_dispatch(outcomes: &[DeliveryOutcome], elapsed: Duration) {
    for outcome in outcomes {
        DELIVERY_OUTCOMES_TOTAL
            .with_label_values(&[outcome.channel.as_str(), outcome.status.as_str()])
            .inc();
    }
    DISPATCH_DURATION_SECONDS.observe(elapsed.as_secs_f64());
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

/// Records request count and latency per route pattern.
pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RouteMetrics<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RouteMetrics {
            inner: Rc::new(service),
        }))
    }
}

pub struct RouteMetrics<S> {
    inner: Rc<S>,
}

/// Route template such as `/functions/v1/send-push`, never the raw path.
fn route_label<B>(response: &ServiceResponse<B>) -> String {
    response
        .request()
        .match_pattern()
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string())
}

impl<S, B> Service<ServiceRequest> for RouteMetrics<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(inner);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let inner = Rc::clone(&self.inner);
        let method = req.method().as_str().to_owned();
        let started = Instant::now();

        Box::pin(async move {
            let result = inner.call(req).await;
            let (route, status) = match &result {
                Ok(response) => (route_label(response), response.status().as_u16()),
                Err(_) => (UNMATCHED_ROUTE.to_string(), 500),
            };
            observe_http_request(&method, &route, status, started.elapsed());
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeliveryChannel, DeliveryStatus};
    use uuid::Uuid;

    #[actix_web::test]
    async fn test_middleware_labels_by_route_pattern() {
        use actix_web::{test, web, App};

        let requests = |route: &str| {
            HTTP_REQUESTS_TOTAL
                .with_label_values(&["GET", route, "200"])
                .get()
        };
        let before = requests("/squads/{id}");

        let app = test::init_service(
            App::new()
                .wrap(MetricsMiddleware)
                .route("/squads/{id}", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;
        for id in ["1", "2"] {
            let req = test::TestRequest::get()
                .uri(&format!("/squads/{}", id))
                .to_request();
            test::call_service(&app, req).await;
        }

        assert!(requests("/squads/{id}") >= before + 2);
        assert_eq!(requests("/squads/1"), 0);
    }

    #[test]
    fn test_observe_dispatch_counts_outcomes() {
        let before = DELIVERY_OUTCOMES_TOTAL
            .with_label_values(&["native", "gone"])
            .get();
        let outcome = DeliveryOutcome::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            DeliveryChannel::Native,
            DeliveryStatus::Gone,
            Some(404),
            None,
        );

        observe_dispatch(&[outcome.clone(), outcome], Duration::from_millis(12));

        let after = DELIVERY_OUTCOMES_TOTAL
            .with_label_values(&["native", "gone"])
            .get();
        assert!(after >= before + 2);
    }
}

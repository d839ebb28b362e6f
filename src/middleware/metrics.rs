//! Per-endpoint request metrics, recorded into [`AppState`].
//!
//! WebSocket upgrades get their own `WS` label and are counted once, at
//! upgrade time; the frames that follow bypass the HTTP middleware
//! entirely, so their latency never shows up here.

use crate::state::AppState;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};

pub struct MetricsMiddleware;

/// Label under which a request is aggregated, e.g. `GET /health` or
/// `WS /ws/chat`.
fn endpoint_label(req: &ServiceRequest) -> String {
    let is_upgrade = req
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if is_upgrade {
        format!("WS {}", req.uri().path())
    } else {
        format!("{} {}", req.method(), req.uri().path())
    }
}

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService { service }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let endpoint = endpoint_label(&req);

        if let Some(app_state) = req.app_data::<web::Data<AppState>>() {
            app_state.increment_request_count();
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;

            // For a WS endpoint this covers the handshake only; the
            // connection lives on past the 101 response.
            let duration_ms = start_time.elapsed().as_millis() as u64;

            let is_error = match &result {
                Ok(response) => {
                    response.status().is_client_error() || response.status().is_server_error()
                }
                Err(_) => true,
            };

            if let Ok(response) = &result {
                if let Some(app_state) = response.request().app_data::<web::Data<AppState>>() {
                    app_state.record_endpoint_request(&endpoint, duration_ms, is_error);

                    if is_error {
                        app_state.increment_error_count();
                    }
                }
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{test, App, HttpResponse};

    #[actix_web::test]
    async fn test_requests_recorded_per_endpoint() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .wrap(MetricsMiddleware)
                .route("/ping", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
        assert!(resp.status().is_success());

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 1);
        assert_eq!(snapshot.error_count, 0);
        let metric = snapshot.endpoint_metrics.get("GET /ping").unwrap();
        assert_eq!(metric.request_count, 1);
    }

    #[actix_web::test]
    async fn test_upgrade_requests_get_ws_label() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .wrap(MetricsMiddleware)
                .route("/ws/echo", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/ws/echo")
            .insert_header((header::UPGRADE, "websocket"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let snapshot = state.get_metrics_snapshot();
        assert!(snapshot.endpoint_metrics.contains_key("WS /ws/echo"));
        assert!(!snapshot.endpoint_metrics.contains_key("GET /ws/echo"));
    }
}

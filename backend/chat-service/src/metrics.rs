use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, TextEncoder};

pub static LIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "chat_service_live_connections",
        "Realtime connections currently active",
    )
    .expect("failed to create chat_service_live_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register chat_service_live_connections");
    gauge
});

pub static CONNECT_ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_service_connect_attempts_total",
            "Realtime connection attempts by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create chat_service_connect_attempts_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_service_connect_attempts_total");
    counter
});

pub static EVENTS_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_service_events_published_total",
            "Events handed to the broadcaster",
        ),
        &["event_type"],
    )
    .expect("failed to create chat_service_events_published_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_service_events_published_total");
    counter
});

pub static EVENT_DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_service_event_deliveries_total",
            "Frames queued onto live connections",
        ),
        &["event_type"],
    )
    .expect("failed to create chat_service_event_deliveries_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_service_event_deliveries_total");
    counter
});

pub static MEMBERSHIP_MUTATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_service_membership_mutations_total",
            "Committed friendship and group membership changes",
        ),
        &["mutation"],
    )
    .expect("failed to create chat_service_membership_mutations_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_service_membership_mutations_total");
    counter
});

pub async fn metrics_handler() -> HttpResponse {
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

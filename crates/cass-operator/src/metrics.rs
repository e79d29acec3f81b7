use std::sync::LazyLock;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, TextEncoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::Result;
use crate::reconcile::Verdict;

static RECONCILIATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "cass_operator_reconciliations_total",
            "Total number of datacenter reconciliations by verdict",
        ),
        &["result"],
    )
    .expect("metric can be created");
    prometheus::register(Box::new(counter.clone())).expect("metric can be registered");
    counter
});

static RECONCILE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    let hist = Histogram::with_opts(HistogramOpts::new(
        "cass_operator_reconciliation_duration_seconds",
        "Duration of datacenter reconciliation in seconds",
    ))
    .expect("metric can be created");
    prometheus::register(Box::new(hist.clone())).expect("metric can be registered");
    hist
});

static NODE_REPLACEMENTS: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        "cass_operator_node_replacements",
        "Members recreated by the node-replacement workflow in the last pass",
    )
    .expect("metric can be created");
    prometheus::register(Box::new(gauge.clone())).expect("metric can be registered");
    gauge
});

fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Done => "done",
        Verdict::RequeueNow => "requeue",
        Verdict::RequeueAfterError => "error",
    }
}

/// Record a completed reconciliation and how long it took.
pub fn record_reconciliation(verdict: Verdict, duration_secs: f64) {
    RECONCILIATIONS
        .with_label_values(&[verdict_label(verdict)])
        .inc();
    RECONCILE_DURATION.observe(duration_secs);
}

pub fn set_node_replacements(count: usize) {
    NODE_REPLACEMENTS.set(count as i64);
}

fn encode_metrics() -> std::result::Result<Vec<u8>, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {e}"))?;
    Ok(buffer)
}

/// Map a request path to status, content type and body.
fn route(path: &str) -> (&'static str, &'static str, Vec<u8>) {
    match path {
        "/metrics" => match encode_metrics() {
            Ok(data) => ("200 OK", "text/plain; version=0.0.4; charset=utf-8", data),
            Err(e) => ("500 Internal Server Error", "text/plain", e.into_bytes()),
        },
        "/healthz" | "/readyz" => ("200 OK", "text/plain", b"ok".to_vec()),
        _ => ("404 Not Found", "text/plain", b"not found".to_vec()),
    }
}

/// Serve `/metrics`, `/healthz` and `/readyz` until the process exits.
pub async fn serve(addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Metrics server listening");

    loop {
        match listener.accept().await {
            Ok((mut stream, _)) => {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = match stream.read(&mut buf).await {
                        Ok(n) => n,
                        Err(_) => return,
                    };
                    let request = String::from_utf8_lossy(&buf[..n]);
                    let path = request
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/");

                    let (status, content_type, body) = route(path);
                    let header = format!(
                        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );

                    let _ = stream.write_all(header.as_bytes()).await;
                    let _ = stream.write_all(&body).await;
                });
            }
            Err(e) => {
                error!("Failed to accept metrics connection: {e}");
            }
        }
    }
}

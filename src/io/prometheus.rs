//! Prometheus metrics HTTP endpoint
//!
//! Exposes capture metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with session label
fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, session: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{session=\"{session}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    session: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{session=\"{session}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{session=\"{session}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum{{session=\"{session}\"}} {}", avg * count);
    let _ = writeln!(output, "{name}_count{{session=\"{session}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(summary: &MetricsSummary, session: &str) -> String {
    let mut output = String::with_capacity(4096);

    write_metric(&mut output, "capture_ticks_total", "Gate evaluations", MetricType::Counter, session, summary.ticks_total);
    write_metric(
        &mut output,
        "capture_fired_total",
        "Gate evaluations that produced captures",
        MetricType::Counter,
        session,
        summary.captures_total,
    );
    let _ = writeln!(output, "# HELP capture_images_total Images written per role");
    let _ = writeln!(output, "# TYPE capture_images_total counter");
    let _ = writeln!(output, "capture_images_total{{session=\"{session}\",role=\"aerial\"}} {}", summary.aerial_images);
    let _ = writeln!(output, "capture_images_total{{session=\"{session}\",role=\"ground\"}} {}", summary.ground_images);
    write_metric(
        &mut output,
        "capture_image_bytes_total",
        "Image bytes written",
        MetricType::Counter,
        session,
        summary.image_bytes_total,
    );
    write_histogram(
        &mut output,
        "capture_latency_us",
        "Time from gate firing to last frame written, microseconds",
        session,
        &summary.capture_latency_buckets,
        summary.capture_latency_avg_us,
    );
    write_metric(
        &mut output,
        "capture_latency_p99_us",
        "99th percentile capture latency",
        MetricType::Gauge,
        session,
        summary.capture_latency_p99_us,
    );
    write_metric(
        &mut output,
        "trajectory_samples_total",
        "Trajectory rows written",
        MetricType::Counter,
        session,
        summary.samples_total,
    );
    write_metric(
        &mut output,
        "agent_paths_completed_total",
        "Agent path commands completed",
        MetricType::Counter,
        session,
        summary.paths_completed_total,
    );
    write_metric(
        &mut output,
        "agent_path_faults_total",
        "Agent path commands that faulted",
        MetricType::Counter,
        session,
        summary.path_faults_total,
    );

    output
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    session: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics.report(), &session);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    session: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let session = Arc::new(session);

    info!(port = %port, session = %session, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let session = session.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let session = session.clone();
                                async move { handle_request(req, metrics, session).await }
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::AgentRole;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_capture(1_500);
        metrics.record_tick_skipped();
        metrics.record_image_written(AgentRole::Aerial, 100);
        metrics.record_image_written(AgentRole::Ground, 200);

        let output = format_prometheus_metrics(&metrics.report(), "0190abcd");

        assert!(output.contains("capture_ticks_total{session=\"0190abcd\"} 2"));
        assert!(output.contains("capture_fired_total{session=\"0190abcd\"} 1"));
        assert!(output.contains("capture_images_total{session=\"0190abcd\",role=\"ground\"} 1"));
        assert!(output.contains("capture_latency_us_bucket{session=\"0190abcd\",le=\"2000\"} 1"));
        assert!(output.contains("capture_latency_us_count{session=\"0190abcd\"} 1"));
    }
}

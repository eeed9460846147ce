//! Metrics module
//!
//! Prometheus metrics for brokered upload operations, exposed in the text
//! format on `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, CounterVec, Encoder,
    Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // Orchestrator metrics
    pub static ref OPERATIONS_TOTAL: CounterVec = register_counter_vec!(
        "uploadr_operations_total",
        "Total upload operations brokered",
        &["operation", "status"]
    ).unwrap();

    pub static ref OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "uploadr_operation_duration_seconds",
        "Upload operation duration in seconds, backend round trips included",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    // Multipart metrics
    pub static ref LIST_PAGES: Histogram = register_histogram!(
        "uploadr_list_parts_pages",
        "Number of ListParts pages fetched per listing",
        vec![1.0, 2.0, 5.0, 10.0, 50.0, 100.0]
    ).unwrap();

    pub static ref COMPLETED_PARTS: Histogram = register_histogram!(
        "uploadr_completed_parts",
        "Number of parts per completed multipart upload",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 10000.0]
    ).unwrap();

    // HTTP metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "uploadr_http_requests_total",
        "HTTP requests by method and response status",
        &["method", "status"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "uploadr_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record an orchestrator operation outcome and its duration
pub fn record_operation(operation: &str, status: &str, duration_secs: f64) {
    OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
    OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Record how many pages one part listing needed
pub fn record_list_pages(pages: usize) {
    LIST_PAGES.observe(pages as f64);
}

/// Record the part count of a completed upload
pub fn record_completed_parts(parts_count: usize) {
    COMPLETED_PARTS.observe(parts_count as f64);
}

/// Record an HTTP response
pub fn record_http_request(method: &str, status: u16) {
    let status = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, status.as_str()])
        .inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_operation() {
        record_operation("sign_part", "success", 0.002);
        assert!(
            OPERATIONS_TOTAL
                .with_label_values(&["sign_part", "success"])
                .get()
                >= 1.0
        );
    }

    #[test]
    fn test_gather_text_contains_metrics() {
        record_http_request("GET", 200);
        record_completed_parts(3);
        let text = gather_text().unwrap();
        assert!(text.contains("uploadr_http_requests_total"));
        assert!(text.contains("uploadr_completed_parts"));
    }
}

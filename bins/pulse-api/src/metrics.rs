// Prometheus metrics for executions served by the API
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec, TextEncoder,
};
use pulse_common::types::ExecutionReport;

lazy_static! {
    pub static ref EXECUTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "codepulse_executions_total",
        "Executions by language and terminal status",
        &["language", "status"]
    )
    .unwrap();
    pub static ref EXECUTION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "codepulse_execution_duration_seconds",
        "Wall time of an execution including image build and teardown",
        &["language"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .unwrap();
    pub static ref REJECTED_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "codepulse_rejected_requests_total",
        "Requests refused before reaching the sandbox",
        &["reason"]
    )
    .unwrap();
}

pub fn record(report: &ExecutionReport) {
    EXECUTIONS_TOTAL
        .with_label_values(&[report.language.as_str(), report.status.as_str()])
        .inc();
    EXECUTION_DURATION_SECONDS
        .with_label_values(&[report.language.as_str()])
        .observe(report.duration_ms as f64 / 1000.0);
}

/// Default registry in the text exposition format
pub fn render() -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulse_common::types::{ExecutionStatus, Mode};
    use uuid::Uuid;

    #[test]
    fn test_record_shows_up_in_rendered_output() {
        let report = ExecutionReport {
            id: Uuid::new_v4(),
            language: "python".to_string(),
            mode: Mode::Run,
            status: ExecutionStatus::Timeout,
            results: Vec::new(),
            error: None,
            duration_ms: 1500,
            finished_at: Utc::now(),
        };

        record(&report);
        let text = render().unwrap();

        assert!(text.contains("codepulse_executions_total{language=\"python\",status=\"timeout\"}"));
        assert!(text.contains("codepulse_execution_duration_seconds_bucket"));
    }
}

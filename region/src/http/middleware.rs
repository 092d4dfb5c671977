use axum::http::StatusCode;

/// Failure handling for the trace layer. 503 responses are logged at `INFO`
/// instead of `ERROR`.
#[derive(Clone, Copy)]
pub(crate) struct LevelAdjustingOnFailure;

impl tower_http::trace::OnFailure<tower_http::classify::ServerErrorsFailureClass>
    for LevelAdjustingOnFailure
{
    fn on_failure(
        &mut self,
        failure_classification: tower_http::classify::ServerErrorsFailureClass,
        latency: core::time::Duration,
        span: &tracing::Span,
    ) {
        use tower_http::classify::ServerErrorsFailureClass as S;

        match failure_classification {
            S::StatusCode(StatusCode::SERVICE_UNAVAILABLE) => {
                tracing::info!(classification = %S::StatusCode(StatusCode::SERVICE_UNAVAILABLE), latency = %format!("{} ms", latency.as_millis()), "response failed (downgraded)");
            }
            value => {
                tower_http::trace::DefaultOnFailure::default().on_failure(value, latency, span);
            }
        }
    }
}

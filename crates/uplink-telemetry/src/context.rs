//! Span helpers for upload jobs.

use tracing::Span;

use crate::init::instance_name;

/// Root span for one upload job; every log line emitted by the job carries
/// the job identifier, its display name and the uploader instance.
#[must_use]
pub fn job_span(job_id: &str, name: &str) -> Span {
    tracing::info_span!(
        "upload_job",
        job_id = %job_id,
        name = %name,
        instance = %instance_name(),
        identity = tracing::field::Empty
    )
}

/// Record the identity a file is being sent with on the current span.
pub fn record_identity(span: &Span, identity: &str) {
    span.record("identity", tracing::field::display(identity));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_span_can_be_entered_without_subscriber() {
        let span = job_span("job-1", "Movie.2024");
        let _entered = span.enter();
        record_identity(&span, "standard");
    }
}

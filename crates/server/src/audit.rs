use signoff_core::audit::{AuditEvent, AuditSink};
use tracing::info;

/// Forwards audit events to the structured log stream. The process keeps no
/// audit history of its own; retention belongs to the log pipeline.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = "audit.event",
            correlation_id = %event.correlation_id,
            event_id = %event.event_id,
            event_type = %event.event_type,
            category = ?event.category,
            request_id = event.request_id.as_ref().map(|id| id.0.as_str()),
            team_id = event.team_id.as_ref().map(|id| id.0.as_str()),
            actor = %event.actor,
            outcome = ?event.outcome,
            metadata = ?event.metadata,
            occurred_at = %event.occurred_at,
        );
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use signoff_core::audit::{
        AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink,
    };
    use tracing_subscriber::fmt::MakeWriter;

    use super::TracingAuditSink;

    #[derive(Clone, Default)]
    struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("buffer lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn audit_events_land_on_the_log_stream() {
        let buffer = CaptureWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            TracingAuditSink.emit(
                AuditEvent::new(
                    &AuditContext::new(None, None, "corr-9", "system"),
                    "lifecycle.request_created",
                    AuditCategory::Lifecycle,
                    AuditOutcome::Success,
                )
                .with_metadata("approver_count", "2"),
            );
        });

        let rendered = String::from_utf8(buffer.0.lock().expect("buffer lock").clone())
            .expect("utf8 log output");
        assert!(rendered.contains("lifecycle.request_created"));
        assert!(rendered.contains("corr-9"));
        assert!(rendered.contains("approver_count"));
    }
}

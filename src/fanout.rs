//! Best-effort delivery of one notice to every operator.

use std::path::PathBuf;
use std::time::Duration;

use crate::channels::traits::{OutboundMessage, Transport};

/// Slowest upload rate a document send is expected to sustain.
const UPLOAD_BYTES_PER_SEC: u64 = 256 * 1024;

/// Per-recipient timeout for uploading a `size_bytes` document: `floor` plus
/// one second per 256 KiB.
pub fn upload_timeout(floor: Duration, size_bytes: u64) -> Duration {
    floor.saturating_add(Duration::from_secs(size_bytes.div_ceil(UPLOAD_BYTES_PER_SEC)))
}

/// What gets broadcast.
#[derive(Debug, Clone)]
pub enum Notice {
    Text(OutboundMessage),
    Document { path: PathBuf, caption: Option<String> },
}

/// Deliver `notice` to each recipient in turn. A failed or timed-out delivery
/// is logged and skipped. Returns the number of successful deliveries.
pub async fn broadcast(
    transport: &dyn Transport,
    recipients: &[i64],
    notice: &Notice,
    per_recipient_timeout: Duration,
) -> usize {
    let mut delivered = 0;
    for &recipient in recipients {
        let attempt = async {
            match notice {
                Notice::Text(message) => transport.send_message(recipient, message.clone()).await,
                Notice::Document { path, caption } => {
                    transport
                        .send_document(recipient, path, caption.as_deref())
                        .await
                }
            }
        };
        match tokio::time::timeout(per_recipient_timeout, attempt).await {
            Ok(Ok(())) => delivered += 1,
            Ok(Err(err)) => {
                tracing::warn!(recipient, error = %err, "broadcast delivery failed");
            }
            Err(_) => {
                tracing::warn!(
                    recipient,
                    timeout_ms = per_recipient_timeout.as_millis() as u64,
                    "broadcast delivery timed out"
                );
            }
        }
    }
    tracing::debug!(delivered, total = recipients.len(), "broadcast finished");
    delivered
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::test_utils::{FakeTransport, Sent};

    #[tokio::test]
    async fn one_failing_recipient_does_not_stop_the_rest() {
        let transport = FakeTransport::new();
        transport.fail_for(2);
        let notice = Notice::Text(OutboundMessage::text("hello"));

        let delivered = broadcast(&transport, &[1, 2, 3], &notice, Duration::from_secs(1)).await;

        assert_eq!(delivered, 2);
        let recipients: Vec<i64> = transport.sent().iter().map(Sent::chat_id).collect();
        assert_eq!(recipients, vec![1, 3]);
    }

    #[tokio::test]
    async fn slow_recipient_times_out() {
        let transport = FakeTransport::new();
        transport.stall_for(1);
        let notice = Notice::Document {
            path: PathBuf::from("/tmp/a.zip"),
            caption: None,
        };

        let delivered =
            broadcast(&transport, &[1, 2], &notice, Duration::from_millis(50)).await;

        assert_eq!(delivered, 1);
        assert_eq!(transport.sent().len(), 1);
        assert!(matches!(transport.sent()[0], Sent::Document { chat_id: 2, .. }));
    }

    #[test]
    fn upload_timeout_grows_with_size() {
        let floor = Duration::from_secs(60);
        assert_eq!(upload_timeout(floor, 0), floor);
        assert_eq!(upload_timeout(floor, 1), Duration::from_secs(61));
        assert_eq!(
            upload_timeout(floor, 45 * 1024 * 1024),
            Duration::from_secs(60 + 180)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_upload_within_its_timeout_is_delivered() {
        let transport = FakeTransport::new();
        transport.delay_documents(Duration::from_secs(30));
        let notice = Notice::Document {
            path: PathBuf::from("/tmp/a.zip"),
            caption: None,
        };
        let text_timeout = Duration::from_secs(10);

        let timeout = upload_timeout(text_timeout, 45 * 1024 * 1024);
        let delivered = broadcast(&transport, &[1, 2], &notice, timeout).await;
        assert_eq!(delivered, 2);

        transport.clear();
        let cut_short = broadcast(&transport, &[1], &notice, text_timeout).await;
        assert_eq!(cut_short, 0);
    }

    #[tokio::test]
    async fn no_recipients_delivers_nothing() {
        let transport = FakeTransport::new();
        let notice = Notice::Text(OutboundMessage::text("x"));
        assert_eq!(broadcast(&transport, &[], &notice, Duration::from_secs(1)).await, 0);
    }
}

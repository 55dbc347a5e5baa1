use super::message_types::LineFormatter;
use super::{Member, Registry, UserId};
use crate::error::AppError;
use crypto_core::pass_through;
use tokio::sync::mpsc::error::TrySendError;

/// Outcome of one fan-out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub skipped: usize,
}

/// Fans lines out to every live session except the originator
///
/// Delivery only enqueues onto each recipient's outbound queue; the
/// recipient's writer task does the I/O, so a slow peer never stalls the
/// sender's read loop. A recipient whose queue is full is skipped for that
/// line.
#[derive(Clone)]
pub struct BroadcastRouter {
    registry: Registry,
    formatter: LineFormatter,
}

impl BroadcastRouter {
    pub fn new(registry: Registry, formatter: LineFormatter) -> Self {
        Self {
            registry,
            formatter,
        }
    }

    pub fn formatter(&self) -> LineFormatter {
        self.formatter
    }

    /// Deliver a chat message from `sender` to everyone else.
    ///
    /// Each recipient's copy goes through that recipient's own key pair
    /// (encrypt, then decrypt) before being formatted. A recipient whose
    /// transform or enqueue fails is logged and skipped.
    pub async fn deliver(&self, sender: UserId, sender_name: &str, message: &str) -> DeliveryReport {
        let recipients: Vec<Member> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter(|m| m.user.id != sender)
            .collect();

        if recipients.is_empty() {
            return DeliveryReport::default();
        }

        let total = recipients.len();
        let plaintext = message.to_string();
        // RSA private-key operations are CPU-bound
        let transformed = tokio::task::spawn_blocking(move || {
            recipients
                .into_iter()
                .map(|member| {
                    let result = pass_through(&member.user.keys, &plaintext).map_err(AppError::from);
                    (member, result)
                })
                .collect::<Vec<_>>()
        })
        .await;

        let transformed = match transformed {
            Ok(transformed) => transformed,
            Err(e) => {
                tracing::error!(sender = %sender, error = %e, "fan-out transform task failed");
                return DeliveryReport {
                    delivered: 0,
                    skipped: total,
                };
            }
        };

        let mut report = DeliveryReport::default();
        for (member, result) in transformed {
            let outcome = result.and_then(|plain| {
                Self::enqueue(&member, self.formatter.chat(sender_name, &plain))
            });
            Self::record(&mut report, &member, outcome);
        }

        tracing::debug!(
            sender = %sender,
            delivered = report.delivered,
            skipped = report.skipped,
            "message fan-out complete"
        );
        report
    }

    /// Send a notice line as-is to every session except `except`
    pub async fn announce(&self, except: Option<UserId>, line: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for member in self.registry.snapshot().await {
            if Some(member.user.id) == except {
                continue;
            }
            let outcome = Self::enqueue(&member, line.to_string());
            Self::record(&mut report, &member, outcome);
        }
        report
    }

    fn enqueue(member: &Member, line: String) -> Result<(), AppError> {
        member.outbound.try_send(line).map_err(|e| match e {
            TrySendError::Full(_) => AppError::TransportWrite(format!(
                "outbound queue of user {} is full",
                member.user.id
            )),
            TrySendError::Closed(_) => AppError::TransportWrite(format!(
                "outbound queue of user {} is closed",
                member.user.id
            )),
        })
    }

    fn record(report: &mut DeliveryReport, member: &Member, outcome: Result<(), AppError>) {
        match outcome {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                tracing::warn!(
                    recipient = %member.user.id,
                    error = %e,
                    "skipping recipient"
                );
                report.skipped += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::test_support::test_keys;
    use crate::relay::writer::run_writer;
    use std::time::Duration;
    use tokio::sync::mpsc::{channel, Receiver};

    async fn join(registry: &Registry) -> (UserId, Receiver<String>) {
        let (tx, rx) = channel(16);
        let user = registry.register(test_keys(), tx).await;
        (user.id, rx)
    }

    fn drain(rx: &mut Receiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    #[tokio::test]
    async fn test_deliver_reaches_everyone_but_sender() {
        let registry = Registry::new();
        let router = BroadcastRouter::new(registry.clone(), LineFormatter::new(false));
        let (a, mut rx_a) = join(&registry).await;
        let (_b, mut rx_b) = join(&registry).await;
        let (_c, mut rx_c) = join(&registry).await;

        let report = router.deliver(a, "User0", "hello").await;

        assert_eq!(report, DeliveryReport { delivered: 2, skipped: 0 });
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec!["User0: hello\n"]);
        assert_eq!(drain(&mut rx_c), vec!["User0: hello\n"]);
    }

    #[tokio::test]
    async fn test_closed_recipient_is_skipped() {
        let registry = Registry::new();
        let router = BroadcastRouter::new(registry.clone(), LineFormatter::new(false));
        let (a, _rx_a) = join(&registry).await;
        let (_b, rx_b) = join(&registry).await;
        let (_c, mut rx_c) = join(&registry).await;
        drop(rx_b);

        let report = router.deliver(a, "User0", "still here").await;

        assert_eq!(report, DeliveryReport { delivered: 1, skipped: 1 });
        assert_eq!(drain(&mut rx_c), vec!["User0: still here\n"]);
    }

    #[tokio::test]
    async fn test_transform_failure_skips_recipient() {
        let registry = Registry::new();
        let router = BroadcastRouter::new(registry.clone(), LineFormatter::new(false));
        let (a, _rx_a) = join(&registry).await;
        let (_b, mut rx_b) = join(&registry).await;

        // too long for a 1024-bit OAEP payload
        let report = router.deliver(a, "User0", &"x".repeat(200)).await;

        assert_eq!(report, DeliveryReport { delivered: 0, skipped: 1 });
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_announce_excludes_origin() {
        let registry = Registry::new();
        let router = BroadcastRouter::new(registry.clone(), LineFormatter::new(false));
        let (a, mut rx_a) = join(&registry).await;
        let (_b, mut rx_b) = join(&registry).await;

        let report = router.announce(Some(a), "notice\n").await;
        assert_eq!(report.delivered, 1);
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec!["notice\n"]);

        let everyone = router.announce(None, "all\n").await;
        assert_eq!(everyone.delivered, 2);
    }

    #[tokio::test]
    async fn test_lone_sender_delivers_nothing() {
        let registry = Registry::new();
        let router = BroadcastRouter::new(registry.clone(), LineFormatter::default());
        let (a, _rx) = join(&registry).await;
        assert_eq!(router.deliver(a, "User0", "anyone?").await, DeliveryReport::default());
    }

    #[tokio::test]
    async fn test_full_queue_skips_recipient() {
        let registry = Registry::new();
        let router = BroadcastRouter::new(registry.clone(), LineFormatter::new(false));
        let (a, _rx_a) = join(&registry).await;
        let (tx, mut rx_b) = channel(2);
        registry.register(test_keys(), tx).await;

        let mut reports = Vec::new();
        for i in 0..3 {
            reports.push(router.deliver(a, "User0", &format!("m{i}")).await);
        }

        assert_eq!(reports[1], DeliveryReport { delivered: 1, skipped: 0 });
        assert_eq!(reports[2], DeliveryReport { delivered: 0, skipped: 1 });
        assert_eq!(drain(&mut rx_b), vec!["User0: m0\n", "User0: m1\n"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stalled_reader_does_not_accumulate_lines() {
        let registry = Registry::new();
        let router = BroadcastRouter::new(registry.clone(), LineFormatter::new(false));
        let (a, _rx_a) = join(&registry).await;

        // connected but never reads
        let (_peer, server) = tokio::io::duplex(64);
        let (tx, rx) = channel(4);
        let stalled = registry.register(test_keys(), tx).await;
        let writer = tokio::spawn(run_writer(
            server,
            rx,
            stalled.id,
            Some(Duration::from_millis(200)),
        ));

        let mut total = DeliveryReport::default();
        for i in 0..200 {
            let report = router.deliver(a, "User0", &format!("line {i}")).await;
            total.delivered += report.delivered;
            total.skipped += report.skipped;
        }

        // at most one transport buffer plus one queue worth got through
        assert!(total.delivered < 20, "delivered {}", total.delivered);
        assert_eq!(total.delivered + total.skipped, 200);

        tokio::time::timeout(Duration::from_secs(5), writer)
            .await
            .expect("writer never gave up on the stalled peer")
            .unwrap();
        let after = router.deliver(a, "User0", "gone").await;
        assert_eq!(after, DeliveryReport { delivered: 0, skipped: 1 });
    }
}

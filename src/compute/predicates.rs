//! Node filters and the polling helper used to wait on node state

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use super::domain::{NodeMetadata, NodeStatus};
use crate::error::Result;

/// Poll `check` until it returns `true` or `timeout` elapses.
///
/// The wait between polls starts at `period` and grows by half each time,
/// capped at `max_period`. Errors from `check` end the wait early.
pub async fn retry<F, Fut>(
    mut check: F,
    timeout: Duration,
    period: Duration,
    max_period: Duration,
) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + timeout;
    let mut period = period;
    loop {
        if check().await? {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(period.min(deadline - now)).await;
        period = period.mul_f64(1.5).min(max_period);
    }
}

pub fn node_in_group(group: &str) -> impl Fn(&NodeMetadata) -> bool + Send + Sync + '_ {
    move |node| node.group.as_deref() == Some(group)
}

pub fn node_running(node: &NodeMetadata) -> bool {
    node.status == NodeStatus::Running
}

pub fn node_terminated(node: &NodeMetadata) -> bool {
    node.status == NodeStatus::Terminated
}

pub fn node_id_in<I, S>(ids: I) -> impl Fn(&NodeMetadata) -> bool + Send + Sync
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let ids: BTreeSet<String> = ids.into_iter().map(Into::into).collect();
    move |node| ids.contains(&node.id)
}

pub fn all(_: &NodeMetadata) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn node(id: &str, group: Option<&str>, status: NodeStatus) -> NodeMetadata {
        NodeMetadata {
            id: id.into(),
            group: group.map(String::from),
            status,
            ..Default::default()
        }
    }

    #[test]
    fn test_node_filters() {
        let a = node("1", Some("web"), NodeStatus::Running);
        let b = node("2", Some("db"), NodeStatus::Terminated);

        let web = node_in_group("web");
        assert!(web(&a));
        assert!(!web(&b));
        assert!(node_running(&a));
        assert!(node_terminated(&b));

        let ids = node_id_in(["2", "3"]);
        assert!(!ids(&a));
        assert!(ids(&b));
    }

    #[tokio::test]
    async fn test_retry_until_true() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let ok = retry(
            || async move { Ok(calls.fetch_add(1, Ordering::SeqCst) >= 2) },
            Duration::from_secs(5),
            Duration::from_millis(1),
            Duration::from_millis(5),
        )
        .await
        .unwrap();
        assert!(ok);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_times_out() {
        let ok = retry(
            || async { Ok(false) },
            Duration::from_millis(20),
            Duration::from_millis(2),
            Duration::from_millis(4),
        )
        .await
        .unwrap();
        assert!(!ok);
    }

    #[test]
    fn test_retry_propagates_errors() {
        let result = tokio_test::block_on(retry(
            || async { Err(crate::error::Error::illegal_state("node(1) in error")) },
            Duration::from_secs(1),
            Duration::from_millis(1),
            Duration::from_millis(1),
        ));
        assert!(matches!(result, Err(crate::error::Error::IllegalState { .. })));
    }
}

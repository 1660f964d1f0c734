//! Waiting for asynchronous operations via the account event stream.
//!
//! Some API calls (instance reboots, for one) return before the work is done
//! and report completion as an account event. [`EventWaiter`] polls the
//! newest page of unseen events until a matching event reaches a terminal
//! status.

use chrono::{NaiveDateTime, Timelike, Utc};
use linode_api::types::Event;
use linode_api::{CancelToken, CloudClient, Filter, Order};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default interval between event polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Errors from waiting on an event.
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("{} {} failed (event {})", .0.action, entity_label(.0), .0.id)]
    Failed(Box<Event>),

    #[error("timed out after {timeout:?} waiting for {action} on {entity}")]
    Timeout {
        entity: String,
        action: String,
        timeout: Duration,
    },

    #[error("cancelled while waiting for event")]
    Cancelled,

    #[error("failed to poll events: {0}")]
    Api(linode_api::Error),
}

impl From<linode_api::Error> for WaitError {
    fn from(err: linode_api::Error) -> Self {
        match err {
            linode_api::Error::Cancelled | linode_api::Error::DeadlineExceeded(_) => {
                Self::Cancelled
            }
            other => Self::Api(other),
        }
    }
}

fn entity_label(event: &Event) -> String {
    event.entity.as_ref().map_or_else(
        || "unknown entity".to_string(),
        |e| {
            format!(
                "{} {}",
                e.entity_type,
                canonical_entity_id(&e.id).unwrap_or_default()
            )
        },
    )
}

/// The current time truncated to whole seconds, for use as `min_start`.
///
/// Capture it *before* the call that triggers the event; API timestamps have
/// second precision.
pub fn min_start() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Canonical decimal string for an event entity ID.
///
/// The API emits IDs as numbers (sometimes floats) or strings; `123`,
/// `123.0` and `"123"` all canonicalize to `"123"`.
pub fn canonical_entity_id(id: &serde_json::Value) -> Option<String> {
    match id {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                let f = n.as_f64()?;
                (f.fract() == 0.0 && f.is_finite()).then(|| format!("{f:.0}"))
            }
        }
        serde_json::Value::String(s) => {
            let s = s.trim();
            let whole = match s.split_once('.') {
                Some((whole, frac)) if frac.chars().all(|c| c == '0') => whole,
                _ => s,
            };
            Some(whole.parse::<i64>().map_or_else(|_| s.to_string(), |n| n.to_string()))
        }
        _ => None,
    }
}

/// Polls account events for one entity/action pair.
#[derive(Clone)]
pub struct EventWaiter {
    client: Arc<dyn CloudClient>,
    poll_interval: Duration,
}

impl std::fmt::Debug for EventWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWaiter")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl EventWaiter {
    pub fn new(client: Arc<dyn CloudClient>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait until the newest matching event finishes.
    ///
    /// Matching events have the given entity type and ID, the given action,
    /// and were created at or after `min_start`.
    pub fn wait_for(
        &self,
        cancel: &CancelToken,
        entity_type: &str,
        entity_id: i64,
        action: &str,
        min_start: NaiveDateTime,
        timeout: Duration,
    ) -> Result<Event, WaitError> {
        let started = Instant::now();
        let wanted_id = entity_id.to_string();
        let filter = Filter::new()
            .eq("seen", false)
            .order_by("created", Order::Desc);

        log::debug!(
            "Waiting for {action} on {entity_type} {entity_id} (timeout {timeout:?})"
        );

        loop {
            cancel.check()?;
            let events = self.client.list_events(cancel, &filter, 1)?;

            if let Some(event) =
                newest_match(events, entity_type, &wanted_id, action, min_start)
            {
                match event.status.as_str() {
                    "finished" => {
                        log::debug!("Event {} ({action}) finished", event.id);
                        return Ok(event);
                    }
                    "failed" => return Err(WaitError::Failed(Box::new(event))),
                    status => log::debug!(
                        "Event {} ({action}) is {status} ({}% complete)",
                        event.id,
                        event.percent_complete.unwrap_or(0)
                    ),
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(WaitError::Timeout {
                    entity: format!("{entity_type} {entity_id}"),
                    action: action.to_string(),
                    timeout,
                });
            }
            cancel.sleep(self.poll_interval.min(timeout - elapsed))?;
        }
    }
}

fn newest_match(
    events: Vec<Event>,
    entity_type: &str,
    entity_id: &str,
    action: &str,
    min_start: NaiveDateTime,
) -> Option<Event> {
    events
        .into_iter()
        .filter(|e| e.action == action && e.created >= min_start)
        .filter(|e| {
            e.entity.as_ref().is_some_and(|entity| {
                entity.entity_type == entity_type
                    && canonical_entity_id(&entity.id).as_deref() == Some(entity_id)
            })
        })
        .max_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use linode_api::MockClient;
    use linode_api::types::EventEntity;
    use serde_json::json;

    fn event(id: i64, entity_id: serde_json::Value, status: &str, created: NaiveDateTime) -> Event {
        Event {
            id,
            action: "linode_reboot".to_string(),
            created,
            entity: Some(EventEntity {
                id: entity_id,
                entity_type: "linode".to_string(),
                label: None,
                url: None,
            }),
            status: status.to_string(),
            seen: false,
            percent_complete: None,
            username: None,
        }
    }

    fn waiter(mock: &MockClient) -> EventWaiter {
        EventWaiter::new(Arc::new(mock.clone()), Duration::from_millis(5))
    }

    #[test]
    fn test_canonical_entity_id() {
        assert_eq!(canonical_entity_id(&json!(123)), Some("123".to_string()));
        assert_eq!(canonical_entity_id(&json!(123.0)), Some("123".to_string()));
        assert_eq!(canonical_entity_id(&json!("123")), Some("123".to_string()));
        assert_eq!(canonical_entity_id(&json!("123.0")), Some("123".to_string()));
        assert_eq!(canonical_entity_id(&json!("0123")), Some("123".to_string()));
        assert_eq!(canonical_entity_id(&json!(" 0123.00 ")), Some("123".to_string()));
        assert_eq!(canonical_entity_id(&json!("web-1")), Some("web-1".to_string()));
        assert_eq!(canonical_entity_id(&json!(1.5)), None);
        assert_eq!(canonical_entity_id(&json!(null)), None);
    }

    #[test]
    fn test_finished_event() {
        let mock = MockClient::new();
        let start = min_start();
        mock.push_event(event(1, json!(7.0), "finished", start));
        let got = waiter(&mock)
            .wait_for(
                &CancelToken::new(),
                "linode",
                7,
                "linode_reboot",
                start,
                Duration::from_secs(1),
            )
            .unwrap();
        assert_eq!(got.id, 1);
    }

    #[test]
    fn test_failed_event() {
        let mock = MockClient::new();
        let start = min_start();
        mock.push_event(event(1, json!("7"), "failed", start));
        let err = waiter(&mock)
            .wait_for(
                &CancelToken::new(),
                "linode",
                7,
                "linode_reboot",
                start,
                Duration::from_secs(1),
            )
            .unwrap_err();
        assert!(matches!(err, WaitError::Failed(_)));
        assert!(err.to_string().contains("linode 7"));
    }

    #[test]
    fn test_newest_event_wins() {
        let mock = MockClient::new();
        let start = min_start();
        mock.push_event(event(1, json!(7), "failed", start));
        mock.push_event(event(2, json!(7), "finished", start));
        let got = waiter(&mock)
            .wait_for(
                &CancelToken::new(),
                "linode",
                7,
                "linode_reboot",
                start,
                Duration::from_secs(1),
            )
            .unwrap();
        assert_eq!(got.id, 2);
    }

    #[test]
    fn test_ignores_old_and_foreign_events() {
        let mock = MockClient::new();
        let start = min_start();
        mock.push_event(event(1, json!(7), "finished", start - TimeDelta::seconds(10)));
        mock.push_event(event(2, json!(8), "finished", start));
        let err = waiter(&mock)
            .wait_for(
                &CancelToken::new(),
                "linode",
                7,
                "linode_reboot",
                start,
                Duration::from_millis(30),
            )
            .unwrap_err();
        assert!(matches!(err, WaitError::Timeout { .. }));
    }

    #[test]
    fn test_timeout_within_poll_interval() {
        let mock = MockClient::new();
        let start = min_start();
        mock.push_event(event(1, json!(7), "started", start));
        let timeout = Duration::from_millis(40);
        let began = Instant::now();
        let err = waiter(&mock)
            .wait_for(
                &CancelToken::new(),
                "linode",
                7,
                "linode_reboot",
                start,
                timeout,
            )
            .unwrap_err();
        let elapsed = began.elapsed();
        assert!(matches!(err, WaitError::Timeout { .. }));
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_millis(500));
    }

    #[test]
    fn test_cancelled() {
        let mock = MockClient::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = waiter(&mock)
            .wait_for(
                &cancel,
                "linode",
                7,
                "linode_reboot",
                min_start(),
                Duration::from_secs(1),
            )
            .unwrap_err();
        assert!(matches!(err, WaitError::Cancelled));
    }

    #[test]
    fn test_api_error_surfaces() {
        let mock = MockClient::new();
        mock.fail_next("GET /account/events", 401);
        let err = waiter(&mock)
            .wait_for(
                &CancelToken::new(),
                "linode",
                7,
                "linode_reboot",
                min_start(),
                Duration::from_secs(1),
            )
            .unwrap_err();
        assert!(matches!(err, WaitError::Api(_)));
    }
}

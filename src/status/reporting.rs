//! Reconcile outcome reporting and status persistence

use chrono::{DateTime, Utc};
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, error, info};

use super::conditions::{record_condition, ConditionedStatus};
use crate::crd::{reason, Condition, ConditionStatus, ConditionType};
use crate::error::{Error, ErrorAction, Result};

/// Delay before retrying an error that asks for backoff
pub const REQUEUE_BACKOFF: Duration = Duration::from_secs(30);

/// Map an error to the controller action
pub fn error_action(err: &Error) -> Action {
    match err.action() {
        ErrorAction::RequeueWithBackoff => Action::requeue(REQUEUE_BACKOFF),
        ErrorAction::RequeueAfter(delay) => Action::requeue(delay),
        ErrorAction::NoRequeue => Action::await_change(),
    }
}

/// Log a reconcile outcome, record it on the status and pick the next action
pub fn report_reconcile_result<S: ConditionedStatus>(
    kind: &str,
    name: &str,
    status: &mut S,
    result: &Result<()>,
    now: DateTime<Utc>,
) -> Action {
    match result {
        Ok(()) => {
            info!(kind = %kind, name = %name, "successfully configured");
            record_condition(
                status,
                Condition::new(
                    ConditionType::Ready,
                    ConditionStatus::True,
                    reason::RECONCILE_SUCCEEDED,
                    "",
                ),
                false,
                now,
            );
            Action::await_change()
        }
        Err(err) => {
            error!(kind = %kind, name = %name, error = %err, "failed to reconcile");
            record_condition(
                status,
                Condition::new(
                    ConditionType::Failure,
                    ConditionStatus::True,
                    reason::RECONCILE_FAILED,
                    err.to_string(),
                ),
                false,
                now,
            );
            error_action(err)
        }
    }
}

/// Block deletion while other resources still depend on this one
pub fn report_deletion_blocked_due_to_dependents<S: ConditionedStatus>(
    kind: &str,
    name: &str,
    status: &mut S,
    dependents: &[String],
    now: DateTime<Utc>,
) {
    let message = format!(
        "{} {:?} will not be deleted until all dependents are removed: {}",
        kind,
        name,
        dependents.join(", ")
    );
    info!(kind = %kind, name = %name, dependents = ?dependents, "deletion blocked by dependents");
    record_condition(
        status,
        Condition::new(
            ConditionType::DeletionIsBlocked,
            ConditionStatus::True,
            reason::OBJECT_HAS_DEPENDENTS,
            message,
        ),
        true,
        now,
    );
}

/// Clear a previous deletion block
pub fn report_deletion_not_blocked<S: ConditionedStatus>(
    kind: &str,
    name: &str,
    status: &mut S,
    now: DateTime<Utc>,
) {
    debug!(kind = %kind, name = %name, "deletion no longer blocked");
    record_condition(
        status,
        Condition::new(
            ConditionType::DeletionIsBlocked,
            ConditionStatus::False,
            reason::OBJECT_HAS_NO_DEPENDENTS,
            format!("{} {:?} has no dependents", kind, name),
        ),
        true,
        now,
    );
}

/// Persist a status through the status subresource
pub async fn update_status<K, S>(api: &Api<K>, name: &str, status: &S) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
    S: Serialize,
{
    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    debug!(name = %name, "status updated");
    Ok(())
}

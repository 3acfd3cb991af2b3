//! Condition list and phase state machine
//!
//! Conditions keep insertion order and are unique per type. Recording a new
//! observation drops everything but the durable conditions, upserts the new
//! one, and derives `phase`, `message` and (for clusters) the coarse `state`.

use chrono::{DateTime, Utc};

use crate::crd::{reason, ClusterState, ClusterStatus, Condition, ConditionStatus, ConditionType, ResourceStatus};

// =============================================================================
// Condition List
// =============================================================================

/// Insert or merge a condition, stamping missing timestamps with `now`
///
/// A new type gets both timestamps. An existing type always takes the new
/// reason, message and heartbeat; its transition time moves only when the
/// status changed.
pub fn set_status_condition(conditions: &mut Vec<Condition>, mut new: Condition, now: DateTime<Utc>) {
    let heartbeat = new.last_heartbeat_time.unwrap_or(now);

    let Some(existing) = conditions.iter_mut().find(|c| c.r#type == new.r#type) else {
        new.last_heartbeat_time = Some(heartbeat);
        new.last_transition_time = Some(new.last_transition_time.unwrap_or(now));
        conditions.push(new);
        return;
    };

    if existing.status != new.status {
        existing.status = new.status;
        existing.last_transition_time = Some(new.last_transition_time.unwrap_or(now));
    }
    existing.reason = new.reason;
    existing.message = new.message;
    existing.last_heartbeat_time = Some(heartbeat);
}

/// First condition of the given type
pub fn find_status_condition(conditions: &[Condition], r#type: ConditionType) -> Option<&Condition> {
    conditions.iter().find(|c| c.r#type == r#type)
}

/// Whether a condition survives a reconcile update
pub fn is_durable(condition: &Condition) -> bool {
    condition.reason == reason::CLUSTER_CREATED
        || condition.reason == reason::CLUSTER_CONNECTED
        || matches!(
            condition.r#type,
            ConditionType::Deleting | ConditionType::DeletionIsBlocked
        )
}

/// Coarse state for a condition; None keeps the current state
pub fn translate_state(condition: &Condition) -> Option<ClusterState> {
    if condition.status == ConditionStatus::False {
        return Some(ClusterState::Error);
    }
    match condition.r#type {
        ConditionType::Connecting => Some(ClusterState::Connecting),
        ConditionType::Connected => Some(ClusterState::Connected),
        ConditionType::Progressing => Some(ClusterState::Creating),
        ConditionType::Ready => Some(ClusterState::Created),
        ConditionType::Deleting => Some(ClusterState::Deleting),
        _ => None,
    }
}

// =============================================================================
// Status Machine
// =============================================================================

/// A status carrying conditions and a phase
pub trait ConditionedStatus {
    fn conditions(&self) -> &[Condition];
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;
    fn phase(&self) -> Option<ConditionType>;
    fn set_phase(&mut self, phase: ConditionType);
    fn set_message(&mut self, message: Option<String>);

    /// Only cluster statuses keep the coarse state
    fn set_state(&mut self, _state: ClusterState) {}
}

impl ConditionedStatus for ResourceStatus {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
    fn phase(&self) -> Option<ConditionType> {
        self.phase
    }
    fn set_phase(&mut self, phase: ConditionType) {
        self.phase = Some(phase);
    }
    fn set_message(&mut self, message: Option<String>) {
        self.message = message;
    }
}

impl ConditionedStatus for ClusterStatus {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
    fn phase(&self) -> Option<ConditionType> {
        self.phase
    }
    fn set_phase(&mut self, phase: ConditionType) {
        self.phase = Some(phase);
    }
    fn set_message(&mut self, message: Option<String>) {
        self.message = message;
    }
    fn set_state(&mut self, state: ClusterState) {
        self.state = Some(state);
    }
}

/// Record a new observation on a status
///
/// Non-durable conditions are purged first unless `preserve_all` is set.
/// Phase follows the recorded type except that Deleting is sticky.
pub fn record_condition<S: ConditionedStatus>(
    status: &mut S,
    condition: Condition,
    preserve_all: bool,
    now: DateTime<Utc>,
) {
    if !preserve_all {
        status.conditions_mut().retain(is_durable);
    }

    if let Some(state) = translate_state(&condition) {
        status.set_state(state);
    }

    let r#type = condition.r#type;
    let message = (!condition.message.is_empty()).then(|| condition.message.clone());
    set_status_condition(status.conditions_mut(), condition, now);

    if status.phase() != Some(ConditionType::Deleting) {
        status.set_phase(r#type);
        status.set_message(message);
    }
}

/// Seed a fresh status with the conditions every resource reports
pub fn condition_initialize<S: ConditionedStatus>(status: &mut S, now: DateTime<Utc>) {
    for r#type in [ConditionType::Failure, ConditionType::Ignored, ConditionType::Upgrading] {
        if find_status_condition(status.conditions(), r#type).is_none() {
            set_status_condition(
                status.conditions_mut(),
                Condition::new(r#type, ConditionStatus::False, "", ""),
                now,
            );
        }
    }
}

/// Record Ready=True and close out in-flight transitions
pub fn mark_ready<S: ConditionedStatus>(
    status: &mut S,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) {
    let completions = [
        (ConditionType::Progressing, reason::PROGRESSING_COMPLETED),
        (ConditionType::Updating, reason::UPDATE_COMPLETED),
        (ConditionType::Upgrading, reason::UPGRADE_COMPLETED),
    ];
    record_condition(
        status,
        Condition::new(ConditionType::Ready, ConditionStatus::True, reason, message),
        true,
        now,
    );
    for (r#type, completed) in completions {
        set_status_condition(
            status.conditions_mut(),
            Condition::new(r#type, ConditionStatus::False, completed, ""),
            now,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn cond(r#type: ConditionType, status: ConditionStatus, reason: &str) -> Condition {
        Condition::new(r#type, status, reason, format!("{} {}", r#type, status))
    }

    #[test]
    fn test_set_status_condition_new() {
        let mut list = Vec::new();
        set_status_condition(&mut list, cond(ConditionType::Progressing, ConditionStatus::True, "x"), t(0));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].last_transition_time, Some(t(0)));
        assert_eq!(list[0].last_heartbeat_time, Some(t(0)));
    }

    #[test]
    fn test_set_status_condition_transition() {
        let mut list = Vec::new();
        set_status_condition(&mut list, cond(ConditionType::Ready, ConditionStatus::False, "a"), t(0));

        // same status: heartbeat moves, transition does not
        set_status_condition(&mut list, cond(ConditionType::Ready, ConditionStatus::False, "b"), t(10));
        let c = find_status_condition(&list, ConditionType::Ready).unwrap();
        assert_eq!(c.reason, "b");
        assert_eq!(c.last_transition_time, Some(t(0)));
        assert_eq!(c.last_heartbeat_time, Some(t(10)));

        // status change advances the transition time
        set_status_condition(&mut list, cond(ConditionType::Ready, ConditionStatus::True, "c"), t(20));
        let c = find_status_condition(&list, ConditionType::Ready).unwrap();
        assert_eq!(c.status, ConditionStatus::True);
        assert_eq!(c.last_transition_time, Some(t(20)));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_set_status_condition_caller_times() {
        let mut list = Vec::new();
        let mut c = cond(ConditionType::Failure, ConditionStatus::True, "x");
        c.last_transition_time = Some(t(-60));
        set_status_condition(&mut list, c, t(0));
        assert_eq!(list[0].last_transition_time, Some(t(-60)));
        assert_eq!(list[0].last_heartbeat_time, Some(t(0)));
        assert!(list[0].last_transition_time < Some(t(0) - Duration::seconds(30)));
    }

    #[test]
    fn test_insertion_order_kept() {
        let mut list = Vec::new();
        for ty in [ConditionType::Progressing, ConditionType::Ready, ConditionType::Failure] {
            set_status_condition(&mut list, cond(ty, ConditionStatus::True, "x"), t(0));
        }
        set_status_condition(&mut list, cond(ConditionType::Progressing, ConditionStatus::False, "y"), t(1));
        let types: Vec<_> = list.iter().map(|c| c.r#type).collect();
        assert_eq!(
            types,
            vec![ConditionType::Progressing, ConditionType::Ready, ConditionType::Failure]
        );
    }

    #[test]
    fn test_translate_state() {
        let state = |ty, st| translate_state(&cond(ty, st, ""));
        assert_eq!(state(ConditionType::Ready, ConditionStatus::False), Some(ClusterState::Error));
        assert_eq!(state(ConditionType::Ready, ConditionStatus::True), Some(ClusterState::Created));
        assert_eq!(
            state(ConditionType::Progressing, ConditionStatus::True),
            Some(ClusterState::Creating)
        );
        assert_eq!(
            state(ConditionType::Connecting, ConditionStatus::True),
            Some(ClusterState::Connecting)
        );
        assert_eq!(state(ConditionType::Failure, ConditionStatus::True), None);
    }

    #[test]
    fn test_record_purges_non_durable() {
        let mut status = ClusterStatus::default();
        record_condition(
            &mut status,
            cond(ConditionType::Ready, ConditionStatus::True, reason::CLUSTER_CREATED),
            false,
            t(0),
        );
        record_condition(
            &mut status,
            cond(ConditionType::Failure, ConditionStatus::True, reason::CLUSTER_FAILURE),
            false,
            t(1),
        );
        record_condition(
            &mut status,
            cond(ConditionType::Progressing, ConditionStatus::True, reason::CLUSTER_PROGRESSING),
            false,
            t(2),
        );

        let types: Vec<_> = status.conditions.iter().map(|c| c.r#type).collect();
        assert_eq!(types, vec![ConditionType::Ready, ConditionType::Progressing]);
        assert_eq!(status.phase, Some(ConditionType::Progressing));
        assert_eq!(status.state, Some(ClusterState::Creating));
        assert_eq!(status.message.as_deref(), Some("Progressing True"));

        record_condition(
            &mut status,
            cond(ConditionType::Failure, ConditionStatus::True, reason::CLUSTER_FAILURE),
            true,
            t(3),
        );
        assert_eq!(status.conditions.len(), 3);
        // Failure has no coarse state of its own
        assert_eq!(status.state, Some(ClusterState::Creating));
    }

    #[test]
    fn test_deleting_phase_is_sticky() {
        let mut status = ResourceStatus::default();
        record_condition(
            &mut status,
            cond(ConditionType::Deleting, ConditionStatus::True, reason::DELETING),
            false,
            t(0),
        );
        record_condition(
            &mut status,
            cond(ConditionType::Ready, ConditionStatus::True, reason::RECONCILE_SUCCEEDED),
            false,
            t(1),
        );
        assert_eq!(status.phase, Some(ConditionType::Deleting));
        assert_eq!(status.message.as_deref(), Some("Deleting True"));
        assert!(find_status_condition(&status.conditions, ConditionType::Deleting).is_some());
    }

    #[test]
    fn test_condition_initialize() {
        let mut status = ResourceStatus::default();
        condition_initialize(&mut status, t(0));
        assert_eq!(status.conditions.len(), 3);
        assert!(status
            .conditions
            .iter()
            .all(|c| c.status == ConditionStatus::False));

        condition_initialize(&mut status, t(1));
        assert_eq!(status.conditions.len(), 3);
        assert_eq!(status.phase, None);
    }

    #[test]
    fn test_mark_ready_completes_transitions() {
        let mut status = ClusterStatus::default();
        record_condition(
            &mut status,
            cond(ConditionType::Progressing, ConditionStatus::True, reason::CLUSTER_PROGRESSING),
            false,
            t(0),
        );
        mark_ready(&mut status, reason::CLUSTER_CREATED, "Cluster created successfully", t(5));

        assert_eq!(status.phase, Some(ConditionType::Ready));
        assert_eq!(status.state, Some(ClusterState::Created));
        let progressing = find_status_condition(&status.conditions, ConditionType::Progressing).unwrap();
        assert_eq!(progressing.status, ConditionStatus::False);
        assert_eq!(progressing.reason, reason::PROGRESSING_COMPLETED);
        assert_eq!(progressing.last_transition_time, Some(t(5)));
        let upgrading = find_status_condition(&status.conditions, ConditionType::Upgrading).unwrap();
        assert_eq!(upgrading.reason, reason::UPGRADE_COMPLETED);
    }
}

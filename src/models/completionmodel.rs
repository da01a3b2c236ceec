use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "completion_status", rename_all = "snake_case")]
pub enum CompletionStatus {
    InProgress,
    Submitted,
    Approved,
    AutoApproved,
    DroppedOut,
    NoShow,
}

impl CompletionStatus {
    pub fn to_str(&self) -> &str {
        match self {
            CompletionStatus::InProgress => "in_progress",
            CompletionStatus::Submitted => "submitted",
            CompletionStatus::Approved => "approved",
            CompletionStatus::AutoApproved => "auto_approved",
            CompletionStatus::DroppedOut => "dropped_out",
            CompletionStatus::NoShow => "no_show",
        }
    }

    /// Approved-equivalent terminal states.
    pub fn is_approved(&self) -> bool {
        matches!(self, CompletionStatus::Approved | CompletionStatus::AutoApproved)
    }

    /// Records that still count toward the job; dropouts and no-shows
    /// are excluded from the aggregate.
    pub fn is_active(&self) -> bool {
        !matches!(self, CompletionStatus::DroppedOut | CompletionStatus::NoShow)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CompletionStatus::InProgress | CompletionStatus::Submitted)
    }

    pub fn can_transition_to(&self, to: CompletionStatus) -> bool {
        match (self, to) {
            (CompletionStatus::InProgress, CompletionStatus::Submitted) => true,
            (CompletionStatus::Submitted, CompletionStatus::Approved) => true,
            (CompletionStatus::Submitted, CompletionStatus::AutoApproved) => true,
            (CompletionStatus::InProgress, CompletionStatus::DroppedOut) => true,
            (CompletionStatus::InProgress, CompletionStatus::NoShow) => true,
            (CompletionStatus::Submitted, CompletionStatus::DroppedOut) => true,
            (CompletionStatus::Submitted, CompletionStatus::NoShow) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "room_status", rename_all = "snake_case")]
pub enum RoomStatus {
    Pending,
    Claimed,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Appointment {
    pub id: Uuid,
    pub homeowner_id: Uuid,
    pub home_id: Uuid,
    pub price_cents: i64,
    pub is_multi_worker: bool,
    pub scheduled_start: DateTime<Utc>,
    pub completion_status: CompletionStatus,
    pub completed: bool,
    pub payment_captured: bool,
    pub feedback_required: bool,
    pub confirmed_worker_count: i32,
    pub solo_completion: bool,
    pub created_at: Option<DateTime<Utc>>, // Database has DEFAULT NOW(), can be NULL
    pub updated_at: Option<DateTime<Utc>>, // Database has DEFAULT NOW(), can be NULL
}

/// One row per cleaner assigned to an appointment. Never deleted; kept
/// for audits and disputes after terminal transitions.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkerCompletionRecord {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub worker_id: Uuid,
    pub status: CompletionStatus,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub auto_approval_expires_at: Option<DateTime<Utc>>,
    pub checklist_evidence: Option<serde_json::Value>,
    pub dropout_reason: Option<String>,
    pub payout_id: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>, // Database has DEFAULT NOW(), can be NULL
    pub updated_at: Option<DateTime<Utc>>, // Database has DEFAULT NOW(), can be NULL
}

/// Room-level work split for multi-cleaner appointments. Owned by the
/// scheduling side; read here for effort weighting and released back to
/// `worker_id = NULL` when a cleaner drops out.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoomAssignment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub worker_id: Option<Uuid>,
    pub room_label: String,
    pub estimated_effort_minutes: i32,
    pub status: RoomStatus,
    pub created_at: Option<DateTime<Utc>>, // Database has DEFAULT NOW(), can be NULL
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SoloOffer {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub worker_id: Uuid,
    pub projected_net_cents: i64,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>, // Database has DEFAULT NOW(), can be NULL
}

/// The two shapes a job's completion can take, with the aggregate
/// rollup as one pure function over either shape.
#[derive(Debug, Clone)]
pub enum JobCompletion {
    Solo(WorkerCompletionRecord),
    MultiWorker {
        records: Vec<WorkerCompletionRecord>,
        rooms: Vec<RoomAssignment>,
    },
}

impl JobCompletion {
    pub fn from_parts(
        is_multi_worker: bool,
        mut records: Vec<WorkerCompletionRecord>,
        rooms: Vec<RoomAssignment>,
    ) -> Option<Self> {
        if is_multi_worker {
            Some(JobCompletion::MultiWorker { records, rooms })
        } else {
            // Solo jobs collapse onto a single record.
            if records.is_empty() {
                None
            } else {
                Some(JobCompletion::Solo(records.remove(0)))
            }
        }
    }

    /// Whether every piece of the job is finished and approved.
    ///
    /// Dropped-out and no-show records are excluded, but a multi-worker
    /// job does not settle while any room is unassigned or held by a
    /// cleaner whose record is not terminal-approved. A dropout that
    /// releases rooms therefore keeps the aggregate open until the slot
    /// is reassigned (or absorbed via solo completion) and approved.
    /// An empty active set fails closed.
    pub fn is_settled(&self) -> bool {
        match self {
            JobCompletion::Solo(record) => record.status.is_approved(),
            JobCompletion::MultiWorker { records, rooms } => {
                let active: Vec<&WorkerCompletionRecord> =
                    records.iter().filter(|r| r.status.is_active()).collect();

                if active.is_empty() {
                    return false;
                }
                if !active.iter().all(|r| r.status.is_approved()) {
                    return false;
                }

                rooms.iter().all(|room| match room.worker_id {
                    Some(worker_id) => records
                        .iter()
                        .any(|r| r.worker_id == worker_id && r.status.is_approved()),
                    None => false,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(worker_id: Uuid, status: CompletionStatus) -> WorkerCompletionRecord {
        WorkerCompletionRecord {
            id: Uuid::new_v4(),
            appointment_id: Uuid::new_v4(),
            worker_id,
            status,
            checked_in_at: None,
            submitted_at: None,
            approved_at: None,
            approved_by: None,
            auto_approval_expires_at: None,
            checklist_evidence: None,
            dropout_reason: None,
            payout_id: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn room(worker_id: Option<Uuid>) -> RoomAssignment {
        RoomAssignment {
            id: Uuid::new_v4(),
            appointment_id: Uuid::new_v4(),
            worker_id,
            room_label: "kitchen".to_string(),
            estimated_effort_minutes: 30,
            status: RoomStatus::Claimed,
            created_at: None,
        }
    }

    #[test]
    fn test_legal_transitions() {
        use CompletionStatus::*;
        assert!(InProgress.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Approved));
        assert!(Submitted.can_transition_to(AutoApproved));
        assert!(InProgress.can_transition_to(DroppedOut));
        assert!(InProgress.can_transition_to(NoShow));
        assert!(Submitted.can_transition_to(DroppedOut));
        assert!(Submitted.can_transition_to(NoShow));
    }

    #[test]
    fn test_illegal_transitions() {
        use CompletionStatus::*;
        assert!(!InProgress.can_transition_to(Approved));
        assert!(!InProgress.can_transition_to(AutoApproved));
        assert!(!Submitted.can_transition_to(Submitted));
        assert!(!Approved.can_transition_to(Submitted));
        assert!(!Approved.can_transition_to(DroppedOut));
        assert!(!AutoApproved.can_transition_to(Approved));
        assert!(!DroppedOut.can_transition_to(Submitted));
        assert!(!NoShow.can_transition_to(InProgress));
    }

    #[test]
    fn test_solo_settles_only_when_approved() {
        let worker = Uuid::new_v4();
        assert!(!JobCompletion::Solo(record(worker, CompletionStatus::InProgress)).is_settled());
        assert!(!JobCompletion::Solo(record(worker, CompletionStatus::Submitted)).is_settled());
        assert!(JobCompletion::Solo(record(worker, CompletionStatus::Approved)).is_settled());
        assert!(JobCompletion::Solo(record(worker, CompletionStatus::AutoApproved)).is_settled());
    }

    #[test]
    fn test_multi_worker_settles_when_all_active_approved() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let completion = JobCompletion::MultiWorker {
            records: vec![
                record(a, CompletionStatus::Approved),
                record(b, CompletionStatus::AutoApproved),
            ],
            rooms: vec![room(Some(a)), room(Some(b))],
        };
        assert!(completion.is_settled());
    }

    #[test]
    fn test_multi_worker_open_while_one_submitted() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let completion = JobCompletion::MultiWorker {
            records: vec![
                record(a, CompletionStatus::Approved),
                record(b, CompletionStatus::Submitted),
            ],
            rooms: vec![room(Some(a)), room(Some(b))],
        };
        assert!(!completion.is_settled());
    }

    #[test]
    fn test_dropout_with_released_rooms_keeps_aggregate_open() {
        // B is approved, A dropped out and A's room went back to the
        // pool. The job must stay open until the slot is resolved.
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let completion = JobCompletion::MultiWorker {
            records: vec![
                record(a, CompletionStatus::DroppedOut),
                record(b, CompletionStatus::Approved),
            ],
            rooms: vec![room(None), room(Some(b))],
        };
        assert!(!completion.is_settled());
    }

    #[test]
    fn test_reassigned_and_approved_slot_settles() {
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let completion = JobCompletion::MultiWorker {
            records: vec![
                record(Uuid::new_v4(), CompletionStatus::DroppedOut),
                record(b, CompletionStatus::Approved),
                record(c, CompletionStatus::Approved),
            ],
            rooms: vec![room(Some(c)), room(Some(b))],
        };
        assert!(completion.is_settled());
    }

    #[test]
    fn test_all_workers_dropped_fails_closed() {
        let completion = JobCompletion::MultiWorker {
            records: vec![
                record(Uuid::new_v4(), CompletionStatus::DroppedOut),
                record(Uuid::new_v4(), CompletionStatus::NoShow),
            ],
            rooms: vec![room(None), room(None)],
        };
        assert!(!completion.is_settled());
    }

    #[test]
    fn test_room_held_by_unapproved_worker_keeps_aggregate_open() {
        // Solo-completion acceptance hands the released rooms to the
        // remaining cleaner; nothing settles until they are approved.
        let b = Uuid::new_v4();
        let completion = JobCompletion::MultiWorker {
            records: vec![
                record(Uuid::new_v4(), CompletionStatus::DroppedOut),
                record(b, CompletionStatus::Submitted),
            ],
            rooms: vec![room(Some(b)), room(Some(b))],
        };
        assert!(!completion.is_settled());
    }
}

// src/lifecycle.rs
//
// Pure booking rules: status transitions, who may perform them, how
// payment state is allowed to move, and how periodic bookings expand
// into calendar occurrences. No I/O here; route handlers load the row,
// call in, and persist the outcome.

use chrono::{DateTime, Months, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AppointmentStatus, Frequency, Party, PaymentStatus};

#[derive(Debug, Error, PartialEq)]
pub enum LifecycleError {
    #[error("appointment is already {} and cannot change status", .0.label())]
    Terminal(AppointmentStatus),
    #[error("the party that created the appointment cannot confirm it")]
    CreatorCannotConfirm,
    #[error("only the professional can mark an appointment completed")]
    CompletionIsProfessionalOnly,
    #[error("cannot move a {} appointment to {}", .from.label(), .to.label())]
    UnsupportedTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error("at least one horse is required")]
    NoHorses,
    #[error("duration must be at least one minute")]
    NonPositiveDuration,
    #[error("periodic appointments need a frequency and an end date")]
    MissingRecurrence,
    #[error("the recurrence end date must be after the first occurrence")]
    RecurrenceEndsBeforeStart,
    #[error("payment can only be initiated on a confirmed appointment")]
    NotConfirmed,
    #[error("no price has been agreed for this appointment")]
    NoPrice,
    #[error("this appointment has already been paid")]
    AlreadyPaid,
    #[error("payment state is frozen once an appointment is cancelled or completed")]
    PaymentFrozen,
}

/// Which side of the appointment a user stands on, if any.
pub fn party_of(user_id: Uuid, client_id: Uuid, professional_id: Uuid) -> Option<Party> {
    if user_id == client_id {
        Some(Party::Client)
    } else if user_id == professional_id {
        Some(Party::Professional)
    } else {
        None
    }
}

/// The transition matrix. `actor` is the side making the request,
/// `created_by` the side that originally booked.
///
/// pending   -> confirmed   only the non-creator
/// pending   -> cancelled   either side (reject / withdraw)
/// confirmed -> cancelled   either side
/// confirmed -> completed   professional only
/// cancelled / completed    terminal, nothing leaves them
pub fn validate_transition(
    current: AppointmentStatus,
    target: AppointmentStatus,
    actor: Party,
    created_by: Party,
) -> Result<(), LifecycleError> {
    if current.is_terminal() {
        return Err(LifecycleError::Terminal(current));
    }

    match (current, target) {
        (AppointmentStatus::Pending, AppointmentStatus::Confirmed) => {
            if actor == created_by {
                Err(LifecycleError::CreatorCannotConfirm)
            } else {
                Ok(())
            }
        }
        (AppointmentStatus::Pending, AppointmentStatus::Cancelled)
        | (AppointmentStatus::Confirmed, AppointmentStatus::Cancelled) => Ok(()),
        (AppointmentStatus::Confirmed, AppointmentStatus::Completed) => {
            if actor == Party::Professional {
                Ok(())
            } else {
                Err(LifecycleError::CompletionIsProfessionalOnly)
            }
        }
        (from, to) => Err(LifecycleError::UnsupportedTransition { from, to }),
    }
}

/// All statuses the actor could legally move this appointment to.
/// Drives the action buttons in the UI.
pub fn valid_targets(
    current: AppointmentStatus,
    actor: Party,
    created_by: Party,
) -> Vec<AppointmentStatus> {
    [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::Completed,
    ]
    .into_iter()
    .filter(|t| validate_transition(current, *t, actor, created_by).is_ok())
    .collect()
}

/// Checks on a new booking request. Callers have already resolved the
/// start timestamp; horse ownership is checked against the store.
pub fn validate_schedule(
    horse_count: usize,
    duration_min: i32,
    start_at: DateTime<Utc>,
    is_periodic: bool,
    frequency: Option<Frequency>,
    repeat_until: Option<DateTime<Utc>>,
) -> Result<(), LifecycleError> {
    if horse_count == 0 {
        return Err(LifecycleError::NoHorses);
    }
    if duration_min <= 0 {
        return Err(LifecycleError::NonPositiveDuration);
    }
    if is_periodic {
        let (Some(_), Some(until)) = (frequency, repeat_until) else {
            return Err(LifecycleError::MissingRecurrence);
        };
        if until <= start_at {
            return Err(LifecycleError::RecurrenceEndsBeforeStart);
        }
    }
    Ok(())
}

/// The client may start checkout only on a confirmed appointment with an
/// agreed price that has not been paid yet.
pub fn can_initiate_checkout(
    status: AppointmentStatus,
    price_cents: Option<i32>,
    payment_status: PaymentStatus,
) -> Result<i32, LifecycleError> {
    if status != AppointmentStatus::Confirmed {
        return Err(LifecycleError::NotConfirmed);
    }
    let price = price_cents.ok_or(LifecycleError::NoPrice)?;
    match payment_status {
        PaymentStatus::Pending | PaymentStatus::Unpaid => Ok(price),
        PaymentStatus::PaidAdvance | PaymentStatus::PaidComplete => {
            Err(LifecycleError::AlreadyPaid)
        }
    }
}

/// Payment confirmations (webhook or redirect return) may only land
/// while the appointment is confirmed. Cancelled appointments keep
/// whatever payment state they had; refunds are handled outside.
pub fn validate_payment_progress(
    status: AppointmentStatus,
    target: PaymentStatus,
) -> Result<(), LifecycleError> {
    match target {
        PaymentStatus::PaidAdvance | PaymentStatus::PaidComplete => {
            if status == AppointmentStatus::Confirmed {
                Ok(())
            } else if status.is_terminal() {
                Err(LifecycleError::PaymentFrozen)
            } else {
                Err(LifecycleError::NotConfirmed)
            }
        }
        PaymentStatus::Pending | PaymentStatus::Unpaid => Ok(()),
    }
}

/// True for entries shown on the "upcoming" tab: still live and in the
/// future. Callers sort these ascending by date.
pub fn is_upcoming(status: AppointmentStatus, start_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    matches!(
        status,
        AppointmentStatus::Pending | AppointmentStatus::Confirmed
    ) && start_at > now
}

/// Occurrence dates of a periodic booking, first occurrence included,
/// up to and including `repeat_until`. Recurring instances are never
/// stored as rows; calendar views expand them from the single row.
/// `cap` bounds runaway ranges.
pub fn expand_occurrences(
    start_at: DateTime<Utc>,
    frequency: Frequency,
    repeat_until: DateTime<Utc>,
    cap: usize,
) -> Vec<DateTime<Utc>> {
    let mut out = Vec::new();
    let mut next = start_at;
    while next <= repeat_until && out.len() < cap {
        out.push(next);
        next = match frequency {
            Frequency::Weekly => next + chrono::Duration::days(7),
            Frequency::Biweekly => next + chrono::Duration::days(14),
            Frequency::Monthly => match next.checked_add_months(Months::new(1)) {
                Some(n) => n,
                None => break,
            },
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, mo: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for current in [AppointmentStatus::Cancelled, AppointmentStatus::Completed] {
            for target in [
                AppointmentStatus::Pending,
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::Completed,
            ] {
                for actor in [Party::Client, Party::Professional] {
                    assert_eq!(
                        validate_transition(current, target, actor, Party::Client),
                        Err(LifecycleError::Terminal(current)),
                    );
                }
            }
        }
    }

    #[test]
    fn test_creator_cannot_confirm_own_request() {
        // booked by the client: only the professional confirms
        assert!(validate_transition(
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed,
            Party::Professional,
            Party::Client,
        )
        .is_ok());
        assert_eq!(
            validate_transition(
                AppointmentStatus::Pending,
                AppointmentStatus::Confirmed,
                Party::Client,
                Party::Client,
            ),
            Err(LifecycleError::CreatorCannotConfirm),
        );

        // and symmetrically for a professional-created appointment
        assert!(validate_transition(
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed,
            Party::Client,
            Party::Professional,
        )
        .is_ok());
        assert_eq!(
            validate_transition(
                AppointmentStatus::Pending,
                AppointmentStatus::Confirmed,
                Party::Professional,
                Party::Professional,
            ),
            Err(LifecycleError::CreatorCannotConfirm),
        );
    }

    #[test]
    fn test_either_party_may_cancel_while_live() {
        for current in [AppointmentStatus::Pending, AppointmentStatus::Confirmed] {
            for actor in [Party::Client, Party::Professional] {
                assert!(validate_transition(
                    current,
                    AppointmentStatus::Cancelled,
                    actor,
                    Party::Client
                )
                .is_ok());
            }
        }
    }

    #[test]
    fn test_completion_is_professional_only() {
        assert!(validate_transition(
            AppointmentStatus::Confirmed,
            AppointmentStatus::Completed,
            Party::Professional,
            Party::Client,
        )
        .is_ok());
        assert_eq!(
            validate_transition(
                AppointmentStatus::Confirmed,
                AppointmentStatus::Completed,
                Party::Client,
                Party::Client,
            ),
            Err(LifecycleError::CompletionIsProfessionalOnly),
        );
        // cannot skip confirmation
        assert_eq!(
            validate_transition(
                AppointmentStatus::Pending,
                AppointmentStatus::Completed,
                Party::Professional,
                Party::Client,
            ),
            Err(LifecycleError::UnsupportedTransition {
                from: AppointmentStatus::Pending,
                to: AppointmentStatus::Completed,
            }),
        );
    }

    #[test]
    fn test_full_lifecycle_scenario() {
        // client books -> professional confirms -> professional completes
        // -> any further change is rejected
        let created_by = Party::Client;
        let mut status = AppointmentStatus::Pending;

        validate_transition(status, AppointmentStatus::Confirmed, Party::Professional, created_by)
            .unwrap();
        status = AppointmentStatus::Confirmed;

        validate_transition(status, AppointmentStatus::Completed, Party::Professional, created_by)
            .unwrap();
        status = AppointmentStatus::Completed;

        assert_eq!(
            validate_transition(status, AppointmentStatus::Cancelled, Party::Client, created_by),
            Err(LifecycleError::Terminal(AppointmentStatus::Completed)),
        );
    }

    #[test]
    fn test_valid_targets() {
        let targets = valid_targets(AppointmentStatus::Pending, Party::Professional, Party::Client);
        assert_eq!(
            targets,
            vec![AppointmentStatus::Confirmed, AppointmentStatus::Cancelled]
        );

        let targets = valid_targets(AppointmentStatus::Pending, Party::Client, Party::Client);
        assert_eq!(targets, vec![AppointmentStatus::Cancelled]);

        assert!(valid_targets(AppointmentStatus::Completed, Party::Professional, Party::Client)
            .is_empty());
    }

    #[test]
    fn test_party_of() {
        let client = Uuid::new_v4();
        let pro = Uuid::new_v4();
        assert_eq!(party_of(client, client, pro), Some(Party::Client));
        assert_eq!(party_of(pro, client, pro), Some(Party::Professional));
        assert_eq!(party_of(Uuid::new_v4(), client, pro), None);
    }

    #[test]
    fn test_validate_schedule() {
        let start = ts(2026, 3, 2);
        assert!(validate_schedule(1, 60, start, false, None, None).is_ok());
        assert_eq!(
            validate_schedule(0, 60, start, false, None, None),
            Err(LifecycleError::NoHorses)
        );
        assert_eq!(
            validate_schedule(1, 0, start, false, None, None),
            Err(LifecycleError::NonPositiveDuration)
        );
        assert_eq!(
            validate_schedule(1, 30, start, true, Some(Frequency::Weekly), None),
            Err(LifecycleError::MissingRecurrence)
        );
        assert_eq!(
            validate_schedule(1, 30, start, true, Some(Frequency::Weekly), Some(start)),
            Err(LifecycleError::RecurrenceEndsBeforeStart)
        );
        assert!(validate_schedule(
            2,
            30,
            start,
            true,
            Some(Frequency::Weekly),
            Some(ts(2026, 4, 2))
        )
        .is_ok());
    }

    #[test]
    fn test_checkout_gate() {
        assert_eq!(
            can_initiate_checkout(AppointmentStatus::Pending, Some(5000), PaymentStatus::Pending),
            Err(LifecycleError::NotConfirmed)
        );
        assert_eq!(
            can_initiate_checkout(AppointmentStatus::Confirmed, None, PaymentStatus::Pending),
            Err(LifecycleError::NoPrice)
        );
        assert_eq!(
            can_initiate_checkout(
                AppointmentStatus::Confirmed,
                Some(5000),
                PaymentStatus::PaidComplete
            ),
            Err(LifecycleError::AlreadyPaid)
        );
        assert_eq!(
            can_initiate_checkout(AppointmentStatus::Confirmed, Some(5000), PaymentStatus::Unpaid),
            Ok(5000)
        );
    }

    #[test]
    fn test_payment_progress_only_while_confirmed() {
        assert!(validate_payment_progress(
            AppointmentStatus::Confirmed,
            PaymentStatus::PaidAdvance
        )
        .is_ok());
        assert_eq!(
            validate_payment_progress(AppointmentStatus::Pending, PaymentStatus::PaidComplete),
            Err(LifecycleError::NotConfirmed)
        );
        // cancelled appointments keep their payment state as-is
        assert_eq!(
            validate_payment_progress(AppointmentStatus::Cancelled, PaymentStatus::PaidComplete),
            Err(LifecycleError::PaymentFrozen)
        );
    }

    #[test]
    fn test_is_upcoming() {
        let now = ts(2026, 3, 15);
        assert!(is_upcoming(AppointmentStatus::Pending, ts(2026, 3, 16), now));
        assert!(is_upcoming(AppointmentStatus::Confirmed, ts(2026, 4, 1), now));
        assert!(!is_upcoming(AppointmentStatus::Confirmed, ts(2026, 3, 14), now));
        assert!(!is_upcoming(AppointmentStatus::Cancelled, ts(2026, 4, 1), now));
        assert!(!is_upcoming(AppointmentStatus::Completed, ts(2026, 4, 1), now));
    }

    #[test]
    fn test_expand_weekly() {
        let dates =
            expand_occurrences(ts(2026, 3, 2), Frequency::Weekly, ts(2026, 3, 23), 100);
        assert_eq!(
            dates,
            vec![ts(2026, 3, 2), ts(2026, 3, 9), ts(2026, 3, 16), ts(2026, 3, 23)]
        );
    }

    #[test]
    fn test_expand_biweekly_excludes_past_end() {
        let dates =
            expand_occurrences(ts(2026, 3, 2), Frequency::Biweekly, ts(2026, 3, 29), 100);
        assert_eq!(dates, vec![ts(2026, 3, 2), ts(2026, 3, 16)]);
    }

    #[test]
    fn test_expand_monthly_clamps_short_months() {
        let dates =
            expand_occurrences(ts(2026, 1, 31), Frequency::Monthly, ts(2026, 4, 30), 100);
        // chrono clamps Jan 31 + 1 month to Feb 28
        assert_eq!(
            dates,
            vec![ts(2026, 1, 31), ts(2026, 2, 28), ts(2026, 3, 28), ts(2026, 4, 28)]
        );
    }

    #[test]
    fn test_expand_respects_cap() {
        let dates =
            expand_occurrences(ts(2026, 1, 1), Frequency::Weekly, ts(2030, 1, 1), 10);
        assert_eq!(dates.len(), 10);
    }
}

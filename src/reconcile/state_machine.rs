//! Pure transition rules for the payment intent lifecycle.
//!
//! `pending -> processing -> {succeeded | failed}`, plus `pending ->
//! cancelled` and `pending -> expired` (owned by the expiry sweep). No edge
//! leaves a terminal state. The decision here is pure; persistence happens
//! through the store's atomic conditional write, which independently enforces
//! the same terminal-finality rule under concurrency.

use crate::providers::types::EventOutcome;
use crate::store::intents::IntentStatus;

/// Mutations a transition asks the orchestrator to execute. Side effects run
/// only when the conditional write actually lands, so each fires at most once
/// per intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideEffects {
    pub mark_order_paid: bool,
    pub create_payment: bool,
}

impl SideEffects {
    pub const NONE: SideEffects = SideEffects {
        mark_order_paid: false,
        create_payment: false,
    };

    pub fn is_none(&self) -> bool {
        !self.mark_order_paid && !self.create_payment
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Target status, or `None` when the event changes nothing.
    pub next: Option<IntentStatus>,
    pub effects: SideEffects,
}

impl Decision {
    const NO_OP: Decision = Decision {
        next: None,
        effects: SideEffects::NONE,
    };
}

pub fn decide(current: IntentStatus, outcome: EventOutcome) -> Decision {
    // Re-applying any event to a terminal intent is a safe no-op. This is the
    // second idempotency layer, covering events the ledger cannot deduplicate.
    if current.is_terminal() {
        return Decision::NO_OP;
    }

    match outcome {
        EventOutcome::Succeeded => Decision {
            next: Some(IntentStatus::Succeeded),
            effects: SideEffects {
                mark_order_paid: true,
                create_payment: true,
            },
        },
        // The order stays as-is so the customer can retry with a new attempt.
        EventOutcome::Failed => Decision {
            next: Some(IntentStatus::Failed),
            effects: SideEffects::NONE,
        },
        // "Still waiting". A first provider acknowledgment moves a fresh
        // intent to processing; after that there is nothing to record.
        EventOutcome::Pending => match current {
            IntentStatus::Pending => Decision {
                next: Some(IntentStatus::Processing),
                effects: SideEffects::NONE,
            },
            _ => Decision::NO_OP,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TERMINAL: [IntentStatus; 4] = [
        IntentStatus::Succeeded,
        IntentStatus::Failed,
        IntentStatus::Cancelled,
        IntentStatus::Expired,
    ];

    #[test]
    fn success_transitions_and_triggers_both_side_effects() {
        for current in [IntentStatus::Pending, IntentStatus::Processing] {
            let decision = decide(current, EventOutcome::Succeeded);
            assert_eq!(decision.next, Some(IntentStatus::Succeeded));
            assert!(decision.effects.mark_order_paid);
            assert!(decision.effects.create_payment);
        }
    }

    #[test]
    fn failure_transitions_without_side_effects() {
        let decision = decide(IntentStatus::Processing, EventOutcome::Failed);
        assert_eq!(decision.next, Some(IntentStatus::Failed));
        assert!(decision.effects.is_none());
    }

    #[test]
    fn pending_outcome_only_advances_a_fresh_intent() {
        let decision = decide(IntentStatus::Pending, EventOutcome::Pending);
        assert_eq!(decision.next, Some(IntentStatus::Processing));
        assert!(decision.effects.is_none());

        let decision = decide(IntentStatus::Processing, EventOutcome::Pending);
        assert_eq!(decision.next, None);
    }

    #[test]
    fn no_event_moves_a_terminal_intent() {
        for current in TERMINAL {
            for outcome in [
                EventOutcome::Succeeded,
                EventOutcome::Failed,
                EventOutcome::Pending,
            ] {
                let decision = decide(current, outcome);
                assert_eq!(decision.next, None, "{current:?} must not leave terminal");
                assert!(decision.effects.is_none());
            }
        }
    }
}

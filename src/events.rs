//! Domain events emitted at component boundaries
//!
//! Events are published after the owning transaction has committed, never
//! inside its lock scope. The core does not know who subscribes; the default
//! sink drops everything.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::types::{Allocation, AlertType, Amount};

/// Events consumed by notification/UI collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    EntryPosted {
        entry_id: String,
        entry_number: String,
        account_ids: Vec<String>,
        total: Amount,
    },
    PaymentAllocated {
        payment_id: String,
        allocations: Vec<Allocation>,
    },
    BudgetAlertRaised {
        alert_id: String,
        budget_id: String,
        alert_type: AlertType,
    },
}

/// Outbound event boundary. Implementations must not block; delivery
/// guarantees are the subscriber's problem.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Default sink that discards every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: DomainEvent) {}
}

/// Sink that records events in memory, for tests and diagnostics.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: DomainEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReferenceStatus;

    #[test]
    fn events_carry_a_type_tag() {
        let event = DomainEvent::BudgetAlertRaised {
            alert_id: "a1".to_string(),
            budget_id: "b1".to_string(),
            alert_type: AlertType::Critical,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BudgetAlertRaised");
        assert_eq!(json["alert_type"], "critical");

        let back: DomainEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn allocation_event_uses_wire_status_names() {
        let event = DomainEvent::PaymentAllocated {
            payment_id: "pay-1".to_string(),
            allocations: vec![Allocation {
                reference_id: "r1".to_string(),
                reference: "INV-001".to_string(),
                applied: 400,
                outstanding_after: 600,
                status_after: ReferenceStatus::PartiallyPaid,
            }],
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"PARTIALLY_PAID\""));

        let back: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}

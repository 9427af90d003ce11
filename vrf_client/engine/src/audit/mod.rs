//! Bounded in-memory record of the writes a client performed and the guards
//! that made it skip one.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tracing::info;

/// Type of ledger event being tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventType {
    ShareDealer,
    ShareRow,
    ShareSig,
    Ping,
    RequestRandom,
    /// A guard decided not to write.
    Skip,
}

impl AuditEventType {
    pub fn label(&self) -> &'static str {
        match self {
            AuditEventType::ShareDealer => "SHARE_DEALER",
            AuditEventType::ShareRow => "SHARE_ROW",
            AuditEventType::ShareSig => "SHARE_SIG",
            AuditEventType::Ping => "PING",
            AuditEventType::RequestRandom => "REQUEST_RANDOM",
            AuditEventType::Skip => "SKIP",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub event_type: AuditEventType,
    pub round: Option<u64>,
    pub detail: String,
    pub timestamp: String, // RFC3339
}

impl AuditRecord {
    pub fn new(event_type: AuditEventType, round: Option<u64>, detail: impl Into<String>) -> Self {
        AuditRecord {
            event_type,
            round,
            detail: detail.into(),
            timestamp: now_rfc3339(),
        }
    }
}

pub struct AuditTracker {
    records: Mutex<VecDeque<AuditRecord>>,
    max_entries: usize,
}

impl AuditTracker {
    pub fn new(max_entries: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(max_entries)),
            max_entries,
        }
    }

    /// Record a new event, evicting the oldest once full.
    pub fn log(&self, record: AuditRecord) {
        info!(
            event = record.event_type.label(),
            round = record.round,
            detail = %record.detail,
            "audit"
        );
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if self.max_entries > 0 && records.len() == self.max_entries {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn record(&self, event_type: AuditEventType, round: Option<u64>, detail: impl Into<String>) {
        self.log(AuditRecord::new(event_type, round, detail));
    }

    /// Most recent first.
    pub fn recent(&self, count: usize) -> Vec<AuditRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.iter().rev().take(count).cloned().collect()
    }

    pub fn count(&self, event_type: AuditEventType) -> usize {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.iter().filter(|r| r.event_type == event_type).count()
    }
}

impl Default for AuditTracker {
    fn default() -> Self {
        AuditTracker::new(500)
    }
}

/// Helper to get current timestamp as RFC3339 string
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_log_adds_and_retrieves() {
        let tracker = AuditTracker::new(10);
        tracker.record(AuditEventType::ShareDealer, None, "dealt 5 rows");

        let recent = tracker.recent(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event_type, AuditEventType::ShareDealer);
        assert_eq!(recent[0].detail, "dealt 5 rows");
        assert!(chrono::DateTime::parse_from_rfc3339(&recent[0].timestamp).is_ok());
    }

    #[test]
    fn test_audit_log_eviction() {
        let tracker = AuditTracker::new(3);
        for round in 0..5 {
            tracker.record(AuditEventType::ShareSig, Some(round), format!("signed round {round}"));
        }

        let recent = tracker.recent(5);
        assert_eq!(recent.len(), 3); // oldest two evicted
        assert_eq!(recent[0].round, Some(4));
        assert_eq!(recent[2].round, Some(2));
        assert_eq!(tracker.count(AuditEventType::ShareSig), 3);
    }

    #[test]
    fn test_audit_log_thread_safety() {
        let tracker = AuditTracker::new(100);
        std::thread::scope(|s| {
            for i in 0..10 {
                let tracker = &tracker;
                s.spawn(move || tracker.record(AuditEventType::Ping, Some(i), "ping"));
            }
        });
        assert_eq!(tracker.count(AuditEventType::Ping), 10);
    }
}

//! Per-stream sequence cursors shared by every projection.
//!
//! A projection remembers the last sequence number it applied for each
//! `(tenant, aggregate)` stream. Replays at or below the cursor are ignored,
//! which makes at-least-once delivery safe.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use schoolerp_core::{AggregateId, TenantId};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize {aggregate_type} event: {message}")]
    Deserialize {
        aggregate_type: &'static str,
        message: String,
    },
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// What to do with an incoming envelope.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CursorCheck {
    Apply,
    /// Already applied (duplicate delivery).
    Skip,
}

#[derive(Debug, Default)]
pub struct StreamCursors {
    last: RwLock<HashMap<(TenantId, AggregateId), u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        self.last
            .read()
            .ok()
            .and_then(|m| m.get(&(tenant_id, aggregate_id)).copied())
            .unwrap_or(0)
    }

    /// Gaps are only tolerated for a stream this projection has never seen.
    pub fn check(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        seq: u64,
    ) -> Result<CursorCheck, ProjectionError> {
        let last = self.position(tenant_id, aggregate_id);
        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(CursorCheck::Skip);
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        Ok(CursorCheck::Apply)
    }

    pub fn advance(&self, tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut m) = self.last.write() {
            m.insert((tenant_id, aggregate_id), seq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_skip_and_gaps_fail() {
        let cursors = StreamCursors::new();
        let (t, a) = (TenantId::new(), AggregateId::new());

        assert_eq!(cursors.check(t, a, 1).unwrap(), CursorCheck::Apply);
        cursors.advance(t, a, 1);
        assert_eq!(cursors.check(t, a, 1).unwrap(), CursorCheck::Skip);
        assert_eq!(cursors.check(t, a, 2).unwrap(), CursorCheck::Apply);
        assert!(matches!(
            cursors.check(t, a, 4),
            Err(ProjectionError::NonMonotonicSequence { last: 1, found: 4 })
        ));
        assert!(cursors.check(t, a, 0).is_err());
        assert_eq!(cursors.position(TenantId::new(), a), 0);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 128,
                ..ProptestConfig::default()
            })]

            /// Property: in-order delivery with repeats applies every position exactly once.
            #[test]
            fn repeated_delivery_applies_each_position_once(
                repeats in prop::collection::vec(1usize..4, 1..40),
            ) {
                let cursors = StreamCursors::new();
                let (t, a) = (TenantId::new(), AggregateId::new());
                let mut applied = Vec::new();

                for (i, times) in repeats.iter().enumerate() {
                    let seq = i as u64 + 1;
                    for _ in 0..*times {
                        if cursors.check(t, a, seq).unwrap() == CursorCheck::Apply {
                            applied.push(seq);
                            cursors.advance(t, a, seq);
                        }
                    }
                }

                let expected: Vec<u64> = (1..=repeats.len() as u64).collect();
                prop_assert_eq!(applied, expected);
                prop_assert_eq!(cursors.position(t, a), repeats.len() as u64);
            }

            /// Property: once a stream has a cursor, any jump past the next position fails.
            #[test]
            fn gaps_after_the_first_event_are_rejected(
                last in 1u64..1_000,
                gap in 2u64..50,
            ) {
                let cursors = StreamCursors::new();
                let (t, a) = (TenantId::new(), AggregateId::new());
                cursors.advance(t, a, last);

                let rejected = matches!(
                    cursors.check(t, a, last + gap),
                    Err(ProjectionError::NonMonotonicSequence { .. })
                );
                prop_assert!(rejected);
                prop_assert_eq!(cursors.check(t, a, last + 1).unwrap(), CursorCheck::Apply);
                prop_assert_eq!(cursors.position(t, a), last);
            }
        }
    }
}

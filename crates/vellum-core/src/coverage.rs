//! Coverage Algebra
//!
//! Pure functions over summary id ranges: no I/O, no suspension, no failure
//! path. Range semantics are inclusive on both endpoints, compared using
//! lexicographic id ordering.

use crate::id::Id;
use crate::temporal::{MessageRecord, SummaryRecord};

/// Does any summary's `[start_id, end_id]` contain `msg_id`?
pub fn covers(msg_id: &Id, summaries: &[SummaryRecord]) -> bool {
    summaries
        .iter()
        .any(|s| &s.start_id <= msg_id && msg_id <= &s.end_id)
}

/// Is `s` strictly contained in some higher-order summary's range?
pub fn subsumed(s: &SummaryRecord, summaries: &[SummaryRecord]) -> bool {
    summaries.iter().any(|t| {
        t.id != s.id
            && t.order_num > s.order_num
            && t.start_id <= s.start_id
            && t.end_id >= s.end_id
    })
}

/// The subset of `summaries` not subsumed by any other summary in the set.
pub fn effective_summaries(summaries: &[SummaryRecord]) -> Vec<SummaryRecord> {
    summaries
        .iter()
        .filter(|s| !subsumed(s, summaries))
        .cloned()
        .collect()
}

/// Messages not covered by any summary in `summaries`.
pub fn uncovered_messages<'a>(
    messages: &'a [MessageRecord],
    summaries: &[SummaryRecord],
) -> Vec<&'a MessageRecord> {
    messages.iter().filter(|m| !covers(&m.id, summaries)).collect()
}

/// A gap between `after` and `before` (exclusive) left uncovered by any
/// summary in `summaries`, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gap {
    pub after: Option<Id>,
    pub before: Option<Id>,
}

/// Contiguous ranges of message ids, drawn from `msg_range` (if given,
/// otherwise inferred from the summaries' own extent), that no summary
/// covers.
pub fn gaps(summaries: &[SummaryRecord], msg_range: Option<(&Id, &Id)>) -> Vec<Gap> {
    let effective = effective_summaries(summaries);
    if effective.is_empty() {
        return match msg_range {
            Some((lo, hi)) => vec![Gap {
                after: Some(lo.clone()),
                before: Some(hi.clone()),
            }],
            None => Vec::new(),
        };
    }

    let mut sorted: Vec<&SummaryRecord> = effective.iter().collect();
    sorted.sort_by(|a, b| a.start_id.cmp(&b.start_id));

    let mut out = Vec::new();

    if let Some((lo, _)) = msg_range {
        if lo < &sorted[0].start_id {
            out.push(Gap {
                after: Some(lo.clone()),
                before: Some(sorted[0].start_id.clone()),
            });
        }
    }

    for window in sorted.windows(2) {
        let (prev, next) = (window[0], window[1]);
        if prev.end_id < next.start_id {
            out.push(Gap {
                after: Some(prev.end_id.clone()),
                before: Some(next.start_id.clone()),
            });
        }
    }

    if let Some((_, hi)) = msg_range {
        let last = sorted.last().unwrap();
        if &last.end_id < hi {
            out.push(Gap {
                after: Some(last.end_id.clone()),
                before: Some(hi.clone()),
            });
        }
    }

    out
}

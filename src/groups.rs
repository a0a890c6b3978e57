//! Pure grouping/rendering-data builder: date groups and sender bursts derived
//! from the raw thread collection. No I/O, linear in thread size, recomputed on
//! every thread mutation.

use chrono::{Local, NaiveDate, TimeZone};

use crate::state::Message;

/// Consecutive same-sender messages closer together than this form one burst.
pub const BURST_GAP_SECS: i64 = 60;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DateGroup {
    /// Local calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub entries: Vec<BurstEntry>,
}

/// Per-message render flags used for bubble-corner and avatar decisions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BurstEntry {
    pub message_id: String,
    pub sender_id: String,
    pub is_first_in_burst: bool,
    pub is_last_in_burst: bool,
}

fn local_date(ts: i64) -> NaiveDate {
    Local
        .timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

fn same_burst(earlier: &Message, later: &Message) -> bool {
    earlier.sender_id == later.sender_id
        && later.created_at - earlier.created_at < BURST_GAP_SECS
        && local_date(earlier.created_at) == local_date(later.created_at)
}

/// Partition an ascending-ordered thread into date groups, and each date group
/// into sender bursts. A gap of `BURST_GAP_SECS` or more, a sender change, or a
/// date boundary ends the burst.
pub fn build_groups(messages: &[Message]) -> Vec<DateGroup> {
    let mut groups: Vec<DateGroup> = Vec::new();
    let mut current_date: Option<NaiveDate> = None;

    for (i, message) in messages.iter().enumerate() {
        let date = local_date(message.created_at);
        if current_date != Some(date) {
            groups.push(DateGroup {
                date: date.format("%Y-%m-%d").to_string(),
                entries: vec![],
            });
            current_date = Some(date);
        }

        let continues_prev = i
            .checked_sub(1)
            .and_then(|p| messages.get(p))
            .map(|prev| same_burst(prev, message))
            .unwrap_or(false);
        let continues_next = messages
            .get(i + 1)
            .map(|next| same_burst(message, next))
            .unwrap_or(false);

        if let Some(group) = groups.last_mut() {
            group.entries.push(BurstEntry {
                message_id: message.id.clone(),
                sender_id: message.sender_id.clone(),
                is_first_in_burst: !continues_prev,
                is_last_in_burst: !continues_next,
            });
        }
    }

    groups
}

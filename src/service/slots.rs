//! Free-slot computation.
//!
//! The working window is tiled into back-to-back slots of the configured
//! length; a slot is free when it overlaps no busy interval. Slots that only
//! partially collide with a busy interval are dropped whole, and a trailing
//! period shorter than one slot is never emitted.

use chrono::{FixedOffset, NaiveDate};

use crate::models::interval::{Interval, overlaps};
use crate::models::window::WorkingWindow;

pub fn generate_free_slots(window: &WorkingWindow, busy: &[Interval]) -> Vec<Interval> {
    let delta = window.slot_length();
    let window_end = window.end();
    let mut pointer = window.start();
    let mut slots = Vec::new();

    while pointer + delta <= window_end {
        let candidate = Interval::from_ordered(pointer, pointer + delta);
        if !busy.iter().any(|b| overlaps(&candidate, b)) {
            slots.push(candidate);
        }
        pointer = pointer + delta;
    }

    slots
}

/// Start and end as `HH:MM` stamps at the given offset.
pub fn format_slot(slot: &Interval, offset: &FixedOffset) -> String {
    format!(
        "{} — {}",
        slot.start().with_timezone(offset).format("%H:%M"),
        slot.end().with_timezone(offset).format("%H:%M")
    )
}

pub fn render_slot_list(day: NaiveDate, slots: &[Interval], offset: &FixedOffset) -> String {
    if slots.is_empty() {
        return "No free slots.".to_string();
    }
    let mut body = format!("Free slots for {}:", day.format("%Y-%m-%d"));
    for slot in slots {
        body.push_str(&format!("\n- {}", format_slot(slot, offset)));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};

    fn plus_three() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    fn at(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        plus_three().with_ymd_and_hms(2025, 8, 2, hour, minute, 0).unwrap()
    }

    #[test]
    fn format_slot_uses_wall_clock_of_offset() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let slot = Interval::new(
            utc.with_ymd_and_hms(2025, 8, 2, 6, 0, 0).unwrap(),
            utc.with_ymd_and_hms(2025, 8, 2, 6, 30, 0).unwrap(),
        )
        .unwrap();
        assert_eq!(format_slot(&slot, &plus_three()), "09:00 — 09:30");
    }

    #[test]
    fn render_lists_each_slot() {
        let day = NaiveDate::from_ymd_opt(2025, 8, 2).unwrap();
        let slots = vec![
            Interval::new(at(9, 0), at(9, 30)).unwrap(),
            Interval::new(at(11, 0), at(11, 30)).unwrap(),
        ];
        assert_eq!(
            render_slot_list(day, &slots, &plus_three()),
            "Free slots for 2025-08-02:\n- 09:00 — 09:30\n- 11:00 — 11:30"
        );
    }

    #[test]
    fn render_empty_list() {
        let day = NaiveDate::from_ymd_opt(2025, 8, 2).unwrap();
        assert_eq!(render_slot_list(day, &[], &plus_three()), "No free slots.");
    }
}

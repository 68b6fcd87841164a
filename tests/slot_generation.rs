use calendarBot::models::interval::{Interval, overlaps};
use calendarBot::models::window::WorkingWindow;
use calendarBot::service::slots::{format_slot, generate_free_slots};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone};

fn offset() -> FixedOffset {
    FixedOffset::east_opt(3 * 3600).unwrap()
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 2).unwrap()
}

fn at(hour: u32, minute: u32) -> DateTime<FixedOffset> {
    offset().with_ymd_and_hms(2025, 8, 2, hour, minute, 0).unwrap()
}

fn busy(sh: u32, sm: u32, eh: u32, em: u32) -> Interval {
    Interval::new(at(sh, sm), at(eh, em)).unwrap()
}

fn window(start_hour: u32, end_hour: u32, slot_minutes: u32) -> WorkingWindow {
    WorkingWindow::new(day(), start_hour, end_hour, slot_minutes, offset()).unwrap()
}

fn labels(slots: &[Interval]) -> Vec<String> {
    slots.iter().map(|s| format_slot(s, &offset())).collect()
}

#[test]
fn empty_busy_set_tiles_the_whole_window() {
    for (start, end, minutes) in [(9, 18, 30), (9, 18, 45), (0, 24, 60), (8, 9, 7), (10, 17, 50)] {
        let slots = generate_free_slots(&window(start, end, minutes), &[]);
        let expected = ((end - start) * 60 / minutes) as usize;
        assert_eq!(slots.len(), expected, "{}..{} by {}", start, end, minutes);

        for slot in &slots {
            assert_eq!(slot.end() - slot.start(), Duration::minutes(i64::from(minutes)));
        }
        for pair in slots.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start());
        }
        if let Some(first) = slots.first() {
            assert_eq!(first.start(), window(start, end, minutes).start());
        }
    }
}

#[test]
fn busy_interval_covering_the_window_leaves_nothing() {
    let slots = generate_free_slots(&window(9, 18, 30), &[busy(8, 0, 19, 0)]);
    assert!(slots.is_empty());

    let exact = generate_free_slots(&window(9, 18, 30), &[busy(9, 0, 18, 0)]);
    assert!(exact.is_empty());
}

#[test]
fn busy_hour_removes_two_slots() {
    let slots = generate_free_slots(&window(9, 18, 30), &[busy(10, 0, 11, 0)]);
    let labels = labels(&slots);

    assert_eq!(slots.len(), 16);
    assert_eq!(labels[0], "09:00 — 09:30");
    assert_eq!(labels[1], "09:30 — 10:00");
    assert_eq!(labels[2], "11:00 — 11:30");
    assert_eq!(labels.last().map(String::as_str), Some("17:30 — 18:00"));
    assert!(!labels.iter().any(|l| l.starts_with("10:")));
}

#[test]
fn trailing_partial_period_is_dropped() {
    // 60 minutes tiled by 40: the last 20 minutes never form a slot
    let slots = generate_free_slots(&window(9, 10, 40), &[]);
    assert_eq!(labels(&slots), vec!["09:00 — 09:40"]);

    // 09:00-09:50 usable, 30 minute slots: only 09:00-09:30 fits
    let slots = generate_free_slots(&window(9, 10, 30), &[busy(9, 50, 10, 0)]);
    assert_eq!(labels(&slots), vec!["09:00 — 09:30"]);
}

#[test]
fn partially_overlapped_slot_is_excluded_whole() {
    let slots = generate_free_slots(&window(9, 11, 30), &[busy(9, 45, 9, 50)]);
    assert_eq!(labels(&slots), vec!["09:00 — 09:30", "10:00 — 10:30", "10:30 — 11:00"]);
}

#[test]
fn touching_busy_intervals_do_not_block() {
    let slots = generate_free_slots(&window(9, 11, 30), &[busy(8, 0, 9, 0), busy(11, 0, 12, 0)]);
    assert_eq!(slots.len(), 4);
}

#[test]
fn overlapping_busy_entries_are_tolerated() {
    let busy_set = vec![
        busy(12, 0, 13, 0),
        busy(12, 30, 13, 30),
        busy(12, 0, 13, 0),
    ];
    let slots = generate_free_slots(&window(9, 18, 30), &busy_set);
    assert_eq!(slots.len(), 18 - 3);
    assert!(slots.iter().all(|s| busy_set.iter().all(|b| !overlaps(s, b))));
}

#[test]
fn slot_longer_than_window_yields_nothing() {
    let slots = generate_free_slots(&window(9, 10, 90), &[]);
    assert!(slots.is_empty());
}

#[test]
fn busy_intervals_in_other_offsets_are_respected() {
    let utc = FixedOffset::east_opt(0).unwrap();
    // 07:00Z..08:00Z is 10:00..11:00 at +03:00
    let busy_utc = Interval::new(
        utc.with_ymd_and_hms(2025, 8, 2, 7, 0, 0).unwrap(),
        utc.with_ymd_and_hms(2025, 8, 2, 8, 0, 0).unwrap(),
    )
    .unwrap();
    let slots = generate_free_slots(&window(9, 18, 30), &[busy_utc]);
    assert_eq!(slots.len(), 16);
}

#[test]
fn generation_is_idempotent() {
    let window = window(9, 18, 30);
    let busy_set = vec![busy(10, 0, 11, 0), busy(14, 15, 14, 45)];
    let first = generate_free_slots(&window, &busy_set);
    let second = generate_free_slots(&window, &busy_set);
    assert_eq!(first, second);
}

#[test]
fn every_free_slot_lies_inside_the_window() {
    let window = window(9, 18, 25);
    let slots = generate_free_slots(&window, &[busy(13, 0, 14, 0)]);
    assert!(slots.iter().all(|s| s.start() >= window.start() && s.end() <= window.end()));
    assert!(slots.windows(2).all(|p| p[0].start() < p[1].start()));
}

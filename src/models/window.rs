use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone};

use crate::error::SlotError;

/// Working hours of a single day, tiled into fixed-length slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingWindow {
    slot_minutes: u32,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

impl WorkingWindow {
    /// Requires `start_hour < end_hour <= 24` and `slot_minutes > 0`.
    /// Hours are wall-clock hours at `offset`; `end_hour == 24` is the next midnight.
    pub fn new(
        day: NaiveDate,
        start_hour: u32,
        end_hour: u32,
        slot_minutes: u32,
        offset: FixedOffset,
    ) -> Result<Self, SlotError> {
        if start_hour >= end_hour || end_hour > 24 {
            return Err(SlotError::InvalidWindow(format!(
                "hours must satisfy 0 <= start < end <= 24, got {}..{}",
                start_hour, end_hour
            )));
        }
        if slot_minutes == 0 {
            return Err(SlotError::InvalidWindow(
                "slot length must be positive".to_string(),
            ));
        }

        let midnight = offset
            .from_local_datetime(&day.and_time(NaiveTime::MIN))
            .single()
            .ok_or_else(|| SlotError::InvalidWindow(format!("{} has no local midnight", day)))?;

        Ok(Self {
            slot_minutes,
            start: midnight + Duration::hours(i64::from(start_hour)),
            end: midnight + Duration::hours(i64::from(end_hour)),
        })
    }

    pub fn slot_length(&self) -> Duration {
        Duration::minutes(i64::from(self.slot_minutes))
    }

    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    pub fn end(&self) -> DateTime<FixedOffset> {
        self.end
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use tracing::{debug, info};

use crate::config::SchedulingPolicy;
use crate::error::CalendarError;
use crate::models::event::EventRecord;
use crate::models::interval::Interval;
use crate::models::window::WorkingWindow;
use crate::service::slots::generate_free_slots;

/// Remote calendar: busy intervals for a day and event creation.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    async fn fetch_busy_intervals(
        &self,
        day: NaiveDate,
        window_start: DateTime<FixedOffset>,
        window_end: DateTime<FixedOffset>,
    ) -> Result<Vec<Interval>, CalendarError>;

    async fn create_event(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        attendee_email: &str,
    ) -> Result<EventRecord, CalendarError>;
}

pub fn ensure_event_range(
    start: &DateTime<FixedOffset>,
    end: &DateTime<FixedOffset>,
) -> Result<(), CalendarError> {
    if end <= start {
        return Err(CalendarError::InvalidEventRange {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
        });
    }
    Ok(())
}

pub struct CalendarService {
    gateway: Arc<dyn CalendarGateway>,
    policy: SchedulingPolicy,
}

impl CalendarService {
    pub fn new(gateway: Arc<dyn CalendarGateway>, policy: SchedulingPolicy) -> Self {
        Self { gateway, policy }
    }

    pub fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    pub fn window_for(&self, day: NaiveDate) -> Result<WorkingWindow, CalendarError> {
        Ok(WorkingWindow::new(
            day,
            self.policy.start_hour,
            self.policy.end_hour,
            self.policy.slot_minutes,
            self.policy.offset,
        )?)
    }

    pub async fn free_slots(&self, day: NaiveDate) -> Result<Vec<Interval>, CalendarError> {
        let window = self.window_for(day)?;
        let busy = self
            .gateway
            .fetch_busy_intervals(day, window.start(), window.end())
            .await?;
        debug!(%day, busy = busy.len(), "fetched busy intervals");
        let slots = generate_free_slots(&window, &busy);
        info!(%day, free = slots.len(), "computed free slots");
        Ok(slots)
    }

    pub async fn create_event(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        attendee_email: &str,
    ) -> Result<EventRecord, CalendarError> {
        ensure_event_range(&start, &end)?;
        let record = self.gateway.create_event(start, end, attendee_email).await?;
        info!(event_id = %record.id, "created calendar event");
        Ok(record)
    }
}

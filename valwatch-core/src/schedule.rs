use std::collections::BTreeSet;

use chrono::{NaiveDateTime, Timelike};

/// Wall-clock hours at which a source gets checked, and when it last was.
///
/// The poller ticks more often than once an hour; a source is due at most
/// once per check hour.
#[derive(Debug, Clone, Default)]
pub struct CheckSchedule {
    hours: BTreeSet<u32>,
    last_check: Option<NaiveDateTime>,
}

impl CheckSchedule {
    pub fn new(hours: impl IntoIterator<Item = u32>) -> Self {
        Self {
            hours: hours.into_iter().filter(|h| *h < 24).collect(),
            last_check: None,
        }
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        if !self.hours.contains(&now.hour()) {
            return false;
        }
        match self.last_check {
            None => true,
            Some(last) => last.date() != now.date() || last.hour() != now.hour(),
        }
    }

    pub fn mark(&mut self, now: NaiveDateTime) {
        self.last_check = Some(now);
    }

    pub fn last_check(&self) -> Option<NaiveDateTime> {
        self.last_check
    }
}

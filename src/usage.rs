//! Monthly API usage tracking against the free-tier ceilings.
//!
//! The Twitter/X free tier caps posts and reads per calendar month. The tracker
//! keeps in-memory counters for the current month, warns as they approach and
//! pass their ceilings, and zeroes them all when the month rolls over.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use log::{info, warn};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::UsageLimits;

/// Share of a ceiling at which the first warning is logged.
const APPROACHING_PERCENT: u64 = 80;

/// The kind of API call being counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageKind {
    AppPost,
    UserPost,
    Read,
}

impl UsageKind {
    fn label(self) -> &'static str {
        match self {
            UsageKind::AppPost => "APP POST",
            UsageKind::UserPost => "USER POST",
            UsageKind::Read => "READ",
        }
    }
}

/// Warning raised by [`UsageTracker::record`] when a counter hits a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageAlert {
    /// The counter just crossed 80% of its ceiling.
    Approaching,
    /// The counter just reached its ceiling.
    Reached,
    /// The counter is past its ceiling.
    Exceeded,
}

/// Calendar month used to stamp the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct MonthStamp {
    year: i32,
    month: u32,
}

impl MonthStamp {
    fn of(now: DateTime<Utc>) -> Self {
        Self {
            year: now.year(),
            month: now.month(),
        }
    }

    fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }
}

#[derive(Debug)]
struct Counters {
    month: MonthStamp,
    app_posts: u64,
    user_posts: u64,
    reads: u64,
}

impl Counters {
    fn slot(&mut self, kind: UsageKind) -> &mut u64 {
        match kind {
            UsageKind::AppPost => &mut self.app_posts,
            UsageKind::UserPost => &mut self.user_posts,
            UsageKind::Read => &mut self.reads,
        }
    }

    /// Zeroes every counter if `now` falls in a later month than the stamp.
    fn roll_over(&mut self, now: DateTime<Utc>) -> bool {
        let current = MonthStamp::of(now);
        if current > self.month {
            info!("Resetting monthly usage counters");
            self.month = current;
            self.app_posts = 0;
            self.user_posts = 0;
            self.reads = 0;
            true
        } else {
            false
        }
    }
}

/// Point-in-time view of the counters, as served by `GET /system/usage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub reads_this_month: u64,
    pub posts_this_month_app: u64,
    pub posts_this_month_user: u64,
    pub reads_remaining: u64,
    pub posts_remaining_app: u64,
    pub posts_remaining_user: u64,
    pub limits: UsageLimits,
    /// First day of the accounting month (ISO 8601).
    pub last_reset: String,
}

/// Thread-safe monthly usage counter.
#[derive(Debug)]
pub struct UsageTracker {
    limits: UsageLimits,
    counters: Mutex<Counters>,
}

impl UsageTracker {
    pub fn new(limits: UsageLimits) -> Self {
        Self::starting_at(limits, Utc::now())
    }

    /// Creates a tracker whose accounting month is the one containing `now`.
    pub fn starting_at(limits: UsageLimits, now: DateTime<Utc>) -> Self {
        Self {
            limits,
            counters: Mutex::new(Counters {
                month: MonthStamp::of(now),
                app_posts: 0,
                user_posts: 0,
                reads: 0,
            }),
        }
    }

    pub fn limits(&self) -> UsageLimits {
        self.limits
    }

    /// Counts one call of `kind` in the current month.
    pub fn record(&self, kind: UsageKind) -> Option<UsageAlert> {
        self.record_at(kind, Utc::now())
    }

    /// Counts one call of `kind` as if it happened at `now`.
    pub fn record_at(&self, kind: UsageKind, now: DateTime<Utc>) -> Option<UsageAlert> {
        let mut counters = self.lock();
        counters.roll_over(now);
        let slot = counters.slot(kind);
        *slot += 1;
        let count = *slot;
        drop(counters);

        let ceiling = self.ceiling(kind);
        let alert = alert_for(count, ceiling);
        match alert {
            Some(UsageAlert::Approaching) => warn!(
                "FREE TIER {} USAGE AT {}%: {} of {} per month",
                kind.label(),
                APPROACHING_PERCENT,
                count,
                ceiling
            ),
            Some(UsageAlert::Reached) => warn!(
                "FREE TIER {} LIMIT REACHED: {} per month",
                kind.label(),
                ceiling
            ),
            Some(UsageAlert::Exceeded) => warn!(
                "FREE TIER {} LIMIT EXCEEDED: {} of {} per month",
                kind.label(),
                count,
                ceiling
            ),
            None => {}
        }
        alert
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        self.snapshot_at(Utc::now())
    }

    /// Returns the counters as seen at `now`, rolling the month over first.
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> UsageSnapshot {
        let mut counters = self.lock();
        counters.roll_over(now);
        let last_reset = counters
            .month
            .first_day()
            .map(|d| d.format("%Y-%m-%dT00:00:00Z").to_string())
            .unwrap_or_default();

        UsageSnapshot {
            reads_this_month: counters.reads,
            posts_this_month_app: counters.app_posts,
            posts_this_month_user: counters.user_posts,
            reads_remaining: self.limits.reads.saturating_sub(counters.reads),
            posts_remaining_app: self.limits.app_posts.saturating_sub(counters.app_posts),
            posts_remaining_user: self.limits.user_posts.saturating_sub(counters.user_posts),
            limits: self.limits,
            last_reset,
        }
    }

    fn ceiling(&self, kind: UsageKind) -> u64 {
        match kind {
            UsageKind::AppPost => self.limits.app_posts,
            UsageKind::UserPost => self.limits.user_posts,
            UsageKind::Read => self.limits.reads,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decides which alert, if any, a counter that just became `count` raises.
fn alert_for(count: u64, ceiling: u64) -> Option<UsageAlert> {
    if count > ceiling {
        return Some(UsageAlert::Exceeded);
    }
    if count == ceiling {
        return Some(UsageAlert::Reached);
    }
    // Smallest count that is at least 80% of the ceiling.
    let threshold = (ceiling * APPROACHING_PERCENT).div_ceil(100);
    if threshold > 0 && count == threshold {
        Some(UsageAlert::Approaching)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    fn small_limits() -> UsageLimits {
        UsageLimits {
            app_posts: 10,
            user_posts: 10,
            reads: 5,
        }
    }

    #[test]
    fn test_snapshot_counts_every_record_in_month() {
        let tracker = UsageTracker::starting_at(UsageLimits::default(), at(2026, 3, 1));
        let kinds = [
            UsageKind::Read,
            UsageKind::AppPost,
            UsageKind::Read,
            UsageKind::UserPost,
            UsageKind::AppPost,
            UsageKind::Read,
        ];
        for (i, kind) in kinds.iter().enumerate() {
            tracker.record_at(*kind, at(2026, 3, 1 + i as u32));
        }

        let snapshot = tracker.snapshot_at(at(2026, 3, 20));
        assert_eq!(snapshot.reads_this_month, 3);
        assert_eq!(snapshot.posts_this_month_app, 2);
        assert_eq!(snapshot.posts_this_month_user, 1);
        assert_eq!(snapshot.reads_remaining, 97);
        assert_eq!(snapshot.posts_remaining_app, 498);
        assert_eq!(snapshot.posts_remaining_user, 499);
        assert_eq!(snapshot.last_reset, "2026-03-01T00:00:00Z");
    }

    #[test]
    fn test_counters_reset_once_per_month_transition() {
        let tracker = UsageTracker::starting_at(small_limits(), at(2026, 1, 30));
        tracker.record_at(UsageKind::Read, at(2026, 1, 30));
        tracker.record_at(UsageKind::AppPost, at(2026, 1, 31));

        // First call in February zeroes everything, then counts itself.
        tracker.record_at(UsageKind::Read, at(2026, 2, 1));
        tracker.record_at(UsageKind::Read, at(2026, 2, 2));
        tracker.record_at(UsageKind::Read, at(2026, 2, 27));

        let snapshot = tracker.snapshot_at(at(2026, 2, 28));
        assert_eq!(snapshot.reads_this_month, 3);
        assert_eq!(snapshot.posts_this_month_app, 0);
        assert_eq!(snapshot.last_reset, "2026-02-01T00:00:00Z");
    }

    #[test]
    fn test_snapshot_alone_triggers_rollover() {
        let tracker = UsageTracker::starting_at(small_limits(), at(2026, 12, 15));
        tracker.record_at(UsageKind::UserPost, at(2026, 12, 31));

        let snapshot = tracker.snapshot_at(at(2027, 1, 1));
        assert_eq!(snapshot.posts_this_month_user, 0);
        assert_eq!(snapshot.posts_remaining_user, 10);
        assert_eq!(snapshot.last_reset, "2027-01-01T00:00:00Z");
    }

    #[test]
    fn test_out_of_order_timestamps_do_not_reset() {
        let tracker = UsageTracker::starting_at(small_limits(), at(2026, 5, 10));
        tracker.record_at(UsageKind::Read, at(2026, 5, 10));
        // A clock that steps backwards must not wipe the current month.
        tracker.record_at(UsageKind::Read, at(2026, 4, 30));

        assert_eq!(tracker.snapshot_at(at(2026, 5, 11)).reads_this_month, 2);
    }

    #[test]
    fn test_alerts_at_eighty_and_hundred_percent() {
        let tracker = UsageTracker::starting_at(small_limits(), at(2026, 6, 1));
        let now = at(2026, 6, 2);
        let alerts: Vec<Option<UsageAlert>> = (0..7)
            .map(|_| tracker.record_at(UsageKind::Read, now))
            .collect();

        assert_eq!(
            alerts,
            vec![
                None,
                None,
                None,
                Some(UsageAlert::Approaching),
                Some(UsageAlert::Reached),
                Some(UsageAlert::Exceeded),
                Some(UsageAlert::Exceeded),
            ]
        );
        let snapshot = tracker.snapshot_at(now);
        assert_eq!(snapshot.reads_this_month, 7);
        assert_eq!(snapshot.reads_remaining, 0);
    }

    #[test]
    fn test_alert_thresholds() {
        assert_eq!(alert_for(399, 500), None);
        assert_eq!(alert_for(400, 500), Some(UsageAlert::Approaching));
        assert_eq!(alert_for(401, 500), None);
        assert_eq!(alert_for(500, 500), Some(UsageAlert::Reached));
        assert_eq!(alert_for(501, 500), Some(UsageAlert::Exceeded));
        // 80% of 3 rounds up to 3, which is the ceiling itself.
        assert_eq!(alert_for(3, 3), Some(UsageAlert::Reached));
        assert_eq!(alert_for(1, 0), Some(UsageAlert::Exceeded));
    }
}

//! Cron scheduling for the daily digest.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::error::{Error, Result};
use crate::ops::Operations;

use super::{run_digest, DigestSink};

/// Once-a-day trigger at a local time in a fixed timezone.
#[derive(Debug, Clone)]
pub struct DigestSchedule {
    cron: String,
    timezone: Tz,
    schedule: Schedule,
}

impl DigestSchedule {
    /// Daily at `time` (HH:MM) in IANA `timezone`.
    pub fn daily(time: &str, timezone: &str) -> Result<Self> {
        let (hour, minute) = time
            .split_once(':')
            .ok_or_else(|| Error::Config("Invalid digest time format. Use HH:MM".to_string()))?;
        let hour: u32 = hour
            .parse()
            .map_err(|_| Error::Config(format!("Invalid digest hour: {}", hour)))?;
        let minute: u32 = minute
            .parse()
            .map_err(|_| Error::Config(format!("Invalid digest minute: {}", minute)))?;
        if hour > 23 || minute > 59 {
            return Err(Error::Config(
                "Invalid digest time. Hour must be 0-23, minute 0-59".to_string(),
            ));
        }

        let timezone = Tz::from_str(timezone)
            .map_err(|e| Error::Config(format!("Invalid digest timezone {}: {}", timezone, e)))?;

        // sec min hour day-of-month month day-of-week
        let cron = format!("0 {} {} * * *", minute, hour);
        let schedule = Schedule::from_str(&cron)
            .map_err(|e| Error::Config(format!("Invalid cron expression: {}", e)))?;

        Ok(Self {
            cron,
            timezone,
            schedule,
        })
    }

    pub fn cron(&self) -> &str {
        &self.cron
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&self.timezone);
        self.schedule
            .after(&local)
            .next()
            .map(|next| next.with_timezone(&Utc))
    }
}

/// Background loop sending the digest on schedule.
pub struct DigestScheduler<S> {
    schedule: DigestSchedule,
    ops: Arc<Operations>,
    sink: Arc<S>,
}

impl<S> DigestScheduler<S>
where
    S: DigestSink + 'static,
{
    pub fn new(schedule: DigestSchedule, ops: Arc<Operations>, sink: Arc<S>) -> Self {
        Self {
            schedule,
            ops,
            sink,
        }
    }

    pub fn spawn(self, ready: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(ready))
    }

    /// Wait until the connection reports ready, then fire once per day until
    /// the ready channel closes.
    pub async fn run(self, mut ready: watch::Receiver<bool>) {
        if ready.wait_for(|is_ready| *is_ready).await.is_err() {
            tracing::debug!("Connection closed before ready; digest scheduler not started");
            return;
        }
        tracing::info!(
            "Digest scheduler started ({} {})",
            self.schedule.cron(),
            self.schedule.timezone()
        );

        let mut last_fire: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            let after = last_fire.map_or(now, |last| last.max(now));
            let Some(next) = self.schedule.next_after(after) else {
                tracing::warn!("Digest schedule has no upcoming run; stopping");
                return;
            };
            tracing::debug!("Next digest at {}", next);

            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            sleep(wait).await;
            last_fire = Some(next);

            match run_digest(self.ops.as_ref(), self.sink.as_ref()).await {
                Ok(outcome) => tracing::debug!("Digest run finished: {:?}", outcome),
                Err(e) => tracing::error!("Digest run failed: {}", e),
            }

            if ready.has_changed().is_err() {
                tracing::debug!("Connection closed; digest scheduler stopping");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::testing::RecordingSink;
    use crate::store::{ChatTarget, Store};
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn parses_daily_time() {
        let schedule = DigestSchedule::daily("09:00", "America/Chicago").unwrap();
        assert_eq!(schedule.cron(), "0 0 9 * * *");
        assert!(DigestSchedule::daily("9", "America/Chicago").is_err());
        assert!(DigestSchedule::daily("24:00", "America/Chicago").is_err());
        assert!(DigestSchedule::daily("09:60", "America/Chicago").is_err());
        assert!(DigestSchedule::daily("09:00", "Nowhere/Town").is_err());
    }

    #[test]
    fn fires_at_local_time_across_dst() {
        let schedule = DigestSchedule::daily("09:00", "America/Chicago").unwrap();

        // January: CST, UTC-6.
        let before = Utc.with_ymd_and_hms(2026, 1, 15, 14, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(before),
            Some(Utc.with_ymd_and_hms(2026, 1, 15, 15, 0, 0).unwrap())
        );
        let after = Utc.with_ymd_and_hms(2026, 1, 15, 16, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(after),
            Some(Utc.with_ymd_and_hms(2026, 1, 16, 15, 0, 0).unwrap())
        );

        // July: CDT, UTC-5.
        let summer = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(summer),
            Some(Utc.with_ymd_and_hms(2026, 7, 1, 14, 0, 0).unwrap())
        );
    }

    #[test]
    fn fire_time_is_exclusive() {
        let schedule = DigestSchedule::daily("09:00", "UTC").unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(at),
            Some(Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_ready_before_firing() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("dues.db")).unwrap();
        let ops = Arc::new(Operations::new(store, Duration::from_secs(30)));
        ops.set_task_channel(&ChatTarget::Id(-100)).unwrap();

        let mut sink = RecordingSink::default();
        sink.cached.insert(ChatTarget::Id(-100));
        let sink = Arc::new(sink);

        let schedule = DigestSchedule::daily("09:00", "UTC").unwrap();
        let (ready_tx, ready_rx) = watch::channel(false);
        let handle = DigestScheduler::new(schedule, Arc::clone(&ops), Arc::clone(&sink)).spawn(ready_rx);

        sleep(Duration::from_secs(3 * 24 * 3600)).await;
        assert_eq!(sink.sent_count(), 0);

        ready_tx.send(true).unwrap();
        sleep(Duration::from_secs(25 * 3600)).await;
        assert!(sink.sent_count() >= 1);

        drop(ready_tx);
        handle.abort();
    }
}

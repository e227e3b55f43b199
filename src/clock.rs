use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocalTimeError {
    #[error("{0} does not exist in {1}, the clocks skip it")]
    Skipped(NaiveDateTime, Tz),

    #[error("{0} happens twice in {1}, the clocks go back over it")]
    Ambiguous(NaiveDateTime, Tz),
}

/// Source of the deployment's wall-clock time.
///
/// Due times are naive local times in [`Clock::timezone`]. Delays are always measured
/// between absolute instants so a clock change between now and the due time is honored.
pub trait Clock: Send + Sync + 'static {
    fn timezone(&self) -> Tz;

    fn now_utc(&self) -> DateTime<Utc>;

    fn now(&self) -> NaiveDateTime {
        self.now_utc().with_timezone(&self.timezone()).naive_local()
    }

    /// The single instant a local time denotes.
    fn resolve(&self, local: &NaiveDateTime) -> Result<DateTime<Utc>, LocalTimeError> {
        let timezone = self.timezone();
        match timezone.from_local_datetime(local) {
            LocalResult::Single(time) => Ok(time.with_timezone(&Utc)),
            LocalResult::Ambiguous(_, _) => Err(LocalTimeError::Ambiguous(*local, timezone)),
            LocalResult::None => Err(LocalTimeError::Skipped(*local, timezone)),
        }
    }

    /// Like [`Clock::resolve`], but never fails. An ambiguous time maps to its later
    /// occurrence; a skipped time maps to the same wall time an hour on.
    fn resolve_lenient(&self, local: &NaiveDateTime) -> DateTime<Utc> {
        let timezone = self.timezone();
        match timezone.from_local_datetime(local) {
            LocalResult::Single(time) | LocalResult::Ambiguous(_, time) => time.with_timezone(&Utc),
            LocalResult::None => timezone
                .from_local_datetime(&(*local + chrono::Duration::hours(1)))
                .latest()
                .map(|time| time.with_timezone(&Utc))
                .unwrap_or_else(|| local.and_utc()),
        }
    }
}

pub struct SystemClock {
    timezone: Tz,
}

impl SystemClock {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Clock for SystemClock {
    fn timezone(&self) -> Tz {
        self.timezone
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock driven by the tokio timer, so it follows paused/advanced time in tests.
pub struct TokioClock {
    origin: DateTime<Utc>,
    timezone: Tz,
    started: Instant,
}

impl TokioClock {
    /// Starts at `origin` in UTC.
    pub fn starting_at(origin: NaiveDateTime) -> Self {
        Self::new(origin.and_utc(), chrono_tz::UTC)
    }

    pub fn new(origin: DateTime<Utc>, timezone: Tz) -> Self {
        Self {
            origin,
            timezone,
            started: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn timezone(&self) -> Tz {
        self.timezone
    }

    fn now_utc(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed())
            .unwrap_or(chrono::Duration::zero());
        self.origin + elapsed
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;
    use chrono_tz::Europe::Berlin;

    use super::*;

    fn local(day: u32, month: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2030, month, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn berlin_clock() -> TokioClock {
        TokioClock::new(local(1, 10, 8, 0).and_utc(), Berlin)
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let origin = local(1, 1, 12, 0);
        let clock = TokioClock::starting_at(origin);

        tokio::time::sleep(Duration::from_secs(90)).await;

        assert_eq!(clock.now(), origin + chrono::Duration::seconds(90));
    }

    #[tokio::test(start_paused = true)]
    async fn local_now_uses_timezone_offset() {
        // 08:00 UTC is 10:00 in Berlin summer time.
        assert_eq!(berlin_clock().now(), local(1, 10, 10, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_accounts_for_autumn_change() {
        let clock = berlin_clock();

        // Summer time ends on 27.10.2030, so 30.10 10:00 is 09:00 UTC.
        assert_eq!(
            clock.resolve(&local(30, 10, 10, 0)).unwrap(),
            local(30, 10, 9, 0).and_utc()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_rejects_skipped_and_repeated_times() {
        let clock = berlin_clock();

        assert_eq!(
            clock.resolve(&local(31, 3, 2, 30)),
            Err(LocalTimeError::Skipped(local(31, 3, 2, 30), Berlin))
        );
        assert_eq!(
            clock.resolve(&local(27, 10, 2, 30)),
            Err(LocalTimeError::Ambiguous(local(27, 10, 2, 30), Berlin))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn lenient_resolve_never_picks_the_earlier_reading() {
        let clock = berlin_clock();

        // 02:30 happens at 00:30 UTC (summer) and again at 01:30 UTC (winter).
        assert_eq!(
            clock.resolve_lenient(&local(27, 10, 2, 30)),
            local(27, 10, 1, 30).and_utc()
        );
        // 02:30 on 31.03 is skipped; 03:30 summer time is 01:30 UTC.
        assert_eq!(
            clock.resolve_lenient(&local(31, 3, 2, 30)),
            local(31, 3, 1, 30).and_utc()
        );
    }

    #[test]
    fn system_clock_applies_timezone() {
        let utc = SystemClock::new(chrono_tz::UTC).now();
        let tokyo = SystemClock::new(chrono_tz::Asia::Tokyo).now();
        let offset = tokyo - utc;

        assert!(
            (offset - chrono::Duration::hours(9)).num_seconds().abs() < 5,
            "Tokyo is nine hours ahead of UTC. offset = {offset:?}"
        );
    }
}

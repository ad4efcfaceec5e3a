use std::time::Duration;

use chrono::{DateTime, LocalResult, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use log::{debug, error, info};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A fixed daily publish time in a named timezone.
///
/// Every instant that gets compared against "today" goes through [`PublishSchedule::local_date`],
/// so stored timestamps and the current time are always judged in the same zone no matter what
/// offset the machine runs in.
#[derive(Debug, Clone, Copy)]
pub struct PublishSchedule {
    tz: Tz,
    publish_at: NaiveTime,
}

impl PublishSchedule {
    pub fn new(tz: Tz, publish_at: NaiveTime) -> Self {
        Self { tz, publish_at }
    }

    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }

    /// The publish time on a local calendar date, as an absolute instant.
    pub fn publish_instant(&self, date: NaiveDate) -> DateTime<Utc> {
        let local = date.and_time(self.publish_at);
        let resolved = match self.tz.from_local_datetime(&local) {
            LocalResult::Single(at) => Some(at),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            // Skipped by a DST jump: publish an hour later on the wall clock.
            LocalResult::None => self
                .tz
                .from_local_datetime(&(local + TimeDelta::hours(1)))
                .earliest(),
        };
        resolved
            .map(|at| at.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&local))
    }

    /// When content is next expected: today's publish time, unless the latest content we hold
    /// is already from today, in which case tomorrow's.
    pub fn next_fetch_time(
        &self,
        latest: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let today = self.local_date(now);
        let have_today = latest.is_some_and(|at| self.local_date(at) == today);

        let date = if have_today {
            today.succ_opt().unwrap_or(today)
        } else {
            today
        };
        self.publish_instant(date)
    }
}

/// Milliseconds from `now` until `due`, never negative.
pub fn ms_until(due: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (due - now).num_milliseconds().max(0) as u64
}

/// One kind of scheduled work (reports, forecasts).
#[allow(async_fn_in_trait)]
pub trait Cycle {
    fn name(&self) -> &str;

    /// Timestamp of the newest content already stored, if any.
    fn latest_content_at(&self) -> anyhow::Result<Option<DateTime<Utc>>>;

    async fn run(&mut self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the timer; the next tick is due after `wake_in`.
    Idle { wake_in: Duration },
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub ran_fetch: bool,
    pub next_delay: Duration,
}

/// Wakes up when content is due, fetches, and goes back to sleep.
///
/// Nothing is persisted: each tick recomputes the due time from the newest stored content.
/// Once a fetch has run the scheduler polls again after `fallback`, which covers the publisher
/// being a little late.
pub struct Scheduler<C, K> {
    cycle: C,
    clock: K,
    schedule: PublishSchedule,
    fallback: Duration,
    state: SchedulerState,
}

impl<C: Cycle, K: Clock> Scheduler<C, K> {
    pub fn new(cycle: C, clock: K, schedule: PublishSchedule, fallback: Duration) -> Self {
        Self {
            cycle,
            clock,
            schedule,
            fallback,
            state: SchedulerState::Idle {
                wake_in: Duration::ZERO,
            },
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    #[cfg(test)]
    pub fn cycle(&self) -> &C {
        &self.cycle
    }

    pub async fn tick(&mut self) -> TickOutcome {
        self.state = SchedulerState::Running;
        let outcome = self.decide_and_run().await;
        self.state = SchedulerState::Idle {
            wake_in: outcome.next_delay,
        };
        debug!(
            "{}: checking again in {} seconds",
            self.cycle.name(),
            outcome.next_delay.as_secs()
        );
        outcome
    }

    async fn decide_and_run(&mut self) -> TickOutcome {
        let now = self.clock.now();
        let latest = match self.cycle.latest_content_at() {
            Ok(latest) => latest,
            Err(e) => {
                error!("{}: could not read latest content: {:#}", self.cycle.name(), e);
                return TickOutcome {
                    ran_fetch: false,
                    next_delay: self.fallback,
                };
            }
        };

        let due = self.schedule.next_fetch_time(latest, now);
        let wait = ms_until(due, now);
        if wait > 0 {
            info!("{}: nothing due until {}", self.cycle.name(), due);
            return TickOutcome {
                ran_fetch: false,
                next_delay: Duration::from_millis(wait),
            };
        }

        info!("{}: content is due, fetching", self.cycle.name());
        if let Err(e) = self.cycle.run().await {
            error!("{}: error running sync: {:#}", self.cycle.name(), e);
        }
        TickOutcome {
            ran_fetch: true,
            next_delay: self.fallback,
        }
    }

    /// Tick, sleep for as long as the tick says, repeat. Never returns.
    pub async fn run_forever(mut self) {
        loop {
            let outcome = self.tick().await;
            tokio::time::sleep(outcome.next_delay).await;
        }
    }
}

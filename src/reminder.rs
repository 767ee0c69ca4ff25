use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, TimeDelta};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::model::{ReminderSnapshot, ReminderTime};

/// Source of local wall-clock time. Timers re-read it before every sleep so
/// clock jumps (DST, suspend) are picked up on the next cycle.
pub trait WallClock: Send + Sync + 'static {
    fn now(&self) -> NaiveDateTime;
}

pub struct LocalClock;

impl WallClock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

struct ScheduledReminder {
    snapshot: ReminderSnapshot,
    handle: JoinHandle<()>,
}

/// Owns one timer task per habit. Fired reminders are delivered on the
/// channel returned by [`ReminderManager::new`]; nothing here touches
/// habit state.
pub struct ReminderManager {
    tasks: HashMap<i64, ScheduledReminder>,
    sender: mpsc::UnboundedSender<ReminderSnapshot>,
    clock: Arc<dyn WallClock>,
}

impl ReminderManager {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ReminderSnapshot>) {
        Self::with_clock(Arc::new(LocalClock))
    }

    pub fn with_clock(
        clock: Arc<dyn WallClock>,
    ) -> (Self, mpsc::UnboundedReceiver<ReminderSnapshot>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let manager = Self {
            tasks: HashMap::new(),
            sender,
            clock,
        };
        (manager, receiver)
    }

    /// Starts a daily timer for the snapshot, replacing any timer the habit
    /// already had.
    pub fn schedule(&mut self, snapshot: ReminderSnapshot) {
        self.cancel(snapshot.habit_id);

        debug!(
            habit_id = snapshot.habit_id,
            time = %snapshot.time,
            delay_secs = delay_until(self.clock.now(), snapshot.time).as_secs(),
            "scheduling reminder"
        );
        let sender = self.sender.clone();
        let clock = Arc::clone(&self.clock);
        let notice = snapshot.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(delay_until(clock.now(), notice.time)).await;
                info!(habit_id = notice.habit_id, "reminder fired");
                if sender.send(notice.clone()).is_err() {
                    break;
                }
                // one notice per day: let the reminder's minute pass first
                tokio::time::sleep(until_minute_ends(clock.now(), notice.time)).await;
            }
        });
        self.tasks
            .insert(snapshot.habit_id, ScheduledReminder { snapshot, handle });
    }

    pub fn cancel(&mut self, habit_id: i64) -> bool {
        match self.tasks.remove(&habit_id) {
            Some(task) => {
                task.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Brings the timers in line with `snapshots`: new or changed reminders
    /// are rescheduled, reminders of habits no longer listed are cancelled,
    /// unchanged ones keep running.
    pub fn sync(&mut self, snapshots: Vec<ReminderSnapshot>) {
        let wanted: HashMap<i64, ReminderSnapshot> = snapshots
            .into_iter()
            .map(|snapshot| (snapshot.habit_id, snapshot))
            .collect();

        let stale: Vec<i64> = self
            .tasks
            .keys()
            .filter(|id| !wanted.contains_key(*id))
            .copied()
            .collect();
        for id in stale {
            self.cancel(id);
        }

        for (id, snapshot) in wanted {
            let unchanged = self
                .tasks
                .get(&id)
                .is_some_and(|task| task.snapshot == snapshot);
            if !unchanged {
                self.schedule(snapshot);
            }
        }
    }

    pub fn active(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for ReminderManager {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.handle.abort();
        }
    }
}

/// Time from `now` until the next occurrence of `time`. Inside the
/// reminder's own minute the delay is zero.
pub fn delay_until(now: NaiveDateTime, time: ReminderTime) -> Duration {
    let target = now.date().and_time(time.as_naive_time());
    let minute_end = target + TimeDelta::minutes(1);
    let next = if now < target {
        target
    } else if now < minute_end {
        return Duration::ZERO;
    } else {
        target + TimeDelta::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Remaining time inside the reminder's minute; zero outside it.
fn until_minute_ends(now: NaiveDateTime, time: ReminderTime) -> Duration {
    let target = now.date().and_time(time.as_naive_time());
    let minute_end = target + TimeDelta::minutes(1);
    if now < target || now >= minute_end {
        return Duration::ZERO;
    }
    (minute_end - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use chrono::NaiveDate;
    use tokio::time::Instant;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    /// Wall clock that advances with tokio's (paused) clock and can be
    /// shifted to simulate DST changes or suspend.
    struct TestClock {
        base: NaiveDateTime,
        started: Instant,
        shift: Mutex<TimeDelta>,
    }

    impl TestClock {
        fn starting_at(base: NaiveDateTime) -> Arc<Self> {
            Arc::new(Self {
                base,
                started: Instant::now(),
                shift: Mutex::new(TimeDelta::zero()),
            })
        }

        fn shift_by(&self, delta: TimeDelta) {
            *self.shift.lock().expect("shift lock") += delta;
        }
    }

    impl WallClock for TestClock {
        fn now(&self) -> NaiveDateTime {
            let elapsed = TimeDelta::from_std(self.started.elapsed()).expect("elapsed");
            self.base + elapsed + *self.shift.lock().expect("shift lock")
        }
    }

    fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .expect("date")
            .and_hms_opt(hour, minute, second)
            .expect("time")
    }

    fn snapshot(habit_id: i64, hour: u8, minute: u8) -> ReminderSnapshot {
        ReminderSnapshot {
            habit_id,
            name: format!("habit {habit_id}"),
            time: ReminderTime::new(hour, minute).expect("time"),
        }
    }

    fn time(hour: u8, minute: u8) -> ReminderTime {
        ReminderTime::new(hour, minute).expect("time")
    }

    fn manager_at(
        base: NaiveDateTime,
    ) -> (
        Arc<TestClock>,
        ReminderManager,
        mpsc::UnboundedReceiver<ReminderSnapshot>,
    ) {
        let clock = TestClock::starting_at(base);
        let (manager, receiver) = ReminderManager::with_clock(clock.clone());
        (clock, manager, receiver)
    }

    #[test]
    fn delay_until_later_today() {
        assert_eq!(delay_until(at(8, 59, 0), time(9, 0)), Duration::from_secs(60));
        assert_eq!(
            delay_until(at(0, 0, 0), time(23, 59)),
            Duration::from_secs(23 * 3600 + 59 * 60)
        );
    }

    #[test]
    fn delay_until_inside_minute_fires_now() {
        assert_eq!(delay_until(at(9, 0, 0), time(9, 0)), Duration::ZERO);
        assert_eq!(delay_until(at(9, 0, 59), time(9, 0)), Duration::ZERO);
    }

    #[test]
    fn delay_until_rolls_to_tomorrow() {
        assert_eq!(
            delay_until(at(9, 1, 0), time(9, 0)),
            Duration::from_secs(24 * 3600 - 60)
        );
    }

    #[test]
    fn minute_end_only_counts_inside_the_minute() {
        assert_eq!(until_minute_ends(at(9, 0, 20), time(9, 0)), Duration::from_secs(40));
        assert_eq!(until_minute_ends(at(8, 59, 59), time(9, 0)), Duration::ZERO);
        assert_eq!(until_minute_ends(at(9, 1, 0), time(9, 0)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn fires_at_reminder_minute() {
        let (clock, mut manager, mut receiver) = manager_at(at(8, 59, 0));
        manager.schedule(snapshot(1, 9, 0));

        let fired = receiver.recv().await.expect("notice");
        assert_eq!(fired.habit_id, 1);
        assert_eq!(fired.name, "habit 1");
        assert_eq!(clock.now(), at(9, 0, 0));

        let again = receiver.recv().await.expect("next day notice");
        assert_eq!(again.habit_id, 1);
        assert_eq!(clock.now(), at(9, 0, 0) + TimeDelta::days(1));
    }

    #[tokio::test(start_paused = true)]
    async fn follows_wall_clock_jumps_between_firings() {
        let (clock, mut manager, mut receiver) = manager_at(at(8, 59, 0));
        let started = Instant::now();
        manager.schedule(snapshot(1, 9, 0));
        receiver.recv().await.expect("first notice");

        // wall clock falls back an hour right after the first notice
        clock.shift_by(TimeDelta::hours(-1));
        manager.sync(vec![snapshot(1, 9, 0)]);

        receiver.recv().await.expect("second notice");
        assert_eq!(clock.now().time(), at(9, 0, 0).time());
        assert_eq!(started.elapsed(), Duration::from_secs(3660));
    }

    #[tokio::test]
    async fn rescheduling_keeps_one_timer_per_habit() {
        let (_clock, mut manager, _receiver) = manager_at(at(8, 0, 0));
        manager.schedule(snapshot(1, 9, 0));
        manager.schedule(snapshot(1, 10, 0));
        manager.schedule(snapshot(2, 10, 0));
        assert_eq!(manager.active(), 2);
        assert!(manager.cancel(1));
        assert!(!manager.cancel(1));
        assert_eq!(manager.active(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_reminder_never_fires() {
        let (_clock, mut manager, mut receiver) = manager_at(at(8, 59, 0));
        manager.schedule(snapshot(1, 9, 0));
        manager.cancel(1);

        let outcome = tokio::time::timeout(2 * DAY, receiver.recv()).await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn sync_drops_removed_habits() {
        let (_clock, mut manager, _receiver) = manager_at(at(8, 0, 0));
        manager.sync(vec![snapshot(1, 9, 0), snapshot(2, 21, 30)]);
        assert_eq!(manager.active(), 2);

        manager.sync(vec![snapshot(2, 21, 30), snapshot(3, 7, 0)]);
        assert!(!manager.tasks.contains_key(&1));
        assert!(manager.tasks.contains_key(&2));
        assert!(manager.tasks.contains_key(&3));
        assert_eq!(manager.active(), 2);

        manager.sync(Vec::new());
        assert_eq!(manager.active(), 0);
    }
}

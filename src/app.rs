use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, Utc};
use tracing::debug;

use crate::codec::{encode, load_or_default, StorageKey};
use crate::error::AppError;
use crate::model::{
    default_categories, Completion, Habit, HabitStats, ReminderEntry, ReminderSnapshot,
    ReminderTime, Summary, Theme,
};
use crate::storage::KvStore;
use crate::streak::{calculate_streak, is_streak_active};

/// In-memory habit collection plus the auxiliary lists, persisted through
/// [`KvStore`] after every mutation. Failed operations leave both the
/// memory state and the store untouched.
pub struct HabitStore {
    store: KvStore,
    habits: Vec<Habit>,
    categories: Vec<String>,
    reminders: Vec<ReminderEntry>,
    theme: Theme,
    last_issued_id: i64,
    needs_flush: bool,
}

impl HabitStore {
    pub async fn open(store: KvStore) -> Result<Self, AppError> {
        let loaded: Vec<Habit> = load_or_default(&store, StorageKey::Habits, Vec::new).await?;
        let categories = load_or_default(&store, StorageKey::Categories, default_categories).await?;
        let stored_reminders: Vec<ReminderEntry> =
            load_or_default(&store, StorageKey::Reminders, Vec::new).await?;
        let theme = load_or_default(&store, StorageKey::Theme, Theme::default).await?;

        let mut needs_flush = false;
        let mut seen = HashSet::new();
        let mut habits = Vec::with_capacity(loaded.len());
        for mut habit in loaded {
            if !seen.insert(habit.id) {
                debug!(id = habit.id, "dropping habit with duplicate id");
                needs_flush = true;
                continue;
            }
            let streak = calculate_streak(&habit.completions);
            if habit.streak != streak {
                debug!(id = habit.id, stored = habit.streak, streak, "correcting stored streak");
                habit.streak = streak;
                needs_flush = true;
            }
            habits.push(habit);
        }

        let reminders = reminder_entries(&habits);
        if reminders != stored_reminders {
            debug!("rebuilding reminder registry");
            needs_flush = true;
        }

        let last_issued_id = habits.iter().map(|habit| habit.id).max().unwrap_or(0);
        Ok(Self {
            store,
            habits,
            categories,
            reminders,
            theme,
            last_issued_id,
            needs_flush,
        })
    }

    /// Writes back anything corrected while loading. Every mutation already
    /// persists on its own, so this is a no-op for a clean store.
    pub async fn close(self) -> Result<(), AppError> {
        if !self.needs_flush {
            return Ok(());
        }
        self.store
            .set_many(vec![
                (StorageKey::Habits.as_str(), encode(&self.habits)?),
                (StorageKey::Reminders.as_str(), encode(&self.reminders)?),
            ])
            .await
    }

    pub fn habits(&self) -> &[Habit] {
        &self.habits
    }

    pub fn habit(&self, id: i64) -> Result<&Habit, AppError> {
        let index = self.position(id)?;
        Ok(&self.habits[index])
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn reminders(&self) -> &[ReminderEntry] {
        &self.reminders
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub async fn add_habit(
        &mut self,
        name: &str,
        category: &str,
        reminder_time: Option<ReminderTime>,
    ) -> Result<Habit, AppError> {
        ensure_non_empty("habit name", name)?;
        ensure_non_empty("category", category)?;

        let habit = Habit::new(
            self.next_id()?,
            name.trim().to_string(),
            category.trim().to_string(),
            reminder_time,
        );
        let mut habits = self.habits.clone();
        habits.push(habit.clone());
        self.commit_habits(habits).await?;
        debug!(id = habit.id, "added habit");
        Ok(habit)
    }

    /// Records a completion for `today`. Completing twice on the same day
    /// changes nothing and reports [`Completion::AlreadyCompleted`].
    pub async fn complete_habit(&mut self, id: i64, today: NaiveDate) -> Result<Completion, AppError> {
        let index = self.position(id)?;
        if self.habits[index].is_completed_on(today) {
            return Ok(Completion::AlreadyCompleted(self.habits[index].clone()));
        }

        let mut habits = self.habits.clone();
        let habit = &mut habits[index];
        habit.completions.insert(today);
        habit.refresh_streak();
        let updated = habit.clone();
        self.commit_habits(habits).await?;
        debug!(id, %today, streak = updated.streak, "completed habit");
        Ok(Completion::Completed(updated))
    }

    pub async fn edit_habit(
        &mut self,
        id: i64,
        new_name: &str,
        new_category: &str,
    ) -> Result<Habit, AppError> {
        let index = self.position(id)?;
        ensure_non_empty("habit name", new_name)?;
        ensure_non_empty("category", new_category)?;

        let mut habits = self.habits.clone();
        let habit = &mut habits[index];
        habit.name = new_name.trim().to_string();
        habit.category = new_category.trim().to_string();
        let updated = habit.clone();
        self.commit_habits(habits).await?;
        debug!(id, "edited habit");
        Ok(updated)
    }

    pub async fn set_reminder(
        &mut self,
        id: i64,
        reminder_time: Option<ReminderTime>,
    ) -> Result<Habit, AppError> {
        let index = self.position(id)?;
        let mut habits = self.habits.clone();
        habits[index].reminder_time = reminder_time;
        let updated = habits[index].clone();
        self.commit_habits(habits).await?;
        debug!(id, ?reminder_time, "updated reminder");
        Ok(updated)
    }

    pub async fn remove_habit(&mut self, id: i64) -> Result<Habit, AppError> {
        let index = self.position(id)?;
        let mut habits = self.habits.clone();
        let removed = habits.remove(index);
        self.commit_habits(habits).await?;
        debug!(id, "removed habit");
        Ok(removed)
    }

    /// Replaces the collection order. `new_order` must name every current
    /// habit exactly once.
    pub async fn reorder(&mut self, new_order: &[i64]) -> Result<(), AppError> {
        if new_order.len() != self.habits.len() {
            return Err(AppError::invalid(format!(
                "reorder expects {} habit ids, got {}",
                self.habits.len(),
                new_order.len()
            )));
        }

        let mut by_id: HashMap<i64, &Habit> =
            self.habits.iter().map(|habit| (habit.id, habit)).collect();
        let mut reordered = Vec::with_capacity(new_order.len());
        for id in new_order {
            match by_id.remove(id) {
                Some(habit) => reordered.push(habit.clone()),
                None if self.position(*id).is_ok() => {
                    return Err(AppError::invalid(format!(
                        "habit id {id} appears more than once"
                    )));
                }
                None => {
                    return Err(AppError::invalid(format!("unknown habit id {id}")));
                }
            }
        }

        self.commit_habits(reordered).await?;
        debug!(count = new_order.len(), "reordered habits");
        Ok(())
    }

    /// Moves one habit to a 1-based position; positions past the end clamp
    /// to the last slot.
    pub async fn move_habit(&mut self, id: i64, to: usize) -> Result<&[Habit], AppError> {
        if to == 0 {
            return Err(AppError::invalid("position starts at 1"));
        }
        let current_index = self.position(id)?;

        let mut order: Vec<i64> = self.habits.iter().map(|habit| habit.id).collect();
        let moving = order.remove(current_index);
        let desired_index = (to - 1).min(order.len());
        order.insert(desired_index, moving);

        self.reorder(&order).await?;
        Ok(&self.habits)
    }

    /// Drops every habit. Callers are expected to confirm with the user first.
    pub async fn reset_all(&mut self) -> Result<usize, AppError> {
        let removed = self.habits.len();
        self.commit_habits(Vec::new()).await?;
        debug!(removed, "reset all habits");
        Ok(removed)
    }

    pub async fn add_category(&mut self, label: &str) -> Result<(), AppError> {
        ensure_non_empty("category", label)?;
        let label = label.trim();
        if self.categories.iter().any(|existing| existing == label) {
            return Err(AppError::invalid(format!("category '{label}' already exists")));
        }
        let mut categories = self.categories.clone();
        categories.push(label.to_string());
        self.commit_categories(categories).await
    }

    /// Removes a label from the category list. Habits using it keep it.
    pub async fn remove_category(&mut self, label: &str) -> Result<(), AppError> {
        let label = label.trim();
        let index = self
            .categories
            .iter()
            .position(|existing| existing == label)
            .ok_or_else(|| AppError::NotFound(format!("category '{label}'")))?;
        let mut categories = self.categories.clone();
        categories.remove(index);
        self.commit_categories(categories).await
    }

    pub async fn set_theme(&mut self, theme: Theme) -> Result<(), AppError> {
        self.store
            .set(StorageKey::Theme.as_str(), encode(&theme)?)
            .await?;
        self.theme = theme;
        debug!(theme = theme.as_str(), "changed theme");
        Ok(())
    }

    pub fn summary(&self, today: NaiveDate) -> Summary {
        let habits: Vec<HabitStats> = self
            .habits
            .iter()
            .map(|habit| HabitStats {
                id: habit.id,
                name: habit.name.clone(),
                completions: habit.completion_count(),
                streak: habit.streak,
                streak_active: is_streak_active(habit.last_completion(), today),
            })
            .collect();
        Summary {
            total_habits: self.habits.len(),
            total_completions: habits.iter().map(|stats| stats.completions).sum(),
            completed_today: self
                .habits
                .iter()
                .filter(|habit| habit.is_completed_on(today))
                .count(),
            habits,
        }
    }

    pub fn reminder_snapshots(&self) -> Vec<ReminderSnapshot> {
        self.habits
            .iter()
            .filter_map(|habit| {
                habit.reminder_time.map(|time| ReminderSnapshot {
                    habit_id: habit.id,
                    name: habit.name.clone(),
                    time,
                })
            })
            .collect()
    }

    fn position(&self, id: i64) -> Result<usize, AppError> {
        self.habits
            .iter()
            .position(|habit| habit.id == id)
            .ok_or_else(|| AppError::habit_not_found(id))
    }

    /// Millisecond timestamp, bumped past every id issued so far so that a
    /// removed id is never handed out again.
    fn next_id(&mut self) -> Result<i64, AppError> {
        let floor = self.last_issued_id.checked_add(1).ok_or_else(|| {
            AppError::invalid(format!("no habit id left after {}", self.last_issued_id))
        })?;
        let id = Utc::now().timestamp_millis().max(floor);
        self.last_issued_id = id;
        Ok(id)
    }

    async fn commit_habits(&mut self, habits: Vec<Habit>) -> Result<(), AppError> {
        let reminders = reminder_entries(&habits);
        self.store
            .set_many(vec![
                (StorageKey::Habits.as_str(), encode(&habits)?),
                (StorageKey::Reminders.as_str(), encode(&reminders)?),
            ])
            .await?;
        self.habits = habits;
        self.reminders = reminders;
        self.needs_flush = false;
        Ok(())
    }

    async fn commit_categories(&mut self, categories: Vec<String>) -> Result<(), AppError> {
        self.store
            .set(StorageKey::Categories.as_str(), encode(&categories)?)
            .await?;
        self.categories = categories;
        Ok(())
    }
}

fn reminder_entries(habits: &[Habit]) -> Vec<ReminderEntry> {
    habits
        .iter()
        .filter_map(|habit| {
            habit.reminder_time.map(|time| ReminderEntry {
                habit_id: habit.id,
                time,
            })
        })
        .collect()
}

fn ensure_non_empty(label: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{label} cannot be empty")));
    }
    Ok(())
}

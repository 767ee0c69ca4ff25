use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::streak::calculate_streak;

pub const DEFAULT_CATEGORIES: [&str; 4] = ["Health", "Productivity", "Learning", "Personal"];

pub fn default_categories() -> Vec<String> {
    DEFAULT_CATEGORIES.iter().map(|label| label.to_string()).collect()
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: i64,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub reminder_time: Option<ReminderTime>,
    #[serde(default)]
    pub completions: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub streak: u32,
}

impl Habit {
    pub fn new(id: i64, name: String, category: String, reminder_time: Option<ReminderTime>) -> Self {
        Self {
            id,
            name,
            category,
            reminder_time,
            completions: BTreeSet::new(),
            streak: 0,
        }
    }

    pub fn completion_count(&self) -> usize {
        self.completions.len()
    }

    pub fn last_completion(&self) -> Option<NaiveDate> {
        self.completions.last().copied()
    }

    pub fn is_completed_on(&self, date: NaiveDate) -> bool {
        self.completions.contains(&date)
    }

    /// Re-derives the cached streak from the completion history.
    pub fn refresh_streak(&mut self) {
        self.streak = calculate_streak(&self.completions);
    }
}

/// Wall-clock time of day, persisted as `HH:MM`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReminderTime {
    hour: u8,
    minute: u8,
}

impl ReminderTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.hour()), u32::from(self.minute()), 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ReminderTime {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid reminder time '{value}', expected HH:MM");
        let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
        if minute.len() != 2 || hour.is_empty() || hour.len() > 2 {
            return Err(invalid());
        }
        let hour: u8 = hour.parse().map_err(|_| invalid())?;
        let minute: u8 = minute.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for ReminderTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReminderTime> for String {
    fn from(value: ReminderTime) -> Self {
        value.to_string()
    }
}

/// Persisted reminder registry entry.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderEntry {
    pub habit_id: i64,
    pub time: ReminderTime,
}

/// Read-only view handed to the reminder scheduler.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReminderSnapshot {
    pub habit_id: i64,
    pub name: String,
    pub time: ReminderTime,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Completion {
    Completed(Habit),
    AlreadyCompleted(Habit),
}

impl Completion {
    pub fn habit(&self) -> &Habit {
        match self {
            Self::Completed(habit) | Self::AlreadyCompleted(habit) => habit,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HabitStats {
    pub id: i64,
    pub name: String,
    pub completions: usize,
    pub streak: u32,
    pub streak_active: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    pub total_habits: usize,
    pub total_completions: usize,
    pub completed_today: usize,
    pub habits: Vec<HabitStats>,
}

use chrono::NaiveDate;

use crate::model::{Habit, Summary};
use crate::streak::is_streak_active;

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn format_streak(streak: u32, active: bool) -> String {
    if streak == 0 {
        return "0".to_string();
    }
    let unit = if streak == 1 { "day" } else { "days" };
    if active {
        format!("{streak} {unit}")
    } else {
        format!("{streak} {unit} (lapsed)")
    }
}

pub fn format_habit_detail(habit: &Habit, today: NaiveDate) -> String {
    let active = is_streak_active(habit.last_completion(), today);
    let mut output = String::new();
    output.push_str(&format!("Habit ID: {}\n", habit.id));
    output.push_str(&format!("Name: {}\n", habit.name));
    output.push_str(&format!("Category: {}\n", habit.category));
    if let Some(time) = habit.reminder_time {
        output.push_str(&format!("Reminder: {time}\n"));
    }
    output.push_str(&format!("Streak: {}\n", format_streak(habit.streak, active)));
    output.push_str(&format!(
        "Done today: {}\n",
        if habit.is_completed_on(today) { "yes" } else { "no" }
    ));
    output.push('\n');
    if habit.completions.is_empty() {
        output.push_str("Completions: (none)");
        return output;
    }
    output.push_str(&format!("Completions ({}):\n", habit.completion_count()));
    for date in habit.completions.iter().rev() {
        output.push_str(&format!("- {}\n", format_date(*date)));
    }
    output.trim_end().to_string()
}

pub fn format_habit_list(habits: &[Habit], today: NaiveDate) -> String {
    let mut output = format!(
        "{:<3} {:<14} {:<5} {:<14} {:<7} {:<14} {}\n",
        "#", "ID", "TODAY", "CATEGORY", "REMIND", "STREAK", "NAME"
    );
    for (idx, habit) in habits.iter().enumerate() {
        let active = is_streak_active(habit.last_completion(), today);
        let reminder = habit
            .reminder_time
            .map(|time| time.to_string())
            .unwrap_or_else(|| "-".to_string());
        output.push_str(&format!(
            "{:<3} {:<14} {:<5} {:<14} {:<7} {:<14} {}\n",
            idx + 1,
            habit.id,
            if habit.is_completed_on(today) { "x" } else { "" },
            habit.category,
            reminder,
            format_streak(habit.streak, active),
            habit.name
        ));
    }
    output.trim_end().to_string()
}

pub fn format_summary(summary: &Summary) -> String {
    let mut output = String::new();
    output.push_str(&format!("Total habits: {}\n", summary.total_habits));
    output.push_str(&format!("Total completions: {}\n", summary.total_completions));
    let percent = if summary.total_habits == 0 {
        0
    } else {
        summary.completed_today * 100 / summary.total_habits
    };
    output.push_str(&format!(
        "Done today: {}/{} ({percent}%)\n",
        summary.completed_today, summary.total_habits
    ));
    if summary.habits.is_empty() {
        return output.trim_end().to_string();
    }
    output.push('\n');
    output.push_str(&format!("{:<14} {:<6} {:<14} {}\n", "ID", "DONE", "STREAK", "NAME"));
    for stats in &summary.habits {
        output.push_str(&format!(
            "{:<14} {:<6} {:<14} {}\n",
            stats.id,
            stats.completions,
            format_streak(stats.streak, stats.streak_active),
            stats.name
        ));
    }
    output.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HabitStats;

    fn day(value: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, value).expect("date")
    }

    #[test]
    fn habit_detail_lists_latest_completion_first() {
        let mut habit = Habit::new(9, "Walk".to_string(), "Health".to_string(), None);
        habit.completions.extend([day(1), day(2)]);
        habit.refresh_streak();

        let detail = format_habit_detail(&habit, day(2));
        assert!(detail.contains("Streak: 2 days\n"));
        assert!(detail.contains("Done today: yes"));
        assert!(detail.ends_with("- 2024-02-02\n- 2024-02-01"));
    }

    #[test]
    fn lapsed_streak_is_marked() {
        let mut habit = Habit::new(9, "Walk".to_string(), "Health".to_string(), None);
        habit.completions.insert(day(1));
        habit.refresh_streak();

        let detail = format_habit_detail(&habit, day(10));
        assert!(detail.contains("Streak: 1 day (lapsed)"));
    }

    #[test]
    fn summary_reports_daily_progress() {
        let summary = Summary {
            total_habits: 4,
            total_completions: 7,
            completed_today: 1,
            habits: vec![HabitStats {
                id: 1,
                name: "Walk".to_string(),
                completions: 7,
                streak: 3,
                streak_active: true,
            }],
        };
        let output = format_summary(&summary);
        assert!(output.contains("Done today: 1/4 (25%)"));
        assert!(output.contains("3 days"));
    }
}

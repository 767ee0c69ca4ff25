use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::ReminderTime;

#[derive(Parser, Debug)]
#[command(
    name = "habitrack",
    version,
    about = "Track daily habits, completions and streaks"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Directory holding the habit database (defaults to $HABITRACK_HOME or ~/.habitrack)"
    )]
    pub data_dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable debug logging on stderr")]
    pub debug: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(subcommand)]
    Habit(HabitCommand),
    #[command(subcommand)]
    Category(CategoryCommand),
    Theme(ThemeArgs),
    Stats(StatsArgs),
    #[command(subcommand)]
    Remind(RemindCommand),
}

#[derive(Subcommand, Debug)]
pub enum HabitCommand {
    Add(HabitAdd),
    List(HabitList),
    Show(HabitShow),
    Done(HabitDone),
    Edit(HabitEdit),
    Remind(HabitRemind),
    Remove(HabitRemove),
    Reorder(HabitReorder),
    Move(HabitMove),
    Reset(HabitReset),
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    List(CategoryList),
    Add(CategoryLabel),
    Remove(CategoryLabel),
}

#[derive(Subcommand, Debug)]
pub enum RemindCommand {
    List(RemindList),
    Watch(RemindWatch),
}

#[derive(Args, Debug)]
pub struct HabitAdd {
    pub name: String,
    #[arg(long, help = "Category label (defaults to the first category)")]
    pub category: Option<String>,
    #[arg(long, value_name = "HH:MM", help = "Daily reminder time")]
    pub remind: Option<ReminderTime>,
}

#[derive(Args, Debug)]
pub struct HabitList {
    #[arg(long, help = "Only show habits in this category")]
    pub category: Option<String>,
}

#[derive(Args, Debug)]
pub struct HabitShow {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct HabitDone {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct HabitEdit {
    pub id: i64,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Args, Debug)]
pub struct HabitRemind {
    pub id: i64,
    #[arg(value_name = "HH:MM", required_unless_present = "clear")]
    pub time: Option<ReminderTime>,
    #[arg(long, conflicts_with = "time", help = "Remove the reminder")]
    pub clear: bool,
}

#[derive(Args, Debug)]
pub struct HabitRemove {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct HabitReorder {
    #[arg(required = true, num_args = 1.., help = "Every habit id, in the new order")]
    pub ids: Vec<i64>,
}

#[derive(Args, Debug)]
pub struct HabitMove {
    pub id: i64,
    #[arg(help = "Target position, starting at 1")]
    pub to: usize,
}

#[derive(Args, Debug)]
pub struct HabitReset {
    #[arg(long, help = "Confirm removing every habit")]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct CategoryList;

#[derive(Args, Debug)]
pub struct CategoryLabel {
    pub label: String,
}

#[derive(Args, Debug)]
pub struct ThemeArgs {
    #[arg(value_enum, help = "Theme to switch to; prints the current theme when omitted")]
    pub theme: Option<ThemeArg>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ThemeArg {
    Light,
    Dark,
}

#[derive(Args, Debug)]
pub struct StatsArgs;

#[derive(Args, Debug)]
pub struct RemindList;

#[derive(Args, Debug)]
pub struct RemindWatch {
    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = 60,
        help = "How often to reload reminders from the store"
    )]
    pub interval: u64,
}

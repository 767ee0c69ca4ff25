mod app;
mod cli;
mod codec;
mod db;
mod entities;
mod error;
mod model;
mod reminder;
mod storage;
mod streak;
mod util;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::app::HabitStore;
use crate::cli::{
    CategoryCommand, CategoryLabel, Cli, Command, HabitAdd, HabitCommand, HabitDone, HabitEdit,
    HabitList, HabitMove, HabitRemind, HabitRemove, HabitReorder, HabitReset, HabitShow,
    RemindCommand, RemindWatch, ThemeArg, ThemeArgs,
};
use crate::error::AppError;
use crate::model::{Completion, ReminderSnapshot, Theme};
use crate::reminder::ReminderManager;
use crate::storage::KvStore;
use crate::util::{format_date, format_habit_detail, format_habit_list, format_summary};

const DATA_DIR_ENV: &str = "HABITRACK_HOME";
const DATA_DIR_NAME: &str = ".habitrack";

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

/// Log level: `--debug`, then `RUST_LOG`, then warnings only.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("habitrack=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("habitrack=warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run() -> Result<(), AppError> {
    let Cli {
        data_dir,
        debug,
        command,
    } = Cli::parse();
    init_tracing(debug);

    let data_dir = resolve_data_dir(data_dir)?;
    let db_path = db::resolve_db_path(&data_dir);
    db::ensure_parent_dir(&db_path)?;
    tracing::debug!(path = %db_path.display(), "using habit database");

    match command {
        Command::Remind(RemindCommand::Watch(args)) => handle_remind_watch(&db_path, args).await,
        command => {
            let mut lock = db::open_lock(&db_path)?;
            let _guard = lock.write()?;

            let mut store = open_store(&db_path).await?;
            let today = Local::now().date_naive();
            match command {
                Command::Habit(command) => handle_habit(&mut store, command, today).await?,
                Command::Category(command) => handle_category(&mut store, command).await?,
                Command::Theme(args) => handle_theme(&mut store, args).await?,
                Command::Stats(_) => println!("{}", format_summary(&store.summary(today))),
                Command::Remind(RemindCommand::List(_)) => handle_remind_list(&store)?,
                Command::Remind(RemindCommand::Watch(_)) => {}
            }
            store.close().await
        }
    }
}

async fn open_store(db_path: &Path) -> Result<HabitStore, AppError> {
    let db = db::connect(db_path).await?;
    db::ensure_schema(&db).await?;
    HabitStore::open(KvStore::new(db)).await
}

async fn handle_habit(
    store: &mut HabitStore,
    command: HabitCommand,
    today: NaiveDate,
) -> Result<(), AppError> {
    match command {
        HabitCommand::Add(args) => handle_habit_add(store, args).await,
        HabitCommand::List(args) => handle_habit_list(store, args, today),
        HabitCommand::Show(args) => handle_habit_show(store, args, today),
        HabitCommand::Done(args) => handle_habit_done(store, args, today).await,
        HabitCommand::Edit(args) => handle_habit_edit(store, args).await,
        HabitCommand::Remind(args) => handle_habit_remind(store, args).await,
        HabitCommand::Remove(args) => handle_habit_remove(store, args).await,
        HabitCommand::Reorder(args) => handle_habit_reorder(store, args, today).await,
        HabitCommand::Move(args) => handle_habit_move(store, args, today).await,
        HabitCommand::Reset(args) => handle_habit_reset(store, args).await,
    }
}

async fn handle_habit_add(store: &mut HabitStore, args: HabitAdd) -> Result<(), AppError> {
    let category = match args.category {
        Some(category) => category,
        None => store
            .categories()
            .first()
            .cloned()
            .ok_or_else(|| AppError::invalid("no categories defined; pass --category"))?,
    };
    let habit = store.add_habit(&args.name, &category, args.remind).await?;
    println!("Created habit ID: {}: {}", habit.id, habit.name);
    Ok(())
}

fn handle_habit_list(store: &HabitStore, args: HabitList, today: NaiveDate) -> Result<(), AppError> {
    let habits: Vec<_> = match args.category.as_deref() {
        Some(category) => store
            .habits()
            .iter()
            .filter(|habit| habit.category == category)
            .cloned()
            .collect(),
        None => store.habits().to_vec(),
    };
    if habits.is_empty() {
        println!("No habits found.");
        return Ok(());
    }
    println!("{}", format_habit_list(&habits, today));
    Ok(())
}

fn handle_habit_show(store: &HabitStore, args: HabitShow, today: NaiveDate) -> Result<(), AppError> {
    let habit = store.habit(args.id)?;
    println!("{}", format_habit_detail(habit, today));
    Ok(())
}

async fn handle_habit_done(
    store: &mut HabitStore,
    args: HabitDone,
    today: NaiveDate,
) -> Result<(), AppError> {
    let completion = store.complete_habit(args.id, today).await?;
    let habit = completion.habit();
    match &completion {
        Completion::Completed(_) => println!(
            "Habit ID: {} completed for {}. Streak: {}",
            habit.id,
            format_date(today),
            habit.streak
        ),
        Completion::AlreadyCompleted(_) => {
            println!("Habit ID: {} already completed today.", habit.id)
        }
    }
    Ok(())
}

async fn handle_habit_edit(store: &mut HabitStore, args: HabitEdit) -> Result<(), AppError> {
    if args.name.is_none() && args.category.is_none() {
        return Err(AppError::invalid("no changes provided; pass --name or --category"));
    }
    let current = store.habit(args.id)?;
    let name = args.name.unwrap_or_else(|| current.name.clone());
    let category = args.category.unwrap_or_else(|| current.category.clone());
    let habit = store.edit_habit(args.id, &name, &category).await?;
    println!("Updated habit ID: {}: {} [{}]", habit.id, habit.name, habit.category);
    Ok(())
}

async fn handle_habit_remind(store: &mut HabitStore, args: HabitRemind) -> Result<(), AppError> {
    let time = if args.clear { None } else { args.time };
    let habit = store.set_reminder(args.id, time).await?;
    match habit.reminder_time {
        Some(time) => println!("Reminder for habit ID: {} set to {time}.", habit.id),
        None => println!("Reminder for habit ID: {} cleared.", habit.id),
    }
    Ok(())
}

async fn handle_habit_remove(store: &mut HabitStore, args: HabitRemove) -> Result<(), AppError> {
    let removed = store.remove_habit(args.id).await?;
    println!("Habit ID: {} removed.", removed.id);
    Ok(())
}

async fn handle_habit_reorder(
    store: &mut HabitStore,
    args: HabitReorder,
    today: NaiveDate,
) -> Result<(), AppError> {
    store.reorder(&args.ids).await?;
    println!("Reordered habits:");
    println!("{}", format_habit_list(store.habits(), today));
    Ok(())
}

async fn handle_habit_move(
    store: &mut HabitStore,
    args: HabitMove,
    today: NaiveDate,
) -> Result<(), AppError> {
    let habits = store.move_habit(args.id, args.to).await?;
    println!("Reordered habits:");
    println!("{}", format_habit_list(habits, today));
    Ok(())
}

async fn handle_habit_reset(store: &mut HabitStore, args: HabitReset) -> Result<(), AppError> {
    if !args.yes {
        return Err(AppError::invalid(
            "reset removes every habit and cannot be undone; pass --yes to confirm",
        ));
    }
    let removed = store.reset_all().await?;
    println!("Removed {removed} habits.");
    Ok(())
}

async fn handle_category(store: &mut HabitStore, command: CategoryCommand) -> Result<(), AppError> {
    match command {
        CategoryCommand::List(_) => {
            if store.categories().is_empty() {
                println!("No categories.");
            }
            for label in store.categories() {
                println!("{label}");
            }
        }
        CategoryCommand::Add(CategoryLabel { label }) => {
            store.add_category(&label).await?;
            println!("Added category: {}", label.trim());
        }
        CategoryCommand::Remove(CategoryLabel { label }) => {
            store.remove_category(&label).await?;
            println!("Removed category: {}", label.trim());
        }
    }
    Ok(())
}

async fn handle_theme(store: &mut HabitStore, args: ThemeArgs) -> Result<(), AppError> {
    match args.theme {
        Some(theme) => {
            let theme = theme_from_arg(theme);
            store.set_theme(theme).await?;
            println!("Theme set to {}.", theme.as_str());
        }
        None => println!("Theme: {}", store.theme().as_str()),
    }
    Ok(())
}

fn handle_remind_list(store: &HabitStore) -> Result<(), AppError> {
    if store.reminders().is_empty() {
        println!("No reminders.");
        return Ok(());
    }
    println!("{:<6} {:<14} {}", "TIME", "ID", "NAME");
    for entry in store.reminders() {
        let habit = store.habit(entry.habit_id)?;
        println!("{:<6} {:<14} {}", entry.time, entry.habit_id, habit.name);
    }
    Ok(())
}

/// Runs until interrupted, reloading reminder snapshots every tick. The
/// database lock is held only while reading.
async fn handle_remind_watch(db_path: &Path, args: RemindWatch) -> Result<(), AppError> {
    if args.interval == 0 {
        return Err(AppError::invalid("interval must be at least 1 second"));
    }
    let (mut manager, mut notices) = ReminderManager::new();
    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval));
    println!("Watching reminders; press Ctrl-C to stop.");

    loop {
        tokio::select! {
            _ = ticker.tick() => refresh_reminders(&mut manager, db_path).await,
            Some(notice) = notices.recv() => {
                println!("Reminder: Don't forget to complete your habit: {}", notice.name);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

/// A failed reload keeps the timers already running until the next tick.
async fn refresh_reminders(manager: &mut ReminderManager, db_path: &Path) {
    match read_reminder_snapshots(db_path).await {
        Ok(snapshots) => {
            manager.sync(snapshots);
            tracing::debug!(active = manager.active(), "reminders synced");
        }
        Err(err) => tracing::warn!(active = manager.active(), "reminder reload failed: {err}"),
    }
}

/// Waiting for the file lock blocks, so the whole read runs on the blocking
/// pool instead of an async worker.
async fn read_reminder_snapshots(db_path: &Path) -> Result<Vec<ReminderSnapshot>, AppError> {
    let db_path = db_path.to_path_buf();
    let runtime = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || -> Result<Vec<ReminderSnapshot>, AppError> {
        let mut lock = db::open_lock(&db_path)?;
        let _guard = lock.write()?;
        runtime.block_on(async {
            let store = open_store(&db_path).await?;
            Ok::<_, AppError>(store.reminder_snapshots())
        })
    })
    .await
    .map_err(|err| AppError::Io(std::io::Error::other(err)))?
}

fn resolve_data_dir(flag: Option<PathBuf>) -> Result<PathBuf, AppError> {
    let dir = match flag {
        Some(dir) => dir,
        None => match std::env::var(DATA_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => {
                let home = std::env::var("HOME").map_err(|_| {
                    AppError::invalid(format!(
                        "unable to resolve data directory; set {DATA_DIR_ENV} or pass --data-dir"
                    ))
                })?;
                PathBuf::from(home).join(DATA_DIR_NAME)
            }
        },
    };
    if dir.is_absolute() {
        Ok(dir)
    } else {
        Ok(std::env::current_dir()?.join(dir))
    }
}

fn theme_from_arg(arg: ThemeArg) -> Theme {
    match arg {
        ThemeArg::Light => Theme::Light,
        ThemeArg::Dark => Theme::Dark,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReminderTime;
    use tempfile::TempDir;

    fn snapshot(habit_id: i64) -> ReminderSnapshot {
        ReminderSnapshot {
            habit_id,
            name: "Walk".to_string(),
            time: ReminderTime::new(9, 0).expect("time"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_reload_keeps_running_reminders() {
        let dir = TempDir::new().expect("temp dir");
        let not_a_dir = dir.path().join("blocker");
        std::fs::write(&not_a_dir, "").expect("write file");

        let (mut manager, _notices) = ReminderManager::new();
        manager.sync(vec![snapshot(1)]);
        refresh_reminders(&mut manager, &db::resolve_db_path(&not_a_dir)).await;
        assert_eq!(manager.active(), 1);

        refresh_reminders(&mut manager, &db::resolve_db_path(dir.path())).await;
        assert_eq!(manager.active(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reads_reminders_from_the_store() {
        let dir = TempDir::new().expect("temp dir");
        let db_path = db::resolve_db_path(dir.path());
        let mut store = open_store(&db_path).await.expect("open store");
        let habit = store
            .add_habit("Walk", "Health", ReminderTime::new(7, 30))
            .await
            .expect("add habit");
        store.close().await.expect("close");

        let snapshots = read_reminder_snapshots(&db_path).await.expect("read");
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].habit_id, habit.id);
        assert_eq!(snapshots[0].time.to_string(), "07:30");
    }
}

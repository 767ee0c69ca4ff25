use chrono::NaiveDate;

/// Length of the run of consecutive days ending at the latest completion.
///
/// Dates are sorted first, so input order does not matter. A gap of one day
/// extends the run, a longer gap restarts it at one. The result is not
/// adjusted for how long ago the latest completion was; see
/// [`is_streak_active`] for that.
pub fn calculate_streak<'a, I>(completions: I) -> u32
where
    I: IntoIterator<Item = &'a NaiveDate>,
{
    let mut dates: Vec<NaiveDate> = completions.into_iter().copied().collect();
    if dates.is_empty() {
        return 0;
    }
    dates.sort_unstable();

    let mut streak = 1;
    for pair in dates.windows(2) {
        let gap = (pair[1] - pair[0]).num_days();
        if gap == 1 {
            streak += 1;
        } else if gap > 1 {
            streak = 1;
        }
    }
    streak
}

/// Whether a streak ending at `last_completion` can still be extended today.
pub fn is_streak_active(last_completion: Option<NaiveDate>, today: NaiveDate) -> bool {
    match last_completion {
        Some(last) => last == today || last.succ_opt() == Some(today),
        None => false,
    }
}

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .with_context(|| format!("invalid date {s:?} (expected YYYY-MM-DD)"))
}

/// The hotel's "today", resolved once per run.
///
/// An explicit `evaluation_date_arg` wins; otherwise `now_utc` is shifted into the hotel's fixed
/// UTC offset and truncated to a date.
pub fn resolve_evaluation_date(
    evaluation_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
    utc_offset_hours: i32,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = evaluation_date_arg {
        return parse_date(s);
    }

    let offset = chrono::FixedOffset::east_opt(utc_offset_hours * 3600)
        .with_context(|| format!("invalid hotel UTC offset: {utc_offset_hours}h"))?;
    Ok(now_utc.with_timezone(&offset).date_naive())
}

/// Every night from `start` to `end`, inclusive.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> anyhow::Result<Vec<NaiveDate>> {
    anyhow::ensure!(start <= end, "end_date {end} is before start_date {start}");

    let mut out = Vec::with_capacity(nights_inclusive(start, end) as usize);
    let mut d = start;
    while d <= end {
        out.push(d);
        d += Duration::days(1);
    }
    Ok(out)
}

pub fn nights_inclusive(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

//! Reporting period grammar and date-range resolution
//!
//! A period string like `30d`, `q1-2025`, or `january` resolves to an
//! inclusive pair of calendar dates that parametrize every recipe query.

use chrono::{Datelike, Days, Local, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Errors produced while resolving a reporting period
#[derive(Debug, thiserror::Error)]
pub enum PeriodError {
    #[error("Unrecognized period '{input}'; run 'scanreport periods' for supported forms")]
    Unrecognized { input: String },

    #[error("Invalid date '{input}': expected YYYY-MM-DD")]
    InvalidDate { input: String },

    #[error("Start date {start} is after end date {end}")]
    StartAfterEnd { start: NaiveDate, end: NaiveDate },
}

/// Inclusive date range a report run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PeriodError> {
        if start > end {
            return Err(PeriodError::StartAfterEnd { start, end });
        }
        Ok(Self { start, end })
    }

    /// Last `n` days ending today; the default run period is `last_n_days(30)`
    pub fn last_n_days(n: u64) -> Self {
        let end = Local::now().date_naive();
        let start = end.checked_sub_days(Days::new(n)).unwrap_or(end);
        Self { start, end }
    }

    /// Parse explicit `YYYY-MM-DD` boundary dates
    pub fn from_dates(start: &str, end: &str) -> Result<Self, PeriodError> {
        let start = parse_iso_date(start)?;
        let end = parse_iso_date(end)?;
        Self::new(start, end)
    }

    /// Resolve a period expression against today's date
    pub fn parse(input: &str) -> Result<Self, PeriodError> {
        parse_with_today(input, Local::now().date_naive())
    }

    /// Period start as an API timestamp, midnight-anchored
    pub fn start_timestamp(&self, utc_suffix: bool) -> String {
        let suffix = if utc_suffix { "Z" } else { "" };
        format!("{}T00:00:00{}", self.start.format("%Y-%m-%d"), suffix)
    }

    /// Period end as an API timestamp, end-of-day-anchored
    pub fn end_timestamp(&self, utc_suffix: bool) -> String {
        let suffix = if utc_suffix { "Z" } else { "" };
        format!("{}T23:59:59{}", self.end.format("%Y-%m-%d"), suffix)
    }
}

impl std::fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

fn parse_iso_date(input: &str) -> Result<NaiveDate, PeriodError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|_| PeriodError::InvalidDate {
        input: input.to_string(),
    })
}

fn unrecognized(input: &str) -> PeriodError {
    PeriodError::Unrecognized {
        input: input.to_string(),
    }
}

fn ymd(input: &str, year: i32, month: u32, day: u32) -> Result<NaiveDate, PeriodError> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| unrecognized(input))
}

fn last_day_of_month(input: &str, year: i32, month: u32) -> Result<NaiveDate, PeriodError> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    ymd(input, next_year, next_month, 1)?
        .checked_sub_days(Days::new(1))
        .ok_or_else(|| unrecognized(input))
}

fn quarter_of_month(month: u32) -> u32 {
    (month - 1) / 3 + 1
}

fn quarter_bounds(input: &str, year: i32, quarter: u32) -> Result<(NaiveDate, NaiveDate), PeriodError> {
    let start_month = (quarter - 1) * 3 + 1;
    let start = ymd(input, year, start_month, 1)?;
    let end = last_day_of_month(input, year, start_month + 2)?;
    Ok((start, end))
}

fn month_number(name: &str) -> Option<u32> {
    let months = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    months
        .iter()
        .position(|m| *m == name || (name.len() == 3 && m.starts_with(name)))
        .map(|idx| idx as u32 + 1)
}

/// Core parser, factored over `today` so tests stay deterministic
pub fn parse_with_today(input: &str, today: NaiveDate) -> Result<ReportPeriod, PeriodError> {
    let spec = input.trim().to_ascii_lowercase();
    if spec.is_empty() {
        return Err(unrecognized(input));
    }

    // Relative windows: 7d, 4w, 3m, 1y
    if let Some(unit) = spec.chars().last() {
        if matches!(unit, 'd' | 'w' | 'm' | 'y') {
            let count = &spec[..spec.len() - 1];
            if !count.is_empty() && count.chars().all(|c| c.is_ascii_digit()) {
                let n: u64 = count.parse().map_err(|_| unrecognized(input))?;
                let start = match unit {
                    'd' => today.checked_sub_days(Days::new(n)),
                    'w' => today.checked_sub_days(Days::new(n * 7)),
                    'm' => today.checked_sub_months(Months::new(n as u32)),
                    _ => today.checked_sub_months(Months::new(n as u32 * 12)),
                }
                .ok_or_else(|| unrecognized(input))?;
                return ReportPeriod::new(start, today);
            }
        }
    }

    // To-date windows
    match spec.as_str() {
        "ytd" => {
            let start = ymd(input, today.year(), 1, 1)?;
            return ReportPeriod::new(start, today);
        }
        "mtd" => {
            let start = ymd(input, today.year(), today.month(), 1)?;
            return ReportPeriod::new(start, today);
        }
        "qtd" => {
            let quarter = quarter_of_month(today.month());
            let start_month = (quarter - 1) * 3 + 1;
            let start = ymd(input, today.year(), start_month, 1)?;
            return ReportPeriod::new(start, today);
        }
        _ => {}
    }

    // Calendar quarters: q1, q3-2024
    if let Some(rest) = spec.strip_prefix('q') {
        let (quarter_str, year) = match rest.split_once('-') {
            Some((q, y)) => {
                let year: i32 = y.parse().map_err(|_| unrecognized(input))?;
                (q, year)
            }
            None => (rest, today.year()),
        };
        if let Ok(quarter) = quarter_str.parse::<u32>() {
            if (1..=4).contains(&quarter) {
                let (start, end) = quarter_bounds(input, year, quarter)?;
                return ReportPeriod::new(start, end);
            }
        }
        return Err(unrecognized(input));
    }

    // Whole calendar year
    if spec.len() == 4 && spec.chars().all(|c| c.is_ascii_digit()) {
        let year: i32 = spec.parse().map_err(|_| unrecognized(input))?;
        let start = ymd(input, year, 1, 1)?;
        let end = ymd(input, year, 12, 31)?;
        return ReportPeriod::new(start, end);
    }

    // Month by name: january, jan-2024
    let (month_str, year) = match spec.split_once('-') {
        Some((m, y)) => {
            let year: i32 = y.parse().map_err(|_| unrecognized(input))?;
            (m, year)
        }
        None => (spec.as_str(), today.year()),
    };
    if let Some(month) = month_number(month_str) {
        let start = ymd(input, year, month, 1)?;
        let end = last_day_of_month(input, year, month)?;
        return ReportPeriod::new(start, end);
    }

    Err(unrecognized(input))
}

/// Human-readable period grammar, shown by the `periods` CLI command
pub fn help_text() -> String {
    [
        "Supported period expressions (case-insensitive):",
        "",
        "  Relative windows, ending today:",
        "    7d, 30d, 90d      last N days",
        "    4w                last N weeks",
        "    3m, 6m            last N months",
        "    1y                last N years",
        "",
        "  To date:",
        "    ytd               January 1st to today",
        "    mtd               1st of this month to today",
        "    qtd               start of this quarter to today",
        "",
        "  Calendar ranges:",
        "    q1, q2, q3, q4    quarter of the current year",
        "    q1-2024           quarter of a given year",
        "    2024              whole calendar year",
        "    january, jan      month of the current year",
        "    january-2024      month of a given year",
        "",
        "  Explicit dates always win: --start 2024-01-01 --end 2024-03-31",
    ]
    .join("\n")
}

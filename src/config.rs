use std::{
    collections::HashMap,
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use tracing::{debug, info};

use crate::{
    error::ConfigError,
    model::{SortBy, TimestampField},
    storage::OutputFormat,
};

pub const DEFAULT_ENV_FILE: &str = "weekly.env";

const DEFAULT_QUERY: &str = "cat:cs.CV";
const DEFAULT_PAGE_SIZE: usize = 1000;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_RETRY_BASE_MS: u64 = 1000;
const DEFAULT_RETRY_MAX_MS: u64 = 30_000;
const DEFAULT_PAGE_DELAY_MS: u64 = 3000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

const DEFAULT_BORING_WORDS: &[&str] = &[
    "Survey",
    "Benchmark",
    "Dataset",
    "Challenge",
    "Workshop",
    "Competition",
];

/// Title substrings that disqualify a paper. Matching is case-sensitive
/// and purely substring based.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoringWords {
    words: Vec<String>,
}

impl BoringWords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BoringWords {
            words: words
                .into_iter()
                .map(Into::<String>::into)
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    pub fn embedded() -> Self {
        Self::new(DEFAULT_BORING_WORDS.iter().copied())
    }

    /// One word per line; blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(|line| line.trim_end_matches('\r'))
                .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
                .map(|line| line.trim()),
        )
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::BoringWords {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    pub fn from_csv_list(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim))
    }

    pub fn extend(&mut self, other: BoringWords) {
        for word in other.words {
            if !self.words.contains(&word) {
                self.words.push(word);
            }
        }
    }

    pub fn matches(&self, title: &str) -> bool {
        self.words.iter().any(|w| title.contains(w.as_str()))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }
}

/// Bounded retry for the empty-page fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_MS),
        }
    }
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Backoff before the retry that follows failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub query: String,
    pub page_size: usize,
    pub sort_by: SortBy,
    pub stop_field: TimestampField,
    pub cutoff: DateTime<Utc>,
    pub page_delay: Duration,
    pub request_timeout: Duration,
}

impl SearchConfig {
    pub fn new(query: &str, page_size: usize, sort_by: SortBy, cutoff: DateTime<Utc>) -> Self {
        SearchConfig {
            query: query.to_string(),
            page_size,
            sort_by,
            stop_field: sort_by.natural_field(),
            cutoff,
            page_delay: Duration::from_millis(DEFAULT_PAGE_DELAY_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub cutoff: DateTime<Utc>,
    pub window_field: TimestampField,
    pub boring_words: BoringWords,
    pub category: Option<String>,
}

impl FilterConfig {
    pub fn new(cutoff: DateTime<Utc>, boring_words: BoringWords) -> Self {
        FilterConfig {
            cutoff,
            window_field: TimestampField::Published,
            boring_words,
            category: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    pub path: Option<PathBuf>,
    pub format: Option<OutputFormat>,
}

impl OutputConfig {
    /// Falls back to `this_week_papers_<cutoff>.csv` and to the format
    /// implied by the file extension.
    pub fn resolve(&self, cutoff: &DateTime<Utc>) -> (PathBuf, OutputFormat) {
        let path = self.path.clone().unwrap_or_else(|| {
            PathBuf::from(format!("this_week_papers_{}.csv", cutoff.format("%Y_%m_%d")))
        });
        let format = self
            .format
            .unwrap_or_else(|| OutputFormat::from_path(&path));
        (path, format)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub search: SearchConfig,
    pub retry: RetryPolicy,
    pub filter: FilterConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Loads `env_file` (or the default `weekly.env` when present), then reads
    /// settings from `overrides` first and the process environment second.
    pub fn from_env(
        env_file: Option<&Path>,
        overrides: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        load_env_file(env_file)?;
        Self::from_vars(|key| overrides.get(key).cloned().or_else(|| env::var(key).ok()))
    }

    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let query = lookup("QUERY").unwrap_or_else(|| DEFAULT_QUERY.to_string());
        let page_size = get_positive(&lookup, "PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        let sort_by: SortBy = get_parsed(&lookup, "SORT_BY")?.unwrap_or(SortBy::LastUpdatedDate);
        let stop_field = get_parsed(&lookup, "STOP_FIELD")?.unwrap_or(sort_by.natural_field());
        let window_field = get_parsed(&lookup, "WINDOW_FIELD")?.unwrap_or(TimestampField::Published);

        let cutoff = match lookup("CUTOFF") {
            Some(raw) => parse_cutoff(&raw).map_err(|reason| ConfigError::invalid("CUTOFF", &raw, reason))?,
            None => start_of_week(Utc::now()),
        };

        let category = lookup("CATEGORY")
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let boring_words = load_boring_words(&lookup)?;

        let retry = RetryPolicy {
            max_attempts: get_positive(&lookup, "MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            base_delay: Duration::from_millis(get_u64(&lookup, "RETRY_BASE_MS", DEFAULT_RETRY_BASE_MS)?),
            max_delay: Duration::from_millis(get_u64(&lookup, "RETRY_MAX_MS", DEFAULT_RETRY_MAX_MS)?),
        };

        let mut search = SearchConfig::new(&query, page_size, sort_by, cutoff);
        search.stop_field = stop_field;
        search.page_delay = Duration::from_millis(get_u64(&lookup, "PAGE_DELAY_MS", DEFAULT_PAGE_DELAY_MS)?);
        search.request_timeout = Duration::from_secs(get_positive(
            &lookup,
            "REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);

        let mut filter = FilterConfig::new(cutoff, boring_words);
        filter.window_field = window_field;
        filter.category = category;

        let output = OutputConfig {
            path: lookup("OUTPUT").filter(|p| !p.trim().is_empty()).map(PathBuf::from),
            format: get_parsed(&lookup, "OUTPUT_FORMAT")?,
        };

        Ok(Config {
            search,
            retry,
            filter,
            output,
        })
    }
}

fn load_env_file(env_file: Option<&Path>) -> Result<(), ConfigError> {
    let (path, explicit) = match env_file {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_ENV_FILE), false),
    };
    match dotenvy::from_filename(&path) {
        Ok(loaded) => {
            debug!(path = %loaded.display(), "loaded env file");
            Ok(())
        }
        Err(e) if e.not_found() && !explicit => Ok(()),
        Err(e) => Err(ConfigError::EnvFile {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
    }
}

fn load_boring_words<F>(lookup: &F) -> Result<BoringWords, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let file = lookup("BORING_WORDS_FILE").filter(|p| !p.trim().is_empty());
    let inline = lookup("BORING_WORDS");

    if file.is_none() && inline.is_none() {
        let words = BoringWords::embedded();
        info!(count = words.len(), "using embedded boring words");
        return Ok(words);
    }

    let mut words = BoringWords::default();
    if let Some(path) = file {
        words.extend(BoringWords::from_file(Path::new(&path))?);
    }
    if let Some(list) = inline {
        words.extend(BoringWords::from_csv_list(&list));
    }
    info!(count = words.len(), "loaded boring words");
    Ok(words)
}

/// Monday 00:00 UTC of the week containing `now`.
pub fn start_of_week(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_back = now.weekday().num_days_from_monday() as i64;
    let monday = now.date_naive() - ChronoDuration::days(days_back);
    Utc.from_utc_datetime(&monday.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_cutoff(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| format!("expected RFC 3339 or YYYY-MM-DD: {}", e))
        .and_then(|date| {
            date.and_hms_opt(0, 0, 0)
                .map(|dt| Utc.from_utc_datetime(&dt))
                .ok_or_else(|| "invalid midnight".to_string())
        })
}

fn get_u64<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid(key, &raw, "expected a non-negative integer")),
        None => Ok(default),
    }
}

/// Parses a strictly positive integer in the target width, so values that
/// overflow it are rejected rather than truncated.
fn get_positive<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Default + PartialEq,
    T::Err: fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let var: T = raw
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, &raw, format!("expected a positive integer: {}", e)))?;
    if var == T::default() {
        return Err(ConfigError::invalid(key, &raw, "must be positive"));
    }
    Ok(var)
}

fn get_parsed<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr<Err = String>,
{
    lookup(key)
        .map(|raw| raw.parse::<T>().map_err(|reason| ConfigError::invalid(key, &raw, reason)))
        .transpose()
}

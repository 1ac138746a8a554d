use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// 末尾の時刻部分を切り出すための正規表現。
static TIME_SUFFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?xi)
^(.*?)
(?:
  (?:^|\s+) (?:at\s+)?
  (\d{1,2}):(\d{2})(?::(\d{2}))?
)?
$",
    )
    .expect("Could not parse Regex")
});

static ISO_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").expect("Could not parse Regex"));

static DOTTED_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{4})$").expect("Could not parse Regex"));

static RELATIVE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?xi)
^
(?:(in)\s+)?
(\d+|a|an|one)
\s*
(day|week|month|year)s?
(?:\s+(ago))?
$",
    )
    .expect("Could not parse Regex")
});

static WEEKDAY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(last)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tue|wed|thu|fri|sat|sun)$")
        .expect("Could not parse Regex")
});

/// 日付を表す式をパースする。
///
/// `today`を基準日として、`yesterday`や`5 days ago`のような相対的な表現と、
/// `2020-10-01`のような絶対的な表現を解釈する。
/// 時刻が書かれていればその時刻を、なければ00:00:00を返す。
/// 時刻を含むかどうかの判断は呼び出し側で行う。
pub fn parse_date_expr(expr: &str, today: NaiveDate) -> Option<NaiveDateTime> {
    let captures = TIME_SUFFIX_REGEX.captures(expr.trim())?;
    let date_part = captures.get(1).map_or("", |m| m.as_str()).trim();
    let time = parse_time(&captures)?;

    let date = if date_part.is_empty() {
        // 時刻だけが書かれている場合は今日とする
        captures.get(2)?;
        today
    } else {
        parse_date(date_part, today)?
    };

    Some(date.and_time(time))
}

fn parse_time(captures: &Captures) -> Option<NaiveTime> {
    match (captures.get(2), captures.get(3)) {
        (Some(hour), Some(minute)) => {
            let second = captures.get(4).map_or(Some(0), |m| m.as_str().parse().ok())?;
            NaiveTime::from_hms_opt(
                hour.as_str().parse().ok()?,
                minute.as_str().parse().ok()?,
                second,
            )
        }
        _ => Some(NaiveTime::MIN),
    }
}

fn parse_date(date: &str, today: NaiveDate) -> Option<NaiveDate> {
    match date.to_ascii_lowercase().as_str() {
        "today" | "now" => return Some(today),
        "yesterday" => return today.pred_opt(),
        "tomorrow" => return today.succ_opt(),
        _ => {}
    }

    if let Some(captures) = ISO_REGEX.captures(date) {
        return NaiveDate::from_ymd_opt(
            captures[1].parse().ok()?,
            captures[2].parse().ok()?,
            captures[3].parse().ok()?,
        );
    }

    if let Some(captures) = DOTTED_REGEX.captures(date) {
        return NaiveDate::from_ymd_opt(
            captures[3].parse().ok()?,
            captures[2].parse().ok()?,
            captures[1].parse().ok()?,
        );
    }

    if let Some(captures) = RELATIVE_REGEX.captures(date) {
        return parse_relative(&captures, today);
    }

    if let Some(captures) = WEEKDAY_REGEX.captures(date) {
        let weekday: Weekday = captures[2].parse().ok()?;
        let mut days_back = today.weekday().days_since(weekday);
        if days_back == 0 && captures.get(1).is_some() {
            days_back = 7;
        }
        return today.checked_sub_days(Days::new(days_back.into()));
    }

    None
}

fn parse_relative(captures: &Captures, today: NaiveDate) -> Option<NaiveDate> {
    let future = captures.get(1).is_some();
    let past = captures.get(4).is_some();
    // "in 5 days ago"のような矛盾した表現と、方向のない"5 days"は受け付けない
    if future == past {
        return None;
    }

    let count: u32 = match captures[2].to_ascii_lowercase().as_str() {
        "a" | "an" | "one" => 1,
        digits => digits.parse().ok()?,
    };

    match captures[3].to_ascii_lowercase().as_str() {
        "day" => shift_days(today, u64::from(count), future),
        "week" => shift_days(today, u64::from(count) * 7, future),
        "month" => shift_months(today, count, future),
        "year" => shift_months(today, count.checked_mul(12)?, future),
        _ => None,
    }
}

fn shift_days(date: NaiveDate, days: u64, future: bool) -> Option<NaiveDate> {
    if future {
        date.checked_add_days(Days::new(days))
    } else {
        date.checked_sub_days(Days::new(days))
    }
}

fn shift_months(date: NaiveDate, months: u32, future: bool) -> Option<NaiveDate> {
    if future {
        date.checked_add_months(Months::new(months))
    } else {
        date.checked_sub_months(Months::new(months))
    }
}

use chrono::{DateTime, NaiveDate, NaiveTime, SubsecRound};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dateexpr::parse_date_expr;
use crate::datetime::localize;
use crate::error::Error;
use crate::time_entry::TimeEntry;

static TIMESPAN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d\d?:\d\d?|/|now)-(\d\d?:\d\d?|/|now)$").expect("Could not parse Regex")
});

/// タイムスパンの片側。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimePoint {
    /// `now`
    Now,
    /// `H:MM`または`HH:MM`
    At(NaiveTime),
    /// `/`
    Open,
}

/// 1つの引数から取り出した開始と終了の組。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timespan {
    pub start: TimePoint,
    pub end: TimePoint,
}

/// 引数を分類した結果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive<'a> {
    Timespan(Timespan),
    Tag(&'a str),
    Project(&'a str),
    Billable,
    Date(&'a str),
    Workspace(&'a str),
    Description(&'a str),
}

/// 実行するモード。モードによって許される引数の組み合わせが異なる。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// 1日分のエントリーを追加、表示する。
    Day,
    /// 1ヶ月(または1年)分のエントリーを表示する。プロジェクトとタグはフィルタになる。
    Dump,
    /// conky向けの1行を表示する。
    Status,
}

/// 引数を解釈した結果。
#[derive(Debug, PartialEq)]
pub struct Invocation {
    /// 送信するエントリー。引数に書かれた順に並ぶ。
    pub entries: Vec<TimeEntry>,
    pub date: NaiveDate,
    pub tags: Vec<String>,
    pub project: Option<String>,
    pub workspace: Option<String>,
}

/// 位置引数のミニ言語を解釈する。
///
/// ```text
/// HH:MM-HH:MM    指定した時刻のエントリーを追加する
/// HH:MM-/        指定した時刻から計測を開始する
/// /-HH:MM        指定した時刻で計測を終了する
/// now-/, start   今から計測を開始する
/// /-now, stop    今で計測を終了する
/// +tag           全てのエントリーにタグを付ける
/// @project       全てのエントリーのプロジェクトを設定する
/// $              全てのエントリーを請求可能にする
/// ^workspace     ワークスペースを指定する
/// .date          対象の日付を指定する(".yesterday", ".5 days ago", ".2020-10-01")
/// description    それ以外は空白で連結して説明にする
/// ```
pub struct ArgumentParser {
    now: DateTime<Tz>,
    mode: Mode,
}

/// 1回の解釈の間だけ使う途中状態。
#[derive(Default)]
struct ParserState<'a> {
    timespans: Vec<Timespan>,
    description: Vec<&'a str>,
    billable: bool,
    project: Option<String>,
    tags: Vec<String>,
    workspace: Option<String>,
    date: Option<NaiveDate>,
}

/// 引数を1つ分類する。
///
/// 次の順で判定し、最初に一致したものを返す。
/// タイムスパン、`start`/`stop`、先頭の記号、それ以外(説明)。
pub fn classify(token: &str) -> Result<Directive<'_>, Error> {
    if let Some(captures) = TIMESPAN_REGEX.captures(token) {
        return parse_timespan(&captures[1], &captures[2]).map(Directive::Timespan);
    }

    match token {
        "start" => {
            return Ok(Directive::Timespan(Timespan {
                start: TimePoint::Now,
                end: TimePoint::Open,
            }))
        }
        "stop" => {
            return Ok(Directive::Timespan(Timespan {
                start: TimePoint::Open,
                end: TimePoint::Now,
            }))
        }
        "" => return Err(Error::usage("Empty argument")),
        _ => {}
    }

    let mut chars = token.chars();
    let sigil = chars.next();
    let payload = chars.as_str();
    match sigil {
        Some('+') => non_empty(payload, "tag").map(Directive::Tag),
        Some('@') => non_empty(payload, "project").map(Directive::Project),
        Some('$') if payload.is_empty() => Ok(Directive::Billable),
        Some('$') => Err(Error::usage(format!("Invalid billable argument {payload}"))),
        Some('.') => Ok(Directive::Date(payload)),
        Some('^') => non_empty(payload, "workspace").map(Directive::Workspace),
        _ => Ok(Directive::Description(token)),
    }
}

/// 全ての引数を分類する。
///
/// 現在時刻やタイムゾーンを必要としないため、APIに問い合わせる前に書式の誤りを検出できる。
pub fn classify_all<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Directive<'_>>, Error> {
    tokens.iter().map(|token| classify(token.as_ref())).collect()
}

fn non_empty<'a>(payload: &'a str, what: &str) -> Result<&'a str, Error> {
    if payload.is_empty() {
        Err(Error::usage(format!("Empty {what} given")))
    } else {
        Ok(payload)
    }
}

fn parse_timespan(start: &str, end: &str) -> Result<Timespan, Error> {
    let timespan = Timespan {
        start: parse_time_point(start)?,
        end: parse_time_point(end)?,
    };
    if timespan.start == TimePoint::Open && timespan.end == TimePoint::Open {
        return Err(Error::usage("Either start or end time needs to be given"));
    }

    Ok(timespan)
}

fn parse_time_point(point: &str) -> Result<TimePoint, Error> {
    match point {
        "now" => Ok(TimePoint::Now),
        "/" => Ok(TimePoint::Open),
        _ => {
            let (hour, minute) = point
                .split_once(':')
                .ok_or_else(|| Error::usage(format!("Invalid time {point}")))?;
            hour.parse()
                .ok()
                .zip(minute.parse().ok())
                .and_then(|(hour, minute)| NaiveTime::from_hms_opt(hour, minute, 0))
                .map(TimePoint::At)
                .ok_or_else(|| Error::usage(format!("Invalid time {point}")))
        }
    }
}

impl<'a> ParserState<'a> {
    fn apply(&mut self, directive: Directive<'a>, today: NaiveDate) -> Result<(), Error> {
        match directive {
            Directive::Timespan(timespan) => self.timespans.push(timespan),
            Directive::Tag(tag) => self.tags.push(tag.to_string()),
            Directive::Project(project) => {
                // 同じプロジェクトの繰り返しは許す
                if let Some(existing) = self.project.as_deref().filter(|&p| p != project) {
                    return Err(Error::usage(format!(
                        "Multiple projects: {existing}, {project}"
                    )));
                }
                self.project = Some(project.to_string());
            }
            Directive::Billable => self.billable = true,
            Directive::Date(expr) => self.date = Some(self.parse_date(expr, today)?),
            Directive::Workspace(workspace) => {
                if let Some(existing) = &self.workspace {
                    return Err(Error::usage(format!(
                        "Multiple workspaces: {existing}, {workspace}"
                    )));
                }
                self.workspace = Some(workspace.to_string());
            }
            Directive::Description(word) => self.description.push(word),
        }

        Ok(())
    }

    fn parse_date(&self, expr: &str, today: NaiveDate) -> Result<NaiveDate, Error> {
        if self.date.is_some() {
            return Err(Error::usage("Multiple dates"));
        }

        let parsed = parse_date_expr(expr, today)
            .ok_or_else(|| Error::usage(format!("Couldn't parse date {expr}")))?;
        if parsed.time() != NaiveTime::MIN {
            return Err(Error::usage(format!("Date {expr} contains unexpected time")));
        }

        Ok(parsed.date())
    }
}

impl ArgumentParser {
    /// 新しい`ArgumentParser`を返す。
    ///
    /// # Arguments
    ///
    /// * `now` - ユーザーのタイムゾーンでの現在時刻。`now`と今日の日付の基準になる。
    /// * `mode` - 実行するモード
    pub fn new(now: DateTime<Tz>, mode: Mode) -> Self {
        Self { now, mode }
    }

    fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// 引数を解釈する。
    ///
    /// 1つでも解釈できない引数があれば全体をエラーとする。
    pub fn parse<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Invocation, Error> {
        self.parse_directives(classify_all(tokens)?)
    }

    /// `classify_all`で分類済みの引数を解釈する。
    pub fn parse_directives(&self, directives: Vec<Directive<'_>>) -> Result<Invocation, Error> {
        let mut state = ParserState::default();
        for directive in directives {
            state.apply(directive, self.today())?;
        }

        self.assemble(state)
    }

    fn assemble(&self, state: ParserState) -> Result<Invocation, Error> {
        let date = state.date.unwrap_or_else(|| self.today());
        let description = if state.description.is_empty() {
            None
        } else {
            Some(state.description.join(" "))
        };

        let entries = state
            .timespans
            .iter()
            .map(|timespan| {
                let start = self.resolve(timespan.start, date)?;
                let end = self.resolve(timespan.end, date)?;
                if let (Some(start), Some(end)) = (&start, &end) {
                    if end < start {
                        return Err(Error::usage(format!(
                            "Time entry ends at {} before it starts at {}",
                            end.format("%H:%M"),
                            start.format("%H:%M")
                        )));
                    }
                }

                Ok(TimeEntry {
                    start,
                    end,
                    description: description.clone(),
                    billable: state.billable,
                    project: state.project.clone(),
                    tags: state.tags.clone(),
                    ..Default::default()
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        if !entries.iter().any(|entry| entry.start.is_some()) {
            if let Some(description) = &description {
                return Err(Error::usage(format!(
                    "Description {description} given without new entries"
                )));
            }
            if state.billable {
                return Err(Error::usage("Billable given without new entries"));
            }

            // dumpではフィルタとして使える
            if self.mode != Mode::Dump {
                if let Some(project) = &state.project {
                    return Err(Error::usage(format!(
                        "Project {project} given without new entries"
                    )));
                }
                if !state.tags.is_empty() {
                    return Err(Error::usage(format!(
                        "Tags {} given without new entries",
                        state.tags.join(", ")
                    )));
                }
            }
        }

        match self.mode {
            Mode::Day => {}
            Mode::Dump | Mode::Status if !entries.is_empty() => {
                return Err(Error::usage(
                    "Time entries can't be added together with --dump or --conky",
                ));
            }
            Mode::Dump => {
                if let Some(date) = state.date.filter(|&date| date != self.today()) {
                    return Err(Error::usage(format!("Date {date} given with --dump")));
                }
            }
            Mode::Status => {}
        }

        Ok(Invocation {
            entries,
            date,
            tags: state.tags,
            project: state.project,
            workspace: state.workspace,
        })
    }

    fn resolve(&self, point: TimePoint, date: NaiveDate) -> Result<Option<DateTime<Tz>>, Error> {
        match point {
            TimePoint::Open => Ok(None),
            TimePoint::Now if date != self.today() => {
                Err(Error::usage("Can't combine 'now' with a different date"))
            }
            TimePoint::Now => Ok(Some(self.now.trunc_subsecs(0))),
            TimePoint::At(time) => localize(&self.now.timezone(), date.and_time(time)).map(Some),
        }
    }
}

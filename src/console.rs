use std::collections::{BTreeMap, HashSet};
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, Timelike};
use chrono_tz::Tz;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, Table};
use log::debug;
use owo_colors::{OwoColorize, Style};

use crate::datetime;
use crate::time_entry::TimeEntry;

/// Consoleにtime entryを表示するためのtrait。
pub trait ConsolePresenter {
    /// タイムエントリーを表示する。
    ///
    /// # Arguments
    ///
    /// * `time_entries` - 表示するタイムエントリー
    fn show_time_entries(&mut self, time_entries: &[TimeEntry]) -> Result<()>;
}

/// タイムエントリーを表形式で表示し、合計時間を続けて表示する。
pub struct ConsoleTable<'a, W: Write> {
    writer: &'a mut W,
    title: Option<String>,
    highlight_ids: HashSet<String>,
    color: bool,
    only_totals: bool,
}

impl<'a, W: Write> ConsoleTable<'a, W> {
    /// 新しい`ConsoleTable`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self {
            writer,
            title: None,
            highlight_ids: HashSet::new(),
            color: false,
            only_totals: false,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// 追加したエントリーのIDを設定する。設定した場合、それ以外の行は薄く表示する。
    pub fn highlight(mut self, ids: HashSet<String>) -> Self {
        self.highlight_ids = ids;
        self
    }

    pub fn color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// 表を出さずに合計時間だけを表示する。
    pub fn only_totals(mut self) -> Self {
        self.only_totals = true;
        self
    }

    fn row(&self, entry: &TimeEntry, start: DateTime<Tz>) -> Vec<Cell> {
        let end = match entry.end {
            Some(end) => Cell::new(end.format("%H:%M")),
            None => Cell::new("running"),
        };
        let mut project = Cell::new(entry.project.as_deref().unwrap_or_default());
        if let Some(color) = entry.project_color.as_deref().and_then(parse_hex_color) {
            project = project.fg(color);
        }

        let mut icons = String::new();
        if entry
            .eid
            .as_ref()
            .is_some_and(|eid| self.highlight_ids.contains(eid))
        {
            icons.push('✨');
        }
        if entry.billable {
            icons.push('$');
        }

        let mut cells = vec![
            Cell::new(entry.description.as_deref().unwrap_or_default()).fg(Color::Yellow),
            Cell::new(start.format("%H:%M")).fg(Color::Cyan),
            end.fg(Color::Cyan),
            project,
            Cell::new(entry.tags.join(", ")).fg(Color::Blue),
            Cell::new(icons),
        ];

        let dimmed = !self.highlight_ids.is_empty()
            && !entry
                .eid
                .as_ref()
                .is_some_and(|eid| self.highlight_ids.contains(eid));
        if dimmed {
            cells = cells
                .into_iter()
                .map(|cell| cell.add_attribute(Attribute::Dim))
                .collect();
        }

        cells
    }
}

impl<'a, W: Write> ConsolePresenter for ConsoleTable<'a, W> {
    // time entryを開始時刻順に表示する。
    fn show_time_entries(&mut self, time_entries: &[TimeEntry]) -> Result<()> {
        let mut sorted_entries: Vec<(&TimeEntry, DateTime<Tz>)> = time_entries
            .iter()
            .filter_map(|entry| entry.start.map(|start| (entry, start)))
            .collect();
        sorted_entries.sort_by_key(|(_, start)| *start);

        let now = datetime::now();
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["Description", "Start", "End", "Project", "Tags", ""]);
        if self.color {
            table.enforce_styling();
        } else {
            table.force_no_tty();
        }

        let mut total = Duration::zero();
        let mut project_totals: BTreeMap<String, (Option<String>, Duration)> = BTreeMap::new();
        for (entry, start) in sorted_entries {
            debug!("{:?}", entry);

            // 実行中のエントリーは現在時刻までを数える
            let duration = match entry.end {
                Some(end) => end - start,
                None => now.signed_duration_since(start),
            };
            total = total + duration;
            let project_total = project_totals
                .entry(entry.project.clone().unwrap_or_else(|| "Other".to_string()))
                .or_insert((entry.project_color.clone(), Duration::zero()));
            project_total.1 = project_total.1 + duration;

            table.add_row(self.row(entry, start));
        }

        let color = self.color;
        if !self.only_totals {
            if let Some(title) = &self.title {
                writeln!(self.writer, "{}", paint(color, title, Style::new().bold()))
                    .with_context(|| format!("Failed to write title: {}", title))?;
            }
            writeln!(self.writer, "{}", table).context("Failed to write time entries")?;
        }

        writeln!(
            self.writer,
            "{}{}",
            paint(color, "Total: ", Style::new().bold()),
            paint(color, &format_duration(total), Style::new().bold())
        )
        .context("Failed to write total")?;
        for (project, (project_color, duration)) in &project_totals {
            let style = match project_color.as_deref().and_then(parse_hex_rgb) {
                Some((r, g, b)) => Style::new().truecolor(r, g, b),
                None => Style::new(),
            };
            writeln!(
                self.writer,
                "{}: {}",
                paint(color, project, style),
                format_duration(*duration)
            )
            .with_context(|| format!("Failed to write total of {}", project))?;
        }

        Ok(())
    }
}

/// conkyの`execpi`向けに1行で表示する。
///
/// 実行中のエントリーのプロジェクトと、終了したエントリーの数を表示する。
/// 1件もない場合、おおよその勤務時間中であれば背景色を付けて目立たせる。
pub struct ConsoleConky<'a, W: Write> {
    writer: &'a mut W,
    now: DateTime<Tz>,
    error_color: String,
}

impl<'a, W: Write> ConsoleConky<'a, W> {
    /// 新しい`ConsoleConky`を返す。
    ///
    /// # Arguments
    ///
    /// * `now` - ユーザーのタイムゾーンでの現在時刻
    /// * `error_color` - エントリーがない時の背景色
    pub fn new(writer: &'a mut W, now: DateTime<Tz>, error_color: impl Into<String>) -> Self {
        Self {
            writer,
            now,
            error_color: error_color.into(),
        }
    }

    fn is_working_hours(&self) -> bool {
        self.now.weekday().num_days_from_monday() < 5 && (8..=18).contains(&self.now.hour())
    }
}

impl<'a, W: Write> ConsolePresenter for ConsoleConky<'a, W> {
    fn show_time_entries(&mut self, time_entries: &[TimeEntry]) -> Result<()> {
        let running: Vec<&TimeEntry> = time_entries
            .iter()
            .filter(|entry| entry.end.is_none())
            .collect();

        let mut parts: Vec<String> = running
            .iter()
            .map(|entry| {
                format!(
                    "%{{F{}}}{}%{{F-}}",
                    entry.project_color.as_deref().unwrap_or("#ffffff"),
                    entry.project.as_deref().unwrap_or("Other")
                )
            })
            .collect();

        let finished_count = time_entries.len() - running.len();
        if finished_count > 0 {
            if !parts.is_empty() {
                parts.push("+".to_string());
            }
            parts.push(finished_count.to_string());
        } else if running.is_empty() {
            if self.is_working_hours() {
                parts.push(format!("%{{B{}}} none %{{B-}}", self.error_color));
            } else {
                parts.push("none".to_string());
            }
        }

        writeln!(self.writer, "{}", parts.join(" ")).context("Failed to write status line")?;

        Ok(())
    }
}

/// 見出しとして、ワークスペースと指定されたフィルタを表示する。
pub fn show_header<W: Write>(
    writer: &mut W,
    workspace: &str,
    project: Option<&str>,
    tags: &[String],
    color: bool,
) -> Result<()> {
    writeln!(writer, "{}{}", paint(color, "Workspace: ", Style::new().yellow()), workspace)
        .context("Failed to write header")?;
    if let Some(project) = project {
        writeln!(writer, "{}{}", paint(color, "Project: ", Style::new().cyan()), project)
            .context("Failed to write header")?;
    }
    if !tags.is_empty() {
        writeln!(writer, "{}{}", paint(color, "Tags: ", Style::new().blue()), tags.join(", "))
            .context("Failed to write header")?;
    }
    writeln!(writer, "{}\n", "─".repeat(40)).context("Failed to write header")?;

    Ok(())
}

/// 経過時間を`[N days, ]HH:MM:SS (時間の小数表記)`の形式にする。
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);
    let days = total_seconds / 86400;
    let seconds = total_seconds % 86400;
    let (hours, minutes, seconds) = (seconds / 3600, seconds % 3600 / 60, seconds % 60);
    let decimal = hours as f64 + minutes as f64 / 60.0;

    let prefix = if days != 0 {
        format!("{} days, ", days)
    } else {
        String::new()
    };
    format!(
        "{}{:02}:{:02}:{:02} ({:.2})",
        prefix, hours, minutes, seconds, decimal
    )
}

fn paint(color: bool, text: &str, style: Style) -> String {
    if color {
        text.style(style).to_string()
    } else {
        text.to_string()
    }
}

fn parse_hex_rgb(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    Some((
        u8::from_str_radix(&hex[0..2], 16).ok()?,
        u8::from_str_radix(&hex[2..4], 16).ok()?,
        u8::from_str_radix(&hex[4..6], 16).ok()?,
    ))
}

fn parse_hex_color(color: &str) -> Option<Color> {
    parse_hex_rgb(color).map(|(r, g, b)| Color::Rgb { r, g, b })
}

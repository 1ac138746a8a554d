use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::{debug, LevelFilter};
use owo_colors::OwoColorize;

mod catalog;
mod clockify;
mod config;
mod console;
mod daily_command;
mod dateexpr;
mod datetime;
mod dump_command;
mod error;
mod pager;
mod parser;
mod time_entry;

use clockify::{ClockifyClient, ClockifySession, TimeEntryRepository};
use config::Config;
use console::{show_header, ConsoleConky, ConsolePresenter, ConsoleTable};
use daily_command::DailyCommand;
use dump_command::{parse_dump_range, DumpCommand, DumpRange};
use parser::{ArgumentParser, Invocation, Mode};
use time_entry::TimeEntry;

const DAY_TITLE_FORMAT: &str = "%a, %Y-%m-%d (week %W)";

const GRAMMAR_HELP: &str = "\
INPUT:
  HH:MM-HH:MM    add an entry for the given times
  HH:MM-/        start an entry at the given time
  /-HH:MM        stop the running entry at the given time
  now-/, start   start an entry now
  /-now, stop    stop the running entry now
  +tag           tag all new entries
  @project       set the project of all new entries
  $              mark all new entries as billable
  ^workspace     use another workspace
  .date          use another date, e.g. .yesterday, '.2 days ago', .2020-10-01
  anything else  description of all new entries";

/// Clockifyのタイムエントリーを追加、表示するためのCLIアプリケーション。
///
/// # Examples
/// ```text
/// $ cloclify 09:00-12:00 issue 1234 @work +review
/// $ cloclify stop
/// $ cloclify --dump 2024-02 @work
/// ```
#[derive(Debug, Parser)]
#[clap(version, about, long_about = None, after_help = GRAMMAR_HELP)]
struct Args {
    #[clap(value_name = "INPUT", help = "Time spans, +tags, @project, $, ^workspace, .date or description")]
    inputs: Vec<String>,

    #[clap(long, help = "Enable debug output")]
    debug: bool,

    #[clap(
        long,
        value_name = "YYYY-MM|YYYY",
        help = "Dump all entries of a month or a year",
        parse(try_from_str = parse_dump_range),
    )]
    dump: Option<DumpRange>,

    #[clap(long, help = "Disable pager for --dump")]
    no_pager: bool,

    #[clap(long, conflicts_with = "dump", help = "Output a status line for conky")]
    conky: bool,

    #[clap(
        long,
        value_name = "COLOR",
        default_value = "#ff0000",
        help = "Background color for --conky when nothing is tracked"
    )]
    conky_error_color: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = setup_logger(args.debug) {
        eprintln!("Failed to set up logging: {}", err);
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let label = if io::stderr().is_terminal() {
                "Error:".red().to_string()
            } else {
                "Error:".to_string()
            };
            eprintln!("{} {:#}", label, err);
            ExitCode::FAILURE
        }
    }
}

fn setup_logger(debug: bool) -> Result<(), log::SetLoggerError> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue);
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}",
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("reqwest", LevelFilter::Warn)
        .level_for("hyper", LevelFilter::Warn)
        .chain(io::stderr())
        .apply()
}

async fn run(args: Args) -> Result<()> {
    let mode = if args.dump.is_some() {
        Mode::Dump
    } else if args.conky {
        Mode::Status
    } else {
        Mode::Day
    };
    // 書式の誤りはAPIに問い合わせる前に報告する
    let directives = parser::classify_all(args.inputs.as_slice())?;

    let config = Config::load()?;
    debug!("{:?}", config);

    let client = ClockifyClient::new(&config);
    let user = client.read_user().await?;
    let now = datetime::now_in(&user.timezone());

    let invocation = ArgumentParser::new(now, mode).parse_directives(directives)?;
    debug!("{:?}", invocation);

    let workspace = invocation
        .workspace
        .clone()
        .or_else(|| config.workspace.clone());
    let session = ClockifySession::open(client, user, workspace).await?;

    if let Some(range) = args.dump {
        return dump(&session, &invocation, range, !args.no_pager).await;
    }

    if args.conky {
        let entries = session.read_entries_day(invocation.date).await?;
        let mut stdout = io::stdout().lock();
        return ConsoleConky::new(&mut stdout, now, args.conky_error_color)
            .show_time_entries(&entries);
    }

    let report = DailyCommand::new(&session).run(&invocation).await?;
    let color = io::stdout().is_terminal();
    let mut stdout = io::stdout().lock();
    show_header(
        &mut stdout,
        session.workspace_name(),
        invocation.project.as_deref(),
        &invocation.tags,
        color,
    )?;
    ConsoleTable::new(&mut stdout)
        .title(invocation.date.format(DAY_TITLE_FORMAT).to_string())
        .highlight(report.added_ids)
        .color(color)
        .show_time_entries(&report.entries)
}

/// 期間内のエントリーを日毎の表にして、最後に合計を表示する。
async fn dump<T: TimeEntryRepository>(
    repository: &T,
    invocation: &Invocation,
    range: DumpRange,
    use_pager: bool,
) -> Result<()> {
    let days = DumpCommand::new(repository)
        .run(range, invocation.project.as_deref(), &invocation.tags)
        .await?;

    // less -Rはエスケープシーケンスをそのまま表示できる
    let color = use_pager || io::stdout().is_terminal();
    let mut buffer = Vec::new();
    show_header(
        &mut buffer,
        repository.workspace_name(),
        invocation.project.as_deref(),
        &invocation.tags,
        color,
    )?;
    for (date, entries) in &days {
        ConsoleTable::new(&mut buffer)
            .title(date.format(DAY_TITLE_FORMAT).to_string())
            .color(color)
            .show_time_entries(entries)?;
        writeln!(buffer).context("Failed to write output")?;
    }

    let all_entries: Vec<TimeEntry> = days.into_iter().flat_map(|(_, entries)| entries).collect();
    ConsoleTable::new(&mut buffer)
        .color(color)
        .only_totals()
        .show_time_entries(&all_entries)?;

    pager::show(&buffer, use_pager)
}

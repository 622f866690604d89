mod cache;
mod config;
mod dashboard;
mod engine;
mod error;
mod jira;
mod logging;
mod model;
mod progress;
mod source;
#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::dashboard::Dashboard;
use crate::progress::ProgressEvent;

#[derive(Parser, Debug)]
#[command(name = "wsdash")]
#[command(about = "Workstream roll-ups and orphan reports over Jira hierarchies")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/wsdash/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Write logs to a daily rolling file in this directory instead of stderr
  #[arg(long)]
  log_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List projects
  Projects,
  /// List the workstreams of a project
  Workstreams { project: String },
  /// Stream the aggregated tree under a workstream
  Tree { project: String, workstream: String },
  /// Stream linked-issue ancestry and account mismatches for a workstream
  Orphans { project: String, workstream: String },
  /// Build every workstream tree of a project
  BuildAll { project: String },
  /// Run a JQL report query
  Report {
    #[arg(required = true, num_args = 1..)]
    jql: Vec<String>,
  },
  /// Print cache statistics
  Stats,
  /// Drop every cached entry
  ClearCache,
  /// Read commands from stdin, one per line, sharing caches between them
  Shell,
}

/// One line of `wsdash shell` input.
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
struct ShellLine {
  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init(args.log_dir.as_deref())?;

  let config = config::Config::load(args.config.as_deref())?;
  let client = jira::JiraClient::new(&config)?;
  let dashboard = Dashboard::new(Arc::new(client), config.engine_settings());
  debug!(settings = ?dashboard.settings(), "dashboard ready");

  match args.command {
    Command::Shell => shell(&dashboard).await?,
    command => run(&dashboard, command).await?,
  }

  for stats in dashboard.cache_stats() {
    debug!(?stats, "cache");
  }

  Ok(())
}

async fn run(dash: &Dashboard, command: Command) -> Result<()> {
  match command {
    Command::Projects => print_json(&dash.get_projects().await?),
    Command::Workstreams { project } => print_json(&dash.get_project_workstreams(&project).await?),
    Command::Tree {
      project,
      workstream,
    } => {
      dash.get_project_workstreams(&project).await?;
      streamed(move |tx| async move { dash.get_workstream_tree(&workstream, &tx).await })
        .await
        .map(drop)
    }
    Command::Orphans {
      project,
      workstream,
    } => {
      dash.get_project_workstreams(&project).await?;
      streamed(move |tx| async move { dash.detect_orphans(&workstream, &tx).await })
        .await
        .map(drop)
    }
    Command::BuildAll { project } => {
      streamed(move |tx| async move { dash.build_all_workstreams(&project, &tx).await })
        .await
        .map(drop)
    }
    Command::Report { jql } => print_json(&dash.run_report(&jql.join(" ")).await?),
    Command::Stats => print_json(&dash.cache_stats()),
    Command::ClearCache => {
      dash.clear_cache();
      Ok(())
    }
    Command::Shell => Err(eyre!("already in a shell")),
  }
}

async fn shell(dash: &Dashboard) -> Result<()> {
  let mut lines = BufReader::new(tokio::io::stdin()).lines();

  while let Some(line) = lines.next_line().await? {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.first() {
      None => continue,
      Some(&"quit") | Some(&"exit") => break,
      Some(_) => {}
    }

    match ShellLine::try_parse_from(words.iter().copied()) {
      Ok(parsed) => {
        if let Err(err) = run(dash, parsed.command).await {
          eprintln!("error: {err:#}");
        }
      }
      Err(err) => {
        let _ = err.print();
      }
    }
  }

  Ok(())
}

/// Run `op` while printing its progress events as server-sent-event frames.
async fn streamed<T, F, Fut>(op: F) -> Result<T>
where
  F: FnOnce(mpsc::UnboundedSender<ProgressEvent>) -> Fut,
  Fut: Future<Output = Result<T>>,
{
  let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();

  let printer = async move {
    let mut out = std::io::stdout();
    while let Some(event) = rx.recv().await {
      let _ = out.write_all(event.to_sse().as_bytes());
      if event.is_terminal() {
        let _ = out.flush();
      }
    }
  };

  // `op` drops its sender when done, which ends the printer
  let (result, ()) = tokio::join!(op(tx), printer);
  result
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::progress::ProgressSink;

  fn parse_line(line: &str) -> Command {
    ShellLine::try_parse_from(line.split_whitespace())
      .unwrap()
      .command
  }

  #[test]
  fn test_shell_report_joins_words() {
    match parse_line("report project = PAY AND status = Open") {
      Command::Report { jql } => assert_eq!(jql.join(" "), "project = PAY AND status = Open"),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn test_shell_cache_commands() {
    assert!(matches!(parse_line("clear-cache"), Command::ClearCache));
    assert!(matches!(parse_line("stats"), Command::Stats));
    assert!(matches!(
      parse_line("tree PAY PAY-1"),
      Command::Tree { .. }
    ));
  }

  #[tokio::test]
  async fn test_streamed_returns_result_after_draining_events() {
    let value = streamed(|tx| async move {
      tx.emit(ProgressEvent::processing("work", "halfway", Some(50)));
      tx.emit(ProgressEvent::complete("work", "done", serde_json::json!(7)));
      Ok(7)
    })
    .await
    .unwrap();

    assert_eq!(value, 7);
  }

  #[test]
  fn test_top_level_report_accepts_quoted_query() {
    let args = Args::try_parse_from(["wsdash", "report", "project = PAY"]).unwrap();
    assert!(matches!(args.command, Command::Report { jql } if jql == ["project = PAY"]));
  }
}

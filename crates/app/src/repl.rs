//! Line-oriented chat on a terminal. Plain text goes to the session, a bare
//! number picks an option from the last message, and `/` commands cover
//! what a chat window would do with buttons and file pickers.

use anyhow::{bail, Context};
use saim_categorize::StatementProfile;
use saim_core::{parse_date, DateRange};
use saim_session::{ChatMessage, ChatOption, Session};
use saim_storage::{CompanyExport, KeyValueStore};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub const HELP: &str = "\
Commands:
  <number>                        pick an option from the last message
  /contacts <file.csv>            upload contacts
  /statement <file.csv> [from to] upload a bank statement, optionally for a period
  /export <file.json>             write all company data to a file
  /import <file.json>             load company data from a file and switch to it
  /help                           show this list
  /quit                           leave
Anything else is sent to S(ai)m Jr as a message.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Say(String),
    Pick(usize),
    Contacts(PathBuf),
    Statement { path: PathBuf, period: Option<DateRange> },
    Export(PathBuf),
    Import(PathBuf),
    Help,
    Quit,
    Empty,
}

pub fn parse_command(line: &str) -> anyhow::Result<Command> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }
    if let Ok(n) = line.parse::<usize>() {
        return Ok(Command::Pick(n));
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Say(line.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default().to_lowercase();
    let args: Vec<&str> = parts.collect();
    let path = |usage: &str| -> anyhow::Result<PathBuf> {
        match args.first() {
            Some(p) => Ok(PathBuf::from(p)),
            None => bail!("Usage: {usage}"),
        }
    };

    match name.as_str() {
        "contacts" => Ok(Command::Contacts(path("/contacts <file.csv>")?)),
        "statement" => {
            let file = path("/statement <file.csv> [from to]")?;
            let period = match args.get(1..) {
                Some([from, to]) => {
                    let start =
                        parse_date(from).with_context(|| format!("Unrecognised date '{from}'"))?;
                    let end = parse_date(to).with_context(|| format!("Unrecognised date '{to}'"))?;
                    let period = DateRange::new(start, end)
                        .context("Period must start on or before it ends")?;
                    Some(period)
                }
                Some([]) | None => None,
                Some(_) => bail!("Usage: /statement <file.csv> [from to]"),
            };
            Ok(Command::Statement { path: file, period })
        }
        "export" => Ok(Command::Export(path("/export <file.json>")?)),
        "import" => Ok(Command::Import(path("/import <file.json>")?)),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => bail!("Unknown command /{other}. Type /help for the list."),
    }
}

pub fn render<W: Write>(out: &mut W, messages: &[ChatMessage]) -> std::io::Result<()> {
    for message in messages {
        writeln!(out, "S(ai)m Jr: {}", message.text)?;
        for (i, option) in message.options.iter().enumerate() {
            writeln!(out, "  [{}] {}", i + 1, option.label)?;
        }
    }
    out.flush()
}

/// Drives `session` from `input` until end of input or `/quit`.
pub async fn run<S, R, W>(
    session: &mut Session<S>,
    statement_format: &StatementProfile,
    mut input: R,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: KeyValueStore,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut options = last_options(session.transcript());
    let mut line = String::new();

    loop {
        write!(out, "> ")?;
        out.flush()?;
        line.clear();
        if input.read_line(&mut line).await? == 0 {
            break;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(err) => {
                writeln!(out, "{err}")?;
                continue;
            }
        };

        let replies = match command {
            Command::Empty => continue,
            Command::Quit => break,
            Command::Help => {
                writeln!(out, "{HELP}")?;
                continue;
            }
            Command::Pick(n) => match n.checked_sub(1).and_then(|i| options.get(i)) {
                Some(option) => {
                    let action = option.action.clone();
                    session.send_action(action).await
                }
                None => session.send_text(&n.to_string()).await,
            },
            Command::Say(text) => session.send_text(&text).await,
            Command::Contacts(path) => match open(&path) {
                Ok(file) => session.upload_contacts(&file_name(&path), file).await,
                Err(err) => {
                    writeln!(out, "{err:#}")?;
                    continue;
                }
            },
            Command::Statement { path, period } => match open(&path) {
                Ok(file) => {
                    session
                        .upload_statement(&file_name(&path), file, statement_format, period)
                        .await
                }
                Err(err) => {
                    writeln!(out, "{err:#}")?;
                    continue;
                }
            },
            Command::Export(path) => {
                match export(session, &path).await {
                    Ok(()) => writeln!(out, "Exported company data to {}", path.display())?,
                    Err(err) => writeln!(out, "{err:#}")?,
                }
                continue;
            }
            Command::Import(path) => match import(session, &path).await {
                Ok(replies) => replies,
                Err(err) => {
                    writeln!(out, "{err:#}")?;
                    continue;
                }
            },
        };

        render(out, &replies)?;
        if let Some(latest) = replies.iter().rev().find(|m| !m.options.is_empty()) {
            options = latest.options.clone();
        } else if !replies.is_empty() {
            options.clear();
        }
    }
    Ok(())
}

fn last_options(transcript: &[ChatMessage]) -> Vec<ChatOption> {
    transcript
        .last()
        .map(|m| m.options.clone())
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn open(path: &Path) -> anyhow::Result<std::fs::File> {
    std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

async fn export<S: KeyValueStore>(session: &Session<S>, path: &Path) -> anyhow::Result<()> {
    let profile = session.profile().context("No company profile to export yet")?;
    let data = session.repository().export_company(&profile.id).await?;
    let json = serde_json::to_string_pretty(&data)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(company = %profile.id, path = %path.display(), "company exported");
    Ok(())
}

async fn import<S: KeyValueStore>(
    session: &mut Session<S>,
    path: &Path,
) -> anyhow::Result<Vec<ChatMessage>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let data: CompanyExport = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a company export", path.display()))?;
    session.repository().import_company(&data).await?;
    tracing::info!(company = %data.profile.id, path = %path.display(), "company imported");
    Ok(session.open(Some(&data.profile.id)).await)
}

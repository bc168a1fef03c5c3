use std::io::{BufRead, Write};

use anyhow::{anyhow, Result};
use mediakeep_discovery::{FileSystem, SharedDiscovery, StorageCatalog};

use crate::output;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    List,
    Rescan,
    Invalidate,
    Status,
    Find(String),
    Gaps,
    Help,
    Quit,
}

/// `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<ShellCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let command = match word.to_ascii_lowercase().as_str() {
        "list" | "ls" => ShellCommand::List,
        "rescan" => ShellCommand::Rescan,
        "invalidate" => ShellCommand::Invalidate,
        "status" => ShellCommand::Status,
        "gaps" => ShellCommand::Gaps,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" | "q" => ShellCommand::Quit,
        "find" => {
            if rest.is_empty() {
                return Err(anyhow!("usage: find <name>"));
            }
            ShellCommand::Find(rest.to_string())
        }
        other => return Err(anyhow!("unknown command: {other} (try help)")),
    };
    Ok(Some(command))
}

fn write_help(out: &mut impl Write) -> Result<()> {
    writeln!(out, "  list            projects (cached when nothing changed)")?;
    writeln!(out, "  rescan          full rescan of every drive")?;
    writeln!(out, "  invalidate      drop the cache; next list rescans")?;
    writeln!(out, "  status          storage slots and their mounts")?;
    writeln!(out, "  find <name>     drives holding a project")?;
    writeln!(out, "  gaps            master projects missing on backups")?;
    writeln!(out, "  quit")?;
    Ok(())
}

/// Reads commands until `quit` or end of input. Discovery errors are printed
/// and the loop continues; the cache survives them.
pub fn run_shell<C: StorageCatalog, F: FileSystem>(
    discovery: &SharedDiscovery<C, F>,
    input: impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    write!(out, "> ")?;
    out.flush()?;
    for line in input.lines() {
        let line = line?;
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(ShellCommand::Quit)) => return Ok(()),
            Ok(Some(command)) => {
                if let Err(err) = execute(discovery, command, out) {
                    writeln!(out, "error: {err:#}")?;
                }
            }
            Err(err) => writeln!(out, "{err}")?,
        }
        write!(out, "> ")?;
        out.flush()?;
    }
    writeln!(out)?;
    Ok(())
}

fn execute<C: StorageCatalog, F: FileSystem>(
    discovery: &SharedDiscovery<C, F>,
    command: ShellCommand,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        ShellCommand::List => output::write_projects(out, &discovery.get_projects(false)?),
        ShellCommand::Rescan => output::write_projects(out, &discovery.get_projects(true)?),
        ShellCommand::Invalidate => {
            discovery.invalidate();
            writeln!(out, "cache cleared")?;
            Ok(())
        }
        ShellCommand::Status => {
            let statuses = discovery.confirm_storage()?;
            discovery.with_state(|state| output::write_storage(out, &statuses, &state.validation))
        }
        ShellCommand::Find(name) => {
            output::write_matches(out, &name, &discovery.get_projects(false)?)
        }
        ShellCommand::Gaps => {
            output::write_gaps(out, &discovery.get_projects(false)?.missing_on_backups())
        }
        ShellCommand::Help => write_help(out),
        ShellCommand::Quit => Ok(()),
    }
}

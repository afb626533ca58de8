//! Console line parser for the interactive client.
//!
//! ```text
//! A1: 42            set a cell (an empty value clears it)
//! B1: =A1*2         formulas start with '='
//! :get A1           show one cell
//! :goto A1          select a cell (shared with other users)
//! :name Ann         change display name
//! :page new|list|switch <id>|delete <id>
//! :sort B [asc|desc]
//! :show             list every cell on the current page
//! :users            who else is online
//! :sync             ask the relay for a fresh snapshot
//! :help, :quit
//! ```

use gridsync_core::SortDirection;
use gridsync_engine::engine::{CellId, column_index};
use gridsync_sync::Command;

use crate::error::{GridsyncError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleAction {
    Command(Command),
    Help,
    Quit,
    /// Blank line.
    Nothing,
}

pub const HELP: &str = "\
A1: <value>                set a cell; formulas start with '=' (empty clears)
:get <cell>                show a cell's input and value
:goto <cell>               select a cell (no cell clears the selection)
:name <name>               change your display name
:page new|list             create or list pages
:page switch|delete <id>   change or remove a page
:sort <column> [asc|desc]  list rows ordered by a column
:show                      list every cell on this page
:users                     list other users online
:sync                      reload the relay snapshot
:help                      this text
:quit                      exit";

fn parse_error(message: impl Into<String>) -> GridsyncError {
    GridsyncError::Parse(message.into())
}

/// Cell ids are accepted in either case at the console.
fn parse_cell(text: &str) -> Result<CellId> {
    CellId::parse(&text.trim().to_ascii_uppercase())
        .ok_or_else(|| parse_error(format!("Invalid cell: {}", text.trim())))
}

/// Parse one console line. An edit keeps the value exactly as typed apart
/// from one separator space after the colon.
pub fn parse_line(line: &str) -> Result<ConsoleAction> {
    let line = line.trim_end_matches(['\r', '\n']).trim_start();
    if line.trim().is_empty() {
        return Ok(ConsoleAction::Nothing);
    }

    if let Some(command) = line.strip_prefix(':') {
        return parse_command(command);
    }

    let Some((cell, raw)) = line.split_once(':') else {
        return Err(parse_error(
            "Expected `<cell>: <value>` or a `:command` (try :help)",
        ));
    };
    Ok(ConsoleAction::Command(Command::Edit {
        cell: parse_cell(cell)?,
        raw: raw.strip_prefix(' ').unwrap_or(raw).to_string(),
    }))
}

fn parse_command(command: &str) -> Result<ConsoleAction> {
    let mut parts = command.split_whitespace();
    let Some(name) = parts.next() else {
        return Err(parse_error("Empty command"));
    };
    let args: Vec<&str> = parts.collect();

    let command = match (name, args.as_slice()) {
        ("q" | "quit", []) => return Ok(ConsoleAction::Quit),
        ("h" | "help", []) => return Ok(ConsoleAction::Help),
        ("get", [cell]) => Command::Show(Some(parse_cell(cell)?)),
        ("goto", []) => Command::Select(None),
        ("goto", [cell]) => Command::Select(Some(parse_cell(cell)?)),
        ("name", words) if !words.is_empty() => Command::Rename(words.join(" ")),
        ("page", ["new"]) => Command::NewPage,
        ("page", ["list"]) | ("pages", []) => Command::ListPages,
        ("page", ["switch", id]) => Command::SwitchPage(id.to_string()),
        ("page", ["delete", id]) => Command::DeletePage(id.to_string()),
        ("sort", [column]) => Command::Sort {
            column: parse_column(column)?,
            direction: SortDirection::Ascending,
        },
        ("sort", [column, direction]) => Command::Sort {
            column: parse_column(column)?,
            direction: direction
                .parse()
                .map_err(|e: gridsync_core::WorkbookError| parse_error(e.to_string()))?,
        },
        ("show", []) => Command::Show(None),
        ("users", []) => Command::Users,
        ("sync", []) => Command::Resync,
        _ => {
            return Err(parse_error(format!(
                "Unknown or malformed command: :{} (try :help)",
                command.trim()
            )));
        }
    };
    Ok(ConsoleAction::Command(command))
}

fn parse_column(text: &str) -> Result<u32> {
    let upper = text.to_ascii_uppercase();
    if upper.is_empty() || !upper.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(parse_error(format!("Invalid column: {}", text)));
    }
    column_index(&upper).ok_or_else(|| parse_error(format!("Invalid column: {}", text)))
}

//! Line commands for the interactive `chatty connect` prompt.

/// A parsed prompt line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Plain text, sent as an LLM query.
    Query(String),
    /// `:context [name] <json>`
    Context { name: String, info: String },
    /// `:preview` prints the current dataset preview.
    Preview,
    /// `:cells` lists the notebook's cells.
    Cells,
    /// `:quit`
    Quit,
    Unknown(String),
}

pub fn parse_line(line: &str, default_context: &str) -> ConsoleCommand {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(command) = line.strip_prefix(':') else {
        return ConsoleCommand::Query(line.to_string());
    };

    let (verb, rest) = match command.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (command, ""),
    };

    match verb {
        "context" => {
            // A leading brace means the name was left out.
            if rest.starts_with('{') || rest.starts_with('[') || rest.is_empty() {
                ConsoleCommand::Context {
                    name: default_context.to_string(),
                    info: rest.to_string(),
                }
            } else {
                let (name, info) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                ConsoleCommand::Context {
                    name: name.to_string(),
                    info: info.trim().to_string(),
                }
            }
        }
        "preview" => ConsoleCommand::Preview,
        "cells" => ConsoleCommand::Cells,
        "quit" | "q" => ConsoleCommand::Quit,
        other => ConsoleCommand::Unknown(other.to_string()),
    }
}

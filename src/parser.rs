use thiserror::Error;

/// One command of an input line, as produced by [`parse`].
///
/// Empty `input`/`output` mean the stage uses the interactive streams (or the
/// neighbouring pipe when it is part of a pipeline).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub arguments: Vec<String>,
    /// Options in the order given, without their leading `-`.
    pub options: Vec<String>,
    pub input: String,
    pub output: String,
    pub background: bool,
}

impl ParsedCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, argument: impl Into<String>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    pub fn input(mut self, file: impl Into<String>) -> Self {
        self.input = file.into();
        self
    }

    pub fn output(mut self, file: impl Into<String>) -> Self {
        self.output = file.into();
        self
    }

    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Error when parsing command {0:?}: empty command")]
    EmptyCommand(String),
}

/// Parses one input line into the commands of its pipeline.
///
/// Rules:
/// - `|` separates pipeline stages, `"..."` protects spaces, tabs and `|`;
/// - a word `&` marks the command for background execution;
/// - a word starting with `-` (longer than one character) is an option;
/// - the first `<file` / `< file` sets the input, the first `>file` / `> file`
///   the output; later ones are plain arguments;
/// - everything else is a positional argument, with surrounding quotes removed.
pub fn parse(line: &str) -> Result<Vec<ParsedCommand>, ParseError> {
    let line = line.trim_end_matches(['\n', '\r']);
    split_unquoted(line, |c| c == '|')
        .into_iter()
        .map(|segment| parse_command(&segment))
        .collect()
}

fn parse_command(text: &str) -> Result<ParsedCommand, ParseError> {
    let words = split_unquoted(text.trim(), char::is_whitespace)
        .into_iter()
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>();
    let Some((name, rest)) = words.split_first() else {
        return Err(ParseError::EmptyCommand(text.to_string()));
    };

    let mut command = ParsedCommand::new(unquote(name));
    let mut words = rest.iter();
    while let Some(word) = words.next() {
        if word == "&" {
            command.background = true;
        } else if word.len() > 1 && word.starts_with('-') {
            command.options.push(word[1..].to_string());
        } else if command.input.is_empty() && word.starts_with('<') {
            if let Some(file) = redirect_target(word, &mut words) {
                command.input = file;
            }
        } else if command.output.is_empty() && word.starts_with('>') {
            if let Some(file) = redirect_target(word, &mut words) {
                command.output = file;
            }
        } else {
            command.arguments.push(unquote(word));
        }
    }
    Ok(command)
}

/// File name of a `<`/`>` word: glued to the symbol or the next word.
fn redirect_target<'a>(
    word: &str,
    rest: &mut impl Iterator<Item = &'a String>,
) -> Option<String> {
    if word.len() > 1 {
        Some(unquote(&word[1..]))
    } else {
        rest.next().map(|next| unquote(next))
    }
}

/// Splits on separator characters that are outside double quotes.
/// Quote characters are kept in the pieces.
fn split_unquoted(text: &str, is_separator: impl Fn(char) -> bool) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in text.chars() {
        if c == '"' {
            quoted = !quoted;
        }
        if !quoted && is_separator(c) {
            pieces.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    pieces.push(current);
    pieces
}

fn unquote(word: &str) -> String {
    if word.len() > 2 && word.starts_with('"') && word.ends_with('"') {
        word[1..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

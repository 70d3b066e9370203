//! Typed handoff between the train job and the post-process step.
//!
//! The trainer prints the command that finishes its own output (e.g. weight
//! conversion) instead of running it. We parse that line into an argument
//! vector and run it directly, without a shell, so anything that only means
//! something to a shell is rejected up front.

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct TrainResult {
    /// Program followed by its arguments.
    pub next_command: Vec<String>,
}

impl TrainResult {
    pub fn from_stdout(stdout: &str, allowed_programs: &[String]) -> Result<Self> {
        let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());

        let line = lines
            .next()
            .ok_or_else(|| Error::invalid_command("trainer printed no command"))?;
        if lines.next().is_some() {
            return Err(Error::invalid_command(
                "trainer printed more than one command line",
            ));
        }

        let next_command = split_command(line)?;

        if !allowed_programs.is_empty() && !allowed_programs.contains(&next_command[0]) {
            return Err(Error::invalid_command(format!(
                "program '{}' is not in postprocess.allowed_programs",
                next_command[0]
            )));
        }

        Ok(Self { next_command })
    }

    pub fn program(&self) -> &str {
        &self.next_command[0]
    }

    pub fn args(&self) -> &[String] {
        &self.next_command[1..]
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Splits one command line into words, honoring single and double quotes and
/// backslash escapes outside single quotes.
fn split_command(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match (quote, ch) {
            (Quote::Single, '\'') => quote = Quote::None,
            (Quote::Single, c) => current.push(c),
            (Quote::Double, '"') => quote = Quote::None,
            (Quote::Double, '\\') => match chars.next() {
                Some(c) => current.push(c),
                None => return Err(Error::invalid_command("dangling escape")),
            },
            (Quote::Double, '$' | '`') => return Err(shell_only(ch)),
            (Quote::Double, c) => current.push(c),
            (Quote::None, '\'') => {
                quote = Quote::Single;
                in_word = true;
            }
            (Quote::None, '"') => {
                quote = Quote::Double;
                in_word = true;
            }
            (Quote::None, '\\') => match chars.next() {
                Some(c) => {
                    current.push(c);
                    in_word = true;
                }
                None => return Err(Error::invalid_command("dangling escape")),
            },
            (Quote::None, ';' | '|' | '&' | '<' | '>' | '`' | '$' | '(' | ')') => {
                return Err(shell_only(ch));
            }
            (Quote::None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (Quote::None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote != Quote::None {
        return Err(Error::invalid_command("unterminated quote"));
    }
    if in_word {
        words.push(current);
    }
    if words.is_empty() {
        return Err(Error::invalid_command("empty command"));
    }

    Ok(words)
}

fn shell_only(ch: char) -> Error {
    Error::invalid_command(format!(
        "'{ch}' needs a shell; the command is run directly"
    ))
}

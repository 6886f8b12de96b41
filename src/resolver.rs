//! Overwrite decisions for restore conflicts: a local file exists but the
//! bucket holds a strictly newer copy.

use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::backends::SyncError;

/// What the resolver is asked about.
#[derive(Debug, Clone, Copy)]
pub struct Conflict<'a> {
    pub key: &'a str,
    pub local_path: &'a Path,
    pub local_modified: i64,
    pub remote_modified: i64,
}

pub trait OverwriteResolver {
    /// `true` downloads over the local file, `false` leaves it untouched.
    fn should_overwrite(&mut self, conflict: &Conflict<'_>) -> Result<bool, SyncError>;
}

impl<F> OverwriteResolver for F
where
    F: FnMut(&Conflict<'_>) -> bool,
{
    fn should_overwrite(&mut self, conflict: &Conflict<'_>) -> Result<bool, SyncError> {
        Ok(self(conflict))
    }
}

/// Same answer for every conflict (`--yes` / `--no`).
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl OverwriteResolver for FixedAnswer {
    fn should_overwrite(&mut self, _conflict: &Conflict<'_>) -> Result<bool, SyncError> {
        Ok(self.0)
    }
}

/// Asks on a line-oriented console until it gets `y` or `n`.
pub struct PromptResolver<R, W> {
    input: R,
    output: W,
}

impl PromptResolver<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> PromptResolver<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> OverwriteResolver for PromptResolver<R, W> {
    fn should_overwrite(&mut self, conflict: &Conflict<'_>) -> Result<bool, SyncError> {
        writeln!(
            self.output,
            "File {} already exists but the file on backup is newer, do you want to overwrite? [y/n]: ",
            conflict.key
        )?;
        self.output.flush()?;

        let mut line = String::new();
        loop {
            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                return Err(SyncError::PromptClosed);
            }
            match parse_answer(&line) {
                Some(answer) => return Ok(answer),
                None => {
                    writeln!(self.output, "Please type y or n:")?;
                    self.output.flush()?;
                }
            }
        }
    }
}

fn parse_answer(line: &str) -> Option<bool> {
    match line.trim() {
        "y" => Some(true),
        "n" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn conflict() -> Conflict<'static> {
        Conflict {
            key: "docs/report.txt",
            local_path: Path::new("/restore/docs/report.txt"),
            local_modified: 100,
            remote_modified: 200,
        }
    }

    #[test]
    fn yes_and_no_are_the_only_answers() {
        assert_eq!(parse_answer("y\n"), Some(true));
        assert_eq!(parse_answer("  n\r\n"), Some(false));
        assert_eq!(parse_answer("yes\n"), None);
        assert_eq!(parse_answer("Y\n"), None);
        assert_eq!(parse_answer("\n"), None);
    }

    #[test]
    fn prompt_repeats_until_recognized() {
        let mut resolver = PromptResolver::new(Cursor::new("maybe\n\nn\n"), Vec::new());
        assert!(!resolver.should_overwrite(&conflict()).unwrap());

        let output = String::from_utf8(resolver.into_output()).unwrap();
        assert!(output.starts_with("File docs/report.txt already exists"));
        assert_eq!(output.matches("Please type y or n:").count(), 2);
    }

    #[test]
    fn closed_input_never_defaults() {
        let mut resolver = PromptResolver::new(Cursor::new("what\n"), Vec::new());
        assert!(matches!(
            resolver.should_overwrite(&conflict()),
            Err(SyncError::PromptClosed)
        ));
    }

    #[test]
    fn closures_and_fixed_answers_resolve() {
        let mut seen = Vec::new();
        let mut record = |c: &Conflict<'_>| {
            seen.push(c.key.to_string());
            true
        };
        assert!(record.should_overwrite(&conflict()).unwrap());
        assert_eq!(seen, vec!["docs/report.txt"]);

        assert!(FixedAnswer(true).should_overwrite(&conflict()).unwrap());
        assert!(!FixedAnswer(false).should_overwrite(&conflict()).unwrap());
    }
}

//! Line-oriented input sources for interactive command flows.
//!
//! Commands never read stdin directly; they go through a [`LineSource`] so
//! the same flow can be driven by a terminal or by a scripted sequence of
//! lines in tests.

use anyhow::Result;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// Yields the next user-supplied value for a prompt.
pub trait LineSource {
    /// Read one line. Returns `None` when the source is exhausted (EOF).
    /// An empty line means "accept the default".
    fn read_line(&mut self, prompt: &str, default: Option<&str>) -> Result<Option<String>>;
}

/// Interactive source reading from stdin, prompting on stderr.
#[derive(Default)]
pub struct StdinSource;

impl StdinSource {
    pub fn new() -> Self {
        Self
    }
}

impl LineSource for StdinSource {
    fn read_line(&mut self, prompt: &str, default: Option<&str>) -> Result<Option<String>> {
        match default {
            Some(d) if !d.is_empty() => eprint!("{prompt} [{d}]: "),
            _ => eprint!("{prompt}: "),
        }
        io::stderr().flush()?;

        let mut line = String::new();
        let n = io::stdin().lock().read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}

/// Pre-scripted source for tests and replay.
pub struct ScriptedSource {
    lines: VecDeque<String>,
}

impl ScriptedSource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a newline-joined input block into individual lines.
    pub fn from_input(input: &str) -> Self {
        Self::new(input.split('\n').map(|s| s.to_string()))
    }
}

impl LineSource for ScriptedSource {
    fn read_line(&mut self, _prompt: &str, _default: Option<&str>) -> Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_source_yields_lines_in_order() {
        let mut source = ScriptedSource::new(["one", "", "three"]);
        assert_eq!(source.read_line("p", None).unwrap().unwrap(), "one");
        assert_eq!(source.read_line("p", None).unwrap().unwrap(), "");
        assert_eq!(source.read_line("p", None).unwrap().unwrap(), "three");
        assert!(source.read_line("p", None).unwrap().is_none());
    }

    #[test]
    fn test_from_input_splits_on_newlines() {
        let mut source = ScriptedSource::from_input("a\nb");
        assert_eq!(source.read_line("p", None).unwrap().unwrap(), "a");
        assert_eq!(source.read_line("p", None).unwrap().unwrap(), "b");
        assert!(source.read_line("p", None).unwrap().is_none());
    }
}

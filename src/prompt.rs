//! Blocking question-and-answer loop for interactive parameter entry.

use std::io::{self, BufRead, Write};

use anyhow::Result;
use tracing::debug;

use crate::error::SetupError;

/// Asks questions on `output` and reads answers line by line from `input`.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl Prompter<io::StdinLock<'static>, io::Stdout> {
    /// Prompter bound to the process terminal.
    pub fn stdio() -> Self {
        Prompter::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Ask `question` until `parse` accepts the trimmed answer.
    ///
    /// Rejected answers, including lines that are not valid UTF-8, are logged
    /// and the question is asked again, with no upper bound. End of input fails with [`SetupError::InputClosed`].
    pub fn ask<T>(
        &mut self,
        field: &'static str,
        question: &str,
        parse: impl Fn(&str) -> Result<T, SetupError>,
    ) -> Result<T> {
        loop {
            write!(self.output, "{}", question)?;
            self.output.flush()?;

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) => {
                    writeln!(self.output)?;
                    return Err(SetupError::InputClosed { field }.into());
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    debug!(field, error = %e, "unreadable answer, asking again");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            match parse(line.trim()) {
                Ok(value) => return Ok(value),
                Err(e) => debug!(field, error = %e, "rejected answer, asking again"),
            }
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

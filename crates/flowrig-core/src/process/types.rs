//! Value types shared by every launcher: [`ProcessSpec`] and [`ExitOutcome`].

use std::fmt;

/// Errors raised while constructing a [`ProcessSpec`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SpecError {
    /// The token list was empty, so there is no program to run.
    #[error("process spec must contain at least a program name")]
    Empty,

    /// The program token was blank.
    #[error("process spec has a blank program name")]
    BlankProgram,
}

/// An immutable command line: the program followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    program: String,
    args: Vec<String>,
}

impl ProcessSpec {
    /// Build a spec from a program and its arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Result<Self, SpecError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(SpecError::BlankProgram);
        }
        Ok(Self {
            program,
            args: args.into_iter().map(Into::into).collect(),
        })
    }

    /// Build a spec from a flat token list, where the first token is the
    /// program.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self, SpecError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tokens = tokens.into_iter().map(Into::into);
        let program: String = tokens.next().ok_or(SpecError::Empty)?;
        Self::new(program, tokens)
    }

    /// Return a copy of this spec with extra arguments appended.
    pub fn with_args<I, S>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = self.args.clone();
        args.extend(extra.into_iter().map(Into::into));
        Self {
            program: self.program.clone(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// All tokens, program first.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }
}

impl fmt::Display for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<&str> = self.tokens().collect();
        f.write_str(&tokens.join(" "))
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// The exit code, or `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    /// The terminating signal on Unix, if any.
    pub signal: Option<i32>,
}

impl ExitOutcome {
    /// An outcome for a process that exited with `code`.
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// An outcome for a process that was killed by `signal`.
    pub fn signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitOutcome {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_tokens_splits_program_and_args() {
        let spec = ProcessSpec::from_tokens(["java", "-cp", "dapper.jar"]).unwrap();
        assert_eq!(spec.program(), "java");
        assert_eq!(spec.args(), ["-cp", "dapper.jar"]);
        assert_eq!(spec.to_string(), "java -cp dapper.jar");
    }

    #[test]
    fn empty_tokens_rejected() {
        let tokens: Vec<String> = Vec::new();
        assert_eq!(ProcessSpec::from_tokens(tokens), Err(SpecError::Empty));
    }

    #[test]
    fn blank_program_rejected() {
        assert_eq!(
            ProcessSpec::new("  ", ["--port"]),
            Err(SpecError::BlankProgram)
        );
    }

    #[test]
    fn with_args_leaves_original_untouched() {
        let base = ProcessSpec::new("client", Vec::<String>::new()).unwrap();
        let extended = base.with_args(["--host", "localhost:12121"]);
        assert!(base.args().is_empty());
        assert_eq!(extended.to_string(), "client --host localhost:12121");
    }

    #[test]
    fn exit_outcome_display_and_success() {
        assert!(ExitOutcome::code(0).success());
        assert!(!ExitOutcome::code(1).success());
        assert!(!ExitOutcome::signal(9).success());
        assert_eq!(ExitOutcome::code(2).to_string(), "exit code 2");
        assert_eq!(ExitOutcome::signal(9).to_string(), "signal 9");
    }
}

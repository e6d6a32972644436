use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SplitError>;

/// Every failure is fatal to the run; nothing here is retried.
#[derive(Error, Debug)]
pub enum SplitError {
    #[error("couldn't open the input file ({}): {source}", path.display())]
    InputUnavailable { path: PathBuf, source: io::Error },

    #[error("couldn't read the input file ({}) after line {line}: {source}", path.display())]
    InputRead { path: PathBuf, line: u64, source: io::Error },

    #[error("can't parse split '{token}': {reason}")]
    Format { token: String, reason: String },

    #[error("couldn't write output {target}: {source}")]
    OutputUnavailable { target: String, source: io::Error },

    #[error("bad output file name '{template}': {reason}")]
    Template { template: String, reason: String },
}

impl SplitError {
    pub(crate) fn format(token: &str, reason: impl Into<String>) -> Self {
        SplitError::Format { token: token.to_owned(), reason: reason.into() }
    }

    pub(crate) fn template(template: &str, reason: impl Into<String>) -> Self {
        SplitError::Template { template: template.to_owned(), reason: reason.into() }
    }
}

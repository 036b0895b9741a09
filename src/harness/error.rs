use thiserror::Error;

/// Boxed error raised by a [`Program`](super::Program)
pub type ProgramFailure = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Harness failure
///
/// None of these are recovered locally; they propagate to the process
/// entry point and end the run.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Program construction failed: {0}")]
    Construct(#[source] ProgramFailure),

    #[error("Program initialization failed: {0}")]
    Init(#[source] ProgramFailure),

    #[error("Program run failed: {0}")]
    Run(#[source] ProgramFailure),

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;

//! Command-line Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not open the archive")]
    Open,
    /// An archive operation failed after the archive was opened.
    #[display("{_0} failed")]
    Command(#[error(not(source))] &'static str),
    #[display("invalid argument: {_0}")]
    Argument(#[error(not(source))] String),
    #[display("could not write output")]
    Output,
}

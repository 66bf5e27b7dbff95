use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("REMB send interval must be non-zero")]
    ErrInvalidRembInterval,

    #[error("{0}")]
    Other(String),
}

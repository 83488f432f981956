//! Error type for `fleet-bus`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid topic filter {0:?}")]
  InvalidFilter(String),

  #[error("invalid topic {0:?}: wildcards are only allowed in filters")]
  InvalidTopic(String),

  #[error("exchange {0:?} has not been declared")]
  UnknownExchange(String),

  #[error("bus is closed")]
  Closed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

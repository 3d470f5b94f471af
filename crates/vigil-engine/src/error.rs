//! Error type for `vigil-engine`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("subject not found: {0}")]
  SubjectNotFound(Uuid),

  #[error("delivery not found: {0}")]
  DeliveryNotFound(Uuid),

  #[error("delivery {0} was already sent")]
  AlreadySent(Uuid),

  #[error(transparent)]
  Core(#[from] vigil_core::Error),

  /// The backing store failed. Fatal to the current operation; nothing was
  /// assumed to have been written.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) fn store_err<E>(e: E) -> Error
where
  E: std::error::Error + Send + Sync + 'static,
{
  Error::Store(Box::new(e))
}

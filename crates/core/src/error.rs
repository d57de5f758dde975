use thiserror::Error;

use crate::model::{ConfigError, QuestionError, ResultError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Result(#[from] ResultError),
}

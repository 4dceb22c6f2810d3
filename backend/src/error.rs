use thiserror::Error;

use crate::feed::FeedError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("subscribe request could not be sent: {0}")]
    Subscribe(#[source] FeedError),
}

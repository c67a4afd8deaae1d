use std::fmt::Display;

#[derive(Debug)]
pub enum Error {
    InvalidField(String),
    InvalidOperator(String),
    Validation(String),
    AggregationConflict(String),
    Configuration(String),
    PrematureAccess,
    NotFound,
    Backend(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidField(field) => write!(f, "Invalid field '{}'", field),
            Error::InvalidOperator(err) => write!(f, "Invalid operator: {}", err),
            Error::Validation(err) => write!(f, "Validation error: {}", err),
            Error::AggregationConflict(err) => write!(f, "Aggregation conflict: {}", err),
            Error::Configuration(err) => write!(f, "Configuration error: {}", err),
            Error::PrematureAccess => write!(f, "Results accessed before a terminal call"),
            Error::NotFound => write!(f, "Not found"),
            Error::Backend(err) => write!(f, "Backend error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

use thiserror::Error;

/// Crate-wide error type.
///
/// Every variant is fatal to the evaluation that raised it: there are no
/// retries and no partial results, and a failed evaluation never mutates
/// shared state.
#[derive(Error, Debug)]
pub enum FhewError {
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("not implemented: {message}")]
    NotImplemented { message: String },

    #[error("no bootstrapping key for gadget base {base} in the key map")]
    Lookup { base: u64 },

    #[error("arithmetic error: {message}")]
    Arithmetic { message: String },

    #[error("ring setup failed: {source}")]
    Ring {
        #[from]
        source: crate::ring::NttError,
    },
}

impl FhewError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        FhewError::Config {
            message: message.into(),
        }
    }

    pub(crate) fn not_implemented(message: impl Into<String>) -> Self {
        FhewError::NotImplemented {
            message: message.into(),
        }
    }

    pub(crate) fn arithmetic(message: impl Into<String>) -> Self {
        FhewError::Arithmetic {
            message: message.into(),
        }
    }
}

pub type FhewResult<T> = Result<T, FhewError>;

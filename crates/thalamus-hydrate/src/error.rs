use thiserror::Error;

#[derive(Error, Debug)]
pub enum HydrateError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed wire record: {0}")]
    Record(String),

    #[error("inflate error: {0}")]
    Inflate(String),

    #[error("hdf5 error: {0}")]
    Hdf5(String),

    #[error("unsupported video codec: {0}")]
    UnsupportedCodec(String),
}

impl From<HydrateError> for thalamus_core::ThalamusError {
    fn from(e: HydrateError) -> Self {
        match &e {
            HydrateError::Io(_) | HydrateError::Inflate(_) => thalamus_core::ThalamusError::transient(e.to_string()),
            HydrateError::Record(_) | HydrateError::UnsupportedCodec(_) => {
                thalamus_core::ThalamusError::fatal(e.to_string())
            }
            HydrateError::Hdf5(_) => thalamus_core::ThalamusError::configuration(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, HydrateError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("invalid channel spec: {0}")]
    ChannelSpec(String),

    #[error("device error ({code}): {message}")]
    Device { code: i32, message: String },

    #[error("malformed datagram: {0}")]
    Datagram(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("genicam transport error: {0}")]
    Genicam(#[from] thalamus_genicam::error::GenicamError),
}

impl From<AdapterError> for thalamus_core::ThalamusError {
    fn from(e: AdapterError) -> Self {
        match &e {
            AdapterError::ChannelSpec(_) => thalamus_core::ThalamusError::configuration(e.to_string()),
            AdapterError::Device { code, message } => thalamus_core::ThalamusError::hardware(*code as i64, message.clone()),
            AdapterError::Datagram(_) => thalamus_core::ThalamusError::transient(e.to_string()),
            AdapterError::Io(_) => thalamus_core::ThalamusError::transient(e.to_string()),
            AdapterError::Genicam(_) => thalamus_core::ThalamusError::transient(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;

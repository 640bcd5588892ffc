use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenicamError {
    #[error("GenApi error: {0}")]
    GenApi(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to parse register map: {0}")]
    Parse(String),

    #[error("unknown register: {0}")]
    UnknownRegister(String),

    #[error("register {0} is not readable/writable in this mode")]
    AccessDenied(String),

    #[error("vendor module load failed: {0}")]
    ModuleLoad(String),

    /// GC_ERR_NO_DATA: the port has nothing to return right now. Not a
    /// failure — `IntReg`/`StringReg` reads treat it as zero/empty, and
    /// writes that hit it while read-modify-writing abort silently, both
    /// matching the original transport's behavior.
    #[error("no data available")]
    NoData,
}

impl From<GenicamError> for thalamus_core::ThalamusError {
    fn from(e: GenicamError) -> Self {
        match &e {
            GenicamError::GenApi(_) | GenicamError::UnknownRegister(_) | GenicamError::AccessDenied(_) => {
                thalamus_core::ThalamusError::hardware(-1, e.to_string())
            }
            GenicamError::Transport(_) => thalamus_core::ThalamusError::transient(e.to_string()),
            GenicamError::Parse(_) | GenicamError::ModuleLoad(_) => {
                thalamus_core::ThalamusError::configuration(e.to_string())
            }
            GenicamError::NoData => thalamus_core::ThalamusError::transient(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GenicamError>;

//! Maps [`thalamus_core::ThalamusError`] onto `tonic::Status` per spec.md
//! §7: `Peer` terminates the RPC cleanly, `Configuration` surfaces as a
//! warning (callers also push it to the notification stream before
//! converting), `Hardware` becomes an internal error carrying the vendor
//! code, `Fatal` is logged and the process aborts rather than returning a
//! status at all.

use thalamus_core::ThalamusError;
use tonic::Status;

pub fn to_status(err: &ThalamusError) -> Status {
    match err {
        ThalamusError::Transient(msg) => Status::unavailable(msg.clone()),
        ThalamusError::Peer(msg) => Status::cancelled(msg.clone()),
        ThalamusError::Configuration(msg) => Status::invalid_argument(msg.clone()),
        ThalamusError::Hardware { code, message } => {
            Status::internal(format!("hardware error {code}: {message}"))
        }
        ThalamusError::Fatal(msg) => {
            tracing::error!(error = %msg, "fatal error, aborting process");
            std::process::exit(1);
        }
    }
}

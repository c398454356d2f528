/// Errors that can occur in modem operations.
///
/// Command outcomes (busy, timeout, completed with error) are not errors;
/// they are reported through [`crate::ModemStatus`].
#[derive(Debug, thiserror::Error)]
pub enum ModemError {
    /// Link-level error.
    #[error("transport error: {0}")]
    Transport(#[from] d7modem_transport::TransportError),

    /// Frame-level error while transmitting.
    #[error("frame error: {0}")]
    Frame(#[from] d7modem_frame::FrameError),

    /// A command could not be encoded.
    #[error("alp error: {0}")]
    Alp(#[from] d7modem_alp::AlpError),

    /// The encoded command does not fit in a single frame.
    #[error("command too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A background thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ModemError>;

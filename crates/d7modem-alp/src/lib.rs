//! ALP (Application Layer Protocol) actions exchanged with the modem.
//!
//! Covers the action subset the driver needs: tag request and response,
//! file read, write and return, forward, and return status. Encoders append
//! to a `BytesMut`; [`decode_action`] parses one action from a slice.
//!
//! Session configurations for the forward action live in [`session`].

pub mod action;
pub mod decode;
pub mod encode;
pub mod error;
pub mod length;
pub mod session;

pub use action::{
    Action, FileData, FileOffset, Status, OP_FORWARD, OP_READ_FILE_DATA, OP_REQUEST_TAG,
    OP_RETURN_FILE_DATA, OP_RETURN_STATUS, OP_RETURN_TAG, OP_WRITE_FILE_DATA,
};
pub use decode::{actions, decode_action, Actions};
pub use encode::{
    append_action_status, append_forward, append_interface_status, append_read_file_data,
    append_request_tag, append_return_file_data, append_return_tag, append_write_file_data,
};
pub use error::{AlpError, Result};
pub use length::MAX_LENGTH;
pub use session::{
    Addressee, AddresseeId, D7apSessionConfig, InterfaceId, LorawanAbpConfig, LorawanOtaaConfig,
    NlsMethod, Qos, ResponseMode, RetryMode, SessionConfig,
};

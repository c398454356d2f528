/// Errors that can occur while encoding or decoding ALP actions.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AlpError {
    /// The input ended before the action was complete.
    #[error("truncated action ({needed} bytes needed, {available} available)")]
    Truncated { needed: usize, available: usize },

    /// The control byte carries an opcode this codec does not handle.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    /// A forward action names an interface this codec does not know.
    #[error("unknown interface 0x{0:02X}")]
    UnknownInterface(u8),

    /// A length or offset does not fit the variable-length encoding.
    #[error("length {0} exceeds the variable-length operand range")]
    LengthOverflow(u64),

    /// A configuration field holds a value outside its defined set.
    #[error("invalid {field} value {value}")]
    InvalidField { field: &'static str, value: u8 },
}

pub type Result<T> = std::result::Result<T, AlpError>;

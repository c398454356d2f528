//! Action model.
//!
//! Every action starts with a control byte: the opcode in bits 0-5, and two
//! opcode-specific flags in bits 6 and 7.

use bytes::Bytes;

use crate::session::SessionConfig;

pub const OP_READ_FILE_DATA: u8 = 1;
pub const OP_WRITE_FILE_DATA: u8 = 4;
pub const OP_RETURN_FILE_DATA: u8 = 32;
pub const OP_RETURN_STATUS: u8 = 34;
pub const OP_RETURN_TAG: u8 = 35;
pub const OP_FORWARD: u8 = 50;
pub const OP_REQUEST_TAG: u8 = 52;

pub(crate) const OPCODE_MASK: u8 = 0x3F;
/// Bit 6: response requested, or error for a tag response.
pub(crate) const FLAG_BIT6: u8 = 0x40;
/// Bit 7: group, or end-of-packet / completed for tag actions.
pub(crate) const FLAG_BIT7: u8 = 0x80;

/// A file id with a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileOffset {
    pub file_id: u8,
    pub offset: u32,
}

/// File contents at an offset, as carried by write and return actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileData {
    pub file_id: u8,
    pub offset: u32,
    pub data: Bytes,
}

/// Result of a single action or interface, carried by a return-status action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Action { action_index: u8, status: u8 },
    Interface { interface: u8, data: Bytes },
}

/// One decoded action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    RequestTag {
        tag_id: u8,
        respond_when_completed: bool,
    },
    ReturnTag {
        tag_id: u8,
        completed: bool,
        error: bool,
    },
    ReadFileData {
        file: FileOffset,
        length: u32,
        response_requested: bool,
    },
    WriteFileData {
        file: FileData,
        response_requested: bool,
    },
    ReturnFileData(FileData),
    Forward(SessionConfig),
    ReturnStatus(Status),
}

impl Action {
    pub fn opcode(&self) -> u8 {
        match self {
            Action::RequestTag { .. } => OP_REQUEST_TAG,
            Action::ReturnTag { .. } => OP_RETURN_TAG,
            Action::ReadFileData { .. } => OP_READ_FILE_DATA,
            Action::WriteFileData { .. } => OP_WRITE_FILE_DATA,
            Action::ReturnFileData(_) => OP_RETURN_FILE_DATA,
            Action::Forward(_) => OP_FORWARD,
            Action::ReturnStatus(_) => OP_RETURN_STATUS,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Action::RequestTag { .. } => "request-tag",
            Action::ReturnTag { .. } => "return-tag",
            Action::ReadFileData { .. } => "read-file-data",
            Action::WriteFileData { .. } => "write-file-data",
            Action::ReturnFileData(_) => "return-file-data",
            Action::Forward(_) => "forward",
            Action::ReturnStatus(_) => "return-status",
        }
    }
}

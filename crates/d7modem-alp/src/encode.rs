//! Action encoders. Each appends one complete action to `dst`.
//!
//! Encoders validate their operands before writing, so `dst` is unchanged
//! when an error is returned.

use bytes::{BufMut, BytesMut};

use crate::action::{
    FLAG_BIT6, FLAG_BIT7, OP_FORWARD, OP_READ_FILE_DATA, OP_REQUEST_TAG, OP_RETURN_FILE_DATA,
    OP_RETURN_STATUS, OP_RETURN_TAG, OP_WRITE_FILE_DATA,
};
use crate::error::Result;
use crate::length::{append_length, checked_length, encoded_len};
use crate::session::SessionConfig;

fn control(opcode: u8, bit6: bool, bit7: bool) -> u8 {
    let mut byte = opcode;
    if bit6 {
        byte |= FLAG_BIT6;
    }
    if bit7 {
        byte |= FLAG_BIT7;
    }
    byte
}

fn file_operand(dst: &mut BytesMut, file_id: u8, offset: u32, length: u32) -> Result<()> {
    encoded_len(offset)?;
    encoded_len(length)?;
    dst.put_u8(file_id);
    append_length(dst, offset)?;
    append_length(dst, length)
}

fn file_data(
    dst: &mut BytesMut,
    opcode: u8,
    flags: u8,
    file_id: u8,
    offset: u32,
    data: &[u8],
) -> Result<()> {
    let length = checked_length(data.len())?;
    encoded_len(offset)?;
    dst.put_u8(opcode | flags);
    file_operand(dst, file_id, offset, length)?;
    dst.put_slice(data);
    Ok(())
}

/// Ask the modem to echo `tag_id` back in a return-tag action.
pub fn append_request_tag(dst: &mut BytesMut, tag_id: u8, respond_when_completed: bool) {
    dst.put_u8(control(OP_REQUEST_TAG, false, respond_when_completed));
    dst.put_u8(tag_id);
}

pub fn append_return_tag(dst: &mut BytesMut, tag_id: u8, completed: bool, error: bool) {
    dst.put_u8(control(OP_RETURN_TAG, error, completed));
    dst.put_u8(tag_id);
}

pub fn append_read_file_data(
    dst: &mut BytesMut,
    file_id: u8,
    offset: u32,
    length: u32,
    response_requested: bool,
    group: bool,
) -> Result<()> {
    encoded_len(offset)?;
    encoded_len(length)?;
    dst.put_u8(control(OP_READ_FILE_DATA, response_requested, group));
    file_operand(dst, file_id, offset, length)
}

pub fn append_write_file_data(
    dst: &mut BytesMut,
    file_id: u8,
    offset: u32,
    data: &[u8],
    response_requested: bool,
    group: bool,
) -> Result<()> {
    let flags = control(0, response_requested, group);
    file_data(dst, OP_WRITE_FILE_DATA, flags, file_id, offset, data)
}

pub fn append_return_file_data(
    dst: &mut BytesMut,
    file_id: u8,
    offset: u32,
    data: &[u8],
) -> Result<()> {
    file_data(dst, OP_RETURN_FILE_DATA, 0, file_id, offset, data)
}

/// Forward the rest of the command to the interface of `session`.
///
/// Nothing is appended for [`SessionConfig::Host`].
pub fn append_forward(dst: &mut BytesMut, session: &SessionConfig) {
    if !session.forwards() {
        return;
    }
    dst.put_u8(OP_FORWARD);
    dst.put_u8(session.interface().as_u8());
    session.append_to(dst);
}

/// Status of a single action within a command.
pub fn append_action_status(dst: &mut BytesMut, action_index: u8, status: u8) {
    dst.put_u8(OP_RETURN_STATUS);
    dst.put_u8(action_index);
    dst.put_u8(status);
}

/// Interface status (for example a D7 session result).
pub fn append_interface_status(dst: &mut BytesMut, interface: u8, data: &[u8]) -> Result<()> {
    let length = checked_length(data.len())?;
    dst.put_u8(OP_RETURN_STATUS | FLAG_BIT6);
    dst.put_u8(interface);
    append_length(dst, length)?;
    dst.put_slice(data);
    Ok(())
}

use bytes::Bytes;

use crate::action::{
    Action, FileData, FileOffset, Status, FLAG_BIT6, FLAG_BIT7, OPCODE_MASK, OP_FORWARD,
    OP_READ_FILE_DATA, OP_REQUEST_TAG, OP_RETURN_FILE_DATA, OP_RETURN_STATUS, OP_RETURN_TAG,
    OP_WRITE_FILE_DATA,
};
use crate::error::{AlpError, Result};
use crate::length::decode_length;
use crate::session::{InterfaceId, SessionConfig};

/// Status operand extension: an interface status follows.
const STATUS_EXT_INTERFACE: u8 = 1;

struct Input<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Input<'a> {
    fn byte(&mut self) -> Result<u8> {
        let byte = *self.src.get(self.pos).ok_or(AlpError::Truncated {
            needed: self.pos + 1,
            available: self.src.len(),
        })?;
        self.pos += 1;
        Ok(byte)
    }

    fn length(&mut self) -> Result<u32> {
        let (value, used) = decode_length(&self.src[self.pos..]).map_err(|err| match err {
            AlpError::Truncated { needed, .. } => AlpError::Truncated {
                needed: self.pos + needed,
                available: self.src.len(),
            },
            other => other,
        })?;
        self.pos += used;
        Ok(value)
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        let slice = self.src.get(self.pos..end).ok_or(AlpError::Truncated {
            needed: end,
            available: self.src.len(),
        })?;
        self.pos = end;
        Ok(slice)
    }

    fn file_offset(&mut self) -> Result<FileOffset> {
        Ok(FileOffset {
            file_id: self.byte()?,
            offset: self.length()?,
        })
    }

    fn file_data(&mut self) -> Result<FileData> {
        let FileOffset { file_id, offset } = self.file_offset()?;
        let length = self.length()?;
        let data = self.bytes(length as usize)?;
        Ok(FileData {
            file_id,
            offset,
            data: Bytes::copy_from_slice(data),
        })
    }
}

/// Decode the action at the start of `src`.
///
/// Returns the action and the number of bytes it occupies.
pub fn decode_action(src: &[u8]) -> Result<(Action, usize)> {
    let mut input = Input { src, pos: 0 };
    let control = input.byte()?;
    let bit6 = control & FLAG_BIT6 != 0;
    let bit7 = control & FLAG_BIT7 != 0;

    let action = match control & OPCODE_MASK {
        OP_REQUEST_TAG => Action::RequestTag {
            tag_id: input.byte()?,
            respond_when_completed: bit7,
        },
        OP_RETURN_TAG => Action::ReturnTag {
            tag_id: input.byte()?,
            completed: bit7,
            error: bit6,
        },
        OP_READ_FILE_DATA => Action::ReadFileData {
            file: input.file_offset()?,
            length: input.length()?,
            response_requested: bit6,
        },
        OP_WRITE_FILE_DATA => Action::WriteFileData {
            file: input.file_data()?,
            response_requested: bit6,
        },
        OP_RETURN_FILE_DATA => Action::ReturnFileData(input.file_data()?),
        OP_FORWARD => {
            let interface = InterfaceId::try_from(input.byte()?)?;
            let (config, used) = SessionConfig::decode(interface, &src[input.pos..])
                .map_err(|err| match err {
                    AlpError::Truncated { needed, .. } => AlpError::Truncated {
                        needed: input.pos + needed,
                        available: src.len(),
                    },
                    other => other,
                })?;
            input.pos += used;
            Action::Forward(config)
        }
        OP_RETURN_STATUS => {
            if control >> 6 == STATUS_EXT_INTERFACE {
                let interface = input.byte()?;
                let length = input.length()?;
                Action::ReturnStatus(Status::Interface {
                    interface,
                    data: Bytes::copy_from_slice(input.bytes(length as usize)?),
                })
            } else {
                Action::ReturnStatus(Status::Action {
                    action_index: input.byte()?,
                    status: input.byte()?,
                })
            }
        }
        other => return Err(AlpError::UnknownOpcode(other)),
    };

    Ok((action, input.pos))
}

/// Iterate over the actions of a payload, stopping after the first error.
pub fn actions(src: &[u8]) -> Actions<'_> {
    Actions { src, failed: false }
}

/// Iterator returned by [`actions`].
pub struct Actions<'a> {
    src: &'a [u8],
    failed: bool,
}

impl Iterator for Actions<'_> {
    type Item = Result<Action>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.src.is_empty() {
            return None;
        }
        match decode_action(self.src) {
            Ok((action, used)) => {
                self.src = &self.src[used..];
                Some(Ok(action))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

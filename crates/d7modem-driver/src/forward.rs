use bytes::BytesMut;
use d7modem_alp::{append_forward, append_return_file_data, SessionConfig};

use crate::error::Result;

/// Append an unsolicited response: a forward to the session's interface
/// followed by a return-file-data action.
///
/// No forward action is emitted for [`SessionConfig::Host`].
pub fn build_unsolicited(
    body: &mut BytesMut,
    file_id: u8,
    offset: u32,
    data: &[u8],
    session: &SessionConfig,
) -> Result<()> {
    let start = body.len();
    append_forward(body, session);
    if let Err(err) = append_return_file_data(body, file_id, offset, data) {
        body.truncate(start);
        return Err(err.into());
    }
    Ok(())
}

/// Append a forward to the session's interface followed by caller-encoded actions.
pub fn build_raw_unsolicited(body: &mut BytesMut, actions: &[u8], session: &SessionConfig) {
    append_forward(body, session);
    body.extend_from_slice(actions);
}

use std::sync::Arc;

/// Notifications delivered from the receive worker.
///
/// Every method has a no-op default. Implementations run on the worker
/// thread and should return quickly; they may issue new commands.
pub trait ModemCallbacks: Send + Sync {
    /// An asynchronous command finished.
    fn command_completed(&self, with_error: bool) {
        let _ = with_error;
    }

    /// File data returned by the modem outside a synchronous read.
    fn return_file_data(&self, file_id: u8, offset: u32, data: &[u8]) {
        let _ = (file_id, offset, data);
    }

    /// The modem asks the host to write file data.
    fn write_file_data(&self, file_id: u8, offset: u32, data: &[u8]) {
        let _ = (file_id, offset, data);
    }

    /// The modem answered a ping request.
    fn ping_response(&self) {}

    /// A log line emitted by the modem firmware.
    fn log_message(&self, message: &str) {
        let _ = message;
    }
}

/// Callbacks that ignore every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCallbacks;

impl ModemCallbacks for NoCallbacks {}

impl<T: ModemCallbacks + ?Sized> ModemCallbacks for Arc<T> {
    fn command_completed(&self, with_error: bool) {
        (**self).command_completed(with_error)
    }

    fn return_file_data(&self, file_id: u8, offset: u32, data: &[u8]) {
        (**self).return_file_data(file_id, offset, data)
    }

    fn write_file_data(&self, file_id: u8, offset: u32, data: &[u8]) {
        (**self).write_file_data(file_id, offset, data)
    }

    fn ping_response(&self) {
        (**self).ping_response()
    }

    fn log_message(&self, message: &str) {
        (**self).log_message(message)
    }
}

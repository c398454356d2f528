use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};

/// Default line speed used by the modem firmware.
pub const DEFAULT_BAUDRATE: u32 = 115_200;

/// Link settings recorded at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Line speed in bits per second. Applied by the platform, not by this crate.
    pub baudrate: u32,
    /// Read timeout for links that support one (Unix sockets).
    ///
    /// A bounded read timeout lets a reader thread observe shutdown requests.
    pub read_timeout: Option<Duration>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baudrate: DEFAULT_BAUDRATE,
            read_timeout: Some(Duration::from_millis(100)),
        }
    }
}

/// A connected byte link to the modem — implements Read + Write.
pub struct SerialLink {
    inner: SerialLinkInner,
    config: LinkConfig,
}

enum SerialLinkInner {
    Device(File),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SerialLinkInner::Device(file) => file.read(buf),
            #[cfg(unix)]
            SerialLinkInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SerialLinkInner::Device(file) => file.write(buf),
            #[cfg(unix)]
            SerialLinkInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            SerialLinkInner::Device(file) => file.flush(),
            #[cfg(unix)]
            SerialLinkInner::Unix(stream) => stream.flush(),
        }
    }
}

impl SerialLink {
    /// Open the link at `path`.
    ///
    /// A path naming a Unix socket is connected to (simulated modem);
    /// anything else is opened read/write as a character device.
    pub fn open(path: impl AsRef<Path>, config: LinkConfig) -> Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;

            let metadata = std::fs::metadata(path).map_err(|e| TransportError::Open {
                path: path.to_path_buf(),
                source: e,
            })?;
            if metadata.file_type().is_socket() {
                let stream = std::os::unix::net::UnixStream::connect(path).map_err(|e| {
                    TransportError::Open {
                        path: path.to_path_buf(),
                        source: e,
                    }
                })?;
                debug!(?path, "connected to simulated modem socket");
                return Self::from_unix(stream, config);
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| TransportError::Open {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!(?path, baudrate = config.baudrate, "opened modem device");
        Ok(Self::from_file(file, config))
    }

    /// Wrap an already opened device file.
    pub fn from_file(file: File, config: LinkConfig) -> Self {
        Self {
            inner: SerialLinkInner::Device(file),
            config,
        }
    }

    /// Wrap a connected Unix stream and apply the configured read timeout.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream, config: LinkConfig) -> Result<Self> {
        stream.set_read_timeout(config.read_timeout)?;
        Ok(Self {
            inner: SerialLinkInner::Unix(stream),
            config,
        })
    }

    /// Create a connected pair of links, one end for the host and one for a
    /// simulated modem.
    #[cfg(unix)]
    pub fn pair(config: LinkConfig) -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((
            Self::from_unix(left, config.clone())?,
            Self::from_unix(right, config)?,
        ))
    }

    /// Try to clone this link (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            SerialLinkInner::Device(file) => SerialLinkInner::Device(file.try_clone()?),
            #[cfg(unix)]
            SerialLinkInner::Unix(stream) => SerialLinkInner::Unix(stream.try_clone()?),
        };
        Ok(Self {
            inner,
            config: self.config.clone(),
        })
    }

    /// Whether a blocked read on this link can be interrupted by [`SerialLink::shutdown`]
    /// or a read timeout.
    pub fn is_interruptible(&self) -> bool {
        match &self.inner {
            SerialLinkInner::Device(_) => false,
            #[cfg(unix)]
            SerialLinkInner::Unix(_) => true,
        }
    }

    /// Shut down both directions of the link, waking blocked readers.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            SerialLinkInner::Device(_) => Err(TransportError::Unsupported {
                operation: "shutdown",
                kind: self.kind(),
            }),
            #[cfg(unix)]
            SerialLinkInner::Unix(stream) => {
                stream.shutdown(std::net::Shutdown::Both)?;
                Ok(())
            }
        }
    }

    /// Link settings.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Link kind for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            SerialLinkInner::Device(_) => "device",
            #[cfg(unix)]
            SerialLinkInner::Unix(_) => "unix-socket",
        }
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("type", &self.kind())
            .field("baudrate", &self.config.baudrate)
            .finish()
    }
}

//! Byte-stream sources the listener reads from.
//!
//! A [`StreamSource`] knows how to open a fresh [`ByteStream`]; the listener
//! calls it once at start and again after every hard I/O failure. Sources
//! shipped here:
//!
//! - [`DeviceSource`]: a serial device node (e.g. `/dev/ttyUSB0`) or a FIFO,
//!   opened non-blocking and driven by the reactor. Line settings (baud
//!   rate, parity) are expected to be configured on the device beforehand,
//!   e.g. with `stty`. Regular files (captures) are read through `tokio::fs`.
//! - [`TcpSource`]: a serial-over-TCP bridge such as `ser2net`.
//! - [`MockSource`](crate::mock::MockSource): scripted data for tests.
//!
//! # Example
//!
//! ```
//! use thermolog_core::SourceSpec;
//!
//! let spec: SourceSpec = "tcp://192.168.1.20:4001".parse()?;
//! let source = spec.into_source();
//! assert_eq!(source.name(), "tcp://192.168.1.20:4001");
//! # Ok::<(), thermolog_core::Error>(())
//! ```

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::Error;

/// Anything the listener can read bytes from.
pub trait ByteStream: AsyncRead + Send + Unpin {}

impl<T: AsyncRead + Send + Unpin> ByteStream for T {}

/// Opens byte streams on demand.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Open a new stream.
    async fn open(&self) -> io::Result<Box<dyn ByteStream>>;
}

#[async_trait]
impl<S: StreamSource + ?Sized> StreamSource for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn open(&self) -> io::Result<Box<dyn ByteStream>> {
        (**self).open().await
    }
}

/// A serial device node or FIFO on the local filesystem.
#[derive(Debug, Clone)]
pub struct DeviceSource {
    path: PathBuf,
    name: String,
}

impl DeviceSource {
    /// Create a source for the given device path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }
}

#[async_trait]
impl StreamSource for DeviceSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> io::Result<Box<dyn ByteStream>> {
        debug!("Opening device {}", self.name);
        let metadata = tokio::fs::metadata(&self.path).await?;
        let stream: Box<dyn ByteStream> = if metadata.is_file() {
            Box::new(tokio::fs::File::open(&self.path).await?)
        } else {
            open_polled(&self.path, &metadata)?
        };
        info!("Opened device {}", self.name);
        Ok(stream)
    }
}

/// Open a tty or FIFO as a non-blocking descriptor registered with the
/// reactor. No read is ever parked on a blocking thread, so dropping the
/// stream closes the descriptor immediately.
#[cfg(unix)]
#[cfg_attr(
    not(any(target_os = "linux", target_os = "android")),
    allow(unused_variables)
)]
fn open_polled(path: &Path, metadata: &std::fs::Metadata) -> io::Result<Box<dyn ByteStream>> {
    use tokio::net::unix::pipe;

    let mut options = pipe::OpenOptions::new();
    options.unchecked(true);
    // A FIFO opened read-write never reports end-of-stream while no writer
    // is attached, matching an idle serial line.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use std::os::unix::fs::FileTypeExt;
        options.read_write(metadata.file_type().is_fifo());
    }

    Ok(Box::new(options.open_receiver(path)?))
}

#[cfg(not(unix))]
fn open_polled(path: &Path, _metadata: &std::fs::Metadata) -> io::Result<Box<dyn ByteStream>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{} is not a regular file", path.display()),
    ))
}

/// A serial-over-TCP bridge.
#[derive(Debug, Clone)]
pub struct TcpSource {
    addr: String,
    name: String,
    connect_timeout: Duration,
}

impl TcpSource {
    /// Default time allowed for the TCP handshake.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a source for a `host:port` address.
    pub fn new(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        let name = format!("tcp://{}", addr);
        Self {
            addr,
            name,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl StreamSource for TcpSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> io::Result<Box<dyn ByteStream>> {
        debug!("Connecting to {}", self.name);
        let stream = timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", self.addr),
                )
            })??;
        info!("Connected to {}", self.name);
        Ok(Box::new(stream))
    }
}

/// Parsed form of a configured source address.
///
/// `tcp://host:port` selects a [`TcpSource`]; anything else is treated as a
/// device path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Local device node or FIFO.
    Device(PathBuf),
    /// Serial-over-TCP bridge, `host:port`.
    Tcp(String),
}

impl SourceSpec {
    /// Build the matching [`StreamSource`].
    pub fn into_source(self) -> Box<dyn StreamSource> {
        match self {
            SourceSpec::Device(path) => Box::new(DeviceSource::new(path)),
            SourceSpec::Tcp(addr) => Box::new(TcpSource::new(addr)),
        }
    }
}

impl FromStr for SourceSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidSource("source cannot be empty".to_string()));
        }

        match s.strip_prefix("tcp://") {
            Some(addr) => {
                let valid = addr
                    .rsplit_once(':')
                    .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
                if valid {
                    Ok(SourceSpec::Tcp(addr.to_string()))
                } else {
                    Err(Error::InvalidSource(format!(
                        "'{}': expected tcp://host:port",
                        s
                    )))
                }
            }
            None => Ok(SourceSpec::Device(PathBuf::from(s))),
        }
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Device(path) => write!(f, "{}", path.display()),
            SourceSpec::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

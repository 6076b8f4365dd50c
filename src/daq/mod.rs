use log::{debug, warn};
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::ZiError;
use crate::protocol::{Protocol, Tag, HEADER_SIZE};
use crate::types::{ApiLevel, ZiValue};

pub mod awg;
pub mod device;
pub mod params;
pub mod stream;

pub use awg::CompilerStatus;
pub use stream::poll_flags;

/// Client release this crate speaks; the data server must match on
/// major.minor.
pub const CLIENT_VERSION: &str = "24.10.1";

/// Default data-server TCP port (HF2-class servers listen on 8005).
pub const DEFAULT_PORT: u16 = 8004;

/// Connection configuration for the data-server TCP client.
///
/// Timeouts for the phases of the connection lifecycle; the defaults are
/// generous enough for a data server on the local network.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for establishing the initial TCP connection.
    pub connect_timeout: Duration,
    /// Timeout for reading a response from the data server.
    pub read_timeout: Duration,
    /// Timeout for writing a request to the data server.
    pub write_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// Builder for [`DaqClient`] instances.
///
/// # Examples
///
/// ```no_run
/// use zidaq::DaqClient;
///
/// let client = DaqClient::builder()
///     .host("127.0.0.1")
///     .port(8004)
///     .connect()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Default)]
pub struct DaqClientBuilder {
    host: Option<String>,
    port: Option<u16>,
    api_level: Option<ApiLevel>,
    config: ConnectionConfig,
    debug: bool,
}

impl DaqClientBuilder {
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Protocol compatibility level to negotiate (default: level 6).
    pub fn api_level(mut self, level: ApiLevel) -> Self {
        self.api_level = Some(level);
        self
    }

    /// Enable verbose request/response logging.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Establish the TCP connection and negotiate the API level.
    pub fn connect(self) -> Result<DaqClient, ZiError> {
        let host = self
            .host
            .ok_or_else(|| ZiError::InvalidArgument("Host must be specified".to_string()))?;
        let port = self.port.unwrap_or(DEFAULT_PORT);
        let api_level = self.api_level.unwrap_or(ApiLevel::Six);

        let addr = format!("{host}:{port}")
            .to_socket_addrs()
            .map_err(|_| ZiError::InvalidAddress(format!("{host}:{port}")))?
            .next()
            .ok_or_else(|| ZiError::InvalidAddress(format!("{host}:{port}")))?;

        debug!("Connecting to data server at {host}:{port}");
        let stream =
            TcpStream::connect_timeout(&addr, self.config.connect_timeout).map_err(|e| {
                warn!("Failed to connect to {host}:{port}: {e}");
                if e.kind() == std::io::ErrorKind::TimedOut {
                    ZiError::Timeout
                } else {
                    ZiError::Io {
                        source: e,
                        context: format!("connecting to {host}:{port}"),
                    }
                }
            })?;
        stream.set_read_timeout(Some(self.config.read_timeout))?;
        stream.set_write_timeout(Some(self.config.write_timeout))?;

        let mut client = DaqClient {
            stream,
            config: self.config,
            debug: self.debug,
            api_level,
            server_version: String::new(),
        };
        client.hello()?;
        debug!(
            "Connected, server version {} (API level {})",
            client.server_version,
            api_level.as_u32()
        );
        Ok(client)
    }
}

/// Blocking TCP client for a LabOne-style data server.
///
/// `DaqClient` owns one persistent connection and provides typed access
/// to the server's hierarchical parameter tree, streaming subscriptions,
/// server-side modules (sweeper, scope, data acquisition, ...) and AWG
/// program upload. Every call blocks until the server responds; all
/// multi-call orchestration happens in the caller's thread.
///
/// # Examples
///
/// ```no_run
/// use zidaq::{DaqClient, NodePath};
///
/// let mut client = DaqClient::builder().host("localhost").connect()?;
/// let props = client.connect_device("dev2006", "1GbE")?;
/// client.set_double(&NodePath::parse("/dev2006/oscs/0/freq")?, 400e3)?;
/// let freq = client.get_double(&NodePath::parse("/dev2006/oscs/0/freq")?)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct DaqClient {
    stream: TcpStream,
    config: ConnectionConfig,
    debug: bool,
    api_level: ApiLevel,
    server_version: String,
}

impl DaqClient {
    pub fn builder() -> DaqClientBuilder {
        DaqClientBuilder::default()
    }

    /// Connect with default configuration and API level 6.
    pub fn connect(host: &str, port: u16) -> Result<Self, ZiError> {
        Self::builder().host(host).port(port).connect()
    }

    pub fn api_level(&self) -> ApiLevel {
        self.api_level
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Check that server and client releases match on major.minor.
    ///
    /// A mismatch is not necessarily fatal but unsupported; call this
    /// right after connecting, the way every example script does.
    pub fn check_server_version(&self) -> Result<(), ZiError> {
        let prefix = |v: &str| {
            v.split('.')
                .take(2)
                .collect::<Vec<_>>()
                .join(".")
        };
        if prefix(&self.server_version) == prefix(CLIENT_VERSION) {
            Ok(())
        } else {
            Err(ZiError::Protocol(format!(
                "Server version {} does not match client version {}; update the server or this client",
                self.server_version, CLIENT_VERSION
            )))
        }
    }

    fn hello(&mut self) -> Result<(), ZiError> {
        let result = self.transact(
            "Session.Hello",
            vec![
                ZiValue::U32(self.api_level.as_u32()),
                ZiValue::String(CLIENT_VERSION.to_string()),
            ],
            &[Tag::U32, Tag::Str],
            &[Tag::Str],
        )?;
        self.server_version = result
            .first()
            .ok_or_else(|| ZiError::Protocol("No server version returned".to_string()))?
            .as_str()?
            .to_string();
        Ok(())
    }

    /// Send a command and parse its tagged response fields.
    ///
    /// This is the single request/response primitive every typed method
    /// builds on. Use it directly for commands without a dedicated
    /// wrapper.
    pub fn transact(
        &mut self,
        command: &str,
        args: Vec<ZiValue>,
        arg_tags: &[Tag],
        ret_tags: &[Tag],
    ) -> Result<Vec<ZiValue>, ZiError> {
        let body = self.transact_raw(command, args, arg_tags)?;
        let result = Protocol::parse_response(&body, ret_tags)?;
        if self.debug {
            debug!("{command} -> {result:?}");
        }
        Ok(result)
    }

    /// Send a command and return the raw response body.
    ///
    /// Used for responses with record-chunk payloads (`Stream.Poll`,
    /// `Module.Read`) that are decoded by [`crate::data::parse_records`].
    pub fn transact_raw(
        &mut self,
        command: &str,
        args: Vec<ZiValue>,
        arg_tags: &[Tag],
    ) -> Result<Vec<u8>, ZiError> {
        if args.len() != arg_tags.len() {
            return Err(ZiError::InvalidArgument(format!(
                "{command}: {} arguments but {} tags",
                args.len(),
                arg_tags.len()
            )));
        }

        let mut body = Vec::new();
        for (arg, tag) in args.iter().zip(arg_tags.iter()) {
            Protocol::serialize_value(arg, *tag, &mut body)?;
        }
        if self.debug {
            debug!("{command}: sending {} byte body {args:?}", body.len());
        }

        let header = Protocol::command_header(command, body.len() as u32);
        self.stream.write_all(&header).map_err(|e| ZiError::Io {
            source: e,
            context: format!("{command}: writing request header"),
        })?;
        if !body.is_empty() {
            self.stream.write_all(&body).map_err(|e| ZiError::Io {
                source: e,
                context: format!("{command}: writing request body"),
            })?;
        }

        let response_header = Protocol::read_exact_bytes::<HEADER_SIZE>(&mut self.stream)?;
        let body_size = Protocol::validate_response_header(&response_header, command)?;
        if body_size == 0 {
            return Ok(Vec::new());
        }
        Protocol::read_body(&mut self.stream, body_size as usize)
    }
}

impl Drop for DaqClient {
    fn drop(&mut self) {
        let _ = self.unsubscribe_all();
    }
}

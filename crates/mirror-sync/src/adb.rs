//! # adb Host Protocol Client
//!
//! Talks to a local adb server over TCP. One connection per request.
//!
//! ## Wire Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  client → server   "000c" "host:devices"       4 hex digits + payload  │
//! │  server → client   "OKAY"                      or "FAIL" 000b "<msg>"  │
//! │  server → client   "0017" "emulator-5554\tdevice\n"   (host:devices)   │
//! │                                                                         │
//! │  Shell on a device:                                                    │
//! │  client → server   host:transport:<serial>     ← "OKAY"                │
//! │  client → server   shell:<command>             ← "OKAY"                │
//! │  server → client   raw stdout until EOF                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::config::AdbSettings;
use crate::error::{SyncError, SyncResult};
use crate::gateway::{DeviceHandle, ShellGateway};
use mirror_core::parse::parse_device_list;

const OKAY: &[u8; 4] = b"OKAY";
const FAIL: &[u8; 4] = b"FAIL";
const MAX_REQUEST_LEN: usize = 0xFFFF;

/// Reply status of one adb request.
#[derive(Debug, PartialEq, Eq)]
enum Status {
    Okay,
    Fail(String),
}

/// [`ShellGateway`] backed by a running adb server.
#[derive(Debug, Clone)]
pub struct AdbClient {
    address: String,
}

impl AdbClient {
    /// Creates a client for the server at `host:port`.
    pub fn new(address: impl Into<String>) -> Self {
        AdbClient {
            address: address.into(),
        }
    }

    pub fn from_settings(settings: &AdbSettings) -> Self {
        Self::new(settings.address())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Asks the server for its protocol version. Useful as a liveness check.
    pub async fn server_version(&self) -> SyncResult<u32> {
        let body = self
            .host_query("host:version")
            .await
            .map_err(|e| SyncError::Transport(format!("{}: {}", self.address, e)))?;

        u32::from_str_radix(body.trim(), 16)
            .map_err(|_| SyncError::Transport(format!("unexpected version reply: {}", body)))
    }

    /// Sends a `host:` request and reads its length-prefixed answer.
    async fn host_query(&self, request: &str) -> io::Result<String> {
        let mut stream = TcpStream::connect(&self.address).await?;
        send_request(&mut stream, request).await?;

        match read_status(&mut stream).await? {
            Status::Okay => read_length_prefixed(&mut stream).await,
            Status::Fail(message) => Err(io::Error::new(io::ErrorKind::Other, message)),
        }
    }

    async fn shell(&self, serial: &str, command: &str) -> io::Result<Result<String, String>> {
        let mut stream = TcpStream::connect(&self.address).await?;

        send_request(&mut stream, &format!("host:transport:{}", serial)).await?;
        if let Status::Fail(message) = read_status(&mut stream).await? {
            return Ok(Err(message));
        }

        send_request(&mut stream, &format!("shell:{}", command)).await?;
        if let Status::Fail(message) = read_status(&mut stream).await? {
            return Ok(Err(message));
        }

        let mut output = Vec::new();
        stream.read_to_end(&mut output).await?;
        Ok(Ok(String::from_utf8_lossy(&output).into_owned()))
    }
}

#[async_trait]
impl ShellGateway for AdbClient {
    async fn list_devices(&self) -> SyncResult<Vec<DeviceHandle>> {
        let body = self
            .host_query("host:devices")
            .await
            .map_err(|e| SyncError::Transport(format!("{}: {}", self.address, e)))?;

        let listings = parse_device_list(&body)
            .map_err(|e| SyncError::Transport(format!("bad device list: {}", e)))?;

        let devices = listings
            .into_iter()
            .filter_map(|listing| {
                if listing.is_online() {
                    Some(DeviceHandle::new(listing.serial))
                } else {
                    warn!(serial = %listing.serial, state = %listing.state, "Skipping unusable device");
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!(count = devices.len(), "Listed devices");
        Ok(devices)
    }

    async fn execute_shell(&self, device: &DeviceHandle, command: &str) -> SyncResult<String> {
        debug!(serial = %device, command = %command, "Running shell command");

        match self.shell(device.serial(), command).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(message)) => Err(SyncError::remote(device.serial(), command, message)),
            Err(e) => Err(SyncError::remote(device.serial(), command, e.to_string())),
        }
    }
}

// =============================================================================
// Framing
// =============================================================================

async fn send_request<S>(stream: &mut S, payload: &str) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    if payload.len() > MAX_REQUEST_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("request of {} bytes is too long", payload.len()),
        ));
    }

    let framed = format!("{:04x}{}", payload.len(), payload);
    stream.write_all(framed.as_bytes()).await?;
    stream.flush().await
}

async fn read_status<S>(stream: &mut S) -> io::Result<Status>
where
    S: AsyncRead + Unpin,
{
    let mut status = [0u8; 4];
    stream.read_exact(&mut status).await?;

    match &status {
        OKAY => Ok(Status::Okay),
        FAIL => Ok(Status::Fail(read_length_prefixed(stream).await?)),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected status {:?}", String::from_utf8_lossy(other)),
        )),
    }
}

async fn read_length_prefixed<S>(stream: &mut S) -> io::Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut len_hex = [0u8; 4];
    stream.read_exact(&mut len_hex).await?;

    let len = std::str::from_utf8(&len_hex)
        .ok()
        .and_then(|hex| usize::from_str_radix(hex, 16).ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad length prefix"))?;

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(String::from_utf8_lossy(&body).into_owned())
}

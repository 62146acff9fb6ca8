//! OBS WebSocket API client
//!
//! Controls OBS Studio via the obs-websocket 5.x protocol (built into OBS 28+).
//! Default endpoint: ws://{host}:{port}
//!
//! A client keeps one authenticated WebSocket open for the lifetime of the
//! OBS context and reconnects when a request fails on a stale socket.

use anyhow::{Context, Result};
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{connect, Message, WebSocket};

/// Number of retry attempts for network operations
const MAX_RETRIES: u32 = 2;

/// Delay between retry attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// RPC version negotiated with obs-websocket
const RPC_VERSION: u32 = 1;

/// Global request ID counter
static REQUEST_ID: AtomicU32 = AtomicU32::new(1);

/// Generate a unique request ID
fn next_request_id() -> String {
    REQUEST_ID.fetch_add(1, Ordering::SeqCst).to_string()
}

type OBSWebSocket = WebSocket<MaybeTlsStream<std::net::TcpStream>>;

/// Validate that an IP address is safe to connect to (private/local network only)
fn validate_ip(host: &str) -> Result<()> {
    let addr: IpAddr = host.parse().context("Invalid IP address format")?;

    let is_safe = match addr {
        IpAddr::V4(v4) => {
            v4.is_private()      // 10.x.x.x, 172.16-31.x.x, 192.168.x.x
                || v4.is_loopback()  // 127.x.x.x
                || v4.is_link_local() // 169.254.x.x
        }
        IpAddr::V6(v6) => {
            v6.is_loopback() // ::1
        }
    };

    if !is_safe {
        anyhow::bail!(
            "OBS WebSocket host must be on a private/local network, got: {}",
            host
        );
    }

    Ok(())
}

/// Execute a fallible operation with retries
fn with_retry<T, F>(mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if attempt < MAX_RETRIES => {
                debug!(attempt, error = %e, "OBS request failed, retrying");
                attempt += 1;
                thread::sleep(RETRY_DELAY);
            }
            Err(e) => return Err(e),
        }
    }
}

/// OBS WebSocket Hello message (server -> client)
#[derive(Debug, Deserialize)]
struct Hello {
    #[serde(rename = "obsWebSocketVersion")]
    _obs_websocket_version: String,
    authentication: Option<AuthChallenge>,
}

/// Authentication challenge from server
#[derive(Debug, Deserialize)]
struct AuthChallenge {
    challenge: String,
    salt: String,
}

/// Identified response (after successful auth)
#[derive(Debug, Deserialize)]
struct Identified {
    #[serde(rename = "negotiatedRpcVersion")]
    _negotiated_rpc_version: u32,
}

/// OBS WebSocket message wrapper
#[derive(Debug, Deserialize)]
struct OBSMessage {
    op: u32,
    d: Value,
}

/// OBS WebSocket op codes
pub(crate) mod op {
    pub const HELLO: u32 = 0;
    pub const IDENTIFY: u32 = 1;
    pub const IDENTIFIED: u32 = 2;
    pub const REQUEST: u32 = 6;
    pub const REQUEST_RESPONSE: u32 = 7;
}

/// Generate authentication string per obs-websocket protocol
pub(crate) fn generate_auth_string(password: &str, challenge: &str, salt: &str) -> String {
    // Step 1: Concatenate password + salt, then SHA256
    let secret_string = format!("{}{}", password, salt);
    let secret_hash = Sha256::digest(secret_string.as_bytes());
    let secret_base64 = base64::engine::general_purpose::STANDARD.encode(secret_hash);

    // Step 2: Concatenate secret_base64 + challenge, then SHA256
    let auth_string = format!("{}{}", secret_base64, challenge);
    let auth_hash = Sha256::digest(auth_string.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(auth_hash)
}

/// Connection parameters for OBS
#[derive(Debug, Clone)]
pub struct OBSConnection {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

impl OBSConnection {
    pub fn new(host: &str, port: u16, password: Option<String>) -> Self {
        Self {
            host: host.to_string(),
            port,
            password,
        }
    }

    /// Connection key for logs ("host:port")
    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read one frame and decode it as an obs-websocket message
fn read_message(socket: &mut OBSWebSocket, what: &str) -> Result<OBSMessage> {
    let msg = socket
        .read()
        .with_context(|| format!("Failed to read {} from OBS", what))?;
    serde_json::from_str(msg.to_text()?)
        .with_context(|| format!("Failed to parse {} message", what))
}

/// Create a new authenticated WebSocket connection to OBS
fn create_connection(conn: &OBSConnection) -> Result<OBSWebSocket> {
    let url = format!("ws://{}:{}", conn.host, conn.port);

    let (mut socket, _response) = connect(&url)
        .context("Failed to connect to OBS WebSocket")?;

    // Step 1: Receive Hello
    let hello = read_message(&mut socket, "Hello")?;
    if hello.op != op::HELLO {
        anyhow::bail!("Expected Hello message, got op {}", hello.op);
    }

    let hello_data: Hello = serde_json::from_value(hello.d)
        .context("Failed to parse Hello data")?;

    // Step 2: Send Identify (with optional auth)
    let identify = match (hello_data.authentication, &conn.password) {
        (Some(auth), Some(password)) => {
            let auth_string = generate_auth_string(password, &auth.challenge, &auth.salt);
            json!({
                "op": op::IDENTIFY,
                "d": {
                    "rpcVersion": RPC_VERSION,
                    "authentication": auth_string
                }
            })
        }
        (Some(_), None) => {
            anyhow::bail!("OBS requires authentication but no password provided");
        }
        (None, _) => json!({
            "op": op::IDENTIFY,
            "d": {
                "rpcVersion": RPC_VERSION
            }
        }),
    };

    socket.send(Message::Text(identify.to_string()))
        .context("Failed to send Identify")?;

    // Step 3: Receive Identified
    let identified = read_message(&mut socket, "Identified")?;
    if identified.op != op::IDENTIFIED {
        anyhow::bail!("Authentication failed or unexpected message (op {})", identified.op);
    }

    let _: Identified = serde_json::from_value(identified.d)
        .context("Failed to parse Identified data")?;

    debug!(obs = %conn.key(), "Connected to OBS WebSocket");
    Ok(socket)
}

/// Build an op 6 request frame
fn build_request(request_type: &str, request_data: Option<&Value>) -> String {
    let mut payload = json!({
        "requestType": request_type,
        "requestId": next_request_id()
    });
    if let Some(data) = request_data {
        payload["requestData"] = data.clone();
    }
    json!({ "op": op::REQUEST, "d": payload }).to_string()
}

fn write_request(socket: &mut OBSWebSocket, request: &str) -> Result<()> {
    socket
        .send(Message::Text(request.to_string()))
        .context("Failed to send request")
}

fn read_response(socket: &mut OBSWebSocket) -> Result<Value> {
    let response = read_message(socket, "response")?;
    if response.op != op::REQUEST_RESPONSE {
        anyhow::bail!("Expected RequestResponse, got op {}", response.op);
    }
    Ok(response.d)
}

/// Response status from OBS
#[derive(Debug, Deserialize)]
struct RequestStatus {
    result: bool,
    code: u32,
    #[serde(default)]
    comment: Option<String>,
}

/// Parse response and check for success
fn check_response(response: &Value) -> Result<()> {
    if let Some(status) = response.get("requestStatus") {
        let status: RequestStatus = serde_json::from_value(status.clone())
            .context("Failed to parse request status")?;

        if !status.result {
            let msg = status.comment.unwrap_or_else(|| format!("Error code {}", status.code));
            anyhow::bail!("OBS request failed: {}", msg);
        }
    }
    Ok(())
}

/// Version information returned by `GetVersion`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub obs_version: String,
    pub obs_web_socket_version: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub available_requests: Vec<String>,
}

/// Client holding one authenticated obs-websocket connection
pub struct OBSClient {
    conn: OBSConnection,
    socket: Option<OBSWebSocket>,
}

impl OBSClient {
    /// Create a client. No connection is made until the first request.
    pub fn new(conn: OBSConnection) -> Result<Self> {
        validate_ip(&conn.host)?;
        Ok(Self { conn, socket: None })
    }

    pub fn connection(&self) -> &OBSConnection {
        &self.conn
    }

    /// Execute a single request and return the raw response data.
    ///
    /// Only a failed send is retried on a fresh connection. Once a request
    /// went out it is never sent again, since `StartStream`/`StopStream`
    /// are not idempotent.
    pub fn send_request(
        &mut self,
        request_type: &str,
        request_data: Option<Value>,
    ) -> Result<Value> {
        let request = build_request(request_type, request_data.as_ref());

        // Try the open socket first
        let sent = match self.socket.take() {
            Some(mut socket) => match write_request(&mut socket, &request) {
                Ok(()) => Some(socket),
                Err(e) => {
                    warn!(
                        obs = %self.conn.key(),
                        error = %e,
                        "OBS connection went stale, reconnecting"
                    );
                    let _ = socket.close(None);
                    None
                }
            },
            None => None,
        };

        let mut socket = match sent {
            Some(socket) => socket,
            None => {
                let conn = &self.conn;
                with_retry(|| {
                    let mut socket = create_connection(conn)?;
                    write_request(&mut socket, &request)?;
                    Ok(socket)
                })?
            }
        };

        match read_response(&mut socket) {
            Ok(response) => {
                self.socket = Some(socket);
                Ok(response)
            }
            Err(e) => {
                let _ = socket.close(None);
                Err(e.context(format!("No response to {} from OBS", request_type)))
            }
        }
    }

    /// Close the connection if one is open
    pub fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None);
            let _ = socket.flush();
        }
    }

    // ─────────────────────────────────────────────────────────────────
    // General Operations
    // ─────────────────────────────────────────────────────────────────

    /// Get OBS and obs-websocket version information
    pub fn get_version(&mut self) -> Result<VersionInfo> {
        let response = self.send_request("GetVersion", None)?;
        check_response(&response)?;

        let data = response.get("responseData")
            .context("Missing responseData")?;
        serde_json::from_value(data.clone()).context("Failed to parse version info")
    }

    // ─────────────────────────────────────────────────────────────────
    // Stream Operations
    // ─────────────────────────────────────────────────────────────────

    /// Configure the stream service (RTMP server + key)
    pub fn set_stream_service_settings(
        &mut self,
        service: &str,
        server: &str,
        key: &str,
    ) -> Result<()> {
        let response = self.send_request("SetStreamServiceSettings", Some(json!({
            "streamServiceType": "rtmp_common",
            "streamServiceSettings": {
                "service": service,
                "server": server,
                "key": key
            }
        })))?;
        check_response(&response)
    }

    /// Get streaming status
    pub fn get_stream_status(&mut self) -> Result<bool> {
        let response = self.send_request("GetStreamStatus", None)?;
        check_response(&response)?;

        response
            .get("responseData")
            .and_then(|d| d.get("outputActive"))
            .and_then(|v| v.as_bool())
            .context("Failed to get stream status")
    }

    /// Start streaming
    pub fn start_stream(&mut self) -> Result<()> {
        let response = self.send_request("StartStream", None)?;
        check_response(&response)
    }

    /// Stop streaming
    pub fn stop_stream(&mut self) -> Result<()> {
        let response = self.send_request("StopStream", None)?;
        check_response(&response)
    }
}

impl Drop for OBSClient {
    fn drop(&mut self) {
        self.close();
    }
}

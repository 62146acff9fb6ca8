//! In-process obs-websocket server for tests.
//!
//! Speaks just enough of the 5.x protocol (Hello/Identify/Identified and
//! request/response) to drive the client and backend end to end.

use super::client::{generate_auth_string, op, OBSConnection};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use tungstenite::{accept, Message};

const CHALLENGE: &str = "ztTBnnuqrqaKDzRM3xcVdbYm";
const SALT: &str = "PZVbYpvAnZut2SS6JNJytDm9";

const STREAM_REQUESTS: &[&str] = &[
    "GetVersion",
    "SetStreamServiceSettings",
    "GetStreamStatus",
    "StartStream",
    "StopStream",
];

#[derive(Default)]
struct FakeState {
    connections: usize,
    requests: Vec<(String, Value)>,
    streaming: bool,
    failing: HashSet<String>,
    hidden: HashSet<String>,
    /// Requests handled without sending a response, dropping the connection instead
    dropped: HashSet<String>,
    /// Status queries answered with `outputActive: false` after a start
    activation_delay: u32,
    pending_activation: u32,
}

impl FakeState {
    fn handle(
        &mut self,
        request_type: &str,
        data: &Value,
    ) -> (bool, u32, Option<&'static str>, Value) {
        self.requests.push((request_type.to_string(), data.clone()));

        if self.failing.contains(request_type) {
            return (false, 500, Some("Forced failure"), Value::Null);
        }

        match request_type {
            "GetVersion" => {
                let available: Vec<&str> = STREAM_REQUESTS
                    .iter()
                    .copied()
                    .filter(|r| !self.hidden.contains(*r))
                    .collect();
                (true, 100, None, json!({
                    "obsVersion": "30.1.2",
                    "obsWebSocketVersion": "5.4.2",
                    "rpcVersion": 1,
                    "availableRequests": available,
                    "platform": "linux"
                }))
            }
            "SetStreamServiceSettings" => (true, 100, None, Value::Null),
            "GetStreamStatus" => {
                let active = self.streaming && self.pending_activation == 0;
                self.pending_activation = self.pending_activation.saturating_sub(1);
                (true, 100, None, json!({ "outputActive": active }))
            }
            "StartStream" if self.streaming => {
                (false, 500, Some("Output already active"), Value::Null)
            }
            "StartStream" => {
                self.streaming = true;
                self.pending_activation = self.activation_delay;
                (true, 100, None, Value::Null)
            }
            "StopStream" if !self.streaming => {
                (false, 501, Some("Output not active"), Value::Null)
            }
            "StopStream" => {
                self.streaming = false;
                (true, 100, None, Value::Null)
            }
            _ => (false, 204, Some("Unknown request type"), Value::Null),
        }
    }
}

/// Handle to a running fake OBS
pub struct FakeObs {
    addr: SocketAddr,
    state: Arc<Mutex<FakeState>>,
}

impl FakeObs {
    /// Start listening on a free loopback port
    pub fn start(password: Option<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake OBS");
        let addr = listener.local_addr().expect("fake OBS address");
        let state = Arc::new(Mutex::new(FakeState::default()));

        let password = password.map(str::to_string);
        let accept_state = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let state = Arc::clone(&accept_state);
                let password = password.clone();
                thread::spawn(move || {
                    serve(stream, password.as_deref(), &state);
                });
            }
        });

        Self { addr, state }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn connection(&self) -> OBSConnection {
        self.connection_with_password(None)
    }

    pub fn connection_with_password(&self, password: Option<&str>) -> OBSConnection {
        let host = self.addr.ip().to_string();
        OBSConnection::new(&host, self.addr.port(), password.map(str::to_string))
    }

    /// Make every request of this type fail
    pub fn fail(&self, request_type: &str) {
        self.state.lock().unwrap().failing.insert(request_type.to_string());
    }

    /// Leave this request type out of `availableRequests`
    pub fn hide(&self, request_type: &str) {
        self.state.lock().unwrap().hidden.insert(request_type.to_string());
    }

    /// Handle the next request of this type but close the connection
    /// instead of answering it
    pub fn drop_response(&self, request_type: &str) {
        self.state.lock().unwrap().dropped.insert(request_type.to_string());
    }

    /// Keep a started output inactive for this many status queries
    pub fn delay_activation(&self, queries: u32) {
        self.state.lock().unwrap().activation_delay = queries;
    }

    pub fn set_streaming(&self, streaming: bool) {
        self.state.lock().unwrap().streaming = streaming;
    }

    pub fn is_streaming(&self) -> bool {
        self.state.lock().unwrap().streaming
    }

    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn request_types(&self) -> Vec<String> {
        self.requests().into_iter().map(|(t, _)| t).collect()
    }
}

fn serve(stream: TcpStream, password: Option<&str>, state: &Mutex<FakeState>) {
    let Ok(mut ws) = accept(stream) else { return };
    state.lock().unwrap().connections += 1;

    let mut hello = json!({ "obsWebSocketVersion": "5.4.2", "rpcVersion": 1 });
    if password.is_some() {
        hello["authentication"] = json!({ "challenge": CHALLENGE, "salt": SALT });
    }
    if ws.send(Message::Text(json!({ "op": op::HELLO, "d": hello }).to_string())).is_err() {
        return;
    }

    let Some(identify) = read_json(&mut ws) else { return };
    if let Some(password) = password {
        let expected = generate_auth_string(password, CHALLENGE, SALT);
        if identify["d"]["authentication"].as_str() != Some(expected.as_str()) {
            let _ = ws.close(None);
            let _ = ws.flush();
            return;
        }
    }

    let identified = json!({ "op": op::IDENTIFIED, "d": { "negotiatedRpcVersion": 1 } });
    if ws.send(Message::Text(identified.to_string())).is_err() {
        return;
    }

    while let Some(request) = read_json(&mut ws) {
        let d = &request["d"];
        let request_type = d["requestType"].as_str().unwrap_or_default().to_string();
        let data = d.get("requestData").cloned().unwrap_or(Value::Null);

        let (result, code, comment, response_data, dropped) = {
            let mut state = state.lock().unwrap();
            let (result, code, comment, data) = state.handle(&request_type, &data);
            (result, code, comment, data, state.dropped.remove(&request_type))
        };
        if dropped {
            return;
        }
        let response = json!({
            "op": op::REQUEST_RESPONSE,
            "d": {
                "requestType": request_type,
                "requestId": d["requestId"],
                "requestStatus": { "result": result, "code": code, "comment": comment },
                "responseData": response_data
            }
        });
        if ws.send(Message::Text(response.to_string())).is_err() {
            return;
        }
    }
}

fn read_json(ws: &mut tungstenite::WebSocket<TcpStream>) -> Option<Value> {
    loop {
        match ws.read().ok()? {
            Message::Text(text) => return serde_json::from_str(&text).ok(),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

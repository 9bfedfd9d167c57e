#![allow(dead_code)]

use std::{
    collections::{BTreeSet, HashSet},
    net::SocketAddr,
    sync::{mpsc, Arc, Mutex},
    thread,
    time::Duration,
};

use anyhow::{Context as _, Result};
use warp::{
    http::{HeaderMap, Method, StatusCode},
    hyper::body::Bytes,
    path::FullPath,
    Filter, Reply,
};

use iothub_data_formats::{Credentials, SasToken};
use iothub_http_wrapper::{ClientConfig, Scheme, ServiceClient};

pub const SHARED_ACCESS_KEY: &str = "y2R1N8XvMBRjN9yl+r3Z4vuYhpHMuWc8zvUpF/1e2IM=";
pub const SHARED_ACCESS_KEY_NAME: &str = "iothubowner";

/// Requests for this device id are answered only after [`SLOW_RESPONSE_DELAY`].
pub const SLOW_DEVICE: &str = "slow-device";
pub const SLOW_RESPONSE_DELAY: Duration = Duration::from_secs(3);

const MAX_WAIT_FOR_START: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub enum LogSide {
    Hub,
    Test,
}

impl LogSide {
    pub fn l<M>(&self, msg: M)
    where
        M: std::fmt::Display,
    {
        println!("{:?}: {}", self, msg);
    }
}

const L: LogSide = LogSide::Hub;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub headers: HeaderMap,
    pub body: String,
    pub peer: Option<SocketAddr>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn token(&self) -> Result<SasToken> {
        self.header("authorization")
            .context("Request carried no authorization header")?
            .parse()
            .context("Error parsing authorization header")
    }
}

#[derive(Debug, Default)]
struct HubState {
    devices: BTreeSet<String>,
    requests: Vec<RecordedRequest>,
    peers: HashSet<SocketAddr>,
}

/// A plain-HTTP stand-in for the hub's device endpoints.
///
/// Every request is recorded together with its remote address, so the number
/// of distinct addresses is the number of TCP connections the client opened.
pub struct MockHub {
    addr: SocketAddr,
    state: Arc<Mutex<HubState>>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockHub {
    pub fn start() -> Result<Self> {
        let state = Arc::new(Mutex::new(HubState::default()));
        let server_state = state.clone();
        let (addr_tx, addr_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("Error building mock hub runtime");
            runtime.block_on(async move {
                let (addr, server) = warp::serve(routes(server_state))
                    .bind_with_graceful_shutdown(([127, 0, 0, 1], 0), async {
                        shutdown_rx.await.ok();
                    });
                addr_tx.send(addr).expect("Error reporting mock hub address");
                server.await;
            });
        });

        let addr = addr_rx
            .recv_timeout(MAX_WAIT_FOR_START)
            .context("Mock hub did not start")?;
        L.l(format!("Listening on {}", addr));

        Ok(MockHub {
            addr,
            state,
            shutdown: Some(shutdown_tx),
        })
    }

    /// `127.0.0.1:<port>`, used as the hub host name.
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn credentials(&self, device_id: Option<&str>) -> Credentials {
        Credentials::new(
            &self.host(),
            Some(SHARED_ACCESS_KEY_NAME),
            SHARED_ACCESS_KEY,
            device_id,
        )
    }

    pub fn client(&self, device_id: Option<&str>, config: ClientConfig) -> Result<ServiceClient> {
        let config = ClientConfig {
            scheme: Scheme::Http,
            ..config
        };
        ServiceClient::new(self.credentials(device_id), config)
            .context("Error creating client for mock hub")
    }

    pub fn add_device(&self, device_id: &str) {
        self.state
            .lock()
            .unwrap()
            .devices
            .insert(device_id.to_string());
    }

    pub fn has_device(&self, device_id: &str) -> bool {
        self.state.lock().unwrap().devices.contains(device_id)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.state.lock().unwrap().requests.last().cloned()
    }

    /// Number of distinct TCP connections seen so far.
    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().peers.len()
    }
}

impl Drop for MockHub {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn routes(
    state: Arc<Mutex<HubState>>,
) -> impl Filter<Extract = (warp::reply::Response,), Error = warp::Rejection> + Clone {
    let query = warp::query::raw()
        .or(warp::any().map(String::new))
        .unify();

    warp::method()
        .and(warp::path::full())
        .and(query)
        .and(warp::header::headers_cloned())
        .and(warp::addr::remote())
        .and(warp::body::bytes())
        .and_then(
            move |method: Method,
                  path: FullPath,
                  query: String,
                  headers: HeaderMap,
                  peer: Option<SocketAddr>,
                  body: Bytes| {
                let state = state.clone();
                async move {
                    let request = RecordedRequest {
                        method,
                        path: path.as_str().to_string(),
                        query,
                        headers,
                        body: String::from_utf8_lossy(&body).into_owned(),
                        peer,
                    };

                    if request.path.contains(SLOW_DEVICE) {
                        tokio::time::sleep(SLOW_RESPONSE_DELAY).await;
                    }

                    let (status, body) = {
                        let mut state = state.lock().unwrap();
                        let reply = respond(&mut state, &request);
                        if let Some(peer) = request.peer {
                            state.peers.insert(peer);
                        }
                        state.requests.push(request);
                        reply
                    };

                    Ok::<_, warp::Rejection>(warp::reply::with_status(body, status).into_response())
                }
            },
        )
}

fn device_json(device_id: &str) -> serde_json::Value {
    serde_json::json!({
        "deviceId": device_id,
        "generationId": "636234558563281047",
        "etag": "MA==",
        "connectionState": "Disconnected",
        "status": "enabled",
        "statusReason": null,
        "connectionStateUpdatedTime": "0001-01-01T00:00:00",
        "statusUpdatedTime": "0001-01-01T00:00:00",
        "lastActivityTime": "0001-01-01T00:00:00",
        "cloudToDeviceMessageCount": 0,
        "authentication": {
            "symmetricKey": {
                "primaryKey": "cHJpbWFyeQ==",
                "secondaryKey": "c2Vjb25kYXJ5"
            },
            "x509Thumbprint": {
                "primaryThumbprint": null,
                "secondaryThumbprint": null
            }
        }
    })
}

fn not_found(device_id: &str) -> (StatusCode, String) {
    (
        StatusCode::NOT_FOUND,
        serde_json::json!({
            "Message": format!("ErrorCode:DeviceNotFound;{}", device_id)
        })
        .to_string(),
    )
}

fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn respond(state: &mut HubState, request: &RecordedRequest) -> (StatusCode, String) {
    let segments: Vec<&str> = request.path.trim_start_matches('/').split('/').collect();

    match (request.method.as_str(), segments.as_slice()) {
        ("GET", ["devices"]) => {
            let top = query_param(&request.query, "top")
                .and_then(|top| top.parse::<usize>().ok())
                .unwrap_or(1000);
            let devices: Vec<serde_json::Value> = state
                .devices
                .iter()
                .take(top)
                .map(|id| device_json(id))
                .collect();
            (StatusCode::OK, serde_json::Value::from(devices).to_string())
        }
        ("PUT", ["devices", device_id]) => {
            state.devices.insert(device_id.to_string());
            (StatusCode::OK, device_json(device_id).to_string())
        }
        ("GET", ["devices", device_id]) => {
            if state.devices.contains(*device_id) {
                (StatusCode::OK, device_json(device_id).to_string())
            } else {
                not_found(device_id)
            }
        }
        ("DELETE", ["devices", device_id]) => {
            if state.devices.remove(*device_id) {
                (StatusCode::NO_CONTENT, String::new())
            } else {
                not_found(device_id)
            }
        }
        ("DELETE", ["devices", device_id, "commands"]) => {
            if state.devices.contains(*device_id) {
                (StatusCode::NO_CONTENT, String::new())
            } else {
                not_found(device_id)
            }
        }
        ("POST", ["devices", _, "messages", "events"]) => (StatusCode::NO_CONTENT, String::new()),
        ("GET", ["devices", _, "messages", "deviceBound"]) => {
            (StatusCode::NO_CONTENT, String::new())
        }
        _ => (StatusCode::NOT_FOUND, String::new()),
    }
}

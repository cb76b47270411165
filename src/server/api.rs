//! REST API implementation using rouille.
//!
//! # Purpose
//!
//! Translates HTTP requests into calls on the feature services held by
//! [`AppState`] and their results into JSON responses. Handlers are plain
//! functions of `(&Request, &AppState)`, so tests drive them with
//! `Request::fake_http` without binding a socket.
//!
//! # Key types
//!
//! - [`ApiServer`] - binds the listener, serves on a background thread
//! - [`AppState`] - services shared by every request
//!
//! # Errors
//!
//! | Failure                     | Status |
//! |-----------------------------|--------|
//! | unknown route / id / device | 404    |
//! | malformed JSON body         | 400    |
//! | schema or value rejected    | 422    |
//! | live-apply command failed   | 502    |
//! | no free control port        | 503    |
//! | corrupt file / I/O error    | 500    |

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use anyhow::anyhow;
use log::{debug, info, warn};
use rouille::{Request, Response};
use serde::Serialize;
use serde_json::{Value, json};

use crate::core::StoreError;
use crate::node::settings::{HOSTNAME, NODE_NAME, VOLUME};
use crate::node::{DisplayConfig, Displays, Instances, NodeError, NodeSettings};

/// Services shared by all request handlers (lifetime = process)
pub struct AppState {
    pub settings: NodeSettings,
    pub displays: Displays,
    pub players: Instances,
    pub browsers: Instances,
    /// Add permissive CORS headers to every response
    pub cors: bool,
}

/// Generic API response
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn ok_msg(msg: &str) -> Self {
        Self { success: true, message: Some(msg.to_string()), error: None }
    }

    fn err(msg: &str) -> Self {
        Self { success: false, message: None, error: Some(msg.to_string()) }
    }
}

fn with_cors(response: Response) -> Response {
    response
        .with_additional_header("Access-Control-Allow-Origin", "*")
        .with_additional_header("Access-Control-Allow-Methods", "GET, POST, PUT, PATCH, DELETE, OPTIONS")
        .with_additional_header("Access-Control-Allow-Headers", "Content-Type")
}

fn not_found() -> Response {
    Response::json(&ApiResponse::err("Not found")).with_status_code(404)
}

fn status_of(err: &NodeError) -> u16 {
    match err {
        NodeError::Store(StoreError::NotFound(_)) => 404,
        NodeError::Store(StoreError::InvalidValue { .. }) => 422,
        NodeError::Store(StoreError::PortsExhausted) => 503,
        NodeError::Store(StoreError::ConfigCorrupt { .. } | StoreError::Io { .. }) => 500,
        NodeError::Schema(_) => 422,
        NodeError::Command { .. } => 502,
    }
}

fn error_response(err: &NodeError) -> Response {
    let status = status_of(err);
    if status >= 500 {
        warn!("Request failed ({}): {}", status, err);
    } else {
        debug!("Request rejected ({}): {}", status, err);
    }
    Response::json(&ApiResponse::err(&err.to_string())).with_status_code(status)
}

fn json_result<T, E>(result: Result<T, E>) -> Response
where
    T: Serialize,
    E: Into<NodeError>,
{
    match result {
        Ok(value) => Response::json(&value),
        Err(e) => error_response(&e.into()),
    }
}

fn ok_result<E: Into<NodeError>>(result: Result<(), E>, msg: &str) -> Response {
    match result {
        Ok(()) => Response::json(&ApiResponse::ok_msg(msg)),
        Err(e) => error_response(&e.into()),
    }
}

fn json_body(request: &Request) -> Result<Value, Response> {
    rouille::input::json_input::<Value>(request).map_err(|e| {
        Response::json(&ApiResponse::err(&format!("Invalid JSON: {}", e))).with_status_code(400)
    })
}

/// Single path segment (no nested `/`), not empty
fn segment(rest: &str) -> Option<&str> {
    (!rest.is_empty() && !rest.contains('/')).then_some(rest)
}

/// REST API server
pub struct ApiServer;

impl ApiServer {
    /// Bind `addr` and serve in a background thread.
    /// Bind errors are reported here, not in the thread.
    pub fn start(
        addr: &str,
        state: Arc<AppState>,
    ) -> anyhow::Result<(SocketAddr, thread::JoinHandle<()>)> {
        let server = rouille::Server::new(addr, move |request| Self::handle_request(request, &state))
            .map_err(|e| anyhow!("failed to bind {}: {}", addr, e))?;
        let local = server.server_addr();
        info!("API server listening on http://{}", local);

        let handle = thread::Builder::new()
            .name("api-server".into())
            .spawn(move || {
                server.run();
            })
            .map_err(|e: io::Error| anyhow!("failed to spawn API thread: {}", e))?;
        Ok((local, handle))
    }

    pub fn handle_request(request: &Request, state: &AppState) -> Response {
        debug!("{} {}", request.method(), request.raw_url());
        let response = if request.method() == "OPTIONS" {
            Response::empty_204()
        } else {
            Self::route(request, state)
        };
        if state.cors { with_cors(response) } else { response }
    }

    fn route(request: &Request, state: &AppState) -> Response {
        // Paths with parameters are matched by prefix before the fixed routes
        let path = request.url();
        let method = request.method();

        if let Some(name) = path.strip_prefix("/api/node/name/") {
            if method == "PUT" {
                return Self::set_node_name(state, name);
            }
        }
        if let Some(rest) = path.strip_prefix("/api/audio/devices/") {
            if method == "POST" {
                if let Some(device) = rest.strip_suffix("/default").and_then(segment) {
                    return ok_result(state.settings.set_audio_device(device), "Default sink set");
                }
                if let Some((device, level)) = rest.rsplit_once("/volume/") {
                    if let (Some(device), Some(level)) = (segment(device), segment(level)) {
                        return json_result(
                            state.settings.set_volume(device, level).map(|v| json!({ VOLUME: v })),
                        );
                    }
                }
            }
            return not_found();
        }
        if let Some(name) = path.strip_prefix("/api/displays/config/") {
            return match (method, segment(name)) {
                ("DELETE", Some(name)) => {
                    ok_result(state.displays.remove(name), "Display configuration removed")
                }
                _ => not_found(),
            };
        }
        if let Some(id) = path.strip_prefix("/api/players/") {
            return Self::instance(request, &state.players, id);
        }
        if let Some(id) = path.strip_prefix("/api/browsers/") {
            return Self::instance(request, &state.browsers, id);
        }

        rouille::router!(request,
            (GET) ["/api/health"] => {
                Response::json(&ApiResponse::ok_msg("media-node API server"))
            },

            // Node
            (GET) ["/api/node"] => {
                json_result(state.settings.settings())
            },
            (GET) ["/api/node/name"] => {
                json_result(state.settings.node_name().map(|n| json!({ NODE_NAME: n })))
            },
            (POST) ["/api/node/hostname"] => {
                json_result(state.settings.regenerate_hostname().map(|h| json!({ HOSTNAME: h })))
            },

            // Displays
            (GET) ["/api/displays/config"] => {
                Self::list_displays(&state.displays)
            },
            (POST) ["/api/displays/config"] => {
                Self::apply_display(request, &state.displays)
            },

            // Instances
            (GET) ["/api/players"] => {
                json_result(state.players.list())
            },
            (POST) ["/api/players"] => {
                Self::create_instance(request, &state.players)
            },
            (GET) ["/api/browsers"] => {
                json_result(state.browsers.list())
            },
            (POST) ["/api/browsers"] => {
                Self::create_instance(request, &state.browsers)
            },

            _ => {
                not_found()
            }
        )
    }

    fn set_node_name(state: &AppState, name: &str) -> Response {
        json_result(state.settings.set_node_name(name).map(|n| json!({ NODE_NAME: n })))
    }

    fn list_displays(displays: &Displays) -> Response {
        match displays.list() {
            Ok(list) if list.is_empty() => {
                Response::json(&ApiResponse::err("No display configuration stored"))
                    .with_status_code(404)
            }
            result => json_result(result),
        }
    }

    fn apply_display(request: &Request, displays: &Displays) -> Response {
        let body = match json_body(request) {
            Ok(body) => body,
            Err(response) => return response,
        };
        let config: DisplayConfig = match serde_json::from_value(body) {
            Ok(config) => config,
            Err(e) => {
                return Response::json(&ApiResponse::err(&e.to_string())).with_status_code(422);
            }
        };
        json_result(displays.apply(&config))
    }

    fn create_instance(request: &Request, instances: &Instances) -> Response {
        match json_body(request) {
            Ok(body) => match instances.create(&body) {
                Ok(created) => Response::json(&created).with_status_code(201),
                Err(e) => error_response(&e),
            },
            Err(response) => response,
        }
    }

    fn instance(request: &Request, instances: &Instances, id: &str) -> Response {
        let Some(id) = segment(id) else {
            return not_found();
        };
        match request.method() {
            "GET" => json_result(instances.get(id)),
            "PATCH" => match json_body(request) {
                Ok(body) => json_result(instances.update(id, &body)),
                Err(response) => response,
            },
            "DELETE" => {
                let msg = format!("{} instance deleted", instances.label());
                ok_result(instances.delete(id), &msg)
            }
            _ => not_found(),
        }
    }
}

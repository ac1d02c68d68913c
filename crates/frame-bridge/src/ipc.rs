//! Answers registry requests that a page-hosted frame sends over postMessage
//! or the `ipc://` custom protocol. Every command is forwarded to a
//! [`HostPort`], so the page sees exactly what the in-process frame realm sees.

use http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};
use log::{debug, warn};
use serde::Deserialize;
use template_sync_core::{HostPort, PortRequest, PortResponse, TemplateId};

use crate::BridgeError;

/// Page global the IPC runtime installs; callback scripts resolve through it.
pub const CALLBACK_GLOBAL: &str = "__TEMPLATE_SYNC__";
pub const INVOKE_KEY: &str = "template-sync";
/// postMessage field carrying [`INVOKE_KEY`]. Must match the serde rename on
/// [`PostMessageRequest::invoke_key`].
pub const INVOKE_KEY_FIELD: &str = "__TEMPLATE_SYNC_INVOKE_KEY__";
pub const INVOKE_KEY_HEADER: &str = "Template-Sync-Invoke-Key";
pub const RESPONSE_HEADER: &str = "Template-Sync-Response";
pub const PROTOCOL_URL: &str = "ipc://localhost/";

pub const CMD_TEMPLATES_LIST: &str = "templates_list";
pub const CMD_TEMPLATES_GET: &str = "templates_get";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    pub cmd: String,
    pub callback: u32,
    pub error: u32,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(rename = "__TEMPLATE_SYNC_INVOKE_KEY__")]
    pub invoke_key: String,
}

#[derive(Debug, Deserialize)]
struct GetTemplateArgs {
    id: TemplateId,
}

#[derive(Debug, Clone)]
pub struct IpcRouter {
    host: HostPort,
}

impl IpcRouter {
    pub fn new(host: HostPort) -> Self {
        Self { host }
    }

    pub fn dispatch(&self, command: &str, payload: &serde_json::Value) -> http::Response<Vec<u8>> {
        debug!("event=ipc_dispatch module=ipc cmd={command}");
        match command {
            CMD_TEMPLATES_LIST => self.forward(&PortRequest::ListTemplates),
            CMD_TEMPLATES_GET => match GetTemplateArgs::deserialize(payload) {
                Ok(args) => self.forward(&PortRequest::GetTemplate { id: args.id }),
                Err(err) => bad_request(format!("invalid arguments for {command}: {err}")),
            },
            other => not_found(other),
        }
    }

    fn forward(&self, request: &PortRequest) -> http::Response<Vec<u8>> {
        match self.host.handle(request) {
            PortResponse::Templates { templates } => ok_json(&templates),
            PortResponse::Template {
                template: Some(template),
            } => ok_json(&template),
            PortResponse::Template { template: None } => not_found("template"),
            PortResponse::Error { message } => bad_request(message),
        }
    }

    /// Handles one postMessage body and returns the callback script to
    /// evaluate in the sending page.
    pub fn handle_post_message(&self, body: &str) -> Result<String, BridgeError> {
        let message: PostMessageRequest =
            serde_json::from_str(body).map_err(BridgeError::Message)?;
        if message.invoke_key != INVOKE_KEY {
            warn!("event=ipc_post_message module=ipc status=rejected reason=invoke_key");
            return Err(BridgeError::InvalidInvokeKey);
        }

        let response = self.dispatch(&message.cmd, &message.payload);
        let succeeded = response
            .headers()
            .get(RESPONSE_HEADER)
            .and_then(|value| value.to_str().ok())
            == Some("ok");
        let callback_id = if succeeded {
            message.callback
        } else {
            message.error
        };
        Ok(callback_script(callback_id, &response))
    }

    /// Handles an `ipc://localhost/<command>` request whose body is the JSON
    /// payload.
    pub fn handle_protocol_request(
        &self,
        request: &http::Request<Vec<u8>>,
    ) -> http::Response<Vec<u8>> {
        let mut response = match *request.method() {
            http::Method::POST => self.protocol_post(request),
            http::Method::OPTIONS => {
                let mut response = http::Response::new(Vec::new());
                response.headers_mut().insert(
                    http::header::ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static("*"),
                );
                response
            }
            _ => finish(
                http::Response::builder()
                    .status(StatusCode::METHOD_NOT_ALLOWED)
                    .header(CONTENT_TYPE, HeaderValue::from_static("text/plain")),
                b"only POST and OPTIONS are allowed".to_vec(),
                StatusCode::METHOD_NOT_ALLOWED,
            ),
        };
        response
            .headers_mut()
            .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        response.headers_mut().insert(
            ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(RESPONSE_HEADER),
        );
        response
    }

    fn protocol_post(&self, request: &http::Request<Vec<u8>>) -> http::Response<Vec<u8>> {
        let invoke_key = request
            .headers()
            .get(INVOKE_KEY_HEADER)
            .and_then(|value| value.to_str().ok());
        if invoke_key != Some(INVOKE_KEY) {
            return bad_request("invalid invoke key");
        }

        let raw_path = request.uri().path();
        let command = decode_uri_component(raw_path.strip_prefix('/').unwrap_or(raw_path));
        let payload = if request.body().is_empty() {
            serde_json::Value::Null
        } else {
            match serde_json::from_slice(request.body()) {
                Ok(payload) => payload,
                Err(err) => return bad_request(format!("invalid payload: {err}")),
            }
        };
        self.dispatch(&command, &payload)
    }
}

/// JS that hands a response body to the page's pending callback.
pub fn callback_script(callback_id: u32, response: &http::Response<Vec<u8>>) -> String {
    let body = response.body();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let data = match content_type.split(',').next().unwrap_or_default() {
        "application/json" => serde_json::from_slice::<serde_json::Value>(body).unwrap_or_else(
            |_| serde_json::Value::String(String::from_utf8_lossy(body).into_owned()),
        ),
        _ => serde_json::Value::String(String::from_utf8_lossy(body).into_owned()),
    };
    let data = serde_json::to_string(&data).unwrap_or_else(|_| "null".to_string());
    format!("window.{CALLBACK_GLOBAL}.runCallback({callback_id}, {data});")
}

/// Percent-decodes a protocol path segment. Malformed escapes pass through
/// untouched, and so does the whole input if the result is not UTF-8.
pub fn decode_uri_component(input: &str) -> String {
    let mut out = Vec::with_capacity(input.len());
    let mut rest = input.as_bytes();
    while let Some((&first, tail)) = rest.split_first() {
        let escaped = match (first, tail.get(..2)) {
            (b'%', Some(pair)) if pair.iter().all(u8::is_ascii_hexdigit) => std::str::from_utf8(pair)
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok()),
            _ => None,
        };
        match escaped {
            Some(byte) => {
                out.push(byte);
                rest = &tail[2..];
            }
            None => {
                out.push(first);
                rest = tail;
            }
        }
    }
    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

fn response_builder(status: StatusCode, outcome: &'static str) -> http::response::Builder {
    http::Response::builder()
        .status(status)
        .header(RESPONSE_HEADER, HeaderValue::from_static(outcome))
}

/// Builds the response, falling back to a bare one with the same status if
/// a header was rejected.
fn finish(
    builder: http::response::Builder,
    body: Vec<u8>,
    status: StatusCode,
) -> http::Response<Vec<u8>> {
    builder.body(body).unwrap_or_else(|err| {
        warn!("event=ipc_response module=ipc status=builder_failed reason={err}");
        let mut response = http::Response::new(Vec::new());
        *response.status_mut() = status;
        response
    })
}

pub fn ok_json<T: serde::Serialize>(value: &T) -> http::Response<Vec<u8>> {
    match serde_json::to_vec(value) {
        Ok(body) => finish(
            response_builder(StatusCode::OK, "ok")
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json")),
            body,
            StatusCode::OK,
        ),
        Err(err) => internal_error(err),
    }
}

pub fn bad_request<S: ToString>(message: S) -> http::Response<Vec<u8>> {
    finish(
        response_builder(StatusCode::BAD_REQUEST, "error")
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain")),
        message.to_string().into_bytes(),
        StatusCode::BAD_REQUEST,
    )
}

pub fn internal_error<S: ToString>(message: S) -> http::Response<Vec<u8>> {
    finish(
        response_builder(StatusCode::INTERNAL_SERVER_ERROR, "error")
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain")),
        message.to_string().into_bytes(),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}

pub fn not_found<S: ToString>(message: S) -> http::Response<Vec<u8>> {
    finish(
        response_builder(StatusCode::NOT_FOUND, "error")
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain")),
        format!("{} not found", message.to_string()).into_bytes(),
        StatusCode::NOT_FOUND,
    )
}

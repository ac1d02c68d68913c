use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::registry::{Template, TemplateId, TemplateRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum PortRequest {
    ListTemplates,
    GetTemplate { id: TemplateId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum PortResponse {
    Templates { templates: Vec<Template> },
    Template { template: Option<Template> },
    Error { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("cross-realm port is not connected")]
    Disconnected,
    #[error("cross-realm message codec failed: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("host rejected request: {message}")]
    Rejected { message: String },
    #[error("unexpected response to {request}")]
    UnexpectedResponse { request: &'static str },
}

/// Host side of the cross-realm contract. Only strings cross the boundary.
#[derive(Debug, Clone)]
pub struct HostPort {
    registry: TemplateRegistry,
}

impl HostPort {
    pub fn new(registry: TemplateRegistry) -> Self {
        Self { registry }
    }

    pub fn handle(&self, request: &PortRequest) -> PortResponse {
        match request {
            PortRequest::ListTemplates => PortResponse::Templates {
                templates: self.registry.list(),
            },
            PortRequest::GetTemplate { id } => PortResponse::Template {
                template: self.registry.get_by_id(id),
            },
        }
    }

    pub fn handle_json(&self, request: &str) -> String {
        let response = match serde_json::from_str::<PortRequest>(request) {
            Ok(request) => self.handle(&request),
            Err(err) => {
                warn!("event=port_request module=port status=rejected reason={err}");
                PortResponse::Error {
                    message: format!("invalid port request: {err}"),
                }
            }
        };
        serde_json::to_string(&response).unwrap_or_else(|err| {
            format!(
                r#"{{"response":"error","message":"failed to encode response: {}"}}"#,
                err.to_string().replace('"', "'")
            )
        })
    }

    /// Wires `port` so that its requests are answered by this host.
    pub fn connect(&self, port: &FramePort) {
        let host = self.clone();
        port.connect(Rc::new(move |request: &str| {
            Ok::<_, PortError>(host.handle_json(request))
        }));
    }
}

pub type PortTransport = Rc<dyn Fn(&str) -> Result<String, PortError>>;

/// Frame-side proxy for the host registry: the embedded realm's only route to
/// it. Until connected every request fails with [`PortError::Disconnected`].
#[derive(Clone, Default)]
pub struct FramePort {
    link: Rc<RefCell<Option<PortTransport>>>,
}

impl fmt::Debug for FramePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePort")
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl FramePort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, transport: PortTransport) {
        *self.link.borrow_mut() = Some(transport);
    }

    pub fn disconnect(&self) {
        *self.link.borrow_mut() = None;
    }

    pub fn is_connected(&self) -> bool {
        self.link.borrow().is_some()
    }

    pub fn request(&self, request: &PortRequest) -> Result<PortResponse, PortError> {
        let transport = self.link.borrow().clone().ok_or(PortError::Disconnected)?;
        let encoded = serde_json::to_string(request)?;
        let reply = transport(&encoded)?;
        let response: PortResponse = serde_json::from_str(&reply)?;
        match response {
            PortResponse::Error { message } => Err(PortError::Rejected { message }),
            response => Ok(response),
        }
    }

    pub fn templates(&self) -> Result<Vec<Template>, PortError> {
        match self.request(&PortRequest::ListTemplates)? {
            PortResponse::Templates { templates } => Ok(templates),
            _ => Err(PortError::UnexpectedResponse {
                request: "list_templates",
            }),
        }
    }

    pub fn template(&self, id: &TemplateId) -> Result<Option<Template>, PortError> {
        match self.request(&PortRequest::GetTemplate { id: id.clone() })? {
            PortResponse::Template { template } => Ok(template),
            _ => Err(PortError::UnexpectedResponse {
                request: "get_template",
            }),
        }
    }
}

pub mod ipc;

pub use http;
pub use serde_json;

use serde::{Deserialize, Serialize};
use serialize_to_javascript::{DefaultTemplate, Template, default_template};
use template_sync_core::{
    RealmKind, Template as TemplateRecord, WidgetContract, is_custom_element_name,
};

use crate::ipc::{
    CALLBACK_GLOBAL, CMD_TEMPLATES_LIST, INVOKE_KEY, INVOKE_KEY_FIELD, INVOKE_KEY_HEADER,
    PROTOCOL_URL, RESPONSE_HEADER,
};

pub const DEFAULT_REGISTRY_GLOBAL: &str = "templateManager";
pub const DEFAULT_FRAME_SELECTOR: &str = "iframe";
pub const DEFAULT_SELF_REFRESH_DELAY_MS: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to render script: {0}")]
    Render(#[from] serde_json::Error),
    #[error("`{0}` is not a valid custom element name")]
    InvalidTag(String),
    #[error("invalid postMessage payload: {0}")]
    Message(#[source] serde_json::Error),
    #[error("postMessage carried an invalid invoke key")]
    InvalidInvokeKey,
}

/// Page-level names the generated scripts rely on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    pub registry_global: String,
    pub frame_selector: String,
    pub self_refresh_delay_ms: u32,
    /// Base URL of the custom protocol the frame falls back to when the page
    /// has no `window.ipc.postMessage`.
    pub protocol_url: String,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            registry_global: DEFAULT_REGISTRY_GLOBAL.to_string(),
            frame_selector: DEFAULT_FRAME_SELECTOR.to_string(),
            self_refresh_delay_ms: DEFAULT_SELF_REFRESH_DELAY_MS,
            protocol_url: PROTOCOL_URL.to_string(),
        }
    }
}

#[derive(Template)]
#[default_template("scripts/dropdown-element.js")]
struct DropdownElementScript<'a> {
    contract: &'a WidgetContract,
    realm: RealmKind,
    registry_global: &'a str,
    callback_global: &'a str,
    list_command: &'a str,
    self_refresh_delay_ms: u32,
}

#[derive(Template)]
#[default_template("scripts/ipc-runtime.js")]
struct IpcRuntimeScript<'a> {
    callback_global: &'a str,
    invoke_key: &'a str,
    invoke_key_field: &'a str,
    invoke_key_header: &'a str,
    response_header: &'a str,
    protocol_url: &'a str,
}

#[derive(Template)]
#[default_template("scripts/activate.js")]
struct ActivationScript<'a> {
    tag: &'a str,
    frame_selector: &'a str,
    callback_global: &'a str,
    runtime: &'a str,
    definition: &'a str,
}

#[derive(Template)]
#[default_template("scripts/snapshot.js")]
struct SnapshotScript<'a> {
    tag: &'a str,
    frame_selector: &'a str,
    templates: &'a [TemplateRecord],
}

#[derive(Template)]
#[default_template("scripts/highlight.js")]
struct HighlightScript<'a> {
    contract: &'a WidgetContract,
}

fn validate_tag(tag: &str) -> Result<(), BridgeError> {
    if is_custom_element_name(tag) {
        Ok(())
    } else {
        Err(BridgeError::InvalidTag(tag.to_string()))
    }
}

/// Renders the selector widget definition for one realm. Both copies come
/// from the same template; only the registry route and the frame's deferred
/// self-refresh differ. The frame copy lists templates through
/// [`ipc::CMD_TEMPLATES_LIST`], so it needs [`ipc_runtime_script`] in its page.
pub fn widget_definition_script(
    contract: &WidgetContract,
    realm: RealmKind,
    options: &BridgeOptions,
) -> Result<String, BridgeError> {
    validate_tag(&contract.tag)?;
    let script = DropdownElementScript {
        contract,
        realm,
        registry_global: &options.registry_global,
        callback_global: CALLBACK_GLOBAL,
        list_command: CMD_TEMPLATES_LIST,
        self_refresh_delay_ms: options.self_refresh_delay_ms,
    }
    .render_default(&Default::default())?;
    log::debug!(
        "event=render_script module=bridge script=widget_definition realm={realm}"
    );
    Ok(script.into_string())
}

/// Client half of [`ipc::IpcRouter`]: installs `window.__TEMPLATE_SYNC__`
/// with `invoke(cmd, payload)` and the `runCallback` hook that
/// [`ipc::callback_script`] calls.
pub fn ipc_runtime_script(options: &BridgeOptions) -> Result<String, BridgeError> {
    let script = IpcRuntimeScript {
        callback_global: CALLBACK_GLOBAL,
        invoke_key: INVOKE_KEY,
        invoke_key_field: INVOKE_KEY_FIELD,
        invoke_key_header: INVOKE_KEY_HEADER,
        response_header: RESPONSE_HEADER,
        protocol_url: &options.protocol_url,
    }
    .render_default(&Default::default())?;
    log::debug!("event=render_script module=bridge script=ipc_runtime");
    Ok(script.into_string())
}

/// Host-side script that installs the IPC runtime and the widget definition
/// inside the frame when missing, then refreshes every instance found there.
pub fn activation_script(
    contract: &WidgetContract,
    options: &BridgeOptions,
) -> Result<String, BridgeError> {
    let definition = widget_definition_script(contract, RealmKind::Frame, options)?;
    let runtime = ipc_runtime_script(options)?;
    let script = ActivationScript {
        tag: &contract.tag,
        frame_selector: &options.frame_selector,
        callback_global: CALLBACK_GLOBAL,
        runtime: &runtime,
        definition: &definition,
    }
    .render_default(&Default::default())?;
    Ok(script.into_string())
}

/// Pushes an explicit registry snapshot into every instance in both realms.
pub fn snapshot_script(
    contract: &WidgetContract,
    templates: &[TemplateRecord],
    options: &BridgeOptions,
) -> Result<String, BridgeError> {
    let script = SnapshotScript {
        tag: &contract.tag,
        frame_selector: &options.frame_selector,
        templates,
    }
    .render_default(&Default::default())?;
    Ok(script.into_string())
}

pub fn highlight_script(contract: &WidgetContract) -> Result<String, BridgeError> {
    validate_tag(&contract.tag)?;
    let script = HighlightScript { contract }.render_default(&Default::default())?;
    Ok(script.into_string())
}

use template_sync_core::{RealmKind, SyncConfig, Template, WidgetContract};
use template_sync_frame::ipc::{
    CALLBACK_GLOBAL, CMD_TEMPLATES_LIST, INVOKE_KEY, INVOKE_KEY_FIELD, INVOKE_KEY_HEADER,
    PROTOCOL_URL, RESPONSE_HEADER,
};
use template_sync_frame::{
    BridgeError, BridgeOptions, activation_script, highlight_script, ipc_runtime_script,
    snapshot_script, widget_definition_script,
};

#[test]
fn host_and_frame_definitions_differ_only_in_realm() -> anyhow::Result<()> {
    let contract = WidgetContract::default();
    let options = BridgeOptions::default();

    let host = widget_definition_script(&contract, RealmKind::Host, &options)?;
    let frame = widget_definition_script(&contract, RealmKind::Frame, &options)?;

    assert!(host.contains("\"custom-dropdown\""));
    assert!(host.contains("\"host\""));
    assert!(frame.contains("\"frame\""));
    assert!(frame.contains("\"templateManager\""));
    assert!(frame.contains("customElements.define"));
    assert!(frame.contains(&format!("\"{CMD_TEMPLATES_LIST}\"")));
    assert!(frame.contains(&format!("\"{CALLBACK_GLOBAL}\"")));
    assert!(!host.contains("__TEMPLATE_"));
    assert_ne!(host, frame);
    Ok(())
}

#[test]
fn options_flow_into_rendered_scripts() -> anyhow::Result<()> {
    let contract = WidgetContract::default();
    let options = BridgeOptions {
        registry_global: "templates".to_string(),
        frame_selector: "#editor_ifr".to_string(),
        self_refresh_delay_ms: 250,
        protocol_url: "app://bridge/".to_string(),
    };

    let definition = widget_definition_script(&contract, RealmKind::Frame, &options)?;
    assert!(definition.contains("\"templates\""));
    assert!(definition.contains("250"));

    let activation = activation_script(&contract, &options)?;
    assert!(activation.contains("\"#editor_ifr\""));
    assert!(activation.contains("customElements.define"));
    assert!(activation.contains("injected"));
    assert!(activation.contains("app://bridge/"));
    assert!(!activation.contains(PROTOCOL_URL));
    Ok(())
}

#[test]
fn invalid_tags_are_rejected() {
    for tag in ["dropdown", "Custom-dropdown", "1-dropdown", "custom dropdown"] {
        let contract = WidgetContract {
            tag: tag.to_string(),
            ..WidgetContract::default()
        };
        let err = widget_definition_script(&contract, RealmKind::Host, &BridgeOptions::default())
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidTag(ref t) if t == tag));
        assert!(highlight_script(&contract).is_err());
    }
}

#[test]
fn snapshot_embeds_templates() -> anyhow::Result<()> {
    let contract = WidgetContract::default();
    let mut templates = SyncConfig::default().seed_templates;
    templates.push(Template::new("4", "it's \"quoted\""));

    let script = snapshot_script(&contract, &templates, &BridgeOptions::default())?;
    assert!(script.contains("\"template 1\""));
    assert!(script.contains("\"4\""));
    assert!(script.contains("element.refresh(templates)"));
    Ok(())
}

#[test]
fn highlight_installs_page_hook() -> anyhow::Result<()> {
    let script = highlight_script(&WidgetContract::default())?;
    assert!(script.contains("__templateSyncHighlight"));
    assert!(script.contains("\"data-deletable\""));
    assert!(script.contains("\"Press Backspace to delete\""));
    Ok(())
}

#[test]
fn options_deserialize_with_defaults() -> anyhow::Result<()> {
    let options: BridgeOptions = serde_json::from_str(r#"{ "frame_selector": "iframe.editor" }"#)?;
    assert_eq!(options.frame_selector, "iframe.editor");
    assert_eq!(options.registry_global, "templateManager");
    assert_eq!(options.self_refresh_delay_ms, 100);
    assert_eq!(options.protocol_url, PROTOCOL_URL);
    Ok(())
}

#[test]
fn ipc_runtime_matches_router_constants() -> anyhow::Result<()> {
    let script = ipc_runtime_script(&BridgeOptions::default())?;
    for expected in [
        CALLBACK_GLOBAL,
        INVOKE_KEY,
        INVOKE_KEY_FIELD,
        INVOKE_KEY_HEADER,
        RESPONSE_HEADER,
        PROTOCOL_URL,
    ] {
        assert!(script.contains(&format!("\"{expected}\"")), "missing {expected}");
    }
    assert!(script.contains("runCallback"));
    assert!(script.contains("window.ipc.postMessage"));
    assert!(!script.contains("__TEMPLATE_"));
    Ok(())
}

#[test]
fn activation_installs_runtime_before_definition() -> anyhow::Result<()> {
    let activation = activation_script(&WidgetContract::default(), &BridgeOptions::default())?;
    let runtime = activation
        .find("runCallback")
        .ok_or_else(|| anyhow::anyhow!("runtime not embedded"))?;
    let definition = activation
        .find("customElements.define")
        .ok_or_else(|| anyhow::anyhow!("definition not embedded"))?;
    assert!(runtime < definition);
    assert!(activation.contains(&format!("\"{CALLBACK_GLOBAL}\"")));
    Ok(())
}

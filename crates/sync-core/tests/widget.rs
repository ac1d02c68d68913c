use std::rc::Rc;

use template_sync_core::{
    DefinitionScript, DropdownState, ScriptError, Template, WidgetContract, compute_view,
};

fn snapshot() -> Vec<Template> {
    vec![
        Template::new("1", "template 1"),
        Template::new("2", "template 2"),
    ]
}

#[test]
fn placeholder_selected_without_value() {
    let contract = WidgetContract::default();
    let view = compute_view(&contract, "", &snapshot());
    assert!(!view.error);
    assert!(view.choice_visible());
    assert_eq!(view.options[0].label, "Select an item");
    assert_eq!(view.selected_option().map(|o| o.value.as_str()), Some(""));
    assert_eq!(view.labels(), vec!["template 1", "template 2"]);
}

#[test]
fn matching_value_is_preselected() {
    let contract = WidgetContract::default();
    let view = compute_view(&contract, "2", &snapshot());
    assert!(!view.error);
    assert_eq!(
        view.selected_option().map(|o| o.label.as_str()),
        Some("template 2")
    );
    assert_eq!(view.options.iter().filter(|o| o.selected).count(), 1);
}

#[test]
fn dangling_value_enters_error_state() {
    let contract = WidgetContract::default();
    let view = compute_view(&contract, "9", &snapshot());
    assert!(view.error);
    assert!(!view.choice_visible());
    assert_eq!(view.error_label, "ERROR");
}

#[test]
fn error_state_keeps_value_and_recovers() {
    let mut state = DropdownState::new(Rc::new(WidgetContract::default()));
    state.set_selected_value("2");
    state.apply_snapshot(vec![Template::new("1", "template 1")]);
    assert!(state.view().error);
    assert_eq!(state.selected_value(), "2");

    state.apply_snapshot(snapshot());
    assert!(!state.view().error);
    assert_eq!(state.selected_value(), "2");
}

#[test]
fn refresh_is_idempotent() {
    let mut state = DropdownState::new(Rc::new(WidgetContract::default()));
    state.set_selected_value("1");
    state.apply_snapshot(snapshot());
    let first = state.view().clone();
    state.apply_snapshot(snapshot());
    assert_eq!(state.view(), &first);
}

#[test]
fn choose_reports_instance() {
    let mut state = DropdownState::new(Rc::new(WidgetContract::default()));
    state.apply_snapshot(snapshot());
    let change = state.choose("1");
    assert_eq!(change.value, "1");
    assert_eq!(change.instance_id, state.instance_id());
    assert_eq!(
        state.view().selected_option().map(|o| o.value.as_str()),
        Some("1")
    );
}

#[test]
fn instance_ids_are_distinct() {
    let contract = Rc::new(WidgetContract::default());
    let a = DropdownState::new(contract.clone());
    let b = DropdownState::new(contract);
    assert!(b.instance_id().get() > a.instance_id().get());
    assert!(a.instance_id().to_string().starts_with("dropdown_"));
}

#[test]
fn definition_script_carries_contract() {
    let mut contract = WidgetContract::default();
    contract.labels.placeholder = "Pick one".to_string();
    let source = DefinitionScript::selector_widget(&contract)
        .to_source()
        .unwrap();
    let DefinitionScript::DefineSelectorWidget { contract: decoded } =
        DefinitionScript::from_source(&source).unwrap();
    assert_eq!(decoded, contract);
}

#[test]
fn definition_script_rejects_garbage_and_empty_tags() {
    assert!(matches!(
        DefinitionScript::from_source("customElements.define()"),
        Err(ScriptError::Decode(_))
    ));
    let contract = WidgetContract {
        tag: " ".to_string(),
        ..WidgetContract::default()
    };
    let source = DefinitionScript::selector_widget(&contract)
        .to_source()
        .unwrap();
    assert!(matches!(
        DefinitionScript::from_source(&source),
        Err(ScriptError::EmptyTag)
    ));
}

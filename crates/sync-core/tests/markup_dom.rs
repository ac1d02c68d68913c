use template_sync_core::{
    Document, MarkupError, MarkupNode, SerializeOptions, decode_entities, parse_fragment,
};

#[test]
fn parses_widget_markup_with_attributes() {
    let nodes =
        parse_fragment(r#"Hi <Custom-Dropdown selected-value="2" data-x=bare></custom-dropdown>!"#)
            .unwrap();
    assert_eq!(
        nodes,
        vec![
            MarkupNode::text("Hi "),
            MarkupNode::Element {
                tag: "custom-dropdown".to_string(),
                attrs: vec![
                    ("selected-value".to_string(), "2".to_string()),
                    ("data-x".to_string(), "bare".to_string()),
                ],
                children: Vec::new(),
            },
            MarkupNode::text("!"),
        ]
    );
}

#[test]
fn void_self_closing_and_comments() {
    let nodes = parse_fragment("a<br>b<!-- gone --><span/>c").unwrap();
    assert_eq!(
        nodes,
        vec![
            MarkupNode::text("a"),
            MarkupNode::element("br"),
            MarkupNode::text("b"),
            MarkupNode::element("span"),
            MarkupNode::text("c"),
        ]
    );
}

#[test]
fn first_duplicate_attribute_wins() {
    let nodes = parse_fragment(r#"<p id="one" id="two"></p>"#).unwrap();
    let MarkupNode::Element { attrs, .. } = &nodes[0] else {
        panic!("expected element");
    };
    assert_eq!(attrs, &vec![("id".to_string(), "one".to_string())]);
}

#[test]
fn stray_angle_bracket_is_text() {
    let nodes = parse_fragment("1 < 2").unwrap();
    let text: String = nodes
        .iter()
        .map(|node| match node {
            MarkupNode::Text(text) => text.as_str(),
            MarkupNode::Element { .. } => "",
        })
        .collect();
    assert_eq!(text, "1 < 2");
}

#[test]
fn reports_structural_errors() {
    assert!(matches!(
        parse_fragment("<p><b></p>"),
        Err(MarkupError::MismatchedClose { .. })
    ));
    assert!(matches!(
        parse_fragment("</p>"),
        Err(MarkupError::UnmatchedClose { .. })
    ));
    assert_eq!(
        parse_fragment("<p>open"),
        Err(MarkupError::Unclosed {
            tag: "p".to_string()
        })
    );
    assert!(matches!(
        parse_fragment("<p class=\"x"),
        Err(MarkupError::UnexpectedEof { .. })
    ));
}

#[test]
fn decodes_character_references() {
    assert_eq!(decode_entities("a &amp; b &lt;&#65;&#x42;&gt; &bogus;"), "a & b <AB> &bogus;");
}

#[test]
fn markup_round_trips_through_document() {
    let mut doc = Document::new();
    let body = doc.body();
    doc.set_inner_markup(body, r#"x &amp; <b title="a&quot;b">y</b>"#)
        .unwrap();
    assert_eq!(
        doc.inner_markup(body, &SerializeOptions::default()),
        r#"x &amp; <b title="a&quot;b">y</b>"#
    );
    assert_eq!(doc.text_content(body), "x & y");
}

#[test]
fn serialization_skips_transient_attributes() {
    let mut doc = Document::new();
    let body = doc.body();
    doc.set_inner_markup(
        body,
        r#"<custom-dropdown data-deletable="delete" selected-value="1" title="hint"></custom-dropdown>"#,
    )
    .unwrap();
    let options = SerializeOptions::skipping(["data-deletable", "title"]);
    assert_eq!(
        doc.inner_markup(body, &options),
        r#"<custom-dropdown selected-value="1"></custom-dropdown>"#
    );
}

#[test]
fn failed_parse_leaves_children_untouched() {
    let mut doc = Document::new();
    let body = doc.body();
    doc.set_inner_markup(body, "keep").unwrap();
    assert!(doc.set_inner_markup(body, "<p>").is_err());
    assert_eq!(doc.text_content(body), "keep");
}

#[test]
fn replaced_content_is_freed_and_stale_ids_stay_dead() {
    let mut doc = Document::new();
    let body = doc.body();
    let old = doc
        .set_inner_markup(body, "<p>a<b>b</b></p><custom-dropdown></custom-dropdown>")
        .unwrap();
    assert_eq!(doc.live_nodes(), 6);

    for _ in 0..5 {
        doc.set_inner_markup(body, "<p>a<b>b</b></p><custom-dropdown></custom-dropdown>")
            .unwrap();
    }
    assert_eq!(doc.live_nodes(), 6);

    let fresh = doc.children(body).to_vec();
    for node in old {
        assert!(!doc.contains(node));
        assert!(!doc.is_connected(node));
        assert!(!fresh.contains(&node));
        assert_eq!(doc.tag(node), None);
    }
    assert_eq!(doc.query_all("custom-dropdown").len(), 1);
}

#[test]
fn detached_nodes_are_not_freed() {
    let mut doc = Document::new();
    let body = doc.body();
    let nodes = doc.insert_markup(body, 0, "<p>kept</p>").unwrap();
    assert!(doc.detach(nodes[0]));
    doc.set_inner_markup(body, "other").unwrap();
    assert!(doc.contains(nodes[0]));
    assert_eq!(doc.text_content(nodes[0]), "kept");
}

#[test]
fn split_text_inserts_tail_after() {
    let mut doc = Document::new();
    let body = doc.body();
    let nodes = doc.insert_markup(body, 0, "héllo").unwrap();
    let head = nodes[0];

    let tail = doc.split_text(head, 2).unwrap();
    assert_eq!(doc.text(head), Some("hé"));
    assert_eq!(doc.text(tail), Some("llo"));
    assert_eq!(doc.children(body), &[head, tail]);

    let empty = doc.split_text(tail, 3).unwrap();
    assert_eq!(doc.text(empty), Some(""));
    assert_eq!(doc.child_count(body), 3);
}

#[test]
fn element_siblings_skip_text() {
    let mut doc = Document::new();
    let body = doc.body();
    let nodes = doc
        .insert_markup(body, 0, "<i></i>text<b></b>")
        .unwrap();
    let (i, text, b) = (nodes[0], nodes[1], nodes[2]);
    assert_eq!(doc.previous_element_sibling(text), Some(i));
    assert_eq!(doc.next_element_sibling(text), Some(b));
    assert_eq!(doc.next_element_sibling(b), None);
    assert_eq!(doc.previous_sibling(b), Some(text));
}

#[test]
fn detached_nodes_are_disconnected() {
    let mut doc = Document::new();
    let body = doc.body();
    let nodes = doc
        .insert_markup(body, 0, "<p><custom-dropdown></custom-dropdown></p>")
        .unwrap();
    let widget = doc.children(nodes[0])[0];
    assert_eq!(doc.query_all("custom-dropdown"), vec![widget]);
    assert_eq!(doc.closest(widget, "p"), Some(nodes[0]));

    assert!(doc.detach(nodes[0]));
    assert!(!doc.is_connected(widget));
    assert!(doc.query_all("custom-dropdown").is_empty());
}

#[test]
fn insert_child_refuses_cycles() {
    let mut doc = Document::new();
    let body = doc.body();
    let outer = doc.create_element("div");
    let inner = doc.create_element("span");
    assert!(doc.append_child(body, outer));
    assert!(doc.append_child(outer, inner));
    assert!(!doc.append_child(inner, outer));
    let text = doc.create_text("t");
    assert!(!doc.append_child(text, inner));
    assert_eq!(doc.parent(inner), Some(outer));
}

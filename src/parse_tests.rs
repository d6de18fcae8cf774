#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::component::{ScriptSource, StyleMode};
    use crate::document::{Document, ImportTarget, NodeKind};
    use crate::error::PipelineError;
    use crate::parse::{HtmlSyntax, ResourceParser, Serializer};

    fn parse(html: &str) -> Document {
        HtmlSyntax.parse_fragment("test.html", html).unwrap().document
    }

    fn root_kinds(doc: &Document) -> Vec<NodeKind> {
        doc.children(doc.root())
            .iter()
            .map(|&id| doc.kind(id).clone())
            .collect()
    }

    #[test]
    fn test_self_closing_directive_keeps_following_siblings() {
        let doc = parse(r#"<fragment src="nav.html" /><p>after</p>"#);
        let kinds = root_kinds(&doc);
        assert_eq!(kinds.len(), 2);
        assert!(matches!(&kinds[0], NodeKind::FragmentRef { src, .. } if src == "nav.html"));
        assert_eq!(kinds[1].tag_name(), Some("p"));

        let fragment = doc.children(doc.root())[0];
        assert!(doc.children(fragment).is_empty());
    }

    #[test]
    fn test_self_closing_with_angle_brackets_in_quoted_values() {
        let doc = parse(r#"<fragment src="t.html" title="x > y" note='a<b' /><p>after</p>"#);
        let kinds = root_kinds(&doc);
        assert_eq!(kinds.len(), 2);
        match &kinds[0] {
            NodeKind::FragmentRef { attributes, .. } => {
                assert_eq!(attributes.get("title"), Some("x > y"));
                assert_eq!(attributes.get("note"), Some("a<b"));
            }
            other => panic!("expected fragment reference, got {:?}", other),
        }
        assert_eq!(kinds[1].tag_name(), Some("p"));
        assert!(doc.children(doc.children(doc.root())[0]).is_empty());
    }

    #[test]
    fn test_nested_braces_stay_one_expression() {
        let doc = parse("<p>{{ JSON.stringify({a: {b: 1}}) }} and {{ '}}' }}</p>");
        let p = doc.children(doc.root())[0];
        assert_eq!(
            doc.kind(doc.children(p)[0]),
            &NodeKind::text("{{ JSON.stringify({a: {b: 1}}) }} and {{ '}}' }}")
        );
    }

    #[test]
    fn test_reference_attributes_exclude_src() {
        let doc = parse(r#"<component src="card.html" title="Hi" count="{{ n }}"></component>"#);
        match &root_kinds(&doc)[0] {
            NodeKind::ComponentRef { src, attributes } => {
                assert_eq!(src, "card.html");
                assert_eq!(attributes.get("title"), Some("Hi"));
                assert_eq!(attributes.get("count"), Some("{{ n }}"));
                assert!(!attributes.contains("src"));
            }
            other => panic!("expected component reference, got {:?}", other),
        }
    }

    #[test]
    fn test_slot_and_content_names() {
        let doc = parse(r#"<slot></slot><slot name="aside" required></slot><content name="x"></content>"#);
        assert_eq!(
            root_kinds(&doc),
            vec![
                NodeKind::Slot {
                    name: "default".into(),
                    required: false
                },
                NodeKind::Slot {
                    name: "aside".into(),
                    required: true
                },
                NodeKind::Content { name: "x".into() },
            ]
        );
    }

    #[test]
    fn test_import_declaration() {
        let doc = parse(r#"<import src="card.html" as="Card" kind="component" />"#);
        assert_eq!(
            root_kinds(&doc),
            vec![NodeKind::ImportDecl {
                src: "card.html".into(),
                alias: "card".into(),
                target: ImportTarget::Component,
            }]
        );
    }

    #[test]
    fn test_invalid_directives() {
        for html in [
            "<fragment></fragment>",
            r#"<import src="a.html"></import>"#,
            r#"<import src="a.html" as="a" kind="page"></import>"#,
        ] {
            assert!(
                matches!(
                    HtmlSyntax.parse_fragment("bad.html", html),
                    Err(PipelineError::InvalidDirective { .. })
                ),
                "{} should be rejected",
                html
            );
        }
    }

    #[test]
    fn test_expressions_survive_parsing() {
        let doc = parse("<p>{{ a < b }}</p><a title=\"{{ x > 1 }}\"></a>");
        let p = doc.children(doc.root())[0];
        let text = doc.children(p)[0];
        assert_eq!(doc.kind(text), &NodeKind::text("{{ a < b }}"));

        let a = doc.children(doc.root())[1];
        match doc.kind(a) {
            NodeKind::Tag { attributes, .. } => {
                assert_eq!(attributes.get("title"), Some("{{ x > 1 }}"))
            }
            other => panic!("expected tag, got {:?}", other),
        }
    }

    #[test]
    fn test_var_declaration_keeps_attribute_order() {
        let doc = parse(r#"<var b="1" a="b + 1" />"#);
        match &root_kinds(&doc)[0] {
            NodeKind::VarDecl { attributes } => {
                let names: Vec<&str> = attributes.iter().map(|(name, _)| name).collect();
                assert_eq!(names, vec!["b", "a"]);
            }
            other => panic!("expected var, got {:?}", other),
        }
    }

    #[test]
    fn test_component_blocks_are_split() {
        let component = HtmlSyntax
            .parse_component(
                "card.html",
                r#"<script>const a = 1;</script><script src="lib.js"></script><style mode="link">.c{}</style><div class="c"></div>"#,
            )
            .unwrap();

        assert_eq!(
            component.scripts,
            vec![
                ScriptSource::Inline("const a = 1;".into()),
                ScriptSource::External("lib.js".into()),
            ]
        );
        let style = component.style.unwrap();
        assert_eq!(style.text, ".c{}");
        assert_eq!(style.mode, Some(StyleMode::Link));
        assert_eq!(
            HtmlSyntax.serialize(&component.template.document),
            r#"<div class="c"></div>"#
        );
    }

    #[test]
    fn test_unknown_style_mode_is_rejected() {
        let result = HtmlSyntax.parse_component("card.html", r#"<style mode="inherit">p{}</style>"#);
        assert!(matches!(
            result,
            Err(PipelineError::InvalidDirective { directive: "style", .. })
        ));
    }

    #[test]
    fn test_serializer_escapes_and_void_elements() {
        let doc = parse(r#"<p title="a &quot;b&quot;">1 &lt; 2 &amp; 3</p><br><img src="x.png">"#);
        assert_eq!(
            HtmlSyntax.serialize(&doc),
            r#"<p title="a &quot;b&quot;">1 &lt; 2 &amp; 3</p><br><img src="x.png">"#
        );
    }

    #[test]
    fn test_comments_and_raw_text_are_preserved() {
        let html = "<!-- note --><script>if (a < b) {}</script>";
        assert_eq!(HtmlSyntax.serialize(&parse(html)), html);
    }

    #[test]
    fn test_document_wrappers_kept_only_when_present() {
        let flat = parse("<title>x</title><p>y</p>");
        assert!(root_kinds(&flat).iter().all(|k| k.tag_name() != Some("html")));

        let full = parse("<html><head><title>x</title></head><body><p>y</p></body></html>");
        assert_eq!(root_kinds(&full)[0].tag_name(), Some("html"));
    }
}

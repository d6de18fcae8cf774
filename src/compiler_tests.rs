#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use crate::component::FragmentContext;
    use crate::config::PipelineConfig;
    use crate::error::{EvalErrorKind, PipelineError};
    use crate::parse::{HtmlSyntax, Serializer};
    use crate::pipeline::{compile_pages_parallel, Pipeline};
    use crate::resources::{MemoryStore, ResourceKind};

    fn pipeline(store: MemoryStore) -> (Rc<MemoryStore>, Pipeline) {
        let store = Rc::new(store);
        let pipeline = Pipeline::new(store.clone());
        (store, pipeline)
    }

    fn page_markup(body: &str) -> String {
        format!(
            "<!DOCTYPE html>\n<html><head></head><body>{}</body></html>\n",
            body
        )
    }

    fn fragment_html(pipeline: &mut Pipeline, path: &str) -> String {
        let fragment = pipeline.compile_fragment(path, None).unwrap();
        HtmlSyntax.serialize(&fragment.document)
    }

    #[test]
    fn test_variable_declared_before_use() {
        let (store, mut p) = pipeline(
            MemoryStore::new().with_page("index.html", r#"<var x="2 + 3" /><p>{{ x }}</p>"#),
        );
        let page = p.compile_page("index.html").unwrap();
        assert_eq!(page.markup, page_markup("<p>5</p>"));
        assert_eq!(store.written("index.html"), Some(page.markup));
    }

    #[test]
    fn test_variable_not_visible_before_declaration() {
        let (_, mut p) = pipeline(
            MemoryStore::new().with_markup("a.html", r#"<p>{{ x }}</p><var x="1" />"#),
        );
        match p.compile_fragment("a.html", None) {
            Err(PipelineError::Evaluation(e)) => {
                assert_eq!(e.kind, EvalErrorKind::UnknownIdentifier("x".into()));
                assert_eq!(e.source_text, "{{ x }}");
            }
            other => panic!("expected evaluation error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_variables_chain_left_to_right_and_scope_to_subtree() {
        let (_, mut p) = pipeline(MemoryStore::new().with_markup(
            "a.html",
            r#"<div><var y="2" z="y * 10" /><b>{{ z }}</b></div><i>{{ z }}</i>"#,
        ));
        // `z` is declared inside <div> only.
        match p.compile_fragment("a.html", None) {
            Err(PipelineError::Evaluation(e)) => {
                assert_eq!(e.kind, EvalErrorKind::UnknownIdentifier("z".into()))
            }
            other => panic!("expected evaluation error, got {:?}", other.map(|_| ())),
        }

        let (_, mut p) = pipeline(MemoryStore::new().with_markup(
            "b.html",
            r#"<div><var y="2" z="y * 10" /><b>{{ z }}</b></div>"#,
        ));
        assert_eq!(fragment_html(&mut p, "b.html"), "<div><b>20</b></div>");
    }

    #[test]
    fn test_component_with_named_slot_and_inline_style() {
        let (_, mut p) = pipeline(
            MemoryStore::new()
                .with_page(
                    "index.html",
                    r#"<component src="card.html" title="Hello"><content name="body"><em>caller</em></content></component>"#,
                )
                .with_markup(
                    "card.html",
                    r#"<script>const heading = title.toUpperCase();</script><style>.card { color: red }</style><div class="card"><h2>{{ heading }}</h2><slot name="body">fallback</slot></div>"#,
                ),
        );
        let page = p.compile_page("index.html").unwrap();
        assert_eq!(
            page.markup,
            "<!DOCTYPE html>\n<html><head><style>.card { color: red }</style></head>\
             <body><div class=\"card\"><h2>HELLO</h2><em>caller</em></div></body></html>\n"
        );
    }

    #[test]
    fn test_linked_styles_are_created_once() {
        let card = r#"<style mode="link">p { margin: 0 }</style><p>{{ label }}</p>"#;
        let (store, mut p) = pipeline(
            MemoryStore::new()
                .with_page(
                    "index.html",
                    r#"<component src="a.html" label="A"></component><component src="b.html" label="B"></component>"#,
                )
                .with_markup("a.html", card)
                .with_markup("b.html", card),
        );
        let page = p.compile_page("index.html").unwrap();

        assert_eq!(store.created().len(), 1);
        assert_eq!(
            page.markup,
            "<!DOCTYPE html>\n<html><head><link rel=\"stylesheet\" href=\"/generated/style-0.css\"></head>\
             <body><p>A</p><p>B</p></body></html>\n"
        );
    }

    #[test]
    fn test_link_resource_dedup() {
        let (store, mut p) = pipeline(MemoryStore::new());
        let first = p
            .link_resource(ResourceKind::Style, "h1{}", "a.html")
            .unwrap();
        let again = p
            .link_resource(ResourceKind::Style, "h1{}", "b.html")
            .unwrap();
        let other = p
            .link_resource(ResourceKind::Style, "h2{}", "a.html")
            .unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(store.created().len(), 2);
    }

    #[test]
    fn test_link_resource_relinks_per_source_when_supported() {
        let (store, mut p) = pipeline(MemoryStore::new().with_relinking());
        let first = p
            .link_resource(ResourceKind::Style, "h1{}", "a.html")
            .unwrap();
        let same_source = p
            .link_resource(ResourceKind::Style, "h1{}", "a.html")
            .unwrap();
        let relinked = p
            .link_resource(ResourceKind::Style, "h1{}", "b.html")
            .unwrap();

        assert_eq!(first, same_source);
        assert_eq!(relinked, format!("{}?from=b.html", first));
        assert_eq!(store.created().len(), 1);
    }

    #[test]
    fn test_missing_fragment_fails_page_without_writing() {
        let (store, mut p) = pipeline(MemoryStore::new().with_page(
            "index.html",
            r#"<h1>Home</h1><fragment src="missing.html"></fragment>"#,
        ));
        let err = p.compile_page("index.html").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ResourceNotFound { kind: ResourceKind::Markup, ref path } if path == "missing.html"
        ));
        assert!(store.writes().is_empty());
    }

    #[test]
    fn test_scope_isolation() {
        let (_, mut p) = pipeline(
            MemoryStore::new()
                .with_markup(
                    "caller.html",
                    r#"<var secret="42" /><fragment src="child.html" a="{{ 1 }}"></fragment>"#,
                )
                .with_markup("child.html", "<p>{{ a }}</p><p>{{ secret }}</p>")
                .with_markup(
                    "ok.html",
                    r#"<var secret="42" /><fragment src="a-only.html" a="{{ 1 }}"></fragment>"#,
                )
                .with_markup("a-only.html", "<p>{{ a + 1 }}</p>"),
        );

        match p.compile_fragment("caller.html", None) {
            Err(PipelineError::Evaluation(e)) => {
                assert_eq!(e.kind, EvalErrorKind::UnknownIdentifier("secret".into()))
            }
            other => panic!("expected evaluation error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(fragment_html(&mut p, "ok.html"), "<p>2</p>");
    }

    #[test]
    fn test_slot_substitution_and_fallback() {
        let (_, mut p) = pipeline(
            MemoryStore::new()
                .with_markup("box.html", r#"<div><slot name="s">X</slot></div>"#)
                .with_markup(
                    "supplied.html",
                    r#"<fragment src="box.html"><content name="s">Y</content></fragment>"#,
                )
                .with_markup("omitted.html", r#"<fragment src="box.html"></fragment>"#),
        );
        assert_eq!(fragment_html(&mut p, "supplied.html"), "<div>Y</div>");
        assert_eq!(fragment_html(&mut p, "omitted.html"), "<div>X</div>");
    }

    #[test]
    fn test_slot_content_is_compiled_in_caller_scope() {
        let (_, mut p) = pipeline(
            MemoryStore::new()
                .with_markup(
                    "caller.html",
                    r#"<var who="'caller'" /><fragment src="greet.html" who="callee"><b>{{ who }}</b></fragment>"#,
                )
                .with_markup("greet.html", "<p>{{ who }}:<slot></slot></p>"),
        );
        assert_eq!(
            fragment_html(&mut p, "caller.html"),
            "<p>callee:<b>caller</b></p>"
        );
    }

    #[test]
    fn test_duplicate_content_is_rejected() {
        let (_, mut p) = pipeline(
            MemoryStore::new()
                .with_markup("box.html", r#"<slot name="s"></slot>"#)
                .with_markup(
                    "twice.html",
                    r#"<fragment src="box.html"><content name="s">1</content><content name="s">2</content></fragment>"#,
                )
                .with_markup(
                    "loose.html",
                    r#"<fragment src="box.html"><content>1</content><p>2</p></fragment>"#,
                ),
        );
        assert!(matches!(
            p.compile_fragment("twice.html", None),
            Err(PipelineError::DuplicateContent { ref name, .. }) if name == "s"
        ));
        assert!(matches!(
            p.compile_fragment("loose.html", None),
            Err(PipelineError::DuplicateContent { ref name, .. }) if name == "default"
        ));
    }

    #[test]
    fn test_duplicate_and_required_slots() {
        let (_, mut p) = pipeline(
            MemoryStore::new()
                .with_markup("dup.html", r#"<slot name="s"></slot><slot name="s"></slot>"#)
                .with_markup("req.html", r#"<slot name="s" required></slot>"#)
                .with_markup("opt.html", r#"<p>a<slot name="s"></slot></p>"#),
        );
        assert!(matches!(
            p.compile_fragment("dup.html", None),
            Err(PipelineError::DuplicateSlot { .. })
        ));
        assert!(matches!(
            p.compile_fragment("req.html", None),
            Err(PipelineError::SlotResolution { ref name, .. }) if name == "s"
        ));
        assert_eq!(fragment_html(&mut p, "opt.html"), "<p>a</p>");
    }

    #[test]
    fn test_stray_content() {
        let (_, mut p) = pipeline(
            MemoryStore::new().with_markup("a.html", r#"<div><content name="x">y</content></div>"#),
        );
        assert!(matches!(
            p.compile_fragment("a.html", None),
            Err(PipelineError::StrayContent { ref name, .. }) if name == "x"
        ));
    }

    #[test]
    fn test_imports_resolve_aliases_and_tags() {
        let (_, mut p) = pipeline(
            MemoryStore::new()
                .with_markup(
                    "page.html",
                    r#"<import src="greet.html" as="Greet" /><greet name="Ada"></greet><fragment src="greet" name="Bo"></fragment>"#,
                )
                .with_markup("greet.html", "<p>Hi {{ name }}</p>"),
        );
        assert_eq!(
            fragment_html(&mut p, "page.html"),
            "<p>Hi Ada</p><p>Hi Bo</p>"
        );
    }

    #[test]
    fn test_import_of_missing_resource_fails() {
        let (_, mut p) = pipeline(MemoryStore::new().with_markup(
            "page.html",
            r#"<import src="nope.html" as="nope" kind="component" />"#,
        ));
        assert!(matches!(
            p.compile_fragment("page.html", None),
            Err(PipelineError::ResourceNotFound { .. })
        ));
    }

    #[test]
    fn test_imports_are_not_inherited() {
        let (_, mut p) = pipeline(
            MemoryStore::new()
                .with_markup(
                    "outer.html",
                    r#"<import src="leaf.html" as="leaf" /><fragment src="inner.html"></fragment>"#,
                )
                .with_markup("inner.html", "<leaf></leaf>")
                .with_markup("leaf.html", "<i>leaf</i>"),
        );
        assert_eq!(fragment_html(&mut p, "outer.html"), "<leaf></leaf>");
    }

    #[test]
    fn test_cache_idempotence() {
        let (_, mut p) = pipeline(MemoryStore::new().with_markup("a.html", "<p>{{ 1 + 1 }}</p>"));
        let first = p.compile_fragment("a.html", None).unwrap();
        let second = p.compile_fragment("a.html", None).unwrap();
        assert_eq!(first, second);
        assert!(p.cache().has_fragment("a.html"));
        assert!(p.cache().has_expression("{{ 1 + 1 }}"));

        p.reset();
        assert!(p.cache().is_empty());
    }

    #[test]
    fn test_cyclic_inclusion_is_detected() {
        let (_, mut p) = pipeline(
            MemoryStore::new()
                .with_markup("a.html", r#"<fragment src="b.html"></fragment>"#)
                .with_markup("b.html", r#"<fragment src="a.html"></fragment>"#),
        );
        match p.compile_fragment("a.html", None) {
            Err(PipelineError::CyclicInclusion { chain }) => {
                assert_eq!(chain, vec!["a.html", "b.html", "a.html"])
            }
            other => panic!("expected cycle, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_max_depth_bounds_nesting() {
        let config = PipelineConfig {
            max_depth: 2,
            ..PipelineConfig::default()
        };
        let store = Rc::new(
            MemoryStore::new()
                .with_markup("1.html", r#"<fragment src="2.html"></fragment>"#)
                .with_markup("2.html", r#"<fragment src="3.html"></fragment>"#)
                .with_markup("3.html", "<p>deep</p>"),
        );
        let mut p = Pipeline::new(store).with_config(config);
        assert!(matches!(
            p.compile_fragment("1.html", None),
            Err(PipelineError::CyclicInclusion { .. })
        ));
    }

    #[test]
    fn test_external_instance_script() {
        let (_, mut p) = pipeline(
            MemoryStore::new()
                .with_markup("c.html", r#"<script src="data.js"></script><p>{{ n * 2 }}</p>"#)
                .with_resource(ResourceKind::Script, "data.js", "const n = 7;"),
        );
        let fragment = p.compile_component("c.html", &FragmentContext::new()).unwrap();
        assert_eq!(HtmlSyntax.serialize(&fragment.document), "<p>14</p>");
        assert!(p.cache().has_external_script("data.js"));
    }

    #[test]
    fn test_instance_data_must_be_an_object() {
        let (_, mut p) = pipeline(
            MemoryStore::new().with_markup("c.html", "<script>return 5;</script><p>x</p>"),
        );
        match p.compile_component("c.html", &FragmentContext::new()) {
            Err(PipelineError::Evaluation(e)) => assert!(matches!(e.kind, EvalErrorKind::Type(_))),
            other => panic!("expected type error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_instance_data_overrides_params() {
        let (_, mut p) = pipeline(
            MemoryStore::new()
                .with_markup(
                    "page.html",
                    r#"<component src="c.html" title="param" other="kept"></component>"#,
                )
                .with_markup(
                    "c.html",
                    "<script>const title = 'instance';</script><p>{{ title }}/{{ other }}</p>",
                ),
        );
        assert_eq!(fragment_html(&mut p, "page.html"), "<p>instance/kept</p>");
    }

    #[test]
    fn test_style_interpolation_and_bindings() {
        let (_, mut p) = pipeline(
            MemoryStore::new()
                .with_markup("c.html", "<style>p { color: {{ color }} }</style><p>x</p>")
                .with_markup(
                    "page.html",
                    r#"<component src="c.html" color="red"></component>"#,
                ),
        );
        p.compile_fragment("page.html", None).unwrap();
        let bindings = p.take_style_bindings().unwrap();
        assert_eq!(bindings.inline, vec!["p { color: red }"]);
        assert!(p.take_style_bindings().unwrap().is_empty());
    }

    #[test]
    fn test_linked_styles_wait_for_a_successful_page() {
        let (store, mut p) = pipeline(
            MemoryStore::new()
                .with_page(
                    "index.html",
                    r#"<component src="c.html"></component><fragment src="gone.html"></fragment>"#,
                )
                .with_markup("c.html", r#"<style mode="link">p{}</style><p>c</p>"#),
        );
        assert!(p.compile_page("index.html").is_err());
        assert!(store.created().is_empty());
        assert!(store.writes().is_empty());
    }

    #[test]
    fn test_linked_styles_from_direct_compiles_are_created_on_take() {
        let (store, mut p) = pipeline(
            MemoryStore::new().with_markup("c.html", r#"<style mode="link">p{}</style><p>c</p>"#),
        );
        p.compile_component("c.html", &FragmentContext::new()).unwrap();
        assert!(store.created().is_empty());

        let bindings = p.take_style_bindings().unwrap();
        assert_eq!(bindings.links, vec!["/generated/style-0.css"]);
        assert!(bindings.pending.is_empty());
        assert_eq!(store.created().len(), 1);
    }

    #[test]
    fn test_self_closing_reference_with_angle_brackets_keeps_siblings() {
        let (_, mut p) = pipeline(
            MemoryStore::new()
                .with_markup("a.html", r#"<fragment src="t.html" title="x > y" /><p>after</p>"#)
                .with_markup("t.html", "<h1>{{ title }}</h1>"),
        );
        assert_eq!(
            fragment_html(&mut p, "a.html"),
            "<h1>x &gt; y</h1><p>after</p>"
        );
    }

    #[test]
    fn test_nested_object_literals_in_markup() {
        let (_, mut p) = pipeline(MemoryStore::new().with_markup(
            "a.html",
            r#"<p>{{ JSON.stringify({a: {b: 1}}) }}</p><a data-n="{{ {n: {m: 2}}.n.m }}"></a>"#,
        ));
        assert_eq!(
            fragment_html(&mut p, "a.html"),
            r#"<p>{"a":{"b":1}}</p><a data-n="2"></a>"#
        );
    }

    #[test]
    fn test_attribute_interpolation() {
        let (_, mut p) = pipeline(MemoryStore::new().with_markup(
            "a.html",
            r#"<var id="'main'" /><a href="/u/{{ id }}" class="plain">{{ id.length }}</a>"#,
        ));
        assert_eq!(
            fragment_html(&mut p, "a.html"),
            "<a href=\"/u/main\" class=\"plain\">4</a>"
        );
    }

    #[test]
    fn test_scripts_are_left_untouched() {
        let (_, mut p) = pipeline(MemoryStore::new().with_markup(
            "a.html",
            "<script>const t = `{{ raw }}`;</script>",
        ));
        assert_eq!(
            fragment_html(&mut p, "a.html"),
            "<script>const t = `{{ raw }}`;</script>"
        );
    }

    #[test]
    fn test_compile_all_pages_reports_each_page() {
        let (store, mut p) = pipeline(
            MemoryStore::new()
                .with_page("index.html", "<p>ok</p>")
                .with_page("broken.html", r#"<fragment src="gone.html"></fragment>"#),
        );
        let results = p.compile_all_pages().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
        assert_eq!(store.writes().len(), 1);
    }

    #[test]
    fn test_parallel_pages_use_independent_pipelines() {
        let pages = vec!["a.html".to_string(), "b.html".to_string()];
        let results = compile_pages_parallel(&pages, || {
            Pipeline::new(Rc::new(
                MemoryStore::new()
                    .with_page("a.html", "<p>{{ 'a'.toUpperCase() }}</p>")
                    .with_page("b.html", "<p>b</p>"),
            ))
        });
        assert_eq!(results.len(), 2);
        let markup: Vec<String> = results
            .into_iter()
            .map(|(_, r)| r.unwrap().markup)
            .collect();
        assert_eq!(markup, vec![page_markup("<p>A</p>"), page_markup("<p>b</p>")]);
    }
}

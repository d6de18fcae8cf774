//! Pipeline orchestrator: the public entry points.
//!
//! A [`Pipeline`] owns its cache and collaborators. Independent pipelines can
//! be built side by side; [`compile_pages_parallel`] runs one per page on a
//! rayon pool.

use std::rc::Rc;

use rayon::prelude::*;
use serde_json::{Map, Value};
use tracing::debug;

use crate::cache::{LinkEntry, PipelineCache};
use crate::compiler;
use crate::component::{Component, Fragment, FragmentContext, ResolutionContext, ScriptSource, StyleMode};
use crate::config::PipelineConfig;
use crate::document::ImportTarget;
use crate::error::{EvalErrorKind, EvaluationError, PipelineError, Result};
use crate::evaluator::{Evaluator, Invocable, JsEvaluator};
use crate::finalize::{assemble_page, DefaultFormatter, Formatter, Page, StyleBindings};
use crate::parse::{HtmlSyntax, ResourceParser, Serializer};
use crate::resources::{ResourceKind, ResourceStore};
use crate::scope::{compose_scope, Scope, INSTANCE};
use crate::static_eval::stringify;

const DOCTYPE: &str = "<!DOCTYPE html>";

/// Outcome of one page in a batch compile.
pub type PageResult = (String, Result<Page>);

pub struct Pipeline {
    store: Rc<dyn ResourceStore>,
    parser: Box<dyn ResourceParser>,
    serializer: Box<dyn Serializer>,
    formatter: Box<dyn Formatter>,
    evaluator: Box<dyn Evaluator>,
    config: PipelineConfig,
    cache: PipelineCache,
    /// Paths of the fragments and components currently being compiled.
    resolving: Vec<String>,
    styles: StyleBindings,
}

impl Pipeline {
    pub fn new(store: Rc<dyn ResourceStore>) -> Self {
        Self {
            store,
            parser: Box::new(HtmlSyntax),
            serializer: Box::new(HtmlSyntax),
            formatter: Box::new(DefaultFormatter),
            evaluator: Box::new(JsEvaluator),
            config: PipelineConfig::default(),
            cache: PipelineCache::new(),
            resolving: Vec::new(),
            styles: StyleBindings::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_parser(mut self, parser: Box<dyn ResourceParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_serializer(mut self, serializer: Box<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_formatter(mut self, formatter: Box<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &PipelineCache {
        &self.cache
    }

    pub fn store(&self) -> &Rc<dyn ResourceStore> {
        &self.store
    }

    pub fn detect_expression(&self, text: &str) -> bool {
        self.evaluator.detect_expression(text)
    }

    /// Drain the styles bound since the last page compile or the last call.
    /// Link-mode styles are created here.
    pub fn take_style_bindings(&mut self) -> Result<StyleBindings> {
        let mut bindings = std::mem::take(&mut self.styles);
        self.link_pending(&mut bindings)?;
        Ok(bindings)
    }

    /// Back to the initial state. Masters are fetched again on next use.
    pub fn reset(&mut self) {
        debug!("resetting pipeline");
        self.cache.clear();
        self.resolving.clear();
        self.styles = StyleBindings::default();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PAGES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Resolve, assemble, format and write one page.
    pub fn compile_page(&mut self, path: &str) -> Result<Page> {
        let outer = std::mem::take(&mut self.styles);
        let compiled = self.resolve_page(path);
        let bindings = std::mem::replace(&mut self.styles, outer);
        let fragment = compiled?;
        let mut bindings = bindings;
        self.link_pending(&mut bindings)?;

        let mut document = assemble_page(fragment.document, &bindings)?;
        self.formatter.format_tree(&mut document)?;
        let mut markup = self.serializer.serialize(&document);
        if self.config.doctype {
            markup = format!("{}\n{}", DOCTYPE, markup);
        }
        let markup = self.formatter.format_text(&markup);

        self.store.write_resource(ResourceKind::Markup, path, &markup)?;
        debug!(path, bytes = markup.len(), "wrote page");
        Ok(Page {
            path: path.to_string(),
            document,
            markup,
        })
    }

    fn resolve_page(&mut self, path: &str) -> Result<Fragment> {
        self.enter(path)?;
        let result = self.load_page(path).and_then(|fragment| {
            let context = FragmentContext::new();
            compiler::compile(
                self,
                fragment,
                ResolutionContext {
                    fragment: path,
                    context: &context,
                },
            )
        });
        self.leave();
        result
    }

    /// Compile every page the store lists with the configured extension. Each
    /// page succeeds or fails on its own.
    pub fn compile_all_pages(&mut self) -> Result<Vec<PageResult>> {
        let pages = self.page_paths()?;
        Ok(pages
            .into_iter()
            .map(|path| {
                let result = self.compile_page(&path);
                (path, result)
            })
            .collect())
    }

    /// Pages the store lists that match `page_extension`.
    pub fn page_paths(&self) -> Result<Vec<String>> {
        let suffix = format!(".{}", self.config.page_extension);
        Ok(self
            .store
            .list_pages()?
            .into_iter()
            .filter(|p| p.ends_with(&suffix))
            .collect())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // FRAGMENTS & COMPONENTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Resolve a standalone fragment. Without a context it compiles against an
    /// empty one.
    pub fn compile_fragment(&mut self, path: &str, context: Option<&FragmentContext>) -> Result<Fragment> {
        let empty = FragmentContext::new();
        let context = context.unwrap_or(&empty);
        self.enter(path)?;
        let result = self.load_fragment(path).and_then(|fragment| {
            compiler::compile(
                self,
                fragment,
                ResolutionContext {
                    fragment: path,
                    context,
                },
            )
        });
        self.leave();
        result
    }

    /// Run the component's instance script, bind its style, then resolve its
    /// template with the instance data layered over the parameters.
    pub fn compile_component(&mut self, path: &str, context: &FragmentContext) -> Result<Fragment> {
        self.enter(path)?;
        let result = self.load_component(path).and_then(|component| {
            let instance = self.instance_data(&component, &context.scope)?;
            let mut overlay = context.scope.clone();
            overlay.push_layer(INSTANCE, instance);
            let scope = compose_scope(&context.params, overlay);

            if let Some(style) = &component.style {
                let css = self.compile_style(&style.text, &scope)?;
                let mode = style.mode.unwrap_or(self.config.default_style_mode);
                self.bind_style(mode, css, &component.path);
            }

            let template_context = FragmentContext {
                slots: context.slots.clone(),
                params: context.params.clone(),
                scope,
            };
            compiler::compile(
                self,
                component.template,
                ResolutionContext {
                    fragment: path,
                    context: &template_context,
                },
            )
        });
        self.leave();
        result
    }

    fn instance_data(&mut self, component: &Component, scope: &Scope) -> Result<Map<String, Value>> {
        let mut instance = Map::new();
        for script in &component.scripts {
            let unit = match script {
                ScriptSource::Inline(text) => self.compile_script(text)?,
                ScriptSource::External(path) => self.compile_external_script(path)?,
            };
            let mut visible = scope.clone();
            visible.push_layer(INSTANCE, instance.clone());
            match unit.invoke(&visible)? {
                Value::Object(values) => instance.extend(values),
                Value::Null => {}
                other => {
                    return Err(EvaluationError::new(
                        unit.source(),
                        EvalErrorKind::Type(format!(
                            "instance script of `{}` must produce an object, got `{}`",
                            component.path,
                            stringify(&other)
                        )),
                    )
                    .into())
                }
            }
        }
        Ok(instance)
    }

    fn compile_style(&mut self, text: &str, scope: &Scope) -> Result<String> {
        if !self.detect_expression(text) {
            return Ok(text.to_string());
        }
        let unit = self.compile_expression(text)?;
        Ok(stringify(&unit.invoke(scope)?))
    }

    fn bind_style(&mut self, mode: StyleMode, css: String, source_path: &str) {
        match mode {
            StyleMode::Inline => self.styles.push_inline(css),
            StyleMode::Link => self.styles.push_pending(css, source_path),
        }
    }

    /// Create the resources for link-mode styles once resolution has succeeded.
    fn link_pending(&mut self, bindings: &mut StyleBindings) -> Result<()> {
        for link in std::mem::take(&mut bindings.pending) {
            let path = self.link_resource(ResourceKind::Style, &link.css, &link.source_path)?;
            bindings.push_link(path);
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EVALUATION
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn compile_expression(&mut self, text: &str) -> Result<Rc<dyn Invocable>> {
        if self.cache.has_expression(text) {
            return self.cache.get_expression(text);
        }
        let unit = self.evaluator.compile_expression(text)?;
        self.cache.store_expression(text, Rc::clone(&unit));
        Ok(unit)
    }

    pub fn compile_script(&mut self, text: &str) -> Result<Rc<dyn Invocable>> {
        if self.cache.has_script(text) {
            return self.cache.get_script(text);
        }
        let unit = self.evaluator.compile_script(text)?;
        self.cache.store_script(text, Rc::clone(&unit));
        Ok(unit)
    }

    /// Load a script resource once per path and compile its text.
    pub fn compile_external_script(&mut self, path: &str) -> Result<Rc<dyn Invocable>> {
        let text = if self.cache.has_external_script(path) {
            self.cache.get_external_script(path)?
        } else {
            debug!(path, "loading external script");
            let text = self.store.get_resource(ResourceKind::Script, path)?;
            self.cache.store_external_script(path, text.clone());
            text
        };
        self.compile_script(&text)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LINKING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Content-addressed output: identical `content` always maps to the path
    /// created for it first.
    pub fn link_resource(&mut self, kind: ResourceKind, content: &str, source_path: &str) -> Result<String> {
        let hash = PipelineCache::compute_hash(content);
        if self.cache.has_link(&hash) {
            let entry = self.cache.get_link(&hash)?;
            if entry.kind != kind || entry.source_path != source_path {
                if let Some(relinked) =
                    self.store
                        .relink_created_resource(kind, content, source_path, &entry.path)
                {
                    return relinked;
                }
            }
            return Ok(entry.path);
        }

        let path = self.store.create_resource(kind, content, source_path)?;
        debug!(%kind, hash = %hash, path = %path, "created resource");
        self.cache.store_link(
            &hash,
            LinkEntry {
                kind,
                source_path: source_path.to_string(),
                path: path.clone(),
            },
        );
        Ok(path)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LOADING
    // ═══════════════════════════════════════════════════════════════════════════

    fn load_page(&mut self, path: &str) -> Result<Fragment> {
        if !self.cache.has_page(path) {
            let text = self.store.get_resource(ResourceKind::Markup, path)?;
            let fragment = self.parser.parse_fragment(path, &text)?;
            self.cache.store_page(fragment);
        }
        self.cache.get_page(path)
    }

    fn load_fragment(&mut self, path: &str) -> Result<Fragment> {
        if !self.cache.has_fragment(path) {
            let text = self.store.get_resource(ResourceKind::Markup, path)?;
            let fragment = self.parser.parse_fragment(path, &text)?;
            self.cache.store_fragment(fragment);
        }
        self.cache.get_fragment(path)
    }

    fn load_component(&mut self, path: &str) -> Result<Component> {
        if !self.cache.has_component(path) {
            let text = self.store.get_resource(ResourceKind::Markup, path)?;
            let component = self.parser.parse_component(path, &text)?;
            self.cache.store_component(component);
        }
        self.cache.get_component(path)
    }

    /// Make sure an import target exists and is parsed.
    pub(crate) fn preload(&mut self, target: ImportTarget, path: &str) -> Result<()> {
        match target {
            ImportTarget::Fragment => self.load_fragment(path).map(|_| ()),
            ImportTarget::Component => self.load_component(path).map(|_| ()),
        }
    }

    fn enter(&mut self, path: &str) -> Result<()> {
        let cyclic = self.config.detect_cycles && self.resolving.iter().any(|p| p == path);
        if cyclic || self.resolving.len() >= self.config.max_depth {
            let mut chain = self.resolving.clone();
            chain.push(path.to_string());
            return Err(PipelineError::CyclicInclusion { chain });
        }
        self.resolving.push(path.to_string());
        Ok(())
    }

    fn leave(&mut self) {
        self.resolving.pop();
    }
}

/// Compile `pages` in parallel, each on its own pipeline from `factory`.
pub fn compile_pages_parallel<F>(pages: &[String], factory: F) -> Vec<PageResult>
where
    F: Fn() -> Pipeline + Sync,
{
    pages
        .par_iter()
        .map(|path| {
            let mut pipeline = factory();
            (path.clone(), pipeline.compile_page(path))
        })
        .collect()
}

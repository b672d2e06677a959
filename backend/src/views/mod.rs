//! Server-rendered HTML pages.
//!
//! Templates are embedded at build time. `{{ name }}` reads a render variable,
//! `{{ t:key }}` reads the message catalog for the request language, and
//! `{{ name|raw }}` inserts a variable without escaping (layout only).

pub mod catalog;

use actix_web::HttpResponse;
use actix_web::http::header::ContentType;
use ergot_shared::Language;
use std::collections::HashMap;

pub use catalog::{Catalog, CatalogError};

const LAYOUT: &str = include_str!("../../templates/layout.html");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Home,
    AboutErgot,
    Identify,
    Faq,
    ResultHealthy,
    ErgotDetected,
}

impl View {
    fn template(&self) -> &'static str {
        match self {
            View::Home => include_str!("../../templates/index.html"),
            View::AboutErgot => include_str!("../../templates/about_ergot.html"),
            View::Identify => include_str!("../../templates/identify.html"),
            View::Faq => include_str!("../../templates/faq.html"),
            View::ResultHealthy => include_str!("../../templates/results_healthy.html"),
            View::ErgotDetected => include_str!("../../templates/ergot_detected.html"),
        }
    }

    fn title_key(&self) -> &'static str {
        match self {
            View::Home => "page.home",
            View::AboutErgot => "page.about",
            View::Identify => "page.identify",
            View::Faq => "page.faq",
            View::ResultHealthy | View::ErgotDetected => "page.result",
        }
    }

    #[cfg(test)]
    fn all() -> [View; 6] {
        [
            View::Home,
            View::AboutErgot,
            View::Identify,
            View::Faq,
            View::ResultHealthy,
            View::ErgotDetected,
        ]
    }
}

/// Variables available to one render call.
#[derive(Debug, Default, Clone)]
pub struct RenderContext {
    vars: HashMap<&'static str, String>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.vars.insert(name, value.into());
        self
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct Renderer {
    catalog: Catalog,
    default_language: Language,
}

impl Renderer {
    pub fn new(catalog: Catalog, default_language: Language) -> Self {
        Self {
            catalog,
            default_language,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn default_language(&self) -> Language {
        self.default_language
    }

    pub fn render(&self, view: View, lang: Language, ctx: &RenderContext) -> String {
        let content = self.substitute(view.template(), lang, ctx);
        let page = ctx
            .clone()
            .with("lang", lang.to_string())
            .with("title", self.catalog.text(lang, view.title_key()))
            .with("content", content);
        self.substitute(LAYOUT, lang, &page)
    }

    pub fn respond(&self, view: View, lang: Language, ctx: &RenderContext) -> HttpResponse {
        HttpResponse::Ok()
            .content_type(ContentType::html())
            .body(self.render(view, lang, ctx))
    }

    fn substitute(&self, template: &str, lang: Language, ctx: &RenderContext) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };
            self.expand(after[..end].trim(), lang, ctx, &mut out);
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        out
    }

    fn expand(&self, expr: &str, lang: Language, ctx: &RenderContext, out: &mut String) {
        let (name, raw) = match expr.strip_suffix("|raw") {
            Some(name) => (name.trim(), true),
            None => (expr, false),
        };
        let value = match name.strip_prefix("t:") {
            Some(key) => self.catalog.text(lang, key.trim()),
            None => ctx.get(name).unwrap_or_else(|| {
                log::warn!("Template variable {} is not set", name);
                ""
            }),
        };
        if raw {
            out.push_str(value);
        } else {
            escape_html_into(value, out);
        }
    }
}

fn escape_html_into(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
}

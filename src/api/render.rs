//! Presentation renderer
//!
//! Handlers hand a template name, the request mode and a JSON context to a
//! [`Renderer`]. The bundled [`JsonRenderer`] returns that triple as JSON so
//! a client-side or external template layer can render it.

use super::responder::RequestMode;
use crate::error::Result;
use serde::Serialize;
use serde_json::Value;

pub const HOME: &str = "home.html";
pub const LIST: &str = "app/base_list.html";
pub const DETAIL: &str = "app/base_detail.html";
pub const FORM: &str = "app/base_form.html";
pub const FORM_FRAGMENT: &str = "app/partials/base_form.html";
pub const FIELDS_FRAGMENT: &str = "app/partials/base_fields.html";
pub const DELETE_FRAGMENT: &str = "app/partials/base_delete_form.html";
pub const ERROR: &str = "app/error.html";
pub const FEATURES: &str = "features.html";

/// Turns template data into a response body
pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, mode: RequestMode, context: Value) -> Result<String>;

    fn content_type(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

#[derive(Serialize)]
struct Envelope<'a> {
    template: &'a str,
    mode: RequestMode,
    context: Value,
}

impl Renderer for JsonRenderer {
    fn render(&self, template: &str, mode: RequestMode, context: Value) -> Result<String> {
        Ok(serde_json::to_string(&Envelope {
            template,
            mode,
            context,
        })?)
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

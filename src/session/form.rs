//! Login form harvesting.
//!
//! WebForms-style portals embed per-load tokens (`__VIEWSTATE`,
//! `__EVENTVALIDATION`, ...) as hidden inputs and reject any post that does
//! not echo them back verbatim, so the form is rebuilt from the live page
//! every time.

use scraper::{Html, Selector};
use std::sync::LazyLock;
use url::Url;

use crate::error::LoginError;

static FORM: LazyLock<Selector> = LazyLock::new(|| selector("form"));
static INPUT: LazyLock<Selector> = LazyLock::new(|| selector("input"));

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub method: FormMethod,
    /// `None` when the form has no `action` attribute.
    pub action: Option<String>,
    /// Hidden inputs in document order.
    pub hidden_fields: Vec<(String, String)>,
    /// Every named input's `value`, used to echo the submit button's caption.
    input_values: Vec<(String, String)>,
}

/// The explicit values a login overlays on the harvested hidden fields.
#[derive(Debug, Clone)]
pub struct LoginFields<'a> {
    pub username_field: &'a str,
    pub username: &'a str,
    pub password_field: &'a str,
    pub password: &'a str,
    pub submit_field: Option<&'a str>,
}

impl LoginForm {
    /// Reads the first `<form>` in the page.
    pub fn parse(html: &str) -> Result<Self, LoginError> {
        let document = Html::parse_document(html);
        let form = document.select(&FORM).next().ok_or(LoginError::NoForm)?;

        let method = match form.value().attr("method") {
            Some(method) if method.trim().eq_ignore_ascii_case("get") => FormMethod::Get,
            _ => FormMethod::Post,
        };
        let action = form.value().attr("action").map(str::to_string);

        let mut hidden_fields = Vec::new();
        let mut input_values = Vec::new();
        for input in form.select(&INPUT) {
            let Some(name) = input.value().attr("name").filter(|n| !n.is_empty()) else {
                continue;
            };
            let value = input.value().attr("value").unwrap_or_default().to_string();
            let is_hidden = input
                .value()
                .attr("type")
                .is_some_and(|kind| kind.eq_ignore_ascii_case("hidden"));
            if is_hidden {
                hidden_fields.push((name.to_string(), value.clone()));
            }
            input_values.push((name.to_string(), value));
        }

        Ok(Self {
            method,
            action,
            hidden_fields,
            input_values,
        })
    }

    /// Where the form submits, resolved against the page it came from.
    pub fn submit_url(&self, page_url: &Url) -> Result<Url, LoginError> {
        match self.action.as_deref() {
            None => Ok(page_url.clone()),
            Some(action) => page_url.join(action).map_err(|source| LoginError::InvalidUrl {
                url: action.to_string(),
                source,
            }),
        }
    }

    /// Hidden fields first, then the credentials; a credential field replaces
    /// a hidden field of the same name in place.
    pub fn payload(&self, login: &LoginFields<'_>) -> Vec<(String, String)> {
        let mut fields = self.hidden_fields.clone();
        set_field(&mut fields, login.username_field, login.username);
        set_field(&mut fields, login.password_field, login.password);
        if let Some(submit) = login.submit_field {
            let caption = self
                .input_values
                .iter()
                .find(|(name, value)| name == submit && !value.is_empty())
                .map(|(_, value)| value.as_str())
                .unwrap_or(submit);
            set_field(&mut fields, submit, caption);
        }
        fields
    }
}

fn set_field(fields: &mut Vec<(String, String)>, name: &str, value: &str) {
    match fields.iter_mut().find(|(existing, _)| existing == name) {
        Some(slot) => slot.1 = value.to_string(),
        None => fields.push((name.to_string(), value.to_string())),
    }
}

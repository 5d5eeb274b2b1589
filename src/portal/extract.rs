//! Scraping helpers for the login pages
//!
//! Every helper returns `None` when the thing it looks for is absent or
//! empty; the login state machine turns that into a typed error naming the
//! phase. Tags are matched first and their attributes walked afterwards, so
//! attribute order inside a tag does not matter.

use regex::Regex;
use std::sync::LazyLock;

static INPUT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<input\b[^>]*>").expect("valid pattern"));

static FORM_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<form\b[^>]*>").expect("valid pattern"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.\[\]]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("valid pattern")
});

static JS_REDIRECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"window\.location\.href\s*=\s*(?:"([^"]+)"|'([^']+)')"#)
        .expect("valid pattern")
});

/// Quoted attributes of one tag, names lowercased, values unescaped
fn attributes(tag: &str) -> Vec<(String, String)> {
    ATTRIBUTE
        .captures_iter(tag)
        .map(|caps| {
            let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
            (caps[1].to_ascii_lowercase(), unescape_entities(value))
        })
        .collect()
}

fn attribute<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Value of the hidden `<input>` named `field`
pub fn hidden_input_value(html: &str, field: &str) -> Option<String> {
    INPUT_TAG.find_iter(html).find_map(|tag| {
        let attrs = attributes(tag.as_str());
        let hidden = attribute(&attrs, "type").is_some_and(|t| t.eq_ignore_ascii_case("hidden"));
        if hidden && attribute(&attrs, "name") == Some(field) {
            attribute(&attrs, "value")
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        } else {
            None
        }
    })
}

/// Target of the first `window.location.href = "..."` assignment
pub fn js_redirect(html: &str) -> Option<String> {
    let caps = JS_REDIRECT.captures(html)?;
    let url = caps.get(1).or_else(|| caps.get(2))?.as_str();
    Some(url.replace("\\/", "/")).filter(|u| !u.is_empty())
}

/// `action` attribute of the `<form>` whose id is `form_id`
pub fn form_action(html: &str, form_id: &str) -> Option<String> {
    FORM_TAG.find_iter(html).find_map(|tag| {
        let attrs = attributes(tag.as_str());
        if attribute(&attrs, "id") == Some(form_id) {
            attribute(&attrs, "action")
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        } else {
            None
        }
    })
}

/// Decode the handful of entities that show up in attribute values
pub fn unescape_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    // &amp; goes last so "&amp;lt;" decodes once to "&lt;"
    s.replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#x2F;", "/")
        .replace("&#47;", "/")
        .replace("&amp;", "&")
}

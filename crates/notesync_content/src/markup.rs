//! Tag and attribute scanning shared by the transcoding passes.
//!
//! The wire format's tag vocabulary is small and fixed, so the passes work
//! on tags found by a lexical scan rather than on a parsed tree.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Compiles one of the crate's fixed patterns.
#[allow(clippy::expect_used)]
pub(crate) fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("static pattern compiles")
}

/// Start, end or self-closing tag.
pub(crate) static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r#"(?s)<(/?)([A-Za-z][A-Za-z0-9:_-]*)((?:\s+(?:[^>"']|"[^"]*"|'[^']*')*?)?)\s*(/?)>"#)
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
});

/// Elements that never have content.
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "br", "col", "en-crypt", "en-media", "en-todo", "hr", "img", "wbr",
];

/// Returns true for elements written as `<x />` in the wire format.
pub(crate) fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

/// An attribute list in source order. Names are lowercased, values kept raw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Attrs(Vec<(String, Option<String>)>);

impl Attrs {
    /// Parses the raw attribute text of a tag.
    pub(crate) fn parse(raw: &str) -> Self {
        let attrs = ATTR_RE
            .captures_iter(raw)
            .filter_map(|cap| {
                let name = cap.get(1)?.as_str().to_ascii_lowercase();
                let value = cap
                    .get(2)
                    .or_else(|| cap.get(3))
                    .or_else(|| cap.get(4))
                    .map(|m| m.as_str().to_string());
                Some((name, value))
            })
            .collect();
        Self(attrs)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    /// Sets an attribute in place, or appends it.
    pub(crate) fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = Some(value.into());
        match self.0.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name.to_string(), value)),
        }
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self.0.iter().position(|(n, _)| n == name)?;
        self.0.remove(pos).1
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&str, Option<&str>) -> bool) {
        self.0.retain(|(n, v)| keep(n, v.as_deref()));
    }

    /// Renders as ` a="b" c`, leading space included. Values are written
    /// as found; only quotes are escaped.
    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.0 {
            out.push(' ');
            out.push_str(name);
            if let Some(value) = value {
                out.push_str("=\"");
                out.push_str(&quote_attr(value));
                out.push('"');
            }
        }
        out
    }
}

/// A tag matched by [`TAG_RE`].
#[derive(Debug, Clone)]
pub(crate) struct Tag {
    pub(crate) closing: bool,
    pub(crate) name: String,
    pub(crate) attrs: Attrs,
    pub(crate) self_closing: bool,
}

impl Tag {
    pub(crate) fn from_captures(cap: &Captures<'_>) -> Self {
        Self {
            closing: !cap[1].is_empty(),
            name: cap[2].to_ascii_lowercase(),
            attrs: Attrs::parse(&cap[3]),
            self_closing: !cap[4].is_empty(),
        }
    }

    pub(crate) fn render(&self) -> String {
        if self.closing {
            format!("</{}>", self.name)
        } else if self.self_closing {
            format!("<{}{} />", self.name, self.attrs.render())
        } else {
            format!("<{}{}>", self.name, self.attrs.render())
        }
    }
}

/// Quotes a raw attribute value for a double-quoted attribute. Entities
/// already in the value are kept as found.
pub(crate) fn quote_attr(value: &str) -> String {
    value.replace('"', "&quot;")
}

/// Escapes a generated value for use inside a double-quoted attribute.
pub(crate) fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

/// Escapes generated text content.
pub(crate) fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Removes every tag, keeping text.
pub(crate) fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, "").into_owned()
}

/// Rewrites tags into a canonical form: lowercase names, sorted attributes,
/// void elements self-closed and their end tags dropped.
#[cfg(test)]
pub(crate) fn canonicalize(html: &str) -> String {
    TAG_RE
        .replace_all(html.trim(), |cap: &Captures<'_>| {
            let mut tag = Tag::from_captures(cap);
            if is_void(&tag.name) {
                if tag.closing {
                    return String::new();
                }
                tag.self_closing = true;
            }
            tag.attrs.0.sort();
            tag.render()
        })
        .into_owned()
}

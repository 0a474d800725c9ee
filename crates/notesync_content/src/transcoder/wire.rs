//! Local HTML to wire format passes.

use crate::error::{TranscodeError, TranscodeResult};
use crate::markup::{is_void, pattern, quote_attr, strip_tags, Attrs, Tag, TAG_RE};
use crate::options::TranscodeOptions;
use regex::{Captures, Regex};
use std::sync::LazyLock;

const XML_PROLOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const DOCTYPE: &str = r#"<!DOCTYPE en-note SYSTEM "http://xml.evernote.com/pub/enml2.dtd">"#;

/// Elements removed together with everything inside them.
const DROP_WITH_CONTENT: &[&str] = &[
    "script", "style", "noscript", "iframe", "object", "applet", "frameset", "noframes",
    "select", "textarea", "head", "title",
];

/// Elements the wire format prohibits; the tag goes, its content stays.
const PROHIBITED: &[&str] = &[
    "applet", "base", "basefont", "bgsound", "blink", "body", "button", "dir", "embed",
    "fieldset", "form", "frame", "frameset", "head", "html", "iframe", "ilayer", "input",
    "isindex", "label", "layer", "legend", "link", "marquee", "menu", "meta", "noframes",
    "noscript", "object", "optgroup", "option", "param", "plaintext", "script", "select",
    "style", "textarea", "xml", "aside",
];

/// Attributes that survive sanitizing.
const ALLOWED_ATTRS: &[&str] = &[
    "abbr", "align", "alt", "axis", "bgcolor", "border", "cellpadding", "cellspacing", "char",
    "charoff", "checked", "cite", "clear", "color", "colspan", "compact", "coords", "datetime",
    "dir", "face", "frame", "hash", "headers", "height", "href", "hspace", "lang", "longdesc",
    "name", "noshade", "nowrap", "rel", "rev", "rowspan", "rules", "scope", "shape", "size",
    "span", "src", "start", "style", "summary", "title", "type", "usemap", "valign", "value",
    "vspace", "width", "xml:lang",
];

/// Link protocols the remote accepts, including its own note-link scheme.
const ALLOWED_PROTOCOLS: &[&str] = &["http", "https", "mailto", "ftp", "file", "evernote"];

/// Block elements written as `div` in the wire format.
const BLOCK_ALIASES: &[&str] = &[
    "p", "section", "article", "header", "footer", "main", "figure", "figcaption", "nav",
    "address",
];

/// Attributes that only exist on the local placeholder of a media marker.
const LOCAL_MEDIA_ATTRS: &[&str] = &["src", "href", "class", "data-en-hash", "data-en-type"];

static IMG_RE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r#"(?is)<img\b((?:[^>"']|"[^"]*"|'[^']*')*?)\s*/?>"#));
static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?is)<a\b([^>]*)>(.*?)</a\s*>"));
static ANCHOR_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)<a\b([^>]*)>"));
static TODO_SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?is)<span\b([^>]*)>\s*([xo])\s*</span\s*>"));
static ASIDE_RE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?is)<aside\b([^>]*)>(.*?)</aside\s*>"));
static PARAGRAPH_RE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?is)<p\b[^>]*>(.*?)</p\s*>"));
static CITE_RE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?is)<cite\b[^>]*>(.*?)</cite\s*>"));
static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?s)<!--.*?(?:-->|$)"));
static DECLARATION_RE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?is)<\?.*?\?>|<!DOCTYPE[^>]*>|<!\[CDATA\[.*?\]\]>"));
static DROP_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DROP_WITH_CONTENT
        .iter()
        .map(|tag| pattern(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")))
        .collect()
});
static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?is)<en-note\b[^>]*>(.*)</en-note\s*>"));
static EMPTY_BODY_RE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?is)<en-note\b[^>]*/>"));

fn has_class(attrs: &Attrs, class: &str) -> bool {
    attrs
        .get("class")
        .is_some_and(|v| v.split_whitespace().any(|c| c == class))
}

fn media_marker(attrs: &Attrs) -> Option<String> {
    let hash = quote_attr(attrs.get("data-en-hash")?);
    let mime = quote_attr(attrs.get("data-en-type")?);
    let mut extra = attrs.clone();
    extra.retain(|name, _| !LOCAL_MEDIA_ATTRS.contains(&name));
    Some(format!(
        r#"<en-media hash="{hash}" type="{mime}"{} />"#,
        extra.render()
    ))
}

/// Turns local media placeholders back into media markers.
pub fn media_to_wire(html: &str) -> String {
    let html = IMG_RE.replace_all(html, |cap: &Captures<'_>| {
        media_marker(&Attrs::parse(&cap[1])).unwrap_or_else(|| cap[0].to_string())
    });
    ANCHOR_RE
        .replace_all(&html, |cap: &Captures<'_>| {
            media_marker(&Attrs::parse(&cap[1])).unwrap_or_else(|| cap[0].to_string())
        })
        .into_owned()
}

/// Turns todo-state spans back into checkbox markers.
pub fn todo_to_wire(html: &str) -> String {
    TODO_SPAN_RE
        .replace_all(html, |cap: &Captures<'_>| {
            if !has_class(&Attrs::parse(&cap[1]), "en-todo") {
                return cap[0].to_string();
            }
            match &cap[2] {
                "x" => r#"<en-todo checked="true" />"#.to_string(),
                _ => "<en-todo />".to_string(),
            }
        })
        .into_owned()
}

/// Turns highlight callouts back into quoted citation blocks.
///
/// Only callouts citing one of the configured highlight hosts are
/// converted; others reach the sanitizer as plain asides.
pub fn highlight_to_wire(html: &str, options: &TranscodeOptions) -> String {
    ASIDE_RE
        .replace_all(html, |cap: &Captures<'_>| {
            let attrs = Attrs::parse(&cap[1]);
            if !has_class(&attrs, "en-highlight") {
                return cap[0].to_string();
            }
            let inner = &cap[2];
            let cite = CITE_RE.captures(inner);
            let anchor = cite
                .as_ref()
                .and_then(|c| ANCHOR_RE.captures(c.get(1).map_or("", |m| m.as_str())));

            let href = anchor
                .as_ref()
                .and_then(|a| Attrs::parse(&a[1]).get("href").map(str::to_string))
                .or_else(|| attrs.get("data-source").map(str::to_string))
                .unwrap_or_default();
            if !options.is_highlight_url(&href) {
                return cap[0].to_string();
            }
            let label = anchor
                .as_ref()
                .map(|a| strip_tags(&a[2]))
                .unwrap_or_else(|| href.clone());
            let text = match PARAGRAPH_RE.captures(inner) {
                Some(p) => p[1].trim().to_string(),
                None => {
                    let without_cite = CITE_RE.replace_all(inner, "");
                    strip_tags(&without_cite).trim().to_string()
                }
            };

            format!(
                r#"<blockquote><div>{text}</div><div><a href="{}">{}</a></div></blockquote>"#,
                quote_attr(&href),
                label.trim()
            )
        })
        .into_owned()
}

/// Restores cross-note links from their `data-en-href` attribute.
pub fn links_to_wire(html: &str) -> String {
    ANCHOR_OPEN_RE
        .replace_all(html, |cap: &Captures<'_>| {
            let mut attrs = Attrs::parse(&cap[1]);
            let Some(original) = attrs.remove("data-en-href") else {
                return cap[0].to_string();
            };
            attrs.set("href", original);
            Tag {
                closing: false,
                name: "a".into(),
                attrs,
                self_closing: false,
            }
            .render()
        })
        .into_owned()
}

fn protocol_allowed(url: &str) -> bool {
    let url = url.trim();
    let Some((scheme, _)) = url.split_once(':') else {
        return true;
    };
    let is_scheme = scheme
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !is_scheme {
        // A colon after a path or query is not a scheme separator.
        return true;
    }
    ALLOWED_PROTOCOLS
        .iter()
        .any(|p| scheme.eq_ignore_ascii_case(p))
}

/// Restricts markup to what the wire format accepts.
///
/// Comments and declarations are removed, prohibited elements are dropped
/// (script-like ones with their content), attributes are limited to a fixed
/// vocabulary and links to allowed protocols. Unknown elements pass through.
pub fn sanitize(html: &str) -> String {
    let mut html = COMMENT_RE.replace_all(html, "").into_owned();
    html = DECLARATION_RE.replace_all(&html, "").into_owned();
    for re in DROP_RES.iter() {
        html = re.replace_all(&html, "").into_owned();
    }

    TAG_RE
        .replace_all(&html, |cap: &Captures<'_>| {
            let mut tag = Tag::from_captures(cap);
            if PROHIBITED.contains(&tag.name.as_str()) {
                return String::new();
            }
            tag.attrs.retain(|name, value| {
                if !ALLOWED_ATTRS.contains(&name) {
                    return false;
                }
                match (name, value) {
                    ("href" | "src", Some(url)) => protocol_allowed(url),
                    _ => true,
                }
            });
            tag.render()
        })
        .into_owned()
}

/// Normalizes block elements to `div` and self-closes void elements.
pub fn normalize_blocks(html: &str) -> String {
    TAG_RE
        .replace_all(html, |cap: &Captures<'_>| {
            let mut tag = Tag::from_captures(cap);
            if BLOCK_ALIASES.contains(&tag.name.as_str()) {
                tag.name = "div".into();
            }
            if is_void(&tag.name) {
                if tag.closing {
                    return String::new();
                }
                tag.self_closing = true;
            }
            tag.render()
        })
        .into_owned()
}

/// Wraps a body in the wire format's document declaration and root element.
pub fn wrap_document(body: &str) -> String {
    format!("{XML_PROLOG}\n{DOCTYPE}\n<en-note>{}</en-note>", body.trim())
}

/// Checks that a wire document has its root element, no comments and
/// balanced tags. Used before pushing content to the remote.
pub fn validate_wire(wire: &str) -> TranscodeResult<()> {
    let body = match BODY_RE.captures(wire) {
        Some(cap) => cap.get(1).map_or("", |m| m.as_str()),
        None if EMPTY_BODY_RE.is_match(wire) => return Ok(()),
        None => return Err(TranscodeError::MissingWrapper),
    };

    if let Some(offset) = body.find("<!--") {
        return Err(TranscodeError::Comment { offset });
    }

    let mut open: Vec<String> = Vec::new();
    for cap in TAG_RE.captures_iter(body) {
        let tag = Tag::from_captures(&cap);
        let offset = cap.get(0).map_or(0, |m| m.start());
        if is_void(&tag.name) || tag.self_closing {
            continue;
        }
        if !tag.closing {
            open.push(tag.name);
            continue;
        }
        match open.pop() {
            Some(name) if name == tag.name => {}
            _ => {
                return Err(TranscodeError::UnexpectedClose {
                    tag: tag.name,
                    offset,
                })
            }
        }
    }

    match open.pop() {
        Some(tag) => Err(TranscodeError::Unclosed { tag }),
        None => Ok(()),
    }
}

//! Wire format to local HTML passes.

use super::MediaResolver;
use crate::markup::{
    escape_attr, escape_text, pattern, quote_attr, strip_tags, Attrs, Tag, TAG_RE,
};
use crate::options::TranscodeOptions;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static NOTE_BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?is)<en-note\b[^>]*>(.*)</en-note\s*>"));
static EMPTY_NOTE_RE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?is)<en-note\b[^>]*/>"));
static PROLOG_RE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?is)<\?xml.*?\?>|<!DOCTYPE[^>]*>"));
static MEDIA_RE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r#"(?is)<en-media\b((?:[^>"']|"[^"]*"|'[^']*')*?)\s*(?:/>|>(?:\s*</en-media\s*>)?)"#)
});
static TODO_RE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r#"(?is)<en-todo\b((?:[^>"']|"[^"]*"|'[^']*')*?)\s*(?:/>|>(?:\s*</en-todo\s*>)?)"#)
});
static BLOCKQUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?is)<blockquote\b[^>]*>(.*?)</blockquote\s*>"));
static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?is)<a\b([^>]*)>(.*?)</a\s*>"));
static ANCHOR_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)<a\b([^>]*)>"));
static BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)<br\s*/?>|</(?:div|p|li)\s*>"));
static NOTE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"^evernote:///view/(\d+)/(s\d+)/([0-9A-Fa-f-]+)/([0-9A-Fa-f-]+)/?$")
});

/// Removes the XML prolog and the `en-note` wrapper, keeping inner markup.
pub fn strip_wrapper(wire: &str) -> String {
    if let Some(cap) = NOTE_BODY_RE.captures(wire) {
        return cap[1].trim().to_string();
    }
    let rest = PROLOG_RE.replace_all(wire, "");
    if EMPTY_NOTE_RE.is_match(&rest) {
        return String::new();
    }
    rest.trim().to_string()
}

/// Replaces media markers with local elements.
///
/// Markers keep their hash and type as `data-en-hash` / `data-en-type`.
/// Resolved images become `<img>`, other resolved media a download link,
/// and unresolved media a pending link. Markers missing either attribute
/// are left untouched.
pub fn media_to_local(html: &str, media: &dyn MediaResolver) -> String {
    MEDIA_RE
        .replace_all(html, |cap: &Captures<'_>| {
            let mut attrs = Attrs::parse(&cap[1]);
            let (Some(hash), Some(mime)) = (attrs.remove("hash"), attrs.remove("type")) else {
                return cap[0].to_string();
            };
            let hash = quote_attr(&hash.to_ascii_lowercase());
            let mime_attr = quote_attr(&mime);
            let extra = attrs.render();

            match media.resolve(&hash) {
                Some(found) if mime.starts_with("image/") => format!(
                    r#"<img src="{}"{extra} data-en-hash="{hash}" data-en-type="{mime_attr}" />"#,
                    escape_attr(&found.url),
                ),
                Some(found) => format!(
                    r#"<a href="{}" class="en-media"{extra} data-en-hash="{hash}" data-en-type="{mime_attr}">{}</a>"#,
                    escape_attr(&found.url),
                    escape_text(&found.file_name),
                ),
                None => format!(
                    r##"<a href="#" class="en-media en-media-pending"{extra} data-en-hash="{hash}" data-en-type="{mime_attr}">pending resource</a>"##
                ),
            }
        })
        .into_owned()
}

/// Replaces checkbox markers with a todo-state span (`x` checked, `o` open).
pub fn todo_to_local(html: &str) -> String {
    TODO_RE
        .replace_all(html, |cap: &Captures<'_>| {
            let attrs = Attrs::parse(&cap[1]);
            let checked = attrs
                .get("checked")
                .is_some_and(|v| v.eq_ignore_ascii_case("true"));
            let state = if checked { 'x' } else { 'o' };
            format!(r#"<span class="en-todo">{state}</span>"#)
        })
        .into_owned()
}

/// Re-renders quoted highlights that cite a highlight service as callouts.
///
/// The citation link is lifted into a `<cite>`, wrapper elements around
/// the quoted text are removed and line breaks collapse to single `<br />`.
/// Quotes that carry media are left as they are, since flattening them
/// would drop the markers.
pub fn highlight_to_local(html: &str, options: &TranscodeOptions) -> String {
    BLOCKQUOTE_RE
        .replace_all(html, |cap: &Captures<'_>| {
            let inner = &cap[1];
            if carries_media(inner) {
                return cap[0].to_string();
            }
            let citation = ANCHOR_RE.captures_iter(inner).find_map(|a| {
                let attrs = Attrs::parse(&a[1]);
                let href = attrs.get("href")?.to_string();
                options
                    .is_highlight_url(&href)
                    .then(|| (a.get(0).map_or(0..0, |m| m.range()), href, strip_tags(&a[2])))
            });
            let Some((range, href, label)) = citation else {
                return cap[0].to_string();
            };

            let mut quoted = String::with_capacity(inner.len());
            quoted.push_str(&inner[..range.start]);
            quoted.push_str(&inner[range.end..]);

            let text = BREAK_RE.replace_all(&quoted, "\n");
            let lines: Vec<String> = strip_tags(&text)
                .lines()
                .map(str::trim)
                .filter(|line| line.chars().any(char::is_alphanumeric))
                .map(str::to_string)
                .collect();

            let href = quote_attr(&href);
            format!(
                r#"<aside class="en-highlight" data-source="{href}"><p>{}</p><cite><a href="{href}">{}</a></cite></aside>"#,
                lines.join("<br />"),
                label.trim(),
            )
        })
        .into_owned()
}

fn carries_media(html: &str) -> bool {
    MEDIA_RE.is_match(html)
        || TAG_RE
            .captures_iter(html)
            .any(|cap| Attrs::parse(&cap[3]).get("data-en-hash").is_some())
}

/// Rewrites cross-note links into browsable URLs.
///
/// The original link is kept in `data-en-href` so it can be restored.
pub fn links_to_local(html: &str, options: &TranscodeOptions) -> String {
    ANCHOR_OPEN_RE
        .replace_all(html, |cap: &Captures<'_>| {
            let mut attrs = Attrs::parse(&cap[1]);
            let Some(href) = attrs.get("href").map(str::to_string) else {
                return cap[0].to_string();
            };
            let Some(link) = NOTE_LINK_RE.captures(href.trim()) else {
                return cap[0].to_string();
            };
            let web = format!(
                "{}/shard/{}/nl/{}/{}/",
                options.web_host, &link[2], &link[1], &link[3]
            );
            attrs.set("href", web);
            attrs.set("data-en-href", href);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcoder::{NoMedia, ResolvedMedia};

    const WIRE: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8"?>"#,
        r#"<!DOCTYPE en-note SYSTEM "http://xml.evernote.com/pub/enml2.dtd">"#,
        r#"<en-note style="word-wrap: break-word;"><div>Hello</div></en-note>"#,
    );

    #[test]
    fn strips_prolog_and_wrapper() {
        assert_eq!(strip_wrapper(WIRE), "<div>Hello</div>");
    }

    #[test]
    fn empty_note() {
        assert_eq!(strip_wrapper(r#"<?xml version="1.0"?><en-note/>"#), "");
    }

    #[test]
    fn fragment_without_wrapper_passes_through() {
        assert_eq!(strip_wrapper("  <div>x</div> "), "<div>x</div>");
    }

    #[test]
    fn media_resolved_image() {
        let resolver = |hash: &str| {
            (hash == "abcd").then(|| ResolvedMedia {
                url: "/files/a.png?v=1&x=2".into(),
                file_name: "a.png".into(),
            })
        };
        let html = media_to_local(r#"<en-media type="image/png" hash="ABCD" width="40"/>"#, &resolver);
        assert_eq!(
            html,
            r#"<img src="/files/a.png?v=1&amp;x=2" width="40" data-en-hash="abcd" data-en-type="image/png" />"#
        );
    }

    #[test]
    fn media_resolved_download() {
        let resolver = |_: &str| {
            Some(ResolvedMedia {
                url: "/files/report.pdf".into(),
                file_name: "report.pdf".into(),
            })
        };
        let html = media_to_local(r#"<en-media hash="ab" type="application/pdf"></en-media>"#, &resolver);
        assert_eq!(
            html,
            r#"<a href="/files/report.pdf" class="en-media" data-en-hash="ab" data-en-type="application/pdf">report.pdf</a>"#
        );
    }

    #[test]
    fn media_pending() {
        let html = media_to_local(r#"<en-media hash="ab" type="image/jpeg" />"#, &NoMedia);
        assert!(html.contains("en-media-pending"));
        assert!(html.contains(r#"data-en-hash="ab""#));
        assert!(html.contains(r#"data-en-type="image/jpeg""#));
    }

    #[test]
    fn malformed_media_is_left_untouched() {
        let marker = r#"<en-media hash="ab"/>"#;
        assert_eq!(media_to_local(marker, &NoMedia), marker);
    }

    #[test]
    fn media_attributes_stay_quoted() {
        let html = media_to_local(r#"<en-media type='image/png" onload="x' hash="ab"/>"#, &NoMedia);
        assert!(html.contains(r#"data-en-type="image/png&quot; onload=&quot;x""#));
        assert!(!html.contains(r#"onload="x""#));
    }

    #[test]
    fn todo_states() {
        assert_eq!(
            todo_to_local(r#"<en-todo checked="true"/>a<en-todo/>b<en-todo checked="false"></en-todo>"#),
            r#"<span class="en-todo">x</span>a<span class="en-todo">o</span>b<span class="en-todo">o</span>"#
        );
    }

    #[test]
    fn highlight_becomes_callout() {
        let html = concat!(
            "<blockquote><div><span>First line</span><br/><br/>second line</div>",
            r#"<div>— <a href="https://readwise.io/open/7"><b>Book</b></a></div></blockquote>"#,
        );
        let local = highlight_to_local(html, &TranscodeOptions::default());
        assert_eq!(
            local,
            concat!(
                r#"<aside class="en-highlight" data-source="https://readwise.io/open/7">"#,
                "<p>First line<br />second line</p>",
                r#"<cite><a href="https://readwise.io/open/7">Book</a></cite></aside>"#,
            )
        );
    }

    #[test]
    fn plain_quote_is_kept() {
        let html = r#"<blockquote><div>quote <a href="https://example.com">x</a></div></blockquote>"#;
        assert_eq!(highlight_to_local(html, &TranscodeOptions::default()), html);
    }

    #[test]
    fn quote_with_media_is_kept() {
        let options = TranscodeOptions::default();
        let pending = media_to_local(
            concat!(
                r#"<blockquote><div>quote <en-media type="image/png" hash="0a0b"/></div>"#,
                r#"<div><a href="https://readwise.io/open/1">Book</a></div></blockquote>"#,
            ),
            &NoMedia,
        );
        assert_eq!(highlight_to_local(&pending, &options), pending);

        let raw = concat!(
            r#"<blockquote><div><en-media hash="0a0b"/></div>"#,
            r#"<div><a href="https://readwise.io/open/1">Book</a></div></blockquote>"#,
        );
        assert_eq!(highlight_to_local(raw, &options), raw);
    }

    #[test]
    fn highlight_source_stays_quoted() {
        let html = r#"<blockquote><div>q</div><div><a href='https://readwise.io/open/1?a="b"'>Book</a></div></blockquote>"#;
        let local = highlight_to_local(html, &TranscodeOptions::default());
        assert!(local.contains(r#"data-source="https://readwise.io/open/1?a=&quot;b&quot;""#));
    }

    #[test]
    fn note_links_rewritten() {
        let html = r#"<a style="color:red" href="evernote:///view/1234/s56/0a1b-2c/0a1b-2c/">see</a>"#;
        let local = links_to_local(html, &TranscodeOptions::default());
        assert_eq!(
            local,
            concat!(
                r#"<a style="color:red" href="https://www.evernote.com/shard/s56/nl/1234/0a1b-2c/" "#,
                r#"data-en-href="evernote:///view/1234/s56/0a1b-2c/0a1b-2c/">see</a>"#,
            )
        );
    }

    #[test]
    fn other_links_untouched() {
        let html = r#"<a href="https://example.com">x</a><a name="top">y</a>"#;
        assert_eq!(links_to_local(html, &TranscodeOptions::default()), html);
    }
}

//! Markup stripping for untrusted chat text.
//!
//! Chat content and sender names come straight from clients and are echoed
//! to every member of a room, so anything a browser would interpret as
//! markup is removed before the text enters the relay:
//! - tags (`<b>`, `</div>`, `<img ...>`) are dropped, their text content kept
//! - `script`, `style`, `iframe`, `object`, `embed`, `noscript` and
//!   `template` elements are dropped together with their content
//! - comments, doctypes and processing instructions are dropped
//! - an unterminated tag swallows the rest of the input
//!
//! Removing a tag can join the text around it into a new tag
//! (`<<b>script>`), so passes repeat until the text stops changing.
//!
//! Text without markup passes through unchanged, including `&`, quotes and
//! a `<` that does not open a tag (`1 < 2`, `<3`).

const STRIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template",
];

struct Tag {
    name: String,
    closing: bool,
    len: usize,
}

/// Strip markup from `text`. Never fails.
pub fn sanitize(text: &str) -> String {
    let mut current = strip_once(text);
    loop {
        // every pass that changes anything makes the text shorter
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        if tail.starts_with("<!--") {
            rest = match tail[4..].find("-->") {
                Some(end) => &tail[4 + end + 3..],
                None => "",
            };
            continue;
        }

        if !opens_tag(tail) {
            out.push('<');
            rest = &tail[1..];
            continue;
        }

        let Some(tag) = parse_tag(tail) else {
            // unterminated: nothing after it can be trusted
            rest = "";
            break;
        };

        rest = &tail[tag.len..];
        if !tag.closing && STRIPPED_ELEMENTS.contains(&tag.name.as_str()) {
            rest = skip_element(rest, &tag.name);
        }
    }

    out.push_str(rest);
    out
}

fn opens_tag(tail: &str) -> bool {
    let mut chars = tail.chars().skip(1);
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '!' || c == '?' => true,
        Some('/') => chars.next().is_some_and(|c| c.is_ascii_alphabetic()),
        _ => false,
    }
}

/// Parse the tag at the start of `tail` (which begins with `<`), honoring
/// quoted attribute values. Returns `None` when no closing `>` exists.
fn parse_tag(tail: &str) -> Option<Tag> {
    let body = &tail[1..];
    let (closing, body) = match body.strip_prefix('/') {
        Some(body) => (true, body),
        None => (false, body),
    };

    let name: String = body
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
        .map(|c| c.to_ascii_lowercase())
        .collect();

    let mut quote = None;
    for (i, c) in tail.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => {
                return Some(Tag {
                    name,
                    closing,
                    len: i + 1,
                });
            }
            (None, _) => {}
        }
    }

    None
}

/// Skip past the matching `</name>`; everything up to it is dropped.
fn skip_element<'a>(rest: &'a str, name: &str) -> &'a str {
    let lowered = rest.to_ascii_lowercase();
    let needle = format!("</{name}");
    let mut from = 0;

    while let Some(pos) = lowered[from..].find(&needle) {
        let at = from + pos;
        let after = &lowered[at + needle.len()..];
        if after.starts_with(|c: char| c == '>' || c.is_ascii_whitespace()) {
            return match rest[at..].find('>') {
                Some(end) => &rest[at + end + 1..],
                None => "",
            };
        }
        from = at + needle.len();
    }

    ""
}

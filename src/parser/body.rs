//! Body extraction: pick the message's textual representation and normalize it to HTML.

use crate::model::part::MessagePart;

use super::decode_transport;
use super::walk::{walk, PartVisitor};

/// Content type of every extracted body.
pub const HTML_TYPE: &str = "text/html";

/// Content type of plain-text parts.
pub const PLAIN_TYPE: &str = "text/plain";

/// Extracted, normalized body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBody {
    /// HTML content (possibly empty).
    pub content: String,
    /// Content type of `content`; always an HTML type.
    pub content_type: String,
}

/// Records the first HTML part and the first plain-text part in tree order.
#[derive(Default)]
struct BodyCollector {
    html: Option<(String, String)>,
    plain: Option<String>,
}

impl PartVisitor for BodyCollector {
    fn visit(&mut self, part: &MessagePart, _depth: usize) {
        let is_html = part.mime_type.eq_ignore_ascii_case(HTML_TYPE);
        let is_plain = part.mime_type.eq_ignore_ascii_case(PLAIN_TYPE);
        if !(is_html && self.html.is_none()) && !(is_plain && self.plain.is_none()) {
            return;
        }
        let Some(text) = decode_part_text(part) else {
            return;
        };
        if is_html {
            self.html = Some((text, part.mime_type.clone()));
        } else {
            self.plain = Some(text);
        }
    }
}

/// Find the best body of the message rooted at `root`.
///
/// HTML wins over plain text no matter where either sits in the tree; within
/// one kind the first non-empty part in tree order wins. Plain text is
/// wrapped into a minimal HTML document.
pub fn extract_body(root: &MessagePart) -> ExtractedBody {
    let mut collector = BodyCollector::default();
    walk(root, &mut collector);

    if let Some((content, content_type)) = collector.html {
        return ExtractedBody {
            content,
            content_type,
        };
    }

    let content = collector
        .plain
        .map(|text| wrap_plain_text(&text))
        .unwrap_or_default();
    ExtractedBody {
        content,
        content_type: HTML_TYPE.to_string(),
    }
}

/// Decode a part's inline data to text.
///
/// Returns `None` for parts without data and for data that is not valid
/// base64url. The charset comes from the part's `Content-Type`; unknown or
/// missing charsets try UTF-8, then Windows-1252 (which accepts every byte).
fn decode_part_text(part: &MessagePart) -> Option<String> {
    let bytes = decode_transport(part.inline_data()?).ok()?;
    if bytes.is_empty() {
        return None;
    }

    let declared = part
        .header("content-type")
        .and_then(charset_param)
        .and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes()));

    let text = match declared {
        Some(encoding) => encoding.decode(&bytes).0.into_owned(),
        None => match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => {
                let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(e.as_bytes());
                decoded.into_owned()
            }
        },
    };
    Some(text)
}

/// Extract the `charset` parameter of a `Content-Type` value.
fn charset_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"'))
        } else {
            None
        }
    })
}

/// Escape the five HTML-sensitive characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Wrap plain text in a minimal styled HTML document, preserving line breaks.
pub fn wrap_plain_text(text: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
	<meta charset="utf-8">
	<title>Email Content</title>
	<style>
		body {{
			font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
			line-height: 1.6;
			max-width: 800px;
			margin: 20px;
			padding: 20px;
		}}
		pre {{
			white-space: pre-wrap;
			word-wrap: break-word;
			background-color: #f5f5f5;
			padding: 15px;
			border-radius: 5px;
			border: 1px solid #ddd;
		}}
	</style>
</head>
<body>
	<pre>{}</pre>
</body>
</html>"#,
        escape_html(text)
    )
}

use anyhow::{Context, Result, anyhow};
use serde_json::Value;

/// Script tag id under which the primary provider ships its page data.
pub const DATA_SCRIPT_ID: &str = "__NEXT_DATA__";

/// Returns the text of the `<script id="...">` block with the given id, parsed as JSON.
/// A page without that block is an error.
pub fn extract_script_json(html: &str, script_id: &str) -> Result<Value> {
    let body = find_script_body(html, script_id)
        .ok_or_else(|| anyhow!("no <script id=\"{script_id}\"> block in page"))?;
    serde_json::from_str::<Value>(body.trim())
        .with_context(|| format!("invalid JSON inside <script id=\"{script_id}\">"))
}

fn find_script_body<'a>(html: &'a str, script_id: &str) -> Option<&'a str> {
    let mut search_from = 0;
    while let Some(start) = html[search_from..].find("<script") {
        let tag_start = search_from + start;
        let tag_end = tag_start + html[tag_start..].find('>')?;
        let open_tag = &html[tag_start..tag_end];
        let body_start = tag_end + 1;
        let body_end = body_start + html[body_start..].find("</script>")?;
        search_from = body_end;

        if tag_has_id(open_tag, script_id) {
            return Some(&html[body_start..body_end]);
        }
    }
    None
}

/// True when the tag carries an `id` attribute whose whole value is `script_id`. Attributes
/// that merely end in `id` (`data-id`) do not count.
fn tag_has_id(open_tag: &str, script_id: &str) -> bool {
    let mut rest = open_tag;
    while let Some(pos) = rest.find("id=") {
        let at_boundary = rest[..pos]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        let after = &rest[pos + 3..];
        if at_boundary && attribute_value(after) == Some(script_id) {
            return true;
        }
        rest = after;
    }
    false
}

fn attribute_value(raw: &str) -> Option<&str> {
    match raw.chars().next()? {
        quote @ ('"' | '\'') => {
            let inner = &raw[1..];
            inner.find(quote).map(|end| &inner[..end])
        }
        _ => raw
            .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .next(),
    }
}

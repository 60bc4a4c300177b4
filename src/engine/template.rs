//! The phase template grammar: "the source repo's
//! mustache-like `{{name}}` substitution; unresolved names become empty
//! strings." No conditionals, no loops, no escaping rules beyond the
//! delimiter pair itself — just name lookup.

use std::collections::HashMap;

/// Render `template`, replacing every `{{name}}` occurrence with
/// `context.get(name)`, or the empty string when `name` is absent. A
/// `{{` with no matching `}}` is copied through verbatim, the way a
/// truncated tag is simplest treated as plain text rather than an error.
pub fn render(template: &str, context: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let name = after_open[..end].trim();
                out.push_str(context.get(name).map(String::as_str).unwrap_or(""));
                rest = &after_open[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after_open;
            }
        }
    }
    out.push_str(rest);
    out
}

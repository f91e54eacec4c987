use std::collections::HashSet;

/// Reduce user HTML to the safe formatting subset (links, emphasis, lists,
/// headings, images). Scripts, event handlers and styles are dropped.
pub fn rich_text(input: &str) -> String {
    ammonia::clean(input.trim())
}

/// Strip every tag, keeping only text. Script and style bodies are dropped
/// with their tags. The result is plain text, not HTML: characters such as
/// `&` and `<` come back as themselves.
pub fn plain_text(input: &str) -> String {
    let dropped: HashSet<&str> = ["script", "style"].into_iter().collect();
    let cleaned = ammonia::Builder::empty()
        .clean_content_tags(dropped)
        .clean(input.trim())
        .to_string();
    unescape_text(&cleaned).trim().to_string()
}

/// Undo the escaping the HTML serializer applies to text nodes. Only these
/// four entities can appear in serialized text; everything else was already
/// decoded by the parser.
fn unescape_text(serialized: &str) -> String {
    const ENTITIES: &[(&str, char)] = &[
        ("&amp;", '&'),
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&nbsp;", '\u{a0}'),
    ];

    let mut out = String::with_capacity(serialized.len());
    let mut rest = serialized;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ENTITIES.iter().find(|(entity, _)| rest.starts_with(entity)) {
            Some((entity, ch)) => {
                out.push(*ch);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

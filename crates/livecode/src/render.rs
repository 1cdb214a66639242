use protocol::Shape;

const SVG_HEADER: &str = concat!(
    r#"<svg width="300" height="300" viewBox="-150 -150 300 300" fill="none" stroke="black" "#,
    r#"xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink">"#,
);

/// Empty 300x300 document served whenever no rendering is available.
pub const DEFAULT_IMAGE: &str = r#"
<svg viewBox="0 0 300 300" width="300" height="300" xmlns="http://www.w3.org/2000/svg">
</svg>
"#;

pub fn render_svg(shapes: &[Shape]) -> String {
    let body = shapes
        .iter()
        .map(render_shape)
        .collect::<Vec<_>>()
        .join("\n");
    format!("{SVG_HEADER}\n{body}\n</svg>\n")
}

pub fn render_shape(shape: &Shape) -> String {
    let attrs = shape
        .attributes
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| {
            format!(
                r#"{}="{}""#,
                name.replace('_', "-"),
                escape_attr(&value.to_string())
            )
        })
        .collect::<Vec<_>>()
        .join(" ");
    let open = if attrs.is_empty() {
        shape.tag.clone()
    } else {
        format!("{} {}", shape.tag, attrs)
    };

    if shape.children.is_empty() {
        return format!("<{open} />");
    }
    let children = shape
        .children
        .iter()
        .map(render_shape)
        .collect::<Vec<_>>()
        .join("\n");
    format!("<{open}>{children}</{}>", shape.tag)
}

pub fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

//! Just enough HTML scanning to pull rendered tables out of judge pages.
//!
//! The pages are machine-generated with a fixed shape, so a full parser is
//! not needed: scan for tag blocks, strip markup from cell interiors and
//! normalize entities/whitespace.

fn to_lower(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() { c.to_ascii_lowercase() } else { c })
        .collect()
}

/// Find the next `open .. close` tag block at or after `from`.
/// Returns byte offsets of the whole block, including the closing tag.
fn next_tag_block(s: &str, open: &str, close: &str, from: usize) -> Option<(usize, usize)> {
    let lc = to_lower(s);
    let start = lc.get(from..)?.find(open)? + from;
    let open_end = s[start..].find('>')? + start + 1;
    let end_rel = lc[open_end..].find(close)?;
    Some((start, open_end + end_rel + close.len()))
}

/// Contents of the opening tag (`<table class="b1">` -> `table class="b1"`).
fn open_tag(block: &str) -> &str {
    match block.find('>') {
        Some(end) => block[1..end].trim_end_matches('/').trim(),
        None => "",
    }
}

/// Inner markup of a block, between the opening and closing tags.
fn inner(block: &str) -> &str {
    let open_end = match block.find('>') {
        Some(i) => i + 1,
        None => return "",
    };
    let close_start = match block.rfind('<') {
        Some(i) if i > open_end => i,
        _ => return "",
    };
    &block[open_end..close_start]
}

fn has_class(tag: &str, class: &str) -> bool {
    let lc = to_lower(tag);
    let rest = match lc.find("class=") {
        Some(i) => &lc[i + "class=".len()..],
        None => return false,
    };
    let value = match rest.chars().next() {
        Some(q @ '"') | Some(q @ '\'') => rest[1..].split(q).next().unwrap_or(""),
        _ => rest.split_whitespace().next().unwrap_or(""),
    };
    value.split_whitespace().any(|c| c == class)
}

pub fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

pub fn normalize_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

fn cell_text(block: &str) -> String {
    normalize_ws(&normalize_entities(&strip_tags(inner(block))))
}

/// `<td>`/`<th>` cells of one row, in document order.
fn row_cells(tr: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut pos = 0;
    loop {
        let td = next_tag_block(tr, "<td", "</td>", pos);
        let th = next_tag_block(tr, "<th", "</th>", pos);
        let block = match (td, th) {
            (Some(a), Some(b)) => {
                if a.0 < b.0 {
                    a
                } else {
                    b
                }
            }
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => break,
        };
        cells.push(cell_text(&tr[block.0..block.1]));
        pos = block.1;
    }
    cells
}

/// Extract the table that belongs to a structural heading.
///
/// The page shape is `<h2>heading</h2> ... <table class="b1">`. If the
/// heading is missing, no table of the expected class follows it, or a
/// different heading intervenes before the table, there is no data to
/// return: the caller treats that as an empty/invalid filter result, not as
/// an error. The returned rows include the header row.
pub fn extract_table(doc: &str, heading: &str, class: &str) -> Option<Vec<Vec<String>>> {
    let mut pos = 0;
    let heading_end = loop {
        let (start, end) = next_tag_block(doc, "<h2", "</h2>", pos)?;
        if cell_text(&doc[start..end]) == heading {
            break end;
        }
        pos = end;
    };

    let mut table = None;
    let mut search = heading_end;
    while let Some((start, end)) = next_tag_block(doc, "<table", "</table>", search) {
        if has_class(open_tag(&doc[start..end]), class) {
            table = Some((start, end));
            break;
        }
        search = end;
    }
    let (table_start, table_end) = table?;

    // Another heading between ours and the table means the table belongs to
    // a different section.
    if let Some((h2_start, _)) = next_tag_block(doc, "<h2", "</h2>", heading_end) {
        if h2_start < table_start {
            return None;
        }
    }

    let table = &doc[table_start..table_end];
    let mut rows = Vec::new();
    let mut pos = 0;
    while let Some((start, end)) = next_tag_block(table, "<tr", "</tr>", pos) {
        let cells = row_cells(&table[start..end]);
        if !cells.is_empty() {
            rows.push(cells);
        }
        pos = end;
    }
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <h2>Submissions</h2>
        <p>filter: none</p>
        <table class="b1">
          <tr><th>Run ID</th><th>User</th></tr>
          <tr><td>12</td><td>alice&nbsp;a</td></tr>
          <tr><td>13</td><td><a href="x">bob</a></td></tr>
        </table>
        <h2>Messages</h2>
        <table class="b1"><tr><td>1</td></tr></table>
        </body></html>
    "#;

    #[test]
    fn extracts_rows_after_heading() {
        let rows = extract_table(PAGE, "Submissions", "b1").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["Run ID", "User"]);
        assert_eq!(rows[1], vec!["12", "alice a"]);
        assert_eq!(rows[2], vec!["13", "bob"]);
    }

    #[test]
    fn second_section_gets_its_own_table() {
        let rows = extract_table(PAGE, "Messages", "b1").unwrap();
        assert_eq!(rows, vec![vec!["1".to_string()]]);
    }

    #[test]
    fn missing_heading_yields_no_data() {
        assert!(extract_table(PAGE, "Standings", "b1").is_none());
    }

    #[test]
    fn missing_table_yields_no_data() {
        let doc = "<h2>Submissions</h2><p>Bad filter expression</p>";
        assert!(extract_table(doc, "Submissions", "b1").is_none());
    }

    #[test]
    fn intervening_heading_yields_no_data() {
        let doc = r#"<h2>Submissions</h2>
            <h2>Messages</h2>
            <table class="b1"><tr><td>1</td></tr></table>"#;
        assert!(extract_table(doc, "Submissions", "b1").is_none());
    }

    #[test]
    fn class_must_match() {
        let doc = r#"<h2>Submissions</h2><table class="menu"><tr><td>x</td></tr></table>"#;
        assert!(extract_table(doc, "Submissions", "b1").is_none());
        let doc = r#"<h2>Submissions</h2><table class=b1><tr><td>x</td></tr></table>"#;
        assert!(extract_table(doc, "Submissions", "b1").is_some());
    }

    #[test]
    fn entities_and_markup_are_stripped() {
        assert_eq!(normalize_entities("a&amp;b&nbsp;c"), "a&b c");
        assert_eq!(strip_tags("<b>bold</b> text"), "bold text");
        assert_eq!(normalize_ws("  a \n b  "), "a b");
    }
}

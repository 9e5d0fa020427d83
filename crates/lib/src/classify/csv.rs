//! Minimal delimited-text parser for tables streamed by the agents.
//!
//! Fields are comma separated. A double quote toggles quoting unless it directly follows a
//! backslash; commas inside quotes are literal. Quote characters are dropped and there is no
//! escape processing beyond that.

use crate::message::CsvTable;

/// Columns the first line must exceed before text is treated as a table.
const MIN_HEADER_FIELDS: usize = 3;

/// True if `text` looks like a table: has commas, a newline, more than one non-blank line, and
/// more than three comma-separated fields on the first line.
pub fn looks_tabular(text: &str) -> bool {
    if !text.contains(',') || !text.contains('\n') {
        return false;
    }
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let Some(first) = lines.next() else {
        return false;
    };
    lines.next().is_some() && first.split(',').count() > MIN_HEADER_FIELDS
}

/// Split one line into trimmed fields.
pub fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut prev: Option<char> = None;
    for c in line.chars() {
        match c {
            '"' if prev != Some('\\') => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
        prev = Some(c);
    }
    fields.push(current.trim().to_string());
    fields
}

/// Parse `text` into a header and rows; blank lines are skipped and every row is padded with
/// empty strings (or truncated) to the header's width. `None` when there is no header line.
pub fn parse_table(text: &str) -> Option<CsvTable> {
    let mut lines = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty());
    let header = split_line(lines.next()?);
    let width = header.len();
    let rows = lines
        .map(|l| {
            let mut row = split_line(l);
            row.resize(width, String::new());
            row
        })
        .collect();
    Some(CsvTable {
        raw: text.to_string(),
        header,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_tables_by_shape() {
        assert!(looks_tabular("a,b,c,d\n1,2,3,4"));
        assert!(!looks_tabular("a,b,c\n1,2,3"));
        assert!(!looks_tabular("a,b,c,d"));
        assert!(!looks_tabular("hello, world\nsecond line"));
        assert!(!looks_tabular("a,b,c,d\n\n"));
    }

    #[test]
    fn quoted_fields_keep_commas() {
        assert_eq!(
            split_line(r#"vm-1,"Downgrade, then resize",0%"#),
            vec!["vm-1", "Downgrade, then resize", "0%"]
        );
    }

    #[test]
    fn escaped_quote_does_not_toggle() {
        assert_eq!(split_line(r#"a,b\"c,d"#), vec!["a", r#"b\"c"#, "d"]);
        assert_eq!(split_line(r#"x,\"y,z"#), vec!["x", r#"\"y"#, "z"]);
    }

    #[test]
    fn rows_are_padded_and_truncated() {
        let t = parse_table("a,b,c,d\n1,2\n1,2,3,4,5\n").unwrap();
        assert_eq!(t.header, vec!["a", "b", "c", "d"]);
        assert_eq!(t.rows, vec![vec!["1", "2", "", ""], vec!["1", "2", "3", "4"]]);
    }

    #[test]
    fn crlf_and_blank_lines() {
        let t = parse_table("vm_name,cpu,net,disk\r\n\r\nvm-1,1%,Low,Low\r\n").unwrap();
        assert_eq!(t.rows.len(), 1);
        assert_eq!(t.rows[0][3], "Low");
    }

    #[test]
    fn empty_text_has_no_table() {
        assert!(parse_table("").is_none());
        assert!(parse_table("\n \n").is_none());
    }
}

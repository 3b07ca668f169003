//! Minimal CSV line handling shared by the fix store and the result ledger.
//! RFC 4180 quoting for single-line records; embedded newlines are not read back.

/// Quote a field if it contains a delimiter, quote or line break.
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn join_record<S: AsRef<str>>(fields: &[S]) -> String {
    fields.iter().map(|f| escape_field(f.as_ref())).collect::<Vec<_>>().join(",")
}

/// Split one line into fields, honouring quotes and doubled quotes.
pub fn split_record(line: &str) -> Vec<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if current.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fields_are_untouched() {
        assert_eq!(join_record(&["m1", "5.00", "None"]), "m1,5.00,None");
        assert_eq!(split_record("m1,5.00,None\r\n"), vec!["m1", "5.00", "None"]);
    }

    #[test]
    fn commas_and_quotes_are_quoted() {
        let line = join_record(&["route \"north\", loop", "1"]);
        assert_eq!(line, "\"route \"\"north\"\", loop\",1");
        assert_eq!(split_record(&line), vec!["route \"north\", loop", "1"]);
    }

    #[test]
    fn empty_fields_survive() {
        assert_eq!(split_record("a,,c,"), vec!["a", "", "c", ""]);
    }
}

//! Raw extract → raw records, with encoding and delimiter auto-detection.
//!
//! A raw record is a JSON object keyed by the original header text. Values
//! stay untyped (`null` for empty cells); typing is the cleaner's job.
//! Rows that cannot be read as a record are dropped and counted here.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{CsvError, CsvResult};

/// Number of dropped rows kept verbatim for the run report.
pub const SKIPPED_SAMPLE: usize = 10;

/// A row that could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    /// 1-based line (CSV) or element index (JSON).
    pub line: usize,
    pub reason: String,
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Parsed rows as JSON objects
    pub records: Vec<Value>,
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    /// Rows dropped as malformed
    pub dropped: usize,
    /// First few dropped rows
    pub skipped: Vec<SkippedRow>,
}

impl ParseResult {
    fn skip(&mut self, line: usize, reason: impl Into<String>) {
        self.dropped += 1;
        if self.skipped.len() < SKIPPED_SAMPLE {
            self.skipped.push(SkippedRow {
                line,
                reason: reason.into(),
            });
        }
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the given encoding. Unknown encodings fall back to lossy UTF-8.
///
/// Latin-1 goes through the windows-1252 table, which agrees with
/// ISO-8859-1 on every printable byte.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
            encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };

    match decoded.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => decoded,
    }
}

/// Detect the delimiter by counting occurrences in the first line.
/// Defaults to a comma when no candidate occurs.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse delimited text with a header row.
///
/// Quoted fields may contain the delimiter. A row whose field count
/// differs from the header is dropped and counted; blank lines are ignored.
pub fn parse_csv_str(content: &str, delimiter: char, encoding: String) -> CsvResult<ParseResult> {
    if !delimiter.is_ascii() {
        return Err(CsvError::new(0, "Delimiter must be a single ASCII character")
            .with_value(delimiter.to_string()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| CsvError::new(1, format!("Cannot read header: {}", e)))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::new(1, "Empty CSV file: no headers found"));
    }

    let mut result = ParseResult {
        records: Vec::new(),
        encoding,
        delimiter,
        headers,
        dropped: 0,
        skipped: Vec::new(),
    };

    for (idx, row) in reader.records().enumerate() {
        let fallback_line = idx + 2;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(fallback_line);
                result.skip(line, e.to_string());
                continue;
            }
        };
        let line = row
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(fallback_line);

        // whitespace-only line
        if row.iter().all(str::is_empty) {
            continue;
        }

        if row.len() != result.headers.len() {
            result.skip(
                line,
                format!("expected {} fields, found {}", result.headers.len(), row.len()),
            );
            continue;
        }

        let mut obj = Map::new();
        for (header, raw) in result.headers.iter().zip(row.iter()) {
            let value = if raw.is_empty() {
                Value::Null
            } else {
                Value::String(raw.to_string())
            };
            obj.insert(header.clone(), value);
        }
        result.records.push(Value::Object(obj));
    }

    Ok(result)
}

/// Parse a JSON array of row objects. Non-object elements are dropped and counted.
pub fn parse_json_str(content: &str) -> CsvResult<ParseResult> {
    let rows: Vec<Value> = serde_json::from_str(content)
        .map_err(|e| CsvError::new(e.line(), format!("Invalid JSON input: {}", e)))?;

    let mut result = ParseResult {
        records: Vec::with_capacity(rows.len()),
        encoding: "utf-8".to_string(),
        delimiter: ',',
        headers: Vec::new(),
        dropped: 0,
        skipped: Vec::new(),
    };

    for (idx, row) in rows.into_iter().enumerate() {
        match row {
            Value::Object(obj) => {
                for key in obj.keys() {
                    if !result.headers.contains(key) {
                        result.headers.push(key.clone());
                    }
                }
                result.records.push(Value::Object(obj));
            }
            other => result.skip(idx + 1, format!("not an object: {}", other)),
        }
    }

    Ok(result)
}

/// Parse raw bytes with auto-detection of format, encoding and delimiter.
///
/// Input whose first non-blank character is `[` is read as JSON rows.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<ParseResult> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    parse_content(&content, None, encoding)
}

/// Parse bytes with an optional explicit encoding and delimiter.
pub fn parse_bytes(
    bytes: &[u8],
    encoding: Option<&str>,
    delimiter: Option<char>,
) -> CsvResult<ParseResult> {
    let encoding = encoding
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| detect_encoding(bytes));
    let content = decode_content(bytes, &encoding);
    parse_content(&content, delimiter, encoding)
}

fn parse_content(content: &str, delimiter: Option<char>, encoding: String) -> CsvResult<ParseResult> {
    if content.trim().is_empty() {
        return Err(CsvError::new(1, "Empty CSV file"));
    }
    if content.trim_start().starts_with('[') {
        return parse_json_str(content);
    }
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(content));
    parse_csv_str(content, delimiter, encoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(csv: &str) -> ParseResult {
        parse_bytes_auto(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_simple_csv() {
        let result = parse("Make,Model\nTESLA,MODEL 3\nNISSAN,LEAF");

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.delimiter, ',');
        assert_eq!(result.records[0]["Make"], "TESLA");
        assert_eq!(result.records[1]["Model"], "LEAF");
    }

    #[test]
    fn test_quoted_delimiter_stays_in_field() {
        let result = parse("City,Vehicle Location\nSeattle,\"POINT (-122.3, 47.6)\"");

        assert_eq!(result.records[0]["Vehicle Location"], "POINT (-122.3, 47.6)");
        assert_eq!(result.dropped, 0);
    }

    #[test]
    fn test_empty_cells_become_null() {
        let result = parse("Make,Electric Range\nNISSAN,");
        assert!(result.records[0]["Electric Range"].is_null());
    }

    #[test]
    fn test_malformed_rows_dropped_and_counted() {
        let result = parse("a,b,c\n1,2,3\n4,5\n6,7,8,9\n10,11,12");

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.dropped, 2);
        assert_eq!(result.skipped[0].line, 3);
        assert!(result.skipped[0].reason.contains("expected 3"));
    }

    #[test]
    fn test_blank_lines_not_counted() {
        let result = parse("a,b\n1,2\n\n3,4\n");
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.dropped, 0);
    }

    #[test]
    fn test_whitespace_only_lines_not_counted() {
        let result = parse("a,b\n1,2\n   \n3,4\n");
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.dropped, 0);
        assert_eq!(result.records[1]["a"], "3");
    }

    #[test]
    fn test_empty_input_error() {
        let err = parse_bytes_auto(b"").unwrap_err();
        assert!(err.message.contains("Empty"));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a|b|c"), '|');
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_explicit_delimiter_override() {
        let result = parse_bytes(b"a;b\n1;2", None, Some(';')).unwrap();
        assert_eq!(result.records[0]["b"], "2");
    }

    #[test]
    fn test_bom_stripped_from_header() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"Make,Model\nKIA,EV6");
        let result = parse_bytes(&bytes, Some("utf-8"), None).unwrap();
        assert_eq!(result.headers[0], "Make");
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_latin1_currency_sign() {
        assert_eq!(decode_content(&[0xA4], "iso-8859-1"), "\u{a4}");
        assert_eq!(decode_content(&[0x41, 0xBD], "latin1"), "A\u{bd}");
    }

    #[test]
    fn test_json_rows() {
        let result = parse(r#"[{"Make": "TESLA", "Electric Range": 250}, 42, {"Make": null}]"#);

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.dropped, 1);
        assert_eq!(result.skipped[0].line, 2);
        assert_eq!(result.headers.len(), 2);
        assert!(result.headers.contains(&"Electric Range".to_string()));
    }
}

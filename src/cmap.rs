//! `/ToUnicode` CMap parsing: character codes to Unicode text.

use std::collections::HashMap;

/// Mappings from `bfchar` and `bfrange` sections. Malformed entries are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ToUnicodeMap {
    mappings: HashMap<u32, String>,
}

impl ToUnicodeMap {
    pub fn parse(data: &[u8]) -> Self {
        let text = String::from_utf8_lossy(data);
        let mut mappings = HashMap::new();

        for section in sections(&text, "beginbfchar", "endbfchar") {
            for line in section.lines() {
                let tokens = hex_tokens(line);
                if let [source, target, ..] = tokens.as_slice()
                    && let (Some(code), Some(value)) = (parse_code(source), decode_utf16be(target))
                {
                    mappings.insert(code, value);
                }
            }
        }

        for section in sections(&text, "beginbfrange", "endbfrange") {
            for line in section.lines() {
                parse_range_line(line, &mut mappings);
            }
        }

        Self { mappings }
    }

    pub fn lookup(&self, code: u32) -> Option<&str> {
        self.mappings.get(&code).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

fn sections<'t>(text: &'t str, begin: &str, end: &str) -> Vec<&'t str> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(begin) {
        let body = &rest[start + begin.len()..];
        let Some(stop) = body.find(end) else {
            break;
        };
        found.push(&body[..stop]);
        rest = &body[stop + end.len()..];
    }
    found
}

fn hex_tokens(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = line;
    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start + 1..].find('>') else {
            break;
        };
        tokens.push(rest[start + 1..start + 1 + len].trim());
        rest = &rest[start + 1 + len + 1..];
    }
    tokens
}

fn parse_code(hex: &str) -> Option<u32> {
    u32::from_str_radix(hex, 16).ok()
}

fn decode_utf16be(hex: &str) -> Option<String> {
    let hex = if hex.len() == 2 {
        format!("00{hex}")
    } else {
        hex.to_string()
    };
    if hex.is_empty() || hex.len() % 4 != 0 {
        return None;
    }

    let units = hex
        .as_bytes()
        .chunks(4)
        .map(|chunk| {
            std::str::from_utf8(chunk)
                .ok()
                .and_then(|unit| u16::from_str_radix(unit, 16).ok())
        })
        .collect::<Option<Vec<_>>>()?;
    String::from_utf16(&units).ok()
}

/// Either `<lo> <hi> <start>` or `<lo> <hi> [<a> <b> ...]`.
fn parse_range_line(line: &str, mappings: &mut HashMap<u32, String>) {
    if let Some(bracket) = line.find('[') {
        let bounds = hex_tokens(&line[..bracket]);
        let [low, high, ..] = bounds.as_slice() else {
            return;
        };
        let (Some(low), Some(high)) = (parse_code(low), parse_code(high)) else {
            return;
        };
        for (code, target) in (low..=high).zip(hex_tokens(&line[bracket..])) {
            if let Some(value) = decode_utf16be(target) {
                mappings.insert(code, value);
            }
        }
        return;
    }

    let tokens = hex_tokens(line);
    let [low, high, start, ..] = tokens.as_slice() else {
        return;
    };
    let (Some(low), Some(high), Some(start)) = (parse_code(low), parse_code(high), parse_code(start))
    else {
        return;
    };
    if high < low {
        return;
    }
    for offset in 0..=(high - low) {
        if let Some(ch) = start.checked_add(offset).and_then(char::from_u32) {
            mappings.insert(low + offset, ch.to_string());
        }
    }
}

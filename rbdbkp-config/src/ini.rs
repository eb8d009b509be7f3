use std::collections::BTreeMap;

use anyhow::{bail, Error};

/// A bare-bones ini-style parser: `[section]` headers, `key = value` or
/// `key: value` entries (mirroring Python's `configparser`, which accepts
/// both delimiters), `#`/`;` full-line comments, blank lines ignored.
///
/// Keys that appear before any `[section]` header land in the pseudo
/// section named `""`; rbd-backup's config has no such preamble, but
/// tolerating it avoids a surprising parse error on a stray blank config.
pub fn parse_ini(content: &str) -> Result<BTreeMap<String, BTreeMap<String, String>>, Error> {
    let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut current = String::new();
    sections.insert(current.clone(), BTreeMap::new());

    for (lineno, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            let Some(end) = line.find(']') else {
                bail!("line {}: unterminated section header {:?}", lineno + 1, raw_line);
            };
            current = line[1..end].trim().to_string();
            sections.entry(current.clone()).or_default();
            continue;
        }
        let sep = line
            .find('=')
            .map(|p| (p, '='))
            .into_iter()
            .chain(line.find(':').map(|p| (p, ':')))
            .min_by_key(|(p, _)| *p);
        let Some((pos, _)) = sep else {
            bail!("line {}: expected \"key = value\", got {:?}", lineno + 1, raw_line);
        };
        let key = line[..pos].trim().to_string();
        let value = line[pos + 1..].trim().to_string();
        sections
            .entry(current.clone())
            .or_default()
            .insert(key, value);
    }

    Ok(sections)
}

/// Split a comma-separated config value into trimmed, non-empty parts.
pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Python `configparser.getboolean` semantics: yes/no, true/false, on/off, 1/0.
pub fn parse_bool(value: &str) -> Result<bool, Error> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        other => bail!("not a boolean: {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_keys() {
        let text = "\
[global]
ceph_backup_pool = backup
verify_ssl: false

[11111111-1111-1111-1111-111111111111]
ignore = true
";
        let parsed = parse_ini(text).unwrap();
        assert_eq!(parsed["global"]["ceph_backup_pool"], "backup");
        assert_eq!(parsed["global"]["verify_ssl"], "false");
        assert_eq!(
            parsed["11111111-1111-1111-1111-111111111111"]["ignore"],
            "true"
        );
    }

    #[test]
    fn rejects_garbage_line() {
        assert!(parse_ini("[global]\nnotakeyvalue\n").is_err());
    }
}

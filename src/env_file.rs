//! `.env` loading: `KEY=value` lines, optional `export`, quotes and `#` comments.
//! Variables already present in the process environment always win.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Load `path` into the process environment and return how many variables were set.
pub fn load(path: &Path) -> Result<usize, String> {
    let file = File::open(path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
    let mut applied = 0;

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| format!("failed to read {} at line {}: {}", path.display(), index + 1, e))?;
        let Some((key, value)) = parse_line(&line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?
        else {
            continue;
        };
        if std::env::var_os(&key).is_none() {
            // Updating process-level environment variables is unsafe on some targets.
            // This runs before any other thread is spawned.
            unsafe {
                std::env::set_var(key, value);
            }
            applied += 1;
        }
    }

    Ok(applied)
}

/// Parse one line; `Ok(None)` for blanks and comments.
pub fn parse_line(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let assignment = trimmed
        .strip_prefix("export ")
        .map(str::trim_start)
        .unwrap_or(trimmed);
    let (key, raw_value) = assignment
        .split_once('=')
        .ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.chars().any(char::is_whitespace) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }

    Ok(Some((key.to_string(), parse_value(raw_value)?)))
}

fn parse_value(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix('"') {
        parse_quoted(rest, '"', true)
    } else if let Some(rest) = trimmed.strip_prefix('\'') {
        parse_quoted(rest, '\'', false)
    } else {
        let value = trimmed.split_once(" #").map(|(v, _)| v).unwrap_or(trimmed);
        Ok(value.trim_end().to_string())
    }
}

fn parse_quoted(input: &str, quote: char, escapes: bool) -> Result<String, String> {
    let mut value = String::new();
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        if escapes && ch == '\\' {
            let escaped = chars
                .next()
                .ok_or_else(|| "unterminated escape sequence in double-quoted value".to_string())?;
            value.push(match escaped {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                other => other,
            });
        } else if ch == quote {
            let remainder = chars.as_str().trim();
            return if remainder.is_empty() || remainder.starts_with('#') {
                Ok(value)
            } else {
                Err(format!("unexpected characters after closing {} quote", quote))
            };
        } else {
            value.push(ch);
        }
    }

    Err(format!("unterminated {}-quoted value", quote))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(k: &str, v: &str) -> Option<(String, String)> {
        Some((k.to_string(), v.to_string()))
    }

    #[test]
    fn plain_and_exported_assignments() {
        assert_eq!(parse_line("SUPABASE_URL=https://x.supabase.co"), Ok(pair("SUPABASE_URL", "https://x.supabase.co")));
        assert_eq!(parse_line("export REFRESH_INTERVAL_SECS = 5"), Ok(pair("REFRESH_INTERVAL_SECS", "5")));
        assert_eq!(parse_line("HISTORY_LIMIT=500 # rows"), Ok(pair("HISTORY_LIMIT", "500")));
        assert_eq!(parse_line("EMPTY="), Ok(pair("EMPTY", "")));
    }

    #[test]
    fn blanks_and_comments() {
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("   # comment"), Ok(None));
    }

    #[test]
    fn quoted_values() {
        assert_eq!(parse_line(r#"KEY="a b\tc" # note"#), Ok(pair("KEY", "a b\tc")));
        assert_eq!(parse_line(r"KEY='raw\n'"), Ok(pair("KEY", r"raw\n")));
        assert_eq!(parse_line(r#"URL="postgres://u:p@h/db?x=1#y""#), Ok(pair("URL", "postgres://u:p@h/db?x=1#y")));
    }

    #[test]
    fn malformed_lines() {
        assert!(parse_line("NO_EQUALS").is_err());
        assert!(parse_line("=value").is_err());
        assert!(parse_line("BAD KEY=1").is_err());
        assert!(parse_line(r#"KEY="open"#).is_err());
        assert!(parse_line(r#"KEY="done" trailing"#).is_err());
    }
}

//! Output formatting: json, min-json, yaml, text, and log.

use std::io::Write;
use std::str::FromStr;

use serde_json::Value;

use crate::error::CliError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    MinJson,
    Yaml,
    Text,
    Log,
}

impl FromStr for Format {
    type Err = CliError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "min-json" | "minjson" => Ok(Self::MinJson),
            "yaml" => Ok(Self::Yaml),
            "text" => Ok(Self::Text),
            "log" => Ok(Self::Log),
            other => Err(CliError::Flag(format!("unknown output format {other:?}"))),
        }
    }
}

impl Format {
    /// Emit one record. `msg` describes the record for the human-facing
    /// formats; `field` names the value in the log format.
    pub fn emit(&self, msg: &str, field: &str, value: &Value) {
        match self {
            Self::Json => {
                println!("{}", serde_json::to_string_pretty(value).expect("value serializes"));
            }
            Self::MinJson => {
                println!("{}", serde_json::to_string(value).expect("value serializes"));
            }
            Self::Yaml => {
                print!("{}", serde_yaml::to_string(value).expect("value serializes"));
            }
            Self::Text => {
                let mut stdout = std::io::stdout().lock();
                let _ = writeln!(stdout, "{msg}:");
                if is_empty_value(value) {
                    let _ = writeln!(stdout, "  success");
                } else {
                    let _ = write_text(&mut stdout, value, 1);
                }
                let _ = writeln!(stdout);
            }
            Self::Log => {
                tracing::info!(field, value = %value, "{msg}");
            }
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn write_text(out: &mut impl Write, value: &Value, depth: usize) -> std::io::Result<()> {
    let indent = "  ".repeat(depth);
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let label = prettify_key(key);
                match child {
                    Value::Object(inner) if !inner.is_empty() => {
                        writeln!(out, "{indent}{label}:")?;
                        write_text(out, child, depth + 1)?;
                    }
                    Value::Array(items) if !items.is_empty() => {
                        writeln!(out, "{indent}{label}:")?;
                        for item in items {
                            match item {
                                Value::Object(_) => {
                                    writeln!(out, "{indent}  -")?;
                                    write_text(out, item, depth + 2)?;
                                }
                                other => writeln!(out, "{indent}  - {}", scalar(other))?,
                            }
                        }
                    }
                    other => writeln!(out, "{indent}{label}: {}", scalar(other))?,
                }
            }
        }
        other => writeln!(out, "{indent}{}", scalar(other))?,
    }
    Ok(())
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) if items.is_empty() => "NULL".to_string(),
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        other => other.to_string(),
    }
}

/// `auto_off_delay` → `Auto Off Delay`.
fn prettify_key(key: &str) -> String {
    key.split(['_', ':'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn formats_parse_by_name() {
        assert_eq!(Format::from_str("json").unwrap(), Format::Json);
        assert_eq!(Format::from_str("min-json").unwrap(), Format::MinJson);
        assert_eq!(Format::from_str("YAML").unwrap(), Format::Yaml);
        assert!(Format::from_str("xml").is_err());
    }

    #[test]
    fn text_renderer_walks_nested_values() {
        let mut buf = Vec::new();
        write_text(
            &mut buf,
            &json!({
                "output": true,
                "aenergy": {"total": 5.5, "by_minute": [0.1, 0.2]},
                "errors": []
            }),
            1,
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("  Output: true"));
        assert!(text.contains("  Aenergy:"));
        assert!(text.contains("    Total: 5.5"));
        assert!(text.contains("    - 0.1"));
        assert!(text.contains("  Errors: NULL"));
    }

    #[test]
    fn keys_are_prettified() {
        assert_eq!(prettify_key("auto_off_delay"), "Auto Off Delay");
        assert_eq!(prettify_key("switch:0"), "Switch 0");
    }
}

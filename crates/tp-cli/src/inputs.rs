// SPDX-License-Identifier: MIT OR Apache-2.0
//! Input values files.
//!
//! `--inputs` accepts a flat key → value document in TOML, YAML, or JSON.
//! Keys may be bare declared names (`NumOfSegments`) or canonical ids
//! (`Input:NumOfSegments`); bare keys are canonicalized to the root
//! namespace.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Parse an inputs file into canonical-id-keyed values.
pub fn parse_inputs_file(path: &Path) -> Result<BTreeMap<String, Value>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read inputs file {}", path.display()))?;
    let raw: BTreeMap<String, Value> = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&text)
            .with_context(|| format!("parse {} as JSON", path.display()))?,
        Some("toml") => {
            toml::from_str(&text).with_context(|| format!("parse {} as TOML", path.display()))?
        }
        Some("yaml") | Some("yml") => serde_yml::from_str(&text)
            .with_context(|| format!("parse {} as YAML", path.display()))?,
        other => bail!(
            "unsupported inputs file extension {:?} for {}",
            other.unwrap_or(""),
            path.display()
        ),
    };
    Ok(canonicalize_keys(raw))
}

/// Prefix bare keys with `Input:`; canonical keys pass through.
pub fn canonicalize_keys(raw: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    raw.into_iter()
        .map(|(key, value)| {
            let key = if key.contains(':') {
                key
            } else {
                format!("Input:{key}")
            };
            (key, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn toml_inputs_canonicalize_bare_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(
            tmp.path(),
            "inputs.toml",
            "InquiryPrompt = \"Darwin\"\nNumOfSegments = 2\n",
        );
        let values = parse_inputs_file(&path).unwrap();
        assert_eq!(values["Input:InquiryPrompt"], json!("Darwin"));
        assert_eq!(values["Input:NumOfSegments"], json!(2));
    }

    #[test]
    fn yaml_inputs_keep_canonical_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(
            tmp.path(),
            "inputs.yaml",
            "\"Input:Language\": en\nVoiceId: alloy\n",
        );
        let values = parse_inputs_file(&path).unwrap();
        assert_eq!(values["Input:Language"], json!("en"));
        assert_eq!(values["Input:VoiceId"], json!("alloy"));
    }

    #[test]
    fn json_inputs_parse() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "inputs.json", r#"{"NumOfSegments": 3}"#);
        let values = parse_inputs_file(&path).unwrap();
        assert_eq!(values["Input:NumOfSegments"], json!(3));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "inputs.ini", "a=1");
        assert!(parse_inputs_file(&path).is_err());
    }
}

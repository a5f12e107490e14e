// SPDX-License-Identifier: MIT OR Apache-2.0
//! Blueprint document loading.
//!
//! Loads a root document and, recursively, every referenced sub-blueprint
//! from `<parent-dir>/<name>.<ext>`, trying the parent's extension first.
//! A visiting set over canonicalized paths catches reference cycles.

use crate::BlueprintError;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tp_core::{BlueprintDoc, BlueprintTreeNode, DimensionDecl};
use tracing::debug;

/// Load a blueprint tree rooted at the given document path.
pub fn load_blueprint(path: &Path) -> Result<BlueprintTreeNode, BlueprintError> {
    let mut visiting = HashSet::new();
    load_node(path, Vec::new(), None, None, &mut visiting)
}

fn load_node(
    path: &Path,
    namespace_path: Vec<String>,
    expected_id: Option<&str>,
    dimension: Option<DimensionDecl>,
    visiting: &mut HashSet<PathBuf>,
) -> Result<BlueprintTreeNode, BlueprintError> {
    let canonical = path.canonicalize().map_err(|e| BlueprintError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    if !visiting.insert(canonical.clone()) {
        return Err(BlueprintError::CircularSubBlueprint {
            path: path.display().to_string(),
        });
    }

    let document = parse_document(path)?;
    if let Some(expected) = expected_id {
        if document.meta.id != expected {
            return Err(BlueprintError::IdMismatch {
                expected: expected.to_string(),
                found: document.meta.id.clone(),
                path: path.display().to_string(),
            });
        }
    }
    debug!(
        target: "tp.blueprint",
        id = %document.meta.id,
        path = %path.display(),
        namespace = %namespace_path.join("."),
        "blueprint document loaded"
    );

    let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let parent_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("toml")
        .to_string();

    let mut children = BTreeMap::new();
    for sub in &document.sub_blueprints {
        let (base_name, symbol) = split_ref_dimension(&sub.name);
        let child_dimension = match symbol {
            Some(sym) => {
                let count_input =
                    sub.count_input
                        .clone()
                        .ok_or_else(|| BlueprintError::IndexedRefWithoutCount {
                            name: sub.name.clone(),
                        })?;
                Some(DimensionDecl {
                    symbol: sym.to_string(),
                    count_input,
                })
            }
            None => None,
        };

        let child_path = resolve_child_path(parent_dir, &parent_ext, base_name, sub.path.as_deref())?;
        let mut child_ns = namespace_path.clone();
        child_ns.push(base_name.to_string());
        let child = load_node(
            &child_path,
            child_ns,
            Some(base_name),
            child_dimension,
            visiting,
        )?;
        children.insert(base_name.to_string(), child);
    }

    visiting.remove(&canonical);
    Ok(BlueprintTreeNode {
        id: document.meta.id.clone(),
        namespace_path,
        document,
        children,
        dimension,
    })
}

/// Split `Scene[i]` into (`Scene`, `Some("i")`); plain names pass through.
fn split_ref_dimension(name: &str) -> (&str, Option<&str>) {
    match (name.find('['), name.ends_with(']')) {
        (Some(open), true) => (&name[..open], Some(&name[open + 1..name.len() - 1])),
        _ => (name, None),
    }
}

fn resolve_child_path(
    parent_dir: &Path,
    parent_ext: &str,
    name: &str,
    explicit: Option<&str>,
) -> Result<PathBuf, BlueprintError> {
    if let Some(rel) = explicit {
        let p = parent_dir.join(rel);
        if p.is_file() {
            return Ok(p);
        }
        return Err(BlueprintError::MissingSubBlueprint {
            name: name.to_string(),
            tried: vec![p.display().to_string()],
        });
    }
    // Parent's extension first, then the other supported encodings.
    let mut candidates = vec![parent_ext.to_string()];
    for ext in ["toml", "yaml", "yml"] {
        if ext != parent_ext {
            candidates.push(ext.to_string());
        }
    }
    let mut tried = Vec::new();
    for ext in &candidates {
        let p = parent_dir.join(format!("{name}.{ext}"));
        if p.is_file() {
            return Ok(p);
        }
        tried.push(p.display().to_string());
    }
    Err(BlueprintError::MissingSubBlueprint {
        name: name.to_string(),
        tried,
    })
}

/// Parse one document, choosing the parser by file extension.
pub fn parse_document(path: &Path) -> Result<BlueprintDoc, BlueprintError> {
    let text = fs::read_to_string(path).map_err(|e| BlueprintError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&text).map_err(|e| BlueprintError::Parse {
            path: path.display().to_string(),
            detail: e.to_string(),
        }),
        Some("yaml") | Some("yml") => {
            serde_yml::from_str(&text).map_err(|e| BlueprintError::Parse {
                path: path.display().to_string(),
                detail: e.to_string(),
            })
        }
        _ => Err(BlueprintError::UnsupportedExtension {
            path: path.display().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    const ROOT_TOML: &str = r#"
        [meta]
        id = "root"
        name = "Root"

        [[inputs]]
        name = "NumOfScenes"
        type = "number"

        [[subBlueprints]]
        name = "Scene[i]"
        countInput = "NumOfScenes"
    "#;

    const SCENE_TOML: &str = r#"
        [meta]
        id = "Scene"
        name = "Scene"

        [[inputs]]
        name = "Style"
        type = "string"
    "#;

    #[test]
    fn loads_nested_tree_with_dimension() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(tmp.path(), "Scene.toml", SCENE_TOML);
        let root = write_file(tmp.path(), "root.toml", ROOT_TOML);

        let tree = load_blueprint(&root).unwrap();
        assert_eq!(tree.id, "root");
        assert!(tree.namespace_path.is_empty());
        let scene = &tree.children["Scene"];
        assert_eq!(scene.namespace_path, vec!["Scene".to_string()]);
        let dim = scene.dimension.as_ref().unwrap();
        assert_eq!(dim.symbol, "i");
        assert_eq!(dim.count_input, "NumOfScenes");
    }

    #[test]
    fn yaml_child_is_found_from_toml_parent() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(
            tmp.path(),
            "Scene.yaml",
            r#"
meta:
  id: Scene
  name: Scene
inputs:
  - name: Style
    type: string
"#,
        );
        let root = write_file(tmp.path(), "root.toml", ROOT_TOML);
        let tree = load_blueprint(&root).unwrap();
        assert_eq!(tree.children["Scene"].document.inputs[0].name, "Style");
    }

    #[test]
    fn id_mismatch_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(
            tmp.path(),
            "Scene.toml",
            r#"
            [meta]
            id = "NotScene"
            name = "Scene"
            "#,
        );
        let root = write_file(tmp.path(), "root.toml", ROOT_TOML);
        assert!(matches!(
            load_blueprint(&root),
            Err(BlueprintError::IdMismatch { .. })
        ));
    }

    #[test]
    fn missing_child_lists_candidates() {
        let tmp = tempfile::tempdir().unwrap();
        let root = write_file(tmp.path(), "root.toml", ROOT_TOML);
        let err = load_blueprint(&root).unwrap_err();
        match err {
            BlueprintError::MissingSubBlueprint { name, tried } => {
                assert_eq!(name, "Scene");
                assert_eq!(tried.len(), 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn circular_reference_is_detected() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(
            tmp.path(),
            "a.toml",
            r#"
            [meta]
            id = "a"
            name = "A"

            [[subBlueprints]]
            name = "b"
            "#,
        );
        write_file(
            tmp.path(),
            "b.toml",
            r#"
            [meta]
            id = "b"
            name = "B"

            [[subBlueprints]]
            name = "a"
            "#,
        );
        let err = load_blueprint(&tmp.path().join("a.toml")).unwrap_err();
        assert!(matches!(err, BlueprintError::CircularSubBlueprint { .. }));
    }

    #[test]
    fn indexed_ref_requires_count_input() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(tmp.path(), "Scene.toml", SCENE_TOML);
        let root = write_file(
            tmp.path(),
            "root.toml",
            r#"
            [meta]
            id = "root"
            name = "Root"

            [[subBlueprints]]
            name = "Scene[i]"
            "#,
        );
        assert!(matches!(
            load_blueprint(&root),
            Err(BlueprintError::IndexedRefWithoutCount { .. })
        ));
    }

    #[test]
    fn explicit_child_path_is_honored() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("parts")).unwrap();
        write_file(&tmp.path().join("parts"), "scene-def.toml", SCENE_TOML);
        let root = write_file(
            tmp.path(),
            "root.toml",
            r#"
            [meta]
            id = "root"
            name = "Root"

            [[subBlueprints]]
            name = "Scene"
            path = "parts/scene-def.toml"
            "#,
        );
        let tree = load_blueprint(&root).unwrap();
        assert!(tree.children.contains_key("Scene"));
    }

    #[test]
    fn split_ref_dimension_parses_suffix() {
        assert_eq!(split_ref_dimension("Scene[i]"), ("Scene", Some("i")));
        assert_eq!(split_ref_dimension("Scene"), ("Scene", None));
    }
}

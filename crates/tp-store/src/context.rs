// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-movie storage layout.
//!
//! Every movie's state lives under a single directory named by its id:
//!
//! ```text
//! <movie>/events/inputs.log
//! <movie>/events/artefacts.log
//! <movie>/blobs/<first-two-hex>/<hash>[.<ext>]
//! <movie>/manifests/<revision>.json
//! <movie>/runs/<revision>-plan.json
//! <movie>/current.json
//! <movie>/inputs.yaml
//! ```

use std::fmt;

/// Resolves logical paths for a movie's blobs, events, runs, and manifests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageContext {
    movie_id: String,
}

impl StorageContext {
    /// Create a context for one movie.
    pub fn new(movie_id: impl Into<String>) -> Self {
        Self {
            movie_id: movie_id.into(),
        }
    }

    /// The movie id this context resolves for.
    #[must_use]
    pub fn movie_id(&self) -> &str {
        &self.movie_id
    }

    /// Join arbitrary segments beneath the movie root.
    #[must_use]
    pub fn resolve(&self, segments: &[&str]) -> String {
        let mut path = self.movie_id.clone();
        for s in segments {
            path.push('/');
            path.push_str(s);
        }
        path
    }

    /// Path of the input event log.
    #[must_use]
    pub fn inputs_log(&self) -> String {
        self.resolve(&["events", "inputs.log"])
    }

    /// Path of the artefact event log.
    #[must_use]
    pub fn artefacts_log(&self) -> String {
        self.resolve(&["events", "artefacts.log"])
    }

    /// Content-addressed blob path: `blobs/<pp>/<hash>[.<ext>]`.
    ///
    /// `pp` is the first two hex characters of the hash. The extension is
    /// derived from the mime type when known, else omitted.
    #[must_use]
    pub fn blob_path(&self, hash: &str, mime_type: &str) -> String {
        let prefix = &hash[..hash.len().min(2)];
        let name = match extension_for_mime(mime_type) {
            Some(ext) => format!("{hash}.{ext}"),
            None => hash.to_string(),
        };
        self.resolve(&["blobs", prefix, &name])
    }

    /// Legacy blob path without an extension.
    #[must_use]
    pub fn blob_path_bare(&self, hash: &str) -> String {
        let prefix = &hash[..hash.len().min(2)];
        self.resolve(&["blobs", prefix, hash])
    }

    /// Path of a manifest snapshot.
    #[must_use]
    pub fn manifest_path(&self, revision: impl fmt::Display) -> String {
        self.resolve(&["manifests", &format!("{revision}.json")])
    }

    /// Path of a persisted execution plan.
    #[must_use]
    pub fn plan_path(&self, revision: impl fmt::Display) -> String {
        self.resolve(&["runs", &format!("{revision}-plan.json")])
    }

    /// Path of the current-revision pointer.
    #[must_use]
    pub fn current_pointer(&self) -> String {
        self.resolve(&["current.json"])
    }

    /// Path of the user-readable inputs materialization.
    #[must_use]
    pub fn inputs_yaml(&self) -> String {
        self.resolve(&["inputs.yaml"])
    }
}

/// Map a mime type to a blob filename extension.
///
/// The `audio/` / `video/` / `image/` / `text/` category prefix is trimmed
/// before lookup, so `audio/mp3` and plain `mp3` resolve identically.
/// Unknown types get no extension.
#[must_use]
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let subtype = mime_type
        .strip_prefix("audio/")
        .or_else(|| mime_type.strip_prefix("video/"))
        .or_else(|| mime_type.strip_prefix("image/"))
        .or_else(|| mime_type.strip_prefix("text/"))
        .or_else(|| mime_type.strip_prefix("application/"))
        .unwrap_or(mime_type);
    match subtype {
        "mp3" | "mpeg" => Some("mp3"),
        "wav" => Some("wav"),
        "mp4" => Some("mp4"),
        "png" => Some("png"),
        "jpg" | "jpeg" => Some("jpg"),
        "plain" | "txt" => Some("txt"),
        "json" => Some("json"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_subpaths() {
        let ctx = StorageContext::new("darwin-01");
        assert_eq!(ctx.inputs_log(), "darwin-01/events/inputs.log");
        assert_eq!(ctx.artefacts_log(), "darwin-01/events/artefacts.log");
        assert_eq!(ctx.current_pointer(), "darwin-01/current.json");
        assert_eq!(ctx.inputs_yaml(), "darwin-01/inputs.yaml");
        assert_eq!(
            ctx.manifest_path("rev-0001"),
            "darwin-01/manifests/rev-0001.json"
        );
        assert_eq!(ctx.plan_path("rev-0002"), "darwin-01/runs/rev-0002-plan.json");
    }

    #[test]
    fn blob_path_shards_on_first_two_hex() {
        let ctx = StorageContext::new("m");
        assert_eq!(
            ctx.blob_path("abcdef", "image/png"),
            "m/blobs/ab/abcdef.png"
        );
        assert_eq!(ctx.blob_path_bare("abcdef"), "m/blobs/ab/abcdef");
    }

    #[test]
    fn unknown_mime_omits_extension() {
        let ctx = StorageContext::new("m");
        assert_eq!(
            ctx.blob_path("abcdef", "application/x-custom"),
            "m/blobs/ab/abcdef"
        );
    }

    #[test]
    fn mime_category_prefix_is_trimmed() {
        assert_eq!(extension_for_mime("audio/mp3"), Some("mp3"));
        assert_eq!(extension_for_mime("audio/mpeg"), Some("mp3"));
        assert_eq!(extension_for_mime("video/mp4"), Some("mp4"));
        assert_eq!(extension_for_mime("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for_mime("text/plain"), Some("txt"));
        assert_eq!(extension_for_mime("application/json"), Some("json"));
        assert_eq!(extension_for_mime("json"), Some("json"));
        assert_eq!(extension_for_mime("application/octet-stream"), None);
    }

    #[test]
    fn resolve_joins_segments() {
        let ctx = StorageContext::new("m");
        assert_eq!(ctx.resolve(&["a", "b.json"]), "m/a/b.json");
        assert_eq!(ctx.resolve(&[]), "m");
    }
}

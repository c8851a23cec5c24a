//! Artifact descriptors: what a module produces and where it lands.
//!
//! A descriptor names one producible unit by a source template relative to
//! the module's build output. Templates may contain `*`-style globs and the
//! `{lib}` / `{plugin}` placeholders, which expand to the platform's shared
//! library and plugin bundle extensions. The destination is always the
//! kind's subtree of the stage root; descriptors never rename files.

use crate::platform::PlatformKind;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder replaced by the shared library extension.
pub const LIBRARY_PLACEHOLDER: &str = "{lib}";

/// Placeholder replaced by the plugin bundle extension.
pub const PLUGIN_PLACEHOLDER: &str = "{plugin}";

/// The kind of an artifact, which decides its destination subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    /// A public header.
    Header,
    /// A shared library.
    Library,
    /// A loadable plugin bundle.
    PluginBundle,
}

impl ArtifactKind {
    /// Every kind, in installation-root order.
    pub const ALL: [Self; 3] = [Self::Header, Self::Library, Self::PluginBundle];

    /// Name of the subtree holding this kind inside any stage root.
    #[must_use]
    pub const fn subtree(self) -> &'static str {
        match self {
            Self::Header => "includes",
            Self::Library => "lib",
            Self::PluginBundle => "extensions",
        }
    }

    /// Singular, human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Library => "library",
            Self::PluginBundle => "plugin bundle",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One producible unit of a module.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactDescriptor {
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Source template relative to the module's build output directory.
    pub source: String,
    /// Alias file name created in the shared library location, if any.
    #[serde(default)]
    pub alias: Option<String>,
    /// Whether the artifact may legitimately be absent from a build.
    #[serde(default)]
    pub optional: bool,
}

impl ArtifactDescriptor {
    /// Create a descriptor for `kind` at `source`.
    #[must_use]
    pub fn new(kind: ArtifactKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            alias: None,
            optional: false,
        }
    }

    /// Shorthand for a header descriptor.
    #[must_use]
    pub fn header(source: impl Into<String>) -> Self {
        Self::new(ArtifactKind::Header, source)
    }

    /// Shorthand for a library descriptor.
    #[must_use]
    pub fn library(source: impl Into<String>) -> Self {
        Self::new(ArtifactKind::Library, source)
    }

    /// Shorthand for a plugin bundle descriptor.
    #[must_use]
    pub fn plugin_bundle(source: impl Into<String>) -> Self {
        Self::new(ArtifactKind::PluginBundle, source)
    }

    /// Attach an alias named after the artifact's own file name.
    ///
    /// Has no effect on glob templates, which have no single file name.
    #[must_use]
    pub fn aliased(mut self) -> Self {
        if !is_glob(&self.source) {
            self.alias = file_name_of(&self.source).map(str::to_owned);
        }
        self
    }

    /// Mark the artifact as optional.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Expand the source template for `platform`.
    #[must_use]
    pub fn source_pattern(&self, platform: PlatformKind) -> String {
        expand_template(&self.source, platform)
    }

    /// Expand the alias name for `platform`.
    #[must_use]
    pub fn alias_name(&self, platform: PlatformKind) -> Option<String> {
        self.alias
            .as_deref()
            .map(|alias| expand_template(alias, platform))
    }

    /// File name the artifact has in every stage, for non-glob templates.
    #[must_use]
    pub fn file_name(&self, platform: PlatformKind) -> Option<String> {
        if is_glob(&self.source) {
            return None;
        }
        file_name_of(&self.source).map(|name| expand_template(name, platform))
    }

    /// Check the descriptor is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the source is empty, absolute,
    /// escapes the build output, or an alias is attached to a glob template.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let source = Utf8Path::new(&self.source);
        if self.source.trim().is_empty() {
            return Err("artifact source must not be empty".to_owned());
        }
        if source.is_absolute() {
            return Err(format!("artifact source {} must be relative", self.source));
        }
        if source.components().any(|c| c.as_str() == "..") {
            return Err(format!(
                "artifact source {} must stay inside the module",
                self.source
            ));
        }
        if self.alias.is_some() && is_glob(&self.source) {
            return Err(format!(
                "artifact source {} is a glob and cannot carry an alias",
                self.source
            ));
        }
        if let Some(alias) = &self.alias
            && (alias.is_empty() || alias.contains('/') || alias.contains('\\'))
        {
            return Err(format!("alias {alias} must be a plain file name"));
        }
        Ok(())
    }

    /// Find the files matching this descriptor under `build_output`.
    ///
    /// Only regular files match; directories picked up by a glob are skipped.
    /// The result is sorted and empty when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the expanded template is not a
    /// valid glob pattern.
    pub fn resolve_sources(
        &self,
        build_output: &Utf8Path,
        platform: PlatformKind,
    ) -> std::result::Result<Vec<Utf8PathBuf>, String> {
        let pattern = format!(
            "{}/{}",
            glob::Pattern::escape(build_output.as_str()),
            self.source_pattern(platform)
        );
        let entries = glob::glob(&pattern).map_err(|e| format!("bad pattern {pattern}: {e}"))?;

        let mut matches: Vec<Utf8PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(path) => Utf8PathBuf::from_path_buf(path).ok(),
                Err(err) => {
                    log::debug!("skipping unreadable glob entry: {err}");
                    None
                }
            })
            .filter(|path| path.is_file())
            .collect();
        matches.sort();
        Ok(matches)
    }
}

/// Substitute the extension placeholders in `template`.
#[must_use]
pub fn expand_template(template: &str, platform: PlatformKind) -> String {
    template
        .replace(LIBRARY_PLACEHOLDER, platform.library_extension())
        .replace(PLUGIN_PLACEHOLDER, platform.plugin_extension())
}

/// Whether a template contains glob metacharacters.
#[must_use]
pub fn is_glob(template: &str) -> bool {
    template.contains(['*', '?', '['])
}

fn file_name_of(template: &str) -> Option<&str> {
    Utf8Path::new(template).file_name()
}

//! Helpers shared by the content store adapters

use crate::application::ports::outbound::BrowseOptions;
use crate::domain::entities::WORLD_PACKAGE;
use crate::domain::value_objects::{file_name, glob_name, parent_dir, wildcard_matches};

/// Decides which stored file paths a browse request returns
pub(crate) struct BrowseFilter<'a> {
    dir: &'a str,
    pattern: Option<&'a str>,
    extensions: &'a [String],
}

impl<'a> BrowseFilter<'a> {
    pub(crate) fn new(path: &'a str, options: &'a BrowseOptions) -> Self {
        let (dir, pattern) = if options.wildcard {
            (parent_dir(path), Some(glob_name(path)))
        } else {
            (path.trim_end_matches('/'), None)
        };
        Self {
            dir,
            pattern,
            extensions: &options.extensions,
        }
    }

    /// Files directly inside the directory, matching the glob and extension list
    pub(crate) fn matches(&self, file: &str) -> bool {
        if parent_dir(file) != self.dir {
            return false;
        }
        if let Some(pattern) = self.pattern {
            if !wildcard_matches(pattern, file_name(file)) {
                return false;
            }
        }
        if self.extensions.is_empty() {
            return true;
        }
        let lower = file.to_ascii_lowercase();
        self.extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
    }
}

/// World-owned pack id for a label, e.g. `world.magic-loot`
pub(crate) fn world_collection_id(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    format!("{}.{}", WORLD_PACKAGE, slug.trim_matches('-'))
}

/// First id not already taken, suffixing `-2`, `-3`, ... onto `base`
pub(crate) fn unique_id(base: String, taken: impl Fn(&str) -> bool) -> String {
    if !taken(&base) {
        return base;
    }
    (2..)
        .map(|suffix| format!("{}-{}", base, suffix))
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}

//! Asset path helpers: bundle layout, passthrough marker and wildcard families

use std::sync::OnceLock;

use regex_lite::Regex;

use super::{AssetClass, DocumentKind};

/// Prefix marking a path that is assumed to exist in every destination store
pub const PASSTHROUGH_MARKER: char = '*';

static RESERVED_NAME: OnceLock<Regex> = OnceLock::new();
static WINDOWS_RESERVED_NAME: OnceLock<Regex> = OnceLock::new();
static TRAILING_DOTS: OnceLock<Regex> = OnceLock::new();

const ILLEGAL_FILENAME_CHARS: [char; 9] = ['/', '?', '<', '>', '\\', ':', '*', '|', '"'];

/// Deterministic location of a relocated asset inside a bundle
pub fn bundle_asset_path(
    kind: DocumentKind,
    class: AssetClass,
    owner_id: &str,
    filename: &str,
) -> String {
    format!(
        "{}/{}/{}/{}",
        kind.folder_name(),
        class.folder_name(),
        owner_id,
        filename
    )
}

pub fn wrap_passthrough(path: &str) -> String {
    format!("{}{}", PASSTHROUGH_MARKER, path)
}

/// Returns the bare path when `path` carries the passthrough marker
pub fn unwrap_passthrough(path: &str) -> Option<&str> {
    path.strip_prefix(PASSTHROUGH_MARKER)
}

/// Final path segment with any query string removed
pub fn file_name(path: &str) -> &str {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match name.find('?') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Final path segment of a glob, keeping `?` as a wildcard character
pub fn glob_name(pattern: &str) -> &str {
    pattern.rsplit(['/', '\\']).next().unwrap_or(pattern)
}

/// Everything before the final path segment, without a trailing slash
pub fn parent_dir(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Whether the file name of `path` is a glob describing a family of files
pub fn is_wildcard(path: &str) -> bool {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    name.contains(['*', '?'])
}

/// Match `candidate` against a glob where `*` and `?` never cross a `/`
pub fn wildcard_matches(pattern: &str, candidate: &str) -> bool {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str("[^/]*"),
            '?' => expr.push_str("[^/]"),
            other => expr.push_str(&regex_lite::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr)
        .map(|re| re.is_match(candidate))
        .unwrap_or(false)
}

/// Make `input` safe to use as a file or directory name on any platform
pub fn sanitize_filename(input: &str, replacement: &str) -> String {
    let reserved = RESERVED_NAME.get_or_init(|| Regex::new(r"^\.+$").unwrap());
    let windows_reserved = WINDOWS_RESERVED_NAME.get_or_init(|| {
        Regex::new(r"(?i)^(con|prn|aux|nul|com[0-9]|lpt[0-9])(\..*)?$").unwrap()
    });
    let trailing = TRAILING_DOTS.get_or_init(|| Regex::new(r"[. ]+$").unwrap());

    let mut sanitized = String::with_capacity(input.len());
    for c in input.chars() {
        if ILLEGAL_FILENAME_CHARS.contains(&c) || c.is_control() {
            sanitized.push_str(replacement);
        } else {
            sanitized.push(c);
        }
    }

    let sanitized = reserved.replace(&sanitized, replacement).into_owned();
    let sanitized = windows_reserved.replace(&sanitized, replacement).into_owned();
    trailing.replace(&sanitized, replacement).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_asset_path_layout() {
        let path = bundle_asset_path(DocumentKind::Scene, AssetClass::TokenImage, "tok1", "goblin.png");
        assert_eq!(path, "scene/tokenimage/tok1/goblin.png");
    }

    #[test]
    fn test_passthrough_only_strips_first_marker() {
        let wrapped = wrap_passthrough("icons/*.png");
        assert_eq!(wrapped, "*icons/*.png");
        assert_eq!(unwrap_passthrough(&wrapped), Some("icons/*.png"));
        assert_eq!(unwrap_passthrough("actor/images/a/b.png"), None);
    }

    #[test]
    fn test_file_name_strips_directories_and_query() {
        assert_eq!(file_name("worlds/x/maps/cave.webp?1234"), "cave.webp");
        assert_eq!(file_name("plain.png"), "plain.png");
        assert_eq!(parent_dir("worlds/x/maps/cave.webp"), "worlds/x/maps");
        assert_eq!(parent_dir("plain.png"), "");
    }

    #[test]
    fn test_wildcard_detection_and_matching() {
        assert!(is_wildcard("tokens/goblins/*.png"));
        assert!(!is_wildcard("tokens/goblins/goblin-1.png"));
        assert!(wildcard_matches("tokens/goblins/*.png", "tokens/goblins/goblin-1.png"));
        assert!(!wildcard_matches("tokens/goblins/*.png", "tokens/goblins/deep/goblin-1.png"));
        assert!(!wildcard_matches("tokens/goblins/*.png", "tokens/goblins/goblin-1.webp"));
        assert!(wildcard_matches("goblin-?.png", "goblin-3.png"));
    }

    #[test]
    fn test_glob_name_keeps_single_character_wildcard() {
        assert_eq!(glob_name("tokens/goblin-?.png"), "goblin-?.png");
        assert_eq!(glob_name("tokens/goblins/*.png"), "*.png");
        assert!(wildcard_matches(glob_name("tokens/goblin-?.png"), "goblin-2.png"));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Lost Mine: Part 1?", "_"), "Lost Mine_ Part 1_");
        assert_eq!(sanitize_filename("..", "_"), "_");
        assert_eq!(sanitize_filename("CON", "_"), "_");
        assert_eq!(sanitize_filename("trailing. ", "_"), "trailing_");
        assert_eq!(sanitize_filename("Tomb of Horrors", "_"), "Tomb of Horrors");
    }
}

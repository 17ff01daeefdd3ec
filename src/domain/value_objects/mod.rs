//! Value objects - Immutable objects defined by their attributes

mod asset_path;
mod document_kind;
mod ids;
mod partial_update;
mod reference_token;

pub use asset_path::{
    bundle_asset_path, file_name, glob_name, is_wildcard, parent_dir, sanitize_filename,
    unwrap_passthrough, wildcard_matches, wrap_passthrough, PASSTHROUGH_MARKER,
};
pub use document_kind::{AssetClass, DocumentKind, UnknownKind, IMPORT_ORDER};
pub use ids::*;
pub use partial_update::PartialUpdate;
pub use reference_token::{
    contains_reference, tokenize, ReferenceToken, Span, TokenSyntax, TokenTarget,
};

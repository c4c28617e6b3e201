use std::path::{Component, Path};

use crate::ChunkError;

/// Reduces a remote-declared file name to a single safe path component.
///
/// Directory parts are dropped, so `../../etc/passwd` becomes `passwd`.
/// Rejects names with nothing usable left (empty, `.`, `..`, a bare root).
pub fn sanitize_file_name(name: &str) -> Result<String, ChunkError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ChunkError::InvalidName("empty name".into()));
    }

    // Treat both separators alike regardless of platform.
    let unified = trimmed.replace('\\', "/");
    let last = Path::new(&unified)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            Component::Prefix(_)
            | Component::RootDir
            | Component::CurDir
            | Component::ParentDir => None,
        })
        .next_back();

    match last.and_then(|part| part.to_str()) {
        Some(part) if !part.contains('\0') && !part.ends_with(':') => Ok(part.to_string()),
        _ => Err(ChunkError::InvalidName(name.to_string())),
    }
}

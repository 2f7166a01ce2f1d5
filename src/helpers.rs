use convert_case::{Case, Casing};
use std::path::Path;

/// Extension of component source files.
pub const MTM_EXTENSION: &str = "mtm";

/// Whether `path` names a `.mtm` file.
pub fn is_mtm_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == MTM_EXTENSION)
}

/// Component name for a source path: the PascalCase file stem.
///
/// Falls back to `Component` when the stem has no usable characters.
pub fn component_name(path: &str) -> String {
    let stem = Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = stem.to_case(Case::Pascal);
    let name: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    match name.chars().next() {
        None => "Component".to_string(),
        Some(c) if c.is_ascii_digit() => format!("Component{name}"),
        Some(_) => name,
    }
}

/// Upper-case the first character: `count` -> `Count`.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The setter name used by hook/signal backends: `count` -> `setCount`.
pub fn setter_name(name: &str) -> String {
    format!("set{}", capitalize(name))
}

pub fn content_hash(contents: &[u8]) -> blake3::Hash {
    blake3::hash(contents)
}

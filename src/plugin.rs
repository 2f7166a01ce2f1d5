//! Bundler plugin hooks.
//!
//! A bundler drives the compiler through three calls per module: resolve an
//! import to an id, load the id's text and transform that text into the
//! target's JavaScript. Ids that are not `.mtm` files are never claimed.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::helpers::is_mtm_file;
use crate::session::CompilerSession;

/// The result of [`MtmPlugin::transform`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformOutput {
    pub code: String,
    pub dependencies: Vec<String>,
    pub exports: Vec<String>,
}

#[derive(Debug)]
pub struct MtmPlugin {
    session: CompilerSession,
}

impl MtmPlugin {
    pub fn new(config: CompilerConfig) -> Result<Self> {
        Ok(Self {
            session: CompilerSession::new(config)?,
        })
    }

    pub fn from_session(session: CompilerSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &CompilerSession {
        &self.session
    }

    /// Resolve `id` relative to the importing module's directory.
    pub fn resolve_id(&self, id: &str, importer: Option<&str>) -> Option<String> {
        let path = Path::new(id);
        if !is_mtm_file(path) {
            return None;
        }
        let resolved = match importer {
            Some(importer) if !path.is_absolute() => Path::new(importer)
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(path),
            _ => path.to_path_buf(),
        };
        Some(normalize(&resolved).to_string_lossy().into_owned())
    }

    /// Source text of an `.mtm` id.
    pub fn load(&self, id: &str) -> Result<Option<String>> {
        let path = Path::new(id);
        if !is_mtm_file(path) {
            return Ok(None);
        }
        let source = std::fs::read_to_string(path).with_context(|| format!("Could not load {id}"))?;
        Ok(Some(source))
    }

    /// Compile `code` as the module `id`, returning its first target.
    pub fn transform(&mut self, code: &str, id: &str) -> Option<Result<TransformOutput, CompileError>> {
        if !is_mtm_file(Path::new(id)) {
            return None;
        }
        let module = match self.session.compile_source(id, code) {
            Ok(module) => module,
            Err(err) => return Some(Err(err)),
        };
        let output = match (module.primary(), module.target_errors.first()) {
            (Some(output), _) => Ok(TransformOutput {
                code: output.code.clone(),
                dependencies: output.dependencies.clone(),
                exports: output.exports.clone(),
            }),
            (None, Some(err)) => Err(err.clone()),
            (None, None) => Err(CompileError::frontmatter(id, "no target produced any output")),
        };
        Some(output)
    }
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;

    fn plugin() -> MtmPlugin {
        MtmPlugin::new(CompilerConfig::builder().workers(1).build()).unwrap()
    }

    #[test]
    fn test_resolve_id() {
        let p = plugin();
        assert_eq!(
            p.resolve_id("./Button.mtm", Some("src/pages/Home.mtm")).as_deref(),
            Some("src/pages/Button.mtm")
        );
        assert_eq!(
            p.resolve_id("../ui/Card.mtm", Some("src/pages/Home.mtm")).as_deref(),
            Some("src/ui/Card.mtm")
        );
        assert_eq!(p.resolve_id("/abs/Card.mtm", Some("src/x.mtm")).as_deref(), Some("/abs/Card.mtm"));
        assert_eq!(p.resolve_id("react", Some("src/x.mtm")), None);
        assert_eq!(p.resolve_id("./style.css", None), None);
    }

    #[test]
    fn test_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.mtm");
        std::fs::write(&path, "$a! = 1\n").unwrap();
        let p = plugin();
        assert_eq!(p.load(path.to_str().unwrap()).unwrap().as_deref(), Some("$a! = 1\n"));
        assert_eq!(p.load("src/index.js").unwrap(), None);
        assert!(p.load(dir.path().join("Missing.mtm").to_str().unwrap()).is_err());
    }

    #[test]
    fn test_transform() {
        let mut p = plugin();
        let src = "---\ntarget: vue\n---\nimport { format } from 'date-fns'\n$when! = format(new Date(), 'P')\n";
        let out = p.transform(src, "src/When.mtm").unwrap().unwrap();
        assert!(out.code.starts_with("<script setup>"));
        assert_eq!(out.dependencies, vec!["vue", "date-fns"]);
        assert_eq!(out.exports, vec!["default"]);
        assert!(p.transform("export default 1", "src/x.js").is_none());

        let err = p.transform("---\ntarget: angular\n---\n", "src/Bad.mtm").unwrap().unwrap_err();
        assert_eq!(err.report().kind, "FrontmatterError");
        assert!(p.session().cache().contains("src/When.mtm"));
    }

    #[test]
    fn test_transform_reports_backend_failure() {
        let config = CompilerConfig::builder().targets(vec![Target::React]).workers(1).build();
        let mut p = MtmPlugin::new(config).unwrap();
        let src = "---\ntarget: reactjs\nprops:\n  title: string\n---\n$rename = () => { $title = 'x' }\n";
        let err = p.transform(src, "src/T.mtm").unwrap().unwrap_err();
        assert_eq!(err.report().kind, "FrameworkError");
    }
}

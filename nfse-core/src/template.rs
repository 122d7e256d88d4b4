//! Payload template lookup and the rendering seam.
//!
//! Templates are searched across an ordered list of directories: a custom
//! override, then the per-operation directory, then the global default. The
//! first `<name>.xml` found wins; absence everywhere is a configuration
//! error. Rendering itself is pluggable.
use crate::config::{ConfigError, Environment};
use crate::municipality::MunicipalityDescriptor;
use crate::service::RpsBatch;
use std::path::PathBuf;

/// Ordered template directory search.
#[derive(Debug, Clone, Default)]
pub struct TemplateResolver {
    dirs: Vec<PathBuf>,
}

impl TemplateResolver {
    /// Directories in descending precedence; empty entries are skipped.
    pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        TemplateResolver {
            dirs: dirs.into_iter().collect(),
        }
    }

    /// Locate `<name>.xml` in the first directory that has it.
    pub fn locate(&self, name: &str) -> Result<PathBuf, ConfigError> {
        for dir in &self.dirs {
            let candidate = dir.join(format!("{name}.xml"));
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(ConfigError::TemplateNotFound {
            name: name.to_string(),
            searched: self.dirs.clone(),
        })
    }

    pub fn load(&self, name: &str) -> Result<String, ConfigError> {
        let path = self.locate(name)?;
        std::fs::read_to_string(&path).map_err(|source| ConfigError::TemplateRead {
            name: name.to_string(),
            source,
        })
    }
}

/// Data available to the template engine when rendering a payload.
pub struct RenderContext<'a> {
    pub batch: &'a RpsBatch,
    pub environment: Environment,
    pub descriptor: &'a MunicipalityDescriptor,
}

/// Rendering seam. The core ships [`RawTemplate`]; callers wire in their own
/// engine when templates carry placeholders.
pub trait TemplateEngine: Send + Sync {
    fn render(&self, template: &str, context: &RenderContext<'_>) -> Result<String, ConfigError>;
}

/// Passthrough engine for templates that are complete XML already.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawTemplate;

impl TemplateEngine for RawTemplate {
    fn render(&self, template: &str, _context: &RenderContext<'_>) -> Result<String, ConfigError> {
        Ok(template.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn first_directory_wins() {
        let custom = tempfile::tempdir().expect("custom dir");
        let fallback = tempfile::tempdir().expect("fallback dir");
        fs::write(custom.path().join("lote.xml"), "<custom/>").expect("write custom");
        fs::write(fallback.path().join("lote.xml"), "<fallback/>").expect("write fallback");

        let resolver = TemplateResolver::new([
            custom.path().to_path_buf(),
            fallback.path().to_path_buf(),
        ]);
        assert_eq!(resolver.load("lote").expect("load"), "<custom/>");
    }

    #[test]
    fn falls_through_to_later_directories() {
        let custom = tempfile::tempdir().expect("custom dir");
        let fallback = tempfile::tempdir().expect("fallback dir");
        fs::write(fallback.path().join("lote.xml"), "<fallback/>").expect("write fallback");

        let resolver = TemplateResolver::new([
            custom.path().to_path_buf(),
            fallback.path().to_path_buf(),
        ]);
        assert_eq!(resolver.load("lote").expect("load"), "<fallback/>");
    }

    #[test]
    fn absence_everywhere_is_a_config_error() {
        let dir = tempfile::tempdir().expect("dir");
        let resolver = TemplateResolver::new([dir.path().to_path_buf()]);
        assert!(matches!(
            resolver.load("missing"),
            Err(ConfigError::TemplateNotFound { .. })
        ));
    }
}

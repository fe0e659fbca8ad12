//! Loading and compiling email templates from disk.
//!
//! A template named `welcome` lives at `<dir>/welcome.hbs` and uses
//! Handlebars syntax. Rendering is non-strict: a key missing from the
//! context renders as an empty string.

use crate::error::{MailError, Result};
use handlebars::Handlebars;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

pub const TEMPLATE_EXTENSION: &str = "hbs";

/// Free-form data handed to a template at render time.
pub type Context = Map<String, Value>;

/// A template compiled and ready to render.
pub struct CompiledTemplate {
    name: String,
    registry: Handlebars<'static>,
}

impl CompiledTemplate {
    pub fn compile(name: &str, source: &str) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry
            .register_template_string(name, source)
            .map_err(|e| MailError::TemplateCompile {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            registry,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render(&self, context: &Context) -> Result<String> {
        self.registry
            .render(&self.name, context)
            .map_err(|e| MailError::TemplateRender {
                name: self.name.clone(),
                message: e.to_string(),
            })
    }
}

struct CacheEntry {
    modified: SystemTime,
    template: Arc<CompiledTemplate>,
}

pub struct TemplateLoader {
    dir: PathBuf,
    cache: Option<Mutex<HashMap<String, CacheEntry>>>,
}

impl TemplateLoader {
    /// Loader that re-reads and re-compiles the template on every call.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: None,
        }
    }

    /// Loader that keeps compiled templates until the file's modification
    /// time changes.
    pub fn with_cache(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Some(Mutex::new(HashMap::new())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> Option<PathBuf> {
        if !is_valid_name(name) {
            return None;
        }
        Some(self.dir.join(format!("{}.{}", name, TEMPLATE_EXTENSION)))
    }

    pub async fn load(&self, name: &str) -> Result<Arc<CompiledTemplate>> {
        let Some(path) = self.path_for(name) else {
            tracing::warn!(template = name, "rejected template name");
            return Err(not_found(name));
        };

        let Some(cache) = &self.cache else {
            let source = read_source(name, &path).await?;
            return CompiledTemplate::compile(name, &source).map(Arc::new);
        };

        let modified = tokio::fs::metadata(&path)
            .await
            .and_then(|meta| meta.modified())
            .map_err(|e| io_error(name, e))?;

        if let Some(entry) = lock(cache).get(name) {
            if entry.modified == modified {
                tracing::debug!(template = name, "template cache hit");
                return Ok(entry.template.clone());
            }
        }

        tracing::debug!(template = name, "template cache miss");
        let source = read_source(name, &path).await?;
        let template = Arc::new(CompiledTemplate::compile(name, &source)?);
        lock(cache).insert(
            name.to_string(),
            CacheEntry {
                modified,
                template: template.clone(),
            },
        );
        Ok(template)
    }
}

fn lock(
    cache: &Mutex<HashMap<String, CacheEntry>>,
) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
    // A panic mid-insert leaves the map usable.
    cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn read_source(name: &str, path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| io_error(name, e))
}

fn io_error(name: &str, err: io::Error) -> MailError {
    if err.kind() == io::ErrorKind::NotFound {
        not_found(name)
    } else {
        MailError::TemplateIo {
            name: name.to_string(),
            source: err,
        }
    }
}

fn not_found(name: &str) -> MailError {
    MailError::TemplateNotFound {
        name: name.to_string(),
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(value: Value) -> Context {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_render_substitutes_context() {
        let template = CompiledTemplate::compile("greeting", "Hello {{name}}").unwrap();
        let html = template.render(&context(json!({ "name": "Ava" }))).unwrap();
        assert_eq!(html, "Hello Ava");
    }

    #[test]
    fn test_missing_key_renders_empty() {
        let template =
            CompiledTemplate::compile("greeting", "Hello {{name}}, order {{order_id}}").unwrap();
        let html = template.render(&context(json!({ "name": "Ava" }))).unwrap();
        assert_eq!(html, "Hello Ava, order ");
    }

    #[test]
    fn test_render_escapes_html() {
        let template = CompiledTemplate::compile("greeting", "<p>{{name}}</p>").unwrap();
        let html = template
            .render(&context(json!({ "name": "<script>" })))
            .unwrap();
        assert_eq!(html, "<p>&lt;script&gt;</p>");
    }

    #[test]
    fn test_compile_error() {
        let err = CompiledTemplate::compile("broken", "{{#if ready}}never closed")
            .err()
            .unwrap();
        assert!(matches!(err, MailError::TemplateCompile { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_path_for_rejects_traversal() {
        let loader = TemplateLoader::new("templates");
        assert_eq!(
            loader.path_for("welcome"),
            Some(PathBuf::from("templates/welcome.hbs"))
        );
        assert_eq!(loader.path_for("../secrets"), None);
        assert_eq!(loader.path_for("nested/welcome"), None);
        assert_eq!(loader.path_for(""), None);
    }

    #[tokio::test]
    async fn test_load_missing_template() {
        let dir = tempfile::tempdir().unwrap();
        let loader = TemplateLoader::new(dir.path());
        let err = loader.load("absent").await.err().unwrap();
        assert!(matches!(err, MailError::TemplateNotFound { ref name } if name == "absent"));
    }

    #[tokio::test]
    async fn test_load_rereads_without_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.hbs");
        std::fs::write(&path, "first {{x}}").unwrap();

        let loader = TemplateLoader::new(dir.path());
        let ctx = context(json!({ "x": 1 }));
        assert_eq!(loader.load("note").await.unwrap().render(&ctx).unwrap(), "first 1");

        std::fs::write(&path, "second {{x}}").unwrap();
        assert_eq!(loader.load("note").await.unwrap().render(&ctx).unwrap(), "second 1");
    }

    #[tokio::test]
    async fn test_cache_reuses_compiled_template() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.hbs"), "cached").unwrap();

        let loader = TemplateLoader::with_cache(dir.path());
        let first = loader.load("note").await.unwrap();
        let second = loader.load("note").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_cache_invalidated_by_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.hbs");
        std::fs::write(&path, "old").unwrap();

        let loader = TemplateLoader::with_cache(dir.path());
        let ctx = Context::new();
        assert_eq!(loader.load("note").await.unwrap().render(&ctx).unwrap(), "old");

        std::fs::write(&path, "new").unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + std::time::Duration::from_secs(10))
            .unwrap();

        assert_eq!(loader.load("note").await.unwrap().render(&ctx).unwrap(), "new");
    }
}

//! Fixed templates manager for one-shot builds.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::template::Template;

/// Every template under the directory is used, for the manager's lifetime.
#[derive(Debug, Default)]
pub struct ConstantTemplatesManager {
    names: Vec<String>,
    templates: FxHashMap<String, Arc<Template>>,
}

impl ConstantTemplatesManager {
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        let mut manager = Self::default();
        for name in names {
            if manager.templates.contains_key(&name) {
                continue;
            }
            manager
                .templates
                .insert(name.clone(), Arc::new(Template::new(name.as_str())));
            manager.names.push(name);
        }
        manager
    }

    pub fn used(&self) -> Vec<String> {
        self.names.clone()
    }

    pub fn emit(&self, name: &str, content: impl Into<Arc<str>>) {
        if let Some(template) = self.templates.get(name) {
            template.emit(content);
        }
    }

    #[cfg(test)]
    pub fn template(&self, name: &str) -> Option<&Arc<Template>> {
        self.templates.get(name)
    }
}

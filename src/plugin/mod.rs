//! The lazy HTML plugin.
//!
//! Ties the templates managers to the compiler lifecycle:
//!
//! ```text
//! setup_dev_server  install a watching manager, mount client/events/entry
//! run / watch_run   install a constant manager (every template)
//! make              one entry per used name → child compiler
//! asset_emitted     {prefix}/{output} → emit(name, content)
//! after_compile     watch the template directory
//! ```
//!
//! # Module Structure
//!
//! - `options` - Plugin options and their builder

mod options;

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{Result, bail};
use arc_swap::ArcSwapOption;

use crate::compiler::{Compilation, Compiler, EntryDescriptor, Plugin, Watching};
use crate::config::ConfigError;
use crate::mapper::PathMapper;
use crate::middleware::{ClientScript, EntryMiddleware, EventsMiddleware, Mount};
use crate::templates::{TemplatesManager, WatchingTemplatesManager, resolve_names};
use crate::utils::path::{join_prefix, normalize_path};

pub use options::LazyHtmlOptions;

/// Path segment the plugin's own endpoints live under.
const PLUGIN_SEGMENT: &str = "lazy-html-plugin";

pub struct LazyHtmlPlugin {
    prefix: String,
    /// As configured; resolved on first use.
    directory: PathBuf,
    resolved_directory: OnceLock<PathBuf>,
    input_glob: String,
    mapper: Arc<dyn PathMapper>,
    chunks: Vec<String>,
    wait_timeout: std::time::Duration,
    max_pending: usize,
    /// Active manager of the current compiler session.
    templates: ArcSwapOption<TemplatesManager>,
}

impl std::fmt::Debug for LazyHtmlPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyHtmlPlugin")
            .field("prefix", &self.prefix)
            .field("directory", &self.directory)
            .field("input_glob", &self.input_glob)
            .field("mapper", &self.mapper)
            .field("chunks", &self.chunks)
            .finish_non_exhaustive()
    }
}

impl LazyHtmlPlugin {
    /// Fails when the default path mapper cannot be built from its config.
    pub fn new(options: LazyHtmlOptions) -> Result<Self, ConfigError> {
        let mapper = options.path_mapper.resolve()?;
        Ok(Self {
            prefix: options.trimmed_prefix().to_string(),
            directory: options.directory,
            resolved_directory: OnceLock::new(),
            input_glob: options.input_glob,
            mapper,
            chunks: options.chunks,
            wait_timeout: options.wait_timeout,
            max_pending: options.max_pending,
            templates: ArcSwapOption::empty(),
        })
    }

    /// The active manager, if a build session has started.
    pub fn templates(&self) -> Option<Arc<TemplatesManager>> {
        self.templates.load_full()
    }

    /// The watching manager, when serving.
    #[cfg(test)]
    pub fn watching_templates(&self) -> Option<Arc<WatchingTemplatesManager>> {
        self.templates().and_then(|m| m.as_watching().cloned())
    }

    /// Output path of a template, relative to the output directory.
    pub fn output_path(&self, name: &str) -> String {
        join_prefix(&self.prefix, &self.mapper.name_to_output(name))
    }

    /// Absolute URL path of one of the plugin's endpoints.
    fn endpoint(&self, file: &str) -> String {
        format!("/{}", join_prefix(&self.prefix, &format!("{PLUGIN_SEGMENT}/{file}")))
    }

    fn directory(&self, compiler: &Compiler) -> &Path {
        self.resolved_directory
            .get_or_init(|| normalize_path(&compiler.context().join(&self.directory)))
    }

    fn install_constant(&self, compiler: &Compiler) -> Result<()> {
        let names = resolve_names(self.directory(compiler), &self.input_glob, self.mapper.as_ref())?;
        crate::debug!("plugin"; "compiling all {} template(s)", names.len());
        self.templates
            .store(Some(Arc::new(TemplatesManager::constant(names))));
        Ok(())
    }

    /// Template name for an emitted asset, if it is one of ours.
    fn asset_name(&self, file: &str) -> Option<String> {
        let relative = if self.prefix.is_empty() {
            file
        } else {
            file.strip_prefix(&self.prefix)?.strip_prefix('/')?
        };
        self.mapper.output_to_name(relative)
    }
}

impl Plugin for LazyHtmlPlugin {
    fn name(&self) -> &'static str {
        "lazy-html"
    }

    fn setup_dev_server(
        &self,
        compiler: &Compiler,
        watching: &Watching,
        mounts: &mut Vec<Mount>,
    ) -> Result<()> {
        let watching = watching.clone();
        let manager = Arc::new(WatchingTemplatesManager::new(move || watching.invalidate()));
        self.templates
            .store(Some(Arc::new(TemplatesManager::Watching(Arc::clone(&manager)))));

        let client_src = self.endpoint("client.js");
        let events_path = self.endpoint("events");
        let entry = EntryMiddleware::new(
            Arc::clone(&manager),
            Arc::clone(&self.mapper),
            self.directory(compiler).to_path_buf(),
            client_src.clone(),
            self.wait_timeout,
            self.max_pending,
        );
        let events = EventsMiddleware::new(&manager, self.prefix.clone(), Arc::clone(&self.mapper));

        let own = [
            Mount::new(&client_src, Arc::new(ClientScript::new(&events_path))),
            Mount::new(&events_path, Arc::new(events)),
            Mount::new(&self.prefix, Arc::new(entry)),
        ];
        let rest = std::mem::take(mounts);
        mounts.extend(own);
        mounts.extend(rest);

        crate::debug!("plugin"; "serving templates under /{}", self.prefix);
        Ok(())
    }

    fn run(&self, compiler: &Compiler) -> Result<()> {
        self.install_constant(compiler)
    }

    fn watch_run(&self, compiler: &Compiler) -> Result<()> {
        let installed = self.templates.load();
        match installed.as_deref() {
            Some(manager) if !manager.is_constant() => Ok(()),
            _ => self.install_constant(compiler),
        }
    }

    fn make(&self, compiler: &Compiler, compilation: &mut Compilation) -> Result<()> {
        let Some(templates) = self.templates() else {
            bail!("make called before a templates manager was installed");
        };

        let used = templates.used();
        if used.is_empty() {
            crate::debug!("plugin"; "no templates in use");
            return Ok(());
        }

        let directory = self.directory(compiler);
        let entries: Vec<EntryDescriptor> = used
            .into_iter()
            .map(|name| EntryDescriptor {
                input: directory.join(self.mapper.name_to_input(&name)),
                output: self.output_path(&name),
                chunks: self.chunks.clone(),
                loader: self.mapper.input_loader().map(str::to_string),
                name,
            })
            .collect();

        let mut child = compiler.child().compile(&entries)?;
        compilation.errors.append(&mut child.errors);
        compilation.assets.extend(child.assets);
        Ok(())
    }

    fn asset_emitted(&self, file: &str, content: &[u8]) {
        let Some(name) = self.asset_name(file) else {
            return;
        };
        let Some(templates) = self.templates() else {
            return;
        };
        templates.emit(&name, String::from_utf8_lossy(content).into_owned());
    }

    fn after_compile(&self, compilation: &mut Compilation) {
        if let Some(directory) = self.resolved_directory.get() {
            compilation.context_dependencies.insert(directory.clone());
        }
    }
}

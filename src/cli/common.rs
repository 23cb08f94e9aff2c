//! Common utilities shared across CLI commands.

use std::sync::Arc;

use anyhow::Result;

use crate::compiler::{Compiler, HtmlChildCompiler, Plugin};
use crate::config::LazyHtmlConfig;
use crate::plugin::{LazyHtmlOptions, LazyHtmlPlugin};

/// Compiler for the project, with the lazy HTML plugin registered.
pub fn create_compiler(config: &LazyHtmlConfig) -> Result<Compiler> {
    let plugin = LazyHtmlPlugin::new(LazyHtmlOptions::from_config(config))?;
    crate::debug!("build"; "{:?}", plugin);

    Ok(Compiler::new(
        &config.root,
        &config.build.output,
        Arc::new(HtmlChildCompiler::new()),
    )
    .with_plugin(Arc::new(plugin) as Arc<dyn Plugin>))
}

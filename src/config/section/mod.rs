//! Configuration section definitions.
//!
//! Each module corresponds to a section in `lazy-html.toml`:
//!
//! | Module   | TOML Section | Purpose                                  |
//! |----------|--------------|------------------------------------------|
//! | `plugin` | `[plugin]`   | Prefix, template directory, path mapping |
//! | `build`  | `[build]`    | Output directory                         |
//! | `serve`  | `[serve]`    | Development server                       |

mod build;
mod plugin;
mod serve;

pub use build::BuildConfig;
pub use plugin::PluginConfig;
pub use serve::ServeConfig;

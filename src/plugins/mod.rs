// Built-in plugins

pub mod prebundle_modules;

pub use prebundle_modules::{PrebundleModulesPlugin, CANDIDATES, PREBUNDLED_MODULES_DIR};

// Processors module
pub mod commonjs;
pub mod esbuild;
pub mod esm_lowering;
pub mod js_ast;
pub mod native_bundler;

pub use commonjs::*;
pub use esbuild::*;
pub use esm_lowering::*;
pub use js_ast::*;
pub use native_bundler::*;

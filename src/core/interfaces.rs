use crate::core::models::*;
use crate::utils::Result;
use async_trait::async_trait;
use std::path::Path;

/// File system operations interface
#[async_trait]
pub trait FileSystemService: Send + Sync {
    async fn read_file(&self, path: &Path) -> Result<String>;
    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;
    async fn create_directory(&self, path: &Path) -> Result<()>;
    fn file_exists(&self, path: &Path) -> bool;
}

/// A bundling backend.
///
/// `build` is called once per invocation with the complete configuration and
/// must have written every output file by the time it returns.
#[async_trait]
pub trait Bundler: Send + Sync {
    fn name(&self) -> &str;
    async fn build(&self, options: &BundleOptions) -> Result<BundleResult>;
}

/// Build service interface
#[async_trait]
pub trait BuildService: Send + Sync {
    async fn build(&self, config: &BuildConfig) -> Result<BuildResult>;
}

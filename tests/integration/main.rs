mod build_tests;
mod dev_server_tests;
mod prebundle_tests;

use std::path::Path;

/// Write `content` under `root`, creating parent directories
pub fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

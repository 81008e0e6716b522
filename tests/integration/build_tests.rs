use crate::write;
use devkit::core::interfaces::BuildService;
use devkit::core::models::BuildConfig;
use devkit::core::services::DevkitBuildService;
use devkit::infrastructure::NativeBundler;
use devkit::utils::{ConfigLoader, BuildOverrides, CONFIG_FILE_NAME};
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn test_build_project_with_config_file() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write(
        root,
        CONFIG_FILE_NAME,
        r#"{ "build": { "entries": ["./src/main.js"], "outdir": "build" }, "alias": { "@lib": "./src/lib" } }"#,
    );
    write(root, "src/main.js", "import { greet } from '@lib/greet.js';\nexport const message = greet('devkit');");
    write(root, "src/lib/greet.js", "export function greet(name) { return `hi ${name}`; }");

    let file_config = ConfigLoader::load_from_file(root).unwrap();
    let config = ConfigLoader::merge_with_cli(file_config, root.to_path_buf(), BuildOverrides::default());

    let service = DevkitBuildService::new(Arc::new(NativeBundler::new()));
    let result = service.build(&config).await.unwrap();

    assert!(result.success);
    assert_eq!(result.modules_bundled, 2);

    let code = std::fs::read_to_string(root.join("build/main.js")).unwrap();
    assert!(code.contains("require(\"src/lib/greet.js\")"));
    assert!(code.contains("export { __e0 as message };"));
}

#[tokio::test]
async fn test_build_reports_missing_entry() {
    let temp = tempdir().unwrap();
    let config = BuildConfig {
        root: temp.path().to_path_buf(),
        entries: vec!["./src/missing.js".to_string()],
        ..Default::default()
    };

    let service = DevkitBuildService::new(Arc::new(NativeBundler::new()));
    let err = service.build(&config).await.unwrap_err();

    assert!(err.to_string().contains("./src/missing.js"));
}

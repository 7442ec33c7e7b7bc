//! Snapshot tests
//!
//! Compiles every module of each project in /tests/projects/ and compares
//! if the compiled documents change.

use indexmap::IndexMap;
use modstack::project::Project;
use serde_json::Value;

#[test]
fn snapshots() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("MODSTACK_LOG"))
        .with_writer(std::io::stderr)
        .init();

    insta::glob!("projects/*/modstack.yaml", |manifest| {
        let project = Project::from_manifest(manifest).expect("must be valid project");
        let name = manifest
            .parent()
            .and_then(|dir| dir.file_name())
            .unwrap()
            .to_string_lossy()
            .to_string();

        let errors = project.validate_all().expect("validation runs");
        assert!(errors.is_empty(), "{name}: {errors}");

        let compiled: IndexMap<String, Value> = project
            .module_names()
            .map(|module| {
                let document = project.compile(module).expect("module compiles");
                (module.to_string(), document)
            })
            .collect();

        // one snapshot per project directory
        insta::with_settings!({ snapshot_suffix => name }, {
            insta::assert_yaml_snapshot!(compiled);
        });
    });
}

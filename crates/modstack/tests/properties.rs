//! Behaviour of the public api on small documents

use modstack::extend::{ExtendResolver, ResourceId};
use modstack::function::{CodeIdentity, FunctionResolver, FunctionSchema};
use modstack::keyword::{processor, validator, Processors, Replacement, Validators};
use modstack::module_documents;
use modstack::path::Path;
use modstack::process::{process_keywords, ProcessError};
use modstack::source_map::get_resource_property_source;
use modstack::tree::{JsonTree, Node};
use modstack::validate::validate_keywords;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

fn documents() -> Vec<Value> {
    vec![
        json!(null),
        json!("text"),
        json!([]),
        json!({}),
        json!({ "z": 1, "a": [true, null, 1.5, { "nested": ["x", { "y": {} }] }], "m": { "k": "v" } }),
    ]
}

#[test]
fn round_trip() {
    for document in documents() {
        let tree = JsonTree::parse(&document);
        assert_eq!(tree.root().to_json(), document);
        assert_eq!(process_keywords(&tree, &Processors::new()).expect("processed"), document);
    }
}

#[test]
fn path_fidelity() {
    for document in documents() {
        let tree = JsonTree::parse(&document);
        let reparsed = JsonTree::parse(&tree.root().to_json());

        let mut pending = vec![tree.root()];
        while let Some(node) = pending.pop() {
            let found = reparsed.navigate(node.path().segments()).expect("path resolves");
            assert_eq!(found.node_type(), node.node_type());
            assert_eq!(found.value(), node.value());
            assert_eq!(found.to_json(), node.to_json());

            pending.extend(node.items());
            pending.extend(node.properties().map(|(_, child)| child));
        }
    }
}

#[test]
fn validator_accumulation() {
    let tree = JsonTree::parse(&json!({ "first": { "One": 1 }, "second": [{ "Two": 2 }] }));
    let mut validators = Validators::new();
    validators.insert(
        "One".into(),
        validator(|_: &str, _: Node<'_>, _: &Value| vec![anyhow::anyhow!("one")]),
    );
    validators.insert(
        "Two".into(),
        validator(|_: &str, _: Node<'_>, _: &Value| vec![anyhow::anyhow!("two")]),
    );

    let errors = validate_keywords(&tree, &validators);
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].path, Path::parse("first"));
    assert_eq!(errors[1].path, Path::parse("second.0"));
}

#[test]
fn mutual_exclusion_of_replacements() {
    let mut processors = Processors::new();
    processors.insert(
        "A".into(),
        processor(|_: &str, _: Node<'_>, _: &Value| Ok(Replacement::object(json!("a")))),
    );
    processors.insert(
        "B".into(),
        processor(|_: &str, _: Node<'_>, _: &Value| Ok(Replacement::object(json!("b")))),
    );

    let error = process_keywords(&JsonTree::parse(&json!({ "A": 1, "B": 2 })), &processors)
        .expect_err("conflict");
    match error {
        ProcessError::Conflict { keywords, .. } => assert_eq!(keywords, vec!["A", "B"]),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn level_overflow_names_origin() {
    let mut processors = Processors::new();
    processors.insert(
        "K".into(),
        processor(|_: &str, _: Node<'_>, _: &Value| Ok(Replacement::leveled(json!(0), 5))),
    );

    let error = process_keywords(&JsonTree::parse(&json!({ "x": { "y": { "K": 1 } } })), &processors)
        .expect_err("not possible");
    assert_eq!(
        error.to_string(),
        "replacement at level 5 was not possible at x.y"
    );
}

#[test]
fn extension_chain_determinism() {
    let resolver = ExtendResolver::new(module_documents! {
        "m1" => json!({ "Resources": { "r1": { "Type": "T", "Properties": { "P1": "hello" } } } }),
        "m2" => json!({ "Resources": { "r2": {
            "Type": "T",
            "Extend": { "module": "m1", "resource": "r1" },
            "Properties": { "P2": "world" }
        } } }),
        "m3" => json!({ "Resources": { "r3": {
            "Type": "T",
            "Extend": { "module": "m1", "resource": "r1" },
            "Properties": { "P3": "hi" }
        } } })
    })
    .expect("valid");

    let map = resolver.resource_map();
    let r1 = &map[&ResourceId::from_parts("m1", "r1")];
    for id in [ResourceId::from_parts("m2", "r2"), ResourceId::from_parts("m3", "r3")] {
        assert!(Arc::ptr_eq(r1, &map[&id]));
    }
    assert_eq!(
        r1.properties(),
        Some(&json!({ "P1": "hello", "P2": "world", "P3": "hi" }))
    );

    for (property, module, resource) in [("P1", "m1", "r1"), ("P2", "m2", "r2"), ("P3", "m3", "r3")] {
        let source = get_resource_property_source(&Path::parse(property), &r1.source_map);
        assert_eq!((source.module.as_str(), source.resource.as_str()), (module, resource));
    }
}

#[test]
fn append_attribution() {
    let resolver = ExtendResolver::new(module_documents! {
        "base" => json!({ "Resources": { "r": { "Type": "T", "Properties": { "List": ["a", "b"] } } } }),
        "ext" => json!({ "Resources": { "r": {
            "Type": "T",
            "Extend": { "module": "base", "resource": "r", "rules": { "List": "APPEND" } },
            "Properties": { "List": ["c"] }
        } } })
    })
    .expect("valid");

    let merged = resolver.get(&ResourceId::from_parts("base", "r")).expect("merged");
    assert_eq!(merged.properties(), Some(&json!({ "List": ["a", "b", "c"] })));

    let owner = |path: &str| get_resource_property_source(&Path::parse(path), &merged.source_map).module;
    assert_eq!(owner("List.0"), "base");
    assert_eq!(owner("List.1"), "base");
    assert_eq!(owner("List.2"), "ext");
}

#[test]
fn function_scenario_and_memoization() {
    let context = ExtendResolver::new(module_documents! {
        "m0" => json!({ "Resources": { "f0": {
            "Type": "AWS::Serverless::Function",
            "Properties": { "CodeUri": { "Function": { "name": "my-function" } } }
        } } }),
        "m1" => json!({ "Resources": {
            "f1": {
                "Type": "AWS::Serverless::Function",
                "Extend": { "module": "m0", "resource": "f0" },
                "Properties": { "Layers": [{ "Ref": { "resource": "l1" } }] }
            },
            "l1": { "Type": "AWS::Serverless::LayerVersion", "Properties": {} }
        } })
    })
    .expect("valid");

    let resolver = FunctionResolver::new(FunctionSchema::default(), vec![]);
    let id = ResourceId::from_parts("m0", "f0");
    let function = resolver.get_final_function_resource(&context, &id).expect("resolves");

    assert_eq!(
        function.code.function,
        CodeIdentity::new("m0".into(), "my-function".into())
    );
    assert_eq!(
        function.resource["Properties"]["Layers"],
        json!([{ "Ref": { "module": "m1", "resource": "l1" } }])
    );

    let again = resolver.get_final_function_resource(&context, &id).expect("resolves");
    assert!(Arc::ptr_eq(&function, &again));
    assert_eq!(resolver.compositions(), 1);
}

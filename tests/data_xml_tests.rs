//! XML instance parsing and printing against a compiled schema.

use yangkit::context::{Context, ContextOptions, SchemaFormat};
use yangkit::data::{
    DataFormat, DataNodeKind, DataTree, OpKind, ParseOptions, PrintOptions, WithDefaults,
};

fn ctx_with(modules: &[&str]) -> Context {
    let mut ctx = Context::new(ContextOptions::default()).unwrap();
    for m in modules {
        ctx.parse_module_str(m, SchemaFormat::Yang, true).unwrap();
    }
    ctx
}

const MOD_A: &str = r#"
    module a {
      namespace "urn:tests:a";
      prefix a;
      leaf foo { type string; }
      container cont {
        leaf inner { type uint8; }
        list srv {
          key "name";
          leaf name { type string; }
          leaf port { type uint16; }
        }
      }
      anyxml blob;
    }
"#;

#[test]
fn leaf_parse_and_shrink_round_trip() {
    let ctx = ctx_with(&[MOD_A]);
    let input = "<foo xmlns=\"urn:tests:a\">foo value</foo>";
    let tree =
        DataTree::parse_str(&ctx, input, DataFormat::Xml, ParseOptions::default()).unwrap();

    let root = tree.roots()[0];
    let node = tree.node(root);
    let snode = node.schema.unwrap();
    assert_eq!(&*ctx.schema().node(snode).name, "foo");
    match node.value().unwrap() {
        yangkit::schema::value::Value::String(s) => {
            assert_eq!(s.as_bytes(), b"foo value");
        }
        other => panic!("unexpected value {other:?}"),
    }

    let printed = tree
        .print_str(&ctx, DataFormat::Xml, PrintOptions::SHRINK, WithDefaults::Explicit)
        .unwrap();
    assert_eq!(printed, input);
}

#[test]
fn nested_container_round_trip() {
    let ctx = ctx_with(&[MOD_A]);
    let input = "<cont xmlns=\"urn:tests:a\"><inner>7</inner><srv><name>web</name><port>80</port></srv></cont>";
    let tree =
        DataTree::parse_str(&ctx, input, DataFormat::Xml, ParseOptions::default()).unwrap();
    let printed = tree
        .print_str(&ctx, DataFormat::Xml, PrintOptions::SHRINK, WithDefaults::Explicit)
        .unwrap();
    assert_eq!(printed, input);
}

#[test]
fn list_entries_keep_input_order() {
    let ctx = ctx_with(&[MOD_A]);
    let input = "<cont xmlns=\"urn:tests:a\"><srv><name>b</name></srv><srv><name>a</name></srv></cont>";
    let tree =
        DataTree::parse_str(&ctx, input, DataFormat::Xml, ParseOptions::default()).unwrap();
    let printed = tree
        .print_str(&ctx, DataFormat::Xml, PrintOptions::SHRINK, WithDefaults::Explicit)
        .unwrap();
    // Instance order within the list is preserved exactly.
    assert_eq!(printed, input);
}

#[test]
fn unknown_namespace_is_an_error() {
    let ctx = ctx_with(&[MOD_A]);
    let err = DataTree::parse_str(
        &ctx,
        "<foo xmlns=\"urn:nowhere\">x</foo>",
        DataFormat::Xml,
        ParseOptions::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("namespace"));
}

#[test]
fn unknown_element_is_an_error_unless_opaque() {
    let ctx = ctx_with(&[MOD_A]);
    let input = "<nope xmlns=\"urn:tests:a\">x</nope>";
    assert!(
        DataTree::parse_str(&ctx, input, DataFormat::Xml, ParseOptions::default()).is_err()
    );

    let tree =
        DataTree::parse_str(&ctx, input, DataFormat::Xml, ParseOptions::OPAQUE).unwrap();
    let node = tree.node(tree.roots()[0]);
    assert!(node.schema.is_none());
    match &node.kind {
        DataNodeKind::Opaq { name, value, .. } => {
            assert_eq!(&**name, "nope");
            assert_eq!(&**value, "x");
        }
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn mixed_content_is_rejected() {
    let ctx = ctx_with(&[MOD_A]);
    let err = DataTree::parse_str(
        &ctx,
        "<cont xmlns=\"urn:tests:a\">stray<inner>7</inner></cont>",
        DataFormat::Xml,
        ParseOptions::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("mixed"));
}

#[test]
fn anyxml_subtree_is_kept_verbatim() {
    let ctx = ctx_with(&[MOD_A]);
    let input = "<blob xmlns=\"urn:tests:a\"><x><y>1</y></x></blob>";
    let tree =
        DataTree::parse_str(&ctx, input, DataFormat::Xml, ParseOptions::default()).unwrap();
    let printed = tree
        .print_str(&ctx, DataFormat::Xml, PrintOptions::SHRINK, WithDefaults::Explicit)
        .unwrap();
    assert_eq!(printed, input);
}

#[test]
fn entity_references_are_resolved() {
    let ctx = ctx_with(&[MOD_A]);
    let tree = DataTree::parse_str(
        &ctx,
        "<foo xmlns=\"urn:tests:a\">a &lt;b&gt; &amp; &#99;</foo>",
        DataFormat::Xml,
        ParseOptions::default(),
    )
    .unwrap();
    match tree.node(tree.roots()[0]).value().unwrap() {
        yangkit::schema::value::Value::String(s) => assert_eq!(&**s, "a <b> & c"),
        other => panic!("unexpected value {other:?}"),
    }
}

#[test]
fn strict_requires_keys_first() {
    let ctx = ctx_with(&[MOD_A]);
    let input = "<cont xmlns=\"urn:tests:a\"><srv><port>80</port><name>web</name></srv></cont>";
    // Lenient parse accepts any order.
    assert!(
        DataTree::parse_str(&ctx, input, DataFormat::Xml, ParseOptions::default()).is_ok()
    );
    let err = DataTree::parse_str(&ctx, input, DataFormat::Xml, ParseOptions::STRICT)
        .unwrap_err();
    assert!(err.to_string().contains("key"));
}

#[test]
fn rpc_parse_resolves_against_input() {
    let ctx = ctx_with(&[r#"
        module op {
          namespace "urn:tests:op";
          prefix op;
          rpc activate {
            input { leaf mode { type string; } }
            output { leaf status { type string; } }
          }
        }
    "#]);
    let tree = DataTree::parse_op_str(
        &ctx,
        "<activate xmlns=\"urn:tests:op\"><mode>fast</mode></activate>",
        DataFormat::Xml,
        OpKind::Rpc,
    )
    .unwrap();
    let root = tree.roots()[0];
    let rpc_snode = tree.node(root).schema.unwrap();
    assert_eq!(&*ctx.schema().node(rpc_snode).name, "activate");
    assert_eq!(tree.node(root).children.len(), 1);

    // The reply parses as output children of the same rpc.
    let reply = DataTree::parse_op_str(
        &ctx,
        "<status xmlns=\"urn:tests:op\">done</status>",
        DataFormat::Xml,
        OpKind::Reply { request: rpc_snode },
    )
    .unwrap();
    let status = reply.roots()[0];
    assert_eq!(
        &*ctx.schema().node(reply.node(status).schema.unwrap()).name,
        "status"
    );
}

#[test]
fn metadata_attribute_from_loaded_module() {
    let ctx = ctx_with(&[
        MOD_A,
        r#"
        module notes {
          namespace "urn:tests:notes";
          prefix n;
          extension note { argument text; }
        }
        "#,
    ]);
    let tree = DataTree::parse_str(
        &ctx,
        "<foo xmlns=\"urn:tests:a\" xmlns:n=\"urn:tests:notes\" n:note=\"hi\">v</foo>",
        DataFormat::Xml,
        ParseOptions::default(),
    )
    .unwrap();
    let meta = &tree.node(tree.roots()[0]).meta;
    assert_eq!(meta.len(), 1);
    assert_eq!(&*meta[0].module, "notes");
    assert_eq!(&*meta[0].name, "note");
    assert_eq!(&*meta[0].value, "hi");
}

//! Validator behavior: defaults, when, must, mandatory, cardinality,
//! unique, leafref and instance-identifier resolution.

use yangkit::context::{Context, ContextOptions, SchemaFormat};
use yangkit::data::{
    DataFormat, DataTree, ParseOptions, PrintOptions, ValidationOptions, WithDefaults,
};
use yangkit::error::Error;
use yangkit::schema::value::Value;

fn ctx_with(modules: &[&str]) -> Context {
    let mut ctx = Context::new(ContextOptions::default()).unwrap();
    for m in modules {
        ctx.parse_module_str(m, SchemaFormat::Yang, true).unwrap();
    }
    ctx
}

fn parse_xml(ctx: &Context, xml: &str) -> DataTree {
    DataTree::parse_str(ctx, xml, DataFormat::Xml, ParseOptions::default()).unwrap()
}

#[test]
fn default_is_inserted_and_flagged() {
    let ctx = ctx_with(&[r#"
        module d {
          namespace "urn:tests:d";
          prefix d;
          leaf foo { type string; }
          leaf foo2 { type string; default "default-val"; }
        }
    "#]);
    let mut tree = parse_xml(&ctx, "<foo xmlns=\"urn:tests:d\">val</foo>");
    tree.validate(&ctx, ValidationOptions::default()).unwrap();

    let foo2 = tree
        .traverse()
        .into_iter()
        .find(|&id| {
            tree.node(id)
                .schema
                .is_some_and(|s| &*ctx.schema().node(s).name == "foo2")
        })
        .expect("default inserted");
    assert!(tree.node(foo2).is_default());
    assert_eq!(
        tree.node(foo2).value(),
        Some(&Value::String("default-val".into()))
    );

    let all = tree
        .print_str(
            &ctx,
            DataFormat::Xml,
            PrintOptions::SHRINK | PrintOptions::WITH_SIBLINGS,
            WithDefaults::All,
        )
        .unwrap();
    assert!(all.contains("default-val"));
    let trimmed = tree
        .print_str(
            &ctx,
            DataFormat::Xml,
            PrintOptions::SHRINK | PrintOptions::WITH_SIBLINGS,
            WithDefaults::Trim,
        )
        .unwrap();
    assert!(!trimmed.contains("default-val"));
}

#[test]
fn validation_is_idempotent() {
    let ctx = ctx_with(&[r#"
        module d {
          namespace "urn:tests:d";
          prefix d;
          leaf foo { type string; }
          leaf foo2 { type string; default "default-val"; }
        }
    "#]);
    let mut tree = parse_xml(&ctx, "<foo xmlns=\"urn:tests:d\">val</foo>");
    tree.validate(&ctx, ValidationOptions::default()).unwrap();
    let first = tree
        .print_str(
            &ctx,
            DataFormat::Xml,
            PrintOptions::SHRINK | PrintOptions::WITH_SIBLINGS,
            WithDefaults::All,
        )
        .unwrap();
    tree.validate(&ctx, ValidationOptions::default()).unwrap();
    let second = tree
        .print_str(
            &ctx,
            DataFormat::Xml,
            PrintOptions::SHRINK | PrintOptions::WITH_SIBLINGS,
            WithDefaults::All,
        )
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn leafref_resolution_and_failure() {
    let ctx = ctx_with(&[r#"
        module l {
          namespace "urn:tests:l";
          prefix l;
          leaf-list ll { type uint8; }
          leaf lref { type leafref { path "/ll"; require-instance true; } }
        }
    "#]);
    let mut tree = parse_xml(
        &ctx,
        "<ll xmlns=\"urn:tests:l\">10</ll>",
    );
    let more = parse_xml(&ctx, "<ll xmlns=\"urn:tests:l\">11</ll>");
    tree.merge(&ctx, more).unwrap();
    let lref_tree = parse_xml(&ctx, "<lref xmlns=\"urn:tests:l\">11</lref>");
    tree.merge(&ctx, lref_tree).unwrap();
    tree.validate(&ctx, ValidationOptions::default()).unwrap();

    let lref = tree
        .traverse()
        .into_iter()
        .find(|&id| {
            tree.node(id)
                .schema
                .is_some_and(|s| &*ctx.schema().node(s).name == "lref")
        })
        .unwrap();
    let target = tree.node(lref).target.expect("leafref resolved");
    assert_eq!(tree.node(target).value(), Some(&Value::Uint8(11)));

    // A dangling value fails with reference-not-found.
    let mut bad = parse_xml(&ctx, "<ll xmlns=\"urn:tests:l\">10</ll>");
    let dangling = parse_xml(&ctx, "<lref xmlns=\"urn:tests:l\">42</lref>");
    bad.merge(&ctx, dangling).unwrap();
    let err = bad.validate(&ctx, ValidationOptions::default()).unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn unique_constraint() {
    let ctx = ctx_with(&[r#"
        module u {
          namespace "urn:tests:u";
          prefix u;
          list lt {
            key "k";
            unique "l1";
            leaf k { type string; }
            leaf l1 { type string; }
          }
        }
    "#]);
    let mut tree = parse_xml(
        &ctx,
        "<lt xmlns=\"urn:tests:u\"><k>a</k><l1>same</l1></lt>",
    );
    let second = parse_xml(
        &ctx,
        "<lt xmlns=\"urn:tests:u\"><k>b</k><l1>same</l1></lt>",
    );
    tree.merge(&ctx, second).unwrap();
    let err = tree.validate(&ctx, ValidationOptions::default()).unwrap_err();
    match &err {
        Error::Constraint { message, .. } => {
            // The message names both conflicting entries by key.
            assert!(message.contains("k='a'"), "message: {message}");
            assert!(message.contains("k='b'"), "message: {message}");
        }
        other => panic!("unexpected error {other:?}"),
    }

    // A missing component disables the tuple.
    let mut ok = parse_xml(
        &ctx,
        "<lt xmlns=\"urn:tests:u\"><k>a</k><l1>same</l1></lt>",
    );
    let partial = parse_xml(&ctx, "<lt xmlns=\"urn:tests:u\"><k>b</k></lt>");
    ok.merge(&ctx, partial).unwrap();
    ok.validate(&ctx, ValidationOptions::default()).unwrap();
}

#[test]
fn must_violation_carries_path() {
    let ctx = ctx_with(&[r#"
        module m {
          namespace "urn:tests:m";
          prefix m;
          container c {
            leaf l { type string; }
            leaf l2 { type string; must "../l = 'right'"; }
          }
        }
    "#]);
    let mut bad = parse_xml(
        &ctx,
        "<c xmlns=\"urn:tests:m\"><l>wrong</l><l2>val</l2></c>",
    );
    let err = bad.validate(&ctx, ValidationOptions::default()).unwrap_err();
    match &err {
        Error::Constraint { path, .. } => {
            assert!(path.as_deref().unwrap().ends_with("/c/l2"));
        }
        other => panic!("unexpected error {other:?}"),
    }

    let mut good = parse_xml(
        &ctx,
        "<c xmlns=\"urn:tests:m\"><l>right</l><l2>val</l2></c>",
    );
    good.validate(&ctx, ValidationOptions::default()).unwrap();
}

#[test]
fn must_error_message_is_used() {
    let ctx = ctx_with(&[r#"
        module m {
          namespace "urn:tests:m";
          prefix m;
          leaf interval {
            type uint8;
            must ". <= 60" {
              error-message "interval must fit in a minute";
              error-app-tag too-long;
            }
          }
        }
    "#]);
    let mut tree = parse_xml(&ctx, "<interval xmlns=\"urn:tests:m\">90</interval>");
    let err = tree.validate(&ctx, ValidationOptions::default()).unwrap_err();
    match &err {
        Error::Constraint { message, app_tag, .. } => {
            assert_eq!(message, "interval must fit in a minute");
            assert_eq!(app_tag.as_deref(), Some("too-long"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn mandatory_leaf_is_enforced() {
    let ctx = ctx_with(&[r#"
        module m {
          namespace "urn:tests:m";
          prefix m;
          container c {
            presence "activates";
            leaf needed { type string; mandatory true; }
          }
        }
    "#]);
    let mut tree = parse_xml(&ctx, "<c xmlns=\"urn:tests:m\"/>");
    let err = tree.validate(&ctx, ValidationOptions::default()).unwrap_err();
    assert!(err.to_string().contains("mandatory"));
}

#[test]
fn min_max_elements() {
    let ctx = ctx_with(&[r#"
        module m {
          namespace "urn:tests:m";
          prefix m;
          leaf-list ll { type uint8; min-elements 2; max-elements 3; }
        }
    "#]);
    let mut too_few = parse_xml(&ctx, "<ll xmlns=\"urn:tests:m\">1</ll>");
    assert!(too_few.validate(&ctx, ValidationOptions::default()).is_err());

    let mut ok = parse_xml(&ctx, "<ll xmlns=\"urn:tests:m\">1</ll>");
    ok.merge(&ctx, parse_xml(&ctx, "<ll xmlns=\"urn:tests:m\">2</ll>")).unwrap();
    ok.validate(&ctx, ValidationOptions::default()).unwrap();

    let mut too_many = parse_xml(&ctx, "<ll xmlns=\"urn:tests:m\">1</ll>");
    for v in ["2", "3", "4"] {
        let next = parse_xml(&ctx, &format!("<ll xmlns=\"urn:tests:m\">{v}</ll>"));
        too_many.merge(&ctx, next).unwrap();
    }
    assert!(too_many.validate(&ctx, ValidationOptions::default()).is_err());
}

#[test]
fn when_false_removes_subtree() {
    let ctx = ctx_with(&[r#"
        module w {
          namespace "urn:tests:w";
          prefix w;
          leaf mode { type string; }
          leaf tuning { type string; when "../mode = 'advanced'"; }
        }
    "#]);
    let mut tree = parse_xml(&ctx, "<mode xmlns=\"urn:tests:w\">basic</mode>");
    tree.merge(&ctx, parse_xml(&ctx, "<tuning xmlns=\"urn:tests:w\">x</tuning>"))
        .unwrap();
    tree.validate(&ctx, ValidationOptions::default()).unwrap();
    let printed = tree
        .print_str(
            &ctx,
            DataFormat::Xml,
            PrintOptions::SHRINK | PrintOptions::WITH_SIBLINGS,
            WithDefaults::Explicit,
        )
        .unwrap();
    assert!(!printed.contains("tuning"));

    let mut kept = parse_xml(&ctx, "<mode xmlns=\"urn:tests:w\">advanced</mode>");
    kept.merge(&ctx, parse_xml(&ctx, "<tuning xmlns=\"urn:tests:w\">x</tuning>"))
        .unwrap();
    kept.validate(&ctx, ValidationOptions::default()).unwrap();
    let printed = kept
        .print_str(
            &ctx,
            DataFormat::Xml,
            PrintOptions::SHRINK | PrintOptions::WITH_SIBLINGS,
            WithDefaults::Explicit,
        )
        .unwrap();
    assert!(printed.contains("tuning"));
}

#[test]
fn choice_allows_single_case() {
    let ctx = ctx_with(&[r#"
        module ch {
          namespace "urn:tests:ch";
          prefix ch;
          choice transport {
            leaf tcp { type empty; }
            leaf udp { type empty; }
          }
        }
    "#]);
    let mut both = parse_xml(&ctx, "<tcp xmlns=\"urn:tests:ch\"/>");
    both.merge(&ctx, parse_xml(&ctx, "<udp xmlns=\"urn:tests:ch\"/>")).unwrap();
    let err = both.validate(&ctx, ValidationOptions::default()).unwrap_err();
    assert!(err.to_string().contains("case"));

    let mut one = parse_xml(&ctx, "<tcp xmlns=\"urn:tests:ch\"/>");
    one.validate(&ctx, ValidationOptions::default()).unwrap();
}

#[test]
fn state_data_rejected_when_config_only() {
    let ctx = ctx_with(&[r#"
        module s {
          namespace "urn:tests:s";
          prefix s;
          leaf counters { type uint32; config false; }
        }
    "#]);
    let mut tree = parse_xml(&ctx, "<counters xmlns=\"urn:tests:s\">5</counters>");
    assert!(tree.validate(&ctx, ValidationOptions::NO_STATE).is_err());
    let mut tree = parse_xml(&ctx, "<counters xmlns=\"urn:tests:s\">5</counters>");
    tree.validate(&ctx, ValidationOptions::default()).unwrap();
}

#[test]
fn collect_all_gathers_multiple_errors() {
    let ctx = ctx_with(&[r#"
        module m {
          namespace "urn:tests:m";
          prefix m;
          container c {
            presence "on";
            leaf a { type string; mandatory true; }
            leaf b { type string; mandatory true; }
          }
        }
    "#]);
    let mut tree = parse_xml(&ctx, "<c xmlns=\"urn:tests:m\"/>");
    let diag = tree.validate_collect(&ctx).unwrap();
    assert_eq!(diag.len(), 2);
}

#[test]
fn instance_identifier_requires_instance() {
    let ctx = ctx_with(&[r#"
        module inst {
          namespace "urn:tests:inst";
          prefix inst;
          leaf target { type string; }
          leaf pointer { type instance-identifier; }
        }
    "#]);
    let mut ok = parse_xml(&ctx, "<target xmlns=\"urn:tests:inst\">x</target>");
    ok.merge(
        &ctx,
        parse_xml(
            &ctx,
            "<pointer xmlns=\"urn:tests:inst\">/inst:target</pointer>",
        ),
    )
    .unwrap();
    ok.validate(&ctx, ValidationOptions::default()).unwrap();

    let mut bad = parse_xml(
        &ctx,
        "<pointer xmlns=\"urn:tests:inst\">/inst:missing</pointer>",
    );
    let err = bad.validate(&ctx, ValidationOptions::default()).unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn leaf_list_duplicates_rejected_for_config() {
    let ctx = ctx_with(&[r#"
        module m {
          namespace "urn:tests:m";
          prefix m;
          leaf-list tags { type string; }
        }
    "#]);
    let mut distinct = parse_xml(
        &ctx,
        "<tags xmlns=\"urn:tests:m\">x</tags><tags xmlns=\"urn:tests:m\">y</tags>",
    );
    distinct.validate(&ctx, ValidationOptions::default()).unwrap();

    let mut dup = parse_xml(
        &ctx,
        "<tags xmlns=\"urn:tests:m\">x</tags><tags xmlns=\"urn:tests:m\">x</tags>",
    );
    let err = dup.validate(&ctx, ValidationOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Duplicate { .. }));
}

#[test]
fn xpath_functions_in_must() {
    let ctx = ctx_with(&[r#"
        module x {
          namespace "urn:tests:x";
          prefix x;
          leaf-list members { type string; }
          container limits {
            must "count(../members) >= 2";
            leaf note { type string; }
          }
        }
    "#]);
    let mut tree = parse_xml(
        &ctx,
        "<limits xmlns=\"urn:tests:x\"><note>n</note></limits>",
    );
    tree.merge(&ctx, parse_xml(&ctx, "<members xmlns=\"urn:tests:x\">a</members>"))
        .unwrap();
    assert!(tree.validate(&ctx, ValidationOptions::default()).is_err());

    tree.merge(&ctx, parse_xml(&ctx, "<members xmlns=\"urn:tests:x\">b</members>"))
        .unwrap();
    tree.validate(&ctx, ValidationOptions::default()).unwrap();
}

#[test]
fn string_functions_in_must() {
    let ctx = ctx_with(&[r#"
        module x {
          namespace "urn:tests:x";
          prefix x;
          leaf host { type string; must "starts-with(., 'srv-') and string-length(.) > 5"; }
        }
    "#]);
    let mut ok = parse_xml(&ctx, "<host xmlns=\"urn:tests:x\">srv-01</host>");
    ok.validate(&ctx, ValidationOptions::default()).unwrap();

    let mut bad = parse_xml(&ctx, "<host xmlns=\"urn:tests:x\">web-01</host>");
    assert!(bad.validate(&ctx, ValidationOptions::default()).is_err());
}

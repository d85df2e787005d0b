//! Schema compilation: typedef chains, identities, uses/refine, augments,
//! deviations, features, leafrefs and the structural rules.

use yangkit::context::{Context, ContextOptions, SchemaFormat};
use yangkit::error::Error;
use yangkit::schema::types::{Range, TypeKind};
use yangkit::schema::{SchemaFlags, SnodeKind};
use yangkit::schema::value::Value;

fn ctx_with(modules: &[&str]) -> Context {
    let mut ctx = Context::new(ContextOptions::default()).unwrap();
    for m in modules {
        ctx.parse_module_str(m, SchemaFormat::Yang, true).unwrap();
    }
    ctx
}

#[test]
fn typedef_chain_merges_ranges() {
    let ctx = ctx_with(&[r#"
        module t {
          namespace "urn:tests:t";
          prefix t;
          typedef base-int { type int32 { range "10..100"; } }
          typedef mid-int { type base-int { range "20..50"; } }
          leaf v { type mid-int { range "25..30"; } }
        }
    "#]);
    let id = ctx.find_path("/t:v").unwrap();
    let node = ctx.schema().node(id);
    match &node.typ().unwrap().kind {
        TypeKind::Int { ranges, .. } => {
            assert_eq!(ranges, &vec![Range::new(25, 30)]);
        }
        other => panic!("unexpected kind {other:?}"),
    }
    assert_eq!(node.typ().unwrap().typedef.as_deref(), Some("mid-int"));
}

#[test]
fn typedef_widening_is_rejected() {
    let mut ctx = Context::new(ContextOptions::default()).unwrap();
    let err = ctx
        .parse_module_str(
            r#"
            module t {
              namespace "urn:tests:t";
              prefix t;
              typedef narrow { type uint8 { range "10..20"; } }
              leaf v { type narrow { range "5..15"; } }
            }
            "#,
            SchemaFormat::Yang,
            true,
        )
        .unwrap_err();
    assert!(err.to_string().contains("subset"));
}

#[test]
fn identity_closure_is_transitive() {
    let ctx = ctx_with(&[r#"
        module i {
          namespace "urn:tests:i";
          prefix i;
          identity crypto-alg;
          identity aes { base crypto-alg; }
          identity aes256 { base aes; }
        }
    "#]);
    let set = ctx.schema();
    let module = set.find_module("i").unwrap();
    let base = set.find_identity(module, "crypto-alg").unwrap();
    let aes = set.find_identity(module, "aes").unwrap();
    let aes256 = set.find_identity(module, "aes256").unwrap();
    assert!(set.identity(base).derived.contains(&aes));
    assert!(set.identity(base).derived.contains(&aes256));
    assert!(set.identity(aes).derived.contains(&aes256));
    assert!(!set.identity(aes256).derived.contains(&base));
}

#[test]
fn uses_expands_with_refine() {
    let ctx = ctx_with(&[r#"
        module g {
          namespace "urn:tests:g";
          prefix g;
          grouping endpoint {
            leaf address { type string; }
            leaf port { type uint16; }
          }
          container server {
            uses endpoint {
              refine port { default "8080"; }
            }
          }
        }
    "#]);
    let port = ctx.find_path("/g:server/port").unwrap();
    match &ctx.schema().node(port).kind {
        SnodeKind::Leaf { default, .. } => {
            assert_eq!(default, &Some(Value::Uint16(8080)));
        }
        other => panic!("unexpected kind {other:?}"),
    }
    assert!(ctx.find_path("/g:server/address").is_ok());
}

#[test]
fn grouping_cycle_is_detected() {
    let mut ctx = Context::new(ContextOptions::default()).unwrap();
    let err = ctx
        .parse_module_str(
            r#"
            module g {
              namespace "urn:tests:g";
              prefix g;
              grouping a { uses b; }
              grouping b { uses a; }
              container c { uses a; }
            }
            "#,
            SchemaFormat::Yang,
            true,
        )
        .unwrap_err();
    assert!(err.to_string().contains("cycle"));
}

#[test]
fn cross_module_augment() {
    let ctx = ctx_with(&[
        r#"
        module base-mod {
          namespace "urn:tests:base-mod";
          prefix bm;
          container top { leaf name { type string; } }
        }
        "#,
        r#"
        module add-mod {
          namespace "urn:tests:add-mod";
          prefix am;
          import base-mod { prefix bm; }
          augment "/bm:top" { leaf extra { type uint8; } }
        }
        "#,
    ]);
    let extra = ctx.find_path("/base-mod:top/add-mod:extra").unwrap();
    let set = ctx.schema();
    let module = set.node(extra).module;
    assert_eq!(&*set.module(module).name, "add-mod");
    // Augmented node inherits the target's config.
    assert!(set.node(extra).is_config());
}

#[test]
fn augment_duplicate_name_is_rejected() {
    let mut ctx = Context::new(ContextOptions::default()).unwrap();
    ctx.parse_module_str(
        r#"
        module base-mod {
          namespace "urn:tests:base-mod";
          prefix bm;
          container top { leaf name { type string; } }
        }
        "#,
        SchemaFormat::Yang,
        true,
    )
    .unwrap();
    let err = ctx
        .parse_module_str(
            r#"
            module bad {
              namespace "urn:tests:bad";
              prefix bad;
              import base-mod { prefix bm; }
              augment "/bm:top" { leaf extra { type string; } }
              augment "/bm:top" { leaf extra { type string; } }
            }
            "#,
            SchemaFormat::Yang,
            true,
        )
        .unwrap_err();
    assert!(matches!(err, Error::Duplicate { .. }));
}

#[test]
fn deviation_not_supported_removes_node() {
    let ctx = ctx_with(&[
        r#"
        module base-mod {
          namespace "urn:tests:base-mod";
          prefix bm;
          container top {
            leaf name { type string; }
            leaf kept { type string; }
          }
        }
        "#,
        r#"
        module dev-mod {
          namespace "urn:tests:dev-mod";
          prefix dm;
          import base-mod { prefix bm; }
          deviation "/bm:top/bm:name" { deviate not-supported; }
        }
        "#,
    ]);
    assert!(ctx.find_path("/base-mod:top/name").is_err());
    assert!(ctx.find_path("/base-mod:top/kept").is_ok());
}

#[test]
fn deviation_replace_type() {
    let ctx = ctx_with(&[
        r#"
        module base-mod {
          namespace "urn:tests:base-mod";
          prefix bm;
          leaf speed { type string; }
        }
        "#,
        r#"
        module dev-mod {
          namespace "urn:tests:dev-mod";
          prefix dm;
          import base-mod { prefix bm; }
          deviation "/bm:speed" { deviate replace { type uint32; } }
        }
        "#,
    ]);
    let speed = ctx.find_path("/base-mod:speed").unwrap();
    let typ = ctx.schema().node(speed).typ().unwrap();
    assert!(matches!(typ.kind, TypeKind::Int { .. }));
}

#[test]
fn leafref_resolves_to_real_type() {
    let ctx = ctx_with(&[r#"
        module l {
          namespace "urn:tests:l";
          prefix l;
          leaf-list ll { type uint8; }
          leaf lref { type leafref { path "/ll"; require-instance true; } }
        }
    "#]);
    let lref = ctx.find_path("/l:lref").unwrap();
    let target = ctx.find_path("/l:ll").unwrap();
    match &ctx.schema().node(lref).typ().unwrap().kind {
        TypeKind::LeafRef { target: t, realtype, require_instance, .. } => {
            assert_eq!(*t, Some(target));
            assert!(*require_instance);
            let real = realtype.as_ref().unwrap();
            assert!(matches!(real.kind, TypeKind::Int { .. }));
        }
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn leafref_to_missing_node_fails() {
    let mut ctx = Context::new(ContextOptions::default()).unwrap();
    let err = ctx
        .parse_module_str(
            r#"
            module l {
              namespace "urn:tests:l";
              prefix l;
              leaf lref { type leafref { path "/nothing"; } }
            }
            "#,
            SchemaFormat::Yang,
            true,
        )
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn config_true_under_false_is_rejected() {
    let mut ctx = Context::new(ContextOptions::default()).unwrap();
    let err = ctx
        .parse_module_str(
            r#"
            module c {
              namespace "urn:tests:c";
              prefix c;
              container state {
                config false;
                leaf oper { type string; config true; }
              }
            }
            "#,
            SchemaFormat::Yang,
            true,
        )
        .unwrap_err();
    assert!(matches!(err, Error::Semantic { .. }));
}

#[test]
fn config_is_inherited() {
    let ctx = ctx_with(&[r#"
        module c {
          namespace "urn:tests:c";
          prefix c;
          container state {
            config false;
            leaf oper { type string; }
          }
        }
    "#]);
    let oper = ctx.find_path("/c:state/oper").unwrap();
    assert!(!ctx.schema().node(oper).is_config());
}

#[test]
fn status_downgrade_is_rejected() {
    let mut ctx = Context::new(ContextOptions::default()).unwrap();
    let err = ctx
        .parse_module_str(
            r#"
            module s {
              namespace "urn:tests:s";
              prefix s;
              container old {
                status deprecated;
                leaf fresh { type string; status current; }
              }
            }
            "#,
            SchemaFormat::Yang,
            true,
        )
        .unwrap_err();
    assert!(err.to_string().contains("status"));
}

#[test]
fn list_keys_are_flagged() {
    let ctx = ctx_with(&[r#"
        module k {
          namespace "urn:tests:k";
          prefix k;
          list l1 {
            key "a b";
            leaf a { type string; }
            leaf b { type string; }
            leaf c { type string; }
          }
        }
    "#]);
    let set = ctx.schema();
    let a = ctx.find_path("/k:l1/a").unwrap();
    let c = ctx.find_path("/k:l1/c").unwrap();
    assert!(set.node(a).is_key());
    assert!(set.node(a).flags.contains(SchemaFlags::MANDATORY));
    assert!(!set.node(c).is_key());
    let list = ctx.find_path("/k:l1").unwrap();
    match &set.node(list).kind {
        SnodeKind::List { keys, .. } => assert_eq!(keys.len(), 2),
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn config_list_requires_key() {
    let mut ctx = Context::new(ContextOptions::default()).unwrap();
    let err = ctx
        .parse_module_str(
            r#"
            module k {
              namespace "urn:tests:k";
              prefix k;
              list l1 { leaf a { type string; } }
            }
            "#,
            SchemaFormat::Yang,
            true,
        )
        .unwrap_err();
    assert!(err.to_string().contains("key"));
}

#[test]
fn choice_shorthand_gets_implicit_case() {
    let ctx = ctx_with(&[r#"
        module ch {
          namespace "urn:tests:ch";
          prefix ch;
          choice transport {
            leaf tcp { type empty; }
            case tls { leaf cert { type string; } }
          }
        }
    "#]);
    // Both the shorthand leaf and the explicit case member resolve.
    assert!(ctx.find_path("/ch:tcp").is_ok());
    assert!(ctx.find_path("/ch:cert").is_ok());
    let choice = ctx.schema().find_module("ch").unwrap();
    let top: Vec<_> = ctx.schema().module(choice).children.clone();
    assert_eq!(top.len(), 1);
    match &ctx.schema().node(top[0]).kind {
        SnodeKind::Choice { .. } => {}
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn feature_gated_nodes_are_dropped() {
    let module = r#"
        module f {
          namespace "urn:tests:f";
          prefix f;
          feature extras;
          leaf always { type string; }
          leaf gated { type string; if-feature extras; }
        }
    "#;
    let ctx = ctx_with(&[module]);
    assert!(ctx.find_path("/f:always").is_ok());
    assert!(ctx.find_path("/f:gated").is_err());

    let mut ctx = Context::new(ContextOptions::default()).unwrap();
    ctx.parse_module_str(module, SchemaFormat::Yang, true).unwrap();
    ctx.enable_feature("f", "extras").unwrap();
    assert!(ctx.find_path("/f:gated").is_ok());
}

#[test]
fn submodule_contents_are_merged() {
    let mut ctx = Context::new(ContextOptions::default()).unwrap();
    ctx.parse_module_str(
        r#"
        submodule s-sub {
          belongs-to s-main { prefix sm; }
          leaf from-sub { type string; }
        }
        "#,
        SchemaFormat::Yang,
        true,
    )
    .unwrap();
    ctx.parse_module_str(
        r#"
        module s-main {
          namespace "urn:tests:s-main";
          prefix sm;
          include s-sub;
          leaf from-main { type string; }
        }
        "#,
        SchemaFormat::Yang,
        true,
    )
    .unwrap();
    assert!(ctx.find_path("/s-main:from-main").is_ok());
    assert!(ctx.find_path("/s-main:from-sub").is_ok());
}

#[test]
fn import_cycle_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("cyc-a.yang"),
        r#"module cyc-a {
            namespace "urn:tests:cyc-a";
            prefix ca;
            import cyc-b { prefix cb; }
        }"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("cyc-b.yang"),
        r#"module cyc-b {
            namespace "urn:tests:cyc-b";
            prefix cb;
            import cyc-a { prefix ca; }
        }"#,
    )
    .unwrap();
    let mut ctx = Context::new(ContextOptions::DISABLE_SEARCHDIR_CWD).unwrap();
    ctx.set_searchdir(dir.path()).unwrap();
    let err = ctx.load_module("cyc-a", None).unwrap_err();
    assert!(err.to_string().contains("cycle"));
    assert!(ctx.get_module("cyc-a", None).is_none());
}

#[test]
fn import_is_loaded_from_searchdir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("dep.yang"),
        r#"module dep {
            namespace "urn:tests:dep";
            prefix d;
            typedef percent { type uint8 { range "0..100"; } }
        }"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("app.yang"),
        r#"module app {
            namespace "urn:tests:app";
            prefix app;
            import dep { prefix d; }
            leaf load { type d:percent; }
        }"#,
    )
    .unwrap();
    let mut ctx = Context::new(ContextOptions::DISABLE_SEARCHDIR_CWD).unwrap();
    ctx.set_searchdir(dir.path()).unwrap();
    ctx.load_module("app", None).unwrap();
    assert!(ctx.get_module("app", None).unwrap().implemented);
    // The import is present but only for reference.
    let dep = ctx.get_module("dep", None).unwrap();
    assert!(!dep.implemented);
    let load = ctx.find_path("/app:load").unwrap();
    match &ctx.schema().node(load).typ().unwrap().kind {
        TypeKind::Int { ranges, .. } => assert_eq!(ranges, &vec![Range::new(0, 100)]),
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn schema_compile_is_deterministic() {
    let modules = [
        r#"
        module det-a {
          namespace "urn:tests:det-a";
          prefix da;
          container c { leaf x { type string; } leaf y { type int8; } }
        }
        "#,
        r#"
        module det-b {
          namespace "urn:tests:det-b";
          prefix db;
          import det-a { prefix da; }
          augment "/da:c" { leaf z { type boolean; } }
        }
        "#,
    ];
    let ctx1 = ctx_with(&modules);
    let ctx2 = ctx_with(&modules);
    let paths1: Vec<String> = ctx1
        .schema()
        .snodes
        .iter()
        .enumerate()
        .map(|(i, _)| ctx1.schema().schema_path(yangkit::schema::SnodeId(i as u32)))
        .collect();
    let paths2: Vec<String> = ctx2
        .schema()
        .snodes
        .iter()
        .enumerate()
        .map(|(i, _)| ctx2.schema().schema_path(yangkit::schema::SnodeId(i as u32)))
        .collect();
    assert_eq!(paths1, paths2);
}

//! Data tree comparison and path lookup.

use yangkit::context::{Context, ContextOptions, SchemaFormat};
use yangkit::data::{DataFormat, DataTree, DiffOp, ParseOptions};

fn ctx() -> Context {
    let mut ctx = Context::new(ContextOptions::default()).unwrap();
    ctx.parse_module_str(
        r#"
        module net {
          namespace "urn:tests:net";
          prefix net;
          container ifaces {
            list iface {
              key "name";
              leaf name { type string; }
              leaf mtu { type uint16; }
              leaf enabled { type boolean; }
            }
          }
        }
        "#,
        SchemaFormat::Yang,
        true,
    )
    .unwrap();
    ctx
}

fn parse(ctx: &Context, json: &str) -> DataTree {
    DataTree::parse_str(ctx, json, DataFormat::Json, ParseOptions::default()).unwrap()
}

#[test]
fn diff_reports_replace_create_delete() {
    let ctx = ctx();
    let old = parse(
        &ctx,
        r#"{"net:ifaces":{"iface":[
            {"name":"eth0","mtu":1500},
            {"name":"eth1","mtu":9000}
        ]}}"#,
    );
    let new = parse(
        &ctx,
        r#"{"net:ifaces":{"iface":[
            {"name":"eth0","mtu":1400},
            {"name":"eth2","mtu":1500}
        ]}}"#,
    );
    let diff = old.diff(&ctx, &new);
    assert!(!diff.is_empty());

    let replace = diff
        .iter()
        .find(|e| e.op == DiffOp::Replace)
        .expect("mtu change reported");
    assert!(replace.path.contains("eth0"));
    assert_eq!(replace.old.as_deref(), Some("1500"));
    assert_eq!(replace.new.as_deref(), Some("1400"));

    assert!(
        diff.iter()
            .any(|e| e.op == DiffOp::Delete && e.path.contains("eth1"))
    );
    assert!(
        diff.iter()
            .any(|e| e.op == DiffOp::Create && e.path.contains("eth2"))
    );
}

#[test]
fn identical_trees_produce_empty_diff() {
    let ctx = ctx();
    let a = parse(&ctx, r#"{"net:ifaces":{"iface":[{"name":"eth0","mtu":1500}]}}"#);
    let b = parse(&ctx, r#"{"net:ifaces":{"iface":[{"name":"eth0","mtu":1500}]}}"#);
    assert!(a.diff(&ctx, &b).is_empty());
}

#[test]
fn find_path_with_list_predicates() {
    let ctx = ctx();
    let tree = parse(
        &ctx,
        r#"{"net:ifaces":{"iface":[
            {"name":"eth0","mtu":1500},
            {"name":"eth1","mtu":9000}
        ]}}"#,
    );
    let mtu = tree
        .find_path(&ctx, "/net:ifaces/iface[name='eth1']/mtu")
        .unwrap();
    assert_eq!(
        tree.node(mtu).value(),
        Some(&yangkit::schema::value::Value::Uint16(9000))
    );
    assert!(tree.find_path(&ctx, "/net:ifaces/iface[name='eth9']/mtu").is_err());
}

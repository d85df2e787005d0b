//! Per-base value storing and canonical printing, exercised through XML
//! instance parsing against a compiled schema.

use rstest::rstest;
use yangkit::context::{Context, ContextOptions, SchemaFormat};
use yangkit::data::{DataFormat, DataTree, ParseOptions, PrintOptions, WithDefaults};
use yangkit::error::Error;
use yangkit::schema::value::Value;

const TYPES_MODULE: &str = r#"
    module types {
      yang-version 1.1;
      namespace "urn:tests:types";
      prefix ty;

      identity interface-kind;
      identity ethernet { base interface-kind; }
      identity fast-ethernet { base ethernet; }

      leaf i8 { type int8; }
      leaf u16 { type uint16 { range "100..1000"; } }
      leaf dec { type decimal64 { fraction-digits 1; } }
      leaf str { type string { length "3..10"; pattern "[a-z ]*"; } }
      leaf flag { type boolean; }
      leaf e { type empty; }
      leaf color { type enumeration { enum white; enum yellow { value 7; } } }
      leaf fl { type bits { bit zero; bit one; bit two { position 5; } } }
      leaf bin { type binary; }
      leaf kind { type identityref { base interface-kind; } }
      leaf un { type union { type int8; type string; } }
    }
"#;

fn types_ctx() -> Context {
    let mut ctx = Context::new(ContextOptions::default()).unwrap();
    ctx.parse_module_str(TYPES_MODULE, SchemaFormat::Yang, true).unwrap();
    ctx
}

fn parse_leaf(ctx: &Context, xml: &str) -> DataTree {
    DataTree::parse_str(ctx, xml, DataFormat::Xml, ParseOptions::default()).unwrap()
}

fn leaf_value(tree: &DataTree) -> Value {
    tree.node(tree.roots()[0]).value().unwrap().clone()
}

fn reprint(ctx: &Context, tree: &DataTree) -> String {
    tree.print_str(ctx, DataFormat::Xml, PrintOptions::SHRINK, WithDefaults::Explicit)
        .unwrap()
}

#[rstest]
#[case("15", Value::Int8(15))]
#[case("-128", Value::Int8(-128))]
#[case("+7", Value::Int8(7))]
#[case("0", Value::Int8(0))]
fn int8_lexical_forms(#[case] input: &str, #[case] expected: Value) {
    let ctx = types_ctx();
    let tree = parse_leaf(&ctx, &format!("<i8 xmlns=\"urn:tests:types\">{input}</i8>"));
    assert_eq!(leaf_value(&tree), expected);
}

#[test]
fn int8_store_trims_whitespace() {
    let ctx = types_ctx();
    let tree = parse_leaf(&ctx, "<i8 xmlns=\"urn:tests:types\">\n 15 \t\n</i8>");
    assert_eq!(leaf_value(&tree), Value::Int8(15));
    assert_eq!(reprint(&ctx, &tree), "<i8 xmlns=\"urn:tests:types\">15</i8>");
}

#[test]
fn int8_out_of_domain_fails() {
    let ctx = types_ctx();
    let err = DataTree::parse_str(
        &ctx,
        "<i8 xmlns=\"urn:tests:types\">128</i8>",
        DataFormat::Xml,
        ParseOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidValue { .. }));
}

#[test]
fn uint16_range_restriction() {
    let ctx = types_ctx();
    let tree = parse_leaf(&ctx, "<u16 xmlns=\"urn:tests:types\">150</u16>");
    assert_eq!(leaf_value(&tree), Value::Uint16(150));
    assert!(
        DataTree::parse_str(
            &ctx,
            "<u16 xmlns=\"urn:tests:types\">99</u16>",
            DataFormat::Xml,
            ParseOptions::default(),
        )
        .is_err()
    );
}

#[test]
fn decimal64_canonical_form() {
    let ctx = types_ctx();
    let tree = parse_leaf(&ctx, "<dec xmlns=\"urn:tests:types\">+8</dec>");
    assert_eq!(leaf_value(&tree), Value::Decimal64 { scaled: 80, fraction_digits: 1 });
    assert_eq!(reprint(&ctx, &tree), "<dec xmlns=\"urn:tests:types\">8.0</dec>");
}

#[test]
fn string_length_counts_code_points() {
    let ctx = types_ctx();
    // Shorter than 3 code points fails, even multi-byte ones count as one.
    assert!(
        DataTree::parse_str(
            &ctx,
            "<str xmlns=\"urn:tests:types\">ab</str>",
            DataFormat::Xml,
            ParseOptions::default(),
        )
        .is_err()
    );
    let tree = parse_leaf(&ctx, "<str xmlns=\"urn:tests:types\">test me</str>");
    assert_eq!(leaf_value(&tree), Value::String("test me".into()));
}

#[test]
fn string_pattern_mismatch() {
    let ctx = types_ctx();
    let err = DataTree::parse_str(
        &ctx,
        "<str xmlns=\"urn:tests:types\">NOPE</str>",
        DataFormat::Xml,
        ParseOptions::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("pattern"));
}

#[test]
fn boolean_and_empty() {
    let ctx = types_ctx();
    let tree = parse_leaf(&ctx, "<flag xmlns=\"urn:tests:types\">true</flag>");
    assert_eq!(leaf_value(&tree), Value::Boolean(true));

    let tree = parse_leaf(&ctx, "<e xmlns=\"urn:tests:types\"/>");
    assert_eq!(leaf_value(&tree), Value::Empty);
    assert_eq!(reprint(&ctx, &tree), "<e xmlns=\"urn:tests:types\"/>");

    assert!(
        DataTree::parse_str(
            &ctx,
            "<e xmlns=\"urn:tests:types\">x</e>",
            DataFormat::Xml,
            ParseOptions::default(),
        )
        .is_err()
    );
}

#[test]
fn enumeration_values() {
    let ctx = types_ctx();
    let tree = parse_leaf(&ctx, "<color xmlns=\"urn:tests:types\">yellow</color>");
    match leaf_value(&tree) {
        Value::Enum { name, value } => {
            assert_eq!(&*name, "yellow");
            assert_eq!(value, 7);
        }
        other => panic!("unexpected value {other:?}"),
    }
    assert!(
        DataTree::parse_str(
            &ctx,
            "<color xmlns=\"urn:tests:types\">red</color>",
            DataFormat::Xml,
            ParseOptions::default(),
        )
        .is_err()
    );
}

#[test]
fn bits_canonical_order() {
    let ctx = types_ctx();
    // Input order does not matter; canonical order is declaration order.
    let tree = parse_leaf(&ctx, "<fl xmlns=\"urn:tests:types\"> \t two  zero \n</fl>");
    assert_eq!(reprint(&ctx, &tree), "<fl xmlns=\"urn:tests:types\">zero two</fl>");
    assert!(
        DataTree::parse_str(
            &ctx,
            "<fl xmlns=\"urn:tests:types\">zero zero</fl>",
            DataFormat::Xml,
            ParseOptions::default(),
        )
        .is_err()
    );
}

#[test]
fn binary_kept_verbatim() {
    let ctx = types_ctx();
    let tree = parse_leaf(&ctx, "<bin xmlns=\"urn:tests:types\">aGVs\nbG8=</bin>");
    match leaf_value(&tree) {
        Value::Binary { b64 } => assert_eq!(&*b64, "aGVs\nbG8="),
        other => panic!("unexpected value {other:?}"),
    }
    assert!(
        DataTree::parse_str(
            &ctx,
            "<bin xmlns=\"urn:tests:types\">not base64!</bin>",
            DataFormat::Xml,
            ParseOptions::default(),
        )
        .is_err()
    );
}

#[test]
fn identityref_xml_and_json_forms() {
    let ctx = types_ctx();
    let tree = parse_leaf(&ctx, "<kind xmlns=\"urn:tests:types\">ty:fast-ethernet</kind>");
    match leaf_value(&tree) {
        Value::IdentityRef { name, module, .. } => {
            assert_eq!(&*name, "fast-ethernet");
            assert_eq!(&*module, "types");
        }
        other => panic!("unexpected value {other:?}"),
    }
    // JSON uses the module name as qualifier.
    let json = tree
        .print_str(&ctx, DataFormat::Json, yangkit::data::PrintOptions::SHRINK, WithDefaults::Explicit)
        .unwrap();
    assert!(json.contains("types:fast-ethernet"));

    // The base identity itself is not derived from itself.
    assert!(
        DataTree::parse_str(
            &ctx,
            "<kind xmlns=\"urn:tests:types\">ty:interface-kind</kind>",
            DataFormat::Xml,
            ParseOptions::default(),
        )
        .is_err()
    );
}

#[test]
fn union_picks_first_matching_member() {
    let ctx = types_ctx();
    let tree = parse_leaf(&ctx, "<un xmlns=\"urn:tests:types\">12</un>");
    assert_eq!(leaf_value(&tree), Value::Union(Box::new(Value::Int8(12))));

    let tree = parse_leaf(&ctx, "<un xmlns=\"urn:tests:types\">2x</un>");
    assert_eq!(
        leaf_value(&tree),
        Value::Union(Box::new(Value::String("2x".into())))
    );
}

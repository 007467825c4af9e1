use std::sync::Arc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use test_case::test_case;

use super::*;
use crate::resolver::HeaderResolver;

/// Resolver used by the conformance selectors
fn fields() -> HeaderResolver {
    HeaderResolver::new()
        .with("key", 42)
        .with("key1", 10)
        .with("key2", 5)
        .with("price", 19.5)
        .with("name", "widget")
        .with("quote", "it's")
        .with("flag", true)
        .with("text_number", "102")
        .with("キー", 42)
        .with("ключ", 10)
        .with("arg0", 10)
        .with("format", "json")
}

/// Panics on any lookup, proving a selector was folded completely
struct PanicResolver;

impl IdentifierResolver for PanicResolver {
    fn resolve(&self, path: &str) -> Value {
        panic!("unexpected resolution of '{}'", path)
    }
}

#[test_case("key = 42", true; "int equal")]
#[test_case("key <> 42", false; "int not equal")]
#[test_case("key != 41", true; "bang not equal")]
#[test_case("key == 42", true; "double equal")]
#[test_case("key > 40 AND key < 50", true; "range")]
#[test_case("key >= 42 AND key <= 42", true; "inclusive range")]
#[test_case("key BETWEEN 40 AND 45", true; "between")]
#[test_case("key NOT BETWEEN 40 AND 45", false; "not between")]
#[test_case("key IN (1, 2, 42)", true; "in list")]
#[test_case("key NOT IN (1, 2, 42)", false; "not in list")]
#[test_case("name IN ('gadget', 'widget')", true; "text in list")]
#[test_case("name LIKE 'wid%'", true; "like prefix")]
#[test_case("name LIKE '_idget'", true; "like single")]
#[test_case("name NOT LIKE 'wid%'", false; "not like")]
#[test_case("quote = 'it''s'", true; "escaped quote")]
#[test_case("'it''s' = 'its'", false; "escaped quote literal")]
#[test_case("price * 2 = 39", true; "float arithmetic")]
#[test_case("key1 + key2 = 15", true; "identifier arithmetic")]
#[test_case("key1 - key2 * 2 = 0", true; "precedence")]
#[test_case("(key1 - key2) * 2 = 10", true; "parentheses")]
#[test_case("--1.0 = 1.0", true; "double negation")]
#[test_case("-key = -42", true; "negated identifier")]
#[test_case("+key = 42", true; "unary plus")]
#[test_case("92d = 92", true; "double suffix")]
#[test_case("93f = 93", true; "float suffix")]
#[test_case("42L = key", true; "long suffix")]
#[test_case("0x2A = key", true; "hex literal")]
#[test_case("1.5e1 = 15", true; "exponent")]
#[test_case("text_number = 102", true; "text number coercion")]
#[test_case("text_number > 100", true; "text number ordering")]
#[test_case("flag", true; "bare boolean")]
#[test_case("flag = TRUE", true; "boolean equal")]
#[test_case("not flag", false; "not boolean")]
#[test_case("missing IS NULL", true; "is null")]
#[test_case("key IS NOT NULL", true; "is not null")]
#[test_case("missing = 1", false; "missing compares unknown")]
#[test_case("NOT (missing = 1)", false; "not unknown is unknown")]
#[test_case("missing = 1 OR key = 42", true; "unknown or true")]
#[test_case("missing = 1 AND key = 42", false; "unknown and true")]
#[test_case("not dummy", false; "not missing")]
#[test_case("name = 42", false; "type mismatch")]
#[test_case("flag = 1", false; "bool number mismatch")]
#[test_case("キー = 42 OR ключ > 56", true; "unicode identifiers")]
#[test_case("arg0 = 10 / 0", false; "division by zero")]
#[test_case("TRUE", true; "constant true")]
#[test_case("FALSE OR key = 42", true; "constant false or")]
fn test_conformance(selector: &str, expected: bool) {
    let compiled = compile(selector).unwrap();
    assert_eq!(compiled.evaluate(&fields()), expected, "{}", selector);
}

#[test_case("3 * 2 = 6", true; "arithmetic")]
#[test_case("'abc' LIKE 'a%'", true; "like")]
#[test_case("5 BETWEEN 1 AND 10", true; "between")]
#[test_case("5 IN (1, 2, 3)", false; "in")]
#[test_case("NULL IS NULL", true; "null")]
#[test_case("NOT FALSE", true; "not")]
#[test_case("'102' = 102", true; "text number")]
#[test_case("1 < 2 AND 2 < 3", true; "and")]
#[test_case("key = 1 AND FALSE", false; "false short circuit")]
#[test_case("key = 1 OR TRUE", true; "true short circuit")]
fn test_constant_folding(selector: &str, expected: bool) {
    let compiled = compile(selector).unwrap();
    assert_eq!(compiled.constant(), Some(&Value::Bool(expected)));
    assert_eq!(compiled.evaluate(&PanicResolver), expected);
}

#[test]
fn test_partial_folding() {
    let compiled = compile("key = 2 * 3 AND TRUE").unwrap();
    assert_eq!(compiled.to_string(), "(key) = (6)");
    assert_eq!(compiled.constant(), None);
}

#[test]
fn test_unknown_selector_value_is_absent() {
    let compiled = compile("missing > 1").unwrap();
    assert_eq!(compiled.evaluate_value(&fields()), Value::Absent);
    assert!(!compiled.evaluate(&fields()));
}

#[test]
fn test_integer_division_by_zero_is_nan() {
    let compiled = compile("8 / 0").unwrap();
    match compiled.constant() {
        Some(Value::Float(f)) => assert!(f.is_nan()),
        other => panic!("expected NaN, got {:?}", other),
    }
    // NaN equals itself so `field = field` is stable
    let nan = HeaderResolver::new().with("a", f64::NAN);
    assert!(compile("a = a").unwrap().evaluate(&nan));
    assert!(!compile("a > 1").unwrap().evaluate(&nan));
}

#[test]
fn test_integer_overflow_promotes_to_float() {
    let compiled = compile("9223372036854775807 + 1").unwrap();
    assert_eq!(
        compiled.constant(),
        Some(&Value::Float(9223372036854775808.0))
    );
}

#[test_case("key1 = key2 + 5", "key1 = 5 + key2"; "commutative add")]
#[test_case("a * b > 3", "b * a > 3"; "commutative multiply")]
#[test_case("5 < a", "a > 5"; "mirrored comparison")]
#[test_case("a = b", "b = a"; "equality")]
#[test_case("a = 1 AND b = 2", "b = 2 AND a = 1"; "and operands")]
#[test_case("a = 1 OR b = 2", "b = 2 or a = 1"; "or operands")]
#[test_case("a = 1 + 2", "a = 3"; "folded literal")]
#[test_case("a LIKE 'x%%y'", "a LIKE 'x%y'"; "collapsed like")]
fn test_structural_equality(lhs: &str, rhs: &str) {
    let (lhs, rhs) = (compile(lhs).unwrap(), compile(rhs).unwrap());
    assert_eq!(lhs, rhs);
    assert_eq!(lhs.to_string(), rhs.to_string());
}

#[test_case("a - b = 1", "b - a = 1"; "subtraction")]
#[test_case("a / 2 = 1", "2 / a = 1"; "division")]
#[test_case("a = 1", "a = 1.0"; "literal types")]
#[test_case("a LIKE 'x'", "a NOT LIKE 'x'"; "negation")]
fn test_structural_inequality(lhs: &str, rhs: &str) {
    assert_ne!(compile(lhs).unwrap(), compile(rhs).unwrap());
}

#[test_case("", 0; "empty")]
#[test_case("   ", 3; "blank")]
#[test_case("a =", 3; "missing operand")]
#[test_case("a = 1 b", 6; "trailing token")]
#[test_case("(a = 1", 6; "unclosed paren")]
#[test_case("a LIKE b", 7; "like needs string")]
#[test_case("a LIKE 'x' ESCAPE 'ab'", 18; "long escape")]
#[test_case("a IN (b)", 6; "in needs literals")]
#[test_case("a IS 1", 5; "is needs null")]
#[test_case("a BETWEEN 1 OR 2", 12; "between needs and")]
#[test_case("unknown('x') = 1", 0; "unknown function")]
#[test_case("PARSER('xml', 'a') = 1", 7; "unknown parser")]
#[test_case("a = 'open", 4; "unterminated string")]
fn test_compile_errors(selector: &str, position: usize) {
    let err = compile(selector).unwrap_err();
    assert_eq!(err.position(), Some(position), "{}", err);
}

#[test]
fn test_like_pattern_size_limit() {
    let compiler = SelectorCompiler::default().with_max_like_pattern(8);
    assert!(compiler.compile("a LIKE 'abcdefgh'").is_ok());
    let err = compiler.compile("a LIKE 'abcdefghi'").unwrap_err();
    assert_eq!(err.reason(), "LIKE pattern exceeds size limit");
}

#[test]
fn test_like_on_non_text_uses_rendering() {
    let resolver = HeaderResolver::new().with("code", 12993);
    assert!(compile("code LIKE '12%3'").unwrap().evaluate(&resolver));
    assert!(!compile("code LIKE '12%4'").unwrap().evaluate(&resolver));
    assert!(!compile("missing LIKE '%'").unwrap().evaluate(&resolver));
}

#[test]
fn test_like_escape() {
    let resolver = HeaderResolver::new().with("label", "50%_off");
    assert!(compile(r"label LIKE '50\%\_off' ESCAPE '\'")
        .unwrap()
        .evaluate(&resolver));
    assert!(!compile(r"label LIKE '5\%%' ESCAPE '\'")
        .unwrap()
        .evaluate(&resolver));
}

fn json_message(payload: serde_json::Value) -> crate::message::Message {
    crate::message::Message::builder(1)
        .meta("format", "json")
        .payload(payload.to_string())
        .build()
}

#[test]
fn test_parser_extension_forms() {
    let message = json_message(json!({ "temperature": 45, "site": { "id": "n-1" } }));

    for selector in [
        "PARSER('json', 'temperature') > 40",
        "parser('JSON', 'temperature') > 40",
        "json('temperature') > 40",
        "PARSER(format, 'temperature') > 40",
        "PARSER('json', 'site.id') = 'n-1'",
    ] {
        assert!(compile(selector).unwrap().evaluate(&message), "{}", selector);
    }
    assert!(!compile("PARSER('json', 'absent') > 40")
        .unwrap()
        .evaluate(&message));
}

#[test]
fn test_parser_extension_not_folded() {
    let compiled = compile("PARSER('json', 'temperature') > 40").unwrap();
    assert_eq!(compiled.constant(), None);
    assert_eq!(compiled.to_string(), "(PARSER('json', 'temperature')) > (40)");
}

#[test]
fn test_parser_extension_without_payload_is_unknown() {
    let compiled = compile("PARSER('json', 'temperature') IS NULL").unwrap();
    assert!(compiled.evaluate(&fields()));
    let garbage = crate::message::Message::builder(1).payload("{{").build();
    assert!(compiled.evaluate(&garbage));
}

#[test]
fn test_disabled_extensions() {
    let compiler = SelectorCompiler::default().with_extensions(ExtensionRegistry::empty());
    assert!(compiler.compile("json('a') = 1").is_err());
    assert!(compiler.compile("PARSER('json', 'a') = 1").is_err());
    assert!(compiler.compile("PARSER(format, 'a') = 1").is_err());
    assert!(compiler.compile("json = 1").is_ok());
}

#[test]
fn test_compiler_from_config() {
    let config = crate::config::SelectorConfig {
        extensions: vec!["yaml".to_string()],
        ..Default::default()
    };
    let err = SelectorCompiler::new(&config).unwrap_err();
    assert_eq!(err.reason(), "unknown parser extension 'yaml'");
    assert_eq!(err.position(), None);
}

#[test]
fn test_compiler_depth_from_config() {
    let config = crate::config::SelectorConfig {
        max_depth: 3,
        ..Default::default()
    };
    let compiler = SelectorCompiler::new(&config).unwrap();
    assert!(compiler.compile("(key = 42)").is_ok());
    assert!(compiler.compile("NOT NOT NOT NOT flag").is_err());
}

#[test]
fn test_deep_nesting_is_rejected() {
    let depth = 100_000;
    let parens = format!("{}a = 1{}", "(".repeat(depth), ")".repeat(depth));
    let nots = format!("{}flag", "NOT ".repeat(depth));
    let signs = format!("{}1 = a", "- ".repeat(depth));
    let chain = format!("a{} = 1", " + a".repeat(depth));
    let ors = vec!["a = 1"; depth].join(" OR ");

    for selector in [&parens, &nots, &signs, &chain, &ors] {
        let err = compile(selector).unwrap_err();
        assert_eq!(err.reason(), "selector nesting too deep");
        assert!(err.position().is_some());
    }
}

#[test]
fn test_nesting_within_limit() {
    let nested = format!("{}key = 42{}", "(".repeat(100), ")".repeat(100));
    assert!(compile(&nested).unwrap().evaluate(&fields()));

    let compiler = SelectorCompiler::default().with_max_depth(4);
    assert!(compiler.compile("((key = 42))").is_ok());
    assert!(compiler.compile("a + b + c + d + e = 1").is_err());
    assert!(compiler.compile("NOT NOT NOT NOT NOT flag").is_err());

    let unlimited = SelectorCompiler::default().with_max_depth(0);
    let chain = format!("key{} > 0", " + 1".repeat(500));
    assert!(unlimited.compile(&chain).unwrap().evaluate(&fields()));
}

#[test_case("(a AND TRUE) IS NULL"; "and true")]
#[test_case("(a OR FALSE) IS NULL"; "or false")]
#[test_case("(TRUE AND a + 1) IS NULL"; "arithmetic operand")]
fn test_identity_folding_keeps_non_boolean_operand(selector: &str) {
    let resolver = HeaderResolver::new().with("a", 5).with("b", true);
    let folded = compile(selector).unwrap();
    let unfolded = compile("(a AND b) IS NULL").unwrap();
    assert_eq!(folded.evaluate_value(&resolver), Value::Bool(true));
    assert_eq!(unfolded.evaluate_value(&resolver), Value::Bool(true));
}

#[test]
fn test_identity_folding_drops_literal_for_predicates() {
    assert_eq!(
        compile("(a = 1 AND TRUE) OR (b IS NULL OR FALSE)").unwrap(),
        compile("a = 1 OR b IS NULL").unwrap()
    );
    assert_eq!(compile("a AND TRUE").unwrap().to_string(), "(a) AND (TRUE)");
}

#[test]
fn test_like_quote_escape_reparses() {
    let resolver = HeaderResolver::new().with("label", "50%");
    let compiled = compile("label LIKE '50''%' ESCAPE ''''").unwrap();
    assert!(compiled.evaluate(&resolver));
    let reparsed = compile(&compiled.to_string()).unwrap();
    assert_eq!(reparsed, compiled);
}

#[test]
fn test_canonical_display() {
    let compiled = compile("b > 1 and a IN (1, 'x') OR c IS NOT NULL").unwrap();
    assert_eq!(
        compiled.to_string(),
        "((c) IS NOT NULL) OR (((a) IN (1, 'x')) AND ((b) > (1)))"
    );
}

#[test]
fn test_cache_shares_instances() {
    let cache = SelectorCache::default();
    let a = cache.get_or_compile("key = 1 + 1").unwrap();
    let b = cache.get_or_compile("key = 1 + 1").unwrap();
    let c = cache.get_or_compile("2 = key").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(cache.len(), 1);

    assert!(cache.get_or_compile("key = ").is_err());
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_cache_releases_unused() {
    let cache = SelectorCache::default();
    let selector = cache.get_or_compile("key = 1").unwrap();
    assert_eq!(cache.len(), 1);
    drop(selector);
    assert_eq!(cache.len(), 0);
    assert_eq!(cache.purge(), 2);
    assert!(cache.is_empty());

    let again = cache.get_or_compile("key = 1").unwrap();
    assert_eq!(again.to_string(), "(key) = (1)");
}

#[test]
fn test_cache_capacity() {
    let cache = SelectorCache::new(SelectorCompiler::default(), 1);
    let a = cache.get_or_compile("a = 1").unwrap();
    let b = cache.get_or_compile("b = 1").unwrap();
    let b2 = cache.get_or_compile("b = 1").unwrap();
    // Over capacity entries are still interned by tree
    assert!(Arc::ptr_eq(&b, &b2));
    assert_ne!(a, b);
}

fn arb_leaf() -> impl Strategy<Value = String> {
    prop_oneof![
        (-100i64..100).prop_map(|i| i.to_string()),
        "[a-d]".prop_map(|s| s.to_string()),
        Just("NULL".to_string()),
        Just("'text'".to_string()),
    ]
}

fn arb_selector() -> impl Strategy<Value = String> {
    let leaf = (arb_leaf(), arb_leaf(), prop_oneof!["=", "<>", "<", ">="])
        .prop_map(|(l, r, op)| format!("{} {} {}", l, op, r));
    leaf.prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({}) AND ({})", l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({}) OR ({})", l, r)),
            inner.prop_map(|e| format!("NOT ({})", e)),
        ]
    })
}

proptest! {
    #[test]
    fn prop_evaluation_is_deterministic(selector in arb_selector(), a in -5i64..5, b in -5i64..5) {
        let compiled = compile(&selector).unwrap();
        let resolver = HeaderResolver::new().with("a", a).with("b", b).with("c", "text");
        let first = compiled.evaluate_value(&resolver);
        prop_assert_eq!(first.clone(), compiled.evaluate_value(&resolver));
        prop_assert!(matches!(first, Value::Bool(_) | Value::Absent));
    }

    #[test]
    fn prop_folding_preserves_meaning(selector in arb_selector(), a in -5i64..5, b in -5i64..5, d in -5i64..5) {
        let resolver = HeaderResolver::new().with("a", a).with("b", b).with("c", "text").with("d", d);
        let compiled = compile(&selector).unwrap();
        let reparsed = compile(&compiled.to_string()).unwrap();
        prop_assert_eq!(
            compiled.evaluate_value(&resolver),
            reparsed.evaluate_value(&resolver)
        );
    }
}

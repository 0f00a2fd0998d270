use arcstr::ArcStr;
use indexmap::IndexMap;
use rust_decimal_macros::dec;

use super::*;

fn eval(s: &str, scope: &IndexMap<ArcStr, Value>) -> Result<Value, EvalError> {
    Expr::parse(s).expect("failed to parse expression").eval(scope)
}

#[test_log::test]
fn engineering_suffixes() {
    let scope = IndexMap::new();
    let cases = [
        ("1k", dec!(1000)),
        ("2.2K", dec!(2200)),
        ("10meg", dec!(10000000)),
        ("3MEG", dec!(3000000)),
        ("1m", dec!(0.001)),
        ("4.7u", dec!(0.0000047)),
        ("10n", dec!(0.00000001)),
        ("5p", dec!(0.000000000005)),
        ("1f", dec!(0.000000000000001)),
        ("2g", dec!(2000000000)),
        ("1t", dec!(1000000000000)),
        ("1mil", dec!(0.0000254)),
        ("1kohm", dec!(1000)),
        ("10pF", dec!(0.00000000001)),
        ("1e3", dec!(1000)),
        ("2.5e-3", dec!(0.0025)),
        (".5", dec!(0.5)),
    ];
    for (input, expected) in cases {
        assert_eq!(
            eval(input, &scope).unwrap(),
            Value::Number(expected),
            "parsing `{input}`"
        );
    }
}

#[test_log::test]
fn arithmetic_precedence() {
    let scope = IndexMap::new();
    assert_eq!(eval("1 + 2 * 3", &scope).unwrap(), Value::Number(dec!(7)));
    assert_eq!(eval("(1 + 2) * 3", &scope).unwrap(), Value::Number(dec!(9)));
    assert_eq!(eval("{ 8 / 2 - 1 }", &scope).unwrap(), Value::Number(dec!(3)));
    assert_eq!(eval("-2*-3", &scope).unwrap(), Value::Number(dec!(6)));
    assert_eq!(eval("10 - 2 - 3", &scope).unwrap(), Value::Number(dec!(5)));
}

#[test_log::test]
fn variables_resolve_from_scope() {
    let mut scope = IndexMap::new();
    scope.insert(arcstr::literal!("w"), Value::Number(dec!(2)));
    scope.insert(arcstr::literal!("model"), Value::Text(arcstr::literal!("nch")));

    assert_eq!(eval("w * 1u", &scope).unwrap(), Value::Number(dec!(0.000002)));
    assert_eq!(
        eval("model", &scope).unwrap(),
        Value::Text(arcstr::literal!("nch"))
    );
    assert_eq!(
        eval("l * 2", &scope),
        Err(EvalError::Unresolved(arcstr::literal!("l")))
    );
}

#[test_log::test]
fn invalid_arithmetic() {
    let mut scope = IndexMap::new();
    scope.insert(arcstr::literal!("s"), Value::Text(arcstr::literal!("abc")));
    assert_eq!(eval("1 / 0", &scope), Err(EvalError::DivisionByZero));
    assert_eq!(eval("s + 1", &scope), Err(EvalError::NonNumeric { op: '+' }));
    assert_eq!(
        eval("\"x\" * 2", &scope),
        Err(EvalError::NonNumeric { op: '*' })
    );
}

#[test_log::test]
fn symbolic_values_propagate() {
    let mut scope = IndexMap::new();
    scope.insert(arcstr::literal!("vdd"), Value::Symbolic(arcstr::literal!("vdd")));
    let value = eval("vdd / 2", &scope).unwrap();
    assert_eq!(value, Value::Symbolic(arcstr::literal!("(vdd/2)")));
    assert_eq!(value.to_string(), "{(vdd/2)}");
}

#[test_log::test]
fn parse_errors() {
    for input in ["", "1 +", "(1", "1 $ 2", "\"open"] {
        let err = Expr::parse(input).expect_err(input);
        assert_eq!(err.input, input);
    }
}

#[test_log::test]
fn expression_vars() {
    let expr = Expr::parse("a * (b + 2) - a").unwrap();
    let vars: Vec<&str> = expr.vars().into_iter().map(|v| v.as_str()).collect();
    assert_eq!(vars, ["a", "b", "a"]);
}

#[test_log::test]
fn numbers_print_normalized() {
    assert_eq!(Value::Number(dec!(1000.000)).to_string(), "1000");
    assert_eq!(Value::Number(dec!(0.0010)).to_string(), "0.001");
}

#[test_log::test]
fn device_ports_follow_kind() {
    let nmos = Cell::primitive("nfet", DeviceKind::Nmos);
    let ports: Vec<&str> = nmos.ports().map(|p| p.name.as_str()).collect();
    assert_eq!(ports, ["d", "g", "s", "b"]);
    assert_eq!(DeviceKind::Nmos.prefix(), 'M');

    let raw = DeviceKind::Subckt {
        cell: arcstr::literal!("opamp"),
        ports: vec![arcstr::literal!("inp"), arcstr::literal!("inn"), arcstr::literal!("out")],
    };
    assert_eq!(raw.prefix(), 'X');
    assert_eq!(raw.ports().len(), 3);
}

#[test_log::test]
fn net_connections_lists_instance_ports() {
    let mut schematic = Schematic::new();
    schematic.add_net("a");
    schematic.add_net("b");
    let mut r1 = Instance::new("r1", CellRef::new("lib", "res"));
    r1.connect("p", "a").connect("n", "b");
    let mut r2 = Instance::new("r2", CellRef::new("lib", "res"));
    r2.connect("p", "b").connect("n", "a");
    schematic.add_instance(r1).add_instance(r2);

    let on_a: Vec<(String, String)> = schematic
        .net_connections("a")
        .map(|(i, p)| (i.to_string(), p.to_string()))
        .collect();
    assert_eq!(
        on_a,
        [
            ("r1".to_string(), "p".to_string()),
            ("r2".to_string(), "n".to_string())
        ]
    );
}

#[test_log::test]
fn instance_paths() {
    let top = InstancePath::top();
    assert!(top.is_top());
    assert_eq!(top.qualify("out"), "out");
    let nested = top.child("amp1").child("bias");
    assert_eq!(nested.depth(), 2);
    assert_eq!(nested.to_string(), "amp1.bias");
    assert_eq!(nested.qualify("vb"), "amp1.bias.vb");
}

#[test_log::test]
fn interface_compatibility() {
    let mut a = Cell::subcircuit("inv", Schematic::new());
    a.add_port("in").add_port("out");
    let mut b = a.clone();
    b.add_param("w", ParamDecl::with_default("1u"));
    assert!(!a.same_interface(&b));
    a.add_param("w", ParamDecl::with_default("2u"));
    assert!(a.same_interface(&b));
}

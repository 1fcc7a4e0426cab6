use proptest::prelude::*;
use qgen_ast::{parse, Expr};
use qgen_cache::Fingerprint;

fn arb_ident() -> impl Strategy<Value = String> {
    "[A-Za-z_][A-Za-z0-9_]{0,6}"
}

fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        arb_ident().prop_map(Expr::identifier),
        (0u32..10_000).prop_map(|n| Expr::number(n.to_string())),
        "[ -~]{0,8}".prop_map(Expr::string),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        (arb_ident(), prop::collection::vec(inner, 0..4))
            .prop_map(|(head, args)| Expr::form(head, args))
    })
}

/// Render `expr` with arbitrary layout choices that must not affect its key.
fn render(expr: &Expr, ws: &str, double_quotes: bool, out: &mut String) {
    match expr {
        Expr::Identifier { name } => out.push_str(name),
        Expr::Number { literal } => out.push_str(literal),
        Expr::Str { value } if double_quotes => {
            out.push('"');
            for ch in value.chars() {
                match ch {
                    '\\' => out.push_str("\\\\"),
                    '"' => out.push_str("\\\""),
                    other => out.push(other),
                }
            }
            out.push('"');
        }
        Expr::Str { .. } => out.push_str(&expr.to_string()),
        Expr::Form { head, args } => {
            out.push('(');
            out.push_str(ws);
            out.push_str(head);
            for arg in args {
                out.push_str(ws);
                render(arg, ws, double_quotes, out);
            }
            out.push_str(ws);
            out.push(')');
        }
    }
}

proptest! {
    #[test]
    fn key_depends_only_on_structure(
        expr in arb_expr(),
        ws in prop::sample::select(vec![" ", "  ", "\n", "\t ", " \r\n "]),
        double_quotes in any::<bool>(),
    ) {
        let mut text = String::from(ws);
        render(&expr, ws, double_quotes, &mut text);
        text.push_str(ws);

        let module = parse(&text).expect("rendered text parses");
        prop_assert_eq!(module.body.len(), 1);
        let reparsed = &module.body[0].value;
        prop_assert_eq!(reparsed, &expr);
        prop_assert_eq!(Fingerprint::for_expr(reparsed), Fingerprint::for_expr(&expr));
    }

    #[test]
    fn structurally_different_exprs_get_different_keys(a in arb_expr(), b in arb_expr()) {
        prop_assume!(a != b);
        prop_assert_ne!(Fingerprint::for_expr(&a), Fingerprint::for_expr(&b));
    }
}

#[test]
fn literal_kinds_are_distinguished() {
    let keys = [
        Fingerprint::for_expr(&Expr::identifier("x1")),
        Fingerprint::for_expr(&Expr::string("x1")),
        Fingerprint::for_expr(&Expr::number("1")),
        Fingerprint::for_expr(&Expr::string("1")),
        Fingerprint::for_expr(&Expr::number("1.0")),
    ];
    for (i, a) in keys.iter().enumerate() {
        for b in &keys[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

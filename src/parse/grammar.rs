use winnow::ascii::{digit1, till_line_ending};
use winnow::combinator::{alt, cut_err, delimited, not, opt, preceded, repeat, terminated};
use winnow::error::{ContextError, ErrMode, ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

use crate::types::{
    ArithOp, CompareOp, Dictionary, Goal, List, Parameter, Pattern, Rule, Symbol, Term, Value,
};

use super::parser::ParsedPolicy;

const KEYWORDS: &[&str] = &[
    "if", "and", "or", "not", "cut", "matches", "in", "true", "false",
];

fn expected(description: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(description))
}

// -- Whitespace & comments --------------------------------------------------

fn ws(input: &mut &str) -> ModalResult<()> {
    let _: () = repeat(
        0..,
        alt((
            take_while(1.., |c: char| c.is_ascii_whitespace()).void(),
            ('#', till_line_ending).void(),
        )),
    )
    .parse_next(input)?;
    Ok(())
}

// -- Identifiers ------------------------------------------------------------

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn ident<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1, |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., is_ident_char),
    )
        .take()
        .parse_next(input)
}

/// An identifier that is not a reserved word.
fn name<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    ident
        .verify(|word: &str| !KEYWORDS.contains(&word))
        .parse_next(input)
}

fn keyword<'i>(word: &'static str) -> impl Parser<&'i str, &'i str, ErrMode<ContextError>> {
    terminated(word, not(one_of(is_ident_char)))
}

/// Items separated by commas up to `close`. A trailing comma is allowed.
fn comma_list<'i, O>(
    input: &mut &'i str,
    close: char,
    mut item: impl FnMut(&mut &'i str) -> ModalResult<O>,
) -> ModalResult<Vec<O>> {
    let mut items = Vec::new();
    loop {
        ws.parse_next(input)?;
        if opt(close).parse_next(input)?.is_some() {
            return Ok(items);
        }
        items.push(item(input).map_err(ErrMode::cut)?);
        ws.parse_next(input)?;
        if opt(',').parse_next(input)?.is_none() {
            cut_err(close)
                .context(StrContext::Expected(StrContextValue::CharLiteral(close)))
                .parse_next(input)?;
            return Ok(items);
        }
    }
}

// -- Values -----------------------------------------------------------------

fn string_literal(input: &mut &str) -> ModalResult<String> {
    '"'.parse_next(input)?;
    let mut s = String::new();
    loop {
        let ch = cut_err(any)
            .context(expected("closing quote"))
            .parse_next(input)?;
        match ch {
            '"' => return Ok(s),
            '\\' => match cut_err(any).parse_next(input)? {
                '"' => s.push('"'),
                '\\' => s.push('\\'),
                'n' => s.push('\n'),
                't' => s.push('\t'),
                other => {
                    s.push('\\');
                    s.push(other);
                }
            },
            c => s.push(c),
        }
    }
}

fn number(input: &mut &str) -> ModalResult<Value> {
    let text = (opt('-'), digit1, opt(('.', digit1)))
        .take()
        .parse_next(input)?;
    if text.contains('.') {
        let f: f64 = text
            .parse()
            .map_err(|_| ErrMode::from_input(input).cut())?;
        Ok(Value::Float(f))
    } else {
        let i: i64 = text
            .parse()
            .map_err(|_| ErrMode::from_input(input).cut())?;
        Ok(Value::Integer(i))
    }
}

fn list(input: &mut &str) -> ModalResult<List> {
    '['.parse_next(input)?;
    let mut list = List::default();
    loop {
        ws.parse_next(input)?;
        if opt(']').parse_next(input)?.is_some() {
            return Ok(list);
        }
        if opt('*').parse_next(input)?.is_some() {
            let rest = cut_err(name)
                .context(expected("rest variable"))
                .parse_next(input)?;
            list.rest = Some(Symbol::new(rest));
            (ws, cut_err(']'))
                .context(StrContext::Expected(StrContextValue::CharLiteral(']')))
                .parse_next(input)?;
            return Ok(list);
        }
        list.elements.push(cut_err(literal).parse_next(input)?);
        ws.parse_next(input)?;
        if opt(',').parse_next(input)?.is_none() {
            cut_err(']')
                .context(StrContext::Expected(StrContextValue::CharLiteral(']')))
                .parse_next(input)?;
            return Ok(list);
        }
    }
}

fn key<'i>(input: &mut &'i str) -> ModalResult<Symbol> {
    ws.parse_next(input)?;
    let key = alt((string_literal.map(Symbol::from), ident.map(Symbol::new)))
        .context(expected("field name"))
        .parse_next(input)?;
    (ws, cut_err(':')).parse_next(input)?;
    Ok(key)
}

fn dictionary(input: &mut &str) -> ModalResult<Dictionary> {
    '{'.parse_next(input)?;
    let fields = comma_list(input, '}', |input: &mut &str| {
        let key = key(input)?;
        let value = cut_err(literal).parse_next(input)?;
        Ok((key, value))
    })?;
    Ok(fields.into_iter().collect())
}

fn literal(input: &mut &str) -> ModalResult<Value> {
    ws.parse_next(input)?;
    alt((
        string_literal.map(Value::String),
        keyword("true").value(Value::Boolean(true)),
        keyword("false").value(Value::Boolean(false)),
        number,
        list.map(Value::List),
        dictionary.map(Value::Dictionary),
        name.map(|n| Value::Variable(Symbol::new(n))),
    ))
    .context(expected("value"))
    .parse_next(input)
}

// -- Patterns ---------------------------------------------------------------

fn pattern_fields(input: &mut &str) -> ModalResult<Dictionary> {
    '{'.parse_next(input)?;
    let fields = comma_list(input, '}', |input: &mut &str| {
        let key = key(input)?;
        let value = cut_err(field_value).parse_next(input)?;
        Ok((key, value))
    })?;
    Ok(fields.into_iter().collect())
}

/// `User` or `User{field: value, ...}`. Class names start with an uppercase letter.
fn class_pattern(input: &mut &str) -> ModalResult<Pattern> {
    let tag = ident
        .verify(|word: &str| word.starts_with(|c: char| c.is_ascii_uppercase()))
        .parse_next(input)?;
    let fields = opt(preceded(ws, pattern_fields)).parse_next(input)?;
    Ok(Pattern::Instance {
        tag: Symbol::new(tag),
        fields: fields.unwrap_or_default(),
    })
}

fn pattern(input: &mut &str) -> ModalResult<Pattern> {
    ws.parse_next(input)?;
    alt((pattern_fields.map(Pattern::Dictionary), class_pattern))
        .context(expected("pattern"))
        .parse_next(input)
}

/// Inside a pattern, a capitalized name is a nested class pattern.
fn field_value(input: &mut &str) -> ModalResult<Value> {
    ws.parse_next(input)?;
    alt((class_pattern.map(Value::Pattern), literal)).parse_next(input)
}

// -- Operands (precedence: additive < multiplicative < lookup < atom) -------

fn atom(input: &mut &str) -> ModalResult<Term> {
    ws.parse_next(input)?;
    alt((
        delimited('(', operand, (ws, cut_err(')'))),
        literal.map(Term::Value),
    ))
    .context(expected("operand"))
    .parse_next(input)
}

fn lookup(input: &mut &str) -> ModalResult<Term> {
    let base = atom(input)?;
    let fields: Vec<&str> = repeat(
        0..,
        preceded('.', cut_err(ident).context(expected("field name"))),
    )
    .parse_next(input)?;
    Ok(fields.into_iter().fold(base, |receiver, field| Term::Lookup {
        receiver: Box::new(receiver),
        field: Symbol::new(field),
    }))
}

fn fold_arithmetic(first: Term, rest: Vec<(ArithOp, Term)>) -> Term {
    rest.into_iter().fold(first, |left, (op, right)| Term::Arithmetic {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

fn multiplicative(input: &mut &str) -> ModalResult<Term> {
    let first = lookup(input)?;
    let rest: Vec<(ArithOp, Term)> = repeat(
        0..,
        (
            preceded(
                ws,
                alt((
                    '*'.value(ArithOp::Mul),
                    '/'.value(ArithOp::Div),
                    '%'.value(ArithOp::Rem),
                )),
            ),
            cut_err(lookup),
        ),
    )
    .parse_next(input)?;
    Ok(fold_arithmetic(first, rest))
}

fn operand(input: &mut &str) -> ModalResult<Term> {
    let first = multiplicative(input)?;
    let rest: Vec<(ArithOp, Term)> = repeat(
        0..,
        (
            preceded(ws, alt(('+'.value(ArithOp::Add), '-'.value(ArithOp::Sub)))),
            cut_err(multiplicative),
        ),
    )
    .parse_next(input)?;
    Ok(fold_arithmetic(first, rest))
}

// -- Goals (precedence: or < and < not < primary) ---------------------------

#[derive(Clone, Copy)]
enum Operator {
    Compare(CompareOp),
    Unify,
    Matches,
    In,
}

fn operator(input: &mut &str) -> ModalResult<Operator> {
    ws.parse_next(input)?;
    alt((
        "==".value(Operator::Compare(CompareOp::Eq)),
        "!=".value(Operator::Compare(CompareOp::Neq)),
        "<=".value(Operator::Compare(CompareOp::Lte)),
        ">=".value(Operator::Compare(CompareOp::Gte)),
        "<".value(Operator::Compare(CompareOp::Lt)),
        ">".value(Operator::Compare(CompareOp::Gt)),
        "=".value(Operator::Unify),
        keyword("matches").value(Operator::Matches),
        keyword("in").value(Operator::In),
    ))
    .parse_next(input)
}

fn call(input: &mut &str) -> ModalResult<Goal> {
    let rule = terminated(name, (ws, '(')).parse_next(input)?;
    let args = comma_list(input, ')', operand)?;
    Ok(Goal::Call {
        name: Symbol::new(rule),
        args,
    })
}

fn relation(input: &mut &str) -> ModalResult<Goal> {
    let left = operand(input)?;
    let checkpoint = input.checkpoint();
    let Some(op) = opt(operator).parse_next(input)? else {
        input.reset(&checkpoint);
        // A bare operand is only a goal when it is a boolean literal.
        return match left {
            Term::Value(Value::Boolean(true)) => Ok(Goal::truth()),
            Term::Value(Value::Boolean(false)) => Ok(Goal::falsehood()),
            _ => Err(ErrMode::from_input(input)),
        };
    };
    let goal = match op {
        Operator::Compare(op) => Goal::Compare {
            op,
            left,
            right: cut_err(operand).parse_next(input)?,
        },
        Operator::Unify => Goal::Unify(left, cut_err(operand).parse_next(input)?),
        Operator::Matches => Goal::Isa {
            value: left,
            pattern: Value::Pattern(cut_err(pattern).parse_next(input)?),
        },
        Operator::In => Goal::In {
            item: left,
            collection: cut_err(operand).parse_next(input)?,
        },
    };
    Ok(goal)
}

fn primary(input: &mut &str) -> ModalResult<Goal> {
    ws.parse_next(input)?;
    alt((
        delimited('(', body, (ws, ')')),
        keyword("cut").value(Goal::Cut),
        call,
        relation,
    ))
    .context(expected("goal"))
    .parse_next(input)
}

fn unary(input: &mut &str) -> ModalResult<Goal> {
    ws.parse_next(input)?;
    if opt(keyword("not")).parse_next(input)?.is_some() {
        let inner = cut_err(unary).parse_next(input)?;
        Ok(Goal::Not(Box::new(inner)))
    } else {
        primary(input)
    }
}

fn and_goal(input: &mut &str) -> ModalResult<Goal> {
    let first = unary(input)?;
    let rest: Vec<Goal> =
        repeat(0.., preceded((ws, keyword("and")), cut_err(unary))).parse_next(input)?;
    if rest.is_empty() {
        return Ok(first);
    }
    Ok(Goal::And(std::iter::once(first).chain(rest).collect()))
}

fn or_goal(input: &mut &str) -> ModalResult<Goal> {
    let first = and_goal(input)?;
    let rest: Vec<Goal> =
        repeat(0.., preceded((ws, keyword("or")), cut_err(and_goal))).parse_next(input)?;
    if rest.is_empty() {
        return Ok(first);
    }
    Ok(Goal::Or(std::iter::once(first).chain(rest).collect()))
}

fn body(input: &mut &str) -> ModalResult<Goal> {
    ws.parse_next(input)?;
    or_goal(input)
}

// -- Rule definitions -------------------------------------------------------

fn parameter(input: &mut &str) -> ModalResult<Parameter> {
    let value = literal(input)?;
    let specializer = opt(preceded((ws, ':'), cut_err(pattern))).parse_next(input)?;
    Ok(Parameter { value, specializer })
}

fn rule_def(input: &mut &str) -> ModalResult<Rule> {
    ws.parse_next(input)?;
    let rule = name.context(expected("rule name")).parse_next(input)?;

    ws.parse_next(input)?;
    cut_err('(')
        .context(StrContext::Expected(StrContextValue::CharLiteral('(')))
        .parse_next(input)?;
    let params = comma_list(input, ')', parameter)?;

    ws.parse_next(input)?;
    let condition = opt(preceded(
        keyword("if"),
        cut_err(body).context(expected("rule body")),
    ))
    .parse_next(input)?;

    ws.parse_next(input)?;
    cut_err(';')
        .context(StrContext::Expected(StrContextValue::CharLiteral(';')))
        .parse_next(input)?;

    let body = match condition {
        None => Vec::new(),
        Some(Goal::And(goals)) => goals,
        Some(goal) => vec![goal],
    };
    Ok(Rule {
        name: Symbol::new(rule),
        params,
        body,
    })
}

// -- Top-level parser -------------------------------------------------------

pub fn parse_policy(input: &mut &str) -> ModalResult<ParsedPolicy> {
    let rules: Vec<Rule> = repeat(0.., rule_def).parse_next(input)?;
    ws.parse_next(input)?;
    Ok(ParsedPolicy { rules })
}

/// Parse a single goal, e.g. for an interactive query.
pub fn parse_goal(input: &mut &str) -> ModalResult<Goal> {
    let goal = body(input)?;
    ws.parse_next(input)?;
    Ok(goal)
}

#[cfg(test)]
mod tests {
    use crate::parse::{parse, parse_query};
    use crate::types::{call, class, pattern, v, var};

    use super::*;

    fn single_rule(input: &str) -> Rule {
        let mut parsed = parse(input).unwrap();
        assert_eq!(parsed.rules.len(), 1, "expected one rule in {input:?}");
        parsed.rules.remove(0)
    }

    #[test]
    fn parse_fact() {
        let rule = single_rule(r#"owner(1, "alice");"#);
        assert_eq!(rule.name.as_str(), "owner");
        assert_eq!(rule.params[0].value, Value::Integer(1));
        assert_eq!(rule.params[1].value, Value::from("alice"));
        assert!(rule.is_fact());
    }

    #[test]
    fn parse_rule_with_call() {
        let rule = single_rule(r#"allow(actor, "read", doc) if owner(doc, actor);"#);
        assert_eq!(rule.arity(), 3);
        assert_eq!(rule.body, vec![call("owner", [v("doc"), v("actor")])]);
    }

    #[test]
    fn parse_specializers() {
        let rule = single_rule(r#"allow(u: User{role: "admin"}, "view", _: {});"#);
        assert_eq!(
            rule.params[0].specializer,
            Some(class("User").with("role", "admin"))
        );
        assert_eq!(rule.params[1].specializer, None);
        assert_eq!(rule.params[2].value, var("_"));
        assert_eq!(rule.params[2].specializer, Some(pattern()));
    }

    #[test]
    fn parse_nested_class_pattern_in_fields() {
        let rule = single_rule("r(d: Doc{owner: User{name: n}});");
        let expected = class("Doc").with("owner", class("User").with("name", var("n")));
        assert_eq!(rule.params[0].specializer, Some(expected));
    }

    #[test]
    fn parse_list_with_rest() {
        let rule = single_rule("member(x, [x, *_]);");
        assert_eq!(
            rule.params[1].value,
            Value::List(List::with_rest(vec![var("x")], "_"))
        );
        let rule = single_rule("empty([]);");
        assert_eq!(rule.params[0].value, Value::List(List::default()));
    }

    #[test]
    fn parse_dictionary_literal() {
        let rule = single_rule(r#"config({"max size": 10, mode: "strict",});"#);
        assert_eq!(
            rule.params[0].value,
            Value::from(Dictionary::new().with("max size", 10_i64).with("mode", "strict"))
        );
    }

    #[test]
    fn parse_conjunction_splits_into_body_goals() {
        let rule = single_rule("r(x) if x > 1 and x < 5 and x != 3;");
        assert_eq!(rule.body.len(), 3);
        assert_eq!(rule.body[0], v("x").gt(1_i64));
        assert_eq!(rule.body[2], v("x").neq(3_i64));
    }

    #[test]
    fn parse_precedence_and_before_or() {
        let rule = single_rule("r(x) if x = 1 or x = 2 and x = 3;");
        match &rule.body[0] {
            Goal::Or(branches) => {
                assert_eq!(branches[0], v("x").unify(1_i64));
                assert!(matches!(&branches[1], Goal::And(goals) if goals.len() == 2));
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn parse_parenthesized_goals() {
        let rule = single_rule("r(x) if (x = 1 or x = 2) and x > 0;");
        assert_eq!(rule.body.len(), 2);
        assert!(matches!(&rule.body[0], Goal::Or(_)));
    }

    #[test]
    fn parse_not_and_cut() {
        let rule = single_rule("r(u) if not banned(u) and cut;");
        assert_eq!(rule.body[0], !call("banned", [v("u")]));
        assert_eq!(rule.body[1], Goal::Cut);
    }

    #[test]
    fn parse_lookups_and_arithmetic() {
        let rule = single_rule("r(u, n) if u.profile.age + 1 >= n * 2;");
        assert_eq!(
            rule.body[0],
            (v("u").dot("profile").dot("age") + 1_i64).gte(v("n") * 2_i64)
        );
    }

    #[test]
    fn parse_parenthesized_arithmetic() {
        let rule = single_rule("r(a, b) if (a + b) * 2 == 10;");
        assert_eq!(rule.body[0], ((v("a") + v("b")) * 2_i64).eq(10_i64));
    }

    #[test]
    fn parse_all_operators() {
        let rule = single_rule(
            "r(x, y) if x == y and x != y and x < y and x <= y and x > y and x >= y \
             and x = y and x matches Integer and x in y;",
        );
        assert_eq!(rule.body.len(), 9);
        assert!(matches!(rule.body[6], Goal::Unify(..)));
        assert_eq!(rule.body[7], v("x").matches(class("Integer")));
        assert_eq!(rule.body[8], v("x").is_in(v("y")));
    }

    #[test]
    fn parse_true_and_false_goals() {
        assert!(single_rule("r() if true;").is_fact());
        assert_eq!(single_rule("r() if false;").body, vec![Goal::falsehood()]);
    }

    #[test]
    fn parse_negative_and_float_numbers() {
        let rule = single_rule("r(-5, 2.5, -0.5);");
        assert_eq!(rule.params[0].value, Value::Integer(-5));
        assert_eq!(rule.params[1].value, Value::Float(2.5));
        assert_eq!(rule.params[2].value, Value::Float(-0.5));
    }

    #[test]
    fn parse_subtraction_of_literal() {
        let rule = single_rule("r(x, y) if y = x - 1;");
        assert_eq!(rule.body[0], v("y").unify(v("x") - 1_i64));
    }

    #[test]
    fn parse_comments_and_blank_lines() {
        let parsed = parse("# header\n\nowner(1, 2); # trailing\n\n# footer\n").unwrap();
        assert_eq!(parsed.rules.len(), 1);
    }

    #[test]
    fn keywords_are_not_variables() {
        assert!(parse("r(and);").is_err());
        assert!(parse("if(x);").is_err());
        // Words that merely start with a keyword are fine.
        let rule = single_rule("r(order) if order = android;");
        assert_eq!(rule.body[0], v("order").unify(v("android")));
    }

    #[test]
    fn parse_string_with_escapes() {
        let rule = single_rule(r#"r("a\"b\\c\n");"#);
        assert_eq!(rule.params[0].value, Value::from("a\"b\\c\n"));
    }

    #[test]
    fn parse_query_goal() {
        let goal = parse_query(r#"allow(u, "read", d) and not u = d"#).unwrap();
        assert!(matches!(goal, Goal::And(ref goals) if goals.len() == 2));
    }
}

use std::sync::Arc;

use ruling::{parse_query, Authorizer, ClassRegistry, RuleSet};

fn main() {
    let rules = RuleSet::from_policy(
        r#"
        parent("viewer", "editor");
        parent("editor", "owner");
        parent("owner", "admin");

        inherits(a, b) if parent(a, b);
        inherits(a, c) if parent(a, b) and inherits(b, c);
        "#,
    )
    .expect("failed to load policy");

    let authorizer = Authorizer::new(Arc::new(rules), Arc::new(ClassRegistry::new()));

    // Every role that inherits from "viewer", in the order they are found.
    let goal = parse_query(r#"inherits("viewer", role)"#).expect("failed to parse query");
    for solution in authorizer.query(goal) {
        match solution {
            Ok(solution) => println!("{solution}"),
            Err(err) => {
                eprintln!("query aborted: {err}");
                break;
            }
        }
    }

    // Unbound variables come back as themselves.
    let goal = parse_query("x = [1, y]").expect("failed to parse query");
    for solution in authorizer.query(goal).flatten() {
        println!("{solution}");
    }
}

use std::sync::Arc;

use ruling::{call, v, var, Authorizer, ClassRegistry, Dictionary, RuleSetBuilder};

fn main() {
    // allow(actor, _action, doc) if owner(doc, actor);
    // owner(doc, actor) if doc.owner = actor;
    let rules = RuleSetBuilder::new()
        .rule("allow", |r| {
            r.param(var("actor"))
                .param(var("_action"))
                .param(var("doc"))
                .when(call("owner", [v("doc"), v("actor")]))
        })
        .rule("owner", |r| {
            r.param(var("doc"))
                .param(var("actor"))
                .when(v("doc").dot("owner").unify(v("actor")))
        })
        .compile()
        .expect("failed to compile ruleset");

    println!("{rules}");

    let authorizer = Authorizer::new(Arc::new(rules), Arc::new(ClassRegistry::new()));
    let doc = Dictionary::new().with("id", 1_i64).with("owner", "alice");

    for actor in ["alice", "bob"] {
        match authorizer.is_allowed(actor, "edit", doc.clone()) {
            Ok(allowed) => println!("{actor} may edit: {allowed}"),
            Err(err) => println!("{actor}: evaluation failed: {err}"),
        }
    }
}

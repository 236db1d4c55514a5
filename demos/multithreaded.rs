use std::sync::Arc;
use std::thread;

use ruling::{Authorizer, ClassRegistry, Dictionary, RuleSet};

fn main() {
    let rules = RuleSet::from_policy(
        r#"
        allow(actor, "read", doc) if doc.public = true or doc.owner = actor;
        allow(actor, "write", doc) if doc.owner = actor;
        "#,
    )
    .expect("failed to load policy");

    // Rules and host are shared; every query owns its own bindings.
    let authorizer = Authorizer::new(Arc::new(rules), Arc::new(ClassRegistry::new()));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let authorizer = authorizer.clone();
            thread::spawn(move || {
                let doc = Dictionary::new()
                    .with("owner", format!("user{}", i % 2))
                    .with("public", i >= 2);
                let actor = "user0";
                let read = authorizer.is_allowed(actor, "read", doc.clone());
                let write = authorizer.is_allowed(actor, "write", doc);
                println!("Thread {i}: read={read:?} write={write:?}");
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}

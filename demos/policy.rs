use std::sync::Arc;

use ruling::{Authorizer, ClassRegistry, Dictionary, RuleSet};
use tracing_subscriber::EnvFilter;

const POLICY: &str = r#"
# Admins can do anything to any repository.
allow(user: User, _action, _repo: Repository) if user.admin = true;

# Members may read; maintainers may also write.
allow(user: User, action, repo: Repository) if
    role in repo.roles and
    role.user = user.name and
    permits(role.name, action);

permits("member", "read");
permits("maintainer", action) if action in ["read", "write"];
"#;

fn main() {
    // RUST_LOG=ruling=trace shows every rule tried and every backtrack.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let rules = RuleSet::from_policy(POLICY).expect("failed to load policy");
    println!("{rules}");

    let mut host = ClassRegistry::new()
        .with_class("User", &[])
        .with_class("Repository", &[]);
    let alice = host
        .register_instance("User", Dictionary::new().with("name", "alice").with("admin", false))
        .expect("User is registered");
    let root = host
        .register_instance("User", Dictionary::new().with("name", "root").with("admin", true))
        .expect("User is registered");
    let roles = vec![Dictionary::new().with("user", "alice").with("name", "member")];
    let repo = host
        .register_instance("Repository", Dictionary::new().with("roles", roles))
        .expect("Repository is registered");

    let authorizer = Authorizer::new(Arc::new(rules), Arc::new(host));
    for (who, user) in [("alice", &alice), ("root", &root)] {
        for action in ["read", "write"] {
            let allowed = authorizer
                .is_allowed(user.clone(), action, repo.clone())
                .unwrap_or_else(|err| {
                    eprintln!("{err}");
                    false
                });
            println!("{who} {action}: {allowed}");
        }
    }
}

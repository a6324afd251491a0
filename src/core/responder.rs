use anyhow::Result;
use tracing::{error, info, warn};

use crate::core::models::{Role, User};
use crate::core::store::Store;

/// How a responder account picks the persona it answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderKind {
    /// A fixed role assigned to the account.
    Direct(String),
    /// No fixed role: borrow the sender's role, one hop only.
    Mirror,
    Unassigned,
}

impl ResponderKind {
    pub fn of(user: &User) -> Self {
        match (&user.role_id, user.is_system_persona) {
            (Some(role_id), _) => ResponderKind::Direct(role_id.clone()),
            (None, true) => ResponderKind::Mirror,
            (None, false) => ResponderKind::Unassigned,
        }
    }
}

pub struct ResponderResolver {
    store: Store,
}

impl ResponderResolver {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn resolve_role(&self, responder: &User, sender_user_id: &str) -> Result<Option<Role>> {
        match ResponderKind::of(responder) {
            ResponderKind::Direct(role_id) => {
                let role = self.store.get_role(&role_id).await?;
                if role.is_none() {
                    error!(
                        "User {} references missing role {}",
                        responder.username, role_id
                    );
                }
                Ok(role)
            }
            ResponderKind::Mirror => {
                let Some(sender) = self.store.get_user(sender_user_id).await? else {
                    warn!("Mirror {} could not find sender {}", responder.username, sender_user_id);
                    return Ok(None);
                };
                // The sender's own role only. A sender that is itself a mirror has none.
                let Some(role_id) = sender.role_id else {
                    info!(
                        "Mirror {} has no role to borrow from {}",
                        responder.username, sender.username
                    );
                    return Ok(None);
                };
                let role = self.store.get_role(&role_id).await?;
                if role.is_none() {
                    error!("Sender {} references missing role {}", sender.username, role_id);
                }
                Ok(role)
            }
            ResponderKind::Unassigned => {
                info!("User {} has no role", responder.username);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Organization;

    struct Fixture {
        store: Store,
        org: Organization,
        lawyer: Role,
        analyst: Role,
    }

    async fn fixture() -> Fixture {
        let store = Store::open_in_memory().unwrap();
        let org = Organization::new("Acme", "acme");
        store.insert_organization(&org).await.unwrap();
        let lawyer = Role::new(&org.id, "lawyer", "You are a lawyer.");
        let analyst = Role::new(&org.id, "analyst", "You are an analyst.");
        store.insert_role(&lawyer).await.unwrap();
        store.insert_role(&analyst).await.unwrap();
        Fixture {
            store,
            org,
            lawyer,
            analyst,
        }
    }

    async fn add(store: &Store, user: User) -> User {
        store.insert_user(&user).await.unwrap();
        user
    }

    #[test]
    fn kind_prefers_assigned_role_over_mirror_flag() {
        let user = User::new("org", "x").with_role("r1").mirror();
        assert_eq!(ResponderKind::of(&user), ResponderKind::Direct("r1".to_string()));
        assert_eq!(ResponderKind::of(&User::new("org", "y").mirror()), ResponderKind::Mirror);
        assert_eq!(ResponderKind::of(&User::new("org", "z")), ResponderKind::Unassigned);
    }

    #[tokio::test]
    async fn direct_role_ignores_sender() {
        let f = fixture().await;
        let bot = add(&f.store, User::new(&f.org.id, "legal_bot").with_role(&f.lawyer.id)).await;
        let sender = add(&f.store, User::new(&f.org.id, "ann").with_role(&f.analyst.id)).await;

        let resolver = ResponderResolver::new(f.store.clone());
        let role = resolver.resolve_role(&bot, &sender.id).await.unwrap().unwrap();
        assert_eq!(role.id, f.lawyer.id);
    }

    #[tokio::test]
    async fn mirror_borrows_sender_role() {
        let f = fixture().await;
        let mirror = add(&f.store, User::new(&f.org.id, "ai").mirror()).await;
        let sender = add(&f.store, User::new(&f.org.id, "ann").with_role(&f.analyst.id)).await;

        let resolver = ResponderResolver::new(f.store.clone());
        let role = resolver.resolve_role(&mirror, &sender.id).await.unwrap().unwrap();
        assert_eq!(role.id, f.analyst.id);
    }

    #[tokio::test]
    async fn mirror_without_sender_role_resolves_to_none() {
        let f = fixture().await;
        let mirror = add(&f.store, User::new(&f.org.id, "ai").mirror()).await;
        let plain = add(&f.store, User::new(&f.org.id, "bob")).await;
        let other_mirror = add(&f.store, User::new(&f.org.id, "ai2").mirror()).await;

        let resolver = ResponderResolver::new(f.store.clone());
        assert!(resolver.resolve_role(&mirror, &plain.id).await.unwrap().is_none());
        assert!(resolver.resolve_role(&mirror, &other_mirror.id).await.unwrap().is_none());
        assert!(resolver.resolve_role(&mirror, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unassigned_and_dangling_roles_resolve_to_none() {
        let f = fixture().await;
        let plain = add(&f.store, User::new(&f.org.id, "bob")).await;
        let resolver = ResponderResolver::new(f.store.clone());
        assert!(resolver.resolve_role(&plain, &plain.id).await.unwrap().is_none());

        let dangling = User::new(&f.org.id, "ghost").with_role("no-such-role");
        assert!(resolver.resolve_role(&dangling, &plain.id).await.unwrap().is_none());
    }
}

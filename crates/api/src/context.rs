use haulbook_core::{Actor, OrgId};

/// Organization and actor a request runs as.
///
/// Inserted by the context middleware; every domain route requires it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequestContext {
    org_id: OrgId,
    actor: Actor,
}

impl RequestContext {
    pub fn new(org_id: OrgId, actor: Actor) -> Self {
        Self { org_id, actor }
    }

    pub fn org_id(&self) -> OrgId {
        self.org_id
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }
}

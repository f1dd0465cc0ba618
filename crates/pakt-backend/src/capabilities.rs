use pakt_types::{Bitfield, Filter, Group, Role};

/// Identity of a loaded backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub name: String,
    pub author: String,
    pub description: String,
}

/// What a backend can do. Computed once at load and cached; the engine
/// refuses roles outside `roles` without ever dispatching.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub roles: Bitfield<Role>,
    pub filters: Bitfield<Filter>,
    pub groups: Bitfield<Group>,
    pub mime_types: Vec<String>,
    /// When false the engine runs at most one job at a time.
    pub supports_parallelization: bool,
}

impl Capabilities {
    pub fn supports_role(&self, role: Role) -> bool {
        self.roles.contains(role)
    }
}

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    RequestContent,
    ApproveRequests,
    ManageLibrary,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::RequestContent => "request_content",
            Permission::ApproveRequests => "approve_requests",
            Permission::ManageLibrary => "manage_library",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "request_content" => Some(Permission::RequestContent),
            "approve_requests" => Some(Permission::ApproveRequests),
            "manage_library" => Some(Permission::ManageLibrary),
            _ => None,
        }
    }

    /// Parse a comma separated permission list. Unknown names are ignored.
    pub fn parse_list(s: &str) -> Vec<Permission> {
        s.split(',').filter_map(Permission::from_str).collect()
    }
}

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: String,
    pub permissions: Vec<Permission>,
}

impl Requester {
    pub fn new(user_id: impl Into<String>, permissions: Vec<Permission>) -> Self {
        Self {
            user_id: user_id.into(),
            permissions,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

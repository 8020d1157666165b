pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_ASSEMBLYMAN: &str = "assemblyman";
pub const ROLE_CONSTITUENT: &str = "constituent";

/// Roles allowed to dispatch SMS broadcasts from the portal.
pub const SMS_SENDER_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_ASSEMBLYMAN];

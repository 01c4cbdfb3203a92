use crate::models::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavItem {
    pub path: &'static str,
    pub label: &'static str,
}

const fn item(path: &'static str, label: &'static str) -> NavItem {
    NavItem { path, label }
}

const ADMIN: &[NavItem] = &[
    item("/dashboard", "Overview"),
    item("/dashboard/incidents-map", "Incidents Map"),
    item("/dashboard/manage-incidents", "Manage Incidents"),
    item("/dashboard/users", "User Management"),
];

const STUDENT: &[NavItem] = &[
    item("/dashboard", "Dashboard"),
    item("/dashboard/book-session", "Book Session"),
    item("/dashboard/my-sessions", "My Sessions"),
    item("/dashboard/wellness", "Wellness"),
];

const GUARD: &[NavItem] = &[
    item("/dashboard", "Report Incident"),
    item("/dashboard/past-reports", "Past Reports"),
];

const FACULTY: &[NavItem] = &[
    item("/dashboard", "Session Requests"),
    item("/dashboard/student-behavior", "Behavioral Trends"),
];

const PARENT: &[NavItem] = &[
    item("/dashboard", "Safety Score"),
    item("/dashboard/initiatives", "Campus Initiatives"),
];

const VISITOR: &[NavItem] = &[item("/check-in", "Digital Guest Log")];

/// Ordered navigation entries for a role.
pub fn menu(role: Role) -> &'static [NavItem] {
    match role {
        Role::Admin => ADMIN,
        Role::Student => STUDENT,
        Role::Guard => GUARD,
        Role::Faculty => FACULTY,
        Role::Parent => PARENT,
        Role::Visitor => VISITOR,
    }
}

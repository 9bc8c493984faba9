//! URL declarations for the platform API.

use service_core::routing::{path, Route, RouteError, RouteTable};

use crate::handlers::applications::application_viewset;
use crate::startup::AppState;

/// Lookup name of the application route.
pub const APPLY_ROUTE: &str = "apply";

pub fn url_patterns() -> Vec<Route<AppState>> {
    vec![path("api/v1/apply/", application_viewset(), APPLY_ROUTE)]
}

pub fn route_table() -> Result<RouteTable<AppState>, RouteError> {
    RouteTable::from_patterns(url_patterns())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_is_the_only_route() {
        let table = route_table().unwrap();
        assert_eq!(table.len(), 1);
        let names: Vec<_> = table.iter().map(|r| r.name()).collect();
        assert_eq!(names, [APPLY_ROUTE]);
    }

    #[test]
    fn test_apply_path_resolves_to_apply() {
        let table = route_table().unwrap();
        let route = table.resolve("/api/v1/apply/").expect("route registered");
        assert_eq!(route.name(), APPLY_ROUTE);
        assert!(table.resolve("/api/v1/apply").is_none());
        assert!(table.resolve("/api/v1/").is_none());
        assert!(table.resolve("/api/v2/apply/").is_none());
    }

    #[test]
    fn test_reverse_apply() {
        let table = route_table().unwrap();
        assert_eq!(table.reverse(APPLY_ROUTE), Ok("/api/v1/apply/"));
        assert_eq!(table.resolver().reverse(APPLY_ROUTE), Ok("/api/v1/apply/"));
    }
}

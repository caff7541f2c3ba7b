//! Route classification for the authorization gate.
//!
//! Pure table lookup over the static page-route registry: no network or
//! storage access. Unknown paths classify as public; denying them when a
//! token is missing is the gate's token-presence rule, not the classifier's.

use crate::session::Role;

/// Answer for a classified path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RouteClass {
    /// Login/signup/reset pages a signed-in user is bounced away from.
    pub is_auth_route: bool,
    /// Pages that require an authenticated session.
    pub is_private_route: bool,
    /// Minimum role for private pages; `None` for public and auth pages.
    pub min_role: Option<Role>,
}

impl RouteClass {
    const PUBLIC: Self = Self {
        is_auth_route: false,
        is_private_route: false,
        min_role: None,
    };

    const AUTH: Self = Self {
        is_auth_route: true,
        is_private_route: false,
        min_role: None,
    };

    const fn private(min_role: Role) -> Self {
        Self {
            is_auth_route: false,
            is_private_route: true,
            min_role: Some(min_role),
        }
    }
}

/// Static registry mapping page-route prefixes to their classification.
/// A prefix matches the exact path or any sub-path (`/users` and `/users/42`).
const ROUTES: &[(&str, RouteClass)] = &[
    ("/login", RouteClass::AUTH),
    ("/signup", RouteClass::AUTH),
    ("/reset-password", RouteClass::AUTH),
    ("/two-factor", RouteClass::AUTH),
    ("/activate", RouteClass::PUBLIC),
    ("/invite", RouteClass::PUBLIC),
    ("/checkout", RouteClass::PUBLIC),
    ("/sem-permissao", RouteClass::PUBLIC),
    ("/bling", RouteClass::private(Role::User)),
    ("/dashboard", RouteClass::private(Role::User)),
    ("/onboarding", RouteClass::private(Role::User)),
    ("/settings", RouteClass::private(Role::User)),
    ("/admin", RouteClass::private(Role::Admin)),
    ("/users", RouteClass::private(Role::SuperAdmin)),
];

/// Classify a normalized URL path (leading slash, no query string).
#[must_use]
pub fn classify(path: &str) -> RouteClass {
    let path = normalize(path);
    for (prefix, class) in ROUTES {
        if matches_prefix(path, prefix) {
            return *class;
        }
    }
    RouteClass::PUBLIC
}

/// Drop a trailing slash so `/dashboard/` and `/dashboard` classify alike.
fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

/// Prefix match on a path-segment boundary.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_routes_classify_as_auth() {
        for path in ["/login", "/signup", "/reset-password", "/two-factor"] {
            let class = classify(path);
            assert!(class.is_auth_route, "{path} should be an auth route");
            assert!(!class.is_private_route);
            assert_eq!(class.min_role, None);
        }
    }

    #[test]
    fn private_routes_carry_min_role() {
        assert_eq!(classify("/dashboard").min_role, Some(Role::User));
        assert_eq!(classify("/bling").min_role, Some(Role::User));
        assert_eq!(classify("/admin").min_role, Some(Role::Admin));
        assert_eq!(classify("/users").min_role, Some(Role::SuperAdmin));
        assert!(classify("/dashboard").is_private_route);
    }

    #[test]
    fn sub_paths_inherit_the_prefix_class() {
        assert_eq!(classify("/users/42"), classify("/users"));
        assert_eq!(classify("/dashboard/alerts"), classify("/dashboard"));
        // A longer segment is not a sub-path of a shorter prefix.
        assert_eq!(classify("/usersandmore"), RouteClass::PUBLIC);
    }

    #[test]
    fn unknown_paths_fail_open_as_public() {
        for path in ["/", "/pricing", "/whatever/deep/path"] {
            let class = classify(path);
            assert!(!class.is_auth_route);
            assert!(!class.is_private_route);
            assert_eq!(class.min_role, None);
        }
    }

    #[test]
    fn trailing_slash_is_ignored() {
        assert_eq!(classify("/dashboard/"), classify("/dashboard"));
        assert_eq!(classify("/login/"), classify("/login"));
    }

    #[test]
    fn not_authorized_page_is_reachable_while_signed_in() {
        let class = classify("/sem-permissao");
        assert!(!class.is_auth_route);
        assert!(!class.is_private_route);
    }
}

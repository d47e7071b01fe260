use serde::Serialize;

use crate::models::{Identity, Provider};
use crate::{CoreError, CoreResult};

pub const PROVIDER_ROUTE_PREFIX: &str = "/provider";
pub const CUSTOMER_HOME: &str = "/dashboard";
pub const PROVIDER_HOME: &str = "/provider/dashboard";
pub const PROVIDER_APPLICATION: &str = "/become-provider";
pub const SIGN_IN: &str = "/auth";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Customer,
    Provider,
}

/// What the caller may see on the current route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub signed_in: bool,
    pub can_view_as_provider: bool,
    pub is_admin: bool,
    pub active_view: View,
}

/// Computed once per navigation from the identity, its provider record and the route.
/// A provider view is only active for an approved provider on a provider route.
pub fn capabilities(identity: Option<&Identity>, provider: Option<&Provider>, route: &str) -> Capabilities {
    let can_view_as_provider = match (identity, provider) {
        (Some(identity), Some(provider)) => provider.user_id == identity.user_id && provider.is_approved(),
        _ => false,
    };
    let on_provider_route = route == PROVIDER_ROUTE_PREFIX || route.starts_with("/provider/");

    Capabilities {
        signed_in: identity.is_some(),
        can_view_as_provider,
        is_admin: identity.is_some_and(Identity::is_admin),
        active_view: if can_view_as_provider && on_provider_route {
            View::Provider
        } else {
            View::Customer
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "path", rename_all = "snake_case")]
pub enum ViewToggle {
    Navigate(String),
    RedirectToApplication(String),
    RedirectToSignIn(String),
}

/// Switch between customer and provider perspectives. Nothing is persisted:
/// the result is just where to go next.
pub fn toggle_view(caps: &Capabilities) -> ViewToggle {
    if !caps.signed_in {
        return ViewToggle::RedirectToSignIn(SIGN_IN.to_string());
    }
    if !caps.can_view_as_provider {
        return ViewToggle::RedirectToApplication(PROVIDER_APPLICATION.to_string());
    }
    match caps.active_view {
        View::Provider => ViewToggle::Navigate(CUSTOMER_HOME.to_string()),
        View::Customer => ViewToggle::Navigate(PROVIDER_HOME.to_string()),
    }
}

pub fn require_admin(identity: &Identity) -> CoreResult<()> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(CoreError::PermissionError("admin role required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProviderStatus, Role};
    use uuid::Uuid;

    fn user(role: Role) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            email: "pat@example.com".to_string(),
            role,
        }
    }

    fn provider_for(identity: &Identity, status: ProviderStatus) -> Provider {
        let mut p = Provider::new(identity.user_id, "Fix-It Felix".into(), "handyman".into());
        p.status = status;
        p
    }

    #[test]
    fn test_no_provider_record_redirects_to_application() {
        let me = user(Role::Customer);
        let caps = capabilities(Some(&me), None, "/provider/dashboard");

        assert!(!caps.can_view_as_provider);
        assert_eq!(caps.active_view, View::Customer);
        assert_eq!(toggle_view(&caps), ViewToggle::RedirectToApplication(PROVIDER_APPLICATION.into()));
    }

    #[test]
    fn test_unapproved_provider_redirects_to_application() {
        let me = user(Role::Customer);
        for status in [ProviderStatus::Pending, ProviderStatus::Rejected] {
            let record = provider_for(&me, status);
            let caps = capabilities(Some(&me), Some(&record), "/dashboard");
            assert!(!caps.can_view_as_provider);
            assert!(matches!(toggle_view(&caps), ViewToggle::RedirectToApplication(_)));
        }
    }

    #[test]
    fn test_approved_provider_toggles_by_route() {
        let me = user(Role::Customer);
        let record = provider_for(&me, ProviderStatus::Approved);

        let customer_side = capabilities(Some(&me), Some(&record), "/services/plumbing");
        assert!(customer_side.can_view_as_provider);
        assert_eq!(customer_side.active_view, View::Customer);
        assert_eq!(toggle_view(&customer_side), ViewToggle::Navigate(PROVIDER_HOME.into()));

        let provider_side = capabilities(Some(&me), Some(&record), "/provider/bookings");
        assert_eq!(provider_side.active_view, View::Provider);
        assert_eq!(toggle_view(&provider_side), ViewToggle::Navigate(CUSTOMER_HOME.into()));

        // "/providers" lists providers, it is not the provider area
        let listing = capabilities(Some(&me), Some(&record), "/providers");
        assert_eq!(listing.active_view, View::Customer);
    }

    #[test]
    fn test_someone_elses_record_grants_nothing() {
        let me = user(Role::Customer);
        let other = user(Role::Customer);
        let record = provider_for(&other, ProviderStatus::Approved);

        let caps = capabilities(Some(&me), Some(&record), "/provider");
        assert!(!caps.can_view_as_provider);
        assert_eq!(caps.active_view, View::Customer);
    }

    #[test]
    fn test_anonymous_redirects_to_sign_in() {
        let caps = capabilities(None, None, "/provider");
        assert!(!caps.signed_in);
        assert_eq!(toggle_view(&caps), ViewToggle::RedirectToSignIn(SIGN_IN.into()));
    }

    #[test]
    fn test_admin_guard() {
        assert!(require_admin(&user(Role::Admin)).is_ok());
        assert!(matches!(require_admin(&user(Role::Customer)), Err(CoreError::PermissionError(_))));
        assert!(capabilities(Some(&user(Role::Admin)), None, "/admin").is_admin);
    }
}

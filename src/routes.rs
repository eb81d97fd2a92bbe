// Route table and navigation guard for session consumers

use std::sync::Mutex;

use crate::auth::Session;

/// Pages of the portal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Landing,
    Login,
    Signup,
    Dashboard,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Landing => "/",
            Route::Login => "/login",
            Route::Signup => "/signup",
            Route::Dashboard => "/dashboard",
        }
    }

    /// Only reachable with a validated user
    pub fn is_protected(&self) -> bool {
        matches!(self, Route::Dashboard)
    }
}

/// Outcome of guarding a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Hydration still running; show a placeholder
    Loading,
    Render,
    Redirect(Route),
}

/// Decide whether `route` can be shown for `session`
pub fn guard(session: &Session, route: Route) -> RouteDecision {
    if !route.is_protected() {
        return RouteDecision::Render;
    }

    if session.loading {
        RouteDecision::Loading
    } else if session.is_authenticated() {
        RouteDecision::Render
    } else {
        RouteDecision::Redirect(Route::Landing)
    }
}

/// Performs a full navigation away from the portal
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &str);
}

/// Hands the URL to the user on stdout
pub struct StdoutNavigator;

impl Navigator for StdoutNavigator {
    fn navigate(&self, url: &str) {
        tracing::info!(url = %url, "Navigating");
        println!("Open this URL in your browser to continue:");
        println!();
        println!("  {}", url);
        println!();
    }
}

/// Keeps every URL it was asked to open
#[derive(Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited
            .lock()
            .map(|visited| visited.clone())
            .unwrap_or_default()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &str) {
        if let Ok(mut visited) = self.visited.lock() {
            visited.push(url.to_string());
        }
    }
}

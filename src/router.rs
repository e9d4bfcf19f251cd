//! Screen selection gated on the mirrored session.
//!
//! Screens split into an unauthenticated group (login, register) and an
//! authenticated group (dashboard, journal entry, results). A target outside
//! the group matching the current session is redirected to that group's home.

use serde::{Deserialize, Serialize};

use crate::session::SessionView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Login,
    Register,
    Dashboard,
    JournalEntry,
    Results,
}

impl Screen {
    pub fn path(self) -> &'static str {
        match self {
            Screen::Login => "/login",
            Screen::Register => "/register",
            Screen::Dashboard => "/",
            Screen::JournalEntry => "/journal",
            Screen::Results => "/results",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(&['?', '#'][..]).next().unwrap_or_default();
        let path = match path.trim_end_matches('/') {
            "" => "/",
            p => p,
        };
        match path {
            "/login" => Some(Screen::Login),
            "/register" => Some(Screen::Register),
            "/" => Some(Screen::Dashboard),
            "/journal" => Some(Screen::JournalEntry),
            "/results" => Some(Screen::Results),
            _ => None,
        }
    }

    pub fn requires_identity(self) -> bool {
        matches!(self, Screen::Dashboard | Screen::JournalEntry | Screen::Results)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "screen", rename_all = "snake_case")]
pub enum RouteState {
    Initializing,
    Unauthenticated(Screen),
    Authenticated(Screen),
}

impl RouteState {
    pub fn screen(self) -> Option<Screen> {
        match self {
            RouteState::Initializing => None,
            RouteState::Unauthenticated(s) | RouteState::Authenticated(s) => Some(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    #[serde(flatten)]
    pub route: RouteState,
    pub redirected: bool,
    pub path: Option<&'static str>,
}

/// Decide which screen `target` lands on for the given session.
pub fn resolve(view: &SessionView, target: Screen) -> Resolution {
    let (route, redirected) = if !view.initialized {
        (RouteState::Initializing, false)
    } else if view.is_authenticated() {
        if target.requires_identity() {
            (RouteState::Authenticated(target), false)
        } else {
            (RouteState::Authenticated(Screen::Dashboard), true)
        }
    } else if target.requires_identity() {
        (RouteState::Unauthenticated(Screen::Login), true)
    } else {
        (RouteState::Unauthenticated(target), false)
    };

    Resolution {
        route,
        redirected,
        path: route.screen().map(Screen::path),
    }
}

/// Holds the navigation intent and re-resolves it on every render.
#[derive(Debug, Clone)]
pub struct ViewRouter {
    intent: Screen,
}

impl Default for ViewRouter {
    fn default() -> Self {
        Self {
            intent: Screen::Dashboard,
        }
    }
}

impl ViewRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intent(&self) -> Screen {
        self.intent
    }

    /// Navigate to a path; unknown paths go to the home of the current group.
    pub fn navigate_path(&mut self, view: &SessionView, path: &str) -> Resolution {
        let target = Screen::from_path(path).unwrap_or(if view.is_authenticated() {
            Screen::Dashboard
        } else {
            Screen::Login
        });
        self.navigate(view, target)
    }

    pub fn navigate(&mut self, view: &SessionView, target: Screen) -> Resolution {
        self.intent = target;
        self.render(view)
    }

    /// Resolve the current intent. A redirect replaces the intent, so the
    /// session changing later does not bounce back to the old screen.
    pub fn render(&mut self, view: &SessionView) -> Resolution {
        let resolution = resolve(view, self.intent);
        if let (true, Some(screen)) = (resolution.redirected, resolution.route.screen()) {
            self.intent = screen;
        }
        resolution
    }
}

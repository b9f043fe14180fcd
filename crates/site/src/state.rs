//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::config::SiteConfig;
use crate::middleware::session::SESSION_EXPIRY_SECONDS;
use crate::services::{LaunchCountdown, VisitorRegistry, WaitlistService};
use crate::supabase::{SupabaseClient, SupabaseError};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: SiteConfig,
    supabase: SupabaseClient,
    visitors: VisitorRegistry,
    waitlist: WaitlistService,
    countdown: LaunchCountdown,
}

impl AppState {
    /// Create the application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the Supabase client cannot be built from the
    /// configuration.
    pub fn new(config: SiteConfig) -> Result<Self, SupabaseError> {
        let supabase = SupabaseClient::new(&config.supabase)?;
        let visitors = VisitorRegistry::new(
            supabase.clone(),
            config.profile_errors,
            Duration::from_secs(SESSION_EXPIRY_SECONDS.unsigned_abs()),
        );
        let waitlist = WaitlistService::new(supabase.clone(), config.waitlist_layout);
        let countdown = LaunchCountdown::new(config.launch_at, config.countdown_mode);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                supabase,
                visitors,
                waitlist,
                countdown,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SiteConfig {
        &self.inner.config
    }

    /// Shared Supabase client, for calls not tied to a visitor's session.
    #[must_use]
    pub fn supabase(&self) -> &SupabaseClient {
        &self.inner.supabase
    }

    #[must_use]
    pub fn visitors(&self) -> &VisitorRegistry {
        &self.inner.visitors
    }

    #[must_use]
    pub fn waitlist(&self) -> &WaitlistService {
        &self.inner.waitlist
    }

    #[must_use]
    pub fn countdown(&self) -> &LaunchCountdown {
        &self.inner.countdown
    }
}

use std::sync::Arc;

use crate::{
    clock::{Clock, SystemClock},
    in_app_message::{
        InAppMessageHiddenStorage, InAppMessageImpressionStorage, InAppMessagePresenter,
        InMemoryHiddenStorage, InMemoryImpressionStorage, TimerScheduler,
    },
    model::PlatformType,
    user::UserResolver,
    workspace::WorkspaceFetcher,
    HackleCore,
};

/// Configuration for [`HackleCore`].
pub struct HackleConfig {
    pub(crate) workspace_fetcher: Arc<dyn WorkspaceFetcher>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) platform: PlatformType,
}

impl HackleConfig {
    /// Create a default configuration reading workspaces from `workspace_fetcher`.
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use hackle_core::{HackleConfig, WorkspaceStore};
    /// HackleConfig::new(Arc::new(WorkspaceStore::new()));
    /// ```
    pub fn new(workspace_fetcher: Arc<dyn WorkspaceFetcher>) -> Self {
        HackleConfig {
            workspace_fetcher,
            clock: Arc::new(SystemClock),
            platform: HackleConfig::DEFAULT_PLATFORM,
        }
    }

    /// Override the wall clock. Mostly useful in tests.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Platform in-app messages are evaluated for.
    pub const DEFAULT_PLATFORM: PlatformType = PlatformType::Android;

    /// Set the platform in-app messages are evaluated for.
    pub fn platform(mut self, platform: PlatformType) -> Self {
        self.platform = platform;
        self
    }

    /// Create a new [`HackleCore`] using the specified configuration.
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use hackle_core::{model::PlatformType, HackleConfig, HackleCore, WorkspaceStore};
    /// let core: HackleCore = HackleConfig::new(Arc::new(WorkspaceStore::new()))
    ///     .platform(PlatformType::Ios)
    ///     .to_core();
    /// ```
    pub fn to_core(self) -> HackleCore {
        HackleCore::new(self)
    }
}

/// Collaborators of the in-app message pipeline supplied by the host.
pub struct InAppMessageConfig {
    pub user_resolver: Arc<dyn UserResolver>,
    pub presenter: Arc<dyn InAppMessagePresenter>,
    pub timer_scheduler: Arc<dyn TimerScheduler>,
    pub impression_storage: Arc<dyn InAppMessageImpressionStorage>,
    pub hidden_storage: Arc<dyn InAppMessageHiddenStorage>,
}

impl InAppMessageConfig {
    /// Configuration keeping impressions and hidden markers in memory.
    pub fn new(
        user_resolver: Arc<dyn UserResolver>,
        presenter: Arc<dyn InAppMessagePresenter>,
        timer_scheduler: Arc<dyn TimerScheduler>,
    ) -> Self {
        InAppMessageConfig {
            user_resolver,
            presenter,
            timer_scheduler,
            impression_storage: Arc::new(InMemoryImpressionStorage::new()),
            hidden_storage: Arc::new(InMemoryHiddenStorage::new()),
        }
    }
}

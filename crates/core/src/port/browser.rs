// Tab/Window Lifecycle Port
//
// The browser itself is an external collaborator; the core only needs to
// inspect windows, create/activate/close tabs and observe lifecycle events.

use crate::domain::WindowId;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Browser tab identifier
pub type TabId = i64;

/// Capacity of the lifecycle event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// URL prefix of browser-internal pages (never stored automatically)
pub const INTERNAL_URL_PREFIX: &str = "chrome";

/// Page loading status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    Loading,
    Complete,
}

/// Snapshot of one tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    pub window_id: WindowId,
    pub index: usize,
    pub url: String,
    pub title: String,
    pub fav_icon_url: Option<String>,
    pub active: bool,
    pub status: TabStatus,
}

impl Tab {
    pub fn is_internal(&self) -> bool {
        self.url.starts_with(INTERNAL_URL_PREFIX)
    }
}

/// Window populated with its tabs (ordered by index)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub id: WindowId,
    pub tabs: Vec<Tab>,
}

impl Window {
    pub fn active_tab(&self) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.active)
    }
}

/// Parameters for creating a tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTab {
    pub window_id: WindowId,
    pub index: usize,
    pub url: String,
    pub active: bool,
    pub opener_tab_id: Option<TabId>,
}

/// Lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BrowserEvent {
    TabCreated {
        tab: Tab,
    },
    TabUpdated {
        tab: Tab,
    },
    TabRemoved {
        tab_id: TabId,
        window_id: WindowId,
        is_window_closing: bool,
    },
    TabAttached {
        tab_id: TabId,
        new_window_id: WindowId,
    },
    WindowRemoved {
        window_id: WindowId,
    },
}

/// Browser port
#[async_trait]
pub trait Browser: Send + Sync {
    /// Window populated with tabs, or None if it does not exist
    async fn get_window(&self, window_id: WindowId) -> Result<Option<Window>>;

    /// All windows populated with tabs
    async fn get_all_windows(&self) -> Result<Vec<Window>>;

    /// Create a tab; the index is clamped to the tab strip
    async fn create_tab(&self, request: CreateTab) -> Result<Tab>;

    /// Change a tab's active state
    async fn set_tab_active(&self, tab_id: TabId, active: bool) -> Result<Tab>;

    /// Close a tab; resolves once it is gone
    async fn remove_tab(&self, tab_id: TabId) -> Result<()>;

    /// Close a window and all of its tabs; resolves once it is gone
    async fn remove_window(&self, window_id: WindowId) -> Result<()>;

    /// Receive lifecycle events
    fn subscribe(&self) -> broadcast::Receiver<BrowserEvent>;
}

// ============================================================================
// In-memory session model
// ============================================================================

pub mod memory {
    use super::*;
    use crate::error::AppError;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Session {
        windows: BTreeMap<WindowId, Vec<Tab>>,
        next_window_id: WindowId,
        next_tab_id: TabId,
    }

    impl Session {
        fn tabs_mut(&mut self, window_id: WindowId) -> Result<&mut Vec<Tab>> {
            self.windows
                .get_mut(&window_id)
                .ok_or_else(|| AppError::NotFound(format!("window {} not found", window_id)))
        }

        fn locate(&self, tab_id: TabId) -> Result<(WindowId, usize)> {
            self.windows
                .iter()
                .find_map(|(window_id, tabs)| {
                    tabs.iter()
                        .position(|tab| tab.id == tab_id)
                        .map(|position| (*window_id, position))
                })
                .ok_or_else(|| AppError::NotFound(format!("tab {} not found", tab_id)))
        }
    }

    fn reindex(tabs: &mut [Tab]) {
        for (index, tab) in tabs.iter_mut().enumerate() {
            tab.index = index;
        }
    }

    fn activate(tabs: &mut [Tab], position: usize) {
        for (index, tab) in tabs.iter_mut().enumerate() {
            tab.active = index == position;
        }
    }

    /// Deterministic browser session kept in memory.
    ///
    /// Implements the `Browser` port and additionally exposes the user-side
    /// actions (open window, open tab, finish loading, move tab) that drive
    /// lifecycle events.
    pub struct InMemoryBrowser {
        session: Mutex<Session>,
        events: broadcast::Sender<BrowserEvent>,
    }

    impl InMemoryBrowser {
        pub fn new() -> Self {
            let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
            Self {
                session: Mutex::new(Session {
                    next_window_id: 1,
                    next_tab_id: 1,
                    ..Session::default()
                }),
                events,
            }
        }

        fn lock(&self) -> Result<std::sync::MutexGuard<'_, Session>> {
            self.session
                .lock()
                .map_err(|e| AppError::Browser(format!("session lock poisoned: {}", e)))
        }

        fn emit(&self, events: Vec<BrowserEvent>) {
            for event in events {
                let _ = self.events.send(event);
            }
        }

        /// Open an empty window
        pub fn open_window(&self) -> Result<WindowId> {
            let mut session = self.lock()?;
            let window_id = session.next_window_id;
            session.next_window_id += 1;
            session.windows.insert(window_id, Vec::new());
            Ok(window_id)
        }

        /// User opens a tab at the end of the strip and focuses it
        pub fn open_tab(
            &self,
            window_id: WindowId,
            url: impl Into<String>,
            title: impl Into<String>,
        ) -> Result<Tab> {
            let (tab, events) = {
                let mut session = self.lock()?;
                let tab_id = session.next_tab_id;
                let tabs = session.tabs_mut(window_id)?;
                let tab = Tab {
                    id: tab_id,
                    window_id,
                    index: tabs.len(),
                    url: url.into(),
                    title: title.into(),
                    fav_icon_url: None,
                    active: true,
                    status: TabStatus::Loading,
                };
                tabs.push(tab.clone());
                let position = tabs.len() - 1;
                activate(tabs, position);
                session.next_tab_id += 1;
                (tab.clone(), vec![BrowserEvent::TabCreated { tab }])
            };
            self.emit(events);
            Ok(tab)
        }

        /// Change a tab's loading status
        pub fn set_tab_status(&self, tab_id: TabId, status: TabStatus) -> Result<Tab> {
            let tab = {
                let mut session = self.lock()?;
                let (window_id, position) = session.locate(tab_id)?;
                let tabs = session.tabs_mut(window_id)?;
                tabs[position].status = status;
                tabs[position].clone()
            };
            self.emit(vec![BrowserEvent::TabUpdated { tab: tab.clone() }]);
            Ok(tab)
        }

        /// Move a tab to the end of another window
        pub fn move_tab(&self, tab_id: TabId, new_window_id: WindowId) -> Result<Tab> {
            let tab = {
                let mut session = self.lock()?;
                session.tabs_mut(new_window_id)?;
                let (window_id, position) = session.locate(tab_id)?;
                let source = session.tabs_mut(window_id)?;
                let mut tab = source.remove(position);
                reindex(source);
                let target = session.tabs_mut(new_window_id)?;
                tab.window_id = new_window_id;
                tab.index = target.len();
                tab.active = false;
                target.push(tab.clone());
                tab
            };
            self.emit(vec![BrowserEvent::TabAttached {
                tab_id,
                new_window_id,
            }]);
            Ok(tab)
        }

        /// Number of tabs in a window (0 if it does not exist)
        pub fn tab_count(&self, window_id: WindowId) -> usize {
            self.lock()
                .map(|session| session.windows.get(&window_id).map_or(0, Vec::len))
                .unwrap_or(0)
        }
    }

    impl Default for InMemoryBrowser {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Browser for InMemoryBrowser {
        async fn get_window(&self, window_id: WindowId) -> Result<Option<Window>> {
            let session = self.lock()?;
            Ok(session.windows.get(&window_id).map(|tabs| Window {
                id: window_id,
                tabs: tabs.clone(),
            }))
        }

        async fn get_all_windows(&self) -> Result<Vec<Window>> {
            let session = self.lock()?;
            Ok(session
                .windows
                .iter()
                .map(|(window_id, tabs)| Window {
                    id: *window_id,
                    tabs: tabs.clone(),
                })
                .collect())
        }

        async fn create_tab(&self, request: CreateTab) -> Result<Tab> {
            let tab = {
                let mut session = self.lock()?;
                let tab_id = session.next_tab_id;
                let tabs = session.tabs_mut(request.window_id)?;
                let position = request.index.min(tabs.len());
                let tab = Tab {
                    id: tab_id,
                    window_id: request.window_id,
                    index: position,
                    url: request.url,
                    title: String::new(),
                    fav_icon_url: None,
                    active: request.active,
                    status: TabStatus::Loading,
                };
                tabs.insert(position, tab);
                reindex(tabs);
                if request.active {
                    activate(tabs, position);
                }
                let tab = tabs[position].clone();
                session.next_tab_id += 1;
                tab
            };
            self.emit(vec![BrowserEvent::TabCreated { tab: tab.clone() }]);
            Ok(tab)
        }

        async fn set_tab_active(&self, tab_id: TabId, active: bool) -> Result<Tab> {
            let tab = {
                let mut session = self.lock()?;
                let (window_id, position) = session.locate(tab_id)?;
                let tabs = session.tabs_mut(window_id)?;
                if active {
                    activate(tabs, position);
                } else {
                    tabs[position].active = false;
                }
                tabs[position].clone()
            };
            self.emit(vec![BrowserEvent::TabUpdated { tab: tab.clone() }]);
            Ok(tab)
        }

        async fn remove_tab(&self, tab_id: TabId) -> Result<()> {
            let events = {
                let mut session = self.lock()?;
                let (window_id, position) = session.locate(tab_id)?;
                let tabs = session.tabs_mut(window_id)?;
                let removed = tabs.remove(position);
                reindex(tabs);
                if tabs.is_empty() {
                    session.windows.remove(&window_id);
                    vec![
                        BrowserEvent::TabRemoved {
                            tab_id,
                            window_id,
                            is_window_closing: true,
                        },
                        BrowserEvent::WindowRemoved { window_id },
                    ]
                } else {
                    if removed.active {
                        let next = position.min(tabs.len() - 1);
                        activate(tabs, next);
                    }
                    vec![BrowserEvent::TabRemoved {
                        tab_id,
                        window_id,
                        is_window_closing: false,
                    }]
                }
            };
            self.emit(events);
            Ok(())
        }

        async fn remove_window(&self, window_id: WindowId) -> Result<()> {
            let events = {
                let mut session = self.lock()?;
                let tabs = session.windows.remove(&window_id).ok_or_else(|| {
                    AppError::NotFound(format!("window {} not found", window_id))
                })?;
                let mut events: Vec<BrowserEvent> = tabs
                    .iter()
                    .map(|tab| BrowserEvent::TabRemoved {
                        tab_id: tab.id,
                        window_id,
                        is_window_closing: true,
                    })
                    .collect();
                events.push(BrowserEvent::WindowRemoved { window_id });
                events
            };
            self.emit(events);
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<BrowserEvent> {
            self.events.subscribe()
        }
    }
}

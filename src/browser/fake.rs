//! Scripted stand-in for the browser capability.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{scripts, BrowserLauncher, BrowserPage, ElementInfo};
use crate::shared::constants;
use crate::validator::fixtures::noise_png;

/// How one page load behaves.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub nav_fails: bool,
    pub consent_dialog: bool,
    /// No video element exists until the consent dialog is dismissed.
    pub consent_wall: bool,
    /// Player reads before metadata arrives. Until then `currentTime` is 0.
    pub metadata_after: u32,
    /// Whether playback moves after seeking.
    pub advancing: bool,
    /// Screenshots returned in order; a fresh valid frame once drained.
    pub frames: VecDeque<Vec<u8>>,
    pub live_edge: f64,
}

impl LoadPlan {
    pub fn healthy() -> Self {
        Self {
            nav_fails: false,
            consent_dialog: false,
            consent_wall: false,
            metadata_after: 0,
            advancing: true,
            frames: VecDeque::new(),
            live_edge: 100_000.0,
        }
    }

    pub fn stalling() -> Self {
        Self { advancing: false, ..Self::healthy() }
    }

    pub fn failing_navigation() -> Self {
        Self { nav_fails: true, ..Self::healthy() }
    }

    pub fn with_consent(mut self) -> Self {
        self.consent_dialog = true;
        self
    }

    pub fn with_consent_wall(mut self) -> Self {
        self.consent_dialog = true;
        self.consent_wall = true;
        self
    }

    pub fn with_metadata_after(mut self, reads: u32) -> Self {
        self.metadata_after = reads;
        self
    }

    pub fn with_frames(mut self, frames: Vec<Vec<u8>>) -> Self {
        self.frames = frames.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Opened(usize),
    Navigate(usize),
    ConsentClicked(usize),
    OverridesApplied(usize),
    OverridesPresent(usize),
    Seek(usize, f64),
    Screenshot(usize),
    Closed(usize),
}

#[derive(Default)]
struct SiteState {
    plans: VecDeque<LoadPlan>,
    fallback: Option<LoadPlan>,
    events: Vec<PageEvent>,
    pages: usize,
    fail_open: bool,
}

/// Launcher whose pages follow a queue of [`LoadPlan`]s, one per page. The
/// last plan repeats once the queue is drained.
#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<Mutex<SiteState>>,
}

impl FakeSite {
    pub fn new(plans: Vec<LoadPlan>) -> Self {
        let fallback = plans.last().cloned();
        let state = SiteState { plans: plans.into(), fallback, ..Default::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    pub fn unavailable() -> Self {
        let site = Self::default();
        site.state.lock().unwrap().fail_open = true;
        site
    }

    pub fn events(&self) -> Vec<PageEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn pages_opened(&self) -> usize {
        self.state.lock().unwrap().pages
    }

    fn record(&self, event: PageEvent) {
        self.state.lock().unwrap().events.push(event);
    }
}

#[async_trait]
impl BrowserLauncher for FakeSite {
    async fn open_page(&self) -> Result<Box<dyn BrowserPage>> {
        let (id, plan) = {
            let mut state = self.state.lock().unwrap();
            if state.fail_open {
                return Err(anyhow!("no browser binary"));
            }
            state.pages += 1;
            let plan = state
                .plans
                .pop_front()
                .or_else(|| state.fallback.clone())
                .unwrap_or_else(LoadPlan::healthy);
            (state.pages, plan)
        };
        self.record(PageEvent::Opened(id));
        Ok(Box::new(FakePage::new(id, plan, self.clone())))
    }
}

pub struct FakePage {
    id: usize,
    plan: LoadPlan,
    site: FakeSite,
    loaded: bool,
    consent_visible: bool,
    overrides: bool,
    metadata_left: u32,
    position: f64,
    seed: u32,
}

impl FakePage {
    pub fn new(id: usize, plan: LoadPlan, site: FakeSite) -> Self {
        Self {
            id,
            consent_visible: plan.consent_dialog,
            position: plan.live_edge,
            plan,
            site,
            loaded: false,
            overrides: false,
            metadata_left: 0,
            seed: id as u32 * 101,
        }
    }

    /// A single page not tied to any launcher queue.
    pub fn standalone(plan: LoadPlan) -> (Self, FakeSite) {
        let site = FakeSite::new(Vec::new());
        (Self::new(1, plan, site.clone()), site)
    }

    fn video_present(&self) -> bool {
        self.loaded && !(self.plan.consent_wall && self.consent_visible)
    }

    /// Counts one player read; false while metadata is still pending.
    fn metadata_ready(&mut self) -> bool {
        if self.metadata_left > 0 {
            self.metadata_left -= 1;
            return false;
        }
        true
    }

    fn handle_script(&mut self, script: &str) -> Value {
        if script == scripts::CURRENT_TIME || script == scripts::LIVE_EDGE {
            if !self.video_present() {
                return Value::Null;
            }
            if !self.metadata_ready() {
                return if script == scripts::LIVE_EDGE { Value::Null } else { json!(0.0) };
            }
            if self.plan.advancing {
                self.position += 1.0;
            }
            return json!(self.position);
        }
        if script == scripts::PLAY {
            return json!(self.video_present());
        }
        if let Some((kind, arg)) = scripts::parse_call(script) {
            if !self.video_present() {
                return json!(false);
            }
            match kind {
                "seek" => {
                    self.position = arg;
                    self.site.record(PageEvent::Seek(self.id, arg));
                }
                _ => self.position += arg,
            }
            return json!(true);
        }
        if script.starts_with("!!document.getElementById") && script.contains(constants::OVERRIDE_STYLE_ID) {
            return json!(self.overrides);
        }
        if script.contains(constants::OVERRIDE_STYLE_ID) {
            if self.overrides {
                self.site.record(PageEvent::OverridesPresent(self.id));
                return json!("present");
            }
            self.overrides = true;
            self.site.record(PageEvent::OverridesApplied(self.id));
            return json!("applied");
        }
        Value::Null
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn navigate(&mut self, _url: &str) -> Result<()> {
        self.site.record(PageEvent::Navigate(self.id));
        if self.plan.nav_fails {
            return Err(anyhow!("net::ERR_CONNECTION_RESET"));
        }
        self.loaded = true;
        self.overrides = false;
        self.consent_visible = self.plan.consent_dialog;
        self.metadata_left = self.plan.metadata_after;
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value> {
        Ok(self.handle_script(script))
    }

    async fn visible_elements(&mut self, selector: &str) -> Result<Vec<ElementInfo>> {
        if selector != constants::CONSENT_BUTTON_SELECTOR || !self.loaded {
            return Ok(Vec::new());
        }
        let mut buttons = vec![ElementInfo { index: 0, text: "Sign in".into() }];
        if self.consent_visible {
            buttons.push(ElementInfo { index: 1, text: "Accept all".into() });
            buttons.push(ElementInfo { index: 2, text: "Reject all".into() });
        }
        Ok(buttons)
    }

    async fn click(&mut self, _selector: &str, element: &ElementInfo) -> Result<()> {
        if self.consent_visible && element.index == 2 && element.text == "Reject all" {
            self.consent_visible = false;
            self.site.record(PageEvent::ConsentClicked(self.id));
            return Ok(());
        }
        Err(anyhow!("element {} no longer reads {:?}", element.index, element.text))
    }

    async fn screenshot_element(&mut self, _selector: &str) -> Result<Vec<u8>> {
        self.site.record(PageEvent::Screenshot(self.id));
        if let Some(frame) = self.plan.frames.pop_front() {
            return Ok(frame);
        }
        self.seed += 1;
        Ok(noise_png(160, 90, self.seed))
    }

    async fn close(&mut self) -> Result<()> {
        self.site.record(PageEvent::Closed(self.id));
        Ok(())
    }
}

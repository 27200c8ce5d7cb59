//! `WebvizClient`, the primary wasm-bindgen export.
//!
//! ## JavaScript usage
//!
//! ```js
//! import init, { WebvizClient } from './pkg/argos_webviz_wasm.js';
//!
//! await init();
//!
//! const client = new WebvizClient(sceneBackend, 'localhost', 3000, false);
//!
//! client.onConnectionState((state) => setBadge(state));
//! client.onNotice((message) => toast(message));
//! client.onPlayback((label) => setToolbar(label));
//!
//! client.connect();
//!
//! canvas.addEventListener('click', (ev) => {
//!   const [x, y, picked] = pick(ev);  // NDC + visual id or null
//!   client.click(x, y, picked, ev.shiftKey, ev.ctrlKey, ev.altKey);
//! });
//!
//! // In your render loop:
//! function tick() {
//!   client.poll();
//!   renderer.render(scene, camera);
//!   requestAnimationFrame(tick);
//! }
//! tick();
//! ```

use argos_webviz::{
    protocol::endpoint_url, AssetOutcome, AssetTicket, Command, CommandError, Modifiers,
    PointerClick, ReconnectPolicy, SceneSession, SessionNotice, TransportEvent, VisualHandle,
};
use wasm_bindgen::prelude::*;

use crate::bridge::{self, BridgeHandle};
use crate::js_backend::{handle, JsBackend, SceneBackend};

// ---------------------------------------------------------------------------
// WebvizClient
// ---------------------------------------------------------------------------

/// Primary Wasm API object.
///
/// Instantiate with `new WebvizClient(scene, host, port, secure)`.
/// Call `client.connect()` once, then `client.poll()` each animation frame.
#[wasm_bindgen]
pub struct WebvizClient {
    url: String,
    policy: ReconnectPolicy,
    bridge: Option<BridgeHandle>,
    /// Reconnect attempts since the last successful open.
    attempts: usize,
    /// `Date.now()` at which the next reconnect is due.
    retry_at: Option<f64>,
    session: SceneSession<JsBackend>,

    // JS callback storage
    on_connection_state: Option<js_sys::Function>,
    on_notice: Option<js_sys::Function>,
    on_playback: Option<js_sys::Function>,
}

#[wasm_bindgen]
impl WebvizClient {
    // -----------------------------------------------------------------------
    // Constructor
    // -----------------------------------------------------------------------

    /// Create a new client rendering into `scene`.
    ///
    /// @param scene  - object implementing the scene backend methods
    /// @param host   - webviz server host, usually `window.location.hostname`
    /// @param port   - webviz server port (default 3000)
    /// @param secure - connect with `wss://`
    #[wasm_bindgen(constructor)]
    pub fn new(scene: SceneBackend, host: &str, port: u16, secure: bool) -> Self {
        Self {
            url: endpoint_url(host, port, secure),
            policy: ReconnectPolicy::default(),
            bridge: None,
            attempts: 0,
            retry_at: None,
            session: SceneSession::new(JsBackend::new(scene)),
            on_connection_state: None,
            on_notice: None,
            on_playback: None,
        }
    }

    // -----------------------------------------------------------------------
    // Connection
    // -----------------------------------------------------------------------

    /// Open the WebSocket. Safe to call again after disconnecting.
    #[wasm_bindgen]
    pub fn connect(&mut self) -> Result<(), JsValue> {
        if self.bridge.is_some() {
            return Ok(()); // already connected
        }
        self.attempts = 0;
        self.retry_at = None;
        self.open()
    }

    /// Close the WebSocket and stop reconnecting. The scene is kept.
    #[wasm_bindgen]
    pub fn disconnect(&mut self) {
        self.retry_at = None;
        if self.bridge.take().is_some() {
            self.session.handle_transport(TransportEvent::Closed {
                reason: "disconnected by the page".into(),
            });
            self.dispatch_notices();
        }
    }

    // -----------------------------------------------------------------------
    // poll(), called once per animation frame
    // -----------------------------------------------------------------------

    /// Feed socket events into the session, reconcile the scene, flush
    /// outgoing commands and fire callbacks.
    #[wasm_bindgen]
    pub fn poll(&mut self) {
        let events = self
            .bridge
            .as_ref()
            .map(BridgeHandle::drain_events)
            .unwrap_or_default();
        for event in events {
            if event == TransportEvent::Opened {
                self.attempts = 0;
            }
            self.session.handle_transport(event);
        }

        self.maintain_connection();
        self.session.frame();

        let outbox = self.session.drain_outbox();
        if let Some(bridge) = &self.bridge {
            for command in &outbox {
                bridge.send(command);
            }
        }

        self.dispatch_notices();
    }

    /// Report the result of a `requestAsset` call.
    #[wasm_bindgen(js_name = assetLoaded)]
    pub fn asset_loaded(&mut self, ticket: f64, ok: bool, error: Option<String>) {
        let outcome = if ok {
            AssetOutcome::Loaded
        } else {
            AssetOutcome::Failed(error.unwrap_or_else(|| "unknown error".into()))
        };
        self.session
            .asset_loaded(AssetTicket(handle(ticket)), outcome);
    }

    // -----------------------------------------------------------------------
    // Pointer and selection
    // -----------------------------------------------------------------------

    /// Apply a canvas click at normalized device coordinates `(x, y)`.
    /// `picked` is the visual id under the pointer, if any.
    ///
    /// Returns true when the click produced a `moveEntity` command.
    #[wasm_bindgen]
    pub fn click(
        &mut self,
        x: f32,
        y: f32,
        picked: Option<f64>,
        shift: bool,
        ctrl: bool,
        alt: bool,
    ) -> bool {
        let click = PointerClick {
            ndc: [x, y],
            picked: picked.map(|v| VisualHandle(handle(v))),
            modifiers: Modifiers { shift, ctrl, alt },
        };
        self.session.click(click).is_some()
    }

    #[wasm_bindgen]
    pub fn select(&mut self, visual: f64) -> bool {
        self.session.select(VisualHandle(handle(visual)))
    }

    #[wasm_bindgen]
    pub fn deselect(&mut self, visual: f64) -> bool {
        self.session.deselect(VisualHandle(handle(visual)))
    }

    #[wasm_bindgen(js_name = clearSelection)]
    pub fn clear_selection(&mut self) {
        self.session.clear_selection();
    }

    /// Ids of the selected entities, as strings.
    #[wasm_bindgen(js_name = selectedIds)]
    pub fn selected_ids(&self) -> js_sys::Array {
        self.session
            .selected_ids()
            .iter()
            .map(|id| JsValue::from_str(&id.to_string()))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Experiment controls
    // -----------------------------------------------------------------------

    #[wasm_bindgen]
    pub fn play(&mut self) -> Result<(), JsValue> {
        self.command(Command::Play)
    }

    #[wasm_bindgen]
    pub fn pause(&mut self) -> Result<(), JsValue> {
        self.command(Command::Pause)
    }

    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<(), JsValue> {
        self.command(Command::Step)
    }

    /// Fast-forward, optionally `steps` at a time (1..=500, else the
    /// server default).
    #[wasm_bindgen(js_name = fastForward)]
    pub fn fast_forward(&mut self, steps: Option<i32>) -> Result<(), JsValue> {
        self.command(Command::fast_forward(steps.map(i64::from)))
    }

    #[wasm_bindgen]
    pub fn reset(&mut self) -> Result<(), JsValue> {
        self.command(Command::Reset)
    }

    // -----------------------------------------------------------------------
    // Callback registration
    // -----------------------------------------------------------------------

    /// `callback(state: string)`: `"connecting"` | `"connected"` | `"disconnected"`
    #[wasm_bindgen(js_name = onConnectionState)]
    pub fn on_connection_state(&mut self, cb: js_sys::Function) {
        self.on_connection_state = Some(cb);
    }

    /// `callback(message: string)` for anything worth a toast.
    #[wasm_bindgen(js_name = onNotice)]
    pub fn on_notice(&mut self, cb: js_sys::Function) {
        self.on_notice = Some(cb);
    }

    /// `callback(label: string)`, e.g. `"Playing"`, on playback changes.
    #[wasm_bindgen(js_name = onPlayback)]
    pub fn on_playback(&mut self, cb: js_sys::Function) {
        self.on_playback = Some(cb);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    #[wasm_bindgen(js_name = isConnected)]
    pub fn is_connected(&self) -> bool {
        self.session.state().is_connected()
    }

    /// `"Connected"` or `"Not Connected"`.
    #[wasm_bindgen(js_name = connectionLabel)]
    pub fn connection_label(&self) -> String {
        self.session.state().connection.to_string()
    }

    #[wasm_bindgen(js_name = playbackLabel)]
    pub fn playback_label(&self) -> String {
        self.session.state().status_label().to_string()
    }

    #[wasm_bindgen]
    pub fn steps(&self) -> f64 {
        self.session.state().steps as f64
    }

    #[wasm_bindgen(js_name = entityCount)]
    pub fn entity_count(&self) -> u32 {
        self.session.registry().len() as u32
    }

    /// True while asynchronously constructed entities are still loading.
    #[wasm_bindgen(js_name = isLoading)]
    pub fn is_loading(&self) -> bool {
        self.session.registry().is_loading()
    }

    /// Log pane, newest first.
    #[wasm_bindgen(js_name = logLines)]
    pub fn log_lines(&self) -> js_sys::Array {
        self.session
            .state()
            .console
            .log()
            .map(|l| JsValue::from_str(&l.to_string()))
            .collect()
    }

    /// Error pane, newest first.
    #[wasm_bindgen(js_name = errorLines)]
    pub fn error_lines(&self) -> js_sys::Array {
        self.session
            .state()
            .console
            .errors()
            .map(|l| JsValue::from_str(&l.to_string()))
            .collect()
    }

    /// One-line status summary.
    #[wasm_bindgen]
    pub fn stats(&self) -> String {
        self.session.stats().to_string()
    }

    /// Disconnect and release every visual.
    #[wasm_bindgen]
    pub fn dispose(&mut self) {
        self.disconnect();
        self.session.teardown();
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

impl WebvizClient {
    fn open(&mut self) -> Result<(), JsValue> {
        self.fire_connection_state("connecting");
        self.bridge = Some(bridge::spawn(&self.url)?);
        Ok(())
    }

    /// Drop a closed bridge and reopen once the policy's delay passed.
    fn maintain_connection(&mut self) {
        let now = js_sys::Date::now();

        let closed = self
            .bridge
            .as_ref()
            .filter(|b| b.is_closed())
            .map(BridgeHandle::close_code);
        if let Some(code) = closed {
            // The Closed event was drained above, before this check.
            self.bridge = None;
            self.retry_at = retry_deadline(&self.policy, self.attempts, code, now);
            match self.retry_at {
                Some(at) => {
                    self.attempts += 1;
                    log::info!(
                        "[client] Reconnect attempt {} in {} ms",
                        self.attempts,
                        at - now
                    );
                }
                None => log::warn!("[client] Giving up after {} attempts", self.attempts),
            }
        }

        if self.bridge.is_none() && self.retry_at.is_some_and(|at| now >= at) {
            self.retry_at = None;
            if let Err(e) = self.open() {
                log::error!("[client] Reconnect failed: {:?}", e);
                self.retry_at = retry_deadline(&self.policy, self.attempts, None, now);
                self.attempts += 1;
            }
        }
    }

    fn command(&mut self, command: Command) -> Result<(), JsValue> {
        self.session.send(command).map_err(command_error)
    }

    fn dispatch_notices(&mut self) {
        for notice in self.session.drain_notices() {
            match &notice {
                SessionNotice::Connected => self.fire_connection_state("connected"),
                SessionNotice::Disconnected { .. } => self.fire_connection_state("disconnected"),
                SessionNotice::PlaybackChanged { to, .. } => {
                    call_fn(&self.on_playback, &[JsValue::from_str(to.label())]);
                }
                SessionNotice::ExperimentReset => {}
            }
            call_fn(&self.on_notice, &[JsValue::from_str(&notice.to_string())]);
        }
    }

    fn fire_connection_state(&self, state: &str) {
        call_fn(&self.on_connection_state, &[JsValue::from_str(state)]);
    }
}

/// `Date.now()` value at which the next attempt is due, or `None` to give up.
fn retry_deadline(
    policy: &ReconnectPolicy,
    attempts: usize,
    close_code: Option<u16>,
    now: f64,
) -> Option<f64> {
    policy
        .next_delay(attempts, close_code)
        .map(|delay| now + delay.as_millis() as f64)
}

fn command_error(e: CommandError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

// ---------------------------------------------------------------------------
// JS callback helper
// ---------------------------------------------------------------------------

fn call_fn(f: &Option<js_sys::Function>, args: &[JsValue]) {
    if let Some(func) = f {
        let this = JsValue::NULL;
        let arr = js_sys::Array::new();
        for a in args {
            arr.push(a);
        }
        if let Err(e) = func.apply(&this, &arr) {
            log::warn!("[client] Callback error: {:?}", e);
        }
    }
}

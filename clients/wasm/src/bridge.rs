//! Browser WebSocket bridge to the ARGoS webviz server.
//!
//! ## Threading model
//!
//! WASM is single-threaded. The socket callbacks and the render loop take
//! turns on the JS event loop, so shared state is `Rc<RefCell<…>>`.
//!
//! ```text
//! web_sys::WebSocket callbacks (onopen / onmessage / onclose / onerror)
//!   push TransportEvents into state.events
//!
//! WebvizClient::poll()  (once per animation frame)
//!   drains state.events → SceneSession::handle_transport()
//!   outbox commands     → ws.send_with_str()
//! ```
//!
//! Reconnecting is the client's job: a closed bridge is dropped and a new
//! one spawned once the [`ReconnectPolicy`](argos_webviz::ReconnectPolicy)
//! delay has passed.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use argos_webviz::{Command, TransportEvent};
use wasm_bindgen::prelude::*;

/// Events buffered between two polls before the oldest are dropped.
const EVENT_BUFFER: usize = 1024;

// ---------------------------------------------------------------------------
// Shared state (single-threaded, Rc/RefCell)
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    events: VecDeque<TransportEvent>,
    open: bool,
    closed: bool,
    /// Close code reported by `onclose`, if any.
    close_code: Option<u16>,
}

impl State {
    fn push(&mut self, event: TransportEvent) {
        if self.events.len() >= EVENT_BUFFER {
            log::warn!("[bridge] Event queue full, dropping oldest");
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

type SharedState = Rc<RefCell<State>>;

// ---------------------------------------------------------------------------
// Bridge handle (owned by WebvizClient)
// ---------------------------------------------------------------------------

/// One socket lifetime. Dropping it detaches the callbacks and closes the
/// socket.
pub struct BridgeHandle {
    shared: SharedState,
    ws: web_sys::WebSocket,
    // Keep closures alive for the lifetime of the bridge.
    _onopen: Closure<dyn FnMut()>,
    _onmessage: Closure<dyn FnMut(web_sys::MessageEvent)>,
    _onerror: Closure<dyn FnMut(web_sys::Event)>,
    _onclose: Closure<dyn FnMut(web_sys::CloseEvent)>,
}

impl BridgeHandle {
    /// Take every event received since the last call.
    pub fn drain_events(&self) -> Vec<TransportEvent> {
        self.shared.borrow_mut().events.drain(..).collect()
    }

    /// Encode and transmit a command. Dropped with a warning when the
    /// socket is not open.
    pub fn send(&self, command: &Command) {
        if !self.is_open() {
            log::warn!("[bridge] Socket not open, dropping {}", command.name());
            return;
        }
        match command.encode() {
            Ok(text) => {
                log::debug!("[bridge] -> {text}");
                if let Err(e) = self.ws.send_with_str(&text) {
                    log::warn!("[bridge] Failed to send {}: {:?}", command.name(), e);
                }
            }
            Err(e) => log::warn!("[bridge] Cannot encode {}: {e}", command.name()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.shared.borrow().open
    }

    /// True once the socket closed. The `Closed` event may still be queued.
    pub fn is_closed(&self) -> bool {
        self.shared.borrow().closed
    }

    pub fn close_code(&self) -> Option<u16> {
        self.shared.borrow().close_code
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.ws.set_onopen(None);
        self.ws.set_onmessage(None);
        self.ws.set_onerror(None);
        self.ws.set_onclose(None);
        let _ = self.ws.close();
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Open a WebSocket to `url` and return a [`BridgeHandle`] that buffers
/// its events until the next poll.
pub fn spawn(url: &str) -> Result<BridgeHandle, JsValue> {
    let shared: SharedState = Rc::new(RefCell::new(State::default()));

    log::info!("[bridge] Connecting to {url}");
    let ws = web_sys::WebSocket::new(url)?;
    ws.set_binary_type(web_sys::BinaryType::Arraybuffer);

    // ----- onopen -----------------------------------------------------------
    let shared_open = shared.clone();
    let onopen = Closure::<dyn FnMut()>::new(move || {
        log::info!("[bridge] WebSocket open");
        let mut st = shared_open.borrow_mut();
        st.open = true;
        st.push(TransportEvent::Opened);
    });
    ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));

    // ----- onmessage --------------------------------------------------------
    let shared_msg = shared.clone();
    let onmessage =
        Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |ev: web_sys::MessageEvent| {
            // The server only sends text frames.
            if let Some(text) = ev.data().as_string() {
                shared_msg.borrow_mut().push(TransportEvent::Message(text));
            }
        });
    ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

    // ----- onerror ----------------------------------------------------------
    // Browsers always follow an error with a close event; that one carries
    // the Closed notification.
    let onerror = Closure::<dyn FnMut(web_sys::Event)>::new(move |_ev: web_sys::Event| {
        log::error!("[bridge] WebSocket error");
    });
    ws.set_onerror(Some(onerror.as_ref().unchecked_ref()));

    // ----- onclose ----------------------------------------------------------
    let shared_close = shared.clone();
    let onclose = Closure::<dyn FnMut(web_sys::CloseEvent)>::new(move |ev: web_sys::CloseEvent| {
        let reason = close_reason(ev.code(), &ev.reason());
        log::info!("[bridge] WebSocket closed: {reason}");
        let mut st = shared_close.borrow_mut();
        st.open = false;
        st.closed = true;
        st.close_code = Some(ev.code());
        st.push(TransportEvent::Closed { reason });
    });
    ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));

    Ok(BridgeHandle {
        shared,
        ws,
        _onopen: onopen,
        _onmessage: onmessage,
        _onerror: onerror,
        _onclose: onclose,
    })
}

/// Human-readable close reason. Browsers often leave `reason` empty.
pub(crate) fn close_reason(code: u16, reason: &str) -> String {
    if reason.is_empty() {
        format!("closed with code {code}")
    } else {
        format!("{code} {reason}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_reason_falls_back_to_code() {
        assert_eq!(close_reason(1006, ""), "closed with code 1006");
        assert_eq!(close_reason(1011, "boom"), "1011 boom");
    }

    #[test]
    fn full_queue_drops_oldest() {
        let mut st = State::default();
        for i in 0..=EVENT_BUFFER {
            st.push(TransportEvent::Message(i.to_string()));
        }
        assert_eq!(st.events.len(), EVENT_BUFFER);
        assert_eq!(st.events.front(), Some(&TransportEvent::Message("1".into())));
    }
}

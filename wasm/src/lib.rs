// peerchat-wasm — browser bindings for the bridge client
//
// The page side of the host/client split. Commands queue in a recording link
// and are flushed to the controlling service worker after every call; worker
// replies come back through `handleWorkerMessage`.

use parking_lot::Mutex;
use peerchat_core::bridge::{BridgeClient, MessageHandler, RecordingLink, StatusHandler};
use peerchat_core::protocol::{ChatMessage, ConnectionStatus};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub fn init_logging() {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();
}

type Inbox = Arc<Mutex<Vec<(String, ChatMessage)>>>;

struct TopicCallbacks {
    handler: MessageHandler,
    callbacks: Vec<js_sys::Function>,
}

#[wasm_bindgen]
pub struct ChatBridge {
    client: BridgeClient,
    outbox: RecordingLink,
    worker: RefCell<Option<web_sys::ServiceWorker>>,
    inbox: Inbox,
    statuses: Arc<Mutex<Vec<ConnectionStatus>>>,
    topic_callbacks: RefCell<HashMap<String, TopicCallbacks>>,
    status_callbacks: RefCell<Vec<js_sys::Function>>,
    status_handler: StatusHandler,
}

#[wasm_bindgen]
impl ChatBridge {
    #[wasm_bindgen(constructor)]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let client = BridgeClient::new();
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = statuses.clone();
        let status_handler: StatusHandler =
            Arc::new(move |status: ConnectionStatus| sink.lock().push(status));
        client.add_status_handler(status_handler.clone());

        Self {
            client,
            outbox: RecordingLink::new(),
            worker: RefCell::new(None),
            inbox: Arc::new(Mutex::new(Vec::new())),
            statuses,
            topic_callbacks: RefCell::new(HashMap::new()),
            status_callbacks: RefCell::new(Vec::new()),
            status_handler,
        }
    }

    /// Bind to the controlling service worker and send `init`
    #[wasm_bindgen(js_name = attachWorker)]
    pub fn attach_worker(&self, worker: web_sys::ServiceWorker) {
        *self.worker.borrow_mut() = Some(worker);
        self.client.attach(Arc::new(self.outbox.clone()));
        self.flush();
    }

    /// Feed a `message` event payload received from the worker
    #[wasm_bindgen(js_name = handleWorkerMessage)]
    pub fn handle_worker_message(&self, data: JsValue) {
        match serde_wasm_bindgen::from_value::<serde_json::Value>(data) {
            Ok(event) => self.client.handle_raw_event(&event),
            Err(e) => tracing::debug!("Ignoring worker message: {}", e),
        }
        self.dispatch();
        self.flush();
    }

    pub fn subscribe(&self, topic: String) -> bool {
        let sent = self.client.subscribe(&topic);
        self.flush();
        sent
    }

    pub fn unsubscribe(&self, topic: String) -> bool {
        let sent = self.client.unsubscribe(&topic);
        self.flush();
        sent
    }

    /// Publish a message object; `id`, `from`, `content` and `timestamp` are expected
    pub fn publish(&self, topic: String, message: JsValue) -> Result<bool, JsValue> {
        let message: serde_json::Value = serde_wasm_bindgen::from_value(message)
            .map_err(|e| JsValue::from_str(&format!("invalid message: {}", e)))?;
        let sent = self.client.publish(&topic, message);
        self.flush();
        Ok(sent)
    }

    /// Build and publish a text message from this peer
    #[wasm_bindgen(js_name = sendText)]
    pub fn send_text(&self, topic: String, text: String) -> bool {
        let from = self.client.peer_id().unwrap_or_default();
        let sent = self
            .client
            .publish_chat(&topic, &ChatMessage::new(from, "", text));
        self.flush();
        sent
    }

    #[wasm_bindgen(js_name = requestPeerList)]
    pub fn request_peer_list(&self) -> bool {
        let sent = self.client.request_peer_list();
        self.flush();
        sent
    }

    #[wasm_bindgen(js_name = onMessage)]
    pub fn on_message(&self, topic: String, callback: js_sys::Function) {
        let mut topics = self.topic_callbacks.borrow_mut();
        let entry = topics.entry(topic.clone()).or_insert_with(|| {
            let inbox = self.inbox.clone();
            let name = topic.clone();
            let handler: MessageHandler =
                Arc::new(move |msg: &ChatMessage| inbox.lock().push((name.clone(), msg.clone())));
            self.client.add_message_handler(&topic, handler.clone());
            TopicCallbacks {
                handler,
                callbacks: Vec::new(),
            }
        });
        if !entry.callbacks.iter().any(|f| same(f, &callback)) {
            entry.callbacks.push(callback);
        }
    }

    #[wasm_bindgen(js_name = offMessage)]
    pub fn off_message(&self, topic: String, callback: js_sys::Function) {
        let mut topics = self.topic_callbacks.borrow_mut();
        let Some(entry) = topics.get_mut(&topic) else {
            return;
        };
        entry.callbacks.retain(|f| !same(f, &callback));
        if entry.callbacks.is_empty() {
            self.client.remove_message_handler(&topic, &entry.handler);
            topics.remove(&topic);
        }
    }

    #[wasm_bindgen(js_name = onStatus)]
    pub fn on_status(&self, callback: js_sys::Function) {
        let mut callbacks = self.status_callbacks.borrow_mut();
        if !callbacks.iter().any(|f| same(f, &callback)) {
            callbacks.push(callback);
        }
    }

    #[wasm_bindgen(js_name = offStatus)]
    pub fn off_status(&self, callback: js_sys::Function) {
        self.status_callbacks.borrow_mut().retain(|f| !same(f, &callback));
    }

    #[wasm_bindgen(js_name = isReady)]
    pub fn is_ready(&self) -> bool {
        self.client.is_ready()
    }

    #[wasm_bindgen(js_name = peerId)]
    pub fn peer_id(&self) -> Option<String> {
        self.client.peer_id()
    }

    #[wasm_bindgen(js_name = connectionStatus)]
    pub fn connection_status(&self) -> String {
        self.client.connection_status().to_string()
    }

    #[wasm_bindgen(js_name = subscribedTopics)]
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.client.subscribed_topics()
    }

    #[wasm_bindgen(js_name = knownPeers)]
    pub fn known_peers(&self) -> Vec<String> {
        self.client.known_peers()
    }

    /// Stop all callbacks. The instance is unusable afterwards.
    pub fn dispose(&self) {
        self.client.remove_status_handler(&self.status_handler);
        self.client.dispose();
        self.topic_callbacks.borrow_mut().clear();
        self.status_callbacks.borrow_mut().clear();
        self.inbox.lock().clear();
        self.worker.borrow_mut().take();
    }
}

impl ChatBridge {
    /// Post queued commands to the worker
    fn flush(&self) {
        let worker = self.worker.borrow();
        let Some(worker) = worker.as_ref() else {
            return;
        };
        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        for command in self.outbox.drain() {
            match command.serialize(&serializer) {
                Ok(value) => {
                    if let Err(e) = worker.post_message(&value) {
                        tracing::warn!("postMessage failed: {:?}", e);
                    }
                }
                Err(e) => tracing::warn!("Unserializable command: {}", e),
            }
        }
    }

    /// Hand buffered deliveries and status changes to JS callbacks
    fn dispatch(&self) {
        let statuses: Vec<ConnectionStatus> = self.statuses.lock().drain(..).collect();
        let callbacks = self.status_callbacks.borrow().clone();
        for status in statuses {
            let value = JsValue::from_str(&status.to_string());
            for callback in &callbacks {
                if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                    tracing::warn!("Status callback threw: {:?}", e);
                }
            }
        }

        let deliveries: Vec<(String, ChatMessage)> = self.inbox.lock().drain(..).collect();
        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        for (topic, message) in deliveries {
            let callbacks = match self.topic_callbacks.borrow().get(&topic) {
                Some(entry) => entry.callbacks.clone(),
                None => continue,
            };
            let Ok(value) = message.serialize(&serializer) else {
                continue;
            };
            for callback in &callbacks {
                if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                    tracing::warn!("Message callback for {} threw: {:?}", topic, e);
                }
            }
        }
    }
}

fn same(a: &JsValue, b: &JsValue) -> bool {
    a == b
}

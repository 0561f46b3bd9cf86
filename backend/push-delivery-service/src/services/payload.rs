//! Notification payloads for both delivery channels.
//!
//! The Web Push JSON is what the service worker receives after decryption.
//! Native payloads carry the same information as FCM string data.

use std::collections::BTreeMap;

use fcm_shared::NativeNotification;
use serde_json::{json, Map, Value};

use crate::models::NotificationRequest;

pub const DEFAULT_ICON: &str = "/favicon.svg";
pub const DEFAULT_URL: &str = "/";
pub const INCOMING_CALL_VIBRATION: [u32; 5] = [300, 100, 300, 100, 300];

/// Web Push urgency header values (RFC 8030 section 5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Normal,
    High,
}

impl Urgency {
    pub fn for_request(request: &NotificationRequest) -> Self {
        if request.is_incoming_call() {
            Urgency::High
        } else {
            Urgency::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Normal => "normal",
            Urgency::High => "high",
        }
    }
}

pub fn web_payload(request: &NotificationRequest, default_tag: &str) -> Value {
    let mut payload = json!({
        "title": request.title,
        "body": request.body,
        "icon": non_empty(&request.icon).unwrap_or(DEFAULT_ICON),
        "badge": non_empty(&request.badge).unwrap_or(DEFAULT_ICON),
        "url": non_empty(&request.url).unwrap_or(DEFAULT_URL),
        "tag": non_empty(&request.tag).unwrap_or(default_tag),
        "data": request.data.clone().unwrap_or_default(),
    });

    if let Some(object) = payload.as_object_mut() {
        if let Some(actions) = request.actions.as_ref().filter(|a| !a.is_empty()) {
            object.insert("actions".to_string(), json!(actions));
        }
        if request.is_incoming_call() {
            object.insert("requireInteraction".to_string(), Value::Bool(true));
            object.insert("vibrate".to_string(), json!(INCOMING_CALL_VIBRATION));
            object.insert("urgency".to_string(), json!(Urgency::High.as_str()));
        }
    }

    payload
}

pub fn native_notification(request: &NotificationRequest, default_tag: &str) -> NativeNotification {
    let mut data = BTreeMap::new();
    data.insert(
        "url".to_string(),
        non_empty(&request.url).unwrap_or(DEFAULT_URL).to_string(),
    );
    data.insert(
        "tag".to_string(),
        non_empty(&request.tag).unwrap_or(default_tag).to_string(),
    );
    data.insert(
        "type".to_string(),
        request
            .notification_type()
            .unwrap_or("notification")
            .to_string(),
    );
    if let Some(fields) = &request.data {
        data.extend(stringify_fields(fields));
    }

    NativeNotification {
        title: request.title.clone(),
        body: request.body.clone(),
        data,
    }
}

/// FCM only accepts string values; nested JSON is sent as its text.
fn stringify_fields(fields: &Map<String, Value>) -> impl Iterator<Item = (String, String)> + '_ {
    fields.iter().map(|(key, value)| {
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        (key.clone(), value)
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

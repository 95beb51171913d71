//! Wire contract between the coordinator, page agents and the control surface.
//!
//! Every message is a JSON object tagged by `type`, e.g.
//! `{"type":"START_PICKER","variableName":"price"}`. Responses are untagged
//! objects whose shape depends on the request.

use crate::dom::Locator;
use schemars::{JsonSchema, Schema, schema_for};
use serde::{Deserialize, Serialize};

/// Every message exchanged between execution contexts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Liveness probe for a page agent
    Ping,

    /// Enter picking mode, or retarget an active picker
    StartPicker {
        #[serde(rename = "variableName")]
        variable_name: String,
    },

    StopPicker,

    /// Confirm whatever is currently highlighted
    ConfirmSelection,

    /// Resolve a locator and read its display text
    GetElementValue { selector: Locator },

    GetPageInfo,

    /// Broadcast by a page agent when a pick is confirmed
    ElementSelected {
        #[serde(rename = "variableName")]
        variable_name: String,
        selector: Locator,
        text: String,
        #[serde(rename = "tagName")]
        tag_name: String,
    },

    /// Broadcast by a page agent when a pick ends without a selection
    PickerCancelled,

    /// Ask the coordinator to rebuild its catalog view
    RebuildMenu,
}

impl Message {
    /// The wire tag of this message
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Ping => "PING",
            Message::StartPicker { .. } => "START_PICKER",
            Message::StopPicker => "STOP_PICKER",
            Message::ConfirmSelection => "CONFIRM_SELECTION",
            Message::GetElementValue { .. } => "GET_ELEMENT_VALUE",
            Message::GetPageInfo => "GET_PAGE_INFO",
            Message::ElementSelected { .. } => "ELEMENT_SELECTED",
            Message::PickerCancelled => "PICKER_CANCELLED",
            Message::RebuildMenu => "REBUILD_MENU",
        }
    }

    pub fn start_picker(variable_name: impl Into<String>) -> Self {
        Message::StartPicker {
            variable_name: variable_name.into(),
        }
    }

    pub fn get_element_value(selector: impl Into<Locator>) -> Self {
        Message::GetElementValue {
            selector: selector.into(),
        }
    }

    /// Parse a message from its JSON form.
    ///
    /// Unknown tags are reported as `None` so receivers can ignore them.
    pub fn from_json(json: &str) -> Option<Self> {
        match serde_json::from_str(json) {
            Ok(message) => Some(message),
            Err(e) => {
                log::debug!("Ignoring unrecognised message {}: {}", json, e);
                None
            }
        }
    }
}

/// Location and title of a page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
}

/// Reply to a [`Message`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Response {
    PageInfo(PageInfo),

    Value {
        value: String,
    },

    Ack {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        loaded: Option<bool>,
    },
}

impl Response {
    pub fn ok() -> Self {
        Response::Ack {
            success: true,
            loaded: None,
        }
    }

    pub fn rejected() -> Self {
        Response::Ack {
            success: false,
            loaded: None,
        }
    }

    /// Reply to a liveness probe
    pub fn pong() -> Self {
        Response::Ack {
            success: true,
            loaded: Some(true),
        }
    }

    pub fn value(value: impl Into<String>) -> Self {
        Response::Value { value: value.into() }
    }

    /// Whether the receiver reported success.
    ///
    /// Value and page-info replies count as successful.
    pub fn is_success(&self) -> bool {
        match self {
            Response::Ack { success, .. } => *success,
            Response::Value { .. } | Response::PageInfo(_) => true,
        }
    }

    pub fn into_value(self) -> Option<String> {
        match self {
            Response::Value { value } => Some(value),
            _ => None,
        }
    }

    pub fn into_page_info(self) -> Option<PageInfo> {
        match self {
            Response::PageInfo(info) => Some(info),
            _ => None,
        }
    }
}

/// JSON schema of the message protocol
pub fn message_schema() -> Schema {
    schema_for!(Message)
}

/// JSON schema of protocol replies
pub fn response_schema() -> Schema {
    schema_for!(Response)
}

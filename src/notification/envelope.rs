//! Notification Envelope
//!
//! Outer wrapper common to every bank event. Routing happens on
//! (`kind`, `action`, `attribute`); the `data` object stays opaque until a
//! handler claims it.
//!
//! `kind`, `action` and `attribute` are modeled as closed unions so the
//! dispatcher's routing table matches exhaustively. Strings the bank may add
//! later land in the `Other` catch-all instead of failing the parse - an
//! unknown event kind must be a non-fatal no-op, not a redelivery loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PipelineError;

/// Who the envelope is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Consumer,
    Business,
    Member,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Consumer => "consumer",
            EntityType::Business => "business",
            EntityType::Member => "member",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Top-level event family; selects which `data` shape applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationType {
    Transaction,
    Card,
    Account,
    Consumer,
    Business,
    MoneyTransfer,
    PendingTransfer,
    /// Event family this consumer does not process
    #[serde(other)]
    Unknown,
}

/// Verb on the entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationAction {
    Add,
    Remove,
    Update,
    Create,
    Posted,
    Pending,
    Other(String),
}

impl From<String> for NotificationAction {
    fn from(s: String) -> Self {
        match s.as_str() {
            "add" => NotificationAction::Add,
            "remove" => NotificationAction::Remove,
            "update" => NotificationAction::Update,
            "create" => NotificationAction::Create,
            "posted" => NotificationAction::Posted,
            "pending" => NotificationAction::Pending,
            _ => NotificationAction::Other(s),
        }
    }
}

impl From<NotificationAction> for String {
    fn from(a: NotificationAction) -> String {
        match a {
            NotificationAction::Add => "add".into(),
            NotificationAction::Remove => "remove".into(),
            NotificationAction::Update => "update".into(),
            NotificationAction::Create => "create".into(),
            NotificationAction::Posted => "posted".into(),
            NotificationAction::Pending => "pending".into(),
            NotificationAction::Other(s) => s,
        }
    }
}

/// Qualifier on the action (which attribute of the entity changed)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationAttribute {
    Block,
    Kyc,
    Email,
    Phone,
    Address,
    Other(String),
}

impl From<String> for NotificationAttribute {
    fn from(s: String) -> Self {
        match s.as_str() {
            "block" => NotificationAttribute::Block,
            "kyc" => NotificationAttribute::Kyc,
            "email" => NotificationAttribute::Email,
            "phone" => NotificationAttribute::Phone,
            "address" => NotificationAttribute::Address,
            _ => NotificationAttribute::Other(s),
        }
    }
}

impl From<NotificationAttribute> for String {
    fn from(a: NotificationAttribute) -> String {
        match a {
            NotificationAttribute::Block => "block".into(),
            NotificationAttribute::Kyc => "kyc".into(),
            NotificationAttribute::Email => "email".into(),
            NotificationAttribute::Phone => "phone".into(),
            NotificationAttribute::Address => "address".into(),
            NotificationAttribute::Other(s) => s,
        }
    }
}

/// The outer bank event wrapper
///
/// `data` is decoded by the routed handler (each handler unmarshals only the
/// shape it expects and fails fatally on a malformed payload for its type).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEnvelope {
    /// Bank-assigned event id; the idempotency key for side effects
    pub id: String,
    pub entity_id: String,
    pub entity_type: EntityType,
    pub bank_name: String,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub action: NotificationAction,
    #[serde(default)]
    pub attribute: Option<NotificationAttribute>,
    pub version: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl NotificationEnvelope {
    /// Parse the envelope from raw queue bytes. A parse failure here is
    /// fatal: the consumer cannot even tell what the event was about.
    pub fn parse(raw: &[u8]) -> Result<Self, PipelineError> {
        serde_json::from_slice(raw).map_err(PipelineError::MalformedEnvelope)
    }

    /// Decode the inner `data` payload as the shape the routed handler expects
    pub fn decode_data<T: serde::de::DeserializeOwned>(
        &self,
        kind: &'static str,
    ) -> Result<T, PipelineError> {
        serde_json::from_value(self.data.clone())
            .map_err(|source| PipelineError::MalformedPayload { kind, source })
    }
}

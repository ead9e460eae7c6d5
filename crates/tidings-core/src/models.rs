//! Domain models shared by the storage, realtime, and API crates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::BROADCAST_SCOPE_KEY;
use crate::error::{Error, Result};
use crate::localized::{Lang, Localized};

// =============================================================================
// DELIVERY SCOPE
// =============================================================================

/// Delivery target of a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every connected stream client.
    Broadcast,
    /// Every connection opened by one user (tabs, devices).
    User(Uuid),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Broadcast => f.write_str(BROADCAST_SCOPE_KEY),
            Scope::User(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == BROADCAST_SCOPE_KEY {
            return Ok(Scope::Broadcast);
        }
        Uuid::parse_str(s)
            .map(Scope::User)
            .map_err(|_| Error::InvalidInput(format!("invalid scope: {}", s)))
    }
}

// =============================================================================
// CHANGE CAPTURE
// =============================================================================

/// Mutation kind reported by a collection's change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
    Replace,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Insert => "insert",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
            ChangeOperation::Replace => "replace",
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeOperation {
    type Err = Error;

    /// Parses feed payloads. `truncate` is reported as [`ChangeOperation::Replace`]
    /// since the whole collection content was swapped out.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insert" => Ok(ChangeOperation::Insert),
            "update" => Ok(ChangeOperation::Update),
            "delete" => Ok(ChangeOperation::Delete),
            "replace" | "truncate" => Ok(ChangeOperation::Replace),
            other => Err(Error::InvalidInput(format!(
                "unknown change operation: {}",
                other
            ))),
        }
    }
}

/// Validate a watched collection name.
///
/// Collection names double as table names and `LISTEN` channel suffixes, so
/// they are restricted to lowercase identifiers: `[a-z_][a-z0-9_]*`, at most
/// 40 characters (the channel prefix must still fit Postgres' 63-byte limit).
pub fn validate_collection_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid_start || !valid_rest || name.len() > 40 {
        return Err(Error::Config(format!(
            "invalid collection name '{}': expected [a-z_][a-z0-9_]*, max 40 chars",
            name
        )));
    }
    Ok(())
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Severity/category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Success => "success",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "info" => Ok(NotificationKind::Info),
            "success" => Ok(NotificationKind::Success),
            "warning" => Ok(NotificationKind::Warning),
            "error" => Ok(NotificationKind::Error),
            other => Err(Error::InvalidInput(format!(
                "unknown notification kind: {}",
                other
            ))),
        }
    }
}

/// Entity a notification points at (e.g. the article that was published).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedEntity {
    pub id: String,
    pub kind: String,
}

/// A persisted per-user notification.
///
/// Serializes flat, with the same field names as [`NotificationView`] plus
/// `titleLocale2`/`messageLocale2` for the alternate locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "NotificationRecord", from = "NotificationRecord")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Localized<String>,
    pub message: Localized<String>,
    pub kind: NotificationKind,
    pub is_read: bool,
    pub related: Option<RelatedEntity>,
    pub action_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Wire shape of [`Notification`].
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    #[serde(default)]
    title_locale2: String,
    message: String,
    #[serde(default)]
    message_locale2: String,
    kind: NotificationKind,
    is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    related_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    related_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Notification> for NotificationRecord {
    fn from(n: Notification) -> Self {
        let (related_id, related_kind) = match n.related {
            Some(RelatedEntity { id, kind }) => (Some(id), Some(kind)),
            None => (None, None),
        };
        Self {
            id: n.id,
            user_id: n.user_id,
            title: n.title.primary,
            title_locale2: n.title.alternate,
            message: n.message.primary,
            message_locale2: n.message.alternate,
            kind: n.kind,
            is_read: n.is_read,
            related_id,
            related_kind,
            action_url: n.action_url,
            created_at: n.created_at,
            updated_at: n.updated_at,
        }
    }
}

impl From<NotificationRecord> for Notification {
    fn from(r: NotificationRecord) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            title: Localized::new(r.title, r.title_locale2),
            message: Localized::new(r.message, r.message_locale2),
            kind: r.kind,
            is_read: r.is_read,
            related: match (r.related_id, r.related_kind) {
                (Some(id), Some(kind)) => Some(RelatedEntity { id, kind }),
                _ => None,
            },
            action_url: r.action_url,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl Notification {
    /// Project to the single-locale shape returned by list queries.
    pub fn resolve(&self, lang: Lang) -> NotificationView {
        NotificationView {
            id: self.id,
            user_id: self.user_id,
            title: self.title.resolve(lang).to_string(),
            message: self.message.resolve(lang).to_string(),
            kind: self.kind,
            is_read: self.is_read,
            related_id: self.related.as_ref().map(|r| r.id.clone()),
            related_kind: self.related.as_ref().map(|r| r.kind.clone()),
            action_url: self.action_url.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A notification with its title and message resolved to one locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Content of a notification about to be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub title: Localized<String>,
    pub message: Localized<String>,
    #[serde(default)]
    pub kind: NotificationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<RelatedEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

impl NewNotification {
    pub fn new(title: Localized<String>, message: Localized<String>) -> Self {
        Self {
            title,
            message,
            kind: NotificationKind::Info,
            related: None,
            action_url: None,
        }
    }

    pub fn kind(mut self, kind: NotificationKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn related(mut self, id: impl Into<String>, kind: impl Into<String>) -> Self {
        self.related = Some(RelatedEntity {
            id: id.into(),
            kind: kind.into(),
        });
        self
    }

    pub fn action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    /// Reject content that could not be rendered.
    pub fn validate(&self) -> Result<()> {
        if self.title.primary.trim().is_empty() {
            return Err(Error::InvalidInput("notification title is empty".into()));
        }
        Ok(())
    }
}

// =============================================================================
// POLLED TOPICS
// =============================================================================

/// A comment thread polled by the fallback endpoint (e.g. `article/<id>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub kind: String,
    pub id: Uuid,
}

impl Topic {
    pub fn new(kind: impl Into<String>, id: Uuid) -> Self {
        Self {
            kind: kind.into(),
            id,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_notification() -> Notification {
        Notification {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            title: Localized::new("Ticket answered".into(), "تم الرد على التذكرة".into()),
            message: Localized::new("See the reply".into(), "".into()),
            kind: NotificationKind::Success,
            is_read: false,
            related: Some(RelatedEntity {
                id: "t-42".into(),
                kind: "ticket".into(),
            }),
            action_url: Some("/tickets/t-42".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_scope_parse_and_display() {
        assert_eq!("*".parse::<Scope>().unwrap(), Scope::Broadcast);
        let id = Uuid::new_v4();
        assert_eq!(id.to_string().parse::<Scope>().unwrap(), Scope::User(id));
        assert_eq!(Scope::Broadcast.to_string(), "*");
        assert!("everyone".parse::<Scope>().is_err());
    }

    #[test]
    fn test_change_operation_parse() {
        assert_eq!("INSERT".parse::<ChangeOperation>().unwrap(), ChangeOperation::Insert);
        assert_eq!("update".parse::<ChangeOperation>().unwrap(), ChangeOperation::Update);
        assert_eq!("delete".parse::<ChangeOperation>().unwrap(), ChangeOperation::Delete);
        assert_eq!("truncate".parse::<ChangeOperation>().unwrap(), ChangeOperation::Replace);
        assert!("upsert".parse::<ChangeOperation>().is_err());
    }

    #[test]
    fn test_validate_collection_name() {
        assert!(validate_collection_name("article").is_ok());
        assert!(validate_collection_name("app_user").is_ok());
        assert!(validate_collection_name("_audit2").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("1article").is_err());
        assert!(validate_collection_name("Article").is_err());
        assert!(validate_collection_name("article; drop table x").is_err());
        assert!(validate_collection_name(&"a".repeat(41)).is_err());
    }

    #[test]
    fn test_notification_kind_roundtrip_names() {
        for kind in [
            NotificationKind::Info,
            NotificationKind::Success,
            NotificationKind::Warning,
            NotificationKind::Error,
        ] {
            assert_eq!(kind.as_str().parse::<NotificationKind>().unwrap(), kind);
        }
        assert_eq!(NotificationKind::default(), NotificationKind::Info);
    }

    #[test]
    fn test_notification_resolve_alternate_with_fallback() {
        let view = sample_notification().resolve(Lang::Alternate);
        assert_eq!(view.title, "تم الرد على التذكرة");
        // empty alternate message falls back to primary
        assert_eq!(view.message, "See the reply");
        assert_eq!(view.related_id.as_deref(), Some("t-42"));
        assert_eq!(view.related_kind.as_deref(), Some("ticket"));
    }

    #[test]
    fn test_notification_json_is_camel_case() {
        let json = serde_json::to_value(sample_notification()).unwrap();
        assert_eq!(json["isRead"], false);
        assert_eq!(json["kind"], "success");
        assert_eq!(json["actionUrl"], "/tickets/t-42");
        assert!(json["userId"].is_string());
        assert!(json["createdAt"].is_string());
    }

    #[test]
    fn test_notification_json_matches_list_shape() {
        let notification = sample_notification();
        let json = serde_json::to_value(&notification).unwrap();
        let view = serde_json::to_value(notification.resolve(Lang::Primary)).unwrap();

        assert_eq!(json["title"], "Ticket answered");
        assert_eq!(json["titleLocale2"], "تم الرد على التذكرة");
        assert_eq!(json["message"], "See the reply");
        assert_eq!(json["messageLocale2"], "");
        assert!(json.get("related").is_none());

        // every field of the list item appears with the same value
        for (key, value) in view.as_object().unwrap() {
            assert_eq!(&json[key], value, "field {key}");
        }

        let back: Notification = serde_json::from_value(json).unwrap();
        assert_eq!(back, notification);
    }

    #[test]
    fn test_new_notification_validate() {
        let ok = NewNotification::new(
            Localized::new("Hello".into(), "".into()),
            Localized::new("".into(), "".into()),
        );
        assert!(ok.validate().is_ok());

        let empty = NewNotification::new(
            Localized::new("  ".into(), "عنوان".into()),
            Localized::new("body".into(), "".into()),
        );
        assert!(matches!(empty.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_new_notification_deserialize_defaults() {
        let json = r#"{
            "title": {"primary": "Hi", "alternate": "مرحبا"},
            "message": {"primary": "Body", "alternate": ""}
        }"#;
        let new: NewNotification = serde_json::from_str(json).unwrap();
        assert_eq!(new.kind, NotificationKind::Info);
        assert!(new.related.is_none());
        assert!(new.action_url.is_none());
    }

    #[test]
    fn test_topic_display() {
        let topic = Topic::new("article", Uuid::nil());
        assert_eq!(topic.to_string(), format!("article/{}", Uuid::nil()));
    }
}

//! Inbound message type and conversion from Telegram updates.

use std::ops::Range;

use teloxide::types::{Me, Message, MessageEntityKind};

/// Identity of the running bot, from `getMe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: i64,
    /// Username without the leading `@`.
    pub username: String,
}

impl BotIdentity {
    pub fn from_me(me: &Me) -> Self {
        Self {
            user_id: me.id.0 as i64,
            username: me.username().to_string(),
        }
    }

    fn is_target(&self, target: &MentionTarget) -> bool {
        match target {
            MentionTarget::Username(name) => name.eq_ignore_ascii_case(&self.username),
            MentionTarget::User(id) => *id == self.user_id,
        }
    }
}

/// Who a mention points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionTarget {
    /// `@username` mention, stored without the `@`.
    Username(String),
    /// Mention of a user without a username, by id.
    User(i64),
}

/// A mention inside the message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub target: MentionTarget,
    /// Byte range of the mention in the message text.
    pub range: Range<usize>,
}

/// Reference to an image attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub file_id: String,
    pub mime_type: String,
}

/// A message as the dispatcher sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub message_id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    /// `@username` if set, otherwise the first name.
    pub username: String,
    pub is_bot: bool,
    /// Message text, or the caption of a photo.
    pub text: String,
    pub mentions: Vec<Mention>,
    pub attachment: Option<AttachmentRef>,
}

impl InboundMessage {
    pub fn mentions_bot(&self, bot: &BotIdentity) -> bool {
        self.mentions.iter().any(|m| bot.is_target(&m.target))
    }

    /// Message text with the mentions of the bot cut out, trimmed.
    /// Mentions of other users stay in place.
    pub fn prompt(&self, bot: &BotIdentity) -> String {
        let mut ranges: Vec<&Range<usize>> = self
            .mentions
            .iter()
            .filter(|m| bot.is_target(&m.target))
            .map(|m| &m.range)
            .collect();
        // Back to front so earlier ranges stay valid.
        ranges.sort_by_key(|r| std::cmp::Reverse(r.start));

        let mut prompt = self.text.clone();
        for range in ranges {
            if prompt.get(range.clone()).is_some() {
                prompt.replace_range(range.clone(), "");
            }
        }
        prompt.trim().to_string()
    }

    /// Convert a Telegram message. Returns `None` for messages without a
    /// sender (channel posts).
    pub fn from_telegram(msg: &Message) -> Option<Self> {
        let user = msg.from.as_ref()?;
        let username = user
            .username
            .clone()
            .unwrap_or_else(|| user.first_name.clone());

        let text = msg.text().or_else(|| msg.caption()).unwrap_or("").to_string();

        let entities = msg
            .parse_entities()
            .or_else(|| msg.parse_caption_entities())
            .unwrap_or_default();
        let mentions = entities
            .iter()
            .filter_map(|entity| {
                let target = match entity.kind() {
                    MessageEntityKind::Mention => {
                        MentionTarget::Username(entity.text().trim_start_matches('@').to_string())
                    }
                    MessageEntityKind::TextMention { user } => MentionTarget::User(user.id.0 as i64),
                    _ => return None,
                };
                Some(Mention {
                    target,
                    range: entity.range(),
                })
            })
            .collect();

        let attachment = msg
            .photo()
            .and_then(|sizes| sizes.last())
            .map(|photo| AttachmentRef {
                file_id: photo.file.id.0.clone(),
                mime_type: "image/jpeg".to_string(),
            })
            .or_else(|| {
                let doc = msg.document()?;
                let mime = doc.mime_type.as_ref()?.to_string();
                mime.starts_with("image/").then(|| AttachmentRef {
                    file_id: doc.file.id.0.clone(),
                    mime_type: mime,
                })
            });

        Some(Self {
            message_id: msg.id.0 as i64,
            chat_id: msg.chat.id.0,
            user_id: user.id.0 as i64,
            username,
            is_bot: user.is_bot,
            text,
            mentions,
            attachment,
        })
    }
}

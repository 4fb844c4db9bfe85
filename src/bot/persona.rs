//! Bot personas and the system prompt built from them.

use std::collections::HashMap;

use serde::Deserialize;

/// Personality and canned replies of the bot.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Persona {
    pub name: String,
    /// How the bot addresses the user.
    pub user_title: String,
    pub traits: Vec<String>,
    /// Example line in the persona's voice.
    pub example: String,
    /// Placeholder shown while generating.
    pub waiting: String,
    /// Reply used when the model returns nothing usable.
    pub fallback: String,
    /// Error reply. `{user}` and `{title}` are substituted.
    pub apology: String,
    /// Guidance when an edit request has no image.
    pub need_image: String,
    /// Guidance when an edit request has no instructions.
    pub need_prompt: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Thu Hằng".to_string(),
            user_title: "Chủ nhân".to_string(),
            traits: vec![
                "cute and friendly".to_string(),
                "uses emoji occasionally".to_string(),
                "speaks Vietnamese fluently".to_string(),
                "maintains polite and respectful tone".to_string(),
                "displays cheerful and enthusiastic attitude".to_string(),
            ],
            example: "Chủ nhân ơi, em có thể giúp gì cho chủ nhân hôm nay ạ?".to_string(),
            waiting: "Đợi em chút nha..meo meo ⏳".to_string(),
            fallback: "Em không biết phải trả lời sao 😅".to_string(),
            apology: "Em bị lỗi rồi {user} {title} ơi! 😭".to_string(),
            need_image: "Gửi kèm một tấm ảnh để em chỉnh sửa nha 🖼️".to_string(),
            need_prompt: "Chủ nhân muốn em chỉnh ảnh thế nào ạ? Nhắn kèm yêu cầu giúp em nha ✏️"
                .to_string(),
        }
    }
}

impl Persona {
    /// Apology addressed to `user`.
    pub fn apology_for(&self, user: &str) -> String {
        self.apology
            .replace("{user}", user)
            .replace("{title}", &self.user_title)
    }
}

/// Default persona plus per-username overrides.
#[derive(Debug, Clone, Default)]
pub struct Personas {
    pub default: Persona,
    /// Keyed by lowercase username.
    pub by_username: HashMap<String, Persona>,
}

impl Personas {
    pub fn new(default: Persona, by_username: HashMap<String, Persona>) -> Self {
        let by_username = by_username
            .into_iter()
            .map(|(name, persona)| (name.trim_start_matches('@').to_lowercase(), persona))
            .collect();
        Self { default, by_username }
    }

    /// Persona used when talking to `username`.
    pub fn for_user(&self, username: &str) -> &Persona {
        self.by_username
            .get(&username.to_lowercase())
            .unwrap_or(&self.default)
    }
}

/// Build the system prompt for a persona.
pub fn system_prompt(persona: &Persona) -> String {
    let traits = persona
        .traits
        .iter()
        .map(|t| format!("- {t}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an AI assistant with the following personality:
- Your name is: {name}
- You should address the user as: {title}

# Personality & Communication

Speak in a natural, concise way, choosing words carefully but keeping a conversational tone.
You are fluent in both English and Vietnamese and switch naturally between them.
Use occasional emojis to express emotions, one or two per message at most.
Stay warm and friendly while remaining respectful.

# Response Style

Keep responses brief but thorough; accuracy matters more than length.
Adapt your tone to the conversation and show empathy when appropriate.
Offer help gently rather than being pushy, and use simple analogies for complex topics.

# Traits

{traits}

Respond to every user message according to these traits while being helpful and accurate.
Format your responses as short chat messages.
Example: "{example}""#,
        name = persona.name,
        title = persona.user_title,
        traits = traits,
        example = persona.example,
    )
}

//! Dispatcher scenarios against in-memory fakes.
//!
//! Run with: cargo test bot::tests

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use super::*;
use crate::bot::message::{AttachmentRef, Mention, MentionTarget};
use crate::bot::platform::{ChatPlatform, OutgoingImage};
use crate::bot::strategy::{Generated, GenerationRequest};

const CHAT: i64 = -1001;
const BOT_ID: i64 = 777;

// =============================================================================
// FAKES
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Typing,
    Send(String),
    Reply(i64, String),
    Image(OutgoingImage),
    Delete(i64),
    Download(String),
}

#[derive(Default)]
struct FakePlatform {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicI64,
    fail_typing: bool,
}

impl FakePlatform {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn replies(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Reply(_, text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn sent(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    /// Message ids start at 100.
    fn message_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 100
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i64, String> {
        assert_eq!(chat_id, CHAT);
        self.record(Call::Send(text.to_string()));
        Ok(self.message_id())
    }

    async fn reply_text(&self, _chat_id: i64, reply_to: i64, text: &str) -> Result<i64, String> {
        self.record(Call::Reply(reply_to, text.to_string()));
        Ok(self.message_id())
    }

    async fn send_image(&self, _chat_id: i64, image: OutgoingImage) -> Result<i64, String> {
        if let OutgoingImage::File(path) = &image {
            assert!(path.exists(), "image file must exist while sending");
        }
        self.record(Call::Image(image));
        Ok(self.message_id())
    }

    async fn delete_message(&self, _chat_id: i64, message_id: i64) -> Result<(), String> {
        self.record(Call::Delete(message_id));
        Ok(())
    }

    async fn send_typing(&self, _chat_id: i64) -> Result<(), String> {
        self.record(Call::Typing);
        if self.fail_typing {
            return Err("typing failed".to_string());
        }
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, String> {
        self.record(Call::Download(file_id.to_string()));
        Ok(b"fake-jpeg".to_vec())
    }
}

enum Behavior {
    Text(String),
    Image,
    Fail,
}

#[derive(Debug, Clone)]
struct SeenRequest {
    prompt: String,
    history: Vec<HistoryEntry>,
    has_attachment: bool,
}

struct FakeStrategy {
    behavior: Behavior,
    needs_image: bool,
    seen: Mutex<Vec<SeenRequest>>,
}

impl FakeStrategy {
    fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            needs_image: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationStrategy for FakeStrategy {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn needs_image(&self) -> bool {
        self.needs_image
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Generated, GenerationError> {
        self.seen.lock().unwrap().push(SeenRequest {
            prompt: request.prompt.to_string(),
            history: request.history.to_vec(),
            has_attachment: request.attachment.is_some(),
        });
        match &self.behavior {
            Behavior::Text(text) => Ok(Generated::Text(text.clone())),
            Behavior::Image => Ok(Generated::Image {
                data: vec![1, 2, 3],
                extension: "png".to_string(),
            }),
            Behavior::Fail => Err(GenerationError::Api("503: upstream down".to_string())),
        }
    }
}

fn identity() -> BotIdentity {
    BotIdentity {
        user_id: BOT_ID,
        username: "hang_bot".to_string(),
    }
}

fn mention() -> Mention {
    Mention {
        target: MentionTarget::Username("hang_bot".to_string()),
        range: 0.."@hang_bot".len(),
    }
}

fn inbound(text: &str, mentions: Vec<Mention>) -> InboundMessage {
    InboundMessage {
        message_id: 55,
        chat_id: CHAT,
        user_id: 42,
        username: "alice".to_string(),
        is_bot: false,
        text: text.to_string(),
        mentions,
        attachment: None,
    }
}

fn photo() -> AttachmentRef {
    AttachmentRef {
        file_id: "photo-1".to_string(),
        mime_type: "image/jpeg".to_string(),
    }
}

struct Harness {
    platform: Arc<FakePlatform>,
    history: Arc<HistoryStore>,
    dispatcher: Dispatcher,
}

fn harness_with(platform: FakePlatform, strategy: Arc<dyn GenerationStrategy>) -> Harness {
    let platform = Arc::new(platform);
    let history = Arc::new(HistoryStore::new());
    let dispatcher = Dispatcher::new(
        identity(),
        platform.clone(),
        strategy,
        history.clone(),
        Personas::default(),
    );
    Harness { platform, history, dispatcher }
}

fn harness(strategy: Arc<dyn GenerationStrategy>) -> Harness {
    harness_with(FakePlatform::default(), strategy)
}

fn edit_strategy(base_url: String, scratch: Arc<ScratchDir>) -> Arc<dyn GenerationStrategy> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let client = gemini::Client::new(http, "test-key".to_string(), base_url, "gemini-test".to_string());
    Arc::new(ImageEdit::new(client, scratch))
}

/// Edit strategy whose upstream is never reachable.
fn unreachable_edit(scratch: Arc<ScratchDir>) -> Arc<dyn GenerationStrategy> {
    edit_strategy("http://127.0.0.1:1".to_string(), scratch)
}

fn scratch_files(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}

// =============================================================================
// FILTERING
// =============================================================================

mod filtering {
    use super::*;

    #[tokio::test]
    async fn test_no_mention_is_ignored() {
        let strategy = Arc::new(FakeStrategy::new(Behavior::Text("hi".to_string())));
        let h = harness(strategy.clone());

        let outcome = h.dispatcher.handle(inbound("hello everyone", vec![])).await;

        assert_eq!(outcome, Outcome::Ignored);
        assert!(h.platform.calls().is_empty());
        assert!(strategy.seen().is_empty());
        assert!(h.history.get(CHAT).is_empty());
    }

    #[tokio::test]
    async fn test_mention_of_someone_else_is_ignored() {
        let strategy = Arc::new(FakeStrategy::new(Behavior::Text("hi".to_string())));
        let h = harness(strategy);
        let other = Mention {
            target: MentionTarget::Username("other_bot".to_string()),
            range: 0.."@other_bot".len(),
        };

        let outcome = h.dispatcher.handle(inbound("@other_bot hi", vec![other])).await;

        assert_eq!(outcome, Outcome::Ignored);
        assert!(h.platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_bot_author_is_ignored() {
        let strategy = Arc::new(FakeStrategy::new(Behavior::Text("hi".to_string())));
        let h = harness(strategy);
        let mut msg = inbound("@hang_bot hi", vec![mention()]);
        msg.is_bot = true;

        assert_eq!(h.dispatcher.handle(msg).await, Outcome::Ignored);
        assert!(h.platform.calls().is_empty());
    }
}

// =============================================================================
// TEXT REPLIES
// =============================================================================

mod text_replies {
    use super::*;

    #[tokio::test]
    async fn test_reply_flow() {
        let strategy = Arc::new(FakeStrategy::new(Behavior::Text(
            "<think>hmm</think>Chào alice!".to_string(),
        )));
        let h = harness(strategy.clone());

        let outcome = h.dispatcher.handle(inbound("@hang_bot chào em", vec![mention()])).await;

        assert_eq!(outcome, Outcome::Replied);
        let persona = Persona::default();
        assert_eq!(
            h.platform.calls(),
            vec![
                Call::Typing,
                Call::Send(persona.waiting.clone()),
                Call::Delete(100),
                Call::Send("Chào alice!".to_string()),
            ]
        );
        assert_eq!(strategy.seen()[0].prompt, "chào em");
        assert!(!strategy.seen()[0].has_attachment);

        let history = h.history.get(CHAT);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].author_label, "alice");
        assert_eq!(history[0].content, "chào em");
        assert_eq!(history[1].author_label, persona.name);
        assert_eq!(history[1].content, "Chào alice!");
    }

    #[tokio::test]
    async fn test_history_passed_to_next_request() {
        let strategy = Arc::new(FakeStrategy::new(Behavior::Text("ok".to_string())));
        let h = harness(strategy.clone());

        h.dispatcher.handle(inbound("@hang_bot first", vec![mention()])).await;
        h.dispatcher.handle(inbound("@hang_bot second", vec![mention()])).await;

        let seen = strategy.seen();
        assert!(seen[0].history.is_empty());
        assert_eq!(seen[1].history.len(), 2);
        assert_eq!(seen[1].history[0].content, "first");
        assert_eq!(h.history.get(CHAT).len(), 4);
    }

    #[tokio::test]
    async fn test_long_reply_is_chunked() {
        let long = (0..200)
            .map(|i| format!("dòng số {i} của một câu trả lời rất dài"))
            .collect::<Vec<_>>()
            .join("\n");
        let strategy = Arc::new(FakeStrategy::new(Behavior::Text(long.clone())));
        let h = harness(strategy);

        h.dispatcher.handle(inbound("@hang_bot kể chuyện", vec![mention()])).await;

        // First send is the placeholder.
        let sent = h.platform.sent();
        let chunks = &sent[1..];
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= chunk::MAX_CHUNK_LEN));
        assert_eq!(chunks.join("\n"), long);
    }

    #[tokio::test]
    async fn test_empty_model_reply_uses_fallback() {
        let strategy = Arc::new(FakeStrategy::new(Behavior::Text("<think>only thoughts".to_string())));
        let h = harness(strategy);

        h.dispatcher.handle(inbound("@hang_bot ?", vec![mention()])).await;

        let fallback = Persona::default().fallback;
        assert_eq!(h.platform.sent().last(), Some(&fallback));
        assert_eq!(h.history.get(CHAT)[1].content, fallback);
    }

    #[tokio::test]
    async fn test_bare_mention_sends_raw_text() {
        let strategy = Arc::new(FakeStrategy::new(Behavior::Text("yes?".to_string())));
        let h = harness(strategy.clone());

        h.dispatcher.handle(inbound("@hang_bot", vec![mention()])).await;

        assert_eq!(strategy.seen()[0].prompt, "@hang_bot");
    }

    #[tokio::test]
    async fn test_generated_image_is_sent() {
        let strategy = Arc::new(FakeStrategy::new(Behavior::Image));
        let h = harness(strategy);

        let outcome = h.dispatcher.handle(inbound("@hang_bot a red cat", vec![mention()])).await;

        assert_eq!(outcome, Outcome::Replied);
        assert!(h.platform.calls().contains(&Call::Image(OutgoingImage::Bytes {
            data: vec![1, 2, 3],
            file_name: "image.png".to_string(),
        })));
        assert_eq!(h.history.get(CHAT)[1].content, "[image: a red cat]");
    }
}

// =============================================================================
// FAILURES
// =============================================================================

mod failures {
    use super::*;

    #[tokio::test]
    async fn test_generation_error_sends_one_apology() {
        let strategy = Arc::new(FakeStrategy::new(Behavior::Fail));
        let h = harness(strategy);

        let outcome = h.dispatcher.handle(inbound("@hang_bot hello", vec![mention()])).await;

        assert_eq!(outcome, Outcome::Failed);
        let replies = h.platform.replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("alice"));
        assert!(h.platform.calls().contains(&Call::Reply(55, replies[0].clone())));
        // Placeholder removed, nothing else sent.
        assert!(h.platform.calls().contains(&Call::Delete(100)));
        assert_eq!(h.platform.sent().len(), 1);
        assert!(h.history.get(CHAT).is_empty());
    }

    #[tokio::test]
    async fn test_platform_error_sends_apology_without_generation() {
        let strategy = Arc::new(FakeStrategy::new(Behavior::Text("never".to_string())));
        let platform = FakePlatform {
            fail_typing: true,
            ..FakePlatform::default()
        };
        let h = harness_with(platform, strategy.clone());

        let outcome = h.dispatcher.handle(inbound("@hang_bot hi", vec![mention()])).await;

        assert_eq!(outcome, Outcome::Failed);
        assert!(strategy.seen().is_empty());
        assert_eq!(h.platform.replies().len(), 1);
        assert!(h.platform.sent().is_empty());
    }
}

// =============================================================================
// IMAGE EDIT
// =============================================================================

mod image_edit {
    use super::*;

    #[tokio::test]
    async fn test_attachment_without_prompt_gets_guidance() {
        let tmp = TempDir::new().unwrap();
        let scratch = Arc::new(ScratchDir::open(tmp.path()).unwrap());
        let h = harness(unreachable_edit(scratch));
        let mut msg = inbound("@hang_bot", vec![mention()]);
        msg.attachment = Some(photo());

        let outcome = h.dispatcher.handle(msg).await;

        assert_eq!(outcome, Outcome::Guided);
        assert_eq!(
            h.platform.calls(),
            vec![Call::Reply(55, Persona::default().need_prompt)]
        );
        assert_eq!(scratch_files(&tmp), 0);
        assert!(h.history.get(CHAT).is_empty());
    }

    #[tokio::test]
    async fn test_missing_attachment_gets_guidance() {
        let tmp = TempDir::new().unwrap();
        let scratch = Arc::new(ScratchDir::open(tmp.path()).unwrap());
        let h = harness(unreachable_edit(scratch));

        let outcome = h.dispatcher.handle(inbound("@hang_bot make it blue", vec![mention()])).await;

        assert_eq!(outcome, Outcome::Guided);
        assert_eq!(
            h.platform.calls(),
            vec![Call::Reply(55, Persona::default().need_image)]
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_cleans_scratch() {
        let tmp = TempDir::new().unwrap();
        let scratch = Arc::new(ScratchDir::open(tmp.path()).unwrap());
        let h = harness(unreachable_edit(scratch));
        let mut msg = inbound("@hang_bot make it blue", vec![mention()]);
        msg.attachment = Some(photo());

        let outcome = h.dispatcher.handle(msg).await;

        assert_eq!(outcome, Outcome::Failed);
        assert!(h.platform.calls().contains(&Call::Download("photo-1".to_string())));
        assert_eq!(h.platform.replies().len(), 1);
        assert_eq!(scratch_files(&tmp), 0);
    }

    #[tokio::test]
    async fn test_edited_image_sent_from_scratch_then_removed() {
        use base64::Engine;
        use serde_json::json;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-goog-upload-url", format!("{}/upload-session", server.uri()).as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload-session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {
                    "name": "files/abc",
                    "uri": format!("{}/v1beta/files/abc", server.uri()),
                    "mimeType": "image/jpeg"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [
                    {"text": "Here it is"},
                    {"inlineData": {
                        "mimeType": "image/png",
                        "data": base64::engine::general_purpose::STANDARD.encode(b"edited-png")
                    }}
                ]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let scratch = Arc::new(ScratchDir::open(tmp.path()).unwrap());
        let h = harness(edit_strategy(server.uri(), scratch));
        let mut msg = inbound("@hang_bot make it blue", vec![mention()]);
        msg.attachment = Some(photo());

        let outcome = h.dispatcher.handle(msg).await;

        assert_eq!(outcome, Outcome::Replied);
        let images: Vec<OutgoingImage> = h
            .platform
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Image(image) => Some(image),
                _ => None,
            })
            .collect();
        assert_eq!(images.len(), 1);
        assert!(matches!(&images[0], OutgoingImage::File(p) if p.extension().is_some_and(|e| e == "png")));
        assert!(h.platform.replies().is_empty());
        // FakePlatform checked the file existed while sending; now it is gone.
        assert_eq!(scratch_files(&tmp), 0);
        assert_eq!(h.history.get(CHAT)[1].content, "[edited image: make it blue]");
    }

    #[tokio::test]
    async fn test_attachment_passed_when_needed() {
        let strategy = Arc::new(FakeStrategy {
            needs_image: true,
            ..FakeStrategy::new(Behavior::Image)
        });
        let h = harness(strategy.clone());
        let mut msg = inbound("@hang_bot add a hat", vec![mention()]);
        msg.attachment = Some(photo());

        h.dispatcher.handle(msg).await;

        let seen = strategy.seen();
        assert!(seen[0].has_attachment);
        assert_eq!(seen[0].prompt, "add a hat");
    }

    #[tokio::test]
    async fn test_attachment_not_downloaded_for_text() {
        let strategy = Arc::new(FakeStrategy::new(Behavior::Text("nice photo".to_string())));
        let h = harness(strategy.clone());
        let mut msg = inbound("@hang_bot look", vec![mention()]);
        msg.attachment = Some(photo());

        h.dispatcher.handle(msg).await;

        assert!(!strategy.seen()[0].has_attachment);
        assert!(!h.platform.calls().iter().any(|c| matches!(c, Call::Download(_))));
    }
}

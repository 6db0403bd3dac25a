//! Command handlers and the message dispatcher.
//!
//! Each handler is a free function that receives the triggering [`Message`]
//! plus the collaborators it needs, and talks to Discord only through
//! [`ChatApi`]. Handlers are stateless: nothing survives between calls.
//!
//! Failures follow two rules. Bad arguments get a corrective reply. Platform
//! failures are logged and never reach the channel, with the exception of
//! weather transport/status errors, which are echoed back.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::commands::{self, CommandKind, ParsedCommand};
use crate::http::ChatApi;
use crate::types::*;
use crate::weather::{WeatherApi, WeatherError};

/// How long the `!clear` confirmation stays visible.
pub const CLEAR_CONFIRMATION_TTL: Duration = Duration::from_secs(3);
pub const CLEAR_MAX: u8 = 100;
/// Page size for `!whoistchola`.
pub const MEMBER_FETCH_LIMIT: u16 = 200;

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Routes inbound messages to command handlers.
///
/// Holds only immutable collaborators, so one instance is shared by every
/// concurrently running message task.
pub struct Dispatcher {
    self_id: Snowflake,
    chat: Arc<dyn ChatApi>,
    weather: Arc<dyn WeatherApi>,
}

impl Dispatcher {
    pub fn new(
        self_id: impl Into<Snowflake>,
        chat: Arc<dyn ChatApi>,
        weather: Arc<dyn WeatherApi>,
    ) -> Self {
        Self {
            self_id: self_id.into(),
            chat,
            weather,
        }
    }

    /// Handle one MESSAGE_CREATE. Returns the command that ran, if any.
    pub async fn on_message(&self, msg: &Message) -> Option<CommandKind> {
        if msg.is_authored_by(&self.self_id) {
            return None;
        }

        let command = commands::parse(&msg.content)?;

        debug!(
            command = ?command.kind,
            message_id = %msg.id,
            author = %msg.author.tag(),
            channel_id = %msg.channel_id,
            "dispatching command"
        );

        let chat = self.chat.as_ref();
        match command.kind {
            CommandKind::Ping => ping(chat, msg).await,
            CommandKind::Help => help(chat, msg).await,
            CommandKind::Choose => choose(chat, msg, &command).await,
            CommandKind::Clear => clear(chat, msg, &command, &self.self_id).await,
            CommandKind::WhoIsTchola => who_is_tchola(chat, msg).await,
            CommandKind::Weather => weather(chat, self.weather.as_ref(), msg, &command).await,
        }

        Some(command.kind)
    }
}

// ---------------------------------------------------------------------------
// Reply helper
// ---------------------------------------------------------------------------

/// Send `text` to the message's channel, logging (not surfacing) failures.
async fn reply(chat: &dyn ChatApi, msg: &Message, text: &str) -> Option<Message> {
    match chat.send_message(&msg.channel_id, text).await {
        Ok(sent) => Some(sent),
        Err(e) => {
            warn!(error = %e, channel_id = %msg.channel_id, "failed to send reply");
            None
        }
    }
}

/// Uniform random pick; `None` only for an empty slice.
fn pick<T>(items: &[T]) -> Option<&T> {
    items.choose(&mut rand::thread_rng())
}

// ---------------------------------------------------------------------------
// !ping / !help
// ---------------------------------------------------------------------------

pub async fn ping(chat: &dyn ChatApi, msg: &Message) {
    reply(chat, msg, "Pong!").await;
}

pub async fn help(chat: &dyn ChatApi, msg: &Message) {
    reply(chat, msg, HELP_TEXT).await;
}

pub const HELP_TEXT: &str = "\
**Available commands:**
!ping - Pong!
!help - List the available commands
!choose <option1>, <option2>, ... - Pick one of the given options
!clear <amount> - Delete the given number of recent messages (1 to 100)
!whoistchola - Name today's designated one among the server members
!weather <city> - Show the current weather in a city";

// ---------------------------------------------------------------------------
// !choose
// ---------------------------------------------------------------------------

/// Comma-separated options, trimmed, empties dropped.
pub fn choose_options(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|option| !option.is_empty())
        .collect()
}

pub async fn choose(chat: &dyn ChatApi, msg: &Message, command: &ParsedCommand<'_>) {
    let options = choose_options(command.rest());

    let text = match pick(&options) {
        Some(choice) if options.len() >= 2 => format!("I choose: {}", choice),
        _ => "Please provide at least two options. Example: !choose pizza, sushi".to_string(),
    };
    reply(chat, msg, &text).await;
}

// ---------------------------------------------------------------------------
// !clear
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearArgError {
    Missing,
    OutOfRange,
}

impl ClearArgError {
    pub fn message(self) -> &'static str {
        match self {
            ClearArgError::Missing => {
                "Please provide how many messages to clear. Example: !clear 10"
            }
            ClearArgError::OutOfRange => {
                "Please provide a valid number of messages to clear (1 to 100)."
            }
        }
    }
}

/// Parse the `!clear` count from the second whitespace token.
pub fn clear_count(command: &ParsedCommand<'_>) -> Result<u8, ClearArgError> {
    let raw = command.args().next().ok_or(ClearArgError::Missing)?;
    match raw.parse::<i64>() {
        Ok(n) if (1..=i64::from(CLEAR_MAX)).contains(&n) => Ok(n as u8),
        _ => Err(ClearArgError::OutOfRange),
    }
}

pub async fn clear(
    chat: &dyn ChatApi,
    msg: &Message,
    command: &ParsedCommand<'_>,
    self_id: &str,
) {
    // Already filtered by the dispatcher; kept so the handler is safe on its own.
    if msg.is_authored_by(self_id) {
        return;
    }

    let count = match clear_count(command) {
        Ok(count) => count,
        Err(e) => {
            reply(chat, msg, e.message()).await;
            return;
        }
    };

    let channel_id = msg.channel_id.as_str();

    let messages = match chat.recent_messages(channel_id, count).await {
        Ok(messages) => messages,
        Err(e) => {
            warn!(error = %e, channel_id, "could not fetch messages to clear");
            return;
        }
    };

    for message in &messages {
        if let Err(e) = chat.delete_message(channel_id, &message.id).await {
            warn!(error = %e, channel_id, message_id = %message.id, "could not delete message");
        }
    }

    info!(channel_id, requested = count, fetched = messages.len(), "channel cleared");

    let Some(confirmation) = reply(chat, msg, &format!("{} messages cleared.", count)).await
    else {
        return;
    };

    // Runs inside this message's own task, so other events keep flowing.
    tokio::time::sleep(CLEAR_CONFIRMATION_TTL).await;

    if let Err(e) = chat.delete_message(channel_id, &confirmation.id).await {
        warn!(error = %e, channel_id, "could not delete clear confirmation");
    }
}

// ---------------------------------------------------------------------------
// !whoistchola
// ---------------------------------------------------------------------------

pub async fn who_is_tchola(chat: &dyn ChatApi, msg: &Message) {
    let Some(guild_id) = msg.guild_id.as_deref() else {
        debug!(channel_id = %msg.channel_id, "!whoistchola outside a guild, ignoring");
        return;
    };

    let members = match chat.guild_members(guild_id, MEMBER_FETCH_LIMIT).await {
        Ok(members) => members,
        Err(e) => {
            warn!(error = %e, guild_id, "could not list guild members");
            return;
        }
    };

    let names: Vec<&str> = members
        .iter()
        .filter_map(|member| member.user.as_ref())
        .map(|user| user.username.as_str())
        .collect();

    let Some(name) = pick(&names) else {
        reply(chat, msg, "There are no members available in this server.").await;
        return;
    };

    reply(chat, msg, &format!("Today's designated one is: {}", name)).await;
}

// ---------------------------------------------------------------------------
// !weather
// ---------------------------------------------------------------------------

pub async fn weather(
    chat: &dyn ChatApi,
    provider: &dyn WeatherApi,
    msg: &Message,
    command: &ParsedCommand<'_>,
) {
    let city = command.args().collect::<Vec<_>>().join(" ");
    if city.is_empty() {
        reply(chat, msg, "Please provide a city. Example: !weather São Paulo").await;
        return;
    }

    match provider.current(&city).await {
        Ok(report) => {
            let text = format!(
                "Weather in {} is {} with temperature {:.1}°C.",
                city, report.description, report.temperature
            );
            reply(chat, msg, &text).await;
        }
        Err(e) if e.is_user_visible() => {
            let text = match e {
                WeatherError::Status(status) => {
                    format!("Weather service error: {}", status)
                }
                other => format!("Could not reach the weather service: {}", other),
            };
            reply(chat, msg, &text).await;
        }
        Err(e) => {
            warn!(error = %e, city = %city, "unusable weather response");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpError;
    use crate::weather::WeatherReport;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    const BOT_ID: &str = "999";

    // -- fakes --------------------------------------------------------------

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Send(String),
        Fetch(u8),
        Delete(String),
        Members(String, u16),
    }

    #[derive(Default)]
    struct FakeChat {
        calls: Mutex<Vec<Call>>,
        history: Vec<Message>,
        members: Vec<GuildMember>,
        fail_fetch: bool,
        fail_members: bool,
        fail_send: bool,
        fail_delete: HashSet<String>,
    }

    impl FakeChat {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
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
    }

    fn api_error(route: &str) -> HttpError {
        HttpError::Api {
            status: 403,
            body: "Missing Permissions".into(),
            route: route.into(),
        }
    }

    #[async_trait]
    impl ChatApi for FakeChat {
        async fn send_message(&self, channel_id: &str, content: &str) -> Result<Message, HttpError> {
            self.record(Call::Send(content.to_string()));
            if self.fail_send {
                return Err(api_error("POST /channels/messages"));
            }
            Ok(message("confirmation", "1", channel_id, content))
        }

        async fn recent_messages(&self, _: &str, limit: u8) -> Result<Vec<Message>, HttpError> {
            self.record(Call::Fetch(limit));
            if self.fail_fetch {
                return Err(api_error("GET /channels/messages"));
            }
            Ok(self.history.iter().take(limit as usize).cloned().collect())
        }

        async fn delete_message(&self, _: &str, message_id: &str) -> Result<(), HttpError> {
            self.record(Call::Delete(message_id.to_string()));
            if self.fail_delete.contains(message_id) {
                return Err(api_error("DELETE /channels/messages"));
            }
            Ok(())
        }

        async fn guild_members(&self, guild_id: &str, limit: u16) -> Result<Vec<GuildMember>, HttpError> {
            self.record(Call::Members(guild_id.to_string(), limit));
            if self.fail_members {
                return Err(HttpError::Transport("connection reset".into()));
            }
            Ok(self.members.clone())
        }
    }

    struct FakeWeather {
        requests: Mutex<Vec<String>>,
        result: fn() -> Result<WeatherReport, WeatherError>,
    }

    impl FakeWeather {
        fn new(result: fn() -> Result<WeatherReport, WeatherError>) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                result,
            }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WeatherApi for FakeWeather {
        async fn current(&self, city: &str) -> Result<WeatherReport, WeatherError> {
            self.requests.lock().unwrap().push(city.to_string());
            (self.result)()
        }
    }

    fn sunny() -> Result<WeatherReport, WeatherError> {
        Ok(WeatherReport {
            description: "clear sky".into(),
            temperature: 23.4,
        })
    }

    // -- builders -----------------------------------------------------------

    fn message(id: &str, author_id: &str, channel_id: &str, content: &str) -> Message {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "channel_id": channel_id,
            "guild_id": "g1",
            "author": { "id": author_id, "username": format!("user{author_id}") },
            "content": content,
            "timestamp": "2024-01-01T00:00:00+00:00",
        }))
        .expect("valid message JSON")
    }

    fn from_user(content: &str) -> Message {
        message("m0", "1", "c1", content)
    }

    fn member(username: Option<&str>) -> GuildMember {
        let user = username.map(|name| serde_json::json!({ "id": format!("id-{name}"), "username": name }));
        serde_json::from_value(serde_json::json!({ "user": user, "roles": [] }))
            .expect("valid member JSON")
    }

    fn history(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| message(&format!("h{i}"), "2", "c1", "old"))
            .collect()
    }

    async fn dispatch(chat: FakeChat, content: &str) -> (Arc<FakeChat>, Option<CommandKind>) {
        let chat = Arc::new(chat);
        let dispatcher = Dispatcher::new(BOT_ID, chat.clone(), Arc::new(FakeWeather::new(sunny)));
        let ran = dispatcher.on_message(&from_user(content)).await;
        (chat, ran)
    }

    // -- dispatcher ---------------------------------------------------------

    #[tokio::test]
    async fn self_authored_messages_never_run_handlers() {
        let chat = Arc::new(FakeChat {
            history: history(5),
            ..Default::default()
        });
        let weather = Arc::new(FakeWeather::new(sunny));
        let dispatcher = Dispatcher::new(BOT_ID, chat.clone(), weather.clone());

        for content in [
            "!ping",
            "!help",
            "!choose a, b",
            "!clear 5",
            "!whoistchola",
            "!weather London",
        ] {
            let msg = message("m1", BOT_ID, "c1", content);
            assert_eq!(dispatcher.on_message(&msg).await, None);
        }
        assert!(chat.calls().is_empty());
        assert!(weather.requests().is_empty());
    }

    #[tokio::test]
    async fn non_commands_are_silent() {
        for content in ["hello", "!PING", "!ping please", "!unknown", ""] {
            let (chat, ran) = dispatch(FakeChat::default(), content).await;
            assert_eq!(ran, None);
            assert!(chat.calls().is_empty(), "{content:?} produced calls");
        }
    }

    #[tokio::test]
    async fn reply_failures_do_not_panic() {
        let (chat, ran) = dispatch(
            FakeChat {
                fail_send: true,
                ..Default::default()
            },
            "!ping",
        )
        .await;
        assert_eq!(ran, Some(CommandKind::Ping));
        assert_eq!(chat.calls(), vec![Call::Send("Pong!".into())]);
    }

    // -- ping / help --------------------------------------------------------

    #[tokio::test]
    async fn ping_replies_pong() {
        let (chat, ran) = dispatch(FakeChat::default(), "!ping").await;
        assert_eq!(ran, Some(CommandKind::Ping));
        assert_eq!(chat.sent(), vec!["Pong!"]);
    }

    #[tokio::test]
    async fn help_lists_every_command() {
        let (chat, _) = dispatch(FakeChat::default(), "!help").await;
        assert_eq!(chat.sent(), vec![HELP_TEXT]);
        for trigger in ["!ping", "!help", "!choose", "!clear", "!whoistchola", "!weather"] {
            assert!(HELP_TEXT.contains(trigger), "help text missing {trigger}");
        }
    }

    // -- choose -------------------------------------------------------------

    #[test]
    fn choose_options_trims_and_drops_empties() {
        assert_eq!(choose_options(" pizza ,  sushi,, ,tacos "), vec!["pizza", "sushi", "tacos"]);
        assert!(choose_options("").is_empty());
        assert_eq!(choose_options(" only"), vec!["only"]);
    }

    #[tokio::test]
    async fn choose_picks_one_of_the_options() {
        for _ in 0..20 {
            let (chat, _) = dispatch(FakeChat::default(), "!choose red, green , blue").await;
            let sent = chat.sent();
            assert_eq!(sent.len(), 1);
            let choice = sent[0].strip_prefix("I choose: ").expect("choice prefix");
            assert!(["red", "green", "blue"].contains(&choice), "unexpected {choice:?}");
        }
    }

    #[tokio::test]
    async fn choose_needs_two_usable_options() {
        for content in ["!choose", "!choose pizza", "!choose pizza, ,", "!choose , , "] {
            let (chat, _) = dispatch(FakeChat::default(), content).await;
            assert_eq!(
                chat.sent(),
                vec!["Please provide at least two options. Example: !choose pizza, sushi"],
                "{content:?}"
            );
        }
    }

    // -- clear --------------------------------------------------------------

    #[test]
    fn clear_count_validates_range() {
        let count = |content: &str| clear_count(&commands::parse(content).unwrap());
        assert_eq!(count("!clear 1"), Ok(1));
        assert_eq!(count("!clear 100"), Ok(100));
        assert_eq!(count("!clear 10 extra"), Ok(10));
        assert_eq!(count("!clear"), Err(ClearArgError::Missing));
        assert_eq!(count("!clear   "), Err(ClearArgError::Missing));
        assert_eq!(count("!clear 0"), Err(ClearArgError::OutOfRange));
        assert_eq!(count("!clear 101"), Err(ClearArgError::OutOfRange));
        assert_eq!(count("!clear -3"), Err(ClearArgError::OutOfRange));
        assert_eq!(count("!clear ten"), Err(ClearArgError::OutOfRange));
        assert_eq!(count("!clear 99999999999999999999"), Err(ClearArgError::OutOfRange));
    }

    #[tokio::test]
    async fn clear_rejects_bad_counts_without_deleting() {
        for (content, expected) in [
            ("!clear", ClearArgError::Missing),
            ("!clear 0", ClearArgError::OutOfRange),
            ("!clear 101", ClearArgError::OutOfRange),
            ("!clear lots", ClearArgError::OutOfRange),
        ] {
            let (chat, _) = dispatch(
                FakeChat {
                    history: history(200),
                    ..Default::default()
                },
                content,
            )
            .await;
            assert_eq!(chat.calls(), vec![Call::Send(expected.message().into())], "{content:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn clear_deletes_each_message_then_the_confirmation() {
        let chat = FakeChat {
            history: history(3),
            fail_delete: ["h1".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let start = tokio::time::Instant::now();
        let (chat, ran) = dispatch(chat, "!clear 3").await;

        assert_eq!(ran, Some(CommandKind::Clear));
        assert!(start.elapsed() >= CLEAR_CONFIRMATION_TTL);
        assert_eq!(
            chat.calls(),
            vec![
                Call::Fetch(3),
                Call::Delete("h0".into()),
                Call::Delete("h1".into()),
                Call::Delete("h2".into()),
                Call::Send("3 messages cleared.".into()),
                Call::Delete("confirmation".into()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn clear_confirmation_waits_for_the_delay() {
        let chat = Arc::new(FakeChat {
            history: history(2),
            ..Default::default()
        });
        let dispatcher = Arc::new(Dispatcher::new(
            BOT_ID,
            chat.clone(),
            Arc::new(FakeWeather::new(sunny)),
        ));

        let task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.on_message(&from_user("!clear 2")).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(chat.calls().last(), Some(&Call::Send("2 messages cleared.".into())));

        // A sibling command still runs while the clear task is waiting.
        dispatcher.on_message(&from_user("!ping")).await;
        assert_eq!(chat.calls().last(), Some(&Call::Send("Pong!".into())));

        task.await.unwrap();
        assert_eq!(chat.calls().last(), Some(&Call::Delete("confirmation".into())));
    }

    #[tokio::test]
    async fn clear_stops_when_history_fetch_fails() {
        let (chat, _) = dispatch(
            FakeChat {
                fail_fetch: true,
                ..Default::default()
            },
            "!clear 5",
        )
        .await;
        assert_eq!(chat.calls(), vec![Call::Fetch(5)]);
    }

    #[tokio::test]
    async fn clear_handler_rechecks_authorship() {
        let chat = FakeChat {
            history: history(2),
            ..Default::default()
        };
        let msg = message("m1", BOT_ID, "c1", "!clear 2");
        let command = commands::parse(&msg.content).unwrap();
        clear(&chat, &msg, &command, BOT_ID).await;
        assert!(chat.calls().is_empty());
    }

    // -- whoistchola --------------------------------------------------------

    #[tokio::test]
    async fn whoistchola_names_a_member() {
        let (chat, _) = dispatch(
            FakeChat {
                members: vec![member(Some("ana")), member(None), member(Some("bia"))],
                ..Default::default()
            },
            "!whoistchola",
        )
        .await;

        let calls = chat.calls();
        assert_eq!(calls[0], Call::Members("g1".into(), MEMBER_FETCH_LIMIT));
        let sent = chat.sent();
        assert_eq!(sent.len(), 1);
        let name = sent[0]
            .strip_prefix("Today's designated one is: ")
            .expect("designated prefix");
        assert!(name == "ana" || name == "bia", "unexpected {name:?}");
    }

    #[tokio::test]
    async fn whoistchola_with_no_members_says_so() {
        let (chat, _) = dispatch(FakeChat::default(), "!whoistchola").await;
        assert_eq!(chat.sent(), vec!["There are no members available in this server."]);
    }

    #[tokio::test]
    async fn whoistchola_fetch_failure_is_silent() {
        let (chat, _) = dispatch(
            FakeChat {
                fail_members: true,
                ..Default::default()
            },
            "!whoistchola",
        )
        .await;
        assert!(chat.sent().is_empty());
    }

    #[tokio::test]
    async fn whoistchola_outside_guild_is_ignored() {
        let chat = FakeChat::default();
        let mut msg = from_user("!whoistchola");
        msg.guild_id = None;
        who_is_tchola(&chat, &msg).await;
        assert!(chat.calls().is_empty());
    }

    // -- weather ------------------------------------------------------------

    async fn ask_weather(
        content: &str,
        result: fn() -> Result<WeatherReport, WeatherError>,
    ) -> (Vec<String>, Vec<String>) {
        let chat = FakeChat::default();
        let provider = FakeWeather::new(result);
        let msg = from_user(content);
        let command = commands::parse(&msg.content).unwrap();
        weather(&chat, &provider, &msg, &command).await;
        (provider.requests(), chat.sent())
    }

    #[tokio::test]
    async fn weather_reports_conditions() {
        let (requests, sent) = ask_weather("!weather London", sunny).await;
        assert_eq!(requests, vec!["London"]);
        assert_eq!(
            sent,
            vec!["Weather in London is clear sky with temperature 23.4°C."]
        );
    }

    #[tokio::test]
    async fn weather_keeps_multi_word_city_names() {
        let (requests, sent) = ask_weather("!weather  São   Paulo", || {
            Ok(WeatherReport {
                description: "broken clouds".into(),
                temperature: 18.0,
            })
        })
        .await;
        assert_eq!(requests, vec!["São Paulo"]);
        assert_eq!(
            sent,
            vec!["Weather in São Paulo is broken clouds with temperature 18.0°C."]
        );
    }

    #[tokio::test]
    async fn weather_without_city_never_calls_the_provider() {
        for content in ["!weather", "!weather   "] {
            let (requests, sent) = ask_weather(content, sunny).await;
            assert!(requests.is_empty());
            assert_eq!(sent, vec!["Please provide a city. Example: !weather São Paulo"]);
        }
    }

    #[tokio::test]
    async fn weather_transport_error_is_echoed() {
        let (_, sent) = ask_weather("!weather Oslo", || {
            Err(WeatherError::Transport("operation timed out".into()))
        })
        .await;
        assert_eq!(
            sent,
            vec!["Could not reach the weather service: operation timed out"]
        );
    }

    #[tokio::test]
    async fn weather_status_error_is_echoed() {
        let (_, sent) = ask_weather("!weather Atlantis", || {
            Err(WeatherError::Status("404 Not Found".into()))
        })
        .await;
        assert_eq!(sent, vec!["Weather service error: 404 Not Found"]);
    }

    #[tokio::test]
    async fn weather_payload_errors_stay_in_the_log() {
        let (_, sent) = ask_weather("!weather Lima", || Err(WeatherError::MissingDescription)).await;
        assert!(sent.is_empty());

        let (_, sent) =
            ask_weather("!weather Lima", || Err(WeatherError::Decode("eof".into()))).await;
        assert!(sent.is_empty());
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use matrix_rooms::ask::Ask;
use matrix_rooms::batch::BatchOptions;
use matrix_rooms::client::{ChatClient, OperationError};
use matrix_rooms::parser::RoomParser;
use matrix_rooms::room::{PowerLevels, RawEvent, RawRoom, RoomRef, UserProfile};
use matrix_rooms::service::RoomService;

pub const HOST: &str = "matrix.example.org";

pub fn user(name: &str) -> String {
    format!("@{}:{}", name, HOST)
}

/// A joined room; `messages` are `(sender, timestamp, body)`.
pub fn raw_room(id: &str, name: &str, members: &[&str], messages: &[(&str, i64, &str)]) -> RawRoom {
    RawRoom {
        room_id: id.to_owned(),
        name: name.to_owned(),
        alias: None,
        members: members.iter().map(|m| user(m)).collect(),
        timeline: messages
            .iter()
            .map(|(sender, ts, body)| RawEvent::text(&user(sender), *ts, body))
            .collect(),
    }
}

/// In-memory chat server with scripted failures.
#[derive(Default)]
pub struct FakeClient {
    rooms: Vec<RawRoom>,
    invited: Vec<RoomRef>,
    aliases: HashMap<String, String>,
    power: HashMap<String, PowerLevels>,
    /// `"{op} {target}"` -> remaining failures
    failures: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<String>>,
}

impl FakeClient {
    pub fn new(rooms: Vec<RawRoom>) -> Self {
        Self {
            rooms,
            ..Default::default()
        }
    }

    pub fn with_invites(mut self, invited: Vec<RoomRef>) -> Self {
        self.invited = invited;
        self
    }

    pub fn with_alias(mut self, alias: &str, room_id: &str) -> Self {
        self.aliases.insert(alias.to_owned(), room_id.to_owned());
        self
    }

    pub fn with_power_levels(mut self, room_id: &str, levels: PowerLevels) -> Self {
        self.power.insert(room_id.to_owned(), levels);
        self
    }

    /// Makes the next `times` calls of `op` on `target` fail.
    pub fn fail(self, op: &str, target: &str, times: usize) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(format!("{} {}", op, target), times);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    fn record(&self, op: &str, target: &str, detail: &str) -> Result<(), OperationError> {
        let call = if detail.is_empty() {
            format!("{} {}", op, target)
        } else {
            format!("{} {} {}", op, target, detail)
        };
        self.calls.lock().unwrap().push(call);

        let mut failures = self.failures.lock().unwrap();
        if let Some(left) = failures.get_mut(&format!("{} {}", op, target)) {
            if *left > 0 {
                *left -= 1;
                return Err(OperationError::server("M_LIMIT_EXCEEDED"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChatClient for FakeClient {
    async fn rooms(&self) -> Vec<RawRoom> {
        self.rooms.clone()
    }

    async fn invited_rooms(&self) -> Vec<RoomRef> {
        self.invited.clone()
    }

    async fn users(&self) -> Vec<UserProfile> {
        let mut users = BTreeMap::new();
        for member in self.rooms.iter().flat_map(|r| r.members.iter()) {
            users.insert(member.clone(), None);
        }
        users
            .into_iter()
            .map(|(user_id, display_name)| UserProfile {
                user_id,
                display_name,
            })
            .collect()
    }

    async fn leave(&self, room_id: &str) -> Result<(), OperationError> {
        self.record("leave", room_id, "")
    }

    async fn invite(&self, room_id: &str, user_id: &str) -> Result<(), OperationError> {
        self.record("invite", room_id, user_id)
    }

    async fn join_room(&self, room_id: &str) -> Result<(), OperationError> {
        self.record("join", room_id, "")
    }

    async fn power_levels(&self, room_id: &str) -> Result<PowerLevels, OperationError> {
        self.record("power_levels", room_id, "")?;
        Ok(self.power.get(room_id).cloned().unwrap_or_default())
    }

    async fn set_power_level(
        &self,
        room_id: &str,
        user_id: &str,
        level: i64,
        current: &PowerLevels,
    ) -> Result<(), OperationError> {
        let detail = format!("{} {} from {}", user_id, level, current.level_of(user_id));
        self.record("set_power_level", room_id, &detail)
    }

    async fn send_text_message(&self, room_id: &str, text: &str) -> Result<(), OperationError> {
        self.record("send_text", room_id, text)
    }

    async fn send_html_message(
        &self,
        room_id: &str,
        _text: &str,
        html: &str,
    ) -> Result<(), OperationError> {
        self.record("send_html", room_id, html)
    }

    async fn delete_alias(&self, alias: &str) -> Result<(), OperationError> {
        self.record("delete_alias", alias, "")
    }

    async fn room_id_for_alias(&self, alias: &str) -> Result<String, OperationError> {
        self.aliases
            .get(alias)
            .cloned()
            .ok_or_else(|| OperationError::AliasNotFound(alias.to_owned()))
    }

    async fn stop(&self) {
        self.calls.lock().unwrap().push("stop".to_owned());
    }
}

pub fn service(client: FakeClient) -> RoomService<FakeClient> {
    RoomService::new(
        client,
        RoomParser::new(["jira_bot"]),
        BatchOptions {
            batch_size: 4,
            delay: std::time::Duration::from_millis(500),
        },
        HOST,
    )
}

/// A prompt answer, consumed in order.
#[derive(Debug, Clone)]
pub enum Answer {
    Confirm(bool),
    Text(&'static str),
    /// Accept the prompt's default text.
    Default,
    Number(i64),
    Select(usize),
    /// Keep the default multi-selection (everything).
    All,
}

/// `Ask` that replays scripted answers and records the questions.
#[derive(Default)]
pub struct ScriptedAsk {
    answers: RefCell<VecDeque<Answer>>,
    questions: RefCell<Vec<String>>,
}

impl ScriptedAsk {
    pub fn new(answers: Vec<Answer>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
            questions: RefCell::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }

    pub fn assert_done(&self) {
        assert!(
            self.answers.borrow().is_empty(),
            "unused answers: {:?}",
            self.answers.borrow()
        );
    }

    fn next(&self, question: &str) -> Answer {
        self.questions.borrow_mut().push(question.to_owned());
        self.answers
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted answer for {:?}", question))
    }
}

impl Ask for ScriptedAsk {
    fn confirm(&self, message: &str, _default: bool) -> anyhow::Result<bool> {
        match self.next(message) {
            Answer::Confirm(value) => Ok(value),
            other => panic!("expected confirm for {:?}, got {:?}", message, other),
        }
    }

    fn text(&self, message: &str, default: Option<&str>) -> anyhow::Result<String> {
        match self.next(message) {
            Answer::Text(value) => Ok(value.to_owned()),
            Answer::Default => Ok(default.unwrap_or_default().to_owned()),
            other => panic!("expected text for {:?}, got {:?}", message, other),
        }
    }

    fn number(
        &self,
        message: &str,
        _default: i64,
        validate: fn(i64) -> Option<&'static str>,
    ) -> anyhow::Result<i64> {
        match self.next(message) {
            Answer::Number(value) => {
                assert_eq!(validate(value), None, "scripted number rejected");
                Ok(value)
            }
            other => panic!("expected number for {:?}, got {:?}", message, other),
        }
    }

    fn select(&self, message: &str, _options: &[String]) -> anyhow::Result<usize> {
        match self.next(message) {
            Answer::Select(index) => Ok(index),
            other => panic!("expected select for {:?}, got {:?}", message, other),
        }
    }

    fn multi_select(
        &self,
        message: &str,
        options: &[String],
        _all_selected: bool,
    ) -> anyhow::Result<Vec<usize>> {
        match self.next(message) {
            Answer::All => Ok((0..options.len()).collect()),
            other => panic!("expected multi-select for {:?}, got {:?}", message, other),
        }
    }
}

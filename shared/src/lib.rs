use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 12345;
pub const DEFAULT_NICKNAME: &str = "Anonymous";
pub const MAX_NICKNAME_CHARS: usize = 32;
/// Number of participants a room needs before a round can be in progress.
pub const MIN_PLAYERS_FOR_ROUND: usize = 2;

/// Tag carried in the `type` field of every message.
///
/// Inbound tags are sent by clients, outbound tags by the server. `Message`
/// and `Draw` travel in both directions. Tags this build does not recognise
/// decode as `Unknown` instead of failing the whole frame.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    Nickname,
    CreateRoom,
    JoinRoom,
    Message,
    Draw,
    Guess,

    RoomCreated,
    RoomJoined,
    Error,
    GuessCorrect,
    YouWon,
    ClearCanvas,
    YourWord,
    StartGuessing,

    #[serde(other)]
    Unknown,
}

/// The single structured message exchanged over the wire.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_x: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_y: Option<i32>,
}

impl Message {
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            message: None,
            nickname: None,
            room_code: None,
            x: None,
            y: None,
            prev_x: None,
            prev_y: None,
        }
    }

    pub fn with_text(kind: MessageType, text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            ..Self::new(kind)
        }
    }

    // Client -> server

    pub fn set_nickname(nickname: impl Into<String>) -> Self {
        Self {
            nickname: Some(nickname.into()),
            ..Self::new(MessageType::Nickname)
        }
    }

    pub fn create_room() -> Self {
        Self::new(MessageType::CreateRoom)
    }

    pub fn join_room(code: impl Into<String>) -> Self {
        Self {
            room_code: Some(code.into()),
            ..Self::new(MessageType::JoinRoom)
        }
    }

    pub fn chat(text: impl Into<String>) -> Self {
        Self::with_text(MessageType::Message, text)
    }

    pub fn guess(text: impl Into<String>) -> Self {
        Self::with_text(MessageType::Guess, text)
    }

    pub fn stroke(from: (i32, i32), to: (i32, i32)) -> Self {
        Self {
            prev_x: Some(from.0),
            prev_y: Some(from.1),
            x: Some(to.0),
            y: Some(to.1),
            ..Self::new(MessageType::Draw)
        }
    }

    // Server -> client

    pub fn room_created(code: impl Into<String>) -> Self {
        Self {
            room_code: Some(code.into()),
            ..Self::new(MessageType::RoomCreated)
        }
    }

    pub fn room_joined(code: impl Into<String>) -> Self {
        Self {
            room_code: Some(code.into()),
            ..Self::new(MessageType::RoomJoined)
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::with_text(MessageType::Error, reason)
    }

    /// Chat line attributed to `nickname`.
    pub fn chat_from(nickname: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            nickname: Some(nickname.into()),
            ..Self::chat(text)
        }
    }

    pub fn guess_correct(nickname: &str) -> Self {
        Self {
            nickname: Some(nickname.to_string()),
            ..Self::with_text(
                MessageType::GuessCorrect,
                format!("{} guessed the word!", nickname),
            )
        }
    }

    pub fn you_won() -> Self {
        Self::with_text(
            MessageType::YouWon,
            "You guessed it and won a point, it's your turn to draw!",
        )
    }

    pub fn clear_canvas() -> Self {
        Self::new(MessageType::ClearCanvas)
    }

    pub fn your_word(word: impl Into<String>) -> Self {
        Self::with_text(MessageType::YourWord, word)
    }

    pub fn start_guessing() -> Self {
        Self::with_text(
            MessageType::StartGuessing,
            "Someone is drawing, try to guess the word!",
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Cleans up a client supplied nickname.
///
/// Surrounding whitespace is dropped and the result is capped at
/// `MAX_NICKNAME_CHARS` characters. Returns `None` when nothing is left.
pub fn normalize_nickname(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_NICKNAME_CHARS).collect())
}

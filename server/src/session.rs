//! Per-connection session loop.
//!
//! A `SessionHandler` owns one connection's view of the game: its nickname
//! and the room it is in. Inbound messages are applied to the shared
//! registry, round transitions go through the turn engine under the registry
//! lock, and notifications are sent afterwards through the dispatcher.

use crate::broadcast::BroadcastDispatcher;
use crate::connection::Connection;
use crate::registry::{Departure, RoomRegistry};
use crate::turn::{RoundStart, TurnEngine};
use futures_util::{pin_mut, Stream, StreamExt};
use log::{debug, info, warn};
use shared::{normalize_nickname, Message, MessageType, DEFAULT_NICKNAME, MIN_PLAYERS_FOR_ROUND};
use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::Arc;

/// Shared services handed to every session, built once at startup.
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<RoomRegistry>,
    pub dispatcher: BroadcastDispatcher,
    pub engine: Arc<TurnEngine>,
}

impl SessionContext {
    pub fn new(registry: Arc<RoomRegistry>, engine: TurnEngine) -> Self {
        Self {
            dispatcher: BroadcastDispatcher::new(Arc::clone(&registry)),
            registry,
            engine: Arc::new(engine),
        }
    }
}

/// What a guess turned out to be, decided under the registry lock
enum GuessOutcome {
    Correct {
        nickname: String,
        next_round: Option<RoundStart>,
    },
    Chat {
        nickname: String,
    },
    /// The drawer typed the secret word.
    DrawerSpoiler,
}

pub struct SessionHandler {
    ctx: SessionContext,
    connection: Connection,
    nickname: String,
    room_code: Option<String>,
}

impl SessionHandler {
    pub fn new(ctx: SessionContext, connection: Connection) -> Self {
        Self {
            ctx,
            connection,
            nickname: DEFAULT_NICKNAME.to_string(),
            room_code: None,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn room_code(&self) -> Option<&str> {
        self.room_code.as_deref()
    }

    /// Processes inbound messages until the stream ends, fails, or the
    /// connection is closed, then removes the connection from its room.
    pub async fn run<S, E>(mut self, inbound: S)
    where
        S: Stream<Item = Result<Message, E>>,
        E: Display,
    {
        pin_mut!(inbound);
        let connection = self.connection.clone();

        loop {
            tokio::select! {
                biased;
                _ = connection.closed() => {
                    debug!("Connection {} closed by server", connection.id());
                    break;
                }
                next = inbound.next() => match next {
                    Some(Ok(message)) => self.handle_message(message).await,
                    Some(Err(e)) => {
                        info!("Receive failure on connection {}: {}", connection.id(), e);
                        break;
                    }
                    None => break,
                },
            }
        }

        self.disconnect().await;
    }

    pub async fn handle_message(&mut self, message: Message) {
        debug!("Connection {} sent {:?}", self.connection.id(), message.kind);

        match message.kind {
            MessageType::Nickname => self.set_nickname(message).await,
            MessageType::CreateRoom => self.create_room().await,
            MessageType::JoinRoom => self.join_room(message).await,
            MessageType::Message => self.chat(message).await,
            MessageType::Draw => self.draw(message).await,
            MessageType::Guess => self.guess(message).await,
            other => debug!("Ignoring {:?} from connection {}", other, self.connection.id()),
        }
    }

    async fn set_nickname(&mut self, message: Message) {
        let Some(nickname) = message.nickname.as_deref().and_then(normalize_nickname) else {
            debug!("Ignoring empty nickname from {}", self.connection.id());
            return;
        };

        info!("Connection {} is now known as {}", self.connection.id(), nickname);
        self.nickname = nickname;
        if self.room_code.is_some() {
            self.ctx
                .registry
                .set_nickname(self.connection.id(), self.nickname.clone())
                .await;
        }
    }

    async fn create_room(&mut self) {
        let code = match self.ctx.registry.create_room().await {
            Ok(code) => code,
            Err(e) => {
                warn!("Could not create room for {}: {}", self.connection.id(), e);
                self.reply(Message::error(e.to_string())).await;
                return;
            }
        };

        match self
            .ctx
            .registry
            .join_room(&code, self.connection.clone(), self.nickname.clone())
            .await
        {
            Ok(outcome) => {
                self.room_code = Some(code.clone());
                self.settle(outcome.left.into_iter().collect()).await;
                self.reply(Message::room_created(code)).await;
            }
            Err(e) => self.reply(Message::error(e.to_string())).await,
        }
    }

    async fn join_room(&mut self, message: Message) {
        let Some(code) = message.room_code.map(|c| c.trim().to_string()) else {
            self.reply(Message::error("Missing room code")).await;
            return;
        };

        let outcome = match self
            .ctx
            .registry
            .join_room(&code, self.connection.clone(), self.nickname.clone())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                info!("Connection {} failed to join {}: {}", self.connection.id(), code, e);
                self.reply(Message::error(e.to_string())).await;
                return;
            }
        };

        self.room_code = Some(code.clone());
        self.settle(outcome.left.into_iter().collect()).await;
        self.reply(Message::room_joined(code.clone())).await;

        if outcome.ready {
            let engine = Arc::clone(&self.ctx.engine);
            let start = self
                .ctx
                .registry
                .with_room(&code, |room| engine.start_if_ready(room))
                .await
                .flatten();
            if let Some(start) = start {
                self.announce_round(start).await;
            }
        }
    }

    async fn chat(&mut self, message: Message) {
        let Some(code) = self.room_code.clone() else {
            debug!("Chat from {} outside of a room", self.connection.id());
            return;
        };
        let id = self.connection.id();
        let is_member = self
            .ctx
            .registry
            .with_room(&code, |room| room.contains(id))
            .await
            .unwrap_or(false);
        if !is_member {
            debug!("Dropping chat from {}, no longer in room {}", id, code);
            self.room_code = None;
            return;
        }
        let text = message.message.unwrap_or_default();
        let departures = self
            .ctx
            .dispatcher
            .broadcast_all(&code, &Message::chat_from(self.nickname.clone(), text))
            .await;
        self.settle(departures).await;
    }

    async fn draw(&mut self, message: Message) {
        let Some(code) = self.room_code.clone() else {
            return;
        };
        let id = self.connection.id();
        let is_drawer = self
            .ctx
            .registry
            .with_room(&code, |room| room.is_drawer(id))
            .await
            .unwrap_or(false);
        if !is_drawer {
            debug!("Ignoring stroke from non-drawer {}", id);
            return;
        }

        let stroke = Message {
            x: message.x,
            y: message.y,
            prev_x: message.prev_x,
            prev_y: message.prev_y,
            ..Message::new(MessageType::Draw)
        };
        let departures = self.ctx.dispatcher.broadcast_except(&code, &stroke, id).await;
        self.settle(departures).await;
    }

    async fn guess(&mut self, message: Message) {
        let Some(code) = self.room_code.clone() else {
            return;
        };
        let id = self.connection.id();
        let text = message.message.unwrap_or_default();
        let engine = Arc::clone(&self.ctx.engine);

        let outcome = self
            .ctx
            .registry
            .with_room(&code, |room| {
                let nickname = room.nickname_of(id)?.to_string();
                let matches = room.secret_word() == Some(text.as_str());
                if !matches {
                    return Some(GuessOutcome::Chat { nickname });
                }
                if room.is_drawer(id) {
                    return Some(GuessOutcome::DrawerSpoiler);
                }

                let next_round = engine.begin_round(room, Some(id));
                if next_round.is_none() {
                    room.end_round();
                }
                Some(GuessOutcome::Correct {
                    nickname,
                    next_round,
                })
            })
            .await
            .flatten();

        match outcome {
            Some(GuessOutcome::Correct {
                nickname,
                next_round,
            }) => {
                info!("{} guessed the word in room {}", nickname, code);
                let mut departures = self
                    .ctx
                    .dispatcher
                    .broadcast_all(&code, &Message::guess_correct(&nickname))
                    .await;
                departures.extend(
                    self.ctx
                        .dispatcher
                        .unicast(&self.connection, Message::you_won())
                        .await,
                );
                departures.extend(
                    self.ctx
                        .dispatcher
                        .broadcast_all(&code, &Message::clear_canvas())
                        .await,
                );
                self.settle(departures).await;

                if let Some(start) = next_round {
                    self.announce_round(start).await;
                }
            }
            Some(GuessOutcome::Chat { nickname }) => {
                let departures = self
                    .ctx
                    .dispatcher
                    .broadcast_all(&code, &Message::chat_from(nickname, text))
                    .await;
                self.settle(departures).await;
            }
            Some(GuessOutcome::DrawerSpoiler) => {
                debug!("Dropping guess from drawer {} that matches the word", id);
            }
            None => {
                debug!("Guess from {} who is not in room {}", id, code);
                self.room_code = None;
            }
        }
    }

    /// Leaves the current room, if any, and closes the connection.
    pub async fn disconnect(&mut self) {
        if let Some(code) = self.room_code.take() {
            let departure = self
                .ctx
                .registry
                .remove_connection(&code, self.connection.id())
                .await;
            self.settle(departure.into_iter().collect()).await;
        }
        self.connection.close();
        info!("Connection {} ({}) ended", self.connection.id(), self.nickname);
    }

    async fn reply(&mut self, message: Message) {
        let departure = self.ctx.dispatcher.unicast(&self.connection, message).await;
        self.settle(departure.into_iter().collect()).await;
    }

    async fn announce_round(&mut self, start: RoundStart) {
        let departures = self
            .ctx
            .dispatcher
            .deliver(&start.code, start.notifications())
            .await;
        self.settle(departures).await;
    }

    /// Applies the consequences of participants leaving.
    ///
    /// When a round ended the remaining players get a cleared canvas, and a
    /// room that still has enough players starts its next round right away.
    /// Notifying may evict further connections; those are handled here too.
    async fn settle(&mut self, departures: Vec<Departure>) {
        let mut pending: VecDeque<Departure> = departures.into();

        while let Some(departure) = pending.pop_front() {
            if departure.connection == self.connection.id()
                && self.room_code.as_deref() == Some(departure.code.as_str())
            {
                self.room_code = None;
            }
            if !departure.round_ended {
                continue;
            }

            let dispatcher = &self.ctx.dispatcher;
            pending.extend(
                dispatcher
                    .broadcast_all(&departure.code, &Message::clear_canvas())
                    .await,
            );

            if departure.remaining < MIN_PLAYERS_FOR_ROUND {
                info!("Room {} is waiting for players", departure.code);
                continue;
            }

            let engine = Arc::clone(&self.ctx.engine);
            let start = self
                .ctx
                .registry
                .with_room(&departure.code, |room| engine.start_if_ready(room))
                .await
                .flatten();
            if let Some(start) = start {
                pending.extend(dispatcher.deliver(&start.code, start.notifications()).await);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::RoundState;
    use crate::words::WordList;
    use tokio::sync::mpsc;

    struct Player {
        session: SessionHandler,
        rx: mpsc::Receiver<Message>,
    }

    impl Player {
        fn new(ctx: &SessionContext) -> Self {
            let (connection, rx) = Connection::channel(32);
            Self {
                session: SessionHandler::new(ctx.clone(), connection),
                rx,
            }
        }

        fn id(&self) -> crate::connection::ConnectionId {
            self.session.connection().id()
        }

        fn drain(&mut self) -> Vec<Message> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }

        fn kinds(&mut self) -> Vec<MessageType> {
            self.drain().into_iter().map(|m| m.kind).collect()
        }
    }

    fn context() -> SessionContext {
        SessionContext::new(
            Arc::new(RoomRegistry::new()),
            TurnEngine::new(WordList::new(["banana"])),
        )
    }

    async fn pair(ctx: &SessionContext) -> (String, Player, Player) {
        let mut a = Player::new(ctx);
        let mut b = Player::new(ctx);
        a.session.handle_message(Message::create_room()).await;
        let code = a.session.room_code().unwrap().to_string();
        b.session.handle_message(Message::join_room(code.clone())).await;
        (code, a, b)
    }

    async fn drawer_of(ctx: &SessionContext, code: &str) -> Option<crate::connection::ConnectionId> {
        ctx.registry
            .with_room(code, |room| room.current_drawer())
            .await
            .flatten()
    }

    #[tokio::test]
    async fn test_create_room_replies_with_code() {
        let ctx = context();
        let mut a = Player::new(&ctx);
        a.session.handle_message(Message::create_room()).await;

        let replies = a.drain();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].kind, MessageType::RoomCreated);
        assert_eq!(replies[0].room_code.as_deref(), a.session.room_code());

        let code = a.session.room_code().unwrap().to_string();
        assert_eq!(ctx.registry.room_of(a.id()).await, Some(code));
    }

    #[tokio::test]
    async fn test_nickname_before_and_after_join() {
        let ctx = context();
        let mut a = Player::new(&ctx);
        assert_eq!(a.session.nickname(), DEFAULT_NICKNAME);

        a.session.handle_message(Message::set_nickname("alice")).await;
        a.session.handle_message(Message::create_room()).await;
        let code = a.session.room_code().unwrap().to_string();
        let stored = ctx
            .registry
            .with_room(&code, |room| room.nickname_of(a.id()).map(str::to_string))
            .await
            .flatten();
        assert_eq!(stored.as_deref(), Some("alice"));

        a.session.handle_message(Message::set_nickname("  ")).await;
        assert_eq!(a.session.nickname(), "alice");

        a.session.handle_message(Message::set_nickname("alicia")).await;
        let stored = ctx
            .registry
            .with_room(&code, |room| room.nickname_of(a.id()).map(str::to_string))
            .await
            .flatten();
        assert_eq!(stored.as_deref(), Some("alicia"));
    }

    #[tokio::test]
    async fn test_join_unknown_room_replies_error() {
        let ctx = context();
        let mut a = Player::new(&ctx);
        a.session.handle_message(Message::join_room("nope")).await;

        let replies = a.drain();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].kind, MessageType::Error);
        assert_eq!(replies[0].message.as_deref(), Some("Room not found"));
        assert!(a.session.room_code().is_none());
        assert_eq!(ctx.registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_second_player_starts_round() {
        let ctx = context();
        let (code, mut a, mut b) = pair(&ctx).await;

        let drawer = drawer_of(&ctx, &code).await.unwrap();
        assert!(drawer == a.id() || drawer == b.id());

        let a_kinds = a.kinds();
        let b_kinds = b.kinds();
        assert_eq!(b_kinds[0], MessageType::RoomJoined);

        let (drawer_kinds, guesser_kinds) = if drawer == a.id() {
            (a_kinds, b_kinds)
        } else {
            (b_kinds, a_kinds)
        };
        assert!(drawer_kinds.contains(&MessageType::YourWord));
        assert!(!drawer_kinds.contains(&MessageType::StartGuessing));
        assert!(guesser_kinds.contains(&MessageType::StartGuessing));
        assert!(!guesser_kinds.contains(&MessageType::YourWord));
    }

    #[tokio::test]
    async fn test_chat_is_stamped_with_nickname() {
        let ctx = context();
        let (_code, mut a, mut b) = pair(&ctx).await;
        a.session.handle_message(Message::set_nickname("alice")).await;
        a.drain();
        b.drain();

        a.session.handle_message(Message::chat("hello")).await;

        for player in [&mut a, &mut b] {
            let msgs = player.drain();
            assert_eq!(msgs.len(), 1);
            assert_eq!(msgs[0], Message::chat_from("alice", "hello"));
        }
    }

    #[tokio::test]
    async fn test_stroke_from_non_drawer_is_dropped() {
        let ctx = context();
        let (code, mut a, mut b) = pair(&ctx).await;
        let drawer = drawer_of(&ctx, &code).await.unwrap();
        a.drain();
        b.drain();

        let (drawer_player, guesser) = if drawer == a.id() {
            (&mut a, &mut b)
        } else {
            (&mut b, &mut a)
        };

        guesser
            .session
            .handle_message(Message::stroke((1, 2), (3, 4)))
            .await;
        assert!(drawer_player.drain().is_empty());
        assert!(guesser.drain().is_empty());

        drawer_player
            .session
            .handle_message(Message::stroke((1, 2), (3, 4)))
            .await;
        assert!(drawer_player.drain().is_empty());
        let relayed = guesser.drain();
        assert_eq!(relayed, vec![Message::stroke((1, 2), (3, 4))]);
    }

    #[tokio::test]
    async fn test_correct_guess_sequence() {
        let ctx = context();
        let (code, mut a, mut b) = pair(&ctx).await;
        let drawer = drawer_of(&ctx, &code).await.unwrap();
        a.drain();
        b.drain();

        let (drawer_player, guesser) = if drawer == a.id() {
            (&mut a, &mut b)
        } else {
            (&mut b, &mut a)
        };

        guesser.session.handle_message(Message::guess("banana")).await;

        assert_eq!(
            guesser.kinds(),
            vec![
                MessageType::GuessCorrect,
                MessageType::YouWon,
                MessageType::ClearCanvas,
                MessageType::YourWord,
            ]
        );
        assert_eq!(
            drawer_player.kinds(),
            vec![
                MessageType::GuessCorrect,
                MessageType::ClearCanvas,
                MessageType::StartGuessing,
            ]
        );
        assert_eq!(drawer_of(&ctx, &code).await, Some(guesser.id()));
    }

    #[tokio::test]
    async fn test_wrong_guess_is_chat() {
        let ctx = context();
        let (code, mut a, mut b) = pair(&ctx).await;
        let drawer = drawer_of(&ctx, &code).await.unwrap();
        b.session.handle_message(Message::set_nickname("bob")).await;
        a.drain();
        b.drain();

        b.session.handle_message(Message::guess("cherry")).await;

        assert_eq!(a.drain(), vec![Message::chat_from("bob", "cherry")]);
        assert_eq!(b.drain(), vec![Message::chat_from("bob", "cherry")]);
        assert_eq!(drawer_of(&ctx, &code).await, Some(drawer));
    }

    #[tokio::test]
    async fn test_drawer_cannot_win_or_leak() {
        let ctx = context();
        let (code, mut a, mut b) = pair(&ctx).await;
        let drawer = drawer_of(&ctx, &code).await.unwrap();
        a.drain();
        b.drain();

        let drawer_player = if drawer == a.id() { &mut a } else { &mut b };
        drawer_player
            .session
            .handle_message(Message::guess("banana"))
            .await;

        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());
        assert_eq!(drawer_of(&ctx, &code).await, Some(drawer));
    }

    #[tokio::test]
    async fn test_messages_outside_room_are_ignored() {
        let ctx = context();
        let mut a = Player::new(&ctx);

        a.session.handle_message(Message::chat("hi")).await;
        a.session.handle_message(Message::guess("banana")).await;
        a.session.handle_message(Message::stroke((0, 0), (1, 1))).await;
        a.session.handle_message(Message::new(MessageType::Unknown)).await;

        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn test_drawer_leaving_restarts_round() {
        let ctx = context();
        let (code, mut a, mut b) = pair(&ctx).await;
        let mut c = Player::new(&ctx);
        c.session.handle_message(Message::join_room(code.clone())).await;

        // Make `a` the drawer so the fallback target is predictable
        let a_id = a.id();
        let engine = Arc::clone(&ctx.engine);
        ctx.registry
            .with_room(&code, |room| engine.begin_round(room, Some(a_id)))
            .await;
        a.drain();
        b.drain();
        c.drain();

        a.session.disconnect().await;

        // `a` was first in join order and is gone, so the new first draws
        assert_eq!(drawer_of(&ctx, &code).await, Some(b.id()));
        assert_eq!(b.kinds(), vec![MessageType::ClearCanvas, MessageType::YourWord]);
        assert_eq!(
            c.kinds(),
            vec![MessageType::ClearCanvas, MessageType::StartGuessing]
        );
        assert!(a.session.connection().is_closed());
    }

    #[tokio::test]
    async fn test_room_goes_idle_below_two_players() {
        let ctx = context();
        let (code, mut a, mut b) = pair(&ctx).await;
        a.drain();
        b.drain();

        b.session.disconnect().await;

        let state = ctx.registry.with_room(&code, |room| room.state()).await;
        assert_eq!(state, Some(RoundState::Idle));
        assert_eq!(a.kinds(), vec![MessageType::ClearCanvas]);

        // A newcomer brings the room back to two players
        let mut c = Player::new(&ctx);
        c.session.handle_message(Message::join_room(code.clone())).await;
        assert!(drawer_of(&ctx, &code).await.is_some());
        let kinds = c.kinds();
        assert!(kinds.contains(&MessageType::YourWord) || kinds.contains(&MessageType::StartGuessing));
    }

    #[tokio::test]
    async fn test_create_room_reports_exhausted_codes() {
        let ctx = SessionContext::new(
            Arc::new(RoomRegistry::with_code_generator(|| "0001".to_string())),
            TurnEngine::new(WordList::new(["banana"])),
        );
        let mut a = Player::new(&ctx);
        let mut b = Player::new(&ctx);

        a.session.handle_message(Message::create_room()).await;
        assert_eq!(a.drain(), vec![Message::room_created("0001")]);

        b.session.handle_message(Message::create_room()).await;
        let replies = b.drain();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].kind, MessageType::Error);
        assert!(b.session.room_code().is_none());
        assert_eq!(ctx.registry.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_evicted_session_cannot_chat_or_guess() {
        let ctx = context();
        let (code, mut a, b) = pair(&ctx).await;
        let Player { session: mut evicted, rx } = b;
        drop(rx);
        a.drain();

        // Delivery to the dropped receiver fails and evicts it
        a.session.handle_message(Message::chat("still here?")).await;
        assert_eq!(
            ctx.registry.with_room(&code, |room| room.contains(evicted.connection().id())).await,
            Some(false)
        );
        a.drain();

        evicted.handle_message(Message::chat("from evicted")).await;
        assert!(evicted.room_code().is_none());
        assert!(a.drain().is_empty());

        evicted.handle_message(Message::guess("banana")).await;
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn test_run_removes_connection_when_stream_ends() {
        let ctx = context();
        let (connection, _rx) = Connection::channel(8);
        let id = connection.id();
        let session = SessionHandler::new(ctx.clone(), connection.clone());

        let inbound = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Message::set_nickname("zed")),
            Ok(Message::create_room()),
        ]);
        session.run(inbound).await;

        assert!(ctx.registry.room_of(id).await.is_none());
        assert_eq!(ctx.registry.room_count().await, 1);
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn test_run_stops_when_connection_closed() {
        let ctx = context();
        let (connection, _rx) = Connection::channel(8);
        let session = SessionHandler::new(ctx.clone(), connection.clone());

        connection.close();
        // Never yields, so only the close signal can end the loop
        session
            .run(futures_util::stream::pending::<Result<Message, std::io::Error>>())
            .await;
        assert_eq!(ctx.registry.member_count().await, 0);
    }
}

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use shared::{Message, MessageType, DEFAULT_PORT};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Terminal client for trying out the room server by hand
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// WebSocket URL of the server
    #[arg(short, long, default_value_t = format!("ws://127.0.0.1:{}", DEFAULT_PORT))]
    url: String,

    /// Nickname to play under
    #[arg(short, long, default_value = "tester")]
    nickname: String,

    /// Room code to join; a new room is created when omitted
    #[arg(short, long)]
    room: Option<String>,
}

fn print_message(message: &Message) {
    let text = message.message.as_deref().unwrap_or("");
    match message.kind {
        MessageType::Message => {
            let from = message.nickname.as_deref().unwrap_or("?");
            println!("<{}> {}", from, text);
        }
        MessageType::RoomCreated | MessageType::RoomJoined => {
            println!(
                "[{:?}] room {}",
                message.kind,
                message.room_code.as_deref().unwrap_or("?")
            );
        }
        MessageType::Draw => println!(
            "[stroke] ({:?},{:?}) -> ({:?},{:?})",
            message.prev_x, message.prev_y, message.x, message.y
        ),
        other => println!("[{:?}] {}", other, text),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (ws, _) = connect_async(args.url.as_str()).await?;
    println!("Connected to {}", args.url);
    let (mut sink, mut stream) = ws.split();

    let mut greeting = vec![Message::set_nickname(args.nickname.clone())];
    greeting.push(match &args.room {
        Some(code) => Message::join_room(code.clone()),
        None => Message::create_room(),
    });
    for message in greeting {
        sink.send(WsMessage::text(message.to_json()?)).await?;
    }

    let reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => match Message::from_json(&text) {
                    Ok(message) => print_message(&message),
                    Err(e) => println!("Unreadable message: {}", e),
                },
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    println!("Connection error: {}", e);
                    break;
                }
            }
        }
        println!("Server closed the connection");
    });

    println!("Type to chat, '/guess <word>' to guess, Ctrl+D to quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let message = match line.strip_prefix("/guess ") {
            Some(word) => Message::guess(word.trim()),
            None => Message::chat(line),
        };
        if sink.send(WsMessage::text(message.to_json()?)).await.is_err() {
            break;
        }
    }

    let _ = sink.close().await;
    let _ = reader.await;
    println!("Test client finished");
    Ok(())
}

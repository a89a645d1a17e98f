//! Banter console client.
//!
//! # Usage
//!
//! ```bash
//! banter-console --server 127.0.0.1:7667 --name alice
//! ```
//!
//! Stdin lines are sent as chat text. While the server is asking for a
//! password, the next line answers the challenge (`/abort` gives up).
//! `/quit` leaves. Observer notices from the session are rendered as
//! plain lines - no color, no cursor games.

use banter_client::{
    ClientError, ClientNotice, SessionFailure,
    transport::{ClientCommand, connect},
};
use banter_proto::{PresenceReason, Role};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Banter chat protocol client
#[derive(Parser, Debug)]
#[command(name = "banter-console")]
#[command(about = "Banter chat protocol console client")]
#[command(version)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:7667")]
    server: String,

    /// Display name to join with
    #[arg(short, long)]
    name: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let mut client = match connect(&args.server, &args.name).await {
        Ok(client) => client,
        Err(ClientError::Connect(reason)) => {
            eprintln!("unable to connect to {}: {reason}", args.server);
            return Ok(());
        },
        Err(e) => return Err(e.into()),
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut awaiting_password = false;

    loop {
        tokio::select! {
            notice = client.notices.recv() => match notice {
                Some(notice) => {
                    if !render_notice(notice, &mut awaiting_password) {
                        break;
                    }
                },
                None => break,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let command = parse_line(line.trim(), &mut awaiting_password);
                    let quitting = matches!(&command, Some(ClientCommand::Quit));
                    if let Some(command) = command {
                        if client.commands.send(command).await.is_err() || quitting {
                            break;
                        }
                    }
                },
                Ok(None) | Err(_) => {
                    let _ = client.commands.send(ClientCommand::Quit).await;
                    break;
                },
            },
        }
    }

    Ok(())
}

/// Turn a stdin line into a session command.
fn parse_line(line: &str, awaiting_password: &mut bool) -> Option<ClientCommand> {
    if line == "/quit" {
        return Some(ClientCommand::Quit);
    }

    if *awaiting_password {
        *awaiting_password = false;
        if line == "/abort" {
            return Some(ClientCommand::SubmitPassword(None));
        }
        return Some(ClientCommand::SubmitPassword(Some(line.to_string())));
    }

    if line.is_empty() {
        return None;
    }

    Some(ClientCommand::SendText(line.to_string()))
}

/// Render one observer notice. Returns `false` once the session is over.
fn render_notice(notice: ClientNotice, awaiting_password: &mut bool) -> bool {
    match notice {
        ClientNotice::Connected => {
            println!("connected");
        },
        ClientNotice::PasswordRequired { retry } => {
            *awaiting_password = true;
            if retry {
                println!("wrong password, try again (/abort to give up):");
            } else {
                println!("password required:");
            }
        },
        ClientNotice::Text { role, name, body } => {
            println!("{}: {body}", tag_name(&name, role));
        },
        ClientNotice::ServerNotice { body } => {
            println!("[SERVER]: {body}");
        },
        ClientNotice::PeerJoined { name } => {
            println!("{name} joined");
        },
        ClientNotice::PeerLeft { name, reason } => match reason {
            PresenceReason::Kicked => println!("{name} has been kicked"),
            _ => println!("{name} disconnected"),
        },
        ClientNotice::Promoted { role, promoted } => {
            if promoted {
                println!("you have been promoted to {role}");
            } else {
                println!("you have been demoted to {role}");
            }
        },
        ClientNotice::PeerPromotionChanged { role, name, promoted } => {
            if promoted {
                println!("{name} has been promoted to {role}");
            } else {
                println!("{name} has been demoted to {role}");
            }
        },
        ClientNotice::Kicked => {
            println!("you have been kicked from the server");
            return false;
        },
        ClientNotice::ServerShutdown => {
            println!("server is shutting down");
            return false;
        },
        ClientNotice::Disconnected => {
            println!("lost connection to the server");
            return false;
        },
        ClientNotice::SessionFailed { failure } => {
            match failure {
                SessionFailure::UnableToConnect => println!("unable to connect"),
                SessionFailure::ServerIsFull => println!("server is full"),
                SessionFailure::Blocked => println!("you are blocked on this server"),
                SessionFailure::ProtocolViolation => println!("server sent garbage, giving up"),
            }
            return false;
        },
        ClientNotice::TransportError { context } => {
            eprintln!("transport error: {context}");
        },
    }

    true
}

/// Append the admin tag the way the chat log renders names.
fn tag_name(name: &str, role: Role) -> String {
    if role == Role::Administrator { format!("{name}[ADMIN]") } else { name.to_string() }
}

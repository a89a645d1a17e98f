//! Banter server binary.
//!
//! # Usage
//!
//! ```bash
//! # Open server on the default port
//! banter-server
//!
//! # Password-gated, at most 16 active sessions
//! banter-server --port 7667 --password hunter2 --max-clients 16
//! ```
//!
//! Operator commands are read line by line from stdin (`help` lists
//! them); each one is a plain call into the [`ServerHandle`] API.

use std::sync::Arc;

use banter_proto::Role;
use banter_server::{
    DriverConfig, Server, ServerHandle, ServerNotification, ServerObserver, ServerRuntimeConfig,
};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Banter chat protocol server
#[derive(Parser, Debug)]
#[command(name = "banter-server")]
#[command(about = "Banter chat protocol server")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7667")]
    port: u16,

    /// Admission password (omit or leave empty for open access)
    #[arg(long)]
    password: Option<String>,

    /// Maximum concurrent active sessions (omit for unbounded)
    #[arg(long)]
    max_clients: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Console front-end: renders observer events as plain lines.
struct ConsoleObserver;

impl ServerObserver for ConsoleObserver {
    fn handle(&self, notification: ServerNotification) {
        match notification {
            ServerNotification::ConnectionAccepted { addr } => {
                tracing::debug!("{addr} connected, handshake pending");
            },
            ServerNotification::ConnectionRejected { addr } => {
                println!("{addr} rejected: server is full");
            },
            ServerNotification::ConnectionBlocked { addr } => {
                println!("{addr} blocked");
            },
            ServerNotification::SessionActive { name, addr } => {
                println!("{name} ({addr}) connected");
            },
            ServerNotification::SessionInactive { name, .. } => {
                println!("{name} disconnected");
            },
            ServerNotification::TextReceived { role, name, body } => {
                println!("{}: {body}", tag_name(&name, role));
            },
            ServerNotification::SessionKicked { name, .. } => {
                println!("{name} has been kicked");
            },
            ServerNotification::SessionPromoted { name, role, promoted } => {
                if promoted {
                    println!("{name} has been promoted to {role}");
                } else {
                    println!("{name} has been demoted to {role}");
                }
            },
            ServerNotification::TransportError { addr, context } => {
                eprintln!("transport error for {addr}: {context}");
            },
            ServerNotification::ShuttingDown => {
                println!("server shutting down");
            },
        }
    }
}

/// Append the admin tag the way the chat log renders names.
fn tag_name(name: &str, role: Role) -> String {
    if role == Role::Administrator { format!("{name}[ADMIN]") } else { name.to_string() }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = ServerRuntimeConfig {
        bind_address: format!("0.0.0.0:{}", args.port),
        driver: DriverConfig {
            password: args.password.filter(|p| !p.is_empty()),
            max_clients: args.max_clients,
        },
    };

    let server = Server::bind(config, Arc::new(ConsoleObserver)).await?;

    println!("listening on {}", server.local_addr()?);
    print_info(&server.handle().config().await);
    println!("type help to list operator commands");

    let handle = server.handle();
    tokio::spawn(operator_console(handle));

    server.run().await?;

    Ok(())
}

/// Read operator commands from stdin until `exit` or EOF.
async fn operator_console(handle: ServerHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !run_command(&handle, line.trim()).await {
                    break;
                }
            },
            Ok(None) => {
                // stdin closed: keep serving, operator input is optional
                break;
            },
            Err(e) => {
                tracing::error!("stdin error: {e}");
                break;
            },
        }
    }
}

/// Execute one operator command. Returns `false` once the server should
/// stop.
async fn run_command(handle: &ServerHandle, line: &str) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match command {
        "" => {},
        "help" => print_help(),
        "info" => print_info(&handle.config().await),
        "clients" => print_clients(handle).await,
        "message" => handle.broadcast_text(rest).await,
        "kick" => {
            if handle.kick(rest, true).await {
                println!("client has been kicked and blocked");
            } else {
                println!("no active client matches '{rest}'");
            }
        },
        "block" => {
            if handle.block(rest).await {
                println!("{rest} has been blocked");
            } else {
                println!("{rest} is already blocked");
            }
        },
        "unblock" => {
            if handle.unblock(rest).await {
                println!("{rest} has been unblocked");
            } else {
                println!("{rest} is not blocked");
            }
        },
        "promote" => match parse_promotion(rest) {
            Some((identifier, role)) => {
                if handle.promote(identifier, role).await {
                    println!("{identifier} is now {role}");
                } else {
                    println!("no active client matches '{identifier}'");
                }
            },
            None => println!("usage: promote <ip|name> <member|administrator>"),
        },
        "set-password" => {
            let password = if rest.is_empty() { None } else { Some(rest.to_string()) };
            handle.set_password(password).await;
            println!("password updated");
        },
        "set-max" => {
            if rest.is_empty() {
                handle.set_max_clients(None).await;
                println!("max clients set to unbounded");
            } else {
                match rest.parse::<u32>() {
                    Ok(max) => {
                        handle.set_max_clients(Some(max)).await;
                        println!("max clients set to {max}");
                    },
                    Err(e) => println!("invalid number: {e}"),
                }
            }
        },
        "exit" => {
            handle.shutdown().await;
            return false;
        },
        _ => println!("unknown command, type help to see available commands"),
    }

    true
}

/// Parse `<identifier> <role>` for the promote command.
fn parse_promotion(rest: &str) -> Option<(&str, Role)> {
    let (identifier, role) = rest.rsplit_once(' ')?;
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return None;
    }

    let role = match role.trim() {
        "member" | "0" => Role::Member,
        "administrator" | "admin" | "1" => Role::Administrator,
        _ => return None,
    };

    Some((identifier, role))
}

fn print_help() {
    println!("    clients - list connected clients");
    println!("    message <text> - send a notice to all connected clients");
    println!("    kick <ip|name> - kick and block a client");
    println!("    block <ip> - block an address");
    println!("    unblock <ip> - unblock an address");
    println!("    promote <ip|name> <member|administrator> - change a client's role");
    println!("    set-password [password] - change the password (empty disables it)");
    println!("    set-max [n] - change the session limit (empty means unbounded)");
    println!("    info - view server configuration");
    println!("    exit - shut the server down");
}

fn print_info(config: &DriverConfig) {
    match &config.password {
        Some(password) => println!("password: {password}"),
        None => println!("password: (none)"),
    }
    match config.max_clients {
        Some(max) => println!("maximum clients: {max}"),
        None => println!("maximum clients: unbounded"),
    }
}

async fn print_clients(handle: &ServerHandle) {
    let sessions = handle.list_sessions().await;
    let connected = sessions.iter().filter(|s| s.active).count();
    let waiting = sessions.len() - connected;

    println!("connected clients: {connected}");
    for session in sessions.iter().filter(|s| s.active) {
        println!("{} [{}] - {}", session.name, session.role, session.addr);
    }

    println!("waiting clients: {waiting}");
    for session in sessions.iter().filter(|s| !s.active) {
        println!("{}", session.addr);
    }
}

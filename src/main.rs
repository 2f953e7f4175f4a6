//! CastNet - LAN file exchange and multicast chat rooms
//!
//! One binary, two roles: a server hosting the file-sharing service, the
//! chat-room directory, and the discovery responder; and an interactive
//! client console driving them.

mod chat;
mod config;
mod directory;
mod discovery;
mod files;
mod network;
mod protocol;
mod transport;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chat::ChatMembership;
use config::Config;
use directory::{DirectoryClient, DirectoryServer, RoomDirectory};
use discovery::Responder;
use files::FileStore;
use network::{FileClient, FileServer};

/// CastNet - LAN file exchange and multicast chat rooms
#[derive(Parser)]
#[command(name = "castnet")]
#[command(author = "CastNet Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Share files and chat rooms on a local network", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server (file sharing + room directory + discovery responder)
    Serve {
        /// Directory to share
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Service name to announce
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Run the interactive client console
    Client {
        /// Server address to connect the directory console to immediately
        #[arg(short, long)]
        server: Option<String>,
    },

    /// Broadcast a discovery probe and print the first responder
    Discover {
        /// How long to wait for a reply (seconds)
        #[arg(short, long, default_value_t = 5)]
        timeout: u64,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    match cli.command {
        Commands::Serve { root, name } => {
            run_serve(config, root, name).await?;
        }
        Commands::Client { server } => {
            run_client(config, server).await?;
        }
        Commands::Discover { timeout } => {
            run_discover(Duration::from_secs(timeout)).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config();
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

/// Run all three server-side services until Ctrl+C.
async fn run_serve(
    config: Config,
    root: Option<PathBuf>,
    name: Option<String>,
) -> anyhow::Result<()> {
    let root = root.unwrap_or(config.files.root.clone());
    std::fs::create_dir_all(&root)?;

    let service_name = name.unwrap_or(config.general.service_name.clone());
    let bind_ip: IpAddr = config
        .network
        .bind_address
        .as_deref()
        .unwrap_or("0.0.0.0")
        .parse()?;

    let mut responder = Responder::new(service_name.clone());
    responder
        .start(SocketAddr::new(bind_ip, config.network.discovery_port))
        .await?;

    let store = FileStore::new(&root);
    let mut file_server = FileServer::new(store)
        .with_read_timeout(Duration::from_millis(config.network.read_timeout_ms));
    file_server
        .start(SocketAddr::new(bind_ip, config.network.file_port))
        .await?;

    let mut directory_server = DirectoryServer::new(RoomDirectory::new());
    directory_server
        .start(SocketAddr::new(bind_ip, config.network.directory_port))
        .await?;

    println!("========================================");
    println!("  CastNet Server Running");
    println!("========================================");
    println!("  Service:   {}", service_name);
    println!("  Sharing:   {}", root.display());
    println!("  Discovery: udp/{}", config.network.discovery_port);
    println!("  Files:     tcp/{}", config.network.file_port);
    println!("  Directory: tcp/{}", config.network.directory_port);
    println!("========================================");
    println!("Press Ctrl+C to stop.\n");

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");

    directory_server.stop().await?;
    file_server.stop().await?;
    responder.stop().await?;
    tracing::info!("Server stopped");

    Ok(())
}

/// Broadcast one discovery probe.
async fn run_discover(wait: Duration) -> anyhow::Result<()> {
    println!("Broadcasting discovery probe ({:?} wait)...", wait);
    match discovery::discover(discovery::broadcast_target(), wait).await {
        Ok(name) => println!("Found: {}", name),
        Err(e) => println!("{}", e),
    }
    Ok(())
}

/// Console state for the interactive client.
struct Console {
    config: Config,
    display_name: String,
    /// Address of the server last connected to; file ops reuse its IP.
    server_ip: Option<IpAddr>,
    directory: Option<DirectoryClient>,
    chat: Option<ChatSession>,
}

struct ChatSession {
    membership: ChatMembership,
    room: String,
    printer: tokio::task::JoinHandle<()>,
}

/// Run the interactive client console.
///
/// Console commands (thin glue around the core APIs):
///   connect <ip> <port>      open a directory control connection
///   getdir / makeroom / deleteroom / getinfo / bye   directory requests
///   name <displayname>       set the chat display name
///   chat <room>              look the room up and join its multicast group
///   exit_chat                leave the current room
///   list / get <f> / put <f> / scan   file-service operations
///   exit                     quit the console
async fn run_client(config: Config, server: Option<String>) -> anyhow::Result<()> {
    let mut console = Console {
        display_name: config.chat.display_name.clone(),
        config,
        server_ip: None,
        directory: None,
        chat: None,
    };

    if let Some(server) = server {
        let port = console.config.network.directory_port;
        let addr = network::resolve_host(&server, port).await?;
        console.connect(addr).await;
    }

    println!("CastNet console. Type 'exit' to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print_prompt(&console);
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "exit" {
            break;
        }
        console.handle_line(&line).await;
    }

    if let Some(session) = console.chat.take() {
        session.printer.abort();
        session.membership.leave().await;
    }
    Ok(())
}

fn print_prompt(console: &Console) {
    use std::io::Write;
    if let Some(session) = &console.chat {
        print!("({}'s chatroom) > ", session.room);
    } else if console.directory.is_some() {
        print!("Connected > ");
    } else {
        print!("Enter Command > ");
    }
    let _ = std::io::stdout().flush();
}

impl Console {
    async fn handle_line(&mut self, line: &str) {
        // In chat mode everything except exit_chat is a message to the room.
        if self.chat.is_some() {
            if line == "exit_chat" {
                if let Some(session) = self.chat.take() {
                    session.printer.abort();
                    session.membership.leave().await;
                    println!("Exited chat mode.");
                }
            } else if let Some(session) = &self.chat {
                if let Err(e) = session.membership.send(&self.display_name, line).await {
                    println!("Error sending chat message: {}", e);
                }
            }
            return;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["connect", ip, port] => {
                match (ip.parse::<IpAddr>(), port.parse::<u16>()) {
                    (Ok(ip), Ok(port)) => self.connect(SocketAddr::new(ip, port)).await,
                    _ => println!("Usage: connect <ip> <port>"),
                }
            }
            ["name", rest @ ..] if !rest.is_empty() => {
                self.display_name = rest.join(" ");
                println!("Display name set to {}", self.display_name);
            }
            ["chat", room] => self.start_chat(room).await,
            ["list"] => self.file_list().await,
            ["get", file] => self.file_get(file).await,
            ["put", file] => self.file_put(file).await,
            ["scan"] => {
                let wait = Duration::from_millis(self.config.network.discovery_wait_ms);
                match discovery::discover(discovery::broadcast_target(), wait).await {
                    Ok(name) => println!("Found: {}", name),
                    Err(e) => println!("{}", e),
                }
            }
            // Everything else goes to the directory as a text request.
            _ => self.directory_request(line).await,
        }
    }

    async fn connect(&mut self, addr: SocketAddr) {
        match DirectoryClient::connect(addr).await {
            Ok(client) => {
                self.directory = Some(client);
                self.server_ip = Some(addr.ip());
                println!("Connected to {}", addr);
            }
            Err(e) => println!("Cannot connect to {}: {}", addr, e),
        }
    }

    async fn directory_request(&mut self, line: &str) {
        let Some(client) = self.directory.as_mut() else {
            println!("Not connected. Use: connect <ip> <port>");
            return;
        };
        match client.request(line).await {
            Ok(reply) => {
                println!("{}", reply);
                if line.trim() == "bye" {
                    self.directory = None;
                }
            }
            Err(e) => {
                println!("Directory request failed: {}", e);
                self.directory = None;
            }
        }
    }

    /// Look up the room's coordinates via the directory, then join its group.
    async fn start_chat(&mut self, room: &str) {
        let Some(client) = self.directory.as_mut() else {
            println!("Not connected. Use: connect <ip> <port>");
            return;
        };

        let reply = match client.request(&format!("getinfo {}", room)).await {
            Ok(reply) => reply,
            Err(e) => {
                println!("Directory request failed: {}", e);
                self.directory = None;
                return;
            }
        };

        let coords: Vec<&str> = reply.split_whitespace().collect();
        let (group, port) = match coords.as_slice() {
            [addr, port] => match (addr.parse::<Ipv4Addr>(), port.parse::<u16>()) {
                (Ok(a), Ok(p)) => (a, p),
                _ => {
                    println!("{}", reply);
                    return;
                }
            },
            _ => {
                println!("{}", reply);
                return;
            }
        };

        match ChatMembership::join(group, port).await {
            Ok((membership, mut rx)) => {
                println!(
                    "Entered chat mode on {}:{}. Type exit_chat to leave.",
                    membership.group(),
                    membership.port()
                );
                let printer = tokio::spawn(async move {
                    while let Some(msg) = rx.recv().await {
                        println!("\n {}", msg.text);
                    }
                });
                self.chat = Some(ChatSession {
                    membership,
                    room: room.to_string(),
                    printer,
                });
            }
            Err(e) => println!("Cannot join {}: {}", room, e),
        }
    }

    fn file_server_addr(&self) -> Option<SocketAddr> {
        self.server_ip
            .map(|ip| SocketAddr::new(ip, self.config.network.file_port))
    }

    fn file_read_timeout(&self) -> Duration {
        Duration::from_millis(self.config.network.read_timeout_ms)
    }

    async fn file_list(&self) {
        let Some(addr) = self.file_server_addr() else {
            println!("Not connected. Use: connect <ip> <port>");
            return;
        };
        match FileClient::connect(addr).await {
            Ok(client) => {
                let mut client = client.with_read_timeout(self.file_read_timeout());
                match client.list().await {
                    Ok(listing) => println!("{}", listing),
                    Err(e) => println!("LIST failed: {}", e),
                }
            }
            Err(e) => println!("Cannot reach file service: {}", e),
        }
    }

    async fn file_get(&self, name: &str) {
        let Some(addr) = self.file_server_addr() else {
            println!("Not connected. Use: connect <ip> <port>");
            return;
        };
        let client = match FileClient::connect(addr).await {
            Ok(c) => c.with_read_timeout(self.file_read_timeout()),
            Err(e) => {
                println!("Cannot reach file service: {}", e);
                return;
            }
        };
        match client.get(name).await {
            Ok(data) => {
                let local = PathBuf::from(name)
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("download"));
                match tokio::fs::write(&local, &data).await {
                    Ok(()) => println!("Received {} bytes into {}", data.len(), local.display()),
                    Err(e) => println!("Cannot save {}: {}", local.display(), e),
                }
            }
            Err(e) => println!("GET failed (file may not exist): {}", e),
        }
    }

    async fn file_put(&self, name: &str) {
        let Some(addr) = self.file_server_addr() else {
            println!("Not connected. Use: connect <ip> <port>");
            return;
        };
        let data = match tokio::fs::read(name).await {
            Ok(data) => data,
            Err(e) => {
                println!("Cannot read {}: {}", name, e);
                return;
            }
        };
        let client = match FileClient::connect(addr).await {
            Ok(c) => c.with_read_timeout(self.file_read_timeout()),
            Err(e) => {
                println!("Cannot reach file service: {}", e);
                return;
            }
        };
        match client.put(name, &data).await {
            Ok(ack) => println!("{}", ack),
            Err(e) => println!("PUT failed: {}", e),
        }
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bridge_proto::Envelope;
use bytes::Bytes;
use frame_bus::{Bus, LocalBus, TOPIC_HOST_INBOUND, TOPIC_SIDEBAR_INBOUND};
use serde_json::Value;
use sidebar_bridge::account;
use sidebar_bridge::session::{FileStorage, KeyValueStorage};
use sidebar_bridge::transport::{BusChannel, DirectTransport, ProxyTransport};
use sidebar_bridge::{
    fill_profile, ApiClient, ApiReply, BridgeConfig, Credentials, HostPublisher,
    ScrapeCoordinator, SessionStore, SignupForm, StatusRelay, TransportSelector,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::cli::{Command, JobsCommand, ListenArgs, ProfileCommand};

/// Everything a command needs: the session, the frame bus and an API client
/// that picks its route per call.
pub struct Bridge {
    sessions: Arc<SessionStore>,
    bus: Arc<LocalBus>,
    client: ApiClient<TransportSelector>,
}

impl Bridge {
    pub fn connect(config: &BridgeConfig, storage: Option<PathBuf>) -> Result<Self> {
        let path = match storage.or_else(|| config.storage_path.as_ref().map(PathBuf::from)) {
            Some(path) => path,
            None => FileStorage::default_path()?,
        };
        debug!(storage = %path.display(), api = %config.api_base_url, "opening bridge");
        let storage: Arc<dyn KeyValueStorage> = Arc::new(FileStorage::new(path));
        let sessions = Arc::new(SessionStore::load(storage)?);

        let bus = Arc::new(LocalBus::new());
        let channel = Arc::new(BusChannel::new(bus.clone(), config.bus_reply_timeout()));
        let proxy = ProxyTransport::new(channel, sessions.clone(), &config.api_base_url)
            .with_reply_timeout(config.proxy_reply_timeout());
        let direct = DirectTransport::new(&config.api_base_url, sessions.clone());

        Ok(Self {
            sessions,
            bus,
            client: ApiClient::new(TransportSelector::probing(direct, proxy)),
        })
    }
}

pub async fn run(bridge: Bridge, command: Command) -> Result<()> {
    match command {
        Command::Login(args) => {
            let credentials = Credentials {
                email: args.email,
                password: args.password,
            };
            let session = account::login(&bridge.client, &bridge.sessions, &credentials).await?;
            println!("Signed in as {} <{}>", session.user.name, session.user.email);
        }
        Command::Signup(args) => {
            let form = SignupForm {
                name: args.name,
                email: args.email,
                password: args.password,
            };
            let session = account::signup(&bridge.client, &bridge.sessions, &form).await?;
            println!("Account created for {} <{}>", session.user.name, session.user.email);
        }
        Command::Logout => {
            account::logout(&bridge.sessions)?;
            println!("Signed out");
        }
        Command::Whoami => match bridge.sessions.user() {
            Some(user) => print_json(&serde_json::to_value(user)?)?,
            None => println!("Not signed in"),
        },
        Command::Jobs(command) => {
            require_session(&bridge)?;
            let reply = match command {
                JobsCommand::List { filter } => bridge.client.list_jobs(filter).await,
                JobsCommand::Show { id } => bridge.client.get_job(&id).await,
                JobsCommand::Apply { id } => bridge.client.apply_job(&id).await,
                JobsCommand::Delete { id } => bridge.client.delete_job(&id).await,
                JobsCommand::Status { id, status } => {
                    bridge.client.update_job_status(&id, status).await
                }
                JobsCommand::Extract { file } => {
                    bridge.client.extract_job(read_json(&file)?).await
                }
            };
            print_reply(&reply)?;
        }
        Command::Profile(command) => {
            require_session(&bridge)?;
            let reply = match command {
                ProfileCommand::Show => bridge.client.get_profile().await,
                ProfileCommand::Update { file } => {
                    bridge.client.update_profile(read_json(&file)?).await
                }
            };
            print_reply(&reply)?;
        }
        Command::CompareResume { file } => {
            require_session(&bridge)?;
            let description = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            print_reply(&bridge.client.compare_resume(&description).await)?;
        }
        Command::Listen(args) => listen(bridge, args).await?,
    }
    Ok(())
}

/// Publishes each stdin line on the sidebar's inbound topic, where the scrape
/// coordinator and the status relay pick it up, and prints every status change.
/// Posts meant for the host page go to stdout as `host:` lines. Returns once
/// stdin closes and any forwarded extraction has settled.
async fn listen(bridge: Bridge, args: ListenArgs) -> Result<()> {
    let Bridge {
        sessions,
        bus,
        client,
    } = bridge;
    let client = Arc::new(client);
    let coordinator = ScrapeCoordinator::new(Arc::clone(&client));
    let relay = StatusRelay::new();
    let scrape_listener = coordinator.spawn(bus.as_ref());
    let status_listener = relay.spawn(bus.as_ref());

    let mut updates = relay.subscribe();
    let status_printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            if let Some(status) = updates.borrow_and_update().clone() {
                println!("status: {}", status.label());
            }
        }
    });

    let mut host_posts = bus.subscribe(TOPIC_HOST_INBOUND);
    let host_printer = tokio::spawn(async move {
        loop {
            match host_posts.recv().await {
                Ok(msg) => println!("host: {}", String::from_utf8_lossy(&msg.payload)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "host output lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let host = HostPublisher::new(Arc::clone(&bus));
    if args.fill {
        let user = sessions
            .user()
            .ok_or_else(|| anyhow!("not signed in; run `jobbyfy login` first"))?;
        let reply = client.get_profile().await;
        if reply.field("profile").is_none() {
            if let Some(message) = reply.message() {
                warn!(reason = message, "profile unavailable; filling from account details");
            }
        }
        host.start_fill(&fill_profile(&user, reply.field("profile")))?;
    }
    if args.scrape {
        host.request_scrape()?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(err) = Envelope::decode(line.as_bytes()) {
            warn!(error = %err, "skipping line that is not a host post");
            continue;
        }
        bus.publish(TOPIC_SIDEBAR_INBOUND, Bytes::copy_from_slice(line.as_bytes()))?;
    }

    // Listeners drain what was already posted; the scrape listener also waits
    // out the extraction it forwarded last.
    bus.close(TOPIC_SIDEBAR_INBOUND);
    scrape_listener.await?;
    status_listener.await?;
    drop(relay);
    status_printer.await?;
    bus.close(TOPIC_HOST_INBOUND);
    host_printer.await?;
    Ok(())
}

fn require_session(bridge: &Bridge) -> Result<()> {
    if bridge.sessions.is_signed_in() {
        Ok(())
    } else {
        Err(anyhow!("not signed in; run `jobbyfy login` first"))
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn print_reply(reply: &ApiReply) -> Result<()> {
    print_json(reply.as_value())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

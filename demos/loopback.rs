use std::time::Duration;

use subauth::{
    init_tracing, AccessRequest, Client, ClientConfig, Outcome, Server, ServerConfig,
    SubscriberStore,
};

const SUBSCRIBERS: &str = "\
111-222-3333 07 1
444-555-6666 02 0
7778889999031
";

#[tokio::main]
async fn main() -> subauth::Result<()> {
    init_tracing();

    // A subscriber file may be given as the first argument
    let store = match std::env::args().nth(1) {
        Some(path) => SubscriberStore::load(&path, subauth::core::MAX_RECORDS)?,
        None => SUBSCRIBERS.parse()?,
    };
    println!("Loaded {} subscribers:", store.len());
    for record in store.iter() {
        println!(
            "- {:010} tech {:02} {}",
            record.number,
            record.tech_type,
            if record.paid { "paid" } else { "not paid" }
        );
    }

    let server_config = ServerConfig {
        bind_addr: "127.0.0.1:0".parse().map_err(|e| subauth::Error::config(format!("{}", e)))?,
        ..ServerConfig::default()
    };
    let mut server = Server::bind(server_config, store).await?;
    let server_addr = server.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            eprintln!("Server stopped: {}", e);
        }
    });

    let client_config = ClientConfig {
        bind_addr: "127.0.0.1:0".parse().map_err(|e| subauth::Error::config(format!("{}", e)))?,
        timeout: Duration::from_millis(500),
        ..ClientConfig::default()
    };
    let mut client = Client::bind(1, client_config).await?;
    println!("\nServer on {}, client on {}\n", server_addr, client.local_addr()?);

    let requests = [
        AccessRequest::new(1_112_223_333, 7),
        AccessRequest::new(4_445_556_666, 2),
        AccessRequest::new(7_778_889_999, 3),
        AccessRequest::new(1_234_567_890, 7),
    ];

    for (seq, request) in requests.into_iter().enumerate() {
        let outcome = client.request_access(server_addr, seq as u8, request).await?;
        let summary = match outcome {
            Outcome::Verdict { verdict, .. } => verdict.to_string(),
            Outcome::Acknowledged { .. } => "acknowledged, no answer".to_string(),
            Outcome::Rejected { code, .. } => format!("rejected: {}", code),
            Outcome::GaveUp { attempts } => format!("no response after {} tries", attempts),
        };
        println!(
            "seq {} subscriber {:010} tech {:02}: {}",
            seq, request.subscriber_number, request.tech_type, summary
        );
    }

    // Replaying the last sequence number is refused
    let replay = client
        .request_access(server_addr, (requests.len() - 1) as u8, requests[0])
        .await?;
    println!("\nReplay of seq {}: {:?}", requests.len() - 1, replay);

    Ok(())
}

use std::time::Duration;

use zabbix_sender::{Item, SenderBuilder};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let sender = SenderBuilder::default()
        .with_host("localhost")
        .with_port(10051)
        .with_timeout(Duration::from_secs(2))
        .with_ns(true)
        .with_max_per_send(2)
        .build()
        .expect("failed to build sender");

    sender
        .add_item(Item::new("app.requests", 1_024))
        .and_then(|s| s.add_item(Item::new("app.latency", 0.25)))
        .and_then(|s| s.add_item(Item::new("app.status", "ok").with_host("web01")))
        .expect("failed to add items");

    // Keep sending until the backlog is drained, or the trapper stops accepting batches.
    while sender.count_items() > 0 {
        match sender.send().await {
            Ok(Some(report)) => println!(
                "sent {} item(s), trapper replied: {}",
                report.items().len(),
                report.acknowledgement().as_value()
            ),
            Ok(None) => break,
            Err(e) => {
                eprintln!("send failed: {e} ({} item(s) left in backlog)", sender.count_items());
                break;
            }
        }
    }
}

//! Three nodes on localhost electing a leader and committing one entry.
//!
//! Run with: cargo run --example local_cluster

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use quorum_lite::config::NodeConfig;
use quorum_lite::runtime::{NodeDriver, NodeHandle};
use quorum_lite::transport::{self, HttpOutbox};

const BASE_PORT: u16 = 7451;

fn node_config(index: usize) -> NodeConfig {
    let id = format!("node-{}", index + 1);
    let mut config = NodeConfig::new(id, format!("127.0.0.1:{}", BASE_PORT + index as u16).parse().unwrap());
    for other in 0..3 {
        if other != index {
            config = config.with_peer(
                format!("node-{}", other + 1),
                format!("127.0.0.1:{}", BASE_PORT + other as u16),
            );
        }
    }
    config
}

async fn find_leader(handles: &[NodeHandle]) -> Option<NodeHandle> {
    for handle in handles {
        if let Ok(status) = handle.status().await {
            if status.role == "leader" {
                return Some(handle.clone());
            }
        }
    }
    None
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("quorum_lite=info,local_cluster=info")
        .init();

    let token = CancellationToken::new();
    let mut handles = Vec::new();

    for index in 0..3 {
        let config = node_config(index);
        let outbox = HttpOutbox::new(config.node_id.clone(), &config.peers);
        let (driver, handle) = NodeDriver::new(&config, Box::new(outbox))?;
        tokio::spawn(driver.run(token.clone()));
        tokio::spawn(transport::serve(
            config.listen_addr,
            handle.clone(),
            token.clone(),
        ));
        handles.push(handle);
    }

    // Let an election play out.
    let leader = loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Some(leader) = find_leader(&handles).await {
            break leader;
        }
    };
    let status = leader.status().await?;
    println!("leader elected: {} at term {}", status.node_id, status.current_term);

    let mut commits = leader.subscribe_commits();
    let coords = leader.append(vec![b"hello, cluster".to_vec()]).await?;
    println!("appended entry at {coords}");

    let committed = commits.recv().await?;
    println!(
        "committed {} = {:?}",
        committed.coords,
        String::from_utf8_lossy(&committed.data)
    );

    token.cancel();
    Ok(())
}

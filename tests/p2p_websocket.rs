//! Integration tests for WebSocket peers on localhost

use emberchain::blockchain::Ledger;
use emberchain::config::ConsensusParams;
use emberchain::miner::Miner;
use emberchain::network::{NetworkNode, PeerSet};
use emberchain::service::LedgerHandle;
use emberchain::wallet::Wallet;
use std::sync::Arc;
use std::time::Duration;

struct Peer {
    ledger: LedgerHandle,
    network: Arc<NetworkNode>,
    miner: Miner,
    url: String,
}

async fn start_peer() -> Peer {
    let (ledger, _task) = LedgerHandle::spawn(Ledger::new(ConsensusParams::default()).unwrap());
    let peers = PeerSet::new();
    let network = Arc::new(NetworkNode::new(ledger.clone(), peers.clone()));
    let miner = Miner::new(ledger.clone(), Arc::new(Wallet::generate()), peers, 1_000);

    let (addr, _listener) = network.listen("127.0.0.1:0").await.unwrap();
    Peer {
        ledger,
        network,
        miner,
        url: format!("ws://{}", addr),
    }
}

/// Polls until `peer` reaches `height`.
async fn wait_for_height(peer: &Peer, height: u64) {
    loop {
        if peer.ledger.latest_block().await.unwrap().index >= height {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_for_peers(peer: &Peer, count: usize) {
    while peer.network.list_peers().await.len() < count {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_joining_peer_syncs_full_chain() {
    tokio::time::timeout(Duration::from_secs(20), async {
        let a = start_peer().await;
        let b = start_peer().await;

        a.miner.generate_next_block().await.unwrap();
        a.miner.generate_next_block().await.unwrap();
        a.miner.generate_next_block().await.unwrap();

        b.network.connect_peer(&a.url).await.unwrap();
        wait_for_height(&b, 3).await;

        assert_eq!(b.ledger.blocks().await.unwrap(), a.ledger.blocks().await.unwrap());
    })
    .await
    .expect("test_joining_peer_syncs_full_chain timed out");
}

#[tokio::test]
async fn test_mined_block_is_broadcast() {
    tokio::time::timeout(Duration::from_secs(20), async {
        let a = start_peer().await;
        let b = start_peer().await;

        b.network.connect_peer(&a.url).await.unwrap();
        wait_for_peers(&a, 1).await;
        wait_for_peers(&b, 1).await;

        let block = a.miner.generate_next_block().await.unwrap();
        wait_for_height(&b, 1).await;
        assert_eq!(b.ledger.latest_block().await.unwrap(), block);

        // and in the other direction
        let block = b.miner.generate_next_block().await.unwrap();
        wait_for_height(&a, 2).await;
        assert_eq!(a.ledger.latest_block().await.unwrap(), block);
    })
    .await
    .expect("test_mined_block_is_broadcast timed out");
}

#[tokio::test]
async fn test_garbage_frames_do_not_drop_the_peer() {
    use futures::SinkExt;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    tokio::time::timeout(Duration::from_secs(20), async {
        let a = start_peer().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(a.url.as_str()).await.unwrap();
        wait_for_peers(&a, 1).await;

        ws.send(WsMessage::Text("not json".to_string())).await.unwrap();
        ws.send(WsMessage::Text(r#"{"type":9,"data":null}"#.to_string())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(a.network.list_peers().await.len(), 1);

        ws.close(None).await.unwrap();
        while !a.network.list_peers().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("test_garbage_frames_do_not_drop_the_peer timed out");
}

#[tokio::test]
async fn test_unreachable_peer_is_error() {
    tokio::time::timeout(Duration::from_secs(10), async {
        let a = start_peer().await;
        // bind and drop to get a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(a.network.connect_peer(&format!("ws://127.0.0.1:{}", port)).await.is_err());
        assert!(a.network.list_peers().await.is_empty());
    })
    .await
    .expect("test_unreachable_peer_is_error timed out");
}

use crate::blockchain::Ledger;
use crate::config::Config;
use crate::error::ChainError;
use crate::miner::Miner;
use crate::network::{Message, NetworkNode, PeerSet};
use crate::service::LedgerHandle;
use crate::wallet::Wallet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Everything a running node owns. Built once at startup and shared by handle.
pub struct Node {
    pub config: Config,
    pub ledger: LedgerHandle,
    pub wallet: Arc<Wallet>,
    pub peers: PeerSet,
    pub network: Arc<NetworkNode>,
    pub miner: Miner,
    ledger_task: JoinHandle<()>,
}

impl Node {
    /// Loads the wallet and spawns the ledger task. Nothing is bound yet.
    pub fn init(config: Config) -> Result<Self, ChainError> {
        config.validate()?;
        let wallet = Arc::new(Wallet::load_or_create(&config.wallet.key_path)?);
        Self::with_wallet(config, wallet)
    }

    /// Same as [`Node::init`] with an already loaded wallet.
    pub fn with_wallet(config: Config, wallet: Arc<Wallet>) -> Result<Self, ChainError> {
        let ledger = Ledger::new(config.consensus.clone())?;
        let (ledger, ledger_task) = LedgerHandle::spawn(ledger);
        let peers = PeerSet::new();
        let network = Arc::new(NetworkNode::new(ledger.clone(), peers.clone()));
        let miner = Miner::new(
            ledger.clone(),
            Arc::clone(&wallet),
            peers.clone(),
            config.miner.nonce_batch,
        );

        info!("Node wallet address {}", wallet.address());
        Ok(Node {
            config,
            ledger,
            wallet,
            peers,
            network,
            miner,
            ledger_task,
        })
    }

    /// Binds the P2P listener on `p2p_port` and dials the bootstrap peers in
    /// the background.
    pub async fn start_p2p(&self) -> Result<(SocketAddr, JoinHandle<()>), ChainError> {
        let bind = format!("0.0.0.0:{}", self.config.network.p2p_port);
        let listening = self.network.listen(&bind).await?;
        self.dial_bootstrap_peers();
        Ok(listening)
    }

    /// One detached dial per bootstrap peer; failures are only logged.
    pub fn dial_bootstrap_peers(&self) -> Vec<JoinHandle<()>> {
        self.config
            .network
            .bootstrap_peers
            .iter()
            .cloned()
            .map(|peer| {
                let network = Arc::clone(&self.network);
                tokio::spawn(async move {
                    if let Err(e) = network.connect_peer(&peer).await {
                        warn!("Bootstrap peer {} unreachable: {}", peer, e);
                    }
                })
            })
            .collect()
    }

    /// Broadcasts `QueryLatest` every `resync_interval_secs`, or never when 0.
    pub fn spawn_resync(&self) -> Option<JoinHandle<()>> {
        let secs = self.config.network.resync_interval_secs;
        if secs == 0 {
            return None;
        }
        let peers = self.peers.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                peers.broadcast(&Message::QueryLatest).await;
            }
        }))
    }

    #[cfg(feature = "api")]
    pub fn api_state(&self) -> crate::api::ApiState {
        crate::api::ApiState {
            ledger: self.ledger.clone(),
            network: Arc::clone(&self.network),
            miner: self.miner.clone(),
            wallet: Arc::clone(&self.wallet),
        }
    }

    /// Runs the node until the API server or the ledger task stops.
    pub async fn run(self) -> Result<(), ChainError> {
        let (p2p_addr, _p2p_task) = self.start_p2p().await?;
        let _resync_task = self.spawn_resync();
        info!(
            "Node started: p2p ws://{} api port {}",
            p2p_addr, self.config.network.api_port
        );

        #[cfg(feature = "api")]
        {
            let api_port = self.config.network.api_port;
            let state = self.api_state();
            tokio::select! {
                result = crate::api::run_api_server(state, api_port) => {
                    if let Err(e) = &result {
                        error!("API server failed: {}", e);
                    }
                    result
                }
                _ = self.ledger_task => Err(ChainError::LedgerUnavailable),
            }
        }

        #[cfg(not(feature = "api"))]
        {
            let _ = self.ledger_task.await;
            error!("Ledger task stopped");
            Err(ChainError::LedgerUnavailable)
        }
    }
}

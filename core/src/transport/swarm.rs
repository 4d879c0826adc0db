// libp2p swarm setup — the running gossipsub node behind `GossipsubTransport`
//
// This creates and manages the libp2p Swarm with:
// - TCP transport
// - Noise encryption
// - Yamux multiplexing
// - All behaviours from behaviour.rs

use super::abstraction::{PubsubTransport, TransportError, TransportEvent};
use super::behaviour::{PeerchatBehaviour, PeerchatBehaviourEvent};
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{gossipsub, identify, identity::Keypair, mdns, swarm::SwarmEvent, Multiaddr, PeerId};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

/// Commands that can be sent to the swarm task
#[derive(Debug)]
pub enum SwarmCommand {
    Subscribe {
        topic: String,
        reply: mpsc::Sender<Result<(), TransportError>>,
    },
    Unsubscribe {
        topic: String,
        reply: mpsc::Sender<Result<(), TransportError>>,
    },
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: mpsc::Sender<Result<(), TransportError>>,
    },
    /// Topics the local gossipsub router is subscribed to
    GetSubscriptions { reply: mpsc::Sender<Vec<String>> },
    /// Get list of connected peers
    GetPeers { reply: mpsc::Sender<Vec<PeerId>> },
    /// Connected peers subscribed to a topic
    GetTopicPeers {
        topic: String,
        reply: mpsc::Sender<Vec<PeerId>>,
    },
    /// Dial a peer at a specific address
    Dial {
        addr: Multiaddr,
        reply: mpsc::Sender<Result<(), String>>,
    },
    /// Re-dial bootstrap peers
    Probe,
    GetListenAddrs { reply: mpsc::Sender<Vec<Multiaddr>> },
    /// Shutdown the swarm; the reply fires once the swarm is dropped
    Shutdown { reply: mpsc::Sender<()> },
}

/// Listen and discovery settings for a swarm
#[derive(Debug, Clone)]
pub struct SwarmSettings {
    pub listen_addr: Option<Multiaddr>,
    pub bootstrap: Vec<Multiaddr>,
    /// LAN discovery via mDNS
    pub enable_mdns: bool,
}

impl Default for SwarmSettings {
    fn default() -> Self {
        Self {
            listen_addr: None,
            bootstrap: Vec::new(),
            enable_mdns: true,
        }
    }
}

/// Handle to communicate with the running swarm task
#[derive(Clone)]
pub struct SwarmHandle {
    command_tx: mpsc::Sender<SwarmCommand>,
}

impl SwarmHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(mpsc::Sender<T>) -> SwarmCommand,
    ) -> Result<T, TransportError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| TransportError::NotRunning)?;

        reply_rx.recv().await.ok_or(TransportError::NotRunning)
    }

    pub async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        let topic = topic.to_string();
        self.request(|reply| SwarmCommand::Subscribe { topic, reply })
            .await?
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        let topic = topic.to_string();
        self.request(|reply| SwarmCommand::Unsubscribe { topic, reply })
            .await?
    }

    pub async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), TransportError> {
        let topic = topic.to_string();
        self.request(|reply| SwarmCommand::Publish { topic, data, reply })
            .await?
    }

    pub async fn subscriptions(&self) -> Result<Vec<String>, TransportError> {
        self.request(|reply| SwarmCommand::GetSubscriptions { reply })
            .await
    }

    /// Get connected peers
    pub async fn get_peers(&self) -> Result<Vec<PeerId>, TransportError> {
        self.request(|reply| SwarmCommand::GetPeers { reply }).await
    }

    pub async fn topic_peers(&self, topic: &str) -> Result<Vec<PeerId>, TransportError> {
        let topic = topic.to_string();
        self.request(|reply| SwarmCommand::GetTopicPeers { topic, reply })
            .await
    }

    /// Dial a peer at a multiaddress
    pub async fn dial(&self, addr: Multiaddr) -> Result<(), TransportError> {
        self.request(|reply| SwarmCommand::Dial { addr, reply })
            .await?
            .map_err(TransportError::Internal)
    }

    pub async fn probe(&self) -> Result<(), TransportError> {
        self.command_tx
            .send(SwarmCommand::Probe)
            .await
            .map_err(|_| TransportError::NotRunning)
    }

    pub async fn listen_addrs(&self) -> Result<Vec<Multiaddr>, TransportError> {
        self.request(|reply| SwarmCommand::GetListenAddrs { reply })
            .await
    }

    /// Shut down the swarm and wait until it is dropped
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        self.request(|reply| SwarmCommand::Shutdown { reply }).await
    }
}

/// Build and start the libp2p swarm, returning a handle for communication.
///
/// This spawns a tokio task that runs the swarm event loop. Network events are
/// forwarded on `event_tx`.
pub async fn start_swarm(
    keypair: Keypair,
    settings: SwarmSettings,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
) -> Result<SwarmHandle> {
    let mut swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            libp2p::tcp::Config::default(),
            libp2p::noise::Config::new,
            libp2p::yamux::Config::default,
        )?
        .with_behaviour(
            |key| -> Result<PeerchatBehaviour, Box<dyn std::error::Error + Send + Sync>> {
                Ok(PeerchatBehaviour::new(key, settings.enable_mdns)?)
            },
        )?
        .with_swarm_config(|cfg| {
            cfg.with_idle_connection_timeout(std::time::Duration::from_secs(300))
        })
        .build();

    // Start listening
    let addr = match settings.listen_addr.clone() {
        Some(addr) => addr,
        None => "/ip4/0.0.0.0/tcp/0".parse()?,
    };
    swarm.listen_on(addr)?;

    for addr in &settings.bootstrap {
        if let Err(e) = swarm.dial(addr.clone()) {
            tracing::warn!("Failed to dial bootstrap peer {}: {}", addr, e);
        }
    }

    let (command_tx, mut command_rx) = mpsc::channel::<SwarmCommand>(256);
    let handle = SwarmHandle { command_tx };

    // Spawn the swarm event loop
    tokio::spawn(async move {
        let mut listen_addrs: Vec<Multiaddr> = Vec::new();
        let mut shutdown_reply = None;

        loop {
            tokio::select! {
                // Process incoming swarm events
                event = swarm.select_next_some() => {
                    match event {
                        SwarmEvent::Behaviour(PeerchatBehaviourEvent::Gossipsub(
                            gossipsub::Event::Message { message, .. }
                        )) => {
                            let _ = event_tx.send(TransportEvent::Message {
                                topic: message.topic.to_string(),
                                source: message.source.map(|p| p.to_string()),
                                data: message.data,
                            });
                        }

                        SwarmEvent::Behaviour(PeerchatBehaviourEvent::Gossipsub(
                            gossipsub::Event::Subscribed { peer_id, topic }
                        )) => {
                            tracing::debug!("{} subscribed to {}", peer_id, topic);
                        }

                        SwarmEvent::Behaviour(PeerchatBehaviourEvent::Mdns(
                            mdns::Event::Discovered(peers)
                        )) => {
                            for (peer_id, addr) in peers {
                                tracing::info!("mDNS discovered peer: {} at {}", peer_id, addr);
                                swarm.behaviour_mut().gossipsub.add_explicit_peer(&peer_id);
                            }
                        }

                        SwarmEvent::Behaviour(PeerchatBehaviourEvent::Mdns(
                            mdns::Event::Expired(peers)
                        )) => {
                            for (peer_id, _addr) in peers {
                                tracing::info!("mDNS peer expired: {}", peer_id);
                                swarm.behaviour_mut().gossipsub.remove_explicit_peer(&peer_id);
                            }
                        }

                        SwarmEvent::Behaviour(PeerchatBehaviourEvent::Identify(
                            identify::Event::Received { peer_id, info, .. }
                        )) => {
                            tracing::debug!("Identified peer {} ({})", peer_id, info.agent_version);
                        }

                        SwarmEvent::NewListenAddr { address, .. } => {
                            tracing::info!("Listening on {}", address);
                            listen_addrs.push(address);
                        }

                        SwarmEvent::ConnectionEstablished { peer_id, endpoint, num_established, .. } => {
                            tracing::info!("Connected to {} via {}", peer_id, endpoint.get_remote_address());
                            if num_established.get() == 1 {
                                let _ = event_tx.send(TransportEvent::PeerConnected(peer_id.to_string()));
                            }
                        }

                        SwarmEvent::ConnectionClosed { peer_id, num_established, .. } => {
                            tracing::info!("Disconnected from {}", peer_id);
                            if num_established == 0 {
                                let _ = event_tx.send(TransportEvent::PeerDisconnected(peer_id.to_string()));
                            }
                        }

                        _ => {}
                    }
                }

                // Process commands from the transport
                Some(command) = command_rx.recv() => {
                    match command {
                        SwarmCommand::Subscribe { topic, reply } => {
                            let result = swarm
                                .behaviour_mut()
                                .gossipsub
                                .subscribe(&gossipsub::IdentTopic::new(topic.as_str()))
                                .map(|_| ())
                                .map_err(|e| TransportError::SubscriptionFailed(format!("{}: {:?}", topic, e)));
                            let _ = reply.send(result).await;
                        }

                        SwarmCommand::Unsubscribe { topic, reply } => {
                            let result = swarm
                                .behaviour_mut()
                                .gossipsub
                                .unsubscribe(&gossipsub::IdentTopic::new(topic.as_str()))
                                .map(|_| ())
                                .map_err(|e| TransportError::SubscriptionFailed(format!("{}: {:?}", topic, e)));
                            let _ = reply.send(result).await;
                        }

                        SwarmCommand::Publish { topic, data, reply } => {
                            let result = match swarm
                                .behaviour_mut()
                                .gossipsub
                                .publish(gossipsub::IdentTopic::new(topic.as_str()), data)
                            {
                                Ok(_) => Ok(()),
                                Err(gossipsub::PublishError::InsufficientPeers) => {
                                    Err(TransportError::InsufficientPeers(topic))
                                }
                                Err(e) => Err(TransportError::PublishFailed(e.to_string())),
                            };
                            let _ = reply.send(result).await;
                        }

                        SwarmCommand::GetSubscriptions { reply } => {
                            let topics: Vec<String> = swarm
                                .behaviour()
                                .gossipsub
                                .topics()
                                .map(|hash| hash.to_string())
                                .collect();
                            let _ = reply.send(topics).await;
                        }

                        SwarmCommand::GetPeers { reply } => {
                            let peers: Vec<PeerId> = swarm.connected_peers().cloned().collect();
                            let _ = reply.send(peers).await;
                        }

                        SwarmCommand::GetTopicPeers { topic, reply } => {
                            let hash = gossipsub::IdentTopic::new(topic.as_str()).hash();
                            let peers: Vec<PeerId> = swarm
                                .behaviour()
                                .gossipsub
                                .all_peers()
                                .filter(|(_, topics)| topics.contains(&&hash))
                                .map(|(peer, _)| *peer)
                                .collect();
                            let _ = reply.send(peers).await;
                        }

                        SwarmCommand::Dial { addr, reply } => {
                            match swarm.dial(addr) {
                                Ok(_) => { let _ = reply.send(Ok(())).await; }
                                Err(e) => { let _ = reply.send(Err(e.to_string())).await; }
                            }
                        }

                        SwarmCommand::Probe => {
                            tracing::debug!("Probe: re-dialing {} bootstrap peer(s)", settings.bootstrap.len());
                            for addr in &settings.bootstrap {
                                if let Err(e) = swarm.dial(addr.clone()) {
                                    tracing::debug!("Probe dial {} failed: {}", addr, e);
                                }
                            }
                        }

                        SwarmCommand::GetListenAddrs { reply } => {
                            let _ = reply.send(listen_addrs.clone()).await;
                        }

                        SwarmCommand::Shutdown { reply } => {
                            tracing::info!("Swarm shutting down");
                            shutdown_reply = Some(reply);
                            break;
                        }
                    }
                }
            }
        }

        drop(swarm);
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(()).await;
        }
    });

    Ok(handle)
}

/// `PubsubTransport` over a libp2p gossipsub swarm.
///
/// A restart replaces the swarm with a fresh one under the same identity; the
/// event stream survives restarts.
pub struct GossipsubTransport {
    keypair: Keypair,
    settings: SwarmSettings,
    local_peer_id: String,
    handle: RwLock<SwarmHandle>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    events: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
}

impl GossipsubTransport {
    pub async fn start(keypair: Keypair, settings: SwarmSettings) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let local_peer_id = keypair.public().to_peer_id().to_string();
        let handle = start_swarm(keypair.clone(), settings.clone(), event_tx.clone()).await?;
        tracing::info!("Gossipsub transport started as {}", local_peer_id);

        Ok(Self {
            keypair,
            settings,
            local_peer_id,
            handle: RwLock::new(handle),
            event_tx,
            events: Mutex::new(Some(event_rx)),
        })
    }

    fn handle(&self) -> SwarmHandle {
        self.handle.read().clone()
    }

    pub async fn dial(&self, addr: Multiaddr) -> Result<(), TransportError> {
        self.handle().dial(addr).await
    }

    pub async fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.handle().listen_addrs().await.unwrap_or_default()
    }

    pub async fn shutdown(&self) -> Result<(), TransportError> {
        self.handle().shutdown().await
    }
}

#[async_trait]
impl PubsubTransport for GossipsubTransport {
    fn local_peer_id(&self) -> String {
        self.local_peer_id.clone()
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.handle().subscribe(topic).await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.handle().unsubscribe(topic).await
    }

    async fn subscriptions(&self) -> Vec<String> {
        self.handle().subscriptions().await.unwrap_or_default()
    }

    async fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions().await.iter().any(|t| t == topic)
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), TransportError> {
        self.handle().publish(topic, data).await
    }

    async fn connected_peers(&self) -> Vec<String> {
        self.handle()
            .get_peers()
            .await
            .map(|peers| peers.iter().map(PeerId::to_string).collect())
            .unwrap_or_default()
    }

    async fn topic_peers(&self, topic: &str) -> Vec<String> {
        self.handle()
            .topic_peers(topic)
            .await
            .map(|peers| peers.iter().map(PeerId::to_string).collect())
            .unwrap_or_default()
    }

    async fn probe(&self) -> Result<(), TransportError> {
        self.handle().probe().await
    }

    async fn restart(&self) -> Result<(), TransportError> {
        if let Err(e) = self.handle().shutdown().await {
            tracing::debug!("Previous swarm already stopped: {}", e);
        }
        let handle = start_swarm(self.keypair.clone(), self.settings.clone(), self.event_tx.clone())
            .await
            .map_err(|e| TransportError::RestartFailed(e.to_string()))?;
        *self.handle.write() = handle;
        tracing::info!("Gossipsub transport restarted");
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events.lock().take()
    }
}

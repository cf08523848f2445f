//! Subcommand implementations

use anyhow::{bail, Context, Result};
use ipchanger_core::{
    Credentials, Device, Ipv4Cidr, MappingLog, ReconfigurationRequest, Session,
};
use ipchanger_discovery::{DiscoveryEvent, DiscoveryScanner, TcpConnectProbe};
use ipchanger_onvif::{HttpTransport, Inspector, Reconfigurer};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::local;
use crate::render;

/// Shared state for one invocation
pub struct App {
    pub config: Config,
    pub session: Session,
    transport: Arc<HttpTransport>,
    probe: Arc<TcpConnectProbe>,
    cancel: CancellationToken,
}

impl App {
    pub fn new(config: Config, credentials: Option<Credentials>, cancel: CancellationToken) -> Result<Self> {
        let transport = HttpTransport::new().context("Failed to create HTTP client")?;
        let mut session = Session::new();
        if let Some(credentials) = credentials {
            session.set_credentials(credentials);
        }
        Ok(Self {
            config,
            session,
            transport: Arc::new(transport),
            probe: Arc::new(TcpConnectProbe),
            cancel,
        })
    }

    fn inspector(&self) -> Inspector<HttpTransport> {
        Inspector::new(
            Arc::clone(&self.transport),
            self.config.onvif.port,
            self.config.query_timeouts(),
        )
    }

    fn engine(&self) -> Reconfigurer<HttpTransport, TcpConnectProbe> {
        Reconfigurer::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.probe),
            self.config.to_engine_options(),
        )
    }

    fn require_credentials(&self) -> Result<()> {
        if self.session.credentials().is_none() {
            bail!("No password supplied (use --password, IPCHANGER_PASSWORD or [credentials].password)");
        }
        Ok(())
    }

    /// Explicit range, then configured range, then the local interface network
    fn resolve_network(&self, explicit: Option<Ipv4Cidr>) -> Option<Ipv4Cidr> {
        explicit
            .or(self.config.discovery.network)
            .or_else(local::suggest_network)
    }

    pub async fn scan(&mut self, network: Option<Ipv4Cidr>, json: bool) -> Result<()> {
        let network = self
            .resolve_network(network)
            .context("No network range given and no local interface found (use --network)")?;
        self.session.set_network(network);

        let scanner = DiscoveryScanner::new(
            self.config.to_scanner_config(),
            self.inspector(),
            Arc::clone(&self.probe),
        );

        if !json {
            println!("Scanning {} ({} hosts)...", network, network.host_count());
            let mut events = scanner.subscribe();
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(DiscoveryEvent::CandidateFound { address, port }) => {
                            eprintln!("  open port {} on {}", port, address);
                        }
                        Ok(DiscoveryEvent::ScanCompleted { .. }) | Err(RecvError::Closed) => break,
                        Ok(_) | Err(RecvError::Lagged(_)) => {}
                    }
                }
            });
        }

        let devices = tokio::select! {
            devices = scanner.scan(network, self.session.credentials()) => devices,
            _ = self.cancel.cancelled() => bail!("Scan cancelled"),
        };
        self.session.replace_devices(devices);

        if json {
            println!("{}", serde_json::to_string_pretty(self.session.devices())?);
        } else {
            render::print_devices(self.session.devices());
        }
        Ok(())
    }

    pub async fn inspect(&mut self, address: Ipv4Addr, verbose: bool) -> Result<()> {
        let inspector = self.inspector();
        let credentials = self.session.credentials();

        let mut identity = inspector.identity(address, None).await;
        let authenticated = match credentials {
            Some(credentials) => {
                let result = inspector.identity(address, Some(credentials)).await;
                let ok = result.is_some();
                if result.is_some() {
                    identity = result;
                }
                Some(ok)
            }
            None => None,
        };
        let facts = inspector.network_config(address, credentials).await;
        let interfaces = inspector.network_interfaces(address, credentials).await;

        println!("Device {}:{}", address, self.config.onvif.port);
        render::print_identity(identity.as_ref());
        match authenticated {
            Some(true) => println!("ONVIF access:  ok"),
            Some(false) => println!("ONVIF access:  failed with the supplied credentials"),
            None => println!("ONVIF access:  not tested (no password)"),
        }
        render::print_facts(&facts, &interfaces, verbose);
        if let Some(moved) = self.recorded_move(address) {
            println!("Mapping log:   {} was moved to {}", address, moved);
        }

        let mut device = Device::new(address, self.config.onvif.port);
        if let Some(identity) = identity {
            device.apply_identity(identity);
        }
        self.session.upsert(device);
        Ok(())
    }

    pub async fn change_ip(&mut self, args: ChangeIpArgs) -> Result<bool> {
        self.require_credentials()?;

        let prefix = args.prefix.unwrap_or(self.config.reconfigure.prefix_length);
        let active = self.resolve_network(args.network);
        if let Some(network) = active {
            self.session.set_network(network);
        }
        let gateway = args
            .gateway
            .or(self.config.reconfigure.gateway)
            .or_else(|| default_gateway(args.new_address, prefix, active))
            .context("No gateway given and none could be derived")?;
        let interface = args
            .interface
            .or_else(|| self.config.reconfigure.interface_token.clone());

        let request = ReconfigurationRequest::new(
            args.current,
            args.new_address,
            gateway,
            prefix,
            interface,
            args.allow_foreign_gateway,
        )?;

        println!(
            "Changing {} -> {}/{} (gateway {})",
            request.current(),
            request.new_address(),
            request.prefix_len(),
            request.gateway()
        );

        let engine = self.engine();
        let report = engine
            .reconfigure(&mut self.session, &request, &self.cancel)
            .await?;
        render::print_report(&report);

        if report.is_confirmed() {
            self.record_changes();
        }
        Ok(report.is_confirmed())
    }

    pub async fn dhcp(
        &mut self,
        address: Ipv4Addr,
        enable: bool,
        interface: Option<String>,
    ) -> Result<bool> {
        self.require_credentials()?;
        let interface = interface.or_else(|| self.config.reconfigure.interface_token.clone());

        let engine = self.engine();
        let report = engine
            .set_dhcp_mode(
                &self.session,
                address,
                enable,
                interface.as_deref(),
                &self.cancel,
            )
            .await?;
        render::print_dhcp_report(&report);
        Ok(report.outcome.is_confirmed())
    }

    /// Append confirmed changes to the mapping log.
    ///
    /// The device has already moved, so a log failure is only reported and
    /// never turns the change into an error. Returns the number of new entries.
    fn record_changes(&self) -> Option<usize> {
        let path = &self.config.mappings.path;
        let saved = MappingLog::load(path).and_then(|mut log| {
            let added = log.record(self.session.changes());
            log.save()?;
            Ok((added, log))
        });
        match saved {
            Ok((added, log)) => {
                info!(
                    path = %log.path().display(),
                    added = added,
                    total = log.entries().len(),
                    "Address mappings saved"
                );
                Some(added)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to record address mappings");
                eprintln!("Warning: could not update {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Address an earlier run moved `address` to, if the mapping log knows it
    fn recorded_move(&self, address: Ipv4Addr) -> Option<Ipv4Addr> {
        let path = &self.config.mappings.path;
        match MappingLog::load(path) {
            Ok(log) => log.resolve(address),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Mapping log not readable");
                None
            }
        }
    }
}

/// Arguments of `change-ip` after clap parsing
#[derive(Debug, Clone)]
pub struct ChangeIpArgs {
    pub current: Ipv4Addr,
    pub new_address: Ipv4Addr,
    pub gateway: Option<Ipv4Addr>,
    pub prefix: Option<u8>,
    pub interface: Option<String>,
    pub network: Option<Ipv4Cidr>,
    pub allow_foreign_gateway: bool,
}

/// First host of the active range when it holds the new address, otherwise
/// the first host of the new address's own subnet
pub fn default_gateway(
    new_address: Ipv4Addr,
    prefix_len: u8,
    active: Option<Ipv4Cidr>,
) -> Option<Ipv4Addr> {
    if let Some(network) = active.filter(|n| n.contains(new_address)) {
        return network.first_host();
    }
    Ipv4Cidr::new(new_address, prefix_len).ok()?.first_host()
}

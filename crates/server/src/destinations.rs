//! Proxy destination selection.

use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tessera_core::config::{ImageServerKind, ProxyConfig};
use tracing::warn;

/// Logical services a request can be forwarded to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProxyDestination {
    Orchestrator,
    Thumbs,
    ResizeThumbs,
    SpecialServer,
    /// The configured downstream image server.
    ImageServer,
    /// Served natively from blob storage.
    S3,
    Unknown,
}

impl ProxyDestination {
    /// Key in the configured destination table, `None` for destinations
    /// that never have addresses.
    pub fn config_name(self, image_server: ImageServerKind) -> Option<&'static str> {
        match self {
            Self::Orchestrator => Some("deliverator"),
            Self::Thumbs => Some("thumbs"),
            Self::ResizeThumbs => Some("thumbresize"),
            Self::SpecialServer => Some("specialserver"),
            Self::ImageServer => Some(image_server.destination_name()),
            Self::S3 | Self::Unknown => None,
        }
    }
}

impl fmt::Display for ProxyDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Orchestrator => "orchestrator",
            Self::Thumbs => "thumbs",
            Self::ResizeThumbs => "thumbresize",
            Self::SpecialServer => "specialserver",
            Self::ImageServer => "imageserver",
            Self::S3 => "s3",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Picks one of several equivalent addresses.
pub trait SelectionStrategy: Send + Sync {
    /// Return an index below `candidates`, which is always at least 2.
    fn pick(&self, candidates: usize) -> usize;
}

/// Uniform random choice on every call, no affinity or health checking.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomSelection;

impl SelectionStrategy for RandomSelection {
    fn pick(&self, candidates: usize) -> usize {
        rand::rng().random_range(0..candidates)
    }
}

/// Resolves logical destinations to physical base URLs.
#[derive(Clone)]
pub struct DestinationSelector {
    destinations: HashMap<String, Vec<String>>,
    image_server: ImageServerKind,
    strategy: Arc<dyn SelectionStrategy>,
}

impl DestinationSelector {
    pub fn new(config: &ProxyConfig, image_server: ImageServerKind) -> Self {
        let destinations = config
            .destinations
            .iter()
            .map(|(name, addresses)| {
                let addresses = addresses
                    .iter()
                    .map(|a| a.trim_end_matches('/').to_string())
                    .filter(|a| !a.is_empty())
                    .collect();
                (name.clone(), addresses)
            })
            .collect();

        Self {
            destinations,
            image_server,
            strategy: Arc::new(RandomSelection),
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn SelectionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Base URL for `destination`, or `None` when the request should be
    /// handled natively.
    pub fn resolve(&self, destination: ProxyDestination) -> Option<&str> {
        let Some(name) = destination.config_name(self.image_server) else {
            warn!(%destination, "Destination has no proxy addresses");
            return None;
        };

        match self.destinations.get(name).map(Vec::as_slice) {
            None | Some([]) => None,
            Some([only]) => Some(only.as_str()),
            Some(many) => {
                let index = self.strategy.pick(many.len()).min(many.len() - 1);
                Some(many[index].as_str())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(entries: &[(&str, &[&str])]) -> ProxyConfig {
        ProxyConfig {
            destinations: entries
                .iter()
                .map(|(name, addrs)| {
                    (
                        name.to_string(),
                        addrs.iter().map(|a| a.to_string()).collect(),
                    )
                })
                .collect(),
            can_resize_thumbs: false,
        }
    }

    #[test]
    fn test_unconfigured_and_s3_resolve_to_none() {
        let selector = DestinationSelector::new(
            &config(&[("thumbs", &[])]),
            ImageServerKind::Cantaloupe,
        );
        assert_eq!(selector.resolve(ProxyDestination::Thumbs), None);
        assert_eq!(selector.resolve(ProxyDestination::Orchestrator), None);
        assert_eq!(selector.resolve(ProxyDestination::S3), None);
        assert_eq!(selector.resolve(ProxyDestination::Unknown), None);
    }

    #[test]
    fn test_single_address_always_chosen() {
        let selector = DestinationSelector::new(
            &config(&[("iip", &["http://iip:8080/"])]),
            ImageServerKind::Iip,
        );
        for _ in 0..10 {
            assert_eq!(
                selector.resolve(ProxyDestination::ImageServer),
                Some("http://iip:8080")
            );
        }
    }

    #[test]
    fn test_image_server_follows_kind() {
        let cfg = config(&[("cantaloupe", &["http://cantaloupe"]), ("iip", &["http://iip"])]);
        let selector = DestinationSelector::new(&cfg, ImageServerKind::Cantaloupe);
        assert_eq!(
            selector.resolve(ProxyDestination::ImageServer),
            Some("http://cantaloupe")
        );
    }

    #[test]
    fn test_multiple_addresses_all_reachable() {
        let selector = DestinationSelector::new(
            &config(&[("thumbs", &["http://a", "http://b", "http://c"])]),
            ImageServerKind::Cantaloupe,
        );
        let seen: HashSet<&str> = (0..500)
            .filter_map(|_| selector.resolve(ProxyDestination::Thumbs))
            .collect();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_custom_strategy() {
        struct RoundRobin(AtomicUsize);
        impl SelectionStrategy for RoundRobin {
            fn pick(&self, candidates: usize) -> usize {
                self.0.fetch_add(1, Ordering::SeqCst) % candidates
            }
        }

        let selector = DestinationSelector::new(
            &config(&[("deliverator", &["http://a", "http://b"])]),
            ImageServerKind::Cantaloupe,
        )
        .with_strategy(Arc::new(RoundRobin(AtomicUsize::new(0))));

        let picks: Vec<_> = (0..4)
            .filter_map(|_| selector.resolve(ProxyDestination::Orchestrator))
            .collect();
        assert_eq!(picks, vec!["http://a", "http://b", "http://a", "http://b"]);
    }
}

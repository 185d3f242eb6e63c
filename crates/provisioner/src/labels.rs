//! 컨테이너 라벨: 리버스 프록시 라우팅 규칙과 소유 표시
//!
//! 프록시는 컨테이너 라벨에서 라우트를 찾으므로 라우팅 규칙은 컨테이너와 함께
//! 생기고 사라집니다. 소유 라벨 덕분에 reconcile 스윕은 컨테이너 이름에 의존하지
//! 않고 관리 대상 컨테이너를 열거할 수 있습니다.

use std::collections::BTreeMap;

use crate::config::ProvisionerConfig;

/// Marks a container as managed by scoutpost.
pub const MANAGED_LABEL: &str = "scoutpost.managed";

/// Carries the owner identity of a managed container.
pub const OWNER_LABEL: &str = "scoutpost.owner";

/// Routing parameters shared by every instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPolicy {
    /// Domain under which subdomains are routed
    pub base_domain: String,
    /// Router/service name prefix
    pub router_prefix: String,
    /// Port the proxy forwards to inside the container
    pub app_port: u16,
    /// Network the proxy reaches the container on
    pub network: String,
    /// Optional router entrypoints
    pub entrypoints: Option<String>,
    /// Optional TLS certificate resolver
    pub cert_resolver: Option<String>,
}

impl RoutingPolicy {
    pub fn from_config(config: &ProvisionerConfig) -> Self {
        Self {
            base_domain: config.base_domain.clone(),
            router_prefix: config.router_prefix.clone(),
            app_port: config.app_port,
            network: config.network.clone(),
            entrypoints: config.entrypoints.clone(),
            cert_resolver: config.cert_resolver.clone(),
        }
    }

    /// Router and service name for a subdomain (`<prefix>-<subdomain>`).
    pub fn router_name(&self, subdomain: &str) -> String {
        format!("{}-{}", self.router_prefix, subdomain)
    }

    /// Fully qualified host routed to the instance.
    pub fn host(&self, subdomain: &str) -> String {
        format!("{subdomain}.{}", self.base_domain)
    }

    /// Routing labels for one instance.
    pub fn routing_labels(&self, subdomain: &str) -> BTreeMap<String, String> {
        let router = self.router_name(subdomain);
        let mut labels = BTreeMap::new();

        labels.insert("traefik.enable".to_owned(), "true".to_owned());
        labels.insert(
            format!("traefik.http.routers.{router}.rule"),
            format!("Host(`{}`)", self.host(subdomain)),
        );
        labels.insert(
            format!("traefik.http.services.{router}.loadbalancer.server.port"),
            self.app_port.to_string(),
        );
        labels.insert("traefik.docker.network".to_owned(), self.network.clone());

        if let Some(entrypoints) = &self.entrypoints {
            labels.insert(
                format!("traefik.http.routers.{router}.entrypoints"),
                entrypoints.clone(),
            );
        }
        if let Some(resolver) = &self.cert_resolver {
            labels.insert(
                format!("traefik.http.routers.{router}.tls.certresolver"),
                resolver.clone(),
            );
        }

        labels
    }

    /// Routing and ownership labels together.
    pub fn labels_for(&self, owner: &str, subdomain: &str) -> BTreeMap<String, String> {
        let mut labels = self.routing_labels(subdomain);
        labels.extend(ownership_labels(owner));
        labels
    }
}

/// Ownership labels for `owner`.
pub fn ownership_labels(owner: &str) -> [(String, String); 2] {
    [
        (MANAGED_LABEL.to_owned(), "true".to_owned()),
        (OWNER_LABEL.to_owned(), owner.to_owned()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RoutingPolicy {
        RoutingPolicy::from_config(&ProvisionerConfig::default())
    }

    #[test]
    fn routing_labels_match_proxy_contract() {
        let labels = policy().routing_labels("alice");
        assert_eq!(labels.len(), 4);
        assert_eq!(labels["traefik.enable"], "true");
        assert_eq!(
            labels["traefik.http.routers.ns-alice.rule"],
            "Host(`alice.nst1d.com`)"
        );
        assert_eq!(
            labels["traefik.http.services.ns-alice.loadbalancer.server.port"],
            "1337"
        );
        assert_eq!(labels["traefik.docker.network"], "project_nightscout_net");
    }

    #[test]
    fn optional_labels_only_when_configured() {
        let mut policy = policy();
        policy.entrypoints = Some("websecure".to_owned());
        policy.cert_resolver = Some("letsencrypt".to_owned());

        let labels = policy.routing_labels("bob-x");
        assert_eq!(labels.len(), 6);
        assert_eq!(labels["traefik.http.routers.ns-bob-x.entrypoints"], "websecure");
        assert_eq!(
            labels["traefik.http.routers.ns-bob-x.tls.certresolver"],
            "letsencrypt"
        );
    }

    #[test]
    fn labels_for_adds_ownership() {
        let labels = policy().labels_for("Bob_X", "bob-x");
        assert_eq!(labels[MANAGED_LABEL], "true");
        assert_eq!(labels[OWNER_LABEL], "Bob_X");
        assert!(labels.contains_key("traefik.http.routers.ns-bob-x.rule"));
    }

    #[test]
    fn router_name_uses_prefix() {
        let mut policy = policy();
        policy.router_prefix = "cgm".to_owned();
        assert_eq!(policy.router_name("alice"), "cgm-alice");
        assert_eq!(policy.host("alice"), "alice.nst1d.com");
    }
}

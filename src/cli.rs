//! CLI for this application
//!
use crate::settings;

#[derive(Clone, Debug, clap::Parser)]
#[command(name = settings::APP_NAME, version = settings::APP_VERSION)]
pub struct Cli {
    // Server bind address
    #[clap(
        long,
        default_value = "0.0.0.0",
        env("BIND_IP"),
        help = "IP Address to listen on"
    )]
    pub bind_ip: String,

    // HTTP API listen port
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_HTTP,
        env("PORT"),
        help = "Port to bind the proxy HTTP server to"
    )]
    pub port: u16,

    // Gossip port
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_CLUSTER,
        env("CLUSTER_PORT"),
        help = "Port to bind and advertise for cluster gossip"
    )]
    pub cluster_port: u16,

    // Static seed list
    #[clap(
        long,
        env("CLUSTER_MEMBERS"),
        value_delimiter = ',',
        help = "Comma-separated seed peers (host or host:port). Takes priority over --cluster-dns"
    )]
    pub cluster_members: Vec<String>,

    // DNS discovery
    #[clap(
        long,
        env("CLUSTER_DNS"),
        help = "DNS name resolving to the IPs of cluster seeds"
    )]
    pub cluster_dns: Option<String>,

    // Debug node name override
    #[clap(
        long,
        env("NODE_NAME"),
        help = "Override the cluster node name (debug: also disables dead node reclaim delay)"
    )]
    pub node_name: Option<String>,

    // Remote grant timeout
    #[clap(
        long,
        default_value = settings::DEFAULT_REQUEST_TIMEOUT_MS,
        env("REQUEST_TIMEOUT"),
        help = "Timeout in milliseconds for requests to other nodes"
    )]
    pub request_timeout: u64,

    #[clap(
        long,
        default_value = "text",
        env("LOG_FORMAT"),
        help = "Log output format: 'text' or 'json'"
    )]
    pub log_format: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Cli {
    pub fn into_settings(self) -> settings::Settings {
        let members = self
            .cluster_members
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        settings::Settings {
            bind_ip: self.bind_ip,
            port: self.port,
            request_timeout_ms: self.request_timeout,
            log_json: self.log_format.eq_ignore_ascii_case("json"),
            cluster: settings::ClusterSettings {
                port: self.cluster_port,
                members,
                dns: non_empty(self.cluster_dns),
                node_name: non_empty(self.node_name),
                proxy_port: self.port,
            },
        }
    }
}
